//! Linear system backends solving `K x = b` on the reduced system.

use std::fmt;

use nalgebra::linalg::LU;
use nalgebra::{DMatrix, Dyn};
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CooMatrix, CscMatrix, CsrMatrix};

use crate::containers::{is_symmetric_csc, Vector};
use crate::errors::SolverError;
use crate::integrator::IntegratorCategory;

/// Default smallest admissible ratio between pivot magnitudes.
pub const PIVOT_TOLERANCE: f64 = 1.0e-14;

/// Relative asymmetry below which [`SparseDirect`] treats a matrix as symmetric.
pub const SYMMETRY_TOLERANCE: f64 = 1.0e-12;

/// Linear solver backend.
///
/// A matrix is factored once by [`LinearSolver::set_matrix`] and reused by any
/// number of [`LinearSolver::solve`] calls. Every backend gives the same
/// answer for the matrices it accepts.
pub trait LinearSolver: fmt::Debug + Send {
    /// Short name of the backend.
    fn name(&self) -> &'static str;

    /// Return `true` when the backend can serve integrators of `category`.
    fn supports(&self, _category: IntegratorCategory) -> bool {
        true
    }

    /// Factor `matrix`, replacing any previous factorization.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::NotSquare`] for rectangular input and
    /// [`SolverError::Singular`] when a pivot ratio falls below tolerance.
    fn set_matrix(&mut self, matrix: &CooMatrix<f64>) -> Result<(), SolverError>;

    /// Solve with the current factorization.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::NotFactored`] before the first factorization and
    /// [`SolverError::SizeMismatch`] when `rhs` does not match the matrix.
    fn solve(&self, rhs: &Vector) -> Result<Vector, SolverError>;

    /// Size of the factored matrix, zero before any factorization.
    fn size(&self) -> usize;
}

fn check_square(solver: &'static str, matrix: &CooMatrix<f64>) -> Result<usize, SolverError> {
    if matrix.nrows() == matrix.ncols() {
        Ok(matrix.nrows())
    } else {
        Err(SolverError::NotSquare {
            solver,
            rows: matrix.nrows(),
            cols: matrix.ncols(),
        })
    }
}

fn check_rhs(solver: &'static str, size: usize, rhs: &Vector) -> Result<(), SolverError> {
    if rhs.len() == size {
        Ok(())
    } else {
        Err(SolverError::SizeMismatch {
            solver,
            size,
            rhs: rhs.len(),
        })
    }
}

/// Ratio between the smallest and largest magnitude in `pivots`.
fn pivot_ratio(pivots: impl Iterator<Item = f64>) -> f64 {
    let (min, max) = pivots.fold((f64::INFINITY, 0.0_f64), |(min, max), pivot| {
        (min.min(pivot.abs()), max.max(pivot.abs()))
    });
    if max > 0.0 && min.is_finite() {
        min / max
    } else {
        0.0
    }
}

fn dense_lu(
    solver: &'static str,
    dense: DMatrix<f64>,
    tolerance: f64,
) -> Result<LU<f64, Dyn, Dyn>, SolverError> {
    let lu = dense.lu();
    let ratio = pivot_ratio(lu.u().diagonal().iter().copied());
    if ratio < tolerance {
        return Err(SolverError::Singular {
            solver,
            pivot_ratio: ratio,
        });
    }
    Ok(lu)
}

fn lu_solve(solver: &'static str, lu: &LU<f64, Dyn, Dyn>, rhs: &Vector) -> Result<Vector, SolverError> {
    lu.solve(rhs).ok_or(SolverError::Singular {
        solver,
        pivot_ratio: 0.0,
    })
}

/// Dense LU factorization with partial pivoting.
///
/// # Examples
/// ```
/// use equilibria::system::{FullGeneral, LinearSolver};
/// use equilibria::Vector;
/// use nalgebra_sparse::CooMatrix;
///
/// let mut matrix = CooMatrix::new(2, 2);
/// matrix.push(0, 0, 2.0);
/// matrix.push(1, 1, 4.0);
/// let mut solver = FullGeneral::default();
/// solver.set_matrix(&matrix)?;
/// let x = solver.solve(&Vector::from_vec(vec![2.0, 2.0]))?;
/// assert_eq!(x, Vector::from_vec(vec![1.0, 0.5]));
/// # Ok::<(), equilibria::SolverError>(())
/// ```
#[derive(Clone, Debug)]
pub struct FullGeneral {
    pivot_tolerance: f64,
    size: usize,
    factor: Option<LU<f64, Dyn, Dyn>>,
}

impl Default for FullGeneral {
    fn default() -> Self {
        Self::new(PIVOT_TOLERANCE)
    }
}

impl FullGeneral {
    /// Dense backend rejecting pivot ratios below `pivot_tolerance`.
    #[must_use]
    pub fn new(pivot_tolerance: f64) -> Self {
        Self {
            pivot_tolerance,
            size: 0,
            factor: None,
        }
    }
}

impl LinearSolver for FullGeneral {
    fn name(&self) -> &'static str {
        "FullGeneral"
    }

    fn set_matrix(&mut self, matrix: &CooMatrix<f64>) -> Result<(), SolverError> {
        let size = check_square(self.name(), matrix)?;
        self.factor = None;
        self.size = size;
        if size > 0 {
            self.factor = Some(dense_lu(self.name(), DMatrix::from(matrix), self.pivot_tolerance)?);
        }
        Ok(())
    }

    fn solve(&self, rhs: &Vector) -> Result<Vector, SolverError> {
        check_rhs(self.name(), self.size, rhs)?;
        if self.size == 0 {
            return Ok(Vector::zeros(0));
        }
        let factor = self.factor.as_ref().ok_or(SolverError::NotFactored(self.name()))?;
        lu_solve(self.name(), factor, rhs)
    }

    fn size(&self) -> usize {
        self.size
    }
}

#[derive(Clone, Debug)]
enum SparseFactor {
    Cholesky(CscCholesky<f64>),
    Dense(LU<f64, Dyn, Dyn>),
}

/// Sparse Cholesky factorization.
///
/// Unsymmetric matrices and symmetric indefinite ones, which Cholesky cannot
/// factor, fall back to dense LU so the backend accepts the same matrices as
/// [`FullGeneral`].
#[derive(Clone, Debug)]
pub struct SparseDirect {
    pivot_tolerance: f64,
    size: usize,
    factor: Option<SparseFactor>,
}

impl Default for SparseDirect {
    fn default() -> Self {
        Self::new(PIVOT_TOLERANCE)
    }
}

impl SparseDirect {
    /// Sparse backend rejecting pivot ratios below `pivot_tolerance`.
    #[must_use]
    pub fn new(pivot_tolerance: f64) -> Self {
        Self {
            pivot_tolerance,
            size: 0,
            factor: None,
        }
    }

    /// Return `true` when the last factorization fell back to dense LU.
    #[must_use]
    pub fn is_dense_fallback(&self) -> bool {
        matches!(self.factor, Some(SparseFactor::Dense(_)))
    }
}

impl LinearSolver for SparseDirect {
    fn name(&self) -> &'static str {
        "SparseDirect"
    }

    fn set_matrix(&mut self, matrix: &CooMatrix<f64>) -> Result<(), SolverError> {
        let size = check_square(self.name(), matrix)?;
        self.factor = None;
        self.size = size;
        if size == 0 {
            return Ok(());
        }
        let csc = CscMatrix::from(matrix);
        let cholesky = if is_symmetric_csc(&csc, SYMMETRY_TOLERANCE) {
            CscCholesky::factor(&csc).ok()
        } else {
            None
        };
        let factor = match cholesky {
            Some(cholesky) => {
                let diagonal = cholesky
                    .l()
                    .triplet_iter()
                    .filter(|(row, col, _)| row == col)
                    .map(|(_, _, value)| value * value);
                let ratio = pivot_ratio(diagonal);
                if ratio < self.pivot_tolerance {
                    return Err(SolverError::Singular {
                        solver: self.name(),
                        pivot_ratio: ratio,
                    });
                }
                SparseFactor::Cholesky(cholesky)
            }
            None => SparseFactor::Dense(dense_lu(
                self.name(),
                DMatrix::from(&csc),
                self.pivot_tolerance,
            )?),
        };
        self.factor = Some(factor);
        Ok(())
    }

    fn solve(&self, rhs: &Vector) -> Result<Vector, SolverError> {
        check_rhs(self.name(), self.size, rhs)?;
        if self.size == 0 {
            return Ok(Vector::zeros(0));
        }
        match self.factor.as_ref().ok_or(SolverError::NotFactored(self.name()))? {
            SparseFactor::Cholesky(cholesky) => {
                let b = DMatrix::from_column_slice(rhs.len(), 1, rhs.as_slice());
                let x = cholesky.solve(&b);
                Ok(Vector::from_column_slice(x.as_slice()))
            }
            SparseFactor::Dense(lu) => lu_solve(self.name(), lu, rhs),
        }
    }

    fn size(&self) -> usize {
        self.size
    }
}

/// Inversion of a diagonal matrix, for explicit integration with lumped mass.
#[derive(Clone, Debug)]
pub struct Diagonal {
    pivot_tolerance: f64,
    inverse: Option<Vector>,
}

impl Default for Diagonal {
    fn default() -> Self {
        Self::new(PIVOT_TOLERANCE)
    }
}

impl Diagonal {
    /// Diagonal backend rejecting pivot ratios below `pivot_tolerance`.
    #[must_use]
    pub fn new(pivot_tolerance: f64) -> Self {
        Self {
            pivot_tolerance,
            inverse: None,
        }
    }
}

impl LinearSolver for Diagonal {
    fn name(&self) -> &'static str {
        "Diagonal"
    }

    fn supports(&self, category: IntegratorCategory) -> bool {
        category == IntegratorCategory::ExplicitDynamic
    }

    fn set_matrix(&mut self, matrix: &CooMatrix<f64>) -> Result<(), SolverError> {
        let size = check_square(self.name(), matrix)?;
        self.inverse = None;
        let csr = CsrMatrix::from(matrix);
        let mut diagonal = Vector::zeros(size);
        for (row, col, &value) in csr.triplet_iter() {
            if row == col {
                diagonal[row] = value;
            } else if value != 0.0 {
                return Err(SolverError::NotDiagonal {
                    solver: self.name(),
                    row,
                    col,
                });
            }
        }
        if size > 0 {
            let ratio = pivot_ratio(diagonal.iter().copied());
            if ratio < self.pivot_tolerance {
                return Err(SolverError::Singular {
                    solver: self.name(),
                    pivot_ratio: ratio,
                });
            }
        }
        self.inverse = Some(diagonal.map(|value| 1.0 / value));
        Ok(())
    }

    fn solve(&self, rhs: &Vector) -> Result<Vector, SolverError> {
        let inverse = self.inverse.as_ref().ok_or(SolverError::NotFactored(self.name()))?;
        check_rhs(self.name(), inverse.len(), rhs)?;
        Ok(inverse.component_mul(rhs))
    }

    fn size(&self) -> usize {
        self.inverse.as_ref().map_or(0, Vector::len)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn spd() -> CooMatrix<f64> {
        let mut matrix = CooMatrix::new(3, 3);
        for (i, j, value) in [
            (0, 0, 4.0),
            (0, 1, -1.0),
            (1, 0, -1.0),
            (1, 1, 4.0),
            (1, 2, -1.0),
            (2, 1, -1.0),
            (2, 2, 2.0),
            (2, 2, 2.0),
        ] {
            matrix.push(i, j, value);
        }
        matrix
    }

    #[test]
    fn dense_and_sparse_backends_agree() {
        let rhs = Vector::from_vec(vec![1.0, 2.0, 3.0]);
        let mut dense = FullGeneral::default();
        dense.set_matrix(&spd()).expect("regular matrix");
        let mut sparse = SparseDirect::default();
        sparse.set_matrix(&spd()).expect("regular matrix");
        assert!(!sparse.is_dense_fallback());

        let expected = dense.solve(&rhs).expect("factored");
        let actual = sparse.solve(&rhs).expect("factored");
        assert_relative_eq!(expected, actual, epsilon = 1.0e-12);
        assert_relative_eq!(DMatrix::from(&spd()) * actual, rhs, epsilon = 1.0e-12);
    }

    #[test]
    fn indefinite_matrices_fall_back_to_lu() {
        let mut matrix = CooMatrix::new(2, 2);
        matrix.push(0, 1, 1.0);
        matrix.push(1, 0, 1.0);
        let mut sparse = SparseDirect::default();
        sparse.set_matrix(&matrix).expect("regular matrix");
        assert!(sparse.is_dense_fallback());
        let x = sparse.solve(&Vector::from_vec(vec![3.0, 5.0])).expect("factored");
        assert_relative_eq!(x, Vector::from_vec(vec![5.0, 3.0]));
    }

    #[test]
    fn unsymmetric_matrices_bypass_cholesky() {
        // Cholesky reads one triangle only and would solve the symmetric [[4, -1], [-1, 4]].
        let mut matrix = CooMatrix::new(2, 2);
        for (i, j, value) in [(0, 0, 4.0), (0, 1, 1.0), (1, 0, -1.0), (1, 1, 4.0)] {
            matrix.push(i, j, value);
        }
        let rhs = Vector::from_vec(vec![1.0, 0.0]);
        let mut dense = FullGeneral::default();
        dense.set_matrix(&matrix).expect("regular matrix");
        let mut sparse = SparseDirect::default();
        sparse.set_matrix(&matrix).expect("regular matrix");
        assert!(sparse.is_dense_fallback());

        let x = sparse.solve(&rhs).expect("factored");
        assert_relative_eq!(x, Vector::from_vec(vec![4.0 / 17.0, 1.0 / 17.0]), epsilon = 1.0e-12);
        assert_relative_eq!(x, dense.solve(&rhs).expect("factored"), epsilon = 1.0e-12);
    }

    #[test]
    fn singular_matrices_are_reported() {
        let mut matrix = CooMatrix::new(2, 2);
        for (i, j) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            matrix.push(i, j, 1.0);
        }
        let error = FullGeneral::default().set_matrix(&matrix).expect_err("singular");
        assert!(matches!(error, SolverError::Singular { .. }));
        let error = SparseDirect::default().set_matrix(&matrix).expect_err("singular");
        assert!(matches!(error, SolverError::Singular { .. }));
    }

    #[test]
    fn size_mismatch_and_missing_factorization_are_distinct() {
        let mut solver = FullGeneral::default();
        assert_eq!(
            solver.solve(&Vector::zeros(0)),
            Ok(Vector::zeros(0))
        );
        solver.set_matrix(&spd()).expect("regular matrix");
        assert_eq!(
            solver.solve(&Vector::zeros(2)),
            Err(SolverError::SizeMismatch {
                solver: "FullGeneral",
                size: 3,
                rhs: 2
            })
        );
        assert_eq!(
            Diagonal::default().solve(&Vector::zeros(1)),
            Err(SolverError::NotFactored("Diagonal"))
        );
        assert!(matches!(
            solver.set_matrix(&CooMatrix::new(2, 3)),
            Err(SolverError::NotSquare { .. })
        ));
    }

    #[test]
    fn diagonal_backend_rejects_coupling() {
        let mut solver = Diagonal::default();
        assert!(solver.supports(IntegratorCategory::ExplicitDynamic));
        assert!(!solver.supports(IntegratorCategory::Static));
        assert_eq!(
            solver.set_matrix(&spd()),
            Err(SolverError::NotDiagonal {
                solver: "Diagonal",
                row: 0,
                col: 1
            })
        );

        let mut mass = CooMatrix::new(2, 2);
        mass.push(0, 0, 2.0);
        mass.push(1, 1, 4.0);
        solver.set_matrix(&mass).expect("diagonal matrix");
        let x = solver.solve(&Vector::from_vec(vec![1.0, 1.0])).expect("factored");
        assert_eq!(x, Vector::from_vec(vec![0.5, 0.25]));
    }
}
