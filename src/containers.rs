//! Numeric containers exchanged between the model and the solution strategies.
//!
//! Dense data travels as nalgebra vectors and matrices; assembled global
//! matrices travel as coordinate (triplet) matrices so that each backend can
//! convert them into the storage it prefers.

use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::{CooMatrix, CscMatrix};

/// Dynamically sized vector of reals.
pub type Vector = DVector<f64>;

/// Dynamically sized dense matrix of reals.
pub type Matrix = DMatrix<f64>;

/// Multiply a coordinate matrix with a dense vector, summing duplicate entries.
///
/// # Panics
///
/// Panics when `vector` does not have `matrix.ncols()` entries.
#[must_use]
pub fn coo_mul(matrix: &CooMatrix<f64>, vector: &Vector) -> Vector {
    assert_eq!(matrix.ncols(), vector.len(), "dimension mismatch");
    let mut product = Vector::zeros(matrix.nrows());
    for (row, col, value) in matrix.triplet_iter() {
        product[row] += value * vector[col];
    }
    product
}

/// Half bandwidth of a square matrix: the largest `|row - col|` over its non-zero entries.
#[must_use]
pub fn bandwidth(matrix: &CooMatrix<f64>) -> usize {
    matrix
        .triplet_iter()
        .filter(|(_, _, value)| **value != 0.0)
        .map(|(row, col, _)| row.abs_diff(col))
        .max()
        .unwrap_or(0)
}

/// Return `true` when `matrix` is square and symmetric within `tolerance`
/// relative to its largest entry.
#[must_use]
pub fn is_symmetric(matrix: &Matrix, tolerance: f64) -> bool {
    if !matrix.is_square() {
        return false;
    }
    let scale = matrix.amax().max(f64::MIN_POSITIVE);
    let n = matrix.nrows();
    (0..n).all(|row| {
        (row + 1..n).all(|col| (matrix[(row, col)] - matrix[(col, row)]).abs() <= tolerance * scale)
    })
}

/// Sparse counterpart of [`is_symmetric`]; entries missing on one side count as zero.
#[must_use]
pub fn is_symmetric_csc(matrix: &CscMatrix<f64>, tolerance: f64) -> bool {
    if matrix.nrows() != matrix.ncols() {
        return false;
    }
    let scale = matrix
        .values()
        .iter()
        .fold(f64::MIN_POSITIVE, |scale, value| scale.max(value.abs()));
    matrix.triplet_iter().all(|(row, col, &value)| {
        let mirror = matrix.get_entry(col, row).map_or(0.0, |entry| entry.into_value());
        (value - mirror).abs() <= tolerance * scale
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_product_sums_duplicates() {
        let mut matrix = CooMatrix::new(2, 2);
        matrix.push(0, 0, 1.0);
        matrix.push(0, 0, 1.0);
        matrix.push(1, 0, 3.0);
        let product = coo_mul(&matrix, &Vector::from_vec(vec![2.0, 5.0]));
        assert_eq!(product, Vector::from_vec(vec![4.0, 6.0]));
    }

    #[test]
    fn bandwidth_ignores_explicit_zeros() {
        let mut matrix = CooMatrix::new(4, 4);
        matrix.push(0, 3, 0.0);
        matrix.push(1, 2, 1.0);
        matrix.push(2, 2, 1.0);
        assert_eq!(bandwidth(&matrix), 1);
    }

    #[test]
    fn symmetry_check_is_relative() {
        let symmetric = Matrix::from_row_slice(2, 2, &[1.0e9, 2.0, 2.0 + 1.0e-6, 1.0]);
        assert!(is_symmetric(&symmetric, 1.0e-12));
        let skew = Matrix::from_row_slice(2, 2, &[1.0, 2.0, -2.0, 1.0]);
        assert!(!is_symmetric(&skew, 1.0e-12));
    }

    #[test]
    fn sparse_symmetry_sees_one_sided_entries() {
        let mut matrix = CooMatrix::new(3, 3);
        matrix.push(0, 0, 4.0);
        matrix.push(0, 2, 1.0);
        matrix.push(2, 0, 0.5);
        matrix.push(2, 0, 0.5);
        assert!(is_symmetric_csc(&CscMatrix::from(&matrix), 1.0e-12));

        matrix.push(1, 2, -1.0);
        assert!(!is_symmetric_csc(&CscMatrix::from(&matrix), 1.0e-12));
    }
}
