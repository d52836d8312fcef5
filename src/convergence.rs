//! Convergence tests closing the equilibrium iteration.

use serde::{Deserialize, Serialize};

use crate::config::Verbosity;
use crate::containers::Vector;
use crate::errors::{AnalysisError, ConfigError};

/// Scalar measured by a [`ConvergenceTest`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormKind {
    /// Euclidean norm of the unbalanced force after the update.
    NormUnbalance,
    /// Euclidean norm of the displacement increment.
    NormDispIncr,
    /// `|du . R|` with `R` the right-hand side that produced `du`.
    EnergyIncr,
}

/// Quantities available to a convergence test after one update.
#[derive(Clone, Copy, Debug)]
pub struct IterationState<'a> {
    /// Displacement increment applied by the update.
    pub increment: &'a Vector,
    /// Right-hand side solved for the increment.
    pub residual: &'a Vector,
    /// Unbalanced force at the updated trial state.
    pub unbalance: &'a Vector,
}

/// Convergence predicate with an iteration cap.
///
/// # Examples
/// ```
/// use equilibria::convergence::{ConvergenceTest, NormKind};
///
/// let mut test = ConvergenceTest::new(NormKind::NormUnbalance, 1.0e-8, 10);
/// test.start();
/// assert_eq!(test.check(1.0), Ok(false));
/// assert_eq!(test.check(1.0e-9), Ok(true));
/// assert_eq!(test.iteration_count(), 2);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct ConvergenceTest {
    kind: NormKind,
    tolerance: f64,
    max_iterations: usize,
    verbosity: Verbosity,
    norms: Vec<f64>,
}

impl ConvergenceTest {
    /// Test of `kind` accepting norms up to `tolerance` within `max_iterations`.
    #[must_use]
    pub fn new(kind: NormKind, tolerance: f64, max_iterations: usize) -> Self {
        Self {
            kind,
            tolerance,
            max_iterations,
            verbosity: Verbosity::Silent,
            norms: Vec::new(),
        }
    }

    /// Print every iteration norm when `verbosity` asks for it.
    pub fn set_verbosity(&mut self, verbosity: Verbosity) {
        self.verbosity = verbosity;
    }

    /// Measured scalar.
    #[must_use]
    pub fn kind(&self) -> NormKind {
        self.kind
    }

    /// Largest accepted norm.
    #[must_use]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Iteration cap.
    #[must_use]
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Iterations checked since [`ConvergenceTest::start`].
    #[must_use]
    pub fn iteration_count(&self) -> usize {
        self.norms.len()
    }

    /// Norms checked since [`ConvergenceTest::start`].
    #[must_use]
    pub fn norms(&self) -> &[f64] {
        &self.norms
    }

    /// Check the tolerance and the iteration cap.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] for a negative or non-finite
    /// tolerance and for a zero iteration cap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tolerance < 0.0 || !self.tolerance.is_finite() {
            return Err(ConfigError::InvalidParameter {
                component: "ConvergenceTest",
                parameter: "tolerance",
                value: self.tolerance,
            });
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidParameter {
                component: "ConvergenceTest",
                parameter: "max_iterations",
                value: 0.0,
            });
        }
        Ok(())
    }

    /// Reset the history at the beginning of an increment.
    pub fn start(&mut self) {
        self.norms.clear();
    }

    /// Evaluate the measured scalar.
    #[must_use]
    pub fn norm(&self, state: &IterationState<'_>) -> f64 {
        match self.kind {
            NormKind::NormUnbalance => state.unbalance.norm(),
            NormKind::NormDispIncr => state.increment.norm(),
            NormKind::EnergyIncr => state.increment.dot(state.residual).abs(),
        }
    }

    /// Record `norm` and report whether it meets the tolerance.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::NonFinite`] for a NaN or infinite norm and
    /// [`AnalysisError::NotConverged`] when the cap is reached without success.
    pub fn check(&mut self, norm: f64) -> Result<bool, AnalysisError> {
        self.norms.push(norm);
        let iteration = self.norms.len();
        if self.verbosity >= Verbosity::Iteration {
            eprintln!(
                "{:?}: iteration {iteration}, norm {norm:e} (tolerance {:e})",
                self.kind, self.tolerance
            );
        }
        if !norm.is_finite() {
            return Err(AnalysisError::NonFinite);
        }
        if norm <= self.tolerance {
            return Ok(true);
        }
        if iteration >= self.max_iterations {
            return Err(AnalysisError::NotConverged {
                iterations: iteration,
                norm,
                tolerance: self.tolerance,
            });
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn norms_measure_their_quantity() {
        let increment = Vector::from_vec(vec![3.0, 4.0]);
        let residual = Vector::from_vec(vec![1.0, -2.0]);
        let unbalance = Vector::from_vec(vec![0.0, 2.0]);
        let state = IterationState {
            increment: &increment,
            residual: &residual,
            unbalance: &unbalance,
        };
        assert_eq!(ConvergenceTest::new(NormKind::NormDispIncr, 1.0, 1).norm(&state), 5.0);
        assert_eq!(ConvergenceTest::new(NormKind::NormUnbalance, 1.0, 1).norm(&state), 2.0);
        assert_eq!(ConvergenceTest::new(NormKind::EnergyIncr, 1.0, 1).norm(&state), 5.0);
    }

    #[test]
    fn reaching_the_cap_is_a_failure() {
        let mut test = ConvergenceTest::new(NormKind::NormUnbalance, 1.0e-12, 3);
        test.start();
        assert_eq!(test.check(1.0), Ok(false));
        assert_eq!(test.check(0.5), Ok(false));
        assert_eq!(
            test.check(0.25),
            Err(AnalysisError::NotConverged {
                iterations: 3,
                norm: 0.25,
                tolerance: 1.0e-12
            })
        );
        assert_eq!(test.norms(), &[1.0, 0.5, 0.25]);
    }

    #[test]
    fn non_finite_norms_never_converge() {
        let mut test = ConvergenceTest::new(NormKind::NormDispIncr, 1.0, 10);
        assert_eq!(test.check(f64::NAN), Err(AnalysisError::NonFinite));
        test.start();
        assert_eq!(test.iteration_count(), 0);
    }
}
