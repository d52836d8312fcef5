//! Solution algorithms: the update rule of the equilibrium iteration.

use std::fmt;

use crate::analysis::SolutionContext;
use crate::containers::{Matrix, Vector};
use crate::convergence::{ConvergenceTest, IterationState};
use crate::errors::{AnalysisError, ConfigError};
use crate::integrator::Integrator;

/// Result of a converged increment.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepOutcome {
    /// Iterations performed.
    pub iterations: usize,
    /// Last norm evaluated.
    pub norm: f64,
}

/// Strategy driving the iterations of one increment.
///
/// The integrator has already applied loads and predicted the trial state
/// when [`Algorithm::solve_step`] is called.
pub trait Algorithm: fmt::Debug + Send {
    /// Short name of the algorithm.
    fn name(&self) -> &'static str;

    /// Return `true` when the algorithm iterates until the test is satisfied.
    fn is_iterative(&self) -> bool {
        true
    }

    /// Check the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] for inadmissible parameters.
    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Drive the increment to equilibrium.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::NotConverged`] when the test fails within its
    /// cap and propagates assembly and solver failures.
    fn solve_step(
        &mut self,
        ctx: &mut SolutionContext<'_>,
        integrator: &mut dyn Integrator,
        test: &mut ConvergenceTest,
    ) -> Result<StepOutcome, AnalysisError>;
}

/// One solve per increment without equilibrium iterations.
///
/// Exact for linear problems; the test is evaluated for the record but never
/// rejects the step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Linear;

impl Algorithm for Linear {
    fn name(&self) -> &'static str {
        "Linear"
    }

    fn is_iterative(&self) -> bool {
        false
    }

    fn solve_step(
        &mut self,
        ctx: &mut SolutionContext<'_>,
        integrator: &mut dyn Integrator,
        test: &mut ConvergenceTest,
    ) -> Result<StepOutcome, AnalysisError> {
        ctx.form_tangent(integrator.coefficients())?;
        let residual = ctx.form_unbalance()?;
        let delta = ctx.solve(&residual)?;
        let increment = integrator.update(ctx, &delta)?;
        let unbalance = ctx.form_unbalance()?;
        let norm = test.norm(&IterationState {
            increment: &increment,
            residual: &residual,
            unbalance: &unbalance,
        });
        if !norm.is_finite() {
            return Err(AnalysisError::NonFinite);
        }
        Ok(StepOutcome {
            iterations: 1,
            norm,
        })
    }
}

/// Full Newton-Raphson: the tangent is formed at every iteration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NewtonRaphson;

impl Algorithm for NewtonRaphson {
    fn name(&self) -> &'static str {
        "NewtonRaphson"
    }

    fn solve_step(
        &mut self,
        ctx: &mut SolutionContext<'_>,
        integrator: &mut dyn Integrator,
        test: &mut ConvergenceTest,
    ) -> Result<StepOutcome, AnalysisError> {
        test.start();
        let mut residual = ctx.form_unbalance()?;
        loop {
            ctx.form_tangent(integrator.coefficients())?;
            let delta = ctx.solve(&residual)?;
            let increment = integrator.update(ctx, &delta)?;
            let unbalance = ctx.form_unbalance()?;
            let norm = test.norm(&IterationState {
                increment: &increment,
                residual: &residual,
                unbalance: &unbalance,
            });
            if test.check(norm)? {
                return Ok(StepOutcome {
                    iterations: test.iteration_count(),
                    norm,
                });
            }
            residual = unbalance;
        }
    }
}

/// Newton iteration with Krylov subspace acceleration.
///
/// The tangent is formed once per increment and again whenever the
/// subspace holds `max_dimension` corrections. Each new correction
/// `s = K^-1 R` is improved by the least-squares combination of earlier
/// increments `v_i` and the changes `dv_i = s_i - s_(i+1)` of the
/// preconditioned residual:
/// `c = argmin |dV c - s|`, `s += sum c_i (v_i - dv_i)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KrylovNewton {
    max_dimension: usize,
}

impl Default for KrylovNewton {
    fn default() -> Self {
        Self { max_dimension: 3 }
    }
}

impl KrylovNewton {
    /// Accelerator keeping at most `max_dimension` corrections.
    #[must_use]
    pub fn new(max_dimension: usize) -> Self {
        Self { max_dimension }
    }

    /// Largest subspace dimension.
    #[must_use]
    pub fn max_dimension(&self) -> usize {
        self.max_dimension
    }
}

/// Improve `correction` using the stored subspace.
fn accelerate(
    corrections: &[Vector],
    differences: &[Vector],
    correction: &Vector,
) -> Result<Vector, AnalysisError> {
    if differences.is_empty() {
        return Ok(correction.clone());
    }
    let basis = Matrix::from_columns(differences);
    let coefficients = basis
        .svd(true, true)
        .solve(correction, f64::EPSILON)
        .map_err(AnalysisError::Acceleration)?;
    let mut accelerated = correction.clone();
    for ((v, dv), c) in corrections.iter().zip(differences).zip(coefficients.iter()) {
        accelerated += (v - dv) * *c;
    }
    Ok(accelerated)
}

impl Algorithm for KrylovNewton {
    fn name(&self) -> &'static str {
        "KrylovNewton"
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_dimension == 0 {
            return Err(ConfigError::InvalidParameter {
                component: self.name(),
                parameter: "max_dimension",
                value: 0.0,
            });
        }
        Ok(())
    }

    fn solve_step(
        &mut self,
        ctx: &mut SolutionContext<'_>,
        integrator: &mut dyn Integrator,
        test: &mut ConvergenceTest,
    ) -> Result<StepOutcome, AnalysisError> {
        test.start();
        let mut corrections: Vec<Vector> = Vec::with_capacity(self.max_dimension);
        let mut differences: Vec<Vector> = Vec::with_capacity(self.max_dimension);
        let mut previous: Option<Vector> = None;
        let mut residual = ctx.form_unbalance()?;
        ctx.form_tangent(integrator.coefficients())?;
        loop {
            if corrections.len() >= self.max_dimension {
                corrections.clear();
                differences.clear();
                previous = None;
                ctx.form_tangent(integrator.coefficients())?;
            }
            let solved = ctx.solve(&residual)?;
            if let Some(last) = previous.take() {
                differences.push(last - &solved);
            }
            let delta = accelerate(&corrections, &differences, &solved)?;
            let increment = integrator.update(ctx, &delta)?;
            let unbalance = ctx.form_unbalance()?;
            let norm = test.norm(&IterationState {
                increment: &increment,
                residual: &residual,
                unbalance: &unbalance,
            });
            if test.check(norm)? {
                return Ok(StepOutcome {
                    iterations: test.iteration_count(),
                    norm,
                });
            }
            corrections.push(increment);
            previous = Some(solved);
            residual = unbalance;
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn empty_subspace_leaves_correction_unchanged() {
        let correction = Vector::from_vec(vec![1.0, 2.0]);
        let accelerated = accelerate(&[], &[], &correction).expect("trivial");
        assert_eq!(accelerated, correction);
    }

    #[test]
    fn secant_step_recovers_linear_solution() {
        // Fixed-point map x -> x + s(x) with s = b - 2x preconditioned by K = 1:
        // one secant update from x0 = 0 lands on the root x = b / 2.
        let first = Vector::from_vec(vec![1.0]);
        let second = Vector::from_vec(vec![-1.0]);
        let differences = vec![&first - &second];
        let accelerated =
            accelerate(&[first.clone()], &differences, &second).expect("regular subspace");
        assert_relative_eq!(&first + accelerated, Vector::from_vec(vec![0.5]), epsilon = 1.0e-12);
    }

    #[test]
    fn defaults() {
        assert_eq!(KrylovNewton::default().max_dimension(), 3);
        assert!(!Linear.is_iterative());
        assert!(NewtonRaphson.is_iterative());
        assert!(KrylovNewton::new(0).validate().is_err());
    }
}
