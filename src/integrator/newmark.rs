use std::collections::HashMap;

use super::{
    equilibrium_acceleration, invalid, require_time_step, Coefficients, Increment, Integrator,
    IntegratorCategory,
};
use crate::analysis::SolutionContext;
use crate::containers::Vector;
use crate::errors::{AnalysisError, ConfigError};
use crate::node::Kinematics;

/// Implicit Newmark-beta time integration.
///
/// Each step starts from a constant displacement predictor; the effective
/// matrix is `K_t + gamma / (beta dt) C + 1 / (beta dt^2) M`. On the first step
/// the committed acceleration is corrected to satisfy equilibrium when the
/// mass matrix is regular.
///
/// # Examples
/// ```
/// use equilibria::integrator::Newmark;
///
/// assert!(Newmark::average_acceleration().is_unconditionally_stable());
/// assert!(!Newmark::linear_acceleration().is_unconditionally_stable());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Newmark {
    beta: f64,
    gamma: f64,
    dt: f64,
}

impl Newmark {
    /// Newmark integrator with parameters `beta` and `gamma`.
    #[must_use]
    pub fn new(beta: f64, gamma: f64) -> Self {
        Self {
            beta,
            gamma,
            dt: 0.0,
        }
    }

    /// Constant average acceleration (trapezoidal rule), `beta = 1/4`, `gamma = 1/2`.
    #[must_use]
    pub fn average_acceleration() -> Self {
        Self::new(0.25, 0.5)
    }

    /// Linear acceleration, `beta = 1/6`, `gamma = 1/2`.
    #[must_use]
    pub fn linear_acceleration() -> Self {
        Self::new(1.0 / 6.0, 0.5)
    }

    /// Parameter `beta`.
    #[must_use]
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Parameter `gamma`.
    #[must_use]
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Return `true` for `gamma >= 1/2` and `beta >= gamma / 2`.
    #[must_use]
    pub fn is_unconditionally_stable(&self) -> bool {
        self.gamma >= 0.5 && self.beta >= 0.5 * self.gamma
    }

    fn predict(&self, committed: &Kinematics, correction: Option<&Vector>) -> Kinematics {
        let (beta, gamma, dt) = (self.beta, self.gamma, self.dt);
        let mut acceleration = committed.acceleration.clone();
        if let Some(correction) = correction {
            acceleration += correction;
        }
        let velocity = &committed.velocity;
        Kinematics {
            displacement: committed.displacement.clone(),
            velocity: velocity * (1.0 - gamma / beta)
                + &acceleration * (dt * (1.0 - 0.5 * gamma / beta)),
            acceleration: velocity * (-1.0 / (beta * dt))
                + &acceleration * (1.0 - 0.5 / beta),
        }
    }
}

impl Integrator for Newmark {
    fn name(&self) -> &'static str {
        "Newmark"
    }

    fn category(&self) -> IntegratorCategory {
        IntegratorCategory::ImplicitDynamic
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.beta <= 0.0 || !self.beta.is_finite() {
            return Err(invalid(self.name(), "beta", self.beta));
        }
        if self.gamma <= 0.0 || !self.gamma.is_finite() {
            return Err(invalid(self.name(), "gamma", self.gamma));
        }
        Ok(())
    }

    fn coefficients(&self) -> Coefficients {
        let (beta, gamma, dt) = (self.beta, self.gamma, self.dt);
        Coefficients {
            stiffness: 1.0,
            damping: gamma / (beta * dt),
            mass: 1.0 / (beta * dt * dt),
        }
    }

    fn new_step(
        &mut self,
        ctx: &mut SolutionContext<'_>,
        increment: Increment,
    ) -> Result<(), AnalysisError> {
        require_time_step(increment.dt)?;
        self.dt = increment.dt;
        let start = ctx.domain().committed_time();
        let correction = if ctx.domain().commit_count() == 0 {
            ctx.advance_to(start)?;
            match equilibrium_acceleration(ctx) {
                Ok(correction) => correction,
                Err(AnalysisError::Solver(_)) => HashMap::new(),
                Err(error) => return Err(error),
            }
        } else {
            HashMap::new()
        };
        ctx.domain_mut()
            .predict_kinematics(|node| self.predict(node.committed(), correction.get(&node.tag())));
        ctx.advance_to(start + increment.dt)
    }

    fn update(
        &mut self,
        ctx: &mut SolutionContext<'_>,
        delta: &Vector,
    ) -> Result<Vector, AnalysisError> {
        let coefficients = self.coefficients();
        ctx.apply_increment(delta, coefficients.damping, coefficients.mass)?;
        Ok(delta.clone())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn effective_coefficients() {
        let mut newmark = Newmark::average_acceleration();
        newmark.dt = 0.1;
        let coefficients = newmark.coefficients();
        assert_relative_eq!(coefficients.stiffness, 1.0);
        assert_relative_eq!(coefficients.damping, 20.0);
        assert_relative_eq!(coefficients.mass, 400.0);
    }

    #[test]
    fn predictor_keeps_displacement() {
        let mut newmark = Newmark::average_acceleration();
        newmark.dt = 0.5;
        let committed = Kinematics {
            displacement: Vector::from_vec(vec![1.0]),
            velocity: Vector::from_vec(vec![2.0]),
            acceleration: Vector::from_vec(vec![4.0]),
        };
        let predicted = newmark.predict(&committed, None);
        assert_relative_eq!(predicted.displacement[0], 1.0);
        assert_relative_eq!(predicted.velocity[0], -2.0);
        assert_relative_eq!(predicted.acceleration[0], -20.0);
    }

    #[test]
    fn parameters_are_validated() {
        assert!(Newmark::new(0.0, 0.5).validate().is_err());
        assert!(Newmark::new(0.25, -0.5).validate().is_err());
        assert!(Newmark::new(0.3025, 0.6).is_unconditionally_stable());
        assert!(!Newmark::new(0.25, 0.4).is_unconditionally_stable());
    }
}
