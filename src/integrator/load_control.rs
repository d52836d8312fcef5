use serde::{Deserialize, Serialize};

use super::{invalid, Coefficients, Increment, Integrator, IntegratorCategory};
use crate::analysis::{FRACTION_TOLERANCE, SolutionContext};
use crate::containers::Vector;
use crate::errors::{AnalysisError, ConfigError};

/// Rule adjusting the load increment to the iterations of the previous step.
///
/// After each step the increment is scaled by `desired_iterations / iterations`
/// and its magnitude clamped to `[min, max]`. A step split by cutbacks is
/// rescaled once, with the iterations of all its portions.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveIncrement {
    /// Iterations per step the increment aims for.
    pub desired_iterations: usize,
    /// Smallest increment magnitude.
    pub min: f64,
    /// Largest increment magnitude.
    pub max: f64,
}

/// Static stepping that increases the load factor by a fixed or adaptive amount.
///
/// The load factor is the pseudo-time of the domain, so patterns with a linear
/// series scale their loads by it.
///
/// # Examples
/// ```
/// use equilibria::integrator::{AdaptiveIncrement, Integrator, LoadControl};
///
/// let control = LoadControl::new(0.1).with_adaptive(AdaptiveIncrement {
///     desired_iterations: 4,
///     min: 0.01,
///     max: 0.5,
/// });
/// assert!(control.validate().is_ok());
/// assert_eq!(control.increment(), 0.1);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct LoadControl {
    current: f64,
    adaptive: Option<AdaptiveIncrement>,
    portion: f64,
    covered: f64,
    iterations: usize,
}

impl LoadControl {
    /// Load control with a constant increment.
    #[must_use]
    pub fn new(increment: f64) -> Self {
        Self {
            current: increment,
            adaptive: None,
            portion: 1.0,
            covered: 0.0,
            iterations: 0,
        }
    }

    /// Enable adaptive increments.
    #[must_use]
    pub fn with_adaptive(mut self, adaptive: AdaptiveIncrement) -> Self {
        self.adaptive = Some(adaptive);
        self
    }

    /// Increment used by the next step.
    #[must_use]
    pub fn increment(&self) -> f64 {
        self.current
    }
}

impl Integrator for LoadControl {
    fn name(&self) -> &'static str {
        "LoadControl"
    }

    fn category(&self) -> IntegratorCategory {
        IntegratorCategory::Static
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.current == 0.0 || !self.current.is_finite() {
            return Err(invalid(self.name(), "increment", self.current));
        }
        if let Some(adaptive) = self.adaptive {
            if adaptive.desired_iterations == 0 {
                return Err(invalid(self.name(), "desired_iterations", 0.0));
            }
            if adaptive.min <= 0.0 {
                return Err(invalid(self.name(), "min", adaptive.min));
            }
            if adaptive.max < adaptive.min {
                return Err(invalid(self.name(), "max", adaptive.max));
            }
        }
        Ok(())
    }

    fn coefficients(&self) -> Coefficients {
        Coefficients::STATIC
    }

    fn new_step(
        &mut self,
        ctx: &mut SolutionContext<'_>,
        increment: Increment,
    ) -> Result<(), AnalysisError> {
        self.portion = increment.fraction;
        let time = ctx.domain().committed_time() + self.current * increment.fraction;
        ctx.advance_to(time)
    }

    fn update(
        &mut self,
        ctx: &mut SolutionContext<'_>,
        delta: &Vector,
    ) -> Result<Vector, AnalysisError> {
        ctx.apply_increment(delta, 0.0, 0.0)?;
        Ok(delta.clone())
    }

    fn commit(&mut self, iterations: usize) {
        self.covered += std::mem::replace(&mut self.portion, 1.0);
        self.iterations += iterations;
        if 1.0 - self.covered > FRACTION_TOLERANCE {
            return;
        }
        let iterations = std::mem::take(&mut self.iterations);
        self.covered = 0.0;
        if let Some(adaptive) = self.adaptive {
            #[allow(clippy::cast_precision_loss)]
            let factor = adaptive.desired_iterations as f64 / iterations.max(1) as f64;
            let magnitude = (self.current.abs() * factor).clamp(adaptive.min, adaptive.max);
            self.current = magnitude.copysign(self.current);
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn adaptive_increment_follows_iteration_count() {
        let mut control = LoadControl::new(0.1).with_adaptive(AdaptiveIncrement {
            desired_iterations: 4,
            min: 0.05,
            max: 0.3,
        });
        control.commit(2);
        assert_relative_eq!(control.increment(), 0.2);
        control.commit(2);
        assert_relative_eq!(control.increment(), 0.3);
        control.commit(40);
        assert_relative_eq!(control.increment(), 0.05);
    }

    #[test]
    fn cut_steps_adapt_once_with_all_their_iterations() {
        let mut control = LoadControl::new(0.1).with_adaptive(AdaptiveIncrement {
            desired_iterations: 4,
            min: 0.01,
            max: 1.0,
        });
        control.portion = 0.5;
        control.commit(2);
        assert_relative_eq!(control.increment(), 0.1);
        control.portion = 0.5;
        control.commit(6);
        assert_relative_eq!(control.increment(), 0.05);
        control.commit(4);
        assert_relative_eq!(control.increment(), 0.05);
    }

    #[test]
    fn unloading_keeps_its_sign() {
        let mut control = LoadControl::new(-0.1).with_adaptive(AdaptiveIncrement {
            desired_iterations: 1,
            min: 0.01,
            max: 1.0,
        });
        control.commit(2);
        assert_relative_eq!(control.increment(), -0.05);
    }

    #[test]
    fn zero_increment_is_rejected() {
        assert_eq!(
            LoadControl::new(0.0).validate(),
            Err(ConfigError::InvalidParameter {
                component: "LoadControl",
                parameter: "increment",
                value: 0.0
            })
        );
    }

    #[test]
    fn fixed_increment_is_unchanged_by_commits() {
        let mut control = LoadControl::new(0.25);
        control.commit(7);
        assert_eq!(control.increment(), 0.25);
        assert_eq!(control.coefficients(), Coefficients::STATIC);
    }
}
