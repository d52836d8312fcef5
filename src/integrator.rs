//! Integrators: how a load or time increment becomes an effective system.

use std::collections::HashMap;
use std::fmt;

use crate::analysis::SolutionContext;
use crate::containers::Vector;
use crate::errors::{AnalysisError, ConfigError};
use crate::node::NodeTag;

mod central_difference;
mod displacement_control;
mod load_control;
mod newmark;

pub use central_difference::CentralDifference;
pub use displacement_control::DisplacementControl;
pub use load_control::{AdaptiveIncrement, LoadControl};
pub use newmark::Newmark;

/// Broad family of an integrator, used to check strategy compatibility.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntegratorCategory {
    /// Quasi-static stepping in pseudo-time.
    Static,
    /// Implicit time integration, iterated to equilibrium.
    ImplicitDynamic,
    /// Explicit time integration, one direct evaluation per step.
    ExplicitDynamic,
}

/// Factors of the effective matrix `stiffness * K_t + damping * C + mass * M`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coefficients {
    /// Factor of the tangent stiffness.
    pub stiffness: f64,
    /// Factor of the Rayleigh damping matrix.
    pub damping: f64,
    /// Factor of the mass matrix.
    pub mass: f64,
}

impl Coefficients {
    /// Tangent stiffness only.
    pub const STATIC: Self = Self {
        stiffness: 1.0,
        damping: 0.0,
        mass: 0.0,
    };

    /// Mass matrix only.
    pub const MASS: Self = Self {
        stiffness: 0.0,
        damping: 0.0,
        mass: 1.0,
    };
}

/// Portion of an analysis step attempted at once.
///
/// `fraction` is one for a full step and smaller after cutbacks; `dt` is
/// already scaled by it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Increment {
    /// Time step of the attempt.
    pub dt: f64,
    /// Share of the nominal step covered by the attempt.
    pub fraction: f64,
}

/// Strategy advancing the domain from one committed state to the next.
pub trait Integrator: fmt::Debug + Send {
    /// Short name of the integrator.
    fn name(&self) -> &'static str;

    /// Family of the integrator.
    fn category(&self) -> IntegratorCategory;

    /// Check the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] for inadmissible parameters.
    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Prepare for a freshly numbered domain.
    ///
    /// # Errors
    ///
    /// Returns an [`AnalysisError`] when the domain cannot be integrated.
    fn initialize(&mut self, _ctx: &mut SolutionContext<'_>) -> Result<(), AnalysisError> {
        Ok(())
    }

    /// Factors of the effective matrix for the current increment.
    fn coefficients(&self) -> Coefficients;

    /// Apply loads and predict the trial state for a new increment.
    ///
    /// # Errors
    ///
    /// Returns an [`AnalysisError`] when the increment cannot be started.
    fn new_step(
        &mut self,
        ctx: &mut SolutionContext<'_>,
        increment: Increment,
    ) -> Result<(), AnalysisError>;

    /// Apply a solution of the effective system to the trial state and
    /// return the displacement increment actually applied.
    ///
    /// # Errors
    ///
    /// Returns an [`AnalysisError`] when the solution cannot be applied.
    fn update(
        &mut self,
        ctx: &mut SolutionContext<'_>,
        delta: &Vector,
    ) -> Result<Vector, AnalysisError>;

    /// Record a converged increment that took `iterations` iterations.
    fn commit(&mut self, _iterations: usize) {}

    /// Forget the increment in progress.
    fn revert(&mut self) {}
}

/// Acceleration correction restoring equilibrium `M a = F_ext - F_int - C v`
/// at the current trial state.
pub(crate) fn equilibrium_acceleration(
    ctx: &mut SolutionContext<'_>,
) -> Result<HashMap<NodeTag, Vector>, AnalysisError> {
    ctx.form_tangent(Coefficients::MASS)?;
    let residual = ctx.form_unbalance()?;
    let correction = ctx.solve(&residual)?;
    ctx.recover(&correction)
}

fn invalid(component: &'static str, parameter: &'static str, value: f64) -> ConfigError {
    ConfigError::InvalidParameter {
        component,
        parameter,
        value,
    }
}

fn require_time_step(dt: f64) -> Result<(), AnalysisError> {
    if dt > 0.0 && dt.is_finite() {
        Ok(())
    } else {
        Err(AnalysisError::InvalidTimeStep(dt))
    }
}
