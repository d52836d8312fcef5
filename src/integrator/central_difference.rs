use nalgebra::linalg::SymmetricEigen;

use super::{
    equilibrium_acceleration, require_time_step, Coefficients, Increment, Integrator,
    IntegratorCategory,
};
use crate::analysis::SolutionContext;
use crate::containers::{Matrix, Vector};
use crate::errors::AnalysisError;
use crate::node::Kinematics;

/// Explicit central difference time integration.
///
/// Equilibrium is written at the start of each step and solved once for the
/// displacement at its end with the matrix `M / dt^2 + C / (2 dt)`. The
/// committed velocity and acceleration of a step are those of its start
/// instant. Time steps must stay below `2 / omega_max`, estimated once per
/// numbering from the lumped mass and the tangent stiffness.
///
/// The time step may change between steps: the previous half-step velocity is
/// rebuilt from the last committed increment and the step that produced it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CentralDifference {
    dt: f64,
    target: f64,
    critical: Option<f64>,
    committed_dt: Option<f64>,
}

impl CentralDifference {
    /// Central difference integrator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Largest stable time step, known once the analysis is initialized.
    #[must_use]
    pub fn critical_time_step(&self) -> Option<f64> {
        self.critical
    }
}

/// Largest stable time step `2 / omega_max` of the undamped system `M a + K u = 0`.
///
/// # Errors
///
/// Returns [`AnalysisError::MissingMass`] when an equation has no positive mass.
pub(crate) fn critical_time_step(stiffness: &Matrix, mass: &Matrix) -> Result<f64, AnalysisError> {
    let size = mass.nrows();
    let lumped = mass.diagonal();
    if let Some(equation) = lumped.iter().position(|&m| m <= 0.0 || m.is_nan()) {
        return Err(AnalysisError::MissingMass(equation));
    }
    let scale = lumped.map(|m| m.sqrt().recip());
    if size == 0 {
        return Ok(f64::INFINITY);
    }
    let scaled = Matrix::from_fn(size, size, |i, j| {
        0.5 * (stiffness[(i, j)] + stiffness[(j, i)]) * scale[i] * scale[j]
    });
    let eigen = SymmetricEigen::try_new(scaled, f64::EPSILON, 0)
        .ok_or(AnalysisError::StabilityEstimate)?;
    let omega_squared = eigen.eigenvalues.max();
    if omega_squared > 0.0 {
        Ok(2.0 / omega_squared.sqrt())
    } else {
        Ok(f64::INFINITY)
    }
}

impl Integrator for CentralDifference {
    fn name(&self) -> &'static str {
        "CentralDifference"
    }

    fn category(&self) -> IntegratorCategory {
        IntegratorCategory::ExplicitDynamic
    }

    fn initialize(&mut self, ctx: &mut SolutionContext<'_>) -> Result<(), AnalysisError> {
        let stiffness = ctx.assemble_dense(Coefficients::STATIC)?;
        let mass = ctx.assemble_dense(Coefficients::MASS)?;
        self.critical = Some(critical_time_step(&stiffness, &mass)?);
        Ok(())
    }

    fn coefficients(&self) -> Coefficients {
        Coefficients {
            stiffness: 0.0,
            damping: 0.5 / self.dt,
            mass: 1.0 / (self.dt * self.dt),
        }
    }

    fn new_step(
        &mut self,
        ctx: &mut SolutionContext<'_>,
        increment: Increment,
    ) -> Result<(), AnalysisError> {
        let dt = increment.dt;
        require_time_step(dt)?;
        if let Some(critical) = self.critical {
            if dt >= critical {
                return Err(AnalysisError::UnstableTimeStep { dt, critical });
            }
        }
        self.dt = dt;
        let start = ctx.domain().committed_time();
        self.target = start + dt;

        // Backward increment over `dt` equivalent to the last committed one.
        let rescale = self.committed_dt.map_or(1.0, |previous| dt / previous);
        let initial = if ctx.domain().commit_count() == 0 {
            ctx.advance_to(start)?;
            Some(equilibrium_acceleration(ctx)?)
        } else {
            None
        };
        ctx.domain_mut().predict_kinematics(|node| {
            let committed = node.committed();
            let previous = match initial.as_ref() {
                Some(corrections) => {
                    let mut acceleration = committed.acceleration.clone();
                    if let Some(correction) = corrections.get(&node.tag()) {
                        acceleration += correction;
                    }
                    &committed.velocity * dt - acceleration * (0.5 * dt * dt)
                }
                None => node.last_increment() * rescale,
            };
            Kinematics {
                displacement: committed.displacement.clone(),
                velocity: &previous * (0.5 / dt),
                acceleration: previous * (-1.0 / (dt * dt)),
            }
        });
        ctx.advance_to(start)
    }

    fn update(
        &mut self,
        ctx: &mut SolutionContext<'_>,
        delta: &Vector,
    ) -> Result<Vector, AnalysisError> {
        let coefficients = self.coefficients();
        ctx.apply_increment(delta, coefficients.damping, coefficients.mass)?;
        ctx.domain_mut().apply_load(self.target)?;
        Ok(delta.clone())
    }

    fn commit(&mut self, _iterations: usize) {
        self.committed_dt = Some(self.dt);
    }
}
