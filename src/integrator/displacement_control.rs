use super::{invalid, Coefficients, Increment, Integrator, IntegratorCategory};
use crate::analysis::SolutionContext;
use crate::containers::Vector;
use crate::errors::{AnalysisError, ConfigError};
use crate::node::NodeTag;

/// Static stepping that prescribes the displacement increment of one DOF.
///
/// Each iteration solves the system for both the unbalance and the reference
/// load, then picks the load factor change that keeps the monitored
/// displacement on target. The load factor is the pseudo-time of the domain.
///
/// # Examples
/// ```
/// use equilibria::integrator::{DisplacementControl, Integrator};
///
/// let control = DisplacementControl::new(3, 0, 0.001);
/// assert_eq!(control.node(), 3);
/// assert!(control.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct DisplacementControl {
    node: NodeTag,
    dof: usize,
    increment: f64,
    equation: Option<usize>,
}

impl DisplacementControl {
    /// Increment `dof` of `node` by `increment` every step.
    #[must_use]
    pub fn new(node: NodeTag, dof: usize, increment: f64) -> Self {
        Self {
            node,
            dof,
            increment,
            equation: None,
        }
    }

    /// Monitored node.
    #[must_use]
    pub fn node(&self) -> NodeTag {
        self.node
    }

    /// Monitored DOF.
    #[must_use]
    pub fn dof(&self) -> usize {
        self.dof
    }

    fn equation(&self) -> Result<usize, AnalysisError> {
        self.equation.ok_or(AnalysisError::MonitoredDofNotFree {
            node: self.node,
            dof: self.dof,
        })
    }

    /// Displacements produced by the reference load with the current factorization.
    fn reference_response(
        &self,
        ctx: &SolutionContext<'_>,
        equation: usize,
    ) -> Result<Vector, AnalysisError> {
        let response = ctx.solve(&ctx.reference_load()?)?;
        if response[equation].abs() <= f64::EPSILON * response.amax() {
            return Err(AnalysisError::UncontrollableDof);
        }
        Ok(response)
    }
}

impl Integrator for DisplacementControl {
    fn name(&self) -> &'static str {
        "DisplacementControl"
    }

    fn category(&self) -> IntegratorCategory {
        IntegratorCategory::Static
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.increment == 0.0 || !self.increment.is_finite() {
            return Err(invalid(self.name(), "increment", self.increment));
        }
        Ok(())
    }

    fn initialize(&mut self, ctx: &mut SolutionContext<'_>) -> Result<(), AnalysisError> {
        self.equation = ctx.equation_of(self.node, self.dof);
        self.equation().map(|_| ())
    }

    fn coefficients(&self) -> Coefficients {
        Coefficients::STATIC
    }

    fn new_step(
        &mut self,
        ctx: &mut SolutionContext<'_>,
        increment: Increment,
    ) -> Result<(), AnalysisError> {
        let equation = self.equation()?;
        let start = ctx.domain().committed_time();
        ctx.advance_to(start)?;
        ctx.form_tangent(Coefficients::STATIC)?;
        let reference = self.reference_response(ctx, equation)?;
        let factor = self.increment * increment.fraction / reference[equation];
        ctx.domain_mut().apply_load(start + factor)?;
        ctx.apply_increment(&(reference * factor), 0.0, 0.0)
    }

    fn update(
        &mut self,
        ctx: &mut SolutionContext<'_>,
        delta: &Vector,
    ) -> Result<Vector, AnalysisError> {
        let equation = self.equation()?;
        let reference = self.reference_response(ctx, equation)?;
        let factor = -delta[equation] / reference[equation];
        let applied = delta + reference * factor;
        let time = ctx.domain().time() + factor;
        ctx.domain_mut().apply_load(time)?;
        ctx.apply_increment(&applied, 0.0, 0.0)?;
        Ok(applied)
    }
}
