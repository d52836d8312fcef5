//! Analysis orchestration: strategy composition and the step loop.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::algorithm::{Algorithm, StepOutcome};
use crate::config::Verbosity;
use crate::containers::{Matrix, Vector};
use crate::convergence::ConvergenceTest;
use crate::domain::Domain;
use crate::errors::{AnalysisError, ConfigError};
use crate::handler::ConstraintHandler;
use crate::integrator::{Coefficients, Increment, Integrator, IntegratorCategory};
use crate::node::{Dof, NodeTag};
use crate::numberer::Numberer;
use crate::system::LinearSolver;

/// Remaining step share below which a step counts as complete.
pub(crate) const FRACTION_TOLERANCE: f64 = 1.0e-12;

/// Mutable view of the domain and the linear system shared by the
/// integrator and the algorithm during one increment.
#[derive(Debug)]
pub struct SolutionContext<'a> {
    domain: &'a mut Domain,
    handler: &'a dyn ConstraintHandler,
    solver: &'a mut dyn LinearSolver,
}

impl<'a> SolutionContext<'a> {
    pub(crate) fn new(
        domain: &'a mut Domain,
        handler: &'a dyn ConstraintHandler,
        solver: &'a mut dyn LinearSolver,
    ) -> Self {
        Self {
            domain,
            handler,
            solver,
        }
    }

    /// Domain being analysed.
    #[must_use]
    pub fn domain(&self) -> &Domain {
        self.domain
    }

    /// Mutable access to the domain being analysed.
    pub fn domain_mut(&mut self) -> &mut Domain {
        self.domain
    }

    /// Assemble the effective matrix and factor it.
    ///
    /// # Errors
    ///
    /// Propagates assembly errors and solver failures.
    pub fn form_tangent(&mut self, coefficients: Coefficients) -> Result<(), AnalysisError> {
        let matrix = self.domain.assemble_matrix(coefficients)?;
        let system = self.handler.transform_matrix(self.domain, matrix, coefficients)?;
        self.solver.set_matrix(&system)?;
        Ok(())
    }

    /// Unbalanced force acting on the equations at the trial state.
    ///
    /// # Errors
    ///
    /// Propagates assembly errors.
    pub fn form_unbalance(&self) -> Result<Vector, AnalysisError> {
        let residual = self.domain.assemble_residual()?;
        Ok(self.handler.transform_residual(self.domain, residual)?)
    }

    /// Solve the factored system for `rhs`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisError::NonFinite`] when the solution holds NaN or
    /// infinite entries and propagates solver failures.
    pub fn solve(&self, rhs: &Vector) -> Result<Vector, AnalysisError> {
        let solution = self.solver.solve(rhs)?;
        if solution.iter().all(|value| value.is_finite()) {
            Ok(solution)
        } else {
            Err(AnalysisError::NonFinite)
        }
    }

    /// Nodal increments corresponding to a solution of the system.
    ///
    /// # Errors
    ///
    /// Returns [`crate::DomainError::NotNumbered`] when the solution does not
    /// match the numbering.
    pub fn recover(&self, solution: &Vector) -> Result<HashMap<NodeTag, Vector>, AnalysisError> {
        Ok(self.handler.recover(self.domain, solution)?)
    }

    /// Reference load of every pattern acting on the equations.
    ///
    /// # Errors
    ///
    /// Propagates assembly errors.
    pub fn reference_load(&self) -> Result<Vector, AnalysisError> {
        Ok(self.domain.reference_load()?.free)
    }

    /// Add a solution to the trial displacements and update the elements.
    ///
    /// Trial velocities and accelerations receive the increment scaled by
    /// `velocity` and `acceleration`.
    ///
    /// # Errors
    ///
    /// Propagates recovery and element update errors.
    pub fn apply_increment(
        &mut self,
        delta: &Vector,
        velocity: f64,
        acceleration: f64,
    ) -> Result<(), AnalysisError> {
        let increments = self.handler.recover(self.domain, delta)?;
        self.domain
            .increment_trial_state(&increments, velocity, acceleration);
        self.domain.update()?;
        Ok(())
    }

    /// Move the domain to `time`: loads, imposed displacements and element states.
    ///
    /// # Errors
    ///
    /// Propagates load application and element update errors.
    pub fn advance_to(&mut self, time: f64) -> Result<(), AnalysisError> {
        self.domain.apply_load(time)?;
        self.domain.apply_imposed_displacements()?;
        self.domain.update()?;
        Ok(())
    }

    /// Equation number of `dof` at `node`, if it is a free DOF.
    #[must_use]
    pub fn equation_of(&self, node: NodeTag, dof: usize) -> Option<usize> {
        match self.domain.node(node)?.dofs().get(dof)? {
            Dof::Equation(equation) => Some(*equation),
            _ => None,
        }
    }

    /// Dense effective matrix acting on the equations.
    ///
    /// # Errors
    ///
    /// Propagates assembly errors.
    pub fn assemble_dense(&self, coefficients: Coefficients) -> Result<Matrix, AnalysisError> {
        let matrix = self.domain.assemble_matrix(coefficients)?;
        let system = self.handler.transform_matrix(self.domain, matrix, coefficients)?;
        Ok(Matrix::from(&system))
    }
}

/// Step control parameters of an [`Analysis`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Number of times a failed step may be retried with a smaller increment.
    pub max_cutbacks: usize,
    /// Factor applied to the increment at every cutback, in `(0, 1)`.
    pub cutback_factor: f64,
    /// Progress printed to standard error.
    pub verbosity: Verbosity,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            max_cutbacks: 4,
            cutback_factor: 0.5,
            verbosity: Verbosity::Silent,
        }
    }
}

impl AnalysisSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.cutback_factor <= 0.0 || self.cutback_factor >= 1.0 || self.cutback_factor.is_nan() {
            return Err(ConfigError::InvalidParameter {
                component: "Analysis",
                parameter: "cutback_factor",
                value: self.cutback_factor,
            });
        }
        Ok(())
    }
}

/// Record of one completed analysis step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    /// One-based step number within its `analyze` call.
    pub step: usize,
    /// Domain time (or load factor) after the step.
    pub time: f64,
    /// Iterations summed over every committed sub-increment.
    pub iterations: usize,
    /// Last norm of the convergence test.
    pub norm: f64,
    /// Number of cutbacks needed.
    pub cutbacks: usize,
}

/// Steps completed by one call to [`Analysis::analyze`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// One entry per completed step.
    pub steps: Vec<StepReport>,
}

impl AnalysisReport {
    /// Total iterations of every step.
    #[must_use]
    pub fn total_iterations(&self) -> usize {
        self.steps.iter().map(|step| step.iterations).sum()
    }

    /// Total cutbacks of every step.
    #[must_use]
    pub fn total_cutbacks(&self) -> usize {
        self.steps.iter().map(|step| step.cutbacks).sum()
    }

    /// Domain time after the last step.
    #[must_use]
    pub fn final_time(&self) -> Option<f64> {
        self.steps.last().map(|step| step.time)
    }
}

/// Builder collecting one strategy of each kind.
///
/// Every strategy is required; [`AnalysisBuilder::build`] checks that they
/// can work together.
///
/// # Examples
/// ```
/// use equilibria::algorithm::Linear;
/// use equilibria::convergence::{ConvergenceTest, NormKind};
/// use equilibria::handler::PlainHandler;
/// use equilibria::integrator::{CentralDifference, LoadControl};
/// use equilibria::numberer::PlainNumberer;
/// use equilibria::system::{Diagonal, FullGeneral};
/// use equilibria::{AnalysisBuilder, ConfigError};
///
/// let analysis = AnalysisBuilder::new()
///     .numberer(Box::new(PlainNumberer))
///     .handler(Box::new(PlainHandler))
///     .system(Box::new(FullGeneral::default()))
///     .integrator(Box::new(LoadControl::new(0.1)))
///     .algorithm(Box::new(Linear))
///     .test(ConvergenceTest::new(NormKind::NormUnbalance, 1.0e-8, 10))
///     .build();
/// assert!(analysis.is_ok());
///
/// let error = AnalysisBuilder::new()
///     .numberer(Box::new(PlainNumberer))
///     .handler(Box::new(PlainHandler))
///     .system(Box::new(Diagonal::default()))
///     .integrator(Box::new(LoadControl::new(0.1)))
///     .algorithm(Box::new(Linear))
///     .test(ConvergenceTest::new(NormKind::NormUnbalance, 1.0e-8, 10))
///     .build()
///     .expect_err("diagonal system serves explicit dynamics only");
/// assert!(matches!(error, ConfigError::Incompatible { .. }));
/// # let _ = CentralDifference::new();
/// ```
#[derive(Debug, Default)]
pub struct AnalysisBuilder {
    numberer: Option<Box<dyn Numberer>>,
    handler: Option<Box<dyn ConstraintHandler>>,
    solver: Option<Box<dyn LinearSolver>>,
    integrator: Option<Box<dyn Integrator>>,
    algorithm: Option<Box<dyn Algorithm>>,
    test: Option<ConvergenceTest>,
    settings: AnalysisSettings,
}

impl AnalysisBuilder {
    /// Empty builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// DOF numbering strategy.
    #[must_use]
    pub fn numberer(mut self, numberer: Box<dyn Numberer>) -> Self {
        self.numberer = Some(numberer);
        self
    }

    /// Constraint handler.
    #[must_use]
    pub fn handler(mut self, handler: Box<dyn ConstraintHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Linear system backend.
    #[must_use]
    pub fn system(mut self, solver: Box<dyn LinearSolver>) -> Self {
        self.solver = Some(solver);
        self
    }

    /// Integrator.
    #[must_use]
    pub fn integrator(mut self, integrator: Box<dyn Integrator>) -> Self {
        self.integrator = Some(integrator);
        self
    }

    /// Solution algorithm.
    #[must_use]
    pub fn algorithm(mut self, algorithm: Box<dyn Algorithm>) -> Self {
        self.algorithm = Some(algorithm);
        self
    }

    /// Convergence test.
    #[must_use]
    pub fn test(mut self, test: ConvergenceTest) -> Self {
        self.test = Some(test);
        self
    }

    /// Step control parameters.
    #[must_use]
    pub fn settings(mut self, settings: AnalysisSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Check the strategies and compose the analysis.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingComponent`] for an absent strategy,
    /// [`ConfigError::Incompatible`] for combinations that cannot work and
    /// [`ConfigError::InvalidParameter`] for inadmissible parameters.
    pub fn build(self) -> Result<Analysis, ConfigError> {
        let numberer = self.numberer.ok_or(ConfigError::MissingComponent("numberer"))?;
        let handler = self
            .handler
            .ok_or(ConfigError::MissingComponent("constraint handler"))?;
        let solver = self.solver.ok_or(ConfigError::MissingComponent("system"))?;
        let integrator = self
            .integrator
            .ok_or(ConfigError::MissingComponent("integrator"))?;
        let algorithm = self
            .algorithm
            .ok_or(ConfigError::MissingComponent("algorithm"))?;
        let mut test = self.test.ok_or(ConfigError::MissingComponent("test"))?;

        let category = integrator.category();
        if category == IntegratorCategory::ExplicitDynamic && algorithm.is_iterative() {
            return Err(ConfigError::Incompatible {
                first: integrator.name(),
                second: algorithm.name(),
                reason: "explicit integration takes exactly one direct evaluation per step",
            });
        }
        if !solver.supports(category) {
            return Err(ConfigError::Incompatible {
                first: solver.name(),
                second: integrator.name(),
                reason: "the system does not serve this integrator family",
            });
        }
        integrator.validate()?;
        algorithm.validate()?;
        handler.validate()?;
        test.validate()?;
        self.settings.validate()?;
        test.set_verbosity(self.settings.verbosity);

        Ok(Analysis {
            numberer,
            handler,
            solver,
            integrator,
            algorithm,
            test,
            settings: self.settings,
            prepared: None,
            history: Vec::new(),
        })
    }
}

/// A composed analysis driving a domain through load or time steps.
///
/// An analysis re-numbers the domain whenever its structure changed since
/// the previous call to [`Analysis::analyze`]. Each step is retried with
/// smaller increments after recoverable failures; a step that still fails
/// leaves the domain at its last committed state.
#[derive(Debug)]
pub struct Analysis {
    numberer: Box<dyn Numberer>,
    handler: Box<dyn ConstraintHandler>,
    solver: Box<dyn LinearSolver>,
    integrator: Box<dyn Integrator>,
    algorithm: Box<dyn Algorithm>,
    test: ConvergenceTest,
    settings: AnalysisSettings,
    prepared: Option<u64>,
    history: Vec<StepReport>,
}

impl Analysis {
    /// Step control parameters.
    #[must_use]
    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Change the amount of progress printed.
    pub fn set_verbosity(&mut self, verbosity: Verbosity) {
        self.settings.verbosity = verbosity;
        self.test.set_verbosity(verbosity);
    }

    /// Integrator of the analysis.
    #[must_use]
    pub fn integrator(&self) -> &dyn Integrator {
        self.integrator.as_ref()
    }

    /// Convergence test with the norms of the last attempted increment.
    #[must_use]
    pub fn test(&self) -> &ConvergenceTest {
        &self.test
    }

    /// Every step completed since the analysis was built.
    #[must_use]
    pub fn history(&self) -> &[StepReport] {
        &self.history
    }

    /// Names of the composed strategies, in pipeline order.
    #[must_use]
    pub fn strategy_names(&self) -> [&'static str; 5] {
        [
            self.numberer.name(),
            self.handler.name(),
            self.solver.name(),
            self.integrator.name(),
            self.algorithm.name(),
        ]
    }

    /// Run `n_steps` steps of size `dt`.
    ///
    /// `dt` is the time step of dynamic integrators and is ignored by static
    /// ones, which advance their load factor instead.
    ///
    /// # Errors
    ///
    /// Returns the error of the first step that fails after every allowed
    /// cutback; the domain is then at the state committed by the previous
    /// step.
    ///
    /// # Examples
    /// ```
    /// use equilibria::algorithm::Linear;
    /// use equilibria::convergence::{ConvergenceTest, NormKind};
    /// use equilibria::element::Truss;
    /// use equilibria::handler::PlainHandler;
    /// use equilibria::integrator::LoadControl;
    /// use equilibria::material::Elastic;
    /// use equilibria::numberer::PlainNumberer;
    /// use equilibria::section::AreaSection;
    /// use equilibria::system::FullGeneral;
    /// use equilibria::{AnalysisBuilder, Domain, Node, Pattern, TimeSeries};
    ///
    /// let mut domain = Domain::new();
    /// domain.add_node(Node::new(1, &[0.0, 0.0], 2)?.with_fixity(&[true, true])?)?;
    /// domain.add_node(Node::new(2, &[1.0, 0.0], 2)?.with_fixity(&[false, true])?)?;
    /// let section = AreaSection::new(1, 1.0, Box::new(Elastic::new(1, 100.0)?))?;
    /// domain.add_element(Box::new(Truss::new(1, [1, 2], Box::new(section))))?;
    /// domain.add_pattern(Pattern::plain(1, TimeSeries::linear(1.0)).with_load(2, vec![10.0, 0.0]))?;
    ///
    /// let mut analysis = AnalysisBuilder::new()
    ///     .numberer(Box::new(PlainNumberer))
    ///     .handler(Box::new(PlainHandler))
    ///     .system(Box::new(FullGeneral::default()))
    ///     .integrator(Box::new(LoadControl::new(0.5)))
    ///     .algorithm(Box::new(Linear))
    ///     .test(ConvergenceTest::new(NormKind::NormUnbalance, 1.0e-8, 10))
    ///     .build()?;
    /// let report = analysis.analyze(&mut domain, 2, 0.0)?;
    /// assert_eq!(report.steps.len(), 2);
    /// let u = domain.node(2).expect("node 2").committed_displacement(&[0])?;
    /// assert!((u[0] - 0.1).abs() < 1.0e-12);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn analyze(
        &mut self,
        domain: &mut Domain,
        n_steps: usize,
        dt: f64,
    ) -> Result<AnalysisReport, AnalysisError> {
        if let Err(error) = self.prepare(domain) {
            self.prepared = None;
            if domain.is_finalized() {
                domain.revert()?;
            }
            return Err(error);
        }
        let mut report = AnalysisReport::default();
        for step in 1..=n_steps {
            let record = self.step(domain, step, dt)?;
            if self.settings.verbosity >= Verbosity::Step {
                eprintln!(
                    "step {}: time {:e}, {} iterations, norm {:e}, {} cutbacks",
                    record.step, record.time, record.iterations, record.norm, record.cutbacks
                );
            }
            self.history.push(record);
            report.steps.push(record);
        }
        Ok(report)
    }

    /// Finalize, constrain and number the domain after structural changes.
    fn prepare(&mut self, domain: &mut Domain) -> Result<(), AnalysisError> {
        let current = domain.is_finalized()
            && domain.equation_count().is_some()
            && self.prepared == Some(domain.revision());
        if current {
            return Ok(());
        }
        domain.domain()?;
        let plan = self.handler.plan(domain)?;
        let numbering = self.numberer.number(domain, &plan)?;
        domain.apply_numbering(numbering)?;
        let mut ctx = SolutionContext::new(domain, self.handler.as_ref(), self.solver.as_mut());
        ctx.advance_to(ctx.domain().committed_time())?;
        self.integrator.initialize(&mut ctx)?;
        self.prepared = Some(domain.revision());
        if self.settings.verbosity >= Verbosity::Step {
            eprintln!(
                "{} equations, {} prescribed DOFs, bandwidth {}",
                domain.equation_count().unwrap_or(0),
                domain.fixed_count().unwrap_or(0),
                domain.bandwidth()?
            );
        }
        Ok(())
    }

    /// Complete one step, cutting it into smaller increments on recoverable failures.
    fn step(&mut self, domain: &mut Domain, step: usize, dt: f64) -> Result<StepReport, AnalysisError> {
        let mut remaining = 1.0_f64;
        let mut fraction = 1.0_f64;
        let mut cutbacks = 0;
        let mut iterations = 0;
        let mut norm = 0.0;
        while remaining > FRACTION_TOLERANCE {
            let portion = fraction.min(remaining);
            let increment = Increment {
                dt: dt * portion,
                fraction: portion,
            };
            match self.attempt(domain, increment) {
                Ok(outcome) => {
                    domain.commit();
                    self.integrator.commit(outcome.iterations);
                    remaining -= portion;
                    iterations += outcome.iterations;
                    norm = outcome.norm;
                }
                Err(error) => {
                    domain.revert()?;
                    self.integrator.revert();
                    if !error.is_recoverable() || cutbacks >= self.settings.max_cutbacks {
                        return Err(error);
                    }
                    cutbacks += 1;
                    fraction *= self.settings.cutback_factor;
                    if self.settings.verbosity >= Verbosity::Step {
                        eprintln!("step {step}: {error}; retrying with fraction {fraction}");
                    }
                }
            }
        }
        Ok(StepReport {
            step,
            time: domain.committed_time(),
            iterations,
            norm,
            cutbacks,
        })
    }

    fn attempt(&mut self, domain: &mut Domain, increment: Increment) -> Result<StepOutcome, AnalysisError> {
        let Self {
            handler,
            solver,
            integrator,
            algorithm,
            test,
            ..
        } = self;
        let mut ctx = SolutionContext::new(domain, handler.as_ref(), solver.as_mut());
        integrator.new_step(&mut ctx, increment)?;
        algorithm.solve_step(&mut ctx, integrator.as_mut(), test)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::{Linear, NewtonRaphson};
    use crate::convergence::NormKind;
    use crate::handler::PlainHandler;
    use crate::integrator::{CentralDifference, LoadControl, Newmark};
    use crate::numberer::PlainNumberer;
    use crate::system::{Diagonal, FullGeneral};

    fn builder() -> AnalysisBuilder {
        AnalysisBuilder::new()
            .numberer(Box::new(PlainNumberer))
            .handler(Box::new(PlainHandler))
            .system(Box::new(FullGeneral::default()))
            .integrator(Box::new(LoadControl::new(1.0)))
            .algorithm(Box::new(NewtonRaphson))
            .test(ConvergenceTest::new(NormKind::NormUnbalance, 1.0e-8, 10))
    }

    #[test]
    fn complete_builder_succeeds() {
        let analysis = builder().build().expect("compatible strategies");
        assert_eq!(
            analysis.strategy_names(),
            ["Plain", "Plain", "FullGeneral", "LoadControl", "NewtonRaphson"]
        );
        assert!(analysis.history().is_empty());
    }

    #[test]
    fn missing_components_are_named() {
        let error = AnalysisBuilder::new().build().expect_err("empty builder");
        assert_eq!(error, ConfigError::MissingComponent("numberer"));
        let error = AnalysisBuilder::new()
            .numberer(Box::new(PlainNumberer))
            .handler(Box::new(PlainHandler))
            .system(Box::new(FullGeneral::default()))
            .integrator(Box::new(LoadControl::new(1.0)))
            .algorithm(Box::new(Linear))
            .build()
            .expect_err("no test");
        assert_eq!(error, ConfigError::MissingComponent("test"));
    }

    #[test]
    fn explicit_integration_rejects_iterative_algorithms() {
        let error = builder()
            .system(Box::new(Diagonal::default()))
            .integrator(Box::new(CentralDifference::new()))
            .build()
            .expect_err("iterative algorithm");
        assert!(matches!(
            error,
            ConfigError::Incompatible {
                first: "CentralDifference",
                second: "NewtonRaphson",
                ..
            }
        ));
        assert!(builder()
            .system(Box::new(Diagonal::default()))
            .integrator(Box::new(CentralDifference::new()))
            .algorithm(Box::new(Linear))
            .build()
            .is_ok());
    }

    #[test]
    fn diagonal_system_rejects_implicit_integrators() {
        let error = builder()
            .system(Box::new(Diagonal::default()))
            .integrator(Box::new(Newmark::average_acceleration()))
            .build()
            .expect_err("implicit integrator");
        assert!(matches!(error, ConfigError::Incompatible { first: "Diagonal", .. }));
    }

    #[test]
    fn parameters_are_checked_eagerly() {
        let error = builder()
            .integrator(Box::new(Newmark::new(-0.25, 0.5)))
            .build()
            .expect_err("negative beta");
        assert!(matches!(error, ConfigError::InvalidParameter { parameter: "beta", .. }));
        let error = builder()
            .settings(AnalysisSettings {
                cutback_factor: 1.5,
                ..AnalysisSettings::default()
            })
            .build()
            .expect_err("cutback factor above one");
        assert!(matches!(
            error,
            ConfigError::InvalidParameter {
                parameter: "cutback_factor",
                ..
            }
        ));
    }

    #[test]
    fn report_totals() {
        let report = AnalysisReport {
            steps: vec![
                StepReport {
                    step: 1,
                    time: 0.5,
                    iterations: 2,
                    norm: 1.0e-10,
                    cutbacks: 0,
                },
                StepReport {
                    step: 2,
                    time: 1.0,
                    iterations: 5,
                    norm: 1.0e-9,
                    cutbacks: 1,
                },
            ],
        };
        assert_eq!(report.total_iterations(), 7);
        assert_eq!(report.total_cutbacks(), 1);
        assert_eq!(report.final_time(), Some(1.0));
    }
}
