//! Numerical tolerances, progress reporting and serializable analysis setups.

use serde::{Deserialize, Serialize};

use crate::algorithm::{Algorithm, KrylovNewton, Linear, NewtonRaphson};
use crate::analysis::{Analysis, AnalysisBuilder, AnalysisSettings};
use crate::convergence::{ConvergenceTest, NormKind};
use crate::errors::ConfigError;
use crate::handler::{ConstraintHandler, PenaltyHandler, PlainHandler};
use crate::integrator::{
    AdaptiveIncrement, CentralDifference, DisplacementControl, Integrator, LoadControl, Newmark,
};
use crate::node::NodeTag;
use crate::numberer::{Numberer, PlainNumberer, ReverseCuthillMcKee};
use crate::system::{Diagonal, FullGeneral, LinearSolver, SparseDirect, PIVOT_TOLERANCE};

/// Comparison tolerances used for geometric checks.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    /// Relative tolerance.
    pub relative: f64,
    /// Absolute tolerance; lengths at or below it are treated as zero.
    pub absolute: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            relative: 1.0e-6,
            absolute: 1.0e-12,
        }
    }
}

impl Tolerances {
    /// Return `true` when `a` and `b` agree within the combined tolerance.
    #[must_use]
    pub fn is_close(&self, a: f64, b: f64) -> bool {
        (a - b).abs() <= self.absolute + self.relative * b.abs()
    }
}

/// Amount of progress information written to standard error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Verbosity {
    /// Print nothing.
    #[default]
    Silent,
    /// Print one line per completed step and every cutback.
    Step,
    /// Additionally print every iteration norm.
    Iteration,
}

/// DOF numbering strategy of an [`AnalysisConfig`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumbererConfig {
    /// Node insertion order.
    #[default]
    Plain,
    /// Reverse Cuthill-McKee ordering.
    #[serde(rename = "RCM")]
    ReverseCuthillMcKee,
}

impl NumbererConfig {
    fn build(self) -> Box<dyn Numberer> {
        match self {
            Self::Plain => Box::new(PlainNumberer),
            Self::ReverseCuthillMcKee => Box::new(ReverseCuthillMcKee),
        }
    }
}

fn default_alpha() -> f64 {
    PenaltyHandler::default().alpha()
}

/// Constraint handler of an [`AnalysisConfig`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HandlerConfig {
    /// Elimination.
    #[default]
    Plain,
    /// Penalty springs of stiffness `alpha`.
    Penalty {
        /// Penalty stiffness.
        #[serde(default = "default_alpha")]
        alpha: f64,
    },
}

impl HandlerConfig {
    fn build(self) -> Box<dyn ConstraintHandler> {
        match self {
            Self::Plain => Box::new(PlainHandler),
            Self::Penalty { alpha } => Box::new(PenaltyHandler::new(alpha)),
        }
    }
}

fn default_pivot_tolerance() -> f64 {
    PIVOT_TOLERANCE
}

/// Linear system backend of an [`AnalysisConfig`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SystemConfig {
    /// Dense LU factorization.
    FullGeneral {
        /// Smallest admissible ratio between pivots.
        #[serde(default = "default_pivot_tolerance")]
        pivot_tolerance: f64,
    },
    /// Sparse Cholesky factorization with a dense fallback.
    SparseDirect {
        /// Smallest admissible ratio between pivots.
        #[serde(default = "default_pivot_tolerance")]
        pivot_tolerance: f64,
    },
    /// Diagonal inversion for explicit dynamics.
    Diagonal {
        /// Smallest admissible ratio between pivots.
        #[serde(default = "default_pivot_tolerance")]
        pivot_tolerance: f64,
    },
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self::FullGeneral {
            pivot_tolerance: PIVOT_TOLERANCE,
        }
    }
}

impl SystemConfig {
    fn build(self) -> Box<dyn LinearSolver> {
        match self {
            Self::FullGeneral { pivot_tolerance } => Box::new(FullGeneral::new(pivot_tolerance)),
            Self::SparseDirect { pivot_tolerance } => Box::new(SparseDirect::new(pivot_tolerance)),
            Self::Diagonal { pivot_tolerance } => Box::new(Diagonal::new(pivot_tolerance)),
        }
    }
}

fn default_beta() -> f64 {
    0.25
}

fn default_gamma() -> f64 {
    0.5
}

/// Integrator of an [`AnalysisConfig`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IntegratorConfig {
    /// Load factor stepping.
    LoadControl {
        /// Load factor increment of the first step.
        increment: f64,
        /// Optional adaptation of the increment.
        #[serde(default)]
        adaptive: Option<AdaptiveIncrement>,
    },
    /// Displacement stepping of one DOF.
    DisplacementControl {
        /// Monitored node.
        node: NodeTag,
        /// Zero-based monitored DOF.
        dof: usize,
        /// Displacement increment per step.
        increment: f64,
    },
    /// Implicit Newmark-beta integration, average acceleration by default.
    Newmark {
        /// Parameter `beta`.
        #[serde(default = "default_beta")]
        beta: f64,
        /// Parameter `gamma`.
        #[serde(default = "default_gamma")]
        gamma: f64,
    },
    /// Explicit central difference integration.
    CentralDifference,
}

impl IntegratorConfig {
    fn build(self) -> Box<dyn Integrator> {
        match self {
            Self::LoadControl {
                increment,
                adaptive,
            } => {
                let control = LoadControl::new(increment);
                Box::new(match adaptive {
                    Some(adaptive) => control.with_adaptive(adaptive),
                    None => control,
                })
            }
            Self::DisplacementControl {
                node,
                dof,
                increment,
            } => Box::new(DisplacementControl::new(node, dof, increment)),
            Self::Newmark { beta, gamma } => Box::new(Newmark::new(beta, gamma)),
            Self::CentralDifference => Box::new(CentralDifference::new()),
        }
    }
}

fn default_dimension() -> usize {
    KrylovNewton::default().max_dimension()
}

/// Solution algorithm of an [`AnalysisConfig`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AlgorithmConfig {
    /// Single solve per step.
    Linear,
    /// Full Newton-Raphson.
    #[default]
    NewtonRaphson,
    /// Newton iteration with Krylov acceleration.
    KrylovNewton {
        /// Largest subspace dimension.
        #[serde(default = "default_dimension")]
        max_dimension: usize,
    },
}

impl AlgorithmConfig {
    fn build(self) -> Box<dyn Algorithm> {
        match self {
            Self::Linear => Box::new(Linear),
            Self::NewtonRaphson => Box::new(NewtonRaphson),
            Self::KrylovNewton { max_dimension } => Box::new(KrylovNewton::new(max_dimension)),
        }
    }
}

/// Convergence test of an [`AnalysisConfig`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestConfig {
    /// Measured norm.
    pub kind: NormKind,
    /// Largest accepted norm.
    pub tolerance: f64,
    /// Iteration cap.
    pub max_iterations: usize,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            kind: NormKind::NormUnbalance,
            tolerance: 1.0e-8,
            max_iterations: 25,
        }
    }
}

/// Serializable description of a complete analysis.
///
/// Numberer, handler, system, algorithm, test and settings fall back to
/// their defaults when omitted; the integrator is required.
///
/// # Examples
/// ```
/// use equilibria::config::AnalysisConfig;
///
/// let config = AnalysisConfig::from_json(
///     r#"{
///         "numberer": "RCM",
///         "integrator": {"type": "LoadControl", "increment": 0.1},
///         "algorithm": {"type": "KrylovNewton"},
///         "test": {"kind": "NormDispIncr", "tolerance": 1e-10, "max_iterations": 20}
///     }"#,
/// )?;
/// let analysis = config.build()?;
/// assert_eq!(analysis.strategy_names()[0], "RCM");
/// # Ok::<(), equilibria::ConfigError>(())
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// DOF numbering.
    #[serde(default)]
    pub numberer: NumbererConfig,
    /// Constraint enforcement.
    #[serde(default)]
    pub handler: HandlerConfig,
    /// Linear system backend.
    #[serde(default)]
    pub system: SystemConfig,
    /// Step evolution.
    pub integrator: IntegratorConfig,
    /// Solution algorithm.
    #[serde(default)]
    pub algorithm: AlgorithmConfig,
    /// Convergence test.
    #[serde(default)]
    pub test: TestConfig,
    /// Step control.
    #[serde(default)]
    pub settings: AnalysisSettings,
}

impl AnalysisConfig {
    /// Parse a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed documents.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Builder holding the configured strategies.
    #[must_use]
    pub fn builder(&self) -> AnalysisBuilder {
        AnalysisBuilder::new()
            .numberer(self.numberer.build())
            .handler(self.handler.build())
            .system(self.system.build())
            .integrator(self.integrator.build())
            .algorithm(self.algorithm.build())
            .test(ConvergenceTest::new(
                self.test.kind,
                self.test.tolerance,
                self.test.max_iterations,
            ))
            .settings(self.settings)
    }

    /// Compose and check the configured analysis.
    ///
    /// # Errors
    ///
    /// Propagates the checks of [`AnalysisBuilder::build`].
    pub fn build(&self) -> Result<Analysis, ConfigError> {
        self.builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closeness_combines_both_tolerances() {
        let tolerances = Tolerances::default();
        assert!(tolerances.is_close(0.0, 1.0e-13));
        assert!(tolerances.is_close(1.0e6 + 0.5, 1.0e6));
        assert!(!tolerances.is_close(1.0, 1.1));
    }

    #[test]
    fn verbosity_levels_are_ordered() {
        assert!(Verbosity::Iteration > Verbosity::Step);
        assert_eq!(Verbosity::default(), Verbosity::Silent);
    }

    #[test]
    fn omitted_strategies_take_defaults() {
        let config = AnalysisConfig::from_json(
            r#"{"integrator": {"type": "Newmark"}, "settings": {"max_cutbacks": 2}}"#,
        )
        .expect("valid document");
        assert_eq!(config.numberer, NumbererConfig::Plain);
        assert_eq!(config.handler, HandlerConfig::Plain);
        assert_eq!(config.system, SystemConfig::default());
        assert_eq!(config.algorithm, AlgorithmConfig::NewtonRaphson);
        assert_eq!(
            config.integrator,
            IntegratorConfig::Newmark {
                beta: 0.25,
                gamma: 0.5
            }
        );
        assert_eq!(config.settings.max_cutbacks, 2);
        assert_eq!(config.settings.cutback_factor, 0.5);
        assert!(config.build().is_ok());
    }

    #[test]
    fn penalty_defaults_to_stiff_springs() {
        let config = AnalysisConfig::from_json(
            r#"{
                "handler": {"type": "Penalty"},
                "system": {"type": "SparseDirect"},
                "integrator": {"type": "DisplacementControl", "node": 2, "dof": 0, "increment": 0.01}
            }"#,
        )
        .expect("valid document");
        assert_eq!(config.handler, HandlerConfig::Penalty { alpha: 1.0e12 });
        let analysis = config.build().expect("compatible strategies");
        assert_eq!(analysis.strategy_names()[1], "Penalty");
    }

    #[test]
    fn incompatible_documents_fail_at_build() {
        let config = AnalysisConfig::from_json(
            r#"{"system": {"type": "Diagonal"}, "integrator": {"type": "CentralDifference"}}"#,
        )
        .expect("valid document");
        assert!(matches!(config.build(), Err(ConfigError::Incompatible { .. })));
        assert!(matches!(
            AnalysisConfig::from_json(r#"{"numberer": "Plain"}"#),
            Err(ConfigError::Parse(_))
        ));
    }
}
