//! Error types produced while defining a model or running an analysis.

use thiserror::Error;

use crate::element::ElementTag;
use crate::node::NodeTag;

/// Reason a numeric property supplied for a material, section or element is rejected.
///
/// The variants describe why the value is rejected so callers can present
/// actionable feedback to users.
#[derive(Clone, Copy, Debug, Error, PartialEq)]
pub enum PropertyError {
    /// Returned when a property that must be strictly positive is zero or negative.
    #[error("{name} must be positive (received {value})")]
    NonPositive {
        /// Name of the rejected property.
        name: &'static str,
        /// Rejected value.
        value: f64,
    },
    /// Returned when a property falls outside its admissible range.
    #[error("{name} must lie in [{min}, {max}) (received {value})")]
    OutOfRange {
        /// Name of the rejected property.
        name: &'static str,
        /// Rejected value.
        value: f64,
        /// Inclusive lower bound.
        min: f64,
        /// Exclusive upper bound.
        max: f64,
    },
    /// Returned when a property is NaN or infinite.
    #[error("{name} must be finite (received {value})")]
    NotFinite {
        /// Name of the rejected property.
        name: &'static str,
        /// Rejected value.
        value: f64,
    },
}

/// Definition error raised while building or finalizing a [`Domain`](crate::Domain).
///
/// These errors are fatal for the model: they indicate malformed entities or
/// dangling references and are never silently ignored.
///
/// # Examples
///
/// ```
/// use equilibria::{Domain, DomainError, Node};
///
/// let mut domain = Domain::new();
/// domain.add_node(Node::new(1, &[0.0, 0.0], 2)?)?;
/// let error = domain
///     .add_node(Node::new(1, &[1.0, 0.0], 2)?)
///     .expect_err("duplicate tag rejected");
/// assert_eq!(error, DomainError::DuplicateNode(1));
/// # Ok::<(), DomainError>(())
/// ```
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DomainError {
    /// Returned when a node tag is already in use.
    #[error("node {0} already exists in this domain")]
    DuplicateNode(NodeTag),
    /// Returned when an element tag is already in use.
    #[error("element {0} already exists in this domain")]
    DuplicateElement(ElementTag),
    /// Returned when a load pattern tag is already in use.
    #[error("pattern {0} already exists in this domain")]
    DuplicatePattern(usize),
    /// Returned when a node cannot be found in the domain.
    #[error("node {0} does not exist in this domain")]
    UnknownNode(NodeTag),
    /// Returned when an element cannot be found in the domain.
    #[error("element {0} does not exist in this domain")]
    UnknownElement(ElementTag),
    /// Returned when a constraint cannot be found in the domain.
    #[error("constraint {0} does not exist in this domain")]
    UnknownConstraint(usize),
    /// Returned when a load pattern cannot be found in the domain.
    #[error("pattern {0} does not exist in this domain")]
    UnknownPattern(usize),
    /// Returned when an element references a node that is not part of the domain.
    #[error("element {element} references missing node {node}")]
    DanglingReference {
        /// Element holding the reference.
        element: ElementTag,
        /// Node that could not be resolved.
        node: NodeTag,
    },
    /// Returned when the number of coordinates and DOFs does not describe a supported node.
    #[error("unsupported node shape: {dimension}D with {dofs} degrees of freedom")]
    UnsupportedNodeShape {
        /// Number of coordinates supplied.
        dimension: usize,
        /// Number of degrees of freedom requested.
        dofs: usize,
    },
    /// Returned when a per-DOF vector does not match the node DOF count.
    #[error("node {node}: {what} has {received} entries, expected {expected}")]
    WrongLength {
        /// Node receiving the vector.
        node: NodeTag,
        /// Description of the vector.
        what: &'static str,
        /// Required number of entries.
        expected: usize,
        /// Supplied number of entries.
        received: usize,
    },
    /// Returned when a DOF index is out of range for a node.
    #[error("node {node} has no degree of freedom {dof} (it has {available})")]
    InvalidDof {
        /// Node being addressed.
        node: NodeTag,
        /// Requested zero-based DOF index.
        dof: usize,
        /// Number of DOFs available at the node.
        available: usize,
    },
    /// Returned when an element spans zero distance.
    #[error("element {0} has zero length")]
    ZeroLengthElement(ElementTag),
    /// Returned when the nodes of a zero-length element do not coincide.
    #[error("element {element} joins nodes {distance} apart")]
    NonCoincidentNodes {
        /// Offending element.
        element: ElementTag,
        /// Distance between the nodes.
        distance: f64,
    },
    /// Returned when the nodes of an element are incompatible with its formulation.
    #[error("element {element}: {reason}")]
    IncompatibleNodes {
        /// Offending element.
        element: ElementTag,
        /// Description of the mismatch.
        reason: &'static str,
    },
    /// Returned when an element is used before its geometry has been resolved.
    #[error("element {0} has not been attached to a finalized domain")]
    NotInitialized(ElementTag),
    /// Returned when an element receives the wrong number of nodes.
    #[error("element {element} expects {expected} nodes, received {received}")]
    WrongNodeCount {
        /// Offending element.
        element: ElementTag,
        /// Fixed arity of the element.
        expected: usize,
        /// Supplied number of nodes.
        received: usize,
    },
    /// Returned when a material property is not physically meaningful.
    #[error("material {tag} is invalid: {source}")]
    InvalidMaterial {
        /// Identifier of the offending material.
        tag: usize,
        /// Description of the invalid property.
        #[source]
        source: PropertyError,
    },
    /// Returned when a section property is not physically meaningful.
    #[error("section {tag} is invalid: {source}")]
    InvalidSection {
        /// Identifier of the offending section.
        tag: usize,
        /// Description of the invalid property.
        #[source]
        source: PropertyError,
    },
    /// Returned when a section cannot serve the element it is attached to.
    #[error("section {section} provides {provided} resultants, element {element} needs {required}")]
    SectionOrder {
        /// Element owning the section.
        element: ElementTag,
        /// Identifier of the section.
        section: usize,
        /// Number of stress resultants the section provides.
        provided: usize,
        /// Number of stress resultants the element requires.
        required: usize,
    },
    /// Returned when a section receives a deformation vector of the wrong size.
    #[error("section {section} expects {expected} deformations, received {received}")]
    DeformationLength {
        /// Identifier of the section.
        section: usize,
        /// Section order.
        expected: usize,
        /// Supplied number of deformations.
        received: usize,
    },
    /// Returned when a time series definition is malformed.
    #[error("invalid time series: {0}")]
    InvalidTimeSeries(&'static str),
    /// Returned when two constraints act on the same degree of freedom.
    #[error("degree of freedom {dof} of node {node} is constrained more than once")]
    ConflictingConstraint {
        /// Constrained node.
        node: NodeTag,
        /// Zero-based DOF index.
        dof: usize,
    },
    /// Returned when multi-point constraints form a cycle.
    #[error("multi-point constraints form a cycle through node {node}, dof {dof}")]
    ConstraintCycle {
        /// Node on the cycle.
        node: NodeTag,
        /// Zero-based DOF index.
        dof: usize,
    },
    /// Returned when the domain lacks entities required for analysis.
    #[error("domain has no {0}")]
    Empty(&'static str),
    /// Returned when assembly is requested before equation numbers are assigned.
    #[error("equation numbers have not been assigned for the current model")]
    NotNumbered,
    /// Returned when a response query string is not recognised.
    #[error("unknown response query {0:?}")]
    UnknownQuery(String),
}

/// Failure of a linear system backend.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum SolverError {
    /// Returned when the system matrix is singular or numerically close to it.
    #[error("{solver}: matrix is singular or ill-conditioned (pivot ratio {pivot_ratio:e})")]
    Singular {
        /// Backend that detected the singularity.
        solver: &'static str,
        /// Ratio between the smallest and the largest pivot magnitude.
        pivot_ratio: f64,
    },
    /// Returned when the system matrix is not square.
    #[error("{solver}: matrix must be square (received {rows}x{cols})")]
    NotSquare {
        /// Backend that rejected the matrix.
        solver: &'static str,
        /// Number of rows.
        rows: usize,
        /// Number of columns.
        cols: usize,
    },
    /// Returned when the right-hand side does not match the factored matrix.
    #[error("{solver}: right-hand side has {rhs} entries, matrix has {size} rows")]
    SizeMismatch {
        /// Backend that rejected the right-hand side.
        solver: &'static str,
        /// Size of the factored matrix.
        size: usize,
        /// Length of the supplied right-hand side.
        rhs: usize,
    },
    /// Returned when a solve is requested before any matrix was factored.
    #[error("{0}: no matrix has been factored")]
    NotFactored(&'static str),
    /// Returned when a diagonal backend receives a coupled matrix.
    #[error("{solver}: entry ({row}, {col}) is off the diagonal")]
    NotDiagonal {
        /// Backend that rejected the matrix.
        solver: &'static str,
        /// Row of the offending entry.
        row: usize,
        /// Column of the offending entry.
        col: usize,
    },
}

/// Error raised when an analysis is assembled from incompatible or missing parts.
///
/// Configuration problems are detected eagerly by
/// [`AnalysisBuilder::build`](crate::AnalysisBuilder::build), never on first use.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Returned when a required strategy was not supplied.
    #[error("analysis is missing a {0}")]
    MissingComponent(&'static str),
    /// Returned when two strategies cannot be combined.
    #[error("{first} cannot be combined with {second}: {reason}")]
    Incompatible {
        /// First strategy of the pair.
        first: &'static str,
        /// Second strategy of the pair.
        second: &'static str,
        /// Explanation of the incompatibility.
        reason: &'static str,
    },
    /// Returned when a strategy parameter is outside its admissible range.
    #[error("{component}: parameter {parameter} = {value} is not admissible")]
    InvalidParameter {
        /// Strategy owning the parameter.
        component: &'static str,
        /// Parameter name.
        parameter: &'static str,
        /// Rejected value.
        value: f64,
    },
    /// Returned when a configuration document cannot be parsed.
    #[error("configuration could not be parsed: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parse(error.to_string())
    }
}

/// Error returned when an analysis step cannot be completed.
///
/// Every variant is raised only after the domain has been reverted to its last
/// committed state.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum AnalysisError {
    /// Returned when the model definition is invalid.
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// Returned when the linear system cannot be solved.
    #[error("linear solve failed: {0}")]
    Solver(#[from] SolverError),
    /// Returned when the iteration cap is reached without convergence.
    #[error("no convergence after {iterations} iterations (norm {norm:e}, tolerance {tolerance:e})")]
    NotConverged {
        /// Number of iterations performed.
        iterations: usize,
        /// Last norm evaluated by the convergence test.
        norm: f64,
        /// Tolerance of the convergence test.
        tolerance: f64,
    },
    /// Returned when the solution or a convergence norm becomes NaN or infinite.
    #[error("iteration produced a non-finite value")]
    NonFinite,
    /// Returned when the DOF monitored by displacement control is not an equation.
    #[error("degree of freedom {dof} of node {node} is not free and cannot be controlled")]
    MonitoredDofNotFree {
        /// Monitored node.
        node: NodeTag,
        /// Zero-based DOF index.
        dof: usize,
    },
    /// Returned when the reference load does not move the controlled DOF.
    #[error("reference load produces no displacement at the controlled degree of freedom")]
    UncontrollableDof,
    /// Returned when an explicit integrator meets an equation without mass.
    #[error("equation {0} has no mass; explicit integration needs a positive lumped mass")]
    MissingMass(usize),
    /// Returned when the explicit time step exceeds the stability limit.
    #[error("time step {dt:e} exceeds the stability limit {critical:e}")]
    UnstableTimeStep {
        /// Requested time step.
        dt: f64,
        /// Critical time step 2/omega_max.
        critical: f64,
    },
    /// Returned when a dynamic step is requested with a non-positive time step.
    #[error("time step must be positive (received {0})")]
    InvalidTimeStep(f64),
    /// Returned when the Krylov least-squares problem cannot be solved.
    #[error("Krylov acceleration failed: {0}")]
    Acceleration(&'static str),
    /// Returned when the eigenvalue estimate for the stability limit fails.
    #[error("stability limit could not be estimated")]
    StabilityEstimate,
}

impl AnalysisError {
    /// Return `true` when a smaller increment may allow the step to succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotConverged { .. }
                | Self::NonFinite
                | Self::Acceleration(_)
                | Self::Solver(SolverError::Singular { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn property_errors_render_their_values() {
        let error = DomainError::InvalidMaterial {
            tag: 3,
            source: PropertyError::NonPositive {
                name: "elastic modulus",
                value: -1.0,
            },
        };
        assert_eq!(
            error.to_string(),
            "material 3 is invalid: elastic modulus must be positive (received -1)"
        );
    }

    #[test]
    fn only_numerical_failures_are_recoverable() {
        let diverged = AnalysisError::NotConverged {
            iterations: 10,
            norm: 1.0,
            tolerance: 1.0e-8,
        };
        assert!(diverged.is_recoverable());
        assert!(AnalysisError::Solver(SolverError::Singular {
            solver: "FullGeneral",
            pivot_ratio: 0.0
        })
        .is_recoverable());
        assert!(!AnalysisError::Domain(DomainError::ZeroLengthElement(1)).is_recoverable());
        assert!(!AnalysisError::UnstableTimeStep {
            dt: 1.0,
            critical: 0.1
        }
        .is_recoverable());
    }

    #[test]
    fn json_errors_become_parse_errors() {
        let error = serde_json::from_str::<f64>("not json").expect_err("invalid json");
        let config: ConfigError = error.into();
        assert!(matches!(config, ConfigError::Parse(_)));
    }
}
