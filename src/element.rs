//! Element abstraction and the built-in element formulations.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::Tolerances;
use crate::containers::{Matrix, Vector};
use crate::errors::DomainError;
use crate::material::MaterialSpec;
use crate::node::{Node, NodeTag};
use crate::section::SectionSpec;
use crate::state::StateMachine;

mod beam;
mod truss;
mod zero_length;

pub use beam::Beam2d;
pub use truss::Truss;
pub use zero_length::{Spring, ZeroLength};

/// User supplied identifier of an element.
pub type ElementTag = usize;

/// Finite element connecting an ordered list of nodes.
///
/// Element matrices and vectors are laid out node by node in the order of
/// [`Element::node_tags`], each node contributing all of its DOFs.
pub trait Element: StateMachine + fmt::Debug + Send + Sync {
    /// Identifier of the element.
    fn tag(&self) -> ElementTag;
    /// Short name of the formulation.
    fn class_name(&self) -> &'static str;
    /// Connected nodes in element order.
    fn node_tags(&self) -> &[NodeTag];
    /// Resolve geometry and validate the connected nodes.
    ///
    /// # Errors
    ///
    /// Returns a [`DomainError`] when the nodes do not suit the formulation.
    fn set_domain(&mut self, nodes: &[&Node], tolerances: &Tolerances) -> Result<(), DomainError>;
    /// Recompute the trial state from the trial displacements of `nodes`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotInitialized`] when called before [`Element::set_domain`].
    fn update(&mut self, nodes: &[&Node]) -> Result<(), DomainError>;
    /// Trial tangent stiffness.
    fn tangent_stiffness(&self) -> Matrix;
    /// Stiffness of the virgin element.
    fn initial_stiffness(&self) -> Matrix;
    /// Internal force produced by the trial state.
    fn resisting_force(&self) -> Vector;
    /// Lumped mass matrix, `None` for massless elements.
    fn mass_matrix(&self) -> Option<Matrix> {
        None
    }
    /// Committed strain and stress measures.
    fn response(&self) -> ElementResponse;
    /// Number of commits since creation or the last revert to start.
    fn commit_count(&self) -> usize;
}

/// Committed response of an element.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ElementResponse {
    /// Generalized strains.
    pub strain: Vector,
    /// Generalized stresses.
    pub stress: Vector,
    /// Basic forces (axial force, end moments or spring forces).
    pub force: Vector,
}

pub(crate) fn check_arity(
    element: ElementTag,
    expected: usize,
    nodes: &[&Node],
) -> Result<(), DomainError> {
    if nodes.len() == expected {
        Ok(())
    } else {
        Err(DomainError::WrongNodeCount {
            element,
            expected,
            received: nodes.len(),
        })
    }
}

/// Total number of DOFs of the element and the offset of the second node.
fn layout(nodes: &[&Node]) -> (usize, usize) {
    let offset = nodes.first().map_or(0, |node| node.dof_count());
    let size = nodes.iter().map(|node| node.dof_count()).sum();
    (size, offset)
}

/// Serializable description of an element.
///
/// # Examples
/// ```
/// use equilibria::element::ElementSpec;
///
/// let spec: ElementSpec = serde_json::from_str(
///     r#"{
///         "type": "Truss",
///         "tag": 1,
///         "nodes": [1, 2],
///         "section": {
///             "type": "Area",
///             "tag": 1,
///             "area": 0.01,
///             "material": {"type": "Elastic", "tag": 1, "elastic_modulus": 200.0e9}
///         }
///     }"#,
/// )?;
/// let element = spec.build()?;
/// assert_eq!(element.node_tags(), &[1, 2]);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ElementSpec {
    /// Two-node axial bar.
    Truss {
        /// Identifier.
        tag: ElementTag,
        /// End nodes.
        nodes: [NodeTag; 2],
        /// Cross section.
        section: SectionSpec,
        /// Mass per unit volume.
        #[serde(default)]
        density: f64,
    },
    /// Two-node planar frame element.
    Beam2d {
        /// Identifier.
        tag: ElementTag,
        /// End nodes.
        nodes: [NodeTag; 2],
        /// Cross section carrying axial force and bending.
        section: SectionSpec,
        /// Mass per unit volume.
        #[serde(default)]
        density: f64,
    },
    /// Springs joining the same DOFs of two nodes.
    ZeroLength {
        /// Identifier.
        tag: ElementTag,
        /// Joined nodes.
        nodes: [NodeTag; 2],
        /// Material acting along each joined DOF.
        springs: Vec<SpringSpec>,
    },
}

/// Serializable description of a [`Spring`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SpringSpec {
    /// Zero-based DOF joined by the spring.
    pub dof: usize,
    /// Force/deformation relation.
    pub material: MaterialSpec,
}

impl ElementSpec {
    /// Instantiate the described element.
    ///
    /// # Errors
    ///
    /// Returns a [`DomainError`] when a section or material property is inadmissible.
    pub fn build(&self) -> Result<Box<dyn Element>, DomainError> {
        Ok(match self {
            Self::Truss {
                tag,
                nodes,
                section,
                density,
            } => Box::new(Truss::new(*tag, *nodes, section.build()?).with_density(*density)),
            Self::Beam2d {
                tag,
                nodes,
                section,
                density,
            } => Box::new(Beam2d::new(*tag, *nodes, section.build()?).with_density(*density)),
            Self::ZeroLength { tag, nodes, springs } => {
                let springs = springs
                    .iter()
                    .map(|spring| Ok(Spring::new(spring.dof, spring.material.build()?)))
                    .collect::<Result<Vec<_>, DomainError>>()?;
                Box::new(ZeroLength::new(*tag, *nodes, springs))
            }
        })
    }
}
