//! Single-point and multi-point constraints beyond node fixity.

use serde::{Deserialize, Serialize};

use crate::node::NodeTag;

/// Identifier assigned to a constraint when it is added to a domain.
pub type ConstraintTag = usize;

/// Kinematic restriction on nodal DOFs.
///
/// DOF indices are zero based.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Constraint {
    /// Prescribe the displacement of one DOF.
    Fix {
        /// Constrained node.
        node: NodeTag,
        /// Constrained DOF.
        dof: usize,
        /// Imposed displacement.
        #[serde(default)]
        value: f64,
    },
    /// Force DOFs of `constrained` to follow the same DOFs of `retained`.
    EqualDof {
        /// Node whose DOFs are kept as unknowns.
        retained: NodeTag,
        /// Node whose DOFs are slaved.
        constrained: NodeTag,
        /// DOFs tied together.
        dofs: Vec<usize>,
    },
}

impl Constraint {
    /// Prescribe `value` at `dof` of `node`.
    #[must_use]
    pub fn fix(node: NodeTag, dof: usize, value: f64) -> Self {
        Self::Fix { node, dof, value }
    }

    /// Tie `dofs` of `constrained` to those of `retained`.
    #[must_use]
    pub fn equal_dof(retained: NodeTag, constrained: NodeTag, dofs: &[usize]) -> Self {
        Self::EqualDof {
            retained,
            constrained,
            dofs: dofs.to_vec(),
        }
    }

    /// Nodes the constraint refers to.
    #[must_use]
    pub fn nodes(&self) -> Vec<NodeTag> {
        match self {
            Self::Fix { node, .. } => vec![*node],
            Self::EqualDof {
                retained,
                constrained,
                ..
            } => vec![*retained, *constrained],
        }
    }

    /// Return `true` when the constraint refers to `node`.
    #[must_use]
    pub fn references(&self, node: NodeTag) -> bool {
        self.nodes().contains(&node)
    }

    /// `(node, dof)` pairs the constraint addresses.
    #[must_use]
    pub fn addressed_dofs(&self) -> Vec<(NodeTag, usize)> {
        match self {
            Self::Fix { node, dof, .. } => vec![(*node, *dof)],
            Self::EqualDof {
                retained,
                constrained,
                dofs,
            } => dofs
                .iter()
                .flat_map(|&dof| [(*retained, dof), (*constrained, dof)])
                .collect(),
        }
    }
}
