//! Equation numbering of free degrees of freedom.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;

use petgraph::stable_graph::NodeIndex;

use crate::domain::Domain;
use crate::errors::DomainError;
use crate::node::{Dof, NodeTag};

/// Treatment of one DOF decided by a constraint handler before numbering.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DofRole {
    /// Unknown of the system.
    Free,
    /// Prescribed displacement.
    Fixed(f64),
    /// Follows a free DOF of another node.
    Tied {
        /// Node owning the governing DOF.
        node: NodeTag,
        /// Governing DOF.
        dof: usize,
    },
}

/// Role of every DOF of every node.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DofPlan {
    roles: HashMap<NodeTag, Vec<DofRole>>,
}

impl DofPlan {
    /// Plan in which node fixity flags are prescribed at zero and every other DOF is free.
    #[must_use]
    pub fn from_fixity(domain: &Domain) -> Self {
        let roles = domain
            .nodes()
            .map(|node| {
                let roles = node
                    .fixity()
                    .iter()
                    .map(|&fixed| if fixed { DofRole::Fixed(0.0) } else { DofRole::Free })
                    .collect();
                (node.tag(), roles)
            })
            .collect();
        Self { roles }
    }

    /// Role of `dof` of `node`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnknownNode`] or [`DomainError::InvalidDof`] when the
    /// DOF is not part of the plan.
    pub fn role(&self, node: NodeTag, dof: usize) -> Result<DofRole, DomainError> {
        let roles = self.roles.get(&node).ok_or(DomainError::UnknownNode(node))?;
        roles.get(dof).copied().ok_or(DomainError::InvalidDof {
            node,
            dof,
            available: roles.len(),
        })
    }

    /// Overwrite the role of `dof` of `node`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnknownNode`] or [`DomainError::InvalidDof`] when the
    /// DOF is not part of the plan.
    pub fn set_role(&mut self, node: NodeTag, dof: usize, role: DofRole) -> Result<(), DomainError> {
        let roles = self
            .roles
            .get_mut(&node)
            .ok_or(DomainError::UnknownNode(node))?;
        let available = roles.len();
        let slot = roles
            .get_mut(dof)
            .ok_or(DomainError::InvalidDof { node, dof, available })?;
        *slot = role;
        Ok(())
    }

    /// Every `(node, dof)` currently tied to another DOF.
    #[must_use]
    pub fn tied(&self) -> Vec<(NodeTag, usize)> {
        let mut tied: Vec<(NodeTag, usize)> = self
            .roles
            .iter()
            .flat_map(|(&node, roles)| {
                roles.iter().enumerate().filter_map(move |(dof, role)| {
                    matches!(role, DofRole::Tied { .. }).then_some((node, dof))
                })
            })
            .collect();
        tied.sort_unstable();
        tied
    }
}

/// Equation numbers produced by a [`Numberer`].
#[derive(Clone, Debug, PartialEq)]
pub struct Numbering {
    /// Number of equations.
    pub equations: usize,
    /// Number of prescribed DOFs.
    pub fixed: usize,
    pub(crate) dofs: HashMap<NodeTag, Vec<Dof>>,
    pub(crate) imposed: Vec<(NodeTag, usize, f64)>,
}

impl Numbering {
    /// Assignment of every DOF of `node`.
    #[must_use]
    pub fn dofs(&self, node: NodeTag) -> Option<&[Dof]> {
        self.dofs.get(&node).map(Vec::as_slice)
    }
}

/// Strategy assigning equation numbers to free DOFs.
///
/// Implementations only choose the node visiting order; numbering itself is
/// shared. Free DOFs receive consecutive equations in that order, prescribed
/// DOFs receive fixed slots in node insertion order and tied DOFs share the
/// equation of the DOF they follow.
pub trait Numberer: fmt::Debug + Send + Sync {
    /// Short name of the strategy.
    fn name(&self) -> &'static str;

    /// Node tags in the order their free DOFs are numbered.
    fn order(&self, domain: &Domain) -> Vec<NodeTag>;

    /// Number every DOF of the domain according to `plan`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnknownNode`] or [`DomainError::InvalidDof`] when the
    /// plan does not match the domain and [`DomainError::ConstraintCycle`] when a
    /// tied DOF does not lead to a free DOF.
    fn number(&self, domain: &Domain, plan: &DofPlan) -> Result<Numbering, DomainError> {
        number_in_order(domain, plan, &self.order(domain))
    }
}

fn number_in_order(
    domain: &Domain,
    plan: &DofPlan,
    order: &[NodeTag],
) -> Result<Numbering, DomainError> {
    let mut dofs: HashMap<NodeTag, Vec<Dof>> = domain
        .nodes()
        .map(|node| (node.tag(), vec![Dof::Unassigned; node.dof_count()]))
        .collect();

    let mut equations = 0;
    for &tag in order {
        let assigned = dofs.get_mut(&tag).ok_or(DomainError::UnknownNode(tag))?;
        for (dof, marker) in assigned.iter_mut().enumerate() {
            if plan.role(tag, dof)? == DofRole::Free {
                *marker = Dof::Equation(equations);
                equations += 1;
            }
        }
    }

    let mut fixed = 0;
    let mut imposed = Vec::new();
    for node in domain.nodes() {
        let tag = node.tag();
        let assigned = dofs.get_mut(&tag).ok_or(DomainError::UnknownNode(tag))?;
        for (dof, marker) in assigned.iter_mut().enumerate() {
            if let DofRole::Fixed(value) = plan.role(tag, dof)? {
                *marker = Dof::Fixed(fixed);
                fixed += 1;
                if value != 0.0 {
                    imposed.push((tag, dof, value));
                }
            }
        }
    }

    for (tag, dof) in plan.tied() {
        let DofRole::Tied {
            node: retained,
            dof: retained_dof,
        } = plan.role(tag, dof)?
        else {
            continue;
        };
        let governing = dofs
            .get(&retained)
            .and_then(|markers| markers.get(retained_dof))
            .copied()
            .ok_or(DomainError::UnknownNode(retained))?;
        let Dof::Equation(eq) = governing else {
            return Err(DomainError::ConstraintCycle { node: tag, dof });
        };
        if let Some(marker) = dofs.get_mut(&tag).and_then(|markers| markers.get_mut(dof)) {
            *marker = Dof::Tied(eq);
        }
    }

    Ok(Numbering {
        equations,
        fixed,
        dofs,
        imposed,
    })
}

/// Number DOFs in node insertion order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlainNumberer;

impl Numberer for PlainNumberer {
    fn name(&self) -> &'static str {
        "Plain"
    }

    fn order(&self, domain: &Domain) -> Vec<NodeTag> {
        domain.nodes().map(|node| node.tag()).collect()
    }
}

/// Reverse Cuthill-McKee ordering reducing the bandwidth of the system matrix.
///
/// Traversal starts from a node of minimum degree, visits neighbours by
/// ascending degree and breaks every tie by ascending node tag. Disconnected
/// components are traversed one after another.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReverseCuthillMcKee;

impl Numberer for ReverseCuthillMcKee {
    fn name(&self) -> &'static str {
        "RCM"
    }

    fn order(&self, domain: &Domain) -> Vec<NodeTag> {
        let graph = domain.graph();
        let adjacency: HashMap<NodeIndex, BTreeSet<NodeIndex>> = domain
            .node_indices()
            .iter()
            .map(|&index| {
                let neighbors = graph
                    .neighbors(index)
                    .filter(|&other| other != index)
                    .collect();
                (index, neighbors)
            })
            .collect();
        let key = |index: &NodeIndex| {
            (
                adjacency.get(index).map_or(0, BTreeSet::len),
                graph[*index].tag(),
            )
        };

        let mut candidates: Vec<NodeIndex> = domain.node_indices().to_vec();
        candidates.sort_by_key(|index| key(index));

        let mut visited: BTreeSet<NodeIndex> = BTreeSet::new();
        let mut order: Vec<NodeIndex> = Vec::with_capacity(candidates.len());
        for &start in &candidates {
            if !visited.insert(start) {
                continue;
            }
            let mut queue = VecDeque::from([start]);
            while let Some(current) = queue.pop_front() {
                order.push(current);
                let mut next: Vec<NodeIndex> = adjacency
                    .get(&current)
                    .into_iter()
                    .flatten()
                    .copied()
                    .filter(|neighbor| !visited.contains(neighbor))
                    .collect();
                next.sort_by_key(|index| key(index));
                for neighbor in next {
                    visited.insert(neighbor);
                    queue.push_back(neighbor);
                }
            }
        }
        order.into_iter().rev().map(|index| graph[index].tag()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Element, Truss};
    use crate::material::Elastic;
    use crate::node::Node;
    use crate::section::AreaSection;

    fn chain(insertion: &[NodeTag]) -> Domain {
        let mut domain = Domain::new();
        for &tag in insertion {
            #[allow(clippy::cast_precision_loss)]
            let x = tag as f64;
            let mut node = Node::new(tag, &[x, 0.0], 2).expect("valid node");
            node.set_fixity(&[tag == 1, true]).expect("two flags");
            domain.add_node(node).expect("new node");
        }
        for tag in 1..insertion.len() {
            let material = Box::new(Elastic::new(1, 1.0).expect("valid material"));
            let section = AreaSection::new(1, 1.0, material).expect("valid section");
            let bar: Box<dyn Element> = Box::new(Truss::new(tag, [tag, tag + 1], Box::new(section)));
            domain.add_element(bar).expect("new element");
        }
        domain
    }

    #[test]
    fn plain_numbering_is_a_bijection() {
        let domain = chain(&[1, 2, 3, 4]);
        let numbering = PlainNumberer
            .number(&domain, &DofPlan::from_fixity(&domain))
            .expect("numbering");
        assert_eq!(numbering.equations, 3);
        assert_eq!(numbering.fixed, 5);

        let mut equations: Vec<usize> = numbering
            .dofs
            .values()
            .flatten()
            .filter_map(|dof| dof.equation())
            .collect();
        equations.sort_unstable();
        assert_eq!(equations, vec![0, 1, 2]);
        assert_eq!(numbering.dofs(1), Some(&[Dof::Fixed(0), Dof::Fixed(1)][..]));
        assert_eq!(numbering.dofs(2), Some(&[Dof::Equation(0), Dof::Fixed(2)][..]));
    }

    #[test]
    fn rcm_starts_at_the_lowest_degree_node_with_smallest_tag() {
        let domain = chain(&[1, 2, 3, 4, 5]);
        let order = ReverseCuthillMcKee.order(&domain);
        assert_eq!(order, vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn rcm_reduces_bandwidth_of_a_scrambled_chain() {
        let insertion = [1, 10, 2, 9, 3, 8, 4, 7, 5, 6];
        let mut plain = chain(&insertion);
        let plan = DofPlan::from_fixity(&plain);
        let numbering = PlainNumberer.number(&plain, &plan).expect("numbering");
        plain.apply_numbering(numbering).expect("known nodes");

        let mut reordered = chain(&insertion);
        let numbering = ReverseCuthillMcKee.number(&reordered, &plan).expect("numbering");
        reordered.apply_numbering(numbering).expect("known nodes");

        let plain_bandwidth = plain.bandwidth().expect("numbered");
        let rcm_bandwidth = reordered.bandwidth().expect("numbered");
        assert_eq!(rcm_bandwidth, 1);
        assert!(rcm_bandwidth < plain_bandwidth);
    }

    #[test]
    fn disconnected_components_are_all_visited() {
        let mut domain = chain(&[1, 2, 3]);
        domain
            .add_node(Node::new(7, &[9.0, 9.0], 2).expect("valid node"))
            .expect("new node");
        let order = ReverseCuthillMcKee.order(&domain);
        assert_eq!(order.len(), 4);
        assert_eq!(order.last(), Some(&7));
    }

    #[test]
    fn tied_dofs_share_the_retained_equation() {
        let domain = chain(&[1, 2, 3]);
        let mut plan = DofPlan::from_fixity(&domain);
        plan.set_role(3, 0, DofRole::Tied { node: 2, dof: 0 })
            .expect("known dof");
        let numbering = PlainNumberer.number(&domain, &plan).expect("numbering");
        assert_eq!(numbering.equations, 1);
        assert_eq!(numbering.dofs(3).map(|dofs| dofs[0]), Some(Dof::Tied(0)));
    }
}
