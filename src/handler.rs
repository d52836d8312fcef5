//! Constraint handlers turning the partitioned assembly into a solvable system.

use std::collections::HashMap;
use std::fmt;

use nalgebra_sparse::CooMatrix;

use crate::assembly::{PartitionedMatrix, PartitionedVector, Slot};
use crate::constraint::Constraint;
use crate::containers::Vector;
use crate::domain::Domain;
use crate::errors::{ConfigError, DomainError};
use crate::integrator::Coefficients;
use crate::node::{Dof, NodeTag};
use crate::numberer::{DofPlan, DofRole};

/// Strategy enforcing single-point and multi-point constraints.
///
/// The handler decides which DOFs become equations ([`ConstraintHandler::plan`]),
/// reduces the partitioned assembly to the system handed to the solver and
/// maps the solution back to nodal increments.
pub trait ConstraintHandler: fmt::Debug + Send + Sync {
    /// Short name of the strategy.
    fn name(&self) -> &'static str;

    /// Check the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidParameter`] for inadmissible parameters.
    fn validate(&self) -> Result<(), ConfigError> {
        Ok(())
    }

    /// Role of every DOF, consumed by the numberer.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ConflictingConstraint`] when a DOF is constrained
    /// twice and [`DomainError::ConstraintCycle`] for circular ties.
    fn plan(&self, domain: &Domain) -> Result<DofPlan, DomainError>;

    /// System matrix acting on the equations, for an assembly weighted by `coefficients`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotNumbered`] when the domain has no current numbering.
    fn transform_matrix(
        &self,
        domain: &Domain,
        matrix: PartitionedMatrix,
        coefficients: Coefficients,
    ) -> Result<CooMatrix<f64>, DomainError>;

    /// Right-hand side acting on the equations.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotNumbered`] when the domain has no current numbering.
    fn transform_residual(
        &self,
        domain: &Domain,
        residual: PartitionedVector,
    ) -> Result<Vector, DomainError>;

    /// Nodal displacement increments for a solution of the system.
    ///
    /// Free and tied DOFs take the value of their equation, prescribed DOFs
    /// do not move.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotNumbered`] when the domain has no current numbering.
    fn recover(
        &self,
        domain: &Domain,
        solution: &Vector,
    ) -> Result<HashMap<NodeTag, Vector>, DomainError> {
        if domain.equation_count() != Some(solution.len()) {
            return Err(DomainError::NotNumbered);
        }
        Ok(domain
            .nodes()
            .map(|node| {
                let delta = node.dofs().iter().map(|dof| match dof {
                    Dof::Equation(eq) | Dof::Tied(eq) => solution[*eq],
                    Dof::Fixed(_) | Dof::Unassigned => 0.0,
                });
                (node.tag(), Vector::from_iterator(node.dof_count(), delta))
            })
            .collect())
    }
}

/// Resolve every constraint of the domain into DOF roles.
///
/// Chains of ties collapse onto their root DOF; a tie whose root is
/// prescribed becomes prescribed itself.
fn eliminate(domain: &Domain) -> Result<DofPlan, DomainError> {
    let mut plan = DofPlan::from_fixity(domain);
    for (_, constraint) in domain.constraints() {
        match constraint {
            Constraint::Fix { node, dof, value } => {
                claim(&mut plan, *node, *dof, DofRole::Fixed(*value))?;
            }
            Constraint::EqualDof {
                retained,
                constrained,
                dofs,
            } => {
                for &dof in dofs {
                    if retained == constrained {
                        return Err(DomainError::ConstraintCycle {
                            node: *constrained,
                            dof,
                        });
                    }
                    let role = DofRole::Tied {
                        node: *retained,
                        dof,
                    };
                    claim(&mut plan, *constrained, dof, role)?;
                }
            }
        }
    }

    let limit = plan.tied().len();
    for (node, dof) in plan.tied() {
        let mut current = plan.role(node, dof)?;
        let mut hops = 0;
        let root = loop {
            match current {
                DofRole::Tied {
                    node: next,
                    dof: next_dof,
                } => {
                    hops += 1;
                    if hops > limit {
                        return Err(DomainError::ConstraintCycle { node, dof });
                    }
                    current = plan.role(next, next_dof)?;
                    if let DofRole::Free = current {
                        break DofRole::Tied {
                            node: next,
                            dof: next_dof,
                        };
                    }
                }
                fixed @ DofRole::Fixed(_) => break fixed,
                DofRole::Free => break DofRole::Free,
            }
        };
        plan.set_role(node, dof, root)?;
    }
    Ok(plan)
}

fn claim(plan: &mut DofPlan, node: NodeTag, dof: usize, role: DofRole) -> Result<(), DomainError> {
    if plan.role(node, dof)? != DofRole::Free {
        return Err(DomainError::ConflictingConstraint { node, dof });
    }
    plan.set_role(node, dof, role)
}

fn slot_of(domain: &Domain, node: NodeTag, dof: usize) -> Result<Slot, DomainError> {
    let marker = domain
        .node(node)
        .ok_or(DomainError::UnknownNode(node))?
        .dofs()
        .get(dof)
        .copied()
        .ok_or(DomainError::NotNumbered)?;
    Slot::of(marker).ok_or(DomainError::NotNumbered)
}

fn trial_value(domain: &Domain, node: NodeTag, dof: usize) -> Result<f64, DomainError> {
    let node = domain.node(node).ok_or(DomainError::UnknownNode(node))?;
    node.trial_displacement()
        .get(dof)
        .copied()
        .ok_or(DomainError::InvalidDof {
            node: node.tag(),
            dof,
            available: node.dof_count(),
        })
}

/// Elimination of constrained DOFs.
///
/// Prescribed DOFs leave the system; their imposed values enter the residual
/// through the coupling block. Tied DOFs share the equation of their root.
///
/// # Examples
/// ```
/// use equilibria::handler::{ConstraintHandler, PlainHandler};
///
/// assert_eq!(PlainHandler.name(), "Plain");
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlainHandler;

impl ConstraintHandler for PlainHandler {
    fn name(&self) -> &'static str {
        "Plain"
    }

    fn plan(&self, domain: &Domain) -> Result<DofPlan, DomainError> {
        eliminate(domain)
    }

    fn transform_matrix(
        &self,
        _domain: &Domain,
        matrix: PartitionedMatrix,
        _coefficients: Coefficients,
    ) -> Result<CooMatrix<f64>, DomainError> {
        Ok(matrix.uu)
    }

    fn transform_residual(
        &self,
        _domain: &Domain,
        residual: PartitionedVector,
    ) -> Result<Vector, DomainError> {
        Ok(residual.free)
    }
}

/// Penalty enforcement of constraints.
///
/// Node fixity is still eliminated. Each constrained DOF stays an equation
/// and receives a stiff spring of stiffness `alpha` towards its target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PenaltyHandler {
    alpha: f64,
}

impl Default for PenaltyHandler {
    fn default() -> Self {
        Self { alpha: 1.0e12 }
    }
}

impl PenaltyHandler {
    /// Penalty handler with spring stiffness `alpha`.
    #[must_use]
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }

    /// Penalty stiffness.
    #[must_use]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }
}

impl ConstraintHandler for PenaltyHandler {
    fn name(&self) -> &'static str {
        "Penalty"
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.alpha <= 0.0 || !self.alpha.is_finite() {
            return Err(ConfigError::InvalidParameter {
                component: self.name(),
                parameter: "alpha",
                value: self.alpha,
            });
        }
        Ok(())
    }

    fn plan(&self, domain: &Domain) -> Result<DofPlan, DomainError> {
        eliminate(domain)?;
        Ok(DofPlan::from_fixity(domain))
    }

    fn transform_matrix(
        &self,
        domain: &Domain,
        matrix: PartitionedMatrix,
        coefficients: Coefficients,
    ) -> Result<CooMatrix<f64>, DomainError> {
        let mut system = matrix.uu;
        // Penalty springs are stiffness; mass and damping assemblies carry none.
        let alpha = self.alpha * coefficients.stiffness;
        if alpha == 0.0 {
            return Ok(system);
        }
        for (_, constraint) in domain.constraints() {
            match constraint {
                Constraint::Fix { node, dof, .. } => {
                    if let Slot::Free(eq) = slot_of(domain, *node, *dof)? {
                        system.push(eq, eq, alpha);
                    }
                }
                Constraint::EqualDof {
                    retained,
                    constrained,
                    dofs,
                } => {
                    for &dof in dofs {
                        let a = slot_of(domain, *retained, dof)?;
                        let b = slot_of(domain, *constrained, dof)?;
                        if let Slot::Free(i) = a {
                            system.push(i, i, alpha);
                        }
                        if let Slot::Free(j) = b {
                            system.push(j, j, alpha);
                        }
                        if let (Slot::Free(i), Slot::Free(j)) = (a, b) {
                            system.push(i, j, -alpha);
                            system.push(j, i, -alpha);
                        }
                    }
                }
            }
        }
        Ok(system)
    }

    fn transform_residual(
        &self,
        domain: &Domain,
        residual: PartitionedVector,
    ) -> Result<Vector, DomainError> {
        let mut rhs = residual.free;
        let alpha = self.alpha;
        for (_, constraint) in domain.constraints() {
            match constraint {
                Constraint::Fix { node, dof, value } => {
                    if let Slot::Free(eq) = slot_of(domain, *node, *dof)? {
                        rhs[eq] += alpha * (value - trial_value(domain, *node, *dof)?);
                    }
                }
                Constraint::EqualDof {
                    retained,
                    constrained,
                    dofs,
                } => {
                    for &dof in dofs {
                        let gap = trial_value(domain, *retained, dof)?
                            - trial_value(domain, *constrained, dof)?;
                        if let Slot::Free(i) = slot_of(domain, *retained, dof)? {
                            rhs[i] -= alpha * gap;
                        }
                        if let Slot::Free(j) = slot_of(domain, *constrained, dof)? {
                            rhs[j] += alpha * gap;
                        }
                    }
                }
            }
        }
        Ok(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;
    use crate::numberer::{Numberer, PlainNumberer};

    fn three_nodes() -> Domain {
        let mut domain = Domain::new();
        for tag in 1..=3 {
            #[allow(clippy::cast_precision_loss)]
            let x = tag as f64;
            domain
                .add_node(Node::new(tag, &[x, 0.0], 2).expect("valid node"))
                .expect("new node");
        }
        domain
            .node_mut(1)
            .expect("known node")
            .set_fixity(&[true, false])
            .expect("two flags");
        domain
    }

    #[test]
    fn ties_resolve_to_their_root() {
        let mut domain = three_nodes();
        domain
            .add_constraint(Constraint::equal_dof(2, 3, &[1]))
            .expect("valid constraint");
        domain
            .add_constraint(Constraint::equal_dof(1, 2, &[1]))
            .expect("valid constraint");
        let plan = PlainHandler.plan(&domain).expect("resolvable");
        assert_eq!(plan.role(3, 1), Ok(DofRole::Tied { node: 1, dof: 1 }));
        assert_eq!(plan.role(2, 1), Ok(DofRole::Tied { node: 1, dof: 1 }));
        assert_eq!(plan.role(1, 1), Ok(DofRole::Free));
    }

    #[test]
    fn ties_onto_prescribed_dofs_become_prescribed() {
        let mut domain = three_nodes();
        domain
            .add_constraint(Constraint::equal_dof(1, 2, &[0]))
            .expect("valid constraint");
        let plan = PlainHandler.plan(&domain).expect("resolvable");
        assert_eq!(plan.role(2, 0), Ok(DofRole::Fixed(0.0)));
    }

    #[test]
    fn cycles_and_double_constraints_are_rejected() {
        let mut domain = three_nodes();
        domain
            .add_constraint(Constraint::equal_dof(2, 3, &[1]))
            .expect("valid constraint");
        domain
            .add_constraint(Constraint::equal_dof(3, 2, &[1]))
            .expect("valid constraint");
        assert!(matches!(
            PlainHandler.plan(&domain),
            Err(DomainError::ConstraintCycle { .. })
        ));

        let mut domain = three_nodes();
        domain
            .add_constraint(Constraint::fix(1, 0, 0.0))
            .expect("valid constraint");
        assert_eq!(
            PenaltyHandler::default().plan(&domain),
            Err(DomainError::ConflictingConstraint { node: 1, dof: 0 })
        );
    }

    #[test]
    fn penalty_keeps_constrained_dofs_as_equations() {
        let mut domain = three_nodes();
        domain
            .add_constraint(Constraint::fix(3, 1, 0.5))
            .expect("valid constraint");
        let plan = PenaltyHandler::default().plan(&domain).expect("resolvable");
        assert_eq!(plan.role(3, 1), Ok(DofRole::Free));
        let plan = PlainHandler.plan(&domain).expect("resolvable");
        assert_eq!(plan.role(3, 1), Ok(DofRole::Fixed(0.5)));
    }

    #[test]
    fn penalty_springs_only_enter_stiffness_assemblies() {
        let mut domain = three_nodes();
        domain
            .add_constraint(Constraint::fix(3, 1, 0.5))
            .expect("valid constraint");
        domain.domain().expect("valid model");
        let handler = PenaltyHandler::new(1.0e6);
        let plan = handler.plan(&domain).expect("resolvable");
        let numbering = PlainNumberer.number(&domain, &plan).expect("numbering");
        domain.apply_numbering(numbering).expect("known nodes");
        let eq = domain.node(3).expect("known node").dofs()[1]
            .equation()
            .expect("penalty keeps an equation");

        let mass = domain.assemble_matrix(Coefficients::MASS).expect("numbered");
        let mass = handler
            .transform_matrix(&domain, mass, Coefficients::MASS)
            .expect("numbered");
        assert_eq!(nalgebra::DMatrix::from(&mass).amax(), 0.0);

        let stiffness = domain.assemble_matrix(Coefficients::STATIC).expect("numbered");
        let stiffness = handler
            .transform_matrix(&domain, stiffness, Coefficients::STATIC)
            .expect("numbered");
        assert_eq!(nalgebra::DMatrix::from(&stiffness)[(eq, eq)], 1.0e6);
    }
}
