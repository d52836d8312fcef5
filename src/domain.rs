//! The domain: owner of every node, element, constraint and load pattern.

use std::collections::HashMap;

use nalgebra_sparse::CooMatrix;
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableUnGraph};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::assembly::{PartitionedMatrix, PartitionedVector, Slot};
use crate::config::Tolerances;
use crate::constraint::{Constraint, ConstraintTag};
use crate::containers::{self, Matrix, Vector};
use crate::element::{Element, ElementTag};
use crate::errors::DomainError;
use crate::integrator::Coefficients;
use crate::node::{Dof, Kinematics, Node, NodeTag};
use crate::numberer::Numbering;
use crate::pattern::Pattern;
use crate::state::StateMachine;

/// Rayleigh damping `C = mass * M + stiffness * K_t`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rayleigh {
    /// Mass proportional coefficient.
    pub mass: f64,
    /// Tangent stiffness proportional coefficient.
    pub stiffness: f64,
}

impl Rayleigh {
    /// Damping coefficients giving `ratio` of critical damping at circular
    /// frequencies `omega_i` and `omega_j`.
    #[must_use]
    pub fn from_modes(ratio: f64, omega_i: f64, omega_j: f64) -> Self {
        let sum = omega_i + omega_j;
        Self {
            mass: 2.0 * ratio * omega_i * omega_j / sum,
            stiffness: 2.0 * ratio / sum,
        }
    }
}

#[derive(Debug)]
struct ElementEntry {
    element: Box<dyn Element>,
    nodes: Vec<NodeIndex>,
    edges: Vec<EdgeIndex>,
}

#[derive(Clone, Debug)]
struct NumberingState {
    revision: u64,
    equations: usize,
    fixed: usize,
    imposed: Vec<(NodeIndex, usize, f64)>,
}

/// Container for a finite element model and its evolving state.
///
/// Connectivity is stored as an undirected graph whose vertices are nodes and
/// whose edges join every pair of nodes sharing an element. Nodes and
/// elements are addressed by user tags; iteration follows insertion order.
///
/// # Examples
/// ```
/// use equilibria::element::Truss;
/// use equilibria::material::Elastic;
/// use equilibria::section::AreaSection;
/// use equilibria::{Domain, Node};
///
/// let mut domain = Domain::new();
/// domain.add_node(Node::new(1, &[0.0, 0.0], 2)?.with_fixity(&[true, true])?)?;
/// domain.add_node(Node::new(2, &[1.0, 0.0], 2)?)?;
/// let section = AreaSection::new(1, 1.0e-3, Box::new(Elastic::new(1, 200.0e9)?))?;
/// domain.add_element(Box::new(Truss::new(1, [1, 2], Box::new(section))))?;
/// domain.domain()?;
/// assert_eq!(domain.node_count(), 2);
/// assert_eq!(domain.element_count(), 1);
/// # Ok::<(), equilibria::DomainError>(())
/// ```
#[derive(Debug, Default)]
pub struct Domain {
    graph: StableUnGraph<Node, ElementTag>,
    node_order: Vec<NodeIndex>,
    node_lookup: HashMap<NodeTag, NodeIndex>,
    elements: Vec<ElementEntry>,
    element_lookup: HashMap<ElementTag, usize>,
    constraints: Vec<(ConstraintTag, Constraint)>,
    next_constraint: ConstraintTag,
    patterns: Vec<Pattern>,
    damping: Rayleigh,
    tolerances: Tolerances,
    time: f64,
    committed_time: f64,
    commits: usize,
    revision: u64,
    finalized: Option<u64>,
    numbering: Option<NumberingState>,
}

impl Domain {
    /// Create an empty domain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty domain with custom geometric tolerances.
    #[must_use]
    pub fn with_tolerances(tolerances: Tolerances) -> Self {
        Self {
            tolerances,
            ..Self::default()
        }
    }

    /// Geometric tolerances.
    #[must_use]
    pub fn tolerances(&self) -> &Tolerances {
        &self.tolerances
    }

    /// Counter bumped by every structural change.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn invalidate(&mut self) {
        self.revision += 1;
    }

    /// Add a node.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::DuplicateNode`] when the tag is already in use.
    pub fn add_node(&mut self, node: Node) -> Result<(), DomainError> {
        if self.node_lookup.contains_key(&node.tag()) {
            return Err(DomainError::DuplicateNode(node.tag()));
        }
        self.invalidate();
        let tag = node.tag();
        let index = self.graph.add_node(node);
        self.node_order.push(index);
        self.node_lookup.insert(tag, index);
        Ok(())
    }

    /// Remove a node together with every element, constraint and load that references it.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnknownNode`] when the tag is not part of this domain.
    pub fn remove_node(&mut self, tag: NodeTag) -> Result<Node, DomainError> {
        let index = self.index_of(tag)?;
        let attached: Vec<ElementTag> = self
            .elements
            .iter()
            .filter(|entry| entry.nodes.contains(&index))
            .map(|entry| entry.element.tag())
            .collect();
        for element in attached {
            self.remove_element(element)?;
        }
        self.constraints
            .retain(|(_, constraint)| !constraint.references(tag));
        for pattern in &mut self.patterns {
            pattern.detach(tag);
        }
        self.invalidate();
        self.node_order.retain(|&idx| idx != index);
        self.node_lookup.remove(&tag);
        self.graph
            .remove_node(index)
            .ok_or(DomainError::UnknownNode(tag))
    }

    /// Look up a node.
    #[must_use]
    pub fn node(&self, tag: NodeTag) -> Option<&Node> {
        self.node_lookup.get(&tag).map(|&index| &self.graph[index])
    }

    /// Mutable access to a node. Any change invalidates the equation numbering.
    pub fn node_mut(&mut self, tag: NodeTag) -> Option<&mut Node> {
        let index = *self.node_lookup.get(&tag)?;
        self.invalidate();
        self.graph.node_weight_mut(index)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.node_order.iter().map(move |&index| &self.graph[index])
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.node_order.len()
    }

    fn index_of(&self, tag: NodeTag) -> Result<NodeIndex, DomainError> {
        self.node_lookup
            .get(&tag)
            .copied()
            .ok_or(DomainError::UnknownNode(tag))
    }

    /// Tags of the nodes sharing at least one element with `tag`, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnknownNode`] when the tag is not part of this domain.
    pub fn neighbors(&self, tag: NodeTag) -> Result<Vec<NodeTag>, DomainError> {
        let index = self.index_of(tag)?;
        let mut tags: Vec<NodeTag> = self
            .graph
            .neighbors(index)
            .filter(|&other| other != index)
            .map(|other| self.graph[other].tag())
            .collect();
        tags.sort_unstable();
        tags.dedup();
        Ok(tags)
    }

    /// Add an element.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::DuplicateElement`] when the tag is already in use and
    /// [`DomainError::DanglingReference`] when a connected node is missing.
    pub fn add_element(&mut self, element: Box<dyn Element>) -> Result<(), DomainError> {
        let tag = element.tag();
        if self.element_lookup.contains_key(&tag) {
            return Err(DomainError::DuplicateElement(tag));
        }
        let nodes = element
            .node_tags()
            .iter()
            .map(|&node| {
                self.node_lookup
                    .get(&node)
                    .copied()
                    .ok_or(DomainError::DanglingReference { element: tag, node })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.invalidate();
        let mut edges = Vec::new();
        for (i, &a) in nodes.iter().enumerate() {
            for &b in &nodes[i + 1..] {
                if a != b {
                    edges.push(self.graph.add_edge(a, b, tag));
                }
            }
        }
        self.element_lookup.insert(tag, self.elements.len());
        self.elements.push(ElementEntry {
            element,
            nodes,
            edges,
        });
        Ok(())
    }

    /// Remove an element and return it.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnknownElement`] when the tag is not part of this domain.
    pub fn remove_element(&mut self, tag: ElementTag) -> Result<Box<dyn Element>, DomainError> {
        let position = self
            .element_lookup
            .get(&tag)
            .copied()
            .ok_or(DomainError::UnknownElement(tag))?;
        self.invalidate();
        let entry = self.elements.remove(position);
        for edge in entry.edges {
            self.graph.remove_edge(edge);
        }
        self.element_lookup = self
            .elements
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.element.tag(), position))
            .collect();
        Ok(entry.element)
    }

    /// Look up an element.
    #[must_use]
    pub fn element(&self, tag: ElementTag) -> Option<&dyn Element> {
        self.element_lookup
            .get(&tag)
            .map(|&position| self.elements[position].element.as_ref())
    }

    /// Elements in insertion order.
    pub fn elements(&self) -> impl Iterator<Item = &dyn Element> + '_ {
        self.elements.iter().map(|entry| entry.element.as_ref())
    }

    /// Number of elements.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Add a constraint and return the tag assigned to it.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnknownNode`] when a referenced node is missing and
    /// [`DomainError::InvalidDof`] when a referenced DOF does not exist.
    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<ConstraintTag, DomainError> {
        self.check_constraint(&constraint)?;
        self.invalidate();
        let tag = self.next_constraint;
        self.next_constraint += 1;
        self.constraints.push((tag, constraint));
        Ok(tag)
    }

    fn check_constraint(&self, constraint: &Constraint) -> Result<(), DomainError> {
        for (tag, dof) in constraint.addressed_dofs() {
            let node = self.node(tag).ok_or(DomainError::UnknownNode(tag))?;
            if dof >= node.dof_count() {
                return Err(DomainError::InvalidDof {
                    node: tag,
                    dof,
                    available: node.dof_count(),
                });
            }
        }
        for tag in constraint.nodes() {
            self.index_of(tag)?;
        }
        Ok(())
    }

    /// Remove a constraint.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnknownConstraint`] when the tag is not part of this domain.
    pub fn remove_constraint(&mut self, tag: ConstraintTag) -> Result<Constraint, DomainError> {
        let position = self
            .constraints
            .iter()
            .position(|(existing, _)| *existing == tag)
            .ok_or(DomainError::UnknownConstraint(tag))?;
        self.invalidate();
        Ok(self.constraints.remove(position).1)
    }

    /// Constraints with their tags, in insertion order.
    pub fn constraints(&self) -> impl Iterator<Item = (ConstraintTag, &Constraint)> + '_ {
        self.constraints.iter().map(|(tag, constraint)| (*tag, constraint))
    }

    /// Add a load pattern.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::DuplicatePattern`] when the tag is already in use,
    /// [`DomainError::InvalidTimeSeries`] for a malformed series and
    /// [`DomainError::UnknownNode`] or [`DomainError::WrongLength`] for a bad nodal load.
    pub fn add_pattern(&mut self, pattern: Pattern) -> Result<(), DomainError> {
        if self.patterns.iter().any(|existing| existing.tag() == pattern.tag()) {
            return Err(DomainError::DuplicatePattern(pattern.tag()));
        }
        self.check_pattern(&pattern)?;
        self.invalidate();
        self.patterns.push(pattern);
        Ok(())
    }

    fn check_pattern(&self, pattern: &Pattern) -> Result<(), DomainError> {
        pattern.series().validate()?;
        for load in pattern.loads() {
            let node = self.node(load.node).ok_or(DomainError::UnknownNode(load.node))?;
            if load.values.len() != node.dof_count() {
                return Err(DomainError::WrongLength {
                    node: load.node,
                    what: "nodal load",
                    expected: node.dof_count(),
                    received: load.values.len(),
                });
            }
        }
        Ok(())
    }

    /// Remove a load pattern.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnknownPattern`] when the tag is not part of this domain.
    pub fn remove_pattern(&mut self, tag: usize) -> Result<Pattern, DomainError> {
        let position = self
            .patterns
            .iter()
            .position(|pattern| pattern.tag() == tag)
            .ok_or(DomainError::UnknownPattern(tag))?;
        self.invalidate();
        Ok(self.patterns.remove(position))
    }

    /// Load patterns in insertion order.
    #[must_use]
    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// Rayleigh damping coefficients.
    #[must_use]
    pub fn damping(&self) -> Rayleigh {
        self.damping
    }

    /// Replace the Rayleigh damping coefficients.
    pub fn set_damping(&mut self, damping: Rayleigh) {
        self.damping = damping;
    }

    /// Validate the model and resolve element geometry.
    ///
    /// Must succeed before assembly; it is called by the analysis whenever the
    /// model has changed.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Empty`] for a model without nodes or elements and
    /// propagates element, constraint and pattern validation errors.
    pub fn domain(&mut self) -> Result<(), DomainError> {
        if self.node_order.is_empty() {
            return Err(DomainError::Empty("nodes"));
        }
        if self.elements.is_empty() {
            return Err(DomainError::Empty("elements"));
        }
        let graph = &self.graph;
        let tolerances = self.tolerances;
        for entry in &mut self.elements {
            let nodes: Vec<&Node> = entry.nodes.iter().map(|&index| &graph[index]).collect();
            entry.element.set_domain(&nodes, &tolerances)?;
            entry.element.update(&nodes)?;
        }
        for (_, constraint) in &self.constraints {
            self.check_constraint(constraint)?;
        }
        for pattern in &self.patterns {
            self.check_pattern(pattern)?;
        }
        self.finalized = Some(self.revision);
        self.apply_load(self.time)
    }

    /// Return `true` when [`Domain::domain`] succeeded after the last structural change.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized == Some(self.revision)
    }

    pub(crate) fn graph(&self) -> &StableUnGraph<Node, ElementTag> {
        &self.graph
    }

    pub(crate) fn node_indices(&self) -> &[NodeIndex] {
        &self.node_order
    }

    /// Store the equation numbers produced by a numberer on the nodes.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnknownNode`] when the numbering refers to a missing node.
    pub fn apply_numbering(&mut self, numbering: Numbering) -> Result<(), DomainError> {
        let imposed = numbering
            .imposed
            .iter()
            .map(|&(tag, dof, value)| Ok((self.index_of(tag)?, dof, value)))
            .collect::<Result<Vec<_>, DomainError>>()?;
        for (tag, dofs) in numbering.dofs {
            let index = self.index_of(tag)?;
            self.graph[index].set_dofs(dofs);
        }
        self.numbering = Some(NumberingState {
            revision: self.revision,
            equations: numbering.equations,
            fixed: numbering.fixed,
            imposed,
        });
        Ok(())
    }

    fn numbering(&self) -> Result<&NumberingState, DomainError> {
        self.numbering
            .as_ref()
            .filter(|state| state.revision == self.revision)
            .ok_or(DomainError::NotNumbered)
    }

    /// Number of equations of the current numbering.
    #[must_use]
    pub fn equation_count(&self) -> Option<usize> {
        self.numbering().ok().map(|state| state.equations)
    }

    /// Number of prescribed DOFs of the current numbering.
    #[must_use]
    pub fn fixed_count(&self) -> Option<usize> {
        self.numbering().ok().map(|state| state.fixed)
    }

    /// Largest difference between equation numbers coupled by one element.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotNumbered`] when no current numbering exists.
    pub fn bandwidth(&self) -> Result<usize, DomainError> {
        let size = self.numbering()?.equations;
        let mut pattern = CooMatrix::new(size, size);
        for entry in &self.elements {
            let equations: Vec<usize> = entry
                .nodes
                .iter()
                .flat_map(|&index| self.graph[index].dofs().iter().filter_map(|dof| dof.equation()))
                .collect();
            for &row in &equations {
                for &col in &equations {
                    pattern.push(row, col, 1.0);
                }
            }
        }
        Ok(containers::bandwidth(&pattern))
    }

    fn slots(&self, nodes: &[NodeIndex]) -> Result<Vec<Slot>, DomainError> {
        nodes
            .iter()
            .flat_map(|&index| self.graph[index].dofs().iter())
            .map(|&dof| Slot::of(dof).ok_or(DomainError::NotNumbered))
            .collect()
    }

    /// Current (pseudo) time.
    #[must_use]
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Time of the last commit.
    #[must_use]
    pub fn committed_time(&self) -> f64 {
        self.committed_time
    }

    /// Set the current time and recompute every nodal load from the patterns.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnknownNode`] or [`DomainError::WrongLength`] when a
    /// pattern load no longer matches the model.
    pub fn apply_load(&mut self, time: f64) -> Result<(), DomainError> {
        self.time = time;
        for node in self.graph.node_weights_mut() {
            node.zero_load();
        }
        for pattern in &self.patterns {
            match pattern {
                Pattern::Plain { series, loads, .. } => {
                    let factor = series.factor(time);
                    for load in loads {
                        let index = *self
                            .node_lookup
                            .get(&load.node)
                            .ok_or(DomainError::UnknownNode(load.node))?;
                        let node = &mut self.graph[index];
                        if load.values.len() != node.dof_count() {
                            return Err(DomainError::WrongLength {
                                node: load.node,
                                what: "nodal load",
                                expected: node.dof_count(),
                                received: load.values.len(),
                            });
                        }
                        node.add_load(&Vector::from_row_slice(&load.values), factor);
                    }
                }
                Pattern::UniformExcitation { series, dof, .. } => {
                    let acceleration = series.factor(time);
                    for node in self.graph.node_weights_mut() {
                        if *dof < node.dof_count() {
                            let inertia = -node.mass()[*dof] * acceleration;
                            node.add_load_component(*dof, inertia);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Rate of change of the nodal loads with respect to time, partitioned.
    ///
    /// Only plain patterns contribute; this is the reference load used by
    /// displacement control.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotNumbered`] when no current numbering exists.
    pub fn reference_load(&self) -> Result<PartitionedVector, DomainError> {
        let state = self.numbering()?;
        let mut reference = PartitionedVector::zeros(state.equations, state.fixed);
        for pattern in &self.patterns {
            let slope = pattern.series().slope(self.time);
            for load in pattern.loads() {
                let node = self.node(load.node).ok_or(DomainError::UnknownNode(load.node))?;
                for (&dof, value) in node.dofs().iter().zip(&load.values) {
                    let slot = Slot::of(dof).ok_or(DomainError::NotNumbered)?;
                    reference.add(slot, slope * value);
                }
            }
        }
        Ok(reference)
    }

    fn gather(nodes: &[&Node], pick: impl Fn(&Node) -> &Vector) -> Vector {
        let size = nodes.iter().map(|node| node.dof_count()).sum();
        Vector::from_iterator(size, nodes.iter().flat_map(|node| pick(node).iter().copied()))
    }

    fn node_refs(&self, entry: &ElementEntry) -> Vec<&Node> {
        entry.nodes.iter().map(|&index| &self.graph[index]).collect()
    }

    /// Internal, damping and inertial force of each element at the trial state.
    fn element_forces(&self) -> Vec<Vector> {
        let damping = self.damping;
        self.elements
            .par_iter()
            .map(|entry| {
                let nodes = self.node_refs(entry);
                let element = &entry.element;
                let mut force = element.resisting_force();
                let velocity = Self::gather(&nodes, Node::trial_velocity);
                if damping.stiffness != 0.0 && velocity.amax() > 0.0 {
                    force += element.tangent_stiffness() * &velocity * damping.stiffness;
                }
                if let Some(mass) = element.mass_matrix() {
                    let acceleration = Self::gather(&nodes, Node::trial_acceleration);
                    force += mass * (acceleration + velocity * damping.mass);
                }
                force
            })
            .collect()
    }

    fn node_inertia(&self, node: &Node) -> Vector {
        let kinematics = node.trial();
        node.mass()
            .component_mul(&(&kinematics.acceleration + &kinematics.velocity * self.damping.mass))
    }

    /// Assemble `stiffness * K_t + damping * C + mass * M` into partitioned blocks.
    ///
    /// Element contributions are formed in parallel and scattered serially.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotNumbered`] when no current numbering exists.
    pub fn assemble_matrix(&self, coefficients: Coefficients) -> Result<PartitionedMatrix, DomainError> {
        let state = self.numbering()?;
        let damping = self.damping;
        let stiffness_factor = coefficients.stiffness + coefficients.damping * damping.stiffness;
        let mass_factor = coefficients.mass + coefficients.damping * damping.mass;

        let contributions = self
            .elements
            .par_iter()
            .map(|entry| {
                let slots = self.slots(&entry.nodes)?;
                let element = &entry.element;
                let mut matrix: Matrix = element.tangent_stiffness() * stiffness_factor;
                if mass_factor != 0.0 {
                    if let Some(mass) = element.mass_matrix() {
                        matrix += mass * mass_factor;
                    }
                }
                Ok((slots, matrix))
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        let mut global = PartitionedMatrix::new(state.equations, state.fixed);
        for (slots, matrix) in contributions {
            for (row, &row_slot) in slots.iter().enumerate() {
                for (col, &col_slot) in slots.iter().enumerate() {
                    let value = matrix[(row, col)];
                    if value != 0.0 {
                        global.push(row_slot, col_slot, value);
                    }
                }
            }
        }
        if mass_factor != 0.0 {
            for node in self.nodes() {
                for (&dof, &mass) in node.dofs().iter().zip(node.mass().iter()) {
                    if mass != 0.0 {
                        let slot = Slot::of(dof).ok_or(DomainError::NotNumbered)?;
                        global.push(slot, slot, mass * mass_factor);
                    }
                }
            }
        }
        Ok(global)
    }

    /// Assemble the unbalanced force `F_ext - F_int - C v - M a` into partitions.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotNumbered`] when no current numbering exists.
    pub fn assemble_residual(&self) -> Result<PartitionedVector, DomainError> {
        let state = self.numbering()?;
        let mut residual = PartitionedVector::zeros(state.equations, state.fixed);
        for node in self.nodes() {
            let unbalance = node.load() - self.node_inertia(node);
            for (&dof, value) in node.dofs().iter().zip(unbalance.iter()) {
                let slot = Slot::of(dof).ok_or(DomainError::NotNumbered)?;
                residual.add(slot, *value);
            }
        }
        for (entry, force) in self.elements.iter().zip(self.element_forces()) {
            for (slot, value) in self.slots(&entry.nodes)?.into_iter().zip(force.iter()) {
                residual.add(slot, -value);
            }
        }
        Ok(residual)
    }

    /// Trial displacements gathered into partitions.
    ///
    /// Tied DOFs do not contribute; their equation carries the retained value.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotNumbered`] when no current numbering exists.
    pub fn displacements(&self) -> Result<PartitionedVector, DomainError> {
        let state = self.numbering()?;
        let mut displacement = PartitionedVector::zeros(state.equations, state.fixed);
        for node in self.nodes() {
            for (&dof, value) in node.dofs().iter().zip(node.trial_displacement().iter()) {
                match dof {
                    Dof::Equation(eq) => displacement.free[eq] = *value,
                    Dof::Fixed(slot) => displacement.fixed[slot] = *value,
                    Dof::Tied(_) | Dof::Unassigned => {}
                }
            }
        }
        Ok(displacement)
    }

    /// Recompute every element trial state from the node trial displacements.
    ///
    /// # Errors
    ///
    /// Propagates element errors, e.g. [`DomainError::NotInitialized`].
    pub fn update(&mut self) -> Result<(), DomainError> {
        let graph = &self.graph;
        self.elements.par_iter_mut().try_for_each(|entry| {
            let nodes: Vec<&Node> = entry.nodes.iter().map(|&index| &graph[index]).collect();
            entry.element.update(&nodes)
        })
    }

    /// Add per-node displacement increments to the trial state.
    ///
    /// Velocities and accelerations receive the increment scaled by
    /// `velocity` and `acceleration`. Element states are not updated.
    pub(crate) fn increment_trial_state(
        &mut self,
        increments: &HashMap<NodeTag, Vector>,
        velocity: f64,
        acceleration: f64,
    ) {
        for node in self.graph.node_weights_mut() {
            if let Some(delta) = increments.get(&node.tag()) {
                node.increment_trial(delta, velocity, acceleration);
            }
        }
    }

    /// Replace the trial kinematics of every node with `predict(node)`.
    pub(crate) fn predict_kinematics(&mut self, predict: impl Fn(&Node) -> Kinematics) {
        for node in self.graph.node_weights_mut() {
            let kinematics = predict(node);
            node.set_trial(kinematics);
        }
    }

    /// Move prescribed DOFs of fix constraints to their imposed values.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::NotNumbered`] when no current numbering exists.
    pub(crate) fn apply_imposed_displacements(&mut self) -> Result<(), DomainError> {
        let imposed = self.numbering()?.imposed.clone();
        for (index, dof, value) in imposed {
            self.graph[index].set_trial_displacement(dof, value);
        }
        Ok(())
    }

    fn compute_reactions(&mut self) {
        let mut reactions: HashMap<NodeIndex, Vector> = self
            .node_order
            .iter()
            .map(|&index| {
                let node = &self.graph[index];
                (index, self.node_inertia(node) - node.load())
            })
            .collect();
        for (entry, force) in self.elements.iter().zip(self.element_forces()) {
            let mut offset = 0;
            for index in &entry.nodes {
                let count = self.graph[*index].dof_count();
                if let Some(reaction) = reactions.get_mut(index) {
                    *reaction += force.rows(offset, count);
                }
                offset += count;
            }
        }
        for (index, reaction) in reactions {
            if let Some(node) = self.graph.node_weight_mut(index) {
                node.set_reaction(reaction);
            }
        }
    }

    /// Compute reactions and promote every trial state to committed.
    pub fn commit(&mut self) {
        self.compute_reactions();
        for node in self.graph.node_weights_mut() {
            node.commit_state();
        }
        for entry in &mut self.elements {
            entry.element.commit_state();
        }
        self.committed_time = self.time;
        self.commits += 1;
    }

    /// Discard every trial state and restore the time and loads of the last commit.
    ///
    /// Calling it twice in a row has the same effect as calling it once.
    ///
    /// # Errors
    ///
    /// Propagates load application errors.
    pub fn revert(&mut self) -> Result<(), DomainError> {
        for node in self.graph.node_weights_mut() {
            node.revert_to_last_commit();
        }
        for entry in &mut self.elements {
            entry.element.revert_to_last_commit();
        }
        self.apply_load(self.committed_time)
    }

    /// Restore the state present before the first commit.
    ///
    /// # Errors
    ///
    /// Propagates load application and element update errors.
    pub fn revert_to_start(&mut self) -> Result<(), DomainError> {
        for node in self.graph.node_weights_mut() {
            node.revert_to_start();
        }
        for entry in &mut self.elements {
            entry.element.revert_to_start();
        }
        self.commits = 0;
        self.committed_time = 0.0;
        self.apply_load(0.0)?;
        if self.is_finalized() {
            self.update()?;
        }
        Ok(())
    }

    /// Number of commits since creation or the last [`Domain::revert_to_start`].
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits
    }
}
