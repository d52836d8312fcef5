//! Nodes: positions in space carrying degrees of freedom and their kinematic state.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::containers::Vector;
use crate::errors::DomainError;
use crate::state::{StateMachine, TrialState};

/// User supplied identifier of a node.
pub type NodeTag = usize;

/// Supported combinations of spatial dimension and DOFs per node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeShape {
    /// Planar node with two translations.
    Planar2,
    /// Planar node with two translations and one rotation.
    Planar3,
    /// Spatial node with three translations.
    Spatial3,
    /// Spatial node with three translations and three rotations.
    Spatial6,
}

impl NodeShape {
    /// Resolve the shape from a coordinate count and a DOF count.
    #[must_use]
    pub fn from_counts(dimension: usize, dofs: usize) -> Option<Self> {
        match (dimension, dofs) {
            (2, 2) => Some(Self::Planar2),
            (2, 3) => Some(Self::Planar3),
            (3, 3) => Some(Self::Spatial3),
            (3, 6) => Some(Self::Spatial6),
            _ => None,
        }
    }

    /// Number of spatial coordinates.
    #[must_use]
    pub fn dimension(self) -> usize {
        match self {
            Self::Planar2 | Self::Planar3 => 2,
            Self::Spatial3 | Self::Spatial6 => 3,
        }
    }

    /// Number of degrees of freedom.
    #[must_use]
    pub fn dof_count(self) -> usize {
        match self {
            Self::Planar2 => 2,
            Self::Planar3 | Self::Spatial3 => 3,
            Self::Spatial6 => 6,
        }
    }
}

/// Role of a degree of freedom in the assembled system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Dof {
    /// No equation has been assigned yet.
    Unassigned,
    /// Free DOF owning equation `n`.
    Equation(usize),
    /// DOF tied to equation `n` of another (retained) DOF.
    Tied(usize),
    /// Prescribed DOF stored in slot `n` of the fixed partition.
    Fixed(usize),
}

impl Dof {
    /// Equation that governs this DOF, if any.
    #[must_use]
    pub fn equation(self) -> Option<usize> {
        match self {
            Self::Equation(eq) | Self::Tied(eq) => Some(eq),
            Self::Unassigned | Self::Fixed(_) => None,
        }
    }
}

/// Displacement, velocity and acceleration of every DOF of a node.
#[derive(Clone, Debug, PartialEq)]
pub struct Kinematics {
    /// Displacements.
    pub displacement: Vector,
    /// Velocities.
    pub velocity: Vector,
    /// Accelerations.
    pub acceleration: Vector,
}

impl Kinematics {
    /// Kinematic state at rest for `dofs` degrees of freedom.
    #[must_use]
    pub fn at_rest(dofs: usize) -> Self {
        Self {
            displacement: Vector::zeros(dofs),
            velocity: Vector::zeros(dofs),
            acceleration: Vector::zeros(dofs),
        }
    }
}

/// Nodal response quantity selectable by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseQuery {
    /// Committed displacement.
    Displacement,
    /// Committed velocity.
    Velocity,
    /// Committed acceleration.
    Acceleration,
    /// Reaction computed at the last commit.
    Reaction,
}

impl FromStr for ResponseQuery {
    type Err = DomainError;

    fn from_str(query: &str) -> Result<Self, Self::Err> {
        match query.to_ascii_lowercase().as_str() {
            "disp" | "displacement" | "u" => Ok(Self::Displacement),
            "vel" | "velocity" | "v" => Ok(Self::Velocity),
            "accel" | "acceleration" | "a" => Ok(Self::Acceleration),
            "reaction" | "r" => Ok(Self::Reaction),
            _ => Err(DomainError::UnknownQuery(query.to_owned())),
        }
    }
}

/// A point of the model carrying degrees of freedom.
///
/// # Examples
/// ```
/// use equilibria::{Node, NodeShape};
///
/// let mut node = Node::new(3, &[2.0, 0.0, 2.0], 6)?;
/// node.set_fixity(&[false, true, false, true, true, true])?;
/// assert_eq!(node.shape(), NodeShape::Spatial6);
/// assert_eq!(node.committed_displacement(&[0, 2])?, vec![0.0, 0.0]);
/// # Ok::<(), equilibria::DomainError>(())
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    tag: NodeTag,
    shape: NodeShape,
    coordinates: Vec<f64>,
    fixity: Vec<bool>,
    mass: Vector,
    dofs: Vec<Dof>,
    state: TrialState<Kinematics>,
    last_increment: Vector,
    load: Vector,
    reaction: Vector,
}

impl Node {
    /// Create an unconstrained massless node at `coordinates` with `dofs` degrees of freedom.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::UnsupportedNodeShape`] when the combination of
    /// coordinates and DOFs is not one of the [`NodeShape`] variants.
    pub fn new(tag: NodeTag, coordinates: &[f64], dofs: usize) -> Result<Self, DomainError> {
        let shape = NodeShape::from_counts(coordinates.len(), dofs).ok_or(
            DomainError::UnsupportedNodeShape {
                dimension: coordinates.len(),
                dofs,
            },
        )?;
        Ok(Self {
            tag,
            shape,
            coordinates: coordinates.to_vec(),
            fixity: vec![false; dofs],
            mass: Vector::zeros(dofs),
            dofs: vec![Dof::Unassigned; dofs],
            state: TrialState::new(Kinematics::at_rest(dofs)),
            last_increment: Vector::zeros(dofs),
            load: Vector::zeros(dofs),
            reaction: Vector::zeros(dofs),
        })
    }

    /// Identifier of the node.
    #[must_use]
    pub fn tag(&self) -> NodeTag {
        self.tag
    }

    /// Dimension and DOF layout.
    #[must_use]
    pub fn shape(&self) -> NodeShape {
        self.shape
    }

    /// Number of spatial coordinates.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.shape.dimension()
    }

    /// Number of degrees of freedom.
    #[must_use]
    pub fn dof_count(&self) -> usize {
        self.shape.dof_count()
    }

    /// Position of the node.
    #[must_use]
    pub fn coordinates(&self) -> &[f64] {
        &self.coordinates
    }

    /// Restraint flag per DOF; `true` means the DOF is held at zero.
    #[must_use]
    pub fn fixity(&self) -> &[bool] {
        &self.fixity
    }

    fn check_length(&self, what: &'static str, received: usize) -> Result<(), DomainError> {
        if received == self.dof_count() {
            Ok(())
        } else {
            Err(DomainError::WrongLength {
                node: self.tag,
                what,
                expected: self.dof_count(),
                received,
            })
        }
    }

    fn check_dofs(&self, dofs: &[usize]) -> Result<(), DomainError> {
        match dofs.iter().find(|&&dof| dof >= self.dof_count()) {
            Some(&dof) => Err(DomainError::InvalidDof {
                node: self.tag,
                dof,
                available: self.dof_count(),
            }),
            None => Ok(()),
        }
    }

    /// Replace the restraint flags.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::WrongLength`] when `fixity` does not have one entry per DOF.
    pub fn set_fixity(&mut self, fixity: &[bool]) -> Result<(), DomainError> {
        self.check_length("fixity", fixity.len())?;
        self.fixity = fixity.to_vec();
        Ok(())
    }

    /// Builder-style variant of [`Node::set_fixity`].
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::WrongLength`] when `fixity` does not have one entry per DOF.
    pub fn with_fixity(mut self, fixity: &[bool]) -> Result<Self, DomainError> {
        self.set_fixity(fixity)?;
        Ok(self)
    }

    /// Lumped mass per DOF.
    #[must_use]
    pub fn mass(&self) -> &Vector {
        &self.mass
    }

    /// Replace the lumped mass.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::WrongLength`] when `mass` does not have one entry per DOF.
    pub fn set_mass(&mut self, mass: &[f64]) -> Result<(), DomainError> {
        self.check_length("mass", mass.len())?;
        self.mass = Vector::from_row_slice(mass);
        Ok(())
    }

    /// Builder-style variant of [`Node::set_mass`].
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::WrongLength`] when `mass` does not have one entry per DOF.
    pub fn with_mass(mut self, mass: &[f64]) -> Result<Self, DomainError> {
        self.set_mass(mass)?;
        Ok(self)
    }

    /// Set the displacement the node starts from.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::WrongLength`] when `displacement` does not have one entry per DOF.
    pub fn set_initial_displacement(&mut self, displacement: &[f64]) -> Result<(), DomainError> {
        self.check_length("initial displacement", displacement.len())?;
        let mut initial = self.state.initial().clone();
        initial.displacement = Vector::from_row_slice(displacement);
        self.state.reset_initial(initial);
        Ok(())
    }

    /// Set the velocity the node starts from.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::WrongLength`] when `velocity` does not have one entry per DOF.
    pub fn set_initial_velocity(&mut self, velocity: &[f64]) -> Result<(), DomainError> {
        self.check_length("initial velocity", velocity.len())?;
        let mut initial = self.state.initial().clone();
        initial.velocity = Vector::from_row_slice(velocity);
        self.state.reset_initial(initial);
        Ok(())
    }

    /// Equation assignment of every DOF.
    #[must_use]
    pub fn dofs(&self) -> &[Dof] {
        &self.dofs
    }

    pub(crate) fn set_dofs(&mut self, dofs: Vec<Dof>) {
        self.dofs = dofs;
    }

    /// Trial kinematic state.
    #[must_use]
    pub fn trial(&self) -> &Kinematics {
        self.state.trial()
    }

    /// Committed kinematic state.
    #[must_use]
    pub fn committed(&self) -> &Kinematics {
        self.state.committed()
    }

    /// Trial displacement of every DOF.
    #[must_use]
    pub fn trial_displacement(&self) -> &Vector {
        &self.state.trial().displacement
    }

    /// Trial velocity of every DOF.
    #[must_use]
    pub fn trial_velocity(&self) -> &Vector {
        &self.state.trial().velocity
    }

    /// Trial acceleration of every DOF.
    #[must_use]
    pub fn trial_acceleration(&self) -> &Vector {
        &self.state.trial().acceleration
    }

    /// Committed displacements of the selected zero-based DOFs.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidDof`] when a DOF index is out of range.
    pub fn committed_displacement(&self, dofs: &[usize]) -> Result<Vec<f64>, DomainError> {
        self.response(ResponseQuery::Displacement, dofs)
    }

    /// Committed velocities of the selected zero-based DOFs.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidDof`] when a DOF index is out of range.
    pub fn committed_velocity(&self, dofs: &[usize]) -> Result<Vec<f64>, DomainError> {
        self.response(ResponseQuery::Velocity, dofs)
    }

    /// Committed accelerations of the selected zero-based DOFs.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidDof`] when a DOF index is out of range.
    pub fn committed_acceleration(&self, dofs: &[usize]) -> Result<Vec<f64>, DomainError> {
        self.response(ResponseQuery::Acceleration, dofs)
    }

    /// Committed response of the selected zero-based DOFs.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidDof`] when a DOF index is out of range.
    pub fn response(&self, query: ResponseQuery, dofs: &[usize]) -> Result<Vec<f64>, DomainError> {
        self.check_dofs(dofs)?;
        let committed = self.state.committed();
        let source = match query {
            ResponseQuery::Displacement => &committed.displacement,
            ResponseQuery::Velocity => &committed.velocity,
            ResponseQuery::Acceleration => &committed.acceleration,
            ResponseQuery::Reaction => &self.reaction,
        };
        Ok(dofs.iter().map(|&dof| source[dof]).collect())
    }

    /// Overwrite the whole trial kinematic state.
    pub(crate) fn set_trial(&mut self, kinematics: Kinematics) {
        self.state.set_trial(kinematics);
    }

    /// Set the trial displacement of one DOF.
    pub(crate) fn set_trial_displacement(&mut self, dof: usize, value: f64) {
        self.state.trial_mut().displacement[dof] = value;
    }

    /// Add `delta` to the trial displacement and scaled copies to velocity and acceleration.
    pub(crate) fn increment_trial(&mut self, delta: &Vector, velocity: f64, acceleration: f64) {
        let trial = self.state.trial_mut();
        trial.displacement += delta;
        if velocity != 0.0 {
            trial.velocity.axpy(velocity, delta, 1.0);
        }
        if acceleration != 0.0 {
            trial.acceleration.axpy(acceleration, delta, 1.0);
        }
    }

    /// Displacement change over the last committed step.
    #[must_use]
    pub fn last_increment(&self) -> &Vector {
        &self.last_increment
    }

    /// Total external load applied at the current time.
    #[must_use]
    pub fn load(&self) -> &Vector {
        &self.load
    }

    pub(crate) fn zero_load(&mut self) {
        self.load.fill(0.0);
    }

    pub(crate) fn add_load(&mut self, load: &Vector, factor: f64) {
        self.load.axpy(factor, load, 1.0);
    }

    pub(crate) fn add_load_component(&mut self, dof: usize, value: f64) {
        self.load[dof] += value;
    }

    /// Reaction computed at the last commit.
    #[must_use]
    pub fn reaction(&self) -> &Vector {
        &self.reaction
    }

    pub(crate) fn set_reaction(&mut self, reaction: Vector) {
        self.reaction = reaction;
    }

    /// Number of commits since creation or the last revert to start.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.state.commit_count()
    }
}

impl StateMachine for Node {
    fn commit_state(&mut self) {
        self.last_increment = &self.state.trial().displacement - &self.state.committed().displacement;
        self.state.commit_state();
    }

    fn revert_to_last_commit(&mut self) {
        self.state.revert_to_last_commit();
    }

    fn revert_to_start(&mut self) {
        self.state.revert_to_start();
        self.last_increment.fill(0.0);
        self.reaction.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_shapes_are_rejected() {
        let error = Node::new(1, &[0.0], 1).expect_err("one dimensional nodes are unsupported");
        assert_eq!(
            error,
            DomainError::UnsupportedNodeShape {
                dimension: 1,
                dofs: 1
            }
        );
        assert!(Node::new(1, &[0.0, 0.0, 0.0], 2).is_err());
    }

    #[test]
    fn per_dof_vectors_must_match_dof_count() {
        let mut node = Node::new(2, &[0.0, 0.0], 3).expect("valid node");
        let error = node.set_mass(&[1.0, 1.0]).expect_err("too short");
        assert_eq!(
            error,
            DomainError::WrongLength {
                node: 2,
                what: "mass",
                expected: 3,
                received: 2
            }
        );
        assert!(node.set_fixity(&[true, true, false]).is_ok());
    }

    #[test]
    fn response_rejects_out_of_range_dofs() {
        let node = Node::new(4, &[0.0, 0.0], 2).expect("valid node");
        let error = node
            .response(ResponseQuery::Velocity, &[0, 2])
            .expect_err("dof 2 does not exist");
        assert_eq!(
            error,
            DomainError::InvalidDof {
                node: 4,
                dof: 2,
                available: 2
            }
        );
    }

    #[test]
    fn queries_parse_common_spellings() {
        assert_eq!("disp".parse::<ResponseQuery>(), Ok(ResponseQuery::Displacement));
        assert_eq!("Velocity".parse::<ResponseQuery>(), Ok(ResponseQuery::Velocity));
        assert_eq!("accel".parse::<ResponseQuery>(), Ok(ResponseQuery::Acceleration));
        assert!("strain".parse::<ResponseQuery>().is_err());
    }

    #[test]
    fn increments_update_kinematics_and_last_increment() {
        let mut node = Node::new(1, &[0.0, 0.0], 2).expect("valid node");
        let delta = Vector::from_vec(vec![1.0, -2.0]);
        node.increment_trial(&delta, 10.0, 100.0);
        assert_eq!(node.trial_velocity(), &Vector::from_vec(vec![10.0, -20.0]));
        assert_eq!(node.trial_acceleration(), &Vector::from_vec(vec![100.0, -200.0]));
        node.commit_state();
        assert_eq!(node.last_increment(), &delta);
        assert_eq!(node.committed_displacement(&[1]), Ok(vec![-2.0]));

        node.increment_trial(&delta, 0.0, 0.0);
        node.revert_to_last_commit();
        assert_eq!(node.trial(), node.committed());
    }

    #[test]
    fn initial_conditions_survive_revert_to_start() {
        let mut node = Node::new(1, &[0.0, 0.0], 2).expect("valid node");
        node.set_initial_velocity(&[0.0, 3.0]).expect("two entries");
        node.increment_trial(&Vector::from_vec(vec![1.0, 1.0]), 0.0, 0.0);
        node.commit_state();
        node.revert_to_start();
        assert_eq!(node.committed().velocity, Vector::from_vec(vec![0.0, 3.0]));
        assert_eq!(node.commit_count(), 0);
    }
}
