//! Two-node axial bar in two or three dimensions.

use crate::config::Tolerances;
use crate::containers::{Matrix, Vector};
use crate::element::{check_arity, layout, Element, ElementResponse, ElementTag};
use crate::errors::DomainError;
use crate::geometry::Chord;
use crate::node::{Node, NodeTag};
use crate::section::Section;
use crate::state::StateMachine;

/// Geometry resolved when the truss is attached to a domain.
#[derive(Clone, Debug)]
struct Layout {
    chord: Chord,
    /// Offset of the second node within element vectors.
    offset: usize,
    /// Total number of element DOFs.
    size: usize,
}

/// Pin-ended bar carrying axial force only.
///
/// Only the translational DOFs of its nodes take part; rotations at spatial
/// frame nodes receive no stiffness from a truss.
///
/// # Examples
/// ```
/// use equilibria::element::{Element, Truss};
/// use equilibria::material::Elastic;
/// use equilibria::section::AreaSection;
///
/// let section = AreaSection::new(1, 0.01, Box::new(Elastic::new(1, 200.0e9)?))?;
/// let bar = Truss::new(1, [1, 2], Box::new(section));
/// assert_eq!(bar.node_tags(), &[1, 2]);
/// # Ok::<(), equilibria::DomainError>(())
/// ```
#[derive(Debug)]
pub struct Truss {
    tag: ElementTag,
    nodes: [NodeTag; 2],
    section: Box<dyn Section>,
    density: f64,
    layout: Option<Layout>,
}

impl Truss {
    /// Create a bar between `nodes` made of `section`.
    #[must_use]
    pub fn new(tag: ElementTag, nodes: [NodeTag; 2], section: Box<dyn Section>) -> Self {
        Self {
            tag,
            nodes,
            section,
            density: 0.0,
            layout: None,
        }
    }

    /// Assign a mass density, lumped half to each end.
    #[must_use]
    pub fn with_density(mut self, density: f64) -> Self {
        self.density = density;
        self
    }

    /// Length between the end nodes, once attached to a domain.
    #[must_use]
    pub fn length(&self) -> Option<f64> {
        self.layout.as_ref().map(|layout| layout.chord.length)
    }

    /// Section of the bar.
    #[must_use]
    pub fn section(&self) -> &dyn Section {
        self.section.as_ref()
    }

    fn layout(&self) -> Result<&Layout, DomainError> {
        self.layout.as_ref().ok_or(DomainError::NotInitialized(self.tag))
    }

    fn stiffness_from(&self, axial_rigidity: f64) -> Matrix {
        let Some(layout) = self.layout.as_ref() else {
            return Matrix::zeros(0, 0);
        };
        let k = axial_rigidity / layout.chord.length;
        let cosines = &layout.chord.direction;
        let offset = layout.offset;
        let mut matrix = Matrix::zeros(layout.size, layout.size);
        for (a, ca) in cosines.iter().enumerate() {
            for (b, cb) in cosines.iter().enumerate() {
                let value = k * ca * cb;
                matrix[(a, b)] += value;
                matrix[(offset + a, offset + b)] += value;
                matrix[(a, offset + b)] -= value;
                matrix[(offset + a, b)] -= value;
            }
        }
        matrix
    }
}

impl StateMachine for Truss {
    fn commit_state(&mut self) {
        self.section.commit_state();
    }

    fn revert_to_last_commit(&mut self) {
        self.section.revert_to_last_commit();
    }

    fn revert_to_start(&mut self) {
        self.section.revert_to_start();
    }
}

impl Element for Truss {
    fn tag(&self) -> ElementTag {
        self.tag
    }

    fn class_name(&self) -> &'static str {
        "Truss"
    }

    fn node_tags(&self) -> &[NodeTag] {
        &self.nodes
    }

    fn set_domain(&mut self, nodes: &[&Node], tolerances: &Tolerances) -> Result<(), DomainError> {
        check_arity(self.tag, 2, nodes)?;
        let chord = Chord::for_element(
            self.tag,
            nodes[0].coordinates(),
            nodes[1].coordinates(),
            tolerances.absolute,
        )?;
        let (size, offset) = layout(nodes);
        self.layout = Some(Layout {
            chord,
            offset,
            size,
        });
        Ok(())
    }

    fn update(&mut self, nodes: &[&Node]) -> Result<(), DomainError> {
        let layout = self.layout()?;
        let start = nodes[0].trial_displacement();
        let end = nodes[1].trial_displacement();
        let elongation: f64 = layout
            .chord
            .direction
            .iter()
            .enumerate()
            .map(|(axis, cosine)| cosine * (end[axis] - start[axis]))
            .sum();
        let strain = elongation / layout.chord.length;
        self.section.set_trial_axial_strain(strain)
    }

    fn tangent_stiffness(&self) -> Matrix {
        self.stiffness_from(self.section.tangent()[(0, 0)])
    }

    fn initial_stiffness(&self) -> Matrix {
        self.stiffness_from(self.section.initial_tangent()[(0, 0)])
    }

    fn resisting_force(&self) -> Vector {
        let Some(layout) = self.layout.as_ref() else {
            return Vector::zeros(0);
        };
        let axial_force = self.section.stress_resultant()[0];
        let mut force = Vector::zeros(layout.size);
        for (axis, cosine) in layout.chord.direction.iter().enumerate() {
            force[axis] = -axial_force * cosine;
            force[layout.offset + axis] = axial_force * cosine;
        }
        force
    }

    fn mass_matrix(&self) -> Option<Matrix> {
        let layout = self.layout.as_ref()?;
        if self.density <= 0.0 {
            return None;
        }
        let lumped = 0.5 * self.density * self.section.area() * layout.chord.length;
        let mut mass = Matrix::zeros(layout.size, layout.size);
        for axis in 0..layout.chord.direction.len() {
            mass[(axis, axis)] = lumped;
            mass[(layout.offset + axis, layout.offset + axis)] = lumped;
        }
        Some(mass)
    }

    fn response(&self) -> ElementResponse {
        let axial_force = self.section.committed_stress_resultant()[0];
        ElementResponse {
            strain: Vector::from_element(1, self.section.committed_deformation()[0]),
            stress: Vector::from_element(1, self.section.material().committed_stress()),
            force: Vector::from_element(1, axial_force),
        }
    }

    fn commit_count(&self) -> usize {
        self.section.commit_count()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::containers::is_symmetric;
    use crate::material::Elastic;
    use crate::section::AreaSection;

    fn bar(area: f64, modulus: f64) -> Truss {
        let material = Box::new(Elastic::new(1, modulus).expect("valid material"));
        Truss::new(1, [1, 2], Box::new(AreaSection::new(1, area, material).expect("valid section")))
    }

    fn attach(truss: &mut Truss, start: &Node, end: &Node) {
        truss
            .set_domain(&[start, end], &Tolerances::default())
            .expect("valid geometry");
    }

    #[test]
    fn stiffness_of_inclined_planar_bar() {
        let start = Node::new(1, &[0.0, 0.0], 2).expect("valid node");
        let end = Node::new(2, &[3.0, 4.0], 2).expect("valid node");
        let mut truss = bar(0.5, 10.0);
        attach(&mut truss, &start, &end);

        let k = truss.tangent_stiffness();
        assert_eq!(k.shape(), (4, 4));
        assert!(is_symmetric(&k, 1.0e-14));
        assert_relative_eq!(k[(0, 0)], 1.0 * 0.36);
        assert_relative_eq!(k[(0, 1)], 1.0 * 0.48);
        assert_relative_eq!(k[(1, 3)], -1.0 * 0.64);
    }

    #[test]
    fn rotations_of_frame_nodes_are_untouched() {
        let start = Node::new(1, &[0.0, 0.0, 0.0], 6).expect("valid node");
        let end = Node::new(2, &[2.0, 0.0, 0.0], 3).expect("valid node");
        let mut truss = bar(1.0, 2.0);
        attach(&mut truss, &start, &end);
        let k = truss.tangent_stiffness();
        assert_eq!(k.shape(), (9, 9));
        assert_relative_eq!(k[(0, 6)], -1.0);
        assert_eq!(k.row(3).amax(), 0.0);
    }

    #[test]
    fn resisting_force_follows_elongation() {
        let start = Node::new(1, &[0.0, 0.0], 2).expect("valid node");
        let mut end = Node::new(2, &[2.0, 0.0], 2).expect("valid node");
        let mut truss = bar(2.0, 100.0);
        attach(&mut truss, &start, &end);

        end.increment_trial(&Vector::from_vec(vec![0.01, 0.0]), 0.0, 0.0);
        truss.update(&[&start, &end]).expect("initialized element");
        let force = truss.resisting_force();
        assert_relative_eq!(force[2], 1.0);
        assert_relative_eq!(force[0], -1.0);

        assert_relative_eq!(truss.response().force[0], 0.0);
        truss.commit_state();
        assert_relative_eq!(truss.response().force[0], 1.0);
        assert_relative_eq!(truss.response().stress[0], 0.5);
    }

    #[test]
    fn update_before_attachment_fails() {
        let start = Node::new(1, &[0.0, 0.0], 2).expect("valid node");
        let end = Node::new(2, &[1.0, 0.0], 2).expect("valid node");
        let mut truss = bar(1.0, 1.0);
        let error = truss.update(&[&start, &end]).expect_err("not attached");
        assert_eq!(error, DomainError::NotInitialized(1));
    }

    #[test]
    fn coincident_nodes_are_rejected() {
        let start = Node::new(1, &[1.0, 1.0, 1.0], 3).expect("valid node");
        let end = Node::new(2, &[1.0, 1.0, 1.0], 3).expect("valid node");
        let mut truss = bar(1.0, 1.0);
        let error = truss
            .set_domain(&[&start, &end], &Tolerances::default())
            .expect_err("zero length");
        assert_eq!(error, DomainError::ZeroLengthElement(1));
    }

    #[test]
    fn lumped_mass_is_split_between_translations() {
        let start = Node::new(1, &[0.0, 0.0], 3).expect("valid node");
        let end = Node::new(2, &[4.0, 0.0], 3).expect("valid node");
        let mut truss = bar(0.5, 1.0).with_density(2.0);
        attach(&mut truss, &start, &end);
        let mass = truss.mass_matrix().expect("massive bar");
        assert_relative_eq!(mass[(0, 0)], 2.0);
        assert_relative_eq!(mass[(4, 4)], 2.0);
        assert_eq!(mass[(2, 2)], 0.0);
    }
}
