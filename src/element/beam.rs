//! Two-node planar frame element with Euler-Bernoulli bending.

use crate::config::Tolerances;
use crate::containers::{Matrix, Vector};
use crate::element::{check_arity, Element, ElementResponse, ElementTag};
use crate::errors::DomainError;
use crate::geometry::Chord;
use crate::node::{Node, NodeShape, NodeTag};
use crate::section::Section;
use crate::state::StateMachine;

#[derive(Clone, Copy, Debug)]
struct Frame {
    length: f64,
    cos: f64,
    sin: f64,
}

impl Frame {
    /// Rotation from global to local element DOFs `[u1, v1, r1, u2, v2, r2]`.
    fn transformation(&self) -> Matrix {
        let mut t = Matrix::zeros(6, 6);
        for base in [0, 3] {
            t[(base, base)] = self.cos;
            t[(base, base + 1)] = self.sin;
            t[(base + 1, base)] = -self.sin;
            t[(base + 1, base + 1)] = self.cos;
            t[(base + 2, base + 2)] = 1.0;
        }
        t
    }
}

/// Planar beam-column joining two [`NodeShape::Planar3`] nodes.
///
/// Axial force follows the section response; bending is linear with the
/// section flexural rigidity.
#[derive(Debug)]
pub struct Beam2d {
    tag: ElementTag,
    nodes: [NodeTag; 2],
    section: Box<dyn Section>,
    density: f64,
    frame: Option<Frame>,
    local_displacement: Vector,
}

impl Beam2d {
    /// Create a beam between `nodes` made of `section`.
    #[must_use]
    pub fn new(tag: ElementTag, nodes: [NodeTag; 2], section: Box<dyn Section>) -> Self {
        Self {
            tag,
            nodes,
            section,
            density: 0.0,
            frame: None,
            local_displacement: Vector::zeros(6),
        }
    }

    /// Assign a mass density, lumped half to each end.
    #[must_use]
    pub fn with_density(mut self, density: f64) -> Self {
        self.density = density;
        self
    }

    fn local_stiffness(frame: Frame, axial: f64, flexural: f64) -> Matrix {
        let l = frame.length;
        let mut k = Matrix::zeros(6, 6);
        let ka = axial / l;
        k[(0, 0)] = ka;
        k[(3, 3)] = ka;
        k[(0, 3)] = -ka;
        k[(3, 0)] = -ka;

        let bending = [1, 2, 4, 5];
        let kb = flexural / l.powi(3)
            * Matrix::from_row_slice(
                4,
                4,
                &[
                    12.0, 6.0 * l, -12.0, 6.0 * l, //
                    6.0 * l, 4.0 * l * l, -6.0 * l, 2.0 * l * l, //
                    -12.0, -6.0 * l, 12.0, -6.0 * l, //
                    6.0 * l, 2.0 * l * l, -6.0 * l, 4.0 * l * l,
                ],
            );
        for (row, &i) in bending.iter().enumerate() {
            for (col, &j) in bending.iter().enumerate() {
                k[(i, j)] = kb[(row, col)];
            }
        }
        k
    }

    fn global_stiffness(&self, tangent: &Matrix) -> Matrix {
        let Some(frame) = self.frame else {
            return Matrix::zeros(0, 0);
        };
        let t = frame.transformation();
        let local = Self::local_stiffness(frame, tangent[(0, 0)], tangent[(1, 1)]);
        t.transpose() * local * t
    }
}

impl StateMachine for Beam2d {
    fn commit_state(&mut self) {
        self.section.commit_state();
    }

    fn revert_to_last_commit(&mut self) {
        self.section.revert_to_last_commit();
    }

    fn revert_to_start(&mut self) {
        self.section.revert_to_start();
        self.local_displacement.fill(0.0);
    }
}

impl Element for Beam2d {
    fn tag(&self) -> ElementTag {
        self.tag
    }

    fn class_name(&self) -> &'static str {
        "Beam2d"
    }

    fn node_tags(&self) -> &[NodeTag] {
        &self.nodes
    }

    fn set_domain(&mut self, nodes: &[&Node], tolerances: &Tolerances) -> Result<(), DomainError> {
        check_arity(self.tag, 2, nodes)?;
        if nodes.iter().any(|node| node.shape() != NodeShape::Planar3) {
            return Err(DomainError::IncompatibleNodes {
                element: self.tag,
                reason: "planar beams need nodes with two coordinates and three DOFs",
            });
        }
        if self.section.order() < 2 {
            return Err(DomainError::SectionOrder {
                element: self.tag,
                section: self.section.tag(),
                provided: self.section.order(),
                required: 2,
            });
        }
        let chord = Chord::for_element(
            self.tag,
            nodes[0].coordinates(),
            nodes[1].coordinates(),
            tolerances.absolute,
        )?;
        self.frame = Some(Frame {
            length: chord.length,
            cos: chord.direction[0],
            sin: chord.direction[1],
        });
        Ok(())
    }

    fn update(&mut self, nodes: &[&Node]) -> Result<(), DomainError> {
        let frame = self.frame.ok_or(DomainError::NotInitialized(self.tag))?;
        let global = Vector::from_iterator(
            6,
            nodes[0]
                .trial_displacement()
                .iter()
                .chain(nodes[1].trial_displacement().iter())
                .copied(),
        );
        self.local_displacement = frame.transformation() * global;
        let u = &self.local_displacement;
        let axial = (u[3] - u[0]) / frame.length;
        let curvature = (u[5] - u[2]) / frame.length;
        let mut deformation = vec![0.0; self.section.order()];
        deformation[0] = axial;
        deformation[1] = curvature;
        self.section.set_trial_deformation(&deformation)
    }

    fn tangent_stiffness(&self) -> Matrix {
        self.global_stiffness(&self.section.tangent())
    }

    fn initial_stiffness(&self) -> Matrix {
        self.global_stiffness(&self.section.initial_tangent())
    }

    fn resisting_force(&self) -> Vector {
        let Some(frame) = self.frame else {
            return Vector::zeros(0);
        };
        let tangent = self.section.tangent();
        let mut bending = Self::local_stiffness(frame, 0.0, tangent[(1, 1)]) * &self.local_displacement;
        let axial_force = self.section.stress_resultant()[0];
        bending[0] -= axial_force;
        bending[3] += axial_force;
        frame.transformation().transpose() * bending
    }

    fn mass_matrix(&self) -> Option<Matrix> {
        let frame = self.frame?;
        if self.density <= 0.0 {
            return None;
        }
        let lumped = 0.5 * self.density * self.section.area() * frame.length;
        let mut diagonal = Vector::zeros(6);
        for dof in [0, 1, 3, 4] {
            diagonal[dof] = lumped;
        }
        Some(Matrix::from_diagonal(&diagonal))
    }

    fn response(&self) -> ElementResponse {
        let resultant = self.section.committed_stress_resultant();
        ElementResponse {
            strain: self.section.committed_deformation(),
            force: resultant.clone(),
            stress: resultant,
        }
    }

    fn commit_count(&self) -> usize {
        self.section.commit_count()
    }
}
