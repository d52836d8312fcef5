//! Spring element joining matching DOFs of two nodes.

use crate::config::Tolerances;
use crate::containers::{Matrix, Vector};
use crate::element::{check_arity, layout, Element, ElementResponse, ElementTag};
use crate::errors::DomainError;
use crate::geometry::Chord;
use crate::material::UniaxialMaterial;
use crate::node::{Node, NodeTag};
use crate::state::StateMachine;

/// Material acting between DOF `dof` of the two nodes of a [`ZeroLength`].
///
/// The material strain is the relative displacement and its stress is the spring force.
#[derive(Clone, Debug)]
pub struct Spring {
    dof: usize,
    material: Box<dyn UniaxialMaterial>,
}

impl Spring {
    /// Create a spring along `dof`.
    #[must_use]
    pub fn new(dof: usize, material: Box<dyn UniaxialMaterial>) -> Self {
        Self { dof, material }
    }
}

/// Element joining two nodes through independent uniaxial springs.
///
/// Both nodes must sit at the same location, within the absolute geometric
/// tolerance of the domain.
#[derive(Debug)]
pub struct ZeroLength {
    tag: ElementTag,
    nodes: [NodeTag; 2],
    springs: Vec<Spring>,
    layout: Option<(usize, usize)>,
    commits: usize,
}

impl ZeroLength {
    /// Create a zero-length element with the supplied springs.
    #[must_use]
    pub fn new(tag: ElementTag, nodes: [NodeTag; 2], springs: Vec<Spring>) -> Self {
        Self {
            tag,
            nodes,
            springs,
            layout: None,
            commits: 0,
        }
    }

    fn assemble(&self, modulus: impl Fn(&dyn UniaxialMaterial) -> f64) -> Matrix {
        let Some((size, offset)) = self.layout else {
            return Matrix::zeros(0, 0);
        };
        let mut matrix = Matrix::zeros(size, size);
        for spring in &self.springs {
            let k = modulus(spring.material.as_ref());
            let (i, j) = (spring.dof, offset + spring.dof);
            matrix[(i, i)] += k;
            matrix[(j, j)] += k;
            matrix[(i, j)] -= k;
            matrix[(j, i)] -= k;
        }
        matrix
    }
}

impl StateMachine for ZeroLength {
    fn commit_state(&mut self) {
        for spring in &mut self.springs {
            spring.material.commit_state();
        }
        self.commits += 1;
    }

    fn revert_to_last_commit(&mut self) {
        for spring in &mut self.springs {
            spring.material.revert_to_last_commit();
        }
    }

    fn revert_to_start(&mut self) {
        for spring in &mut self.springs {
            spring.material.revert_to_start();
        }
        self.commits = 0;
    }
}

impl Element for ZeroLength {
    fn tag(&self) -> ElementTag {
        self.tag
    }

    fn class_name(&self) -> &'static str {
        "ZeroLength"
    }

    fn node_tags(&self) -> &[NodeTag] {
        &self.nodes
    }

    fn set_domain(&mut self, nodes: &[&Node], tolerances: &Tolerances) -> Result<(), DomainError> {
        check_arity(self.tag, 2, nodes)?;
        let (start, end) = (nodes[0].coordinates(), nodes[1].coordinates());
        if start.len() != end.len() {
            return Err(DomainError::IncompatibleNodes {
                element: self.tag,
                reason: "nodes have different spatial dimensions",
            });
        }
        if let Some(chord) = Chord::between(start, end, tolerances.absolute) {
            return Err(DomainError::NonCoincidentNodes {
                element: self.tag,
                distance: chord.length,
            });
        }
        for spring in &self.springs {
            if let Some(node) = nodes.iter().find(|node| spring.dof >= node.dof_count()) {
                return Err(DomainError::InvalidDof {
                    node: node.tag(),
                    dof: spring.dof,
                    available: node.dof_count(),
                });
            }
        }
        self.layout = Some(layout(nodes));
        Ok(())
    }

    fn update(&mut self, nodes: &[&Node]) -> Result<(), DomainError> {
        if self.layout.is_none() {
            return Err(DomainError::NotInitialized(self.tag));
        }
        let start = nodes[0].trial_displacement();
        let end = nodes[1].trial_displacement();
        for spring in &mut self.springs {
            spring
                .material
                .set_trial_strain(end[spring.dof] - start[spring.dof]);
        }
        Ok(())
    }

    fn tangent_stiffness(&self) -> Matrix {
        self.assemble(|material| material.tangent())
    }

    fn initial_stiffness(&self) -> Matrix {
        self.assemble(|material| material.initial_tangent())
    }

    fn resisting_force(&self) -> Vector {
        let Some((size, offset)) = self.layout else {
            return Vector::zeros(0);
        };
        let mut force = Vector::zeros(size);
        for spring in &self.springs {
            let value = spring.material.stress();
            force[spring.dof] -= value;
            force[offset + spring.dof] += value;
        }
        force
    }

    fn response(&self) -> ElementResponse {
        let strain = Vector::from_iterator(
            self.springs.len(),
            self.springs.iter().map(|spring| spring.material.committed_strain()),
        );
        let stress = Vector::from_iterator(
            self.springs.len(),
            self.springs.iter().map(|spring| spring.material.committed_stress()),
        );
        ElementResponse {
            strain,
            force: stress.clone(),
            stress,
        }
    }

    fn commit_count(&self) -> usize {
        self.commits
    }
}
