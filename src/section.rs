//! Cross sections mapping generalized deformations onto stress resultants.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::containers::{Matrix, Vector};
use crate::errors::{DomainError, PropertyError};
use crate::material::{MaterialSpec, UniaxialMaterial};
use crate::state::{StateMachine, TrialState};

/// Cross section of a line element.
///
/// The section order is the number of generalized deformations it accepts:
/// axial strain first, then curvature when the section carries bending.
pub trait Section: StateMachine + fmt::Debug + Send + Sync {
    /// Identifier of the section definition.
    fn tag(&self) -> usize;
    /// Number of stress resultants.
    fn order(&self) -> usize;
    /// Cross sectional area.
    fn area(&self) -> f64;
    /// Set the trial generalized deformations.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::DeformationLength`] when `deformation` does not have
    /// [`Section::order`] entries.
    fn set_trial_deformation(&mut self, deformation: &[f64]) -> Result<(), DomainError>;
    /// Trial generalized deformations.
    fn deformation(&self) -> Vector;
    /// Trial stress resultants.
    fn stress_resultant(&self) -> Vector;
    /// Trial section tangent.
    fn tangent(&self) -> Matrix;
    /// Section tangent of the virgin material.
    fn initial_tangent(&self) -> Matrix;
    /// Committed generalized deformations.
    fn committed_deformation(&self) -> Vector;
    /// Committed stress resultants.
    fn committed_stress_resultant(&self) -> Vector;
    /// Material the section is made of.
    fn material(&self) -> &dyn UniaxialMaterial;
    /// Number of commits since creation or the last revert to start.
    fn commit_count(&self) -> usize;
    /// Clone into a new owned trait object.
    fn boxed_clone(&self) -> Box<dyn Section>;

    /// Set an axial strain with every other deformation zero.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Section::set_trial_deformation`].
    fn set_trial_axial_strain(&mut self, strain: f64) -> Result<(), DomainError> {
        let mut deformation = vec![0.0; self.order()];
        if let Some(axial) = deformation.first_mut() {
            *axial = strain;
        }
        self.set_trial_deformation(&deformation)
    }
}

impl Clone for Box<dyn Section> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

fn dimension(tag: usize, name: &'static str, value: f64) -> Result<f64, DomainError> {
    if !value.is_finite() {
        return Err(DomainError::InvalidSection {
            tag,
            source: PropertyError::NotFinite { name, value },
        });
    }
    if value <= 0.0 {
        return Err(DomainError::InvalidSection {
            tag,
            source: PropertyError::NonPositive { name, value },
        });
    }
    Ok(value)
}

/// Solid rectangle carrying axial force and bending about one axis.
///
/// Axial response follows the material; bending uses the initial modulus of
/// the material.
#[derive(Clone, Debug)]
pub struct Rectangular {
    tag: usize,
    width: f64,
    height: f64,
    material: Box<dyn UniaxialMaterial>,
    deformation: TrialState<[f64; 2]>,
}

impl Rectangular {
    /// Create a rectangular section of `width` by `height`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidSection`] when a dimension is not strictly positive.
    ///
    /// # Examples
    /// ```
    /// use equilibria::material::Elastic;
    /// use equilibria::section::{Rectangular, Section};
    ///
    /// let section = Rectangular::new(1, 0.1, 0.2, Box::new(Elastic::new(1, 2.0e9)?))?;
    /// assert!((section.area() - 0.02).abs() < 1.0e-15);
    /// # Ok::<(), equilibria::DomainError>(())
    /// ```
    pub fn new(
        tag: usize,
        width: f64,
        height: f64,
        material: Box<dyn UniaxialMaterial>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            tag,
            width: dimension(tag, "width", width)?,
            height: dimension(tag, "height", height)?,
            material,
            deformation: TrialState::new([0.0; 2]),
        })
    }

    /// Second moment of area about the bending axis.
    #[must_use]
    pub fn moment_of_inertia(&self) -> f64 {
        self.width * self.height.powi(3) / 12.0
    }

    fn flexural_rigidity(&self) -> f64 {
        self.material.initial_tangent() * self.moment_of_inertia()
    }
}

impl StateMachine for Rectangular {
    fn commit_state(&mut self) {
        self.material.commit_state();
        self.deformation.commit_state();
    }

    fn revert_to_last_commit(&mut self) {
        self.material.revert_to_last_commit();
        self.deformation.revert_to_last_commit();
    }

    fn revert_to_start(&mut self) {
        self.material.revert_to_start();
        self.deformation.revert_to_start();
    }
}

impl Section for Rectangular {
    fn tag(&self) -> usize {
        self.tag
    }

    fn order(&self) -> usize {
        2
    }

    fn area(&self) -> f64 {
        self.width * self.height
    }

    fn set_trial_deformation(&mut self, deformation: &[f64]) -> Result<(), DomainError> {
        let [axial, curvature] = <[f64; 2]>::try_from(deformation).map_err(|_| {
            DomainError::DeformationLength {
                section: self.tag,
                expected: 2,
                received: deformation.len(),
            }
        })?;
        self.material.set_trial_strain(axial);
        self.deformation.set_trial([axial, curvature]);
        Ok(())
    }

    fn deformation(&self) -> Vector {
        Vector::from_row_slice(self.deformation.trial())
    }

    fn stress_resultant(&self) -> Vector {
        let curvature = self.deformation.trial()[1];
        Vector::from_vec(vec![
            self.material.stress() * self.area(),
            self.flexural_rigidity() * curvature,
        ])
    }

    fn tangent(&self) -> Matrix {
        Matrix::from_diagonal(&Vector::from_vec(vec![
            self.material.tangent() * self.area(),
            self.flexural_rigidity(),
        ]))
    }

    fn initial_tangent(&self) -> Matrix {
        Matrix::from_diagonal(&Vector::from_vec(vec![
            self.material.initial_tangent() * self.area(),
            self.flexural_rigidity(),
        ]))
    }

    fn committed_deformation(&self) -> Vector {
        Vector::from_row_slice(self.deformation.committed())
    }

    fn committed_stress_resultant(&self) -> Vector {
        let curvature = self.deformation.committed()[1];
        Vector::from_vec(vec![
            self.material.committed_stress() * self.area(),
            self.flexural_rigidity() * curvature,
        ])
    }

    fn material(&self) -> &dyn UniaxialMaterial {
        self.material.as_ref()
    }

    fn commit_count(&self) -> usize {
        self.deformation.commit_count()
    }

    fn boxed_clone(&self) -> Box<dyn Section> {
        Box::new(self.clone())
    }
}

/// Axial-only section described by its area.
#[derive(Clone, Debug)]
pub struct AreaSection {
    tag: usize,
    area: f64,
    material: Box<dyn UniaxialMaterial>,
    commits: usize,
}

impl AreaSection {
    /// Create an axial section with cross sectional `area`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidSection`] when `area` is not strictly positive.
    pub fn new(tag: usize, area: f64, material: Box<dyn UniaxialMaterial>) -> Result<Self, DomainError> {
        Ok(Self {
            tag,
            area: dimension(tag, "area", area)?,
            material,
            commits: 0,
        })
    }
}

impl StateMachine for AreaSection {
    fn commit_state(&mut self) {
        self.material.commit_state();
        self.commits += 1;
    }

    fn revert_to_last_commit(&mut self) {
        self.material.revert_to_last_commit();
    }

    fn revert_to_start(&mut self) {
        self.material.revert_to_start();
        self.commits = 0;
    }
}

impl Section for AreaSection {
    fn tag(&self) -> usize {
        self.tag
    }

    fn order(&self) -> usize {
        1
    }

    fn area(&self) -> f64 {
        self.area
    }

    fn set_trial_deformation(&mut self, deformation: &[f64]) -> Result<(), DomainError> {
        match deformation {
            [axial] => {
                self.material.set_trial_strain(*axial);
                Ok(())
            }
            _ => Err(DomainError::DeformationLength {
                section: self.tag,
                expected: 1,
                received: deformation.len(),
            }),
        }
    }

    fn deformation(&self) -> Vector {
        Vector::from_element(1, self.material.strain())
    }

    fn stress_resultant(&self) -> Vector {
        Vector::from_element(1, self.material.stress() * self.area)
    }

    fn tangent(&self) -> Matrix {
        Matrix::from_element(1, 1, self.material.tangent() * self.area)
    }

    fn initial_tangent(&self) -> Matrix {
        Matrix::from_element(1, 1, self.material.initial_tangent() * self.area)
    }

    fn committed_deformation(&self) -> Vector {
        Vector::from_element(1, self.material.committed_strain())
    }

    fn committed_stress_resultant(&self) -> Vector {
        Vector::from_element(1, self.material.committed_stress() * self.area)
    }

    fn material(&self) -> &dyn UniaxialMaterial {
        self.material.as_ref()
    }

    fn commit_count(&self) -> usize {
        self.commits
    }

    fn boxed_clone(&self) -> Box<dyn Section> {
        Box::new(self.clone())
    }
}

/// Serializable description of a section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SectionSpec {
    /// Solid rectangle carrying axial force and bending.
    Rectangular {
        /// Identifier.
        tag: usize,
        /// Width.
        width: f64,
        /// Height in the bending plane.
        height: f64,
        /// Material description.
        material: MaterialSpec,
    },
    /// Axial-only section.
    Area {
        /// Identifier.
        tag: usize,
        /// Cross sectional area.
        area: f64,
        /// Material description.
        material: MaterialSpec,
    },
}

impl SectionSpec {
    /// Instantiate the described section together with its material.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidSection`] or [`DomainError::InvalidMaterial`] when a
    /// property is inadmissible.
    pub fn build(&self) -> Result<Box<dyn Section>, DomainError> {
        Ok(match self {
            Self::Rectangular {
                tag,
                width,
                height,
                material,
            } => Box::new(Rectangular::new(*tag, *width, *height, material.build()?)?),
            Self::Area { tag, area, material } => {
                Box::new(AreaSection::new(*tag, *area, material.build()?)?)
            }
        })
    }
}
