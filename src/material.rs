//! Uniaxial constitutive models.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, PropertyError};
use crate::state::{StateMachine, TrialState};

/// Strain-driven one dimensional stress/strain relation.
///
/// Implementations keep a trial and a committed state. Setting a trial strain
/// never changes the committed state.
pub trait UniaxialMaterial: StateMachine + fmt::Debug + Send + Sync {
    /// Identifier of the material definition.
    fn tag(&self) -> usize;
    /// Set the trial strain and update trial stress and tangent.
    fn set_trial_strain(&mut self, strain: f64);
    /// Trial strain.
    fn strain(&self) -> f64;
    /// Trial stress.
    fn stress(&self) -> f64;
    /// Trial tangent modulus.
    fn tangent(&self) -> f64;
    /// Tangent modulus of the virgin material.
    fn initial_tangent(&self) -> f64;
    /// Committed strain.
    fn committed_strain(&self) -> f64;
    /// Committed stress.
    fn committed_stress(&self) -> f64;
    /// Number of commits since creation or the last revert to start.
    fn commit_count(&self) -> usize;
    /// Clone into a new owned trait object.
    fn boxed_clone(&self) -> Box<dyn UniaxialMaterial>;
}

impl Clone for Box<dyn UniaxialMaterial> {
    fn clone(&self) -> Self {
        self.boxed_clone()
    }
}

/// Material point state.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct UniaxialState {
    /// Total strain.
    pub strain: f64,
    /// Stress.
    pub stress: f64,
    /// Tangent modulus.
    pub tangent: f64,
    /// Accumulated plastic strain.
    pub plastic_strain: f64,
    /// Centre of the elastic range for kinematic hardening.
    pub back_stress: f64,
}

impl UniaxialState {
    fn virgin(tangent: f64) -> Self {
        Self {
            tangent,
            ..Self::default()
        }
    }
}

fn positive(name: &'static str, value: f64) -> Result<f64, PropertyError> {
    if !value.is_finite() {
        Err(PropertyError::NotFinite { name, value })
    } else if value <= 0.0 {
        Err(PropertyError::NonPositive { name, value })
    } else {
        Ok(value)
    }
}

/// Linear elastic material.
///
/// # Examples
/// ```
/// use equilibria::material::{Elastic, UniaxialMaterial};
///
/// let mut steel = Elastic::new(1, 200.0e9)?;
/// steel.set_trial_strain(1.0e-3);
/// assert_eq!(steel.stress(), 200.0e6);
/// # Ok::<(), equilibria::DomainError>(())
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Elastic {
    tag: usize,
    elastic_modulus: f64,
    state: TrialState<UniaxialState>,
}

impl Elastic {
    /// Create an elastic material with modulus `elastic_modulus`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidMaterial`] when the modulus is not strictly positive.
    pub fn new(tag: usize, elastic_modulus: f64) -> Result<Self, DomainError> {
        let elastic_modulus = positive("elastic modulus", elastic_modulus)
            .map_err(|source| DomainError::InvalidMaterial { tag, source })?;
        Ok(Self {
            tag,
            elastic_modulus,
            state: TrialState::new(UniaxialState::virgin(elastic_modulus)),
        })
    }

    /// Elastic modulus.
    #[must_use]
    pub fn elastic_modulus(&self) -> f64 {
        self.elastic_modulus
    }
}

impl StateMachine for Elastic {
    fn commit_state(&mut self) {
        self.state.commit_state();
    }

    fn revert_to_last_commit(&mut self) {
        self.state.revert_to_last_commit();
    }

    fn revert_to_start(&mut self) {
        self.state.revert_to_start();
    }
}

impl UniaxialMaterial for Elastic {
    fn tag(&self) -> usize {
        self.tag
    }

    fn set_trial_strain(&mut self, strain: f64) {
        let trial = self.state.trial_mut();
        trial.strain = strain;
        trial.stress = self.elastic_modulus * strain;
        trial.tangent = self.elastic_modulus;
    }

    fn strain(&self) -> f64 {
        self.state.trial().strain
    }

    fn stress(&self) -> f64 {
        self.state.trial().stress
    }

    fn tangent(&self) -> f64 {
        self.state.trial().tangent
    }

    fn initial_tangent(&self) -> f64 {
        self.elastic_modulus
    }

    fn committed_strain(&self) -> f64 {
        self.state.committed().strain
    }

    fn committed_stress(&self) -> f64 {
        self.state.committed().stress
    }

    fn commit_count(&self) -> usize {
        self.state.commit_count()
    }

    fn boxed_clone(&self) -> Box<dyn UniaxialMaterial> {
        Box::new(self.clone())
    }
}

/// Elastoplastic material with linear kinematic hardening.
///
/// The post-yield tangent equals `hardening_ratio * elastic_modulus`. Stress is
/// obtained with a closed-form return mapping from the committed plastic strain
/// and back stress, so repeated trial strains within a step are path independent.
#[derive(Clone, Debug, PartialEq)]
pub struct Bilinear {
    tag: usize,
    elastic_modulus: f64,
    yield_stress: f64,
    hardening_ratio: f64,
    state: TrialState<UniaxialState>,
}

impl Bilinear {
    /// Create a bilinear material.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidMaterial`] when the modulus or yield stress is not
    /// strictly positive or when `hardening_ratio` lies outside `[0, 1)`.
    pub fn new(
        tag: usize,
        elastic_modulus: f64,
        yield_stress: f64,
        hardening_ratio: f64,
    ) -> Result<Self, DomainError> {
        let invalid = |source| DomainError::InvalidMaterial { tag, source };
        let elastic_modulus = positive("elastic modulus", elastic_modulus).map_err(invalid)?;
        let yield_stress = positive("yield stress", yield_stress).map_err(invalid)?;
        if !(0.0..1.0).contains(&hardening_ratio) {
            return Err(invalid(PropertyError::OutOfRange {
                name: "hardening ratio",
                value: hardening_ratio,
                min: 0.0,
                max: 1.0,
            }));
        }
        Ok(Self {
            tag,
            elastic_modulus,
            yield_stress,
            hardening_ratio,
            state: TrialState::new(UniaxialState::virgin(elastic_modulus)),
        })
    }

    /// Yield stress.
    #[must_use]
    pub fn yield_stress(&self) -> f64 {
        self.yield_stress
    }

    fn hardening_modulus(&self) -> f64 {
        self.hardening_ratio * self.elastic_modulus / (1.0 - self.hardening_ratio)
    }
}

impl StateMachine for Bilinear {
    fn commit_state(&mut self) {
        self.state.commit_state();
    }

    fn revert_to_last_commit(&mut self) {
        self.state.revert_to_last_commit();
    }

    fn revert_to_start(&mut self) {
        self.state.revert_to_start();
    }
}

impl UniaxialMaterial for Bilinear {
    fn tag(&self) -> usize {
        self.tag
    }

    fn set_trial_strain(&mut self, strain: f64) {
        let committed = *self.state.committed();
        let modulus = self.elastic_modulus;
        let hardening = self.hardening_modulus();

        let elastic_stress = modulus * (strain - committed.plastic_strain);
        let relative = elastic_stress - committed.back_stress;
        let overstress = relative.abs() - self.yield_stress;

        let trial = if overstress <= 0.0 {
            UniaxialState {
                strain,
                stress: elastic_stress,
                tangent: modulus,
                ..committed
            }
        } else {
            let direction = relative.signum();
            let multiplier = overstress / (modulus + hardening);
            UniaxialState {
                strain,
                stress: elastic_stress - modulus * multiplier * direction,
                tangent: modulus * hardening / (modulus + hardening),
                plastic_strain: committed.plastic_strain + multiplier * direction,
                back_stress: committed.back_stress + hardening * multiplier * direction,
            }
        };
        self.state.set_trial(trial);
    }

    fn strain(&self) -> f64 {
        self.state.trial().strain
    }

    fn stress(&self) -> f64 {
        self.state.trial().stress
    }

    fn tangent(&self) -> f64 {
        self.state.trial().tangent
    }

    fn initial_tangent(&self) -> f64 {
        self.elastic_modulus
    }

    fn committed_strain(&self) -> f64 {
        self.state.committed().strain
    }

    fn committed_stress(&self) -> f64 {
        self.state.committed().stress
    }

    fn commit_count(&self) -> usize {
        self.state.commit_count()
    }

    fn boxed_clone(&self) -> Box<dyn UniaxialMaterial> {
        Box::new(self.clone())
    }
}

/// Serializable description of a uniaxial material.
///
/// # Examples
/// ```
/// use equilibria::material::MaterialSpec;
///
/// let spec: MaterialSpec =
///     serde_json::from_str(r#"{"type": "Elastic", "tag": 1, "elastic_modulus": 2.0e9}"#)?;
/// let material = spec.build()?;
/// assert_eq!(material.initial_tangent(), 2.0e9);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MaterialSpec {
    /// Linear elastic material.
    Elastic {
        /// Identifier.
        tag: usize,
        /// Elastic modulus.
        elastic_modulus: f64,
    },
    /// Elastoplastic material with kinematic hardening.
    Bilinear {
        /// Identifier.
        tag: usize,
        /// Elastic modulus.
        elastic_modulus: f64,
        /// Yield stress.
        yield_stress: f64,
        /// Ratio of post-yield to elastic tangent.
        #[serde(default)]
        hardening_ratio: f64,
    },
}

impl MaterialSpec {
    /// Instantiate the described material.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidMaterial`] when a property is inadmissible.
    pub fn build(&self) -> Result<Box<dyn UniaxialMaterial>, DomainError> {
        Ok(match *self {
            Self::Elastic {
                tag,
                elastic_modulus,
            } => Box::new(Elastic::new(tag, elastic_modulus)?),
            Self::Bilinear {
                tag,
                elastic_modulus,
                yield_stress,
                hardening_ratio,
            } => Box::new(Bilinear::new(
                tag,
                elastic_modulus,
                yield_stress,
                hardening_ratio,
            )?),
        })
    }
}
