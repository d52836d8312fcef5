//! Geometric helpers for line elements.

use crate::containers::Vector;
use crate::errors::DomainError;

/// Straight segment joining two nodal positions.
#[derive(Clone, Debug, PartialEq)]
pub struct Chord {
    /// Distance between the end points.
    pub length: f64,
    /// Unit vector from the first to the second end point.
    pub direction: Vector,
}

impl Chord {
    /// Measure the chord from `start` to `end`.
    ///
    /// Returns `None` when the coordinate slices differ in length or when the
    /// distance does not exceed `tolerance`.
    ///
    /// # Examples
    /// ```
    /// use equilibria::geometry::Chord;
    ///
    /// let chord = Chord::between(&[0.0, 0.0], &[3.0, 4.0], 1.0e-12).expect("non-degenerate");
    /// assert_eq!(chord.length, 5.0);
    /// assert_eq!(chord.direction[0], 0.6);
    /// ```
    #[must_use]
    pub fn between(start: &[f64], end: &[f64], tolerance: f64) -> Option<Self> {
        if start.len() != end.len() {
            return None;
        }
        let delta = Vector::from_iterator(
            start.len(),
            start.iter().zip(end).map(|(from, to)| to - from),
        );
        let length = delta.norm();
        if length <= tolerance {
            return None;
        }
        Some(Self {
            length,
            direction: delta / length,
        })
    }

    /// Like [`Chord::between`] but reports a degenerate chord as an element error.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::IncompatibleNodes`] when the nodes live in spaces of
    /// different dimension and [`DomainError::ZeroLengthElement`] when they coincide.
    pub fn for_element(
        element: usize,
        start: &[f64],
        end: &[f64],
        tolerance: f64,
    ) -> Result<Self, DomainError> {
        if start.len() != end.len() {
            return Err(DomainError::IncompatibleNodes {
                element,
                reason: "nodes have different spatial dimensions",
            });
        }
        Self::between(start, end, tolerance).ok_or(DomainError::ZeroLengthElement(element))
    }
}
