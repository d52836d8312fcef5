//! Load patterns: nodal loads or ground motion scaled by a time series.

use serde::{Deserialize, Serialize};

use crate::node::NodeTag;
use crate::time_series::TimeSeries;

/// Reference load applied to one node; one entry per node DOF.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodalLoad {
    /// Loaded node.
    pub node: NodeTag,
    /// Load per DOF.
    pub values: Vec<f64>,
}

/// Group of loads sharing a time series.
///
/// # Examples
/// ```
/// use equilibria::{Pattern, TimeSeries};
///
/// let pattern = Pattern::plain(1, TimeSeries::constant(1.0))
///     .with_load(3, vec![1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
/// assert_eq!(pattern.tag(), 1);
/// assert!(pattern.references(3));
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Pattern {
    /// Nodal loads scaled by the series.
    Plain {
        /// Identifier.
        tag: usize,
        /// Scaling function.
        series: TimeSeries,
        /// Reference loads.
        #[serde(default)]
        loads: Vec<NodalLoad>,
    },
    /// Support acceleration along one DOF applied to every node with mass.
    ///
    /// Each node receives the inertial load `-mass[dof] * series(t)`.
    UniformExcitation {
        /// Identifier.
        tag: usize,
        /// Ground acceleration history.
        series: TimeSeries,
        /// Zero-based DOF excited.
        dof: usize,
    },
}

impl Pattern {
    /// Empty plain pattern.
    #[must_use]
    pub fn plain(tag: usize, series: TimeSeries) -> Self {
        Self::Plain {
            tag,
            series,
            loads: Vec::new(),
        }
    }

    /// Ground motion pattern along `dof`.
    #[must_use]
    pub fn uniform_excitation(tag: usize, series: TimeSeries, dof: usize) -> Self {
        Self::UniformExcitation { tag, series, dof }
    }

    /// Add a reference load. Has no effect on a ground motion pattern.
    #[must_use]
    pub fn with_load(mut self, node: NodeTag, values: Vec<f64>) -> Self {
        if let Self::Plain { loads, .. } = &mut self {
            loads.push(NodalLoad { node, values });
        }
        self
    }

    /// Identifier of the pattern.
    #[must_use]
    pub fn tag(&self) -> usize {
        match self {
            Self::Plain { tag, .. } | Self::UniformExcitation { tag, .. } => *tag,
        }
    }

    /// Time series of the pattern.
    #[must_use]
    pub fn series(&self) -> &TimeSeries {
        match self {
            Self::Plain { series, .. } | Self::UniformExcitation { series, .. } => series,
        }
    }

    /// Nodal loads of the pattern.
    #[must_use]
    pub fn loads(&self) -> &[NodalLoad] {
        match self {
            Self::Plain { loads, .. } => loads,
            Self::UniformExcitation { .. } => &[],
        }
    }

    /// Return `true` when a load of the pattern acts on `node`.
    #[must_use]
    pub fn references(&self, node: NodeTag) -> bool {
        self.loads().iter().any(|load| load.node == node)
    }

    /// Drop every load acting on `node`.
    pub(crate) fn detach(&mut self, node: NodeTag) {
        if let Self::Plain { loads, .. } = self {
            loads.retain(|load| load.node != node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ground_motion_ignores_nodal_loads() {
        let pattern = Pattern::uniform_excitation(2, TimeSeries::constant(1.0), 0)
            .with_load(1, vec![1.0, 0.0]);
        assert!(pattern.loads().is_empty());
        assert_eq!(pattern.series(), &TimeSeries::constant(1.0));
    }

    #[test]
    fn detaching_a_node_removes_its_loads() {
        let mut pattern = Pattern::plain(1, TimeSeries::default())
            .with_load(1, vec![1.0, 0.0])
            .with_load(2, vec![0.0, 1.0]);
        pattern.detach(1);
        assert!(!pattern.references(1));
        assert!(pattern.references(2));
    }

    #[test]
    fn patterns_deserialize_from_json() {
        let pattern: Pattern = serde_json::from_str(
            r#"{
                "type": "Plain",
                "tag": 1,
                "series": {"type": "Constant"},
                "loads": [{"node": 3, "values": [1.0, 0.0]}]
            }"#,
        )
        .expect("valid json");
        assert_eq!(
            pattern,
            Pattern::plain(1, TimeSeries::constant(1.0)).with_load(3, vec![1.0, 0.0])
        );
    }
}
