//! Scalar functions of pseudo-time scaling load patterns.

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Load factor as a function of time.
///
/// # Examples
/// ```
/// use equilibria::TimeSeries;
///
/// let ramp = TimeSeries::path(vec![0.0, 1.0, 2.0], vec![0.0, 2.0, 2.0], 1.0)?;
/// assert_eq!(ramp.factor(0.5), 1.0);
/// assert_eq!(ramp.slope(0.5), 2.0);
/// assert_eq!(ramp.factor(3.0), 0.0);
/// # Ok::<(), equilibria::DomainError>(())
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TimeSeries {
    /// Constant factor.
    Constant {
        /// Value of the series.
        #[serde(default = "unit")]
        factor: f64,
    },
    /// Factor proportional to time.
    Linear {
        /// Slope of the series.
        #[serde(default = "unit")]
        factor: f64,
    },
    /// Piecewise linear interpolation of sampled values; zero outside the samples.
    Path {
        /// Strictly increasing sample times.
        times: Vec<f64>,
        /// Sample values.
        values: Vec<f64>,
        /// Scale applied to every value.
        #[serde(default = "unit")]
        factor: f64,
    },
}

fn unit() -> f64 {
    1.0
}

impl Default for TimeSeries {
    fn default() -> Self {
        Self::Linear { factor: 1.0 }
    }
}

impl TimeSeries {
    /// Constant series with value `factor`.
    #[must_use]
    pub fn constant(factor: f64) -> Self {
        Self::Constant { factor }
    }

    /// Linear series with slope `factor`.
    #[must_use]
    pub fn linear(factor: f64) -> Self {
        Self::Linear { factor }
    }

    /// Piecewise linear series through `(times[i], values[i])`.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidTimeSeries`] when the samples are malformed.
    pub fn path(times: Vec<f64>, values: Vec<f64>, factor: f64) -> Result<Self, DomainError> {
        let series = Self::Path {
            times,
            values,
            factor,
        };
        series.validate()?;
        Ok(series)
    }

    /// Check that the series definition is well formed.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidTimeSeries`] when path samples differ in
    /// length, number fewer than two or are not strictly increasing in time.
    pub fn validate(&self) -> Result<(), DomainError> {
        if let Self::Path { times, values, .. } = self {
            if times.len() != values.len() {
                return Err(DomainError::InvalidTimeSeries(
                    "path times and values differ in length",
                ));
            }
            if times.len() < 2 {
                return Err(DomainError::InvalidTimeSeries(
                    "path needs at least two samples",
                ));
            }
            if times.windows(2).any(|pair| pair[1] <= pair[0]) {
                return Err(DomainError::InvalidTimeSeries(
                    "path times must increase strictly",
                ));
            }
        }
        Ok(())
    }

    /// Value of the series at `time`.
    #[must_use]
    pub fn factor(&self, time: f64) -> f64 {
        match self {
            Self::Constant { factor } => *factor,
            Self::Linear { factor } => factor * time,
            Self::Path {
                times,
                values,
                factor,
            } => match segment(times, time) {
                Some(i) => {
                    let ratio = (time - times[i]) / (times[i + 1] - times[i]);
                    factor * (values[i] + ratio * (values[i + 1] - values[i]))
                }
                None => 0.0,
            },
        }
    }

    /// Derivative of the series at `time`.
    ///
    /// At a sample time the slope of the following segment is returned.
    #[must_use]
    pub fn slope(&self, time: f64) -> f64 {
        match self {
            Self::Constant { .. } => 0.0,
            Self::Linear { factor } => *factor,
            Self::Path {
                times,
                values,
                factor,
            } => match segment(times, time) {
                Some(i) => factor * (values[i + 1] - values[i]) / (times[i + 1] - times[i]),
                None => 0.0,
            },
        }
    }
}

/// Index of the segment `[times[i], times[i + 1]]` containing `time`.
fn segment(times: &[f64], time: f64) -> Option<usize> {
    let (&first, &last) = (times.first()?, times.last()?);
    if time < first || time > last || times.len() < 2 {
        return None;
    }
    let upper = times.partition_point(|&sample| sample <= time);
    Some(upper.saturating_sub(1).min(times.len() - 2))
}
