#![warn(clippy::all)]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

pub mod algorithm;
pub mod analysis;
pub mod assembly;
pub mod config;
pub mod constraint;
pub mod containers;
pub mod convergence;
pub mod domain;
pub mod element;
pub mod errors;
pub mod geometry;
pub mod handler;
pub mod integrator;
pub mod material;
pub mod node;
pub mod numberer;
pub mod pattern;
pub mod section;
pub mod state;
pub mod system;
pub mod time_series;

pub use analysis::{Analysis, AnalysisBuilder, AnalysisReport, AnalysisSettings, StepReport};
pub use config::{AnalysisConfig, Tolerances, Verbosity};
pub use constraint::Constraint;
pub use containers::{Matrix, Vector};
pub use domain::{Domain, Rayleigh};
pub use errors::{AnalysisError, ConfigError, DomainError, PropertyError, SolverError};
pub use node::{Node, NodeShape, NodeTag, ResponseQuery};
pub use pattern::Pattern;
pub use time_series::TimeSeries;
