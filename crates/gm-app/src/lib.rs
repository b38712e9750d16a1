//! gm-app: run orchestration for gibbsmin.
//!
//! Glue between the solver stack and an invocation: run configuration, the
//! multi-point YAML input, round-robin parallel execution with private
//! per-worker databases, and report types (JSON document + screen summary).

pub mod config;
pub mod error;
pub mod input;
pub mod report;
pub mod runner;

pub use config::RunConfig;
pub use error::{AppError, AppResult};
pub use input::{builtin_bulk, parse_points, read_points, FixedRecord, PointRecord};
pub use report::{PhaseReport, PointReport, RunReport, SystemReport};
pub use runner::run_points;
