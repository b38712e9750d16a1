//! gm-core: stable foundation for gibbsmin.
//!
//! Contains:
//! - units (uom constructors at the boundary + engine-internal `Conditions`)
//! - numeric (Real + tolerances + float helpers)
//! - error (shared error types)
//! - timing (per-point elapsed-time helper)

pub mod error;
pub mod numeric;
pub mod timing;
pub mod units;

// Re-exports: nice ergonomics for downstream crates
pub use error::{GmError, GmResult};
pub use numeric::*;
pub use timing::PointTimer;
pub use units::*;
