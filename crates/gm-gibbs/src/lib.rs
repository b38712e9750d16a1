//! gm-gibbs: chemical system and Gibbs-energy model interface for gibbsmin.
//!
//! Provides:
//! - Oxide component definitions and the system's component basis
//! - Bulk-rock composition handling (normalization, nonzero subset)
//! - `GibbsModel` trait for standard-state endmember energies
//! - Analytic linear backend + a small built-in demo catalog
//!
//! # Architecture
//!
//! The `GibbsModel` trait is the seam that isolates the minimization stack from
//! the thermodynamic parameter database. The engine only ever asks one
//! question: standard-state Gibbs energy and oxide composition of a named
//! endmember at (P,T). The built-in backend is the analytic linear model;
//! tabulated Holland-&-Powell-style databases plug in behind the same trait.

pub mod bulk;
pub mod error;
pub mod linear;
pub mod model;
pub mod oxides;

// Re-exports for ergonomics
pub use bulk::BulkComposition;
pub use error::{GibbsError, GibbsResult};
pub use linear::{demo_catalog, LinearEntry, LinearGibbsModel};
pub use model::{EndmemberGibbs, GibbsModel};
pub use oxides::ChemicalSystem;
