//! gm-phases: phase reference store for gibbsmin.
//!
//! Owns the per-run reference records the minimization stack works on:
//! - `PurePhaseRef`: fixed-composition phases
//! - `SolidSolutionRef`: solution models with mixing energetics, bounds,
//!   site-fraction constraints and a bounded pseudocompound buffer
//! - `PhaseDatabase`: allocation, per-point endmember evaluation, flag reset
//!
//! Buffers are fixed-capacity and reused across points; nothing here
//! reallocates inside the solve loop.

pub mod database;
pub mod error;
pub mod pseudocompound;
pub mod pure;
pub mod solution;

pub use database::{DatabaseConfig, PhaseDatabase};
pub use error::{PhaseError, PhaseResult};
pub use pseudocompound::{InsertOutcome, Pseudocompound, PseudocompoundBuffer};
pub use pure::{PhysicalProperties, PurePhaseRef};
pub use solution::{MixingModel, SiteFractions, SolidSolutionRef, SolutionEval, SolutionModel};
