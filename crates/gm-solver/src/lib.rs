//! Equilibrium solver for gibbsmin.
//!
//! This crate holds the minimization stack proper: pseudocompound generation
//! and bounded local refinement of solution compositions, the simplex
//! levelling step that seeds the assemblage and dual potentials, the
//! Partitioning Gibbs Energy (PGE) outer iteration, and the finite-difference
//! post-processor for physical properties.
//!
//! One point is solved strictly sequentially: levelling, then PGE, then
//! post-processing. The Gamma update of each PGE iteration depends on every
//! active phase's refreshed potential from that same iteration, so there is
//! no internal concurrency; parallelism lives a level up, across points.

pub mod assemblage;
pub mod error;
pub mod levelling;
pub mod pge;
pub mod point;
pub mod postprocess;
pub mod refine;

pub use assemblage::{Assemblage, PhaseInstance, PhaseKind, PhaseStatus};
pub use error::{SolverError, SolverResult};
pub use levelling::{level, LevellingMode, LevellingOutcome};
pub use pge::{pge, seed_assemblage, ConvergenceQuality, PgeConfig, PgeOutcome};
pub use point::{solve_point, FixedPhase, PointConfig, PointSolution, SolveMode, StablePhase};
pub use postprocess::{postprocess, StencilConfig, SystemProperties};
pub use refine::{generate_pseudocompounds, refine, refine_retained, RefineConfig, Refined};
