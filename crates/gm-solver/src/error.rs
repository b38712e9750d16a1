//! Error types for the minimization stack.

use gm_gibbs::GibbsError;
use gm_phases::PhaseError;
use thiserror::Error;

pub type SolverResult<T> = Result<T, SolverError>;

#[derive(Error, Debug)]
pub enum SolverError {
    /// The bulk composition cannot be spanned by any non-negative combination
    /// of candidate phases.
    #[error("Infeasible bulk composition: {what}")]
    InfeasibleBulk { what: String },

    /// Linear-algebra failure that no fallback could absorb.
    #[error("Numeric error: {what}")]
    Numeric { what: String },

    /// The fixed-capacity phase-instance pool is exhausted.
    #[error("Phase pool capacity exceeded ({capacity} instances)")]
    PoolExhausted { capacity: usize },

    #[error(transparent)]
    Phase(#[from] PhaseError),

    #[error(transparent)]
    Gibbs(#[from] GibbsError),
}
