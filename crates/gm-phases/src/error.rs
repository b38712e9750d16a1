//! Phase-store errors.

use gm_gibbs::GibbsError;
use thiserror::Error;

pub type PhaseResult<T> = Result<T, PhaseError>;

#[derive(Error, Debug)]
pub enum PhaseError {
    /// Fatal at startup: the database cannot be built from this configuration.
    #[error("Configuration error: {what}")]
    Config { what: String },

    /// A phase or solution name absent from the database.
    #[error("Unknown phase '{name}'")]
    UnknownPhase { name: String },

    /// A candidate composition violating site-fraction or box constraints.
    /// Recovered locally by discarding the candidate.
    #[error("Infeasible composition: {what}")]
    Infeasible { what: &'static str },

    #[error("Dimension mismatch: {what}")]
    Dimension { what: &'static str },

    #[error(transparent)]
    Gibbs(#[from] GibbsError),
}
