//! Application-level error type.

use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("input file error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("report serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {what}")]
    Config { what: String },

    #[error(transparent)]
    Gibbs(#[from] gm_gibbs::GibbsError),

    #[error(transparent)]
    Phase(#[from] gm_phases::PhaseError),

    #[error(transparent)]
    Solver(#[from] gm_solver::SolverError),
}
