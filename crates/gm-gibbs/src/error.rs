//! Chemical-system and Gibbs-model errors.

use gm_core::GmError;
use thiserror::Error;

/// Result type for chemical-system operations.
pub type GibbsResult<T> = Result<T, GibbsError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GibbsError {
    /// Endmember or pure-phase name the model does not know.
    #[error("Unknown endmember '{name}' in Gibbs model")]
    UnknownEndmember { name: String },

    /// Malformed composition vector (wrong length, negative entry, zero sum).
    #[error("Malformed composition: {what}")]
    MalformedComposition { what: &'static str },

    /// Non-physical value produced or supplied.
    #[error("Non-physical value for {what}")]
    NonPhysical { what: &'static str },
}

impl From<GibbsError> for GmError {
    fn from(err: GibbsError) -> Self {
        match err {
            GibbsError::UnknownEndmember { .. } => GmError::InvalidArg { what: "endmember" },
            GibbsError::MalformedComposition { what } => GmError::InvalidArg { what },
            GibbsError::NonPhysical { what } => GmError::Invariant { what },
        }
    }
}
