use thiserror::Error;

pub type GmResult<T> = Result<T, GmError>;

#[derive(Error, Debug)]
pub enum GmError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Dimension mismatch for {what}: got {got}, expected {expected}")]
    DimMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },

    #[error("Invariant violated: {what}")]
    Invariant { what: &'static str },
}
