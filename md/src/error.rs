//! Error taxonomy for setting up and running simulations
//!
//! Only setup problems are errors. Numeric degeneracies inside the pair
//! kernel are absorbed where they occur and never reach this type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// Invalid or inconsistent run configuration, detected before any step runs
    #[error("configuration error: {0}")]
    Config(String),

    /// A numeric parameter outside its admissible range
    #[error("invalid parameter `{name}`: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    /// Arrays that must be index-aligned disagree in length or dimension
    #[error("shape mismatch for {what}: expected {expected}, found {found}")]
    Shape {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_yml::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;

/// Reject non-finite or non-positive values for strictly positive parameters
pub(crate) fn ensure_positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimError::InvalidParameter { name, value })
    }
}
