//! Error types for lora-optim-rs.

use thiserror::Error;

/// Result type alias for lora-optim-rs operations.
pub type Result<T> = std::result::Result<T, OptimError>;

/// Errors that can occur in lora-optim-rs operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum OptimError {
    /// Invalid configuration parameter.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Shape mismatch in tensor operation.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Expected shape
        expected: Vec<usize>,
        /// Actual shape
        actual: Vec<usize>,
    },

    /// Dimension mismatch.
    #[error("dimension mismatch: {message}")]
    DimensionMismatch {
        /// Descriptive message
        message: String,
    },

    /// Rank growth invoked in an unsupported order or on an unsupported tensor.
    #[error("rank growth error: {0}")]
    RankGrowth(String),

    /// Sampling distribution exhausted before the requested draw count.
    #[error("sampling error: {0}")]
    Sampling(String),

    /// Underlying candle error.
    #[error("candle error: {0}")]
    Candle(#[from] candle_core::Error),
}
