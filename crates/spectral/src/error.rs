//! Error types for spectral estimation

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpectralError {
    #[error("Invalid spectral parameter: {message}")]
    InvalidParameter { message: String },

    #[error("Epoch has no samples")]
    EmptyEpoch,

    #[error("Epoch has {found} samples but the estimator was built for {expected}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("Signal index {index} is out of range for an epoch with {n_signals} signals")]
    SignalOutOfRange { index: usize, n_signals: usize },
}

impl SpectralError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        SpectralError::InvalidParameter {
            message: message.into(),
        }
    }
}

/// Result type for spectral operations
pub type SpectralResult<T> = Result<T, SpectralError>;
