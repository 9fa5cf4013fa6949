//! Error types for connectivity estimation

use spectral::SpectralError;
use thiserror::Error;

/// Connectivity-specific error types
#[derive(Error, Debug)]
pub enum ConnectivityError {
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    #[error("Epoch {epoch} has shape {found:?} (signals, samples), expected {expected:?}")]
    ShapeMismatch {
        epoch: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("No epochs were provided")]
    NoEpochs,

    #[error("Cannot combine accumulators: {0}")]
    IncompatibleAccumulators(String),

    #[error("Spectral estimation error: {0}")]
    Spectral(#[from] SpectralError),

    #[error("Worker {worker} panicked")]
    WorkerPanicked { worker: usize },

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

impl ConnectivityError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        ConnectivityError::InvalidParameter {
            message: message.into(),
        }
    }
}

/// Result type for connectivity operations
pub type ConnectivityResult<T> = Result<T, ConnectivityError>;
