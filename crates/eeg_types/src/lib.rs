//! Shared types for the spectral connectivity workspace
//!
//! This crate contains the data types exchanged between the spectral estimator and the
//! connectivity engine: epochs, their timing metadata and the spectral mode selector.

pub mod config;
pub mod data;

// Re-export commonly used types
pub use config::*;
pub use data::*;
