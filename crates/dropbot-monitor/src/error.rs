//! Error types for the monitor

use thiserror::Error;

/// Failure reported by an event handler
///
/// Handler failures never reach the publisher as errors; they are collected
/// as outcomes and logged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HandlerError {
    /// The handler returned an error
    #[error("handler failed: {0}")]
    Failed(String),

    /// The handler panicked
    #[error("handler panicked: {0}")]
    Panicked(String),
}

impl HandlerError {
    /// Build a [`HandlerError::Failed`] from any displayable error
    pub fn failed(error: impl std::fmt::Display) -> Self {
        HandlerError::Failed(error.to_string())
    }
}

/// Reasons the monitor stops
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MonitorError {
    /// The cancellation token fired; cleanup has already run
    #[error("monitor cancelled")]
    Cancelled,
}
