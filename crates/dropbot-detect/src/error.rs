//! Error types for DropBot discovery

use thiserror::Error;

/// Errors that can occur during discovery
#[derive(Debug, Error)]
pub enum DetectError {
    /// Failed to enumerate serial ports
    #[error("failed to enumerate ports: {0}")]
    EnumerationFailed(String),

    /// No port serves the expected device
    #[error("no {0} device found")]
    NoCandidates(String),

    /// Serial port error
    #[error("serial port error: {0}")]
    SerialPort(#[from] serialport::Error),
}
