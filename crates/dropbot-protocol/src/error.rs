//! Error types for DropBot collaborators

use thiserror::Error;

use crate::failure::FailureKind;
use crate::version::Version;

/// Errors raised while establishing a connection
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectError {
    /// The device answered but its 12V supply is not detected
    #[error("no 12V power supply detected on {port}")]
    NoPower { port: String },

    /// The firmware version does not match the driver
    #[error(
        "driver version `{driver_version}` does not match firmware version `{device_version}` on {port}"
    )]
    VersionMismatch {
        port: String,
        driver_version: Version,
        device_version: Version,
    },

    /// Any other connection failure
    #[error("failed to connect to {port}: {reason}")]
    Other { port: String, reason: String },
}

impl ConnectError {
    /// Recoverable failure kind, if this error can be negotiated away
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            ConnectError::NoPower { .. } => Some(FailureKind::NoPower),
            ConnectError::VersionMismatch { .. } => Some(FailureKind::VersionMismatch),
            ConnectError::Other { .. } => None,
        }
    }

    /// Port the failed attempt targeted
    pub fn port(&self) -> &str {
        match self {
            ConnectError::NoPower { port }
            | ConnectError::VersionMismatch { port, .. }
            | ConnectError::Other { port, .. } => port,
        }
    }
}

/// Errors raised by an established connection
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// The connection was terminated or lost
    #[error("device on {0} is disconnected")]
    Disconnected(String),

    /// The device rejected or failed a request
    #[error("device request failed: {0}")]
    Request(String),
}

/// Errors raised while flashing firmware
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FlashError {
    /// No device in bootloader mode was found
    #[error("no device available to flash")]
    NoDevice,

    /// The upload itself failed
    #[error("firmware upload failed: {0}")]
    Upload(String),
}
