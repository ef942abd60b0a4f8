//! Device identification hook
//!
//! Identifying the device behind a port requires speaking its wire protocol,
//! which belongs to the serial proxy layer. The enumerator only needs the
//! answer, so it goes through this trait.

use async_trait::async_trait;
use dropbot_protocol::Version;

use crate::serial::SerialPortInfo;

/// Identity reported by a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Device name (e.g., "dropbot")
    pub name: String,
    /// Firmware version
    pub version: Version,
}

/// Queries a port for the identity of the device behind it
#[async_trait]
pub trait DeviceProbe: Send + Sync {
    /// Identify the device on `port`, or `None` if it does not answer
    ///
    /// The caller bounds the call with the discovery timeout.
    async fn identify(&self, port: &SerialPortInfo) -> Option<DeviceIdentity>;
}
