//! Collaborator traits implemented by the serial proxy layer
//!
//! The monitor never touches bytes on the wire. It opens sessions through a
//! [`DeviceConnector`], talks to them through [`DeviceConnection`] and
//! reflashes boards through a [`FirmwareFlasher`]. Real implementations wrap
//! the DropBot serial proxy; `dropbot-sim` provides in-memory ones.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, watch};

use crate::error::{ConnectError, DeviceError, FlashError};
use crate::failure::IgnoreSet;
use crate::signal::Signal;

/// An event raised natively by a connected device
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceEvent {
    /// Native signal name (one of [`crate::DEVICE_SIGNALS`])
    pub signal: Signal,
    /// Device-defined payload
    pub payload: Value,
}

impl DeviceEvent {
    /// Create an event with a payload
    pub fn new(signal: Signal, payload: Value) -> Self {
        Self { signal, payload }
    }

    /// Create an event without a payload
    pub fn empty(signal: Signal) -> Self {
        Self::new(signal, Value::Null)
    }
}

/// Opens connections to a device on a given port
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    /// Attempt to open a session on `port`
    ///
    /// Failures listed in `ignore` must not be raised; the connector proceeds
    /// as if the condition were absent.
    async fn connect(
        &self,
        port: &str,
        ignore: &IgnoreSet,
    ) -> Result<Arc<dyn DeviceConnection>, ConnectError>;
}

/// A live connection to one device
#[async_trait]
pub trait DeviceConnection: Send + Sync {
    /// Port this connection is bound to
    fn port(&self) -> &str;

    /// Subscribe to native device events
    fn events(&self) -> broadcast::Receiver<DeviceEvent>;

    /// Disconnection indicator; flips to `true` once the link is lost
    ///
    /// A dropped sender is treated the same as `true`.
    fn disconnected(&self) -> watch::Receiver<bool>;

    /// Read a digital input pin
    async fn digital_read(&self, pin: u8) -> Result<bool, DeviceError>;

    /// Reboot the device; the link drops shortly after
    async fn reboot(&self) -> Result<(), DeviceError>;

    /// Close the link and release the port
    fn terminate(&self);
}

/// Uploads the bundled firmware to an attached board
#[async_trait]
pub trait FirmwareFlasher: Send + Sync {
    /// Flash firmware; idempotent and may take several seconds
    async fn flash(&self) -> Result<(), FlashError>;
}
