//! The live device session owned by the monitor
//!
//! A [`Session`] wraps one open [`DeviceConnection`] and the task forwarding
//! its native events onto the bus. Terminating the session stops forwarding
//! and releases the port; it happens at most once, and dropping a session
//! terminates it.

use std::sync::Arc;

use dropbot_protocol::{DeviceConnection, DeviceError, DeviceEvent};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::bus::EventBus;
use crate::events::{Event, SessionRef};

/// An open connection plus its event forwarder
pub struct Session {
    connection: Arc<dyn DeviceConnection>,
    forwarder: Option<JoinHandle<()>>,
    terminated: bool,
}

impl Session {
    /// Take ownership of `connection` and start forwarding its events
    pub fn open(connection: Arc<dyn DeviceConnection>, bus: &EventBus) -> Self {
        let events = connection.events();
        let forwarder = bus
            .runtime()
            .spawn(forward_events(events, bus.clone(), connection.port().to_string()));

        info!("Session opened on {}", connection.port());

        Self {
            connection,
            forwarder: Some(forwarder),
            terminated: false,
        }
    }

    /// Port the session is bound to
    pub fn port(&self) -> &str {
        self.connection.port()
    }

    /// Shared handle to the underlying connection
    pub fn connection(&self) -> Arc<dyn DeviceConnection> {
        Arc::clone(&self.connection)
    }

    /// Non-owning reference handed to `connected` handlers
    pub fn reference(&self) -> SessionRef {
        SessionRef::new(&self.connection)
    }

    /// Disconnection indicator of the underlying link
    pub fn disconnected(&self) -> watch::Receiver<bool> {
        self.connection.disconnected()
    }

    /// Read a digital input pin
    pub async fn digital_read(&self, pin: u8) -> Result<bool, DeviceError> {
        self.connection.digital_read(pin).await
    }

    /// Ask the device to reboot
    pub async fn reboot(&self) -> Result<(), DeviceError> {
        self.connection.reboot().await
    }

    /// Check if [`Session::terminate`] has run
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Stop forwarding and close the link; later calls do nothing
    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;

        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
        self.connection.terminate();
        info!("Session on {} terminated", self.connection.port());
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("port", &self.port())
            .field("terminated", &self.terminated)
            .finish()
    }
}

/// Republish native device events until the device side closes
///
/// Each native event goes out under its own name first, then under its
/// chip-presence alias if it has one.
async fn forward_events(mut events: broadcast::Receiver<DeviceEvent>, bus: EventBus, port: String) {
    loop {
        match events.recv().await {
            Ok(event) if event.signal.is_device_native() => {
                trace!("Forwarding {} from {}", event.signal, port);
                bus.emit(Event::forwarded(event.signal, &event));
                if let Some(alias) = event.signal.forwarded_alias() {
                    bus.emit(Event::forwarded(alias, &event));
                }
            }
            Ok(event) => debug!("Ignoring non-device signal {} from {}", event.signal, port),
            Err(RecvError::Lagged(skipped)) => {
                warn!("Event forwarder on {} lagged, dropped {} event(s)", port, skipped);
            }
            Err(RecvError::Closed) => {
                debug!("Event stream on {} closed", port);
                break;
            }
        }
    }
}
