//! Simulated DropBot board
//!
//! A [`SimulatedBoard`] stands in for one open serial connection. Tests and
//! the console demo drive it directly: insert or remove a chip, inject
//! telemetry, unplug the cable.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use dropbot_protocol::{DeviceConnection, DeviceError, DeviceEvent, Signal, OUTPUT_ENABLE_PIN};
use serde_json::{json, Value};
use tokio::sync::{broadcast, watch};
use tracing::{debug, trace};

/// Capacity of the board's native event stream
const EVENT_CAPACITY: usize = 64;

/// A simulated board behind one connection
#[derive(Debug)]
pub struct SimulatedBoard {
    /// Port the board is attached to
    port: String,
    /// Native event stream
    events: broadcast::Sender<DeviceEvent>,
    /// Link state; `true` once unplugged or terminated
    disconnected: watch::Sender<bool>,
    /// Chip presence switch
    chip_present: AtomicBool,
    /// Fail every pin read
    pin_fault: AtomicBool,
    /// Number of `terminate()` calls
    terminations: AtomicUsize,
    /// Number of `reboot()` calls
    reboots: AtomicUsize,
}

impl SimulatedBoard {
    /// Create a board on `port`
    pub fn new(port: impl Into<String>, chip_present: bool) -> Self {
        Self {
            port: port.into(),
            events: broadcast::channel(EVENT_CAPACITY).0,
            disconnected: watch::Sender::new(false),
            chip_present: AtomicBool::new(chip_present),
            pin_fault: AtomicBool::new(false),
            terminations: AtomicUsize::new(0),
            reboots: AtomicUsize::new(0),
        }
    }

    /// Check if a chip is inserted
    pub fn chip_present(&self) -> bool {
        self.chip_present.load(Ordering::SeqCst)
    }

    /// Insert or remove the chip
    ///
    /// A change raises `output_enabled` or `output_disabled` like the real
    /// firmware does.
    pub fn set_chip_present(&self, present: bool) {
        if self.chip_present.swap(present, Ordering::SeqCst) != present {
            let signal = if present {
                Signal::OutputEnabled
            } else {
                Signal::OutputDisabled
            };
            self.emit(signal, Value::Null);
        }
    }

    /// Make pin reads fail (or succeed again)
    pub fn set_pin_fault(&self, fault: bool) {
        self.pin_fault.store(fault, Ordering::SeqCst);
    }

    /// Raise a native event; returns the number of listeners reached
    pub fn emit(&self, signal: Signal, payload: Value) -> usize {
        trace!("{} emitting {}", self.port, signal);
        self.events
            .send(DeviceEvent::new(signal, payload))
            .unwrap_or(0)
    }

    /// Raise a `capacitance-updated` telemetry event
    pub fn emit_capacitance(&self, capacitance: f64, voltage: f64) -> usize {
        self.emit(
            Signal::CapacitanceUpdated,
            json!({ "new_value": capacitance, "V_a": voltage }),
        )
    }

    /// Pull the cable
    pub fn unplug(&self) {
        debug!("{} unplugged", self.port);
        self.disconnected.send_replace(true);
    }

    /// Check if the link is down
    pub fn is_disconnected(&self) -> bool {
        *self.disconnected.borrow()
    }

    /// Number of times the connection was terminated
    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    /// Number of reboot requests
    pub fn reboots(&self) -> usize {
        self.reboots.load(Ordering::SeqCst)
    }

    /// Number of active event stream listeners
    pub fn listeners(&self) -> usize {
        self.events.receiver_count()
    }
}

#[async_trait]
impl DeviceConnection for SimulatedBoard {
    fn port(&self) -> &str {
        &self.port
    }

    fn events(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    fn disconnected(&self) -> watch::Receiver<bool> {
        self.disconnected.subscribe()
    }

    async fn digital_read(&self, pin: u8) -> Result<bool, DeviceError> {
        if self.is_disconnected() {
            return Err(DeviceError::Disconnected(self.port.clone()));
        }
        if self.pin_fault.load(Ordering::SeqCst) {
            return Err(DeviceError::Request(format!("digital_read({}) timed out", pin)));
        }
        // the presence switch pulls the pin low when a chip is seated
        Ok(pin == OUTPUT_ENABLE_PIN && !self.chip_present())
    }

    async fn reboot(&self) -> Result<(), DeviceError> {
        if self.is_disconnected() {
            return Err(DeviceError::Disconnected(self.port.clone()));
        }
        self.reboots.fetch_add(1, Ordering::SeqCst);
        self.unplug();
        Ok(())
    }

    fn terminate(&self) {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        self.disconnected.send_replace(true);
    }
}
