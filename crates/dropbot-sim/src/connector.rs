//! Simulated connector and firmware flasher
//!
//! [`SimulatedConnector`] models the conditions a real connect attempt can
//! run into (no 12V supply, firmware older or newer than the driver) and
//! honours the caller's [`IgnoreSet`] the same way the serial proxy does.
//! One-off failures can be queued ahead of those conditions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dropbot_protocol::{
    ConnectError, DeviceConnection, DeviceConnector, FailureKind, FirmwareFlasher, FlashError,
    IgnoreSet, Version,
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::board::SimulatedBoard;

/// Hardware conditions seen by the simulated connector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedDeviceConfig {
    /// Version the host driver expects
    pub driver_version: Version,
    /// Version currently flashed on the board
    pub firmware_version: Version,
    /// Whether the 12V supply is connected
    pub powered: bool,
    /// Whether a chip is seated when a connection opens
    pub chip_present: bool,
    /// Whether pin reads on opened connections fail
    pub pin_fault: bool,
    /// How long each connect attempt takes in milliseconds
    pub connect_delay_ms: u64,
}

impl Default for SimulatedDeviceConfig {
    fn default() -> Self {
        Self {
            driver_version: Version::new(1, 79, 0),
            firmware_version: Version::new(1, 79, 0),
            powered: true,
            chip_present: true,
            pin_fault: false,
            connect_delay_ms: 0,
        }
    }
}

/// One recorded call to [`DeviceConnector::connect`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAttempt {
    /// Port requested
    pub port: String,
    /// Failures the caller asked to tolerate
    pub ignore: IgnoreSet,
}

#[derive(Debug)]
struct ConnectorState {
    device: SimulatedDeviceConfig,
    queued: VecDeque<ConnectError>,
    boards: Vec<Arc<SimulatedBoard>>,
}

/// Connector opening [`SimulatedBoard`]s
#[derive(Debug)]
pub struct SimulatedConnector {
    state: Mutex<ConnectorState>,
    attempts: watch::Sender<Vec<ConnectAttempt>>,
}

impl SimulatedConnector {
    /// Create a connector for a device in the given conditions
    pub fn new(device: SimulatedDeviceConfig) -> Self {
        Self {
            state: Mutex::new(ConnectorState {
                device,
                queued: VecDeque::new(),
                boards: Vec::new(),
            }),
            attempts: watch::Sender::new(Vec::new()),
        }
    }

    /// Current hardware conditions
    pub fn device(&self) -> SimulatedDeviceConfig {
        self.lock().device.clone()
    }

    /// Connect or disconnect the 12V supply
    pub fn set_powered(&self, powered: bool) {
        self.lock().device.powered = powered;
    }

    /// Change the firmware on the board
    pub fn set_firmware_version(&self, version: Version) {
        self.lock().device.firmware_version = version;
    }

    /// Chip presence for connections opened from now on
    pub fn set_chip_present(&self, present: bool) {
        self.lock().device.chip_present = present;
    }

    /// Fail the next attempt with `error`, before any modelled condition
    pub fn fail_next(&self, error: ConnectError) {
        self.lock().queued.push_back(error);
    }

    /// Every attempt so far, oldest first
    pub fn attempts(&self) -> Vec<ConnectAttempt> {
        self.attempts.borrow().clone()
    }

    /// Receiver notified after every attempt
    pub fn watch_attempts(&self) -> watch::Receiver<Vec<ConnectAttempt>> {
        self.attempts.subscribe()
    }

    /// Boards handed out so far, oldest first
    pub fn boards(&self) -> Vec<Arc<SimulatedBoard>> {
        self.lock().boards.clone()
    }

    /// Most recently opened board
    pub fn last_board(&self) -> Option<Arc<SimulatedBoard>> {
        self.lock().boards.last().cloned()
    }

    fn lock(&self) -> MutexGuard<'_, ConnectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn open(&self, port: &str, ignore: &IgnoreSet) -> Result<Arc<SimulatedBoard>, ConnectError> {
        let mut state = self.lock();

        if let Some(error) = state.queued.pop_front() {
            return Err(error);
        }

        let device = &state.device;
        if !device.powered && !ignore.contains(FailureKind::NoPower) {
            return Err(ConnectError::NoPower {
                port: port.to_string(),
            });
        }
        if device.firmware_version != device.driver_version
            && !ignore.contains(FailureKind::VersionMismatch)
        {
            return Err(ConnectError::VersionMismatch {
                port: port.to_string(),
                driver_version: device.driver_version,
                device_version: device.firmware_version,
            });
        }

        let board = Arc::new(SimulatedBoard::new(port, device.chip_present));
        board.set_pin_fault(device.pin_fault);
        state.boards.push(Arc::clone(&board));
        Ok(board)
    }
}

impl Default for SimulatedConnector {
    fn default() -> Self {
        Self::new(SimulatedDeviceConfig::default())
    }
}

#[async_trait]
impl DeviceConnector for SimulatedConnector {
    async fn connect(
        &self,
        port: &str,
        ignore: &IgnoreSet,
    ) -> Result<Arc<dyn DeviceConnection>, ConnectError> {
        self.attempts.send_modify(|attempts| {
            attempts.push(ConnectAttempt {
                port: port.to_string(),
                ignore: ignore.clone(),
            })
        });

        let delay = self.lock().device.connect_delay_ms;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        match self.open(port, ignore) {
            Ok(board) => {
                debug!("Simulated board opened on {}", port);
                Ok(board)
            }
            Err(e) => {
                debug!("Simulated connect failed: {}", e);
                Err(e)
            }
        }
    }
}

/// Flasher that brings the simulated firmware up to the driver version
#[derive(Debug)]
pub struct SimulatedFlasher {
    connector: Option<Arc<SimulatedConnector>>,
    duration: Duration,
    flashes: watch::Sender<usize>,
}

impl SimulatedFlasher {
    /// Flasher with no device behind it; every flash fails with `NoDevice`
    pub fn detached() -> Self {
        Self {
            connector: None,
            duration: Duration::ZERO,
            flashes: watch::Sender::new(0),
        }
    }

    /// Flasher updating the firmware seen by `connector`
    pub fn new(connector: Arc<SimulatedConnector>, duration: Duration) -> Self {
        Self {
            connector: Some(connector),
            duration,
            flashes: watch::Sender::new(0),
        }
    }

    /// Number of completed flashes
    pub fn flashes(&self) -> usize {
        *self.flashes.borrow()
    }

    /// Receiver notified after every completed flash
    pub fn watch_flashes(&self) -> watch::Receiver<usize> {
        self.flashes.subscribe()
    }
}

#[async_trait]
impl FirmwareFlasher for SimulatedFlasher {
    async fn flash(&self) -> Result<(), FlashError> {
        let connector = self.connector.as_ref().ok_or(FlashError::NoDevice)?;

        tokio::time::sleep(self.duration).await;
        let driver_version = connector.device().driver_version;
        connector.set_firmware_version(driver_version);
        self.flashes.send_modify(|count| *count += 1);

        info!("Simulated firmware flashed to v{}", driver_version);
        Ok(())
    }
}
