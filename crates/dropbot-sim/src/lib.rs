//! DropBot Simulation Library
//!
//! In-memory stand-ins for the collaborators the monitor talks to, for
//! testing supervision without a physical board:
//!
//! - **SimulatedEnumerator**: serves a configurable port listing
//! - **SimulatedConnector**: opens boards, or fails with no-power and
//!   version-mismatch errors according to the modelled hardware conditions
//! - **SimulatedBoard**: a live connection with a chip presence switch,
//!   telemetry injection and a pullable cable
//! - **SimulatedFlasher**: "flashes" the driver's firmware version
//!
//! # Example
//!
//! ```rust
//! use dropbot_protocol::{ConnectError, DeviceConnector, IgnoreSet};
//! use dropbot_sim::{SimulatedConnector, SimulatedDeviceConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let connector = SimulatedConnector::new(SimulatedDeviceConfig {
//!     powered: false,
//!     ..Default::default()
//! });
//!
//! let result = connector.connect("COM3", &IgnoreSet::new()).await;
//! assert!(matches!(result, Err(ConnectError::NoPower { .. })));
//! # }
//! ```

pub mod board;
pub mod connector;
pub mod enumerator;

pub use board::SimulatedBoard;
pub use connector::{ConnectAttempt, SimulatedConnector, SimulatedDeviceConfig, SimulatedFlasher};
pub use enumerator::SimulatedEnumerator;
