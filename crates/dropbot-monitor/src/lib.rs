//! DropBot connection supervisor
//!
//! This crate keeps a DropBot connected:
//! - [`Monitor`] discovers the device, opens a session, negotiates
//!   recoverable connect failures, watches for disconnection and starts over
//! - [`EventBus`] fans lifecycle events, forwarded device events and
//!   recovery queries out to application handlers
//! - [`RecoveryNegotiator`] turns `no-power` and `version-mismatch` failures
//!   into a decision from whichever handler answers first
//!
//! Wire framing, command encoding and firmware upload live behind the
//! collaborator traits in `dropbot_protocol`.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use dropbot_monitor::{EventBus, Monitor, MonitorConfig, RecoveryDecision};
//! use dropbot_protocol::{DeviceConnector, FirmwareFlasher, Signal};
//! use dropbot_detect::PortEnumerator;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo(
//! #     enumerator: Box<dyn PortEnumerator>,
//! #     connector: Arc<dyn DeviceConnector>,
//! #     flasher: Arc<dyn FirmwareFlasher>,
//! # ) {
//! let bus = EventBus::new(tokio::runtime::Handle::current());
//! bus.subscribe(Signal::NoPower, |_| async { Ok(Some(RecoveryDecision::Ignore)) });
//! bus.on(Signal::ChipInserted, |_| async { println!("chip inserted") });
//!
//! let monitor = Monitor::new(MonitorConfig::default(), bus, enumerator, connector, flasher);
//! let cancel = CancellationToken::new();
//! let task = monitor.spawn(cancel.clone());
//!
//! // ...
//! cancel.cancel();
//! let _ = task.await;
//! # }
//! ```

pub mod bus;
pub mod config;
pub mod error;
pub mod events;
pub mod monitor;
pub mod recovery;
pub mod session;

pub use bus::{Dispatch, EventBus, HandlerOutcome, SubscriptionId};
pub use config::MonitorConfig;
pub use error::{HandlerError, MonitorError};
pub use events::{Event, Payload, SessionRef};
pub use monitor::{Monitor, MonitorHandle, MonitorState};
pub use recovery::{RecoveryDecision, RecoveryNegotiator, RecoveryQuery, Resolution};
pub use session::Session;
