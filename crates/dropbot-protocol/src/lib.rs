//! DropBot Protocol Library
//!
//! Shared vocabulary for supervising a DropBot microfluidics controller over
//! a serial link:
//!
//! - **Version**: ordered firmware/driver versions used for candidate ranking
//! - **Signal**: the names of every event that travels over the monitor's bus
//! - **FailureKind / IgnoreSet**: recoverable connect-time failures and the
//!   set of failures a connection attempt has been told to tolerate
//! - **Collaborator traits**: [`DeviceConnector`], [`DeviceConnection`] and
//!   [`FirmwareFlasher`], implemented by the serial proxy layer (or by the
//!   simulator in tests)
//!
//! Byte-level framing and command encoding live behind these traits and are
//! not part of this crate.
//!
//! # Example
//!
//! ```rust
//! use dropbot_protocol::{Signal, Version};
//!
//! let version: Version = "1.2.3".parse().unwrap();
//! assert!(version > Version::new(1, 2, 0));
//!
//! assert_eq!(Signal::ChipInserted.as_str(), "chip-inserted");
//! assert_eq!(Signal::OutputEnabled.forwarded_alias(), Some(Signal::ChipInserted));
//! ```

pub mod device;
pub mod error;
pub mod failure;
pub mod signal;
pub mod version;

pub use device::{DeviceConnection, DeviceConnector, DeviceEvent, FirmwareFlasher};
pub use error::{ConnectError, DeviceError, FlashError};
pub use failure::{FailureKind, IgnoreSet};
pub use signal::{Signal, DEVICE_SIGNALS};
pub use version::{Version, VersionParseError};

/// Device identity reported by DropBot firmware during port enumeration
pub const DEVICE_NAME: &str = "dropbot";

/// Digital input wired to the chip-presence switch (active low)
pub const OUTPUT_ENABLE_PIN: u8 = 22;
