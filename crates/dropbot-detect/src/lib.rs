//! DropBot Port Discovery Library
//!
//! This crate finds DropBot controllers among the serial ports of the host
//! and picks the one the monitor should connect to.
//!
//! Port listing is behind the [`PortEnumerator`] trait. The
//! [`SerialPortEnumerator`] implementation lists OS ports through the
//! `serialport` crate and asks a [`DeviceProbe`] (the serial proxy layer) to
//! identify each one.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use dropbot_detect::{PortScanner, PortEnumerator};
//!
//! async fn pick(enumerator: Box<dyn PortEnumerator>) {
//!     let scanner = PortScanner::new(enumerator);
//!     match scanner.find(Duration::from_millis(100)).await {
//!         Ok(candidate) => println!("Using {} (v{})", candidate.port, candidate.version),
//!         Err(e) => println!("{}", e),
//!     }
//! }
//! ```

pub mod error;
pub mod probe;
pub mod scanner;
pub mod serial;

pub use error::DetectError;
pub use probe::{DeviceIdentity, DeviceProbe};
pub use scanner::{DeviceCandidate, PortEntry, PortEnumerator, PortScanner};
pub use serial::{ScannerConfig, SerialPortEnumerator, SerialPortInfo};
