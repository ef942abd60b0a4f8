//! Candidate discovery and ranking
//!
//! A discovery pass asks the [`PortEnumerator`] for every port once, keeps
//! the ones serving the expected device and ranks them: highest firmware
//! version first, ties going to the lowest port name (`COM1` before `COM2`).

use std::cmp::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use dropbot_protocol::{Version, DEVICE_NAME};
use tracing::{debug, info};

use crate::error::DetectError;

/// One row of a port listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEntry {
    /// Port name (e.g., /dev/ttyACM0, COM3)
    pub port: String,
    /// Device identity reported on this port, if any
    pub device_name: Option<String>,
    /// Firmware version reported on this port, if any
    pub version: Option<Version>,
}

impl PortEntry {
    /// Entry for a port that identified itself
    pub fn identified(port: impl Into<String>, device_name: impl Into<String>, version: Version) -> Self {
        Self {
            port: port.into(),
            device_name: Some(device_name.into()),
            version: Some(version),
        }
    }

    /// Entry for a port that did not answer an identity query
    pub fn unidentified(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            device_name: None,
            version: None,
        }
    }
}

/// A port serving the expected device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCandidate {
    /// Port name
    pub port: String,
    /// Reported device identity
    pub device_name: String,
    /// Reported firmware version
    pub version: Version,
}

impl DeviceCandidate {
    /// Ranking order: higher version first, then lower port name
    pub fn rank(&self, other: &Self) -> Ordering {
        other
            .version
            .cmp(&self.version)
            .then_with(|| self.port.cmp(&other.port))
    }
}

/// Lists ports together with the identity of the device behind each one
#[async_trait]
pub trait PortEnumerator: Send + Sync {
    /// List ports, spending at most `timeout` on each identity query
    async fn list(&self, timeout: Duration) -> Result<Vec<PortEntry>, DetectError>;
}

/// Finds and ranks ports serving the expected device
pub struct PortScanner {
    enumerator: Box<dyn PortEnumerator>,
    device_name: String,
}

impl PortScanner {
    /// Create a scanner looking for DropBot devices
    pub fn new(enumerator: Box<dyn PortEnumerator>) -> Self {
        Self::with_device_name(enumerator, DEVICE_NAME)
    }

    /// Create a scanner looking for a custom device identity
    pub fn with_device_name(enumerator: Box<dyn PortEnumerator>, device_name: impl Into<String>) -> Self {
        Self {
            enumerator,
            device_name: device_name.into(),
        }
    }

    /// Device identity this scanner keeps
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Run one discovery pass
    ///
    /// Never fails: an enumeration error is logged and yields no candidates.
    pub async fn discover(&self, timeout: Duration) -> Vec<DeviceCandidate> {
        let entries = match self.enumerator.list(timeout).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Port enumeration failed: {}", e);
                return Vec::new();
            }
        };

        let candidates: Vec<_> = entries
            .into_iter()
            .filter_map(|entry| self.to_candidate(entry))
            .collect();

        if !candidates.is_empty() {
            debug!(
                "Found {} {} port(s): {:?}",
                candidates.len(),
                self.device_name,
                candidates.iter().map(|c| c.port.as_str()).collect::<Vec<_>>()
            );
        }

        candidates
    }

    /// Pick the best candidate
    pub fn select(&self, candidates: Vec<DeviceCandidate>) -> Result<DeviceCandidate, DetectError> {
        candidates
            .into_iter()
            .min_by(DeviceCandidate::rank)
            .ok_or_else(|| DetectError::NoCandidates(self.device_name.clone()))
    }

    /// Discover and select in one step
    pub async fn find(&self, timeout: Duration) -> Result<DeviceCandidate, DetectError> {
        let candidate = self.select(self.discover(timeout).await)?;
        info!(
            "Selected {} on {} (firmware v{})",
            candidate.device_name, candidate.port, candidate.version
        );
        Ok(candidate)
    }

    fn to_candidate(&self, entry: PortEntry) -> Option<DeviceCandidate> {
        match (entry.device_name, entry.version) {
            (Some(name), Some(version)) if name == self.device_name => Some(DeviceCandidate {
                port: entry.port,
                device_name: name,
                version,
            }),
            _ => None,
        }
    }
}
