//! Simulated port listing

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use dropbot_detect::{DetectError, PortEntry, PortEnumerator};
use dropbot_protocol::{Version, DEVICE_NAME};

/// Port enumerator returning a configurable listing
///
/// Clones share the same listing, so a test can keep one clone and hand
/// another to the monitor.
#[derive(Debug, Clone, Default)]
pub struct SimulatedEnumerator {
    entries: Arc<Mutex<Vec<PortEntry>>>,
    scans: Arc<AtomicUsize>,
}

impl SimulatedEnumerator {
    /// Enumerator listing `entries`
    pub fn new(entries: Vec<PortEntry>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(entries)),
            scans: Arc::default(),
        }
    }

    /// Enumerator listing one DropBot on `port`
    pub fn single(port: impl Into<String>, version: Version) -> Self {
        Self::new(vec![PortEntry::identified(port, DEVICE_NAME, version)])
    }

    /// Replace the listing
    pub fn set_entries(&self, entries: Vec<PortEntry>) {
        *self.entries.lock().unwrap_or_else(PoisonError::into_inner) = entries;
    }

    /// Number of listings served
    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PortEnumerator for SimulatedEnumerator {
    async fn list(&self, _timeout: Duration) -> Result<Vec<PortEntry>, DetectError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dropbot_detect::PortScanner;

    #[tokio::test]
    async fn test_clones_share_listing() {
        let enumerator = SimulatedEnumerator::default();
        let scanner = PortScanner::new(Box::new(enumerator.clone()));

        assert!(scanner.discover(Duration::from_millis(100)).await.is_empty());

        enumerator.set_entries(vec![
            PortEntry::identified("COM4", DEVICE_NAME, Version::new(1, 79, 0)),
            PortEntry::unidentified("COM5"),
        ]);
        let candidate = scanner.find(Duration::from_millis(100)).await.unwrap();

        assert_eq!(candidate.port, "COM4");
        assert_eq!(enumerator.scans(), 2);
    }
}
