//! Recoverable connect-time failures

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::signal::Signal;

/// A connect failure that a recovery decision can turn into a retry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FailureKind {
    /// The 12V supply is not detected
    NoPower,
    /// Firmware version differs from the driver version
    VersionMismatch,
}

impl FailureKind {
    /// Signal the recovery query for this failure is published under
    pub fn query_signal(&self) -> Signal {
        match self {
            FailureKind::NoPower => Signal::NoPower,
            FailureKind::VersionMismatch => Signal::VersionMismatch,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.query_signal().as_str())
    }
}

/// Failure kinds the connector is told to tolerate
///
/// Grows monotonically over one connect-attempt sequence and starts empty
/// every time discovery restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IgnoreSet {
    kinds: BTreeSet<FailureKind>,
}

impl IgnoreSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Tolerate `kind` on subsequent attempts; returns false if already present
    pub fn insert(&mut self, kind: FailureKind) -> bool {
        self.kinds.insert(kind)
    }

    /// Check if `kind` is tolerated
    pub fn contains(&self, kind: FailureKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Number of tolerated kinds
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Check if nothing is tolerated
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Iterate tolerated kinds in a stable order
    pub fn iter(&self) -> impl Iterator<Item = FailureKind> + '_ {
        self.kinds.iter().copied()
    }
}

impl FromIterator<FailureKind> for IgnoreSet {
    fn from_iter<I: IntoIterator<Item = FailureKind>>(iter: I) -> Self {
        Self {
            kinds: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignore_set_is_monotonic() {
        let mut ignore = IgnoreSet::new();
        assert!(ignore.is_empty());

        assert!(ignore.insert(FailureKind::NoPower));
        assert!(!ignore.insert(FailureKind::NoPower));
        assert!(ignore.insert(FailureKind::VersionMismatch));

        assert_eq!(ignore.len(), 2);
        assert!(ignore.contains(FailureKind::NoPower));
        assert_eq!(
            ignore.iter().collect::<Vec<_>>(),
            vec![FailureKind::NoPower, FailureKind::VersionMismatch]
        );
    }

    #[test]
    fn test_query_signal() {
        assert_eq!(FailureKind::NoPower.query_signal(), Signal::NoPower);
        assert_eq!(FailureKind::VersionMismatch.to_string(), "version-mismatch");
    }
}
