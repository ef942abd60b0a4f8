//! Recovery negotiation for connect-time failures
//!
//! When a connect attempt fails with a recoverable [`FailureKind`], the
//! monitor asks the application what to do by publishing a
//! [`RecoveryQuery`] under `no-power` or `version-mismatch`. Every handler
//! runs concurrently; the first **actionable** answer to arrive wins:
//!
//! | query | actionable | non-actionable |
//! |---|---|---|
//! | `no-power` | `Ignore` | `Skip`, `Update`, no answer, handler error |
//! | `version-mismatch` | `Ignore`, `Update` | `Skip`, no answer, handler error |
//!
//! If nothing actionable arrives before every handler has finished, the
//! negotiation is [`Resolution::Unresolved`], which the monitor treats like
//! `Skip`. There is no timeout; dropping the negotiation future drops the
//! handlers still running.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use dropbot_protocol::{ConnectError, FailureKind, Version};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bus::EventBus;
use crate::events::Event;

/// Context key for the driver version of a version-mismatch query
pub const DRIVER_VERSION: &str = "driver_version";
/// Context key for the firmware version of a version-mismatch query
pub const FIRMWARE_VERSION: &str = "firmware_version";

/// Answer to a recovery query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryDecision {
    /// Tolerate the failure and connect anyway
    Ignore,
    /// Flash the bundled firmware and retry (version mismatch only)
    Update,
    /// Abandon this device
    Skip,
}

impl RecoveryDecision {
    /// Decisions a handler may give for `kind`
    pub fn options(kind: FailureKind) -> &'static [RecoveryDecision] {
        match kind {
            FailureKind::NoPower => &[RecoveryDecision::Ignore, RecoveryDecision::Skip],
            FailureKind::VersionMismatch => &[
                RecoveryDecision::Ignore,
                RecoveryDecision::Update,
                RecoveryDecision::Skip,
            ],
        }
    }

    /// Check if this decision ends a negotiation for `kind`
    pub fn is_actionable_for(self, kind: FailureKind) -> bool {
        match (kind, self) {
            (_, RecoveryDecision::Ignore) => true,
            (FailureKind::VersionMismatch, RecoveryDecision::Update) => true,
            _ => false,
        }
    }

    /// Lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryDecision::Ignore => "ignore",
            RecoveryDecision::Update => "update",
            RecoveryDecision::Skip => "skip",
        }
    }
}

impl fmt::Display for RecoveryDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecoveryDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ignore" => Ok(RecoveryDecision::Ignore),
            "update" => Ok(RecoveryDecision::Update),
            "skip" => Ok(RecoveryDecision::Skip),
            other => Err(format!("unknown recovery decision: {}", other)),
        }
    }
}

/// Question published when a connect attempt hits a recoverable failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryQuery {
    /// Failure being negotiated
    pub kind: FailureKind,
    /// Failure details (`driver_version`/`firmware_version` for mismatches)
    pub context: BTreeMap<String, String>,
}

impl RecoveryQuery {
    /// Query for a missing 12V supply
    pub fn no_power() -> Self {
        Self {
            kind: FailureKind::NoPower,
            context: BTreeMap::new(),
        }
    }

    /// Query for a driver/firmware version gap
    pub fn version_mismatch(driver_version: Version, firmware_version: Version) -> Self {
        let context = BTreeMap::from([
            (DRIVER_VERSION.to_string(), driver_version.to_string()),
            (FIRMWARE_VERSION.to_string(), firmware_version.to_string()),
        ]);
        Self {
            kind: FailureKind::VersionMismatch,
            context,
        }
    }

    /// Query for a connect error, if the error is recoverable
    pub fn for_error(error: &ConnectError) -> Option<Self> {
        match error {
            ConnectError::NoPower { .. } => Some(Self::no_power()),
            ConnectError::VersionMismatch {
                driver_version,
                device_version,
                ..
            } => Some(Self::version_mismatch(*driver_version, *device_version)),
            ConnectError::Other { .. } => None,
        }
    }

    /// Driver version, for version-mismatch queries
    pub fn driver_version(&self) -> Option<Version> {
        self.context.get(DRIVER_VERSION)?.parse().ok()
    }

    /// Firmware version, for version-mismatch queries
    pub fn firmware_version(&self) -> Option<Version> {
        self.context.get(FIRMWARE_VERSION)?.parse().ok()
    }

    /// Decisions a handler may give for this query
    pub fn options(&self) -> &'static [RecoveryDecision] {
        RecoveryDecision::options(self.kind)
    }
}

/// Outcome of a negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A handler gave an actionable decision
    Decided(RecoveryDecision),
    /// No handler gave an actionable decision
    Unresolved,
}

/// Runs the broadcast-query/first-answer protocol on the bus
#[derive(Debug, Clone)]
pub struct RecoveryNegotiator {
    bus: EventBus,
}

impl RecoveryNegotiator {
    /// Create a negotiator publishing on `bus`
    pub fn new(bus: EventBus) -> Self {
        Self { bus }
    }

    /// Publish `query` and wait for the first actionable decision
    pub async fn negotiate(&self, query: RecoveryQuery) -> Resolution {
        let kind = query.kind;
        let mut dispatch = self.bus.dispatch(Event::query(query));

        if dispatch.is_empty() {
            debug!("No {} handlers registered", kind);
            return Resolution::Unresolved;
        }

        while let Some(outcome) = dispatch.next().await {
            match outcome {
                Ok(Some(decision)) if decision.is_actionable_for(kind) => {
                    debug!("{} resolved: {}", kind, decision);
                    return Resolution::Decided(decision);
                }
                Ok(Some(decision)) => debug!("{} handler answered {}", kind, decision),
                Ok(None) => {}
                Err(e) => debug!("{} handler failed: {}", kind, e),
            }
        }

        debug!("{} unresolved", kind);
        Resolution::Unresolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::pending;
    use std::time::Duration;

    use dropbot_protocol::Signal;
    use tokio::runtime::Handle;
    use tokio::time::sleep;

    use crate::error::HandlerError;

    fn negotiator() -> (EventBus, RecoveryNegotiator) {
        let bus = EventBus::new(Handle::current());
        (bus.clone(), RecoveryNegotiator::new(bus))
    }

    fn answer_after(bus: &EventBus, signal: Signal, delay_ms: u64, decision: Option<RecoveryDecision>) {
        bus.subscribe(signal, move |_| async move {
            sleep(Duration::from_millis(delay_ms)).await;
            Ok(decision)
        });
    }

    fn mismatch() -> RecoveryQuery {
        RecoveryQuery::version_mismatch(Version::new(1, 68, 0), Version::new(2, 0, 0))
    }

    #[test]
    fn test_actionable_decisions() {
        use RecoveryDecision::*;

        assert!(Ignore.is_actionable_for(FailureKind::NoPower));
        assert!(!Update.is_actionable_for(FailureKind::NoPower));
        assert!(!Skip.is_actionable_for(FailureKind::NoPower));

        assert!(Ignore.is_actionable_for(FailureKind::VersionMismatch));
        assert!(Update.is_actionable_for(FailureKind::VersionMismatch));
        assert!(!Skip.is_actionable_for(FailureKind::VersionMismatch));

        assert_eq!(RecoveryDecision::options(FailureKind::NoPower), &[Ignore, Skip]);
    }

    #[test]
    fn test_query_context() {
        let query = mismatch();
        assert_eq!(query.driver_version(), Some(Version::new(1, 68, 0)));
        assert_eq!(query.firmware_version(), Some(Version::new(2, 0, 0)));
        assert_eq!(query.options().len(), 3);

        let query = RecoveryQuery::for_error(&ConnectError::NoPower {
            port: "COM1".into(),
        })
        .unwrap();
        assert_eq!(query.kind, FailureKind::NoPower);
        assert!(query.context.is_empty());
        assert_eq!(query.firmware_version(), None);

        assert!(RecoveryQuery::for_error(&ConnectError::Other {
            port: "COM1".into(),
            reason: "busy".into(),
        })
        .is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_handlers_is_unresolved() {
        let (_bus, negotiator) = negotiator();
        assert_eq!(
            negotiator.negotiate(RecoveryQuery::no_power()).await,
            Resolution::Unresolved
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_actionable_answer_wins() {
        let (bus, negotiator) = negotiator();
        answer_after(&bus, Signal::VersionMismatch, 50, Some(RecoveryDecision::Ignore));
        answer_after(&bus, Signal::VersionMismatch, 10, Some(RecoveryDecision::Update));

        assert_eq!(
            negotiator.negotiate(mismatch()).await,
            Resolution::Decided(RecoveryDecision::Update)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_actionable_answers_are_disregarded() {
        let (bus, negotiator) = negotiator();
        answer_after(&bus, Signal::NoPower, 1, Some(RecoveryDecision::Skip));
        answer_after(&bus, Signal::NoPower, 2, Some(RecoveryDecision::Update));
        answer_after(&bus, Signal::NoPower, 3, None);
        bus.subscribe(Signal::NoPower, |_| async {
            Err(HandlerError::failed("prompt closed"))
        });
        answer_after(&bus, Signal::NoPower, 20, Some(RecoveryDecision::Ignore));

        assert_eq!(
            negotiator.negotiate(RecoveryQuery::no_power()).await,
            Resolution::Decided(RecoveryDecision::Ignore)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_skips_is_unresolved() {
        let (bus, negotiator) = negotiator();
        answer_after(&bus, Signal::VersionMismatch, 5, Some(RecoveryDecision::Skip));
        answer_after(&bus, Signal::VersionMismatch, 1, None);

        assert_eq!(negotiator.negotiate(mismatch()).await, Resolution::Unresolved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_does_not_wait_for_stragglers() {
        let (bus, negotiator) = negotiator();
        bus.subscribe(Signal::VersionMismatch, |_| async {
            pending::<()>().await;
            Ok(None)
        });
        answer_after(&bus, Signal::VersionMismatch, 5, Some(RecoveryDecision::Ignore));

        let resolution =
            tokio::time::timeout(Duration::from_secs(60), negotiator.negotiate(mismatch())).await;
        assert_eq!(resolution, Ok(Resolution::Decided(RecoveryDecision::Ignore)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handlers_see_query_context() {
        let (bus, negotiator) = negotiator();
        bus.subscribe(Signal::VersionMismatch, |event| async move {
            let firmware = event.recovery_query().and_then(RecoveryQuery::firmware_version);
            Ok((firmware == Some(Version::new(2, 0, 0))).then_some(RecoveryDecision::Ignore))
        });

        assert_eq!(
            negotiator.negotiate(mismatch()).await,
            Resolution::Decided(RecoveryDecision::Ignore)
        );
    }

    #[test]
    fn test_decision_parse() {
        assert_eq!("Update".parse(), Ok(RecoveryDecision::Update));
        assert!("later".parse::<RecoveryDecision>().is_err());
    }
}
