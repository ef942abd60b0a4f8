//! Events carried by the bus
//!
//! Every publish carries one [`Event`]: the [`Signal`] it was published under
//! and a payload whose shape depends on the signal.

use std::fmt;
use std::sync::{Arc, Weak};

use dropbot_protocol::{DeviceConnection, DeviceEvent, Signal};
use serde_json::Value;

use crate::recovery::RecoveryQuery;

/// Non-owning reference to the live session
///
/// Handlers of `connected` receive this instead of the session itself so
/// that nothing outside the monitor keeps a connection alive across a
/// termination. [`SessionRef::upgrade`] returns `None` once the monitor has
/// dropped the session.
#[derive(Clone)]
pub struct SessionRef(Weak<dyn DeviceConnection>);

impl SessionRef {
    pub(crate) fn new(connection: &Arc<dyn DeviceConnection>) -> Self {
        Self(Arc::downgrade(connection))
    }

    /// Borrow the connection if the session is still alive
    pub fn upgrade(&self) -> Option<Arc<dyn DeviceConnection>> {
        self.0.upgrade()
    }
}

impl fmt::Debug for SessionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(connection) => f
                .debug_tuple("SessionRef")
                .field(&connection.port())
                .finish(),
            None => f.write_str("SessionRef(<closed>)"),
        }
    }
}

/// Signal-specific payload
#[derive(Debug, Clone)]
pub enum Payload {
    /// No payload (`disconnected`, `closed`, chip events, commands)
    None,
    /// The new session (`connected`)
    Session(SessionRef),
    /// Device-defined data (forwarded native signals)
    Device(Value),
    /// A recovery query (`no-power`, `version-mismatch`)
    Query(RecoveryQuery),
}

/// A published event
#[derive(Debug, Clone)]
pub struct Event {
    /// Signal the event was published under
    pub signal: Signal,
    /// Payload
    pub payload: Payload,
}

impl Event {
    /// Event without a payload
    pub fn new(signal: Signal) -> Self {
        Self {
            signal,
            payload: Payload::None,
        }
    }

    /// `connected` event for a fresh session
    pub fn connected(session: SessionRef) -> Self {
        Self {
            signal: Signal::Connected,
            payload: Payload::Session(session),
        }
    }

    /// Event carrying device-defined data
    pub fn device(signal: Signal, payload: Value) -> Self {
        Self {
            signal,
            payload: Payload::Device(payload),
        }
    }

    /// Recovery query, published under the query's own signal
    pub fn query(query: RecoveryQuery) -> Self {
        Self {
            signal: query.kind.query_signal(),
            payload: Payload::Query(query),
        }
    }

    /// Forwarded copy of a native device event under `signal`
    pub fn forwarded(signal: Signal, event: &DeviceEvent) -> Self {
        Self::device(signal, event.payload.clone())
    }

    /// The session carried by a `connected` event, if still alive
    pub fn session(&self) -> Option<Arc<dyn DeviceConnection>> {
        match &self.payload {
            Payload::Session(session) => session.upgrade(),
            _ => None,
        }
    }

    /// The recovery query carried by this event
    pub fn recovery_query(&self) -> Option<&RecoveryQuery> {
        match &self.payload {
            Payload::Query(query) => Some(query),
            _ => None,
        }
    }

    /// The device-defined payload carried by this event
    pub fn device_payload(&self) -> Option<&Value> {
        match &self.payload {
            Payload::Device(value) => Some(value),
            _ => None,
        }
    }
}
