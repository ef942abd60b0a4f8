//! Log lines for monitor events

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dropbot_monitor::EventBus;
use dropbot_protocol::Signal;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{info, warn};

/// Rate limiter letting one event through per interval
#[derive(Debug)]
pub struct Throttle {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    /// Check if an event may pass now; passing starts a new interval
    pub fn ready(&self) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        match *last {
            Some(previous) if now.duration_since(previous) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

/// Subscribe log handlers for lifecycle, chip and telemetry events
pub fn install(bus: &EventBus, capacitance_interval: Duration) {
    bus.on(Signal::Connected, |event| {
        match event.session() {
            Some(session) => info!("Connected to DropBot on {}", session.port()),
            None => info!("Connected to DropBot"),
        }
        async {}
    });
    bus.on(Signal::Disconnected, |_| {
        warn!("DropBot disconnected");
        async {}
    });
    bus.on(Signal::Closed, |_| {
        info!("DropBot monitor closed");
        async {}
    });
    bus.on(Signal::ChipInserted, |_| {
        info!("Chip inserted");
        async {}
    });
    bus.on(Signal::ChipRemoved, |_| {
        info!("Chip removed");
        async {}
    });
    bus.on(Signal::Halted, |event| {
        warn!("DropBot halted: {}", payload_text(event.device_payload()));
        async {}
    });
    bus.on(Signal::ShortsDetected, |event| {
        warn!("Shorts detected: {}", payload_text(event.device_payload()));
        async {}
    });

    let throttle = Arc::new(Throttle::new(capacitance_interval));
    bus.on(Signal::CapacitanceUpdated, move |event| {
        if throttle.ready() {
            info!("Capacitance: {}", payload_text(event.device_payload()));
        }
        async {}
    });
}

fn payload_text(payload: Option<&Value>) -> String {
    match payload {
        Some(Value::Null) | None => "-".to_string(),
        Some(value) => value.to_string(),
    }
}
