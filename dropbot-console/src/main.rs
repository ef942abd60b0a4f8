//! DropBot Monitor Console
//!
//! Runs the connection monitor against a simulated DropBot, answering
//! recovery questions on the terminal and logging every event, until Ctrl-C.

mod logging;
mod prompts;
mod settings;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dropbot_monitor::{EventBus, Monitor, MonitorError};
use dropbot_sim::{SimulatedConnector, SimulatedEnumerator, SimulatedFlasher};
use settings::Settings;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "dropbot_monitor=info,dropbot_detect=info,dropbot_protocol=info,dropbot_sim=info,dropbot=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting DropBot monitor");

    let settings = Settings::load();
    if Settings::settings_path().is_some_and(|path| !path.exists()) {
        match settings.save() {
            Ok(path) => tracing::info!("Wrote default settings to {}", path.display()),
            Err(e) => tracing::warn!("{:#}", e),
        }
    }

    let bus = EventBus::new(Handle::current());
    logging::install(&bus, settings.capacitance_log_interval());
    prompts::install(&bus);

    let simulation = &settings.simulation;
    let connector = Arc::new(SimulatedConnector::new(simulation.device.clone()));
    let flasher = Arc::new(SimulatedFlasher::new(
        Arc::clone(&connector),
        simulation.flash_duration(),
    ));
    let enumerator = SimulatedEnumerator::single(&simulation.port, simulation.device.driver_version);

    let monitor = Monitor::new(
        settings.monitor.clone(),
        bus,
        Box::new(enumerator),
        connector.clone(),
        flasher,
    );
    let cancel = CancellationToken::new();
    let task = monitor.spawn(cancel.clone());

    tokio::spawn(simulate_telemetry(
        Arc::clone(&connector),
        simulation.telemetry_interval(),
        cancel.clone(),
    ));

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");
    cancel.cancel();

    match task.await.context("monitor task failed")? {
        Ok(never) => match never {},
        Err(MonitorError::Cancelled) => tracing::info!("Monitor stopped"),
    }

    Ok(())
}

/// Feed capacitance readings into whichever simulated board is connected
async fn simulate_telemetry(
    connector: Arc<SimulatedConnector>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    let mut reading: u64 = 0;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(board) = connector.last_board() else {
            continue;
        };
        if board.is_disconnected() {
            continue;
        }

        reading += 1;
        let capacitance = if board.chip_present() {
            4.0e-12 + (reading % 10) as f64 * 1.0e-14
        } else {
            0.0
        };
        board.emit_capacitance(capacitance, 100.0);
    }
}
