//! Connection supervisor
//!
//! [`Monitor`] drives the discover / connect / serve cycle for one device:
//!
//! ```text
//! Discovering ──► Connecting ◄──► Recovering
//!      ▲              │
//!      │              ▼
//!      └──── Disconnecting ◄── Connected
//! ```
//!
//! Every suspension point is raced against the cancellation token and the
//! command channel. Commands (`reconnect`, `reboot`, `flash-firmware`) are
//! published on the bus by anyone; the monitor's own handlers only queue
//! them, and they are executed here, between steps of the cycle.
//!
//! On cancellation the monitor publishes `closed`, terminates the live
//! session and returns [`MonitorError::Cancelled`]. That shutdown runs once.
//! Dropping a monitor that was started but never shut down still terminates
//! the session and emits `closed` in the background.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dropbot_detect::{PortEnumerator, PortScanner};
use dropbot_protocol::{DeviceConnection, DeviceConnector, FirmwareFlasher, IgnoreSet, Signal};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::bus::{EventBus, SubscriptionId};
use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::events::Event;
use crate::recovery::{RecoveryDecision, RecoveryNegotiator, RecoveryQuery, Resolution};
use crate::session::Session;

/// Where the monitor is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorState {
    /// Looking for a device
    Discovering,
    /// Opening a session on a candidate
    Connecting,
    /// Waiting for a recovery decision
    Recovering,
    /// A session is live
    Connected,
    /// Tearing down the session
    Disconnecting,
    /// Shut down
    Stopped,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MonitorState::Discovering => "discovering",
            MonitorState::Connecting => "connecting",
            MonitorState::Recovering => "recovering",
            MonitorState::Connected => "connected",
            MonitorState::Disconnecting => "disconnecting",
            MonitorState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Reconnect,
    Reboot,
    FlashFirmware,
}

const COMMANDS: [(Signal, Command); 3] = [
    (Signal::Reconnect, Command::Reconnect),
    (Signal::Reboot, Command::Reboot),
    (Signal::FlashFirmware, Command::FlashFirmware),
];

/// Supervises the connection to one device
pub struct Monitor {
    config: MonitorConfig,
    bus: EventBus,
    scanner: PortScanner,
    connector: Arc<dyn DeviceConnector>,
    negotiator: RecoveryNegotiator,
    state: watch::Sender<MonitorState>,
    control: Control,
    command_subscriptions: Vec<SubscriptionId>,
    started: bool,
    closed: bool,
}

impl Monitor {
    /// Create a monitor and subscribe its command handlers on `bus`
    ///
    /// Background work (event forwarding, flashing, fire-and-forget
    /// publishes) runs on the bus runtime.
    pub fn new(
        config: MonitorConfig,
        bus: EventBus,
        enumerator: Box<dyn PortEnumerator>,
        connector: Arc<dyn DeviceConnector>,
        flasher: Arc<dyn FirmwareFlasher>,
    ) -> Self {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let command_subscriptions = COMMANDS
            .into_iter()
            .map(|(signal, command)| {
                let command_tx = command_tx.clone();
                bus.on(signal, move |_| {
                    if command_tx.send(command).is_err() {
                        debug!("Monitor gone, dropping {:?} command", command);
                    }
                    async {}
                })
            })
            .collect();

        let control = Control {
            commands,
            session: None,
            flasher,
            runtime: bus.runtime().clone(),
            settle: config.flash_settle(),
        };

        Self {
            scanner: PortScanner::with_device_name(enumerator, config.device_name.clone()),
            negotiator: RecoveryNegotiator::new(bus.clone()),
            state: watch::Sender::new(MonitorState::Discovering),
            config,
            bus,
            connector,
            control,
            command_subscriptions,
            started: false,
            closed: false,
        }
    }

    /// Handle for observing the monitor and sending it commands
    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            bus: self.bus.clone(),
            state: self.state.subscribe(),
        }
    }

    /// Run the monitor on the bus runtime
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<Result<Infallible, MonitorError>> {
        let runtime = self.bus.runtime().clone();
        runtime.spawn(self.run(cancel))
    }

    /// Run until `cancel` fires
    ///
    /// Only ever returns an error: [`MonitorError::Cancelled`] once `closed`
    /// has been published and the session terminated.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<Infallible, MonitorError> {
        self.started = true;
        info!("Monitor started, looking for {}", self.config.device_name);

        let error = match self.supervise(&cancel).await {
            Ok(never) => match never {},
            Err(e) => e,
        };

        self.shutdown().await;
        Err(error)
    }

    async fn supervise(&mut self, cancel: &CancellationToken) -> Result<Infallible, MonitorError> {
        loop {
            self.set_state(MonitorState::Discovering);
            let timeout = self.config.discovery_timeout();
            let candidate = match self.control.guard(cancel, self.scanner.find(timeout)).await? {
                Ok(candidate) => candidate,
                Err(e) => {
                    trace!("{}", e);
                    self.pause(cancel).await?;
                    continue;
                }
            };

            match self.connect(cancel, &candidate.port).await? {
                Some(connection) => self.serve(cancel, connection).await?,
                None => self.pause(cancel).await?,
            }
        }
    }

    /// Connect to `port`, negotiating recoverable failures
    ///
    /// Returns `None` when the candidate should be abandoned.
    async fn connect(
        &mut self,
        cancel: &CancellationToken,
        port: &str,
    ) -> Result<Option<Arc<dyn DeviceConnection>>, MonitorError> {
        let mut ignore = IgnoreSet::new();
        let max_attempts = self.config.max_connect_attempts.max(1);

        for attempt in 1..=max_attempts {
            self.set_state(MonitorState::Connecting);
            debug!("Connecting to {} (attempt {}/{})", port, attempt, max_attempts);

            let error = match self
                .control
                .guard(cancel, self.connector.connect(port, &ignore))
                .await?
            {
                Ok(connection) => return Ok(Some(connection)),
                Err(e) => e,
            };

            let query = match RecoveryQuery::for_error(&error) {
                Some(query) if !ignore.contains(query.kind) => query,
                _ => {
                    debug!("Error connecting to {}: {}", port, error);
                    return Ok(None);
                }
            };

            self.set_state(MonitorState::Recovering);
            let kind = query.kind;
            match self.control.guard(cancel, self.negotiator.negotiate(query)).await? {
                Resolution::Decided(RecoveryDecision::Ignore) => {
                    info!("Ignoring {} on {}", kind, port);
                    ignore.insert(kind);
                }
                Resolution::Decided(RecoveryDecision::Update) => {
                    info!("Updating firmware on {}", port);
                    let flash = self.control.spawn_flash();
                    if let Err(e) = self.control.guard(cancel, flash).await? {
                        warn!("Firmware flash task failed: {}", e);
                    }
                }
                _ => {
                    debug!("Skipping {}: {}", port, error);
                    return Ok(None);
                }
            }
        }

        warn!("Giving up on {} after {} connect attempts", port, max_attempts);
        Ok(None)
    }

    /// Serve one session until it disconnects or is dropped by a command
    async fn serve(
        &mut self,
        cancel: &CancellationToken,
        connection: Arc<dyn DeviceConnection>,
    ) -> Result<(), MonitorError> {
        self.control.end_session();
        let session = Session::open(connection, &self.bus);
        let reference = session.reference();
        let port = session.port().to_string();
        self.control.session = Some(session);

        self.set_state(MonitorState::Connected);
        info!("Connected to {} on {}", self.config.device_name, port);
        self.control
            .guard(cancel, self.bus.publish(Event::connected(reference)))
            .await?;

        self.check_chip(cancel).await?;
        self.control.watch_session(cancel).await?;

        self.set_state(MonitorState::Disconnecting);
        self.control.end_session();
        info!("Disconnected from {}", port);
        self.control
            .guard(cancel, self.bus.publish(Event::new(Signal::Disconnected)))
            .await?;

        Ok(())
    }

    /// Publish one synthetic chip event from the presence pin (active-low)
    async fn check_chip(&mut self, cancel: &CancellationToken) -> Result<(), MonitorError> {
        let Some(connection) = self.control.live_connection() else {
            return Ok(());
        };

        let pin = self.config.chip_presence_pin;
        let signal = match self.control.guard(cancel, connection.digital_read(pin)).await? {
            Ok(true) => Signal::ChipRemoved,
            Ok(false) => Signal::ChipInserted,
            Err(e) => {
                warn!("Chip presence check on pin {} failed: {}", pin, e);
                return Ok(());
            }
        };

        debug!("Chip presence check: {}", signal);
        self.control
            .guard(cancel, self.bus.publish(Event::new(signal)))
            .await?;

        Ok(())
    }

    async fn pause(&mut self, cancel: &CancellationToken) -> Result<(), MonitorError> {
        let delay = self.config.retry_delay();
        self.control.guard(cancel, sleep(delay)).await
    }

    async fn shutdown(&mut self) {
        self.set_state(MonitorState::Stopped);
        if !self.closed {
            self.closed = true;
            info!("Monitor closing");
            self.bus.publish(Event::new(Signal::Closed)).await;
        }
        self.control.end_session();
        self.unsubscribe_commands();
    }

    fn set_state(&self, state: MonitorState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Monitor state: {} -> {}", previous, state);
        }
    }

    fn unsubscribe_commands(&mut self) {
        for id in self.command_subscriptions.drain(..) {
            self.bus.unsubscribe(id);
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.unsubscribe_commands();
        if self.started && !self.closed {
            self.closed = true;
            warn!("Monitor dropped without shutdown");
            self.bus.emit(Event::new(Signal::Closed));
        }
        self.control.end_session();
    }
}

impl fmt::Debug for Monitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Monitor")
            .field("state", &*self.state.borrow())
            .field("session", &self.control.session)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Cheap handle for observing a monitor and sending it commands
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    bus: EventBus,
    state: watch::Receiver<MonitorState>,
}

impl MonitorHandle {
    /// Current state
    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change
    pub fn watch_state(&self) -> watch::Receiver<MonitorState> {
        self.state.clone()
    }

    /// Bus the monitor publishes on
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Drop the current session so the monitor reconnects
    pub fn reconnect(&self) {
        self.bus.emit(Event::new(Signal::Reconnect));
    }

    /// Reboot the connected device
    pub fn reboot(&self) {
        self.bus.emit(Event::new(Signal::Reboot));
    }

    /// Drop the current session and flash firmware
    pub fn flash_firmware(&self) {
        self.bus.emit(Event::new(Signal::FlashFirmware));
    }
}

/// Session ownership and command execution
struct Control {
    commands: mpsc::UnboundedReceiver<Command>,
    session: Option<Session>,
    flasher: Arc<dyn FirmwareFlasher>,
    runtime: Handle,
    settle: Duration,
}

impl Control {
    /// Drive `fut` to completion while honouring cancellation and commands
    async fn guard<F: Future>(
        &mut self,
        cancel: &CancellationToken,
        fut: F,
    ) -> Result<F::Output, MonitorError> {
        tokio::pin!(fut);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(MonitorError::Cancelled),
                output = &mut fut => return Ok(output),
                Some(command) = self.commands.recv() => self.execute(command).await,
            }
        }
    }

    /// Wait until the live session disconnects or is terminated
    async fn watch_session(&mut self, cancel: &CancellationToken) -> Result<(), MonitorError> {
        let Some(disconnected) = self.live_session().map(Session::disconnected) else {
            return Ok(());
        };
        let lost = link_lost(disconnected);
        tokio::pin!(lost);

        loop {
            if self.live_session().is_none() {
                return Ok(());
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(MonitorError::Cancelled),
                _ = &mut lost => return Ok(()),
                Some(command) = self.commands.recv() => self.execute(command).await,
            }
        }
    }

    async fn execute(&mut self, command: Command) {
        match command {
            Command::Reconnect => match self.session.as_mut() {
                Some(session) if !session.is_terminated() => {
                    info!("Reconnect requested, dropping session on {}", session.port());
                    session.terminate();
                }
                _ => debug!("Reconnect requested without a session"),
            },
            Command::Reboot => match self.live_connection() {
                Some(connection) => {
                    info!("Rebooting device on {}", connection.port());
                    if let Err(e) = connection.reboot().await {
                        warn!("Reboot failed: {}", e);
                    }
                }
                None => debug!("Reboot requested without a session"),
            },
            Command::FlashFirmware => {
                if let Some(session) = self.session.as_mut() {
                    session.terminate();
                }
                // detached; the task outlives this call
                drop(self.spawn_flash());
            }
        }
    }

    /// Flash firmware then wait for the board to settle
    ///
    /// Runs as its own task so that a flash, once started, always finishes.
    fn spawn_flash(&self) -> JoinHandle<()> {
        let flasher = Arc::clone(&self.flasher);
        let settle = self.settle;
        self.runtime.spawn(async move {
            info!("Flashing firmware");
            match flasher.flash().await {
                Ok(()) => info!("Firmware flashed"),
                Err(e) => warn!("Firmware flash failed: {}", e),
            }
            sleep(settle).await;
        })
    }

    fn live_session(&self) -> Option<&Session> {
        self.session.as_ref().filter(|s| !s.is_terminated())
    }

    fn live_connection(&self) -> Option<Arc<dyn DeviceConnection>> {
        self.live_session().map(Session::connection)
    }

    fn end_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.terminate();
        }
    }
}

/// Resolves once the link reports a disconnection or its sender is gone
async fn link_lost(mut disconnected: watch::Receiver<bool>) {
    while !*disconnected.borrow_and_update() {
        if disconnected.changed().await.is_err() {
            return;
        }
    }
}
