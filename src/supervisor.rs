use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{self, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::decoder;
use crate::framer::LineFramer;
use crate::monitor::{LinkSnapshot, LinkState, Monitor};
use crate::transport::{
    DeviceEnumerator, LinkParams, PermissionGate, Transport, TransportError, TransportProvider,
};

/// Poll timeout for each transport read. Cancellation latency is bounded by
/// this interval.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Scratch buffer size for a single transport read.
pub const SCRATCH_LEN: usize = 8192;

/// Host event sources are low-rate, so a shallow queue is plenty.
const EVENT_QUEUE_DEPTH: usize = 32;

/// Inbound events driving the connection state machine.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    ConnectRequested,
    DisconnectRequested,
    DeviceAttached,
    DeviceDetached,
    PermissionDecision { granted: bool },
    /// Sent by the read loop when the transport fails mid-session.
    ReadFailed(String),
    Shutdown,
}

/// Clonable handle for consumers and host event sources.
#[derive(Clone)]
pub struct LinkHandle {
    events: mpsc::Sender<LinkEvent>,
    monitor: Monitor,
}

impl LinkHandle {
    pub fn subscribe(&self) -> watch::Receiver<LinkSnapshot> {
        self.monitor.subscribe()
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        self.monitor.snapshot()
    }

    pub async fn request_connect(&self) {
        self.send(LinkEvent::ConnectRequested).await;
    }

    pub async fn request_disconnect(&self) {
        self.send(LinkEvent::DisconnectRequested).await;
    }

    pub async fn device_attached(&self) {
        self.send(LinkEvent::DeviceAttached).await;
    }

    pub async fn device_detached(&self) {
        self.send(LinkEvent::DeviceDetached).await;
    }

    pub async fn permission_decision(&self, granted: bool) {
        self.send(LinkEvent::PermissionDecision { granted }).await;
    }

    /// Tear down any active session and stop the supervisor task.
    pub async fn shutdown(&self) {
        self.send(LinkEvent::Shutdown).await;
    }

    async fn send(&self, event: LinkEvent) {
        if self.events.send(event).await.is_err() {
            warn!("link supervisor is gone, event dropped");
        }
    }
}

/// A running read loop. The join handle yields the transport back so it is
/// only closed after the loop has provably stopped.
struct ActiveSession {
    token: CancellationToken,
    loop_task: JoinHandle<Box<dyn Transport>>,
}

/// The connection state machine. Sole owner of transport open and close;
/// drives Disconnected -> PermissionRequested -> Connected transitions off
/// the inbound event queue.
pub struct LinkSupervisor {
    enumerator: Box<dyn DeviceEnumerator>,
    permissions: Box<dyn PermissionGate>,
    provider: Box<dyn TransportProvider>,
    monitor: Monitor,
    events_tx: mpsc::Sender<LinkEvent>,
    events_rx: mpsc::Receiver<LinkEvent>,
    state: LinkState,
    session: Option<ActiveSession>,
}

impl LinkSupervisor {
    pub fn new(
        enumerator: Box<dyn DeviceEnumerator>,
        permissions: Box<dyn PermissionGate>,
        provider: Box<dyn TransportProvider>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        Self {
            enumerator,
            permissions,
            provider,
            monitor: Monitor::new(),
            events_tx,
            events_rx,
            state: LinkState::Disconnected,
            session: None,
        }
    }

    pub fn handle(&self) -> LinkHandle {
        LinkHandle {
            events: self.events_tx.clone(),
            monitor: self.monitor.clone(),
        }
    }

    /// Drive the state machine until `Shutdown`. The supervisor keeps its
    /// own event sender for the read loop, so the queue never closes on its
    /// own.
    pub async fn run(mut self) {
        loop {
            let Some(event) = self.events_rx.recv().await else {
                break;
            };

            match event {
                LinkEvent::ConnectRequested | LinkEvent::DeviceAttached => {
                    // Idempotent: an active session is left untouched.
                    if self.state == LinkState::Disconnected {
                        self.discover_and_connect();
                    } else {
                        debug!(state = ?self.state, "discovery trigger ignored");
                    }
                }
                LinkEvent::PermissionDecision { granted } => {
                    if self.state != LinkState::PermissionRequested {
                        debug!("permission decision outside a pending request");
                    } else if granted {
                        self.state = LinkState::Disconnected;
                        self.discover_and_connect();
                    } else {
                        self.state = LinkState::Disconnected;
                        self.monitor
                            .set_state(LinkState::Disconnected, "Permission denied.");
                        info!("device permission denied");
                    }
                }
                LinkEvent::DisconnectRequested | LinkEvent::DeviceDetached => {
                    if self.state == LinkState::Connected {
                        info!("closing session");
                        self.teardown("Disconnected.").await;
                    }
                }
                LinkEvent::ReadFailed(reason) => {
                    if self.state == LinkState::Connected {
                        error!(%reason, "fatal read error, closing session");
                        self.teardown(format!("Read error: {reason}")).await;
                    }
                }
                LinkEvent::Shutdown => {
                    if self.state == LinkState::Connected {
                        self.teardown("Disconnected.").await;
                    } else if self.state == LinkState::PermissionRequested {
                        self.state = LinkState::Disconnected;
                        self.monitor.reset("Disconnected.");
                    }
                    break;
                }
            }
        }
    }

    /// First usable device, first endpoint. Absence of a candidate is a
    /// non-fatal condition; a later attach event re-runs discovery. Every
    /// exit publishes its state alongside the status line, since discovery
    /// may be entered with a stale `PermissionRequested` snapshot.
    fn discover_and_connect(&mut self) {
        let Some(device) = self.enumerator.list_candidates().into_iter().next() else {
            self.monitor
                .set_state(LinkState::Disconnected, "No device found.");
            info!("no serial device found");
            return;
        };

        if !self.permissions.has_permission(&device) {
            info!(device = %device.id, "requesting device permission");
            self.permissions.request_permission(&device);
            self.state = LinkState::PermissionRequested;
            self.monitor
                .set_state(LinkState::PermissionRequested, "USB permission requested...");
            return;
        }

        let Some(endpoint) = device.endpoints.first().cloned() else {
            self.monitor
                .set_state(LinkState::Disconnected, "Device has no usable port.");
            warn!(device = %device.id, "device exposes no endpoints");
            return;
        };

        match self.open_session(&endpoint) {
            Ok(()) => {
                info!(device = %device.id, %endpoint, "connected");
                self.state = LinkState::Connected;
                self.monitor
                    .set_state(LinkState::Connected, "Connected. Waiting for data.");
            }
            Err(e) => {
                warn!(%endpoint, error = %e, "failed to open device");
                self.monitor
                    .set_state(LinkState::Disconnected, format!("Failed to open port: {e}"));
            }
        }
    }

    fn open_session(&mut self, endpoint: &str) -> Result<(), TransportError> {
        let mut transport = self.provider.open(endpoint)?;
        transport.configure(&LinkParams::default())?;
        transport.set_control_lines(true, true)?;

        let token = CancellationToken::new();
        let loop_token = token.clone();
        let publisher = self.monitor.clone();
        let events = self.events_tx.clone();
        let loop_task =
            task::spawn_blocking(move || read_loop(transport, loop_token, publisher, events));

        self.session = Some(ActiveSession { token, loop_task });
        Ok(())
    }

    /// Cancel the read loop, wait for it to hand the transport back, then
    /// drop (close) the transport. A new transport is never opened before
    /// this completes, so the loop can never race a close.
    async fn teardown(&mut self, status: impl Into<String>) {
        if let Some(session) = self.session.take() {
            session.token.cancel();
            match session.loop_task.await {
                Ok(transport) => drop(transport),
                Err(e) => error!(error = %e, "read loop failed to join"),
            }
        }
        self.state = LinkState::Disconnected;
        self.monitor.reset(status);
    }
}

/// The read loop: sole reader of the transport and sole owner of the line
/// buffer, which lives and dies with the loop. Returns the transport so the
/// supervisor can close it after the loop has stopped.
fn read_loop(
    mut transport: Box<dyn Transport>,
    token: CancellationToken,
    publisher: Monitor,
    events: mpsc::Sender<LinkEvent>,
) -> Box<dyn Transport> {
    let mut framer = LineFramer::new();
    let mut scratch = [0u8; SCRATCH_LEN];

    while !token.is_cancelled() {
        let count = match transport.read(&mut scratch, POLL_INTERVAL) {
            Ok(count) => count,
            Err(e) => {
                let _ = events.blocking_send(LinkEvent::ReadFailed(e.to_string()));
                break;
            }
        };
        if count == 0 {
            continue;
        }

        for line in framer.feed(&scratch[..count]) {
            match decoder::decode_line(&line) {
                Ok(Some(reading)) => publisher.publish_reading(reading),
                Ok(None) => {}
                Err(e) => debug!(%line, error = %e, "discarding undecodable line"),
            }
        }
    }

    framer.clear();
    transport
}
