use std::time::Duration;

use shutterlink::monitor::LinkState;
use shutterlink::serial::{HostPermissionGate, SerialEnumerator, SerialProvider};
use shutterlink::supervisor::LinkSupervisor;
use tokio::time;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// How often to re-run discovery while no device is connected. Desktop hosts
/// have no attach broadcast, so the monitor polls instead.
const RESCAN_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_file(false)
        .init();

    info!("shutterlink monitor initialized");

    let supervisor = LinkSupervisor::new(
        Box::new(SerialEnumerator),
        Box::new(HostPermissionGate),
        Box::new(SerialProvider),
    );
    let handle = supervisor.handle();
    let run = tokio::spawn(supervisor.run());

    handle.request_connect().await;

    let mut snapshots = handle.subscribe();
    let mut rescan = time::interval(RESCAN_INTERVAL);
    rescan.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                handle.request_disconnect().await;
                handle.shutdown().await;
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = snapshots.borrow_and_update().clone();
                if snap.is_connected() {
                    let reading = snap.reading;
                    info!(
                        effective_us = reading.effective_time,
                        total_us = reading.total_time,
                        signal = reading.relative_signal,
                        peak = reading.max_relative_signal,
                        "reading"
                    );
                } else {
                    info!(status = %snap.status, "link");
                }
            }
            _ = rescan.tick() => {
                if handle.snapshot().state == LinkState::Disconnected {
                    handle.device_attached().await;
                }
            }
        }
    }

    let _ = run.await;
}
