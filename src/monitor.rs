use tokio::sync::watch;

use crate::Reading;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    PermissionRequested,
    Connected,
}

/// The latest observable link state: lifecycle state, an advisory status
/// line, and the most recent reading.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkSnapshot {
    pub state: LinkState,
    pub status: String,
    pub reading: Reading,
}

impl LinkSnapshot {
    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Connected
    }
}

impl Default for LinkSnapshot {
    fn default() -> Self {
        Self {
            state: LinkState::Disconnected,
            status: "Disconnected. Plug in the tester.".to_owned(),
            reading: Reading::default(),
        }
    }
}

/// Single-slot publisher of the latest snapshot. Consumers hold a watch
/// receiver; every update replaces the slot wholesale, so a reader never
/// observes a half-written snapshot.
#[derive(Debug, Clone)]
pub struct Monitor {
    slot: watch::Sender<LinkSnapshot>,
}

impl Monitor {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(LinkSnapshot::default());
        Self { slot }
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkSnapshot> {
        self.slot.subscribe()
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        self.slot.borrow().clone()
    }

    /// Replace the stored reading, leaving state and status untouched.
    pub fn publish_reading(&self, reading: Reading) {
        self.slot.send_modify(|snap| snap.reading = reading);
    }

    /// Update the state and its advisory status line together.
    pub fn set_state(&self, state: LinkState, status: impl Into<String>) {
        let status = status.into();
        self.slot.send_modify(|snap| {
            snap.state = state;
            snap.status = status;
        });
    }

    /// Status-only update; the state is unchanged.
    pub fn set_status(&self, status: impl Into<String>) {
        let status = status.into();
        self.slot.send_modify(|snap| snap.status = status);
    }

    /// Return to the pre-connection defaults with the given status line.
    pub fn reset(&self, status: impl Into<String>) {
        let status = status.into();
        self.slot.send_modify(|snap| {
            *snap = LinkSnapshot::default();
            snap.status = status;
        });
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}
