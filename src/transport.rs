use std::time::Duration;

/// Serial link parameters for the tester's USB bridge.
#[derive(Debug, Clone, Copy)]
pub struct LinkParams {
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: Parity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

impl Default for LinkParams {
    // 115200 8N1, the tester's fixed configuration.
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to open {endpoint}: {reason}")]
    Open { endpoint: String, reason: String },
    #[error("failed to configure link: {0}")]
    Configure(String),
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One attached candidate device and its endpoints, in discovery order.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    pub id: String,
    pub endpoints: Vec<String>,
}

/// Enumerates candidate devices currently attached to the host.
pub trait DeviceEnumerator: Send {
    fn list_candidates(&self) -> Vec<DeviceDescriptor>;
}

/// Host gate for opening a device. `request_permission` is fire-and-forget;
/// the grant or denial arrives later as a
/// [`LinkEvent::PermissionDecision`](crate::supervisor::LinkEvent).
pub trait PermissionGate: Send {
    fn has_permission(&self, device: &DeviceDescriptor) -> bool;
    fn request_permission(&self, device: &DeviceDescriptor);
}

/// Opens a transport to a named endpoint.
pub trait TransportProvider: Send {
    fn open(&self, endpoint: &str) -> Result<Box<dyn Transport>, TransportError>;
}

/// An open endpoint. The read loop is its only reader; the supervisor opens
/// it and closes it by dropping the handle (close failures are swallowed by
/// drop semantics).
pub trait Transport: Send {
    fn configure(&mut self, params: &LinkParams) -> Result<(), TransportError>;

    /// Drive the DTR and RTS control lines. The tester's USB bridge only
    /// starts streaming once both are asserted.
    fn set_control_lines(&mut self, dtr: bool, rts: bool) -> Result<(), TransportError>;

    /// Read with a bounded timeout. A timeout with nothing received is
    /// `Ok(0)`, not an error; an `Err` is fatal to the session.
    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError>;
}
