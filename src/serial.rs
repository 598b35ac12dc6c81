use std::io::{self, Read};
use std::time::Duration;

use serialport::{DataBits, Parity as SpParity, SerialPort, SerialPortType, StopBits};
use tracing::debug;

use crate::transport::{
    DeviceDescriptor, DeviceEnumerator, LinkParams, Parity, PermissionGate, Transport,
    TransportError, TransportProvider,
};

fn to_serialport_data_bits(bits: u8) -> DataBits {
    match bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        _ => DataBits::Eight,
    }
}

fn to_serialport_stop_bits(bits: u8) -> StopBits {
    match bits {
        2 => StopBits::Two,
        _ => StopBits::One,
    }
}

fn to_serialport_parity(parity: Parity) -> SpParity {
    match parity {
        Parity::None => SpParity::None,
        Parity::Odd => SpParity::Odd,
        Parity::Even => SpParity::Even,
    }
}

/// Enumerates serial ports as candidate testers, USB-attached ports first.
pub struct SerialEnumerator;

impl DeviceEnumerator for SerialEnumerator {
    fn list_candidates(&self) -> Vec<DeviceDescriptor> {
        let ports = serialport::available_ports().unwrap_or_default();

        let mut usb = Vec::new();
        let mut other = Vec::new();
        for info in ports {
            match &info.port_type {
                SerialPortType::UsbPort(usb_info) => {
                    let id = match (&usb_info.manufacturer, &usb_info.product) {
                        (Some(make), Some(product)) => format!("{make} {product}"),
                        (_, Some(product)) => product.clone(),
                        _ => format!("usb {:04x}:{:04x}", usb_info.vid, usb_info.pid),
                    };
                    usb.push(DeviceDescriptor {
                        id,
                        endpoints: vec![info.port_name],
                    });
                }
                _ => other.push(DeviceDescriptor {
                    id: info.port_name.clone(),
                    endpoints: vec![info.port_name],
                }),
            }
        }

        usb.extend(other);
        usb
    }
}

/// Desktop permission gate. The OS mediates port access at open time, so
/// permission is always treated as granted; the trait seam exists for hosts
/// with an explicit grant flow.
pub struct HostPermissionGate;

impl PermissionGate for HostPermissionGate {
    fn has_permission(&self, _device: &DeviceDescriptor) -> bool {
        true
    }

    fn request_permission(&self, device: &DeviceDescriptor) {
        debug!(device = %device.id, "permission request is a no-op on this host");
    }
}

/// Opens serial ports via the serialport crate.
pub struct SerialProvider;

impl TransportProvider for SerialProvider {
    fn open(&self, endpoint: &str) -> Result<Box<dyn Transport>, TransportError> {
        let port = serialport::new(endpoint, LinkParams::default().baud_rate)
            .timeout(Duration::from_millis(100))
            .open()
            .map_err(|e| TransportError::Open {
                endpoint: endpoint.to_owned(),
                reason: e.to_string(),
            })?;

        Ok(Box::new(SerialTransport { port }))
    }
}

struct SerialTransport {
    port: Box<dyn SerialPort>,
}

fn config_err(e: serialport::Error) -> TransportError {
    TransportError::Configure(e.to_string())
}

impl Transport for SerialTransport {
    fn configure(&mut self, params: &LinkParams) -> Result<(), TransportError> {
        self.port
            .set_baud_rate(params.baud_rate)
            .map_err(config_err)?;
        self.port
            .set_data_bits(to_serialport_data_bits(params.data_bits))
            .map_err(config_err)?;
        self.port
            .set_stop_bits(to_serialport_stop_bits(params.stop_bits))
            .map_err(config_err)?;
        self.port
            .set_parity(to_serialport_parity(params.parity))
            .map_err(config_err)?;
        Ok(())
    }

    fn set_control_lines(&mut self, dtr: bool, rts: bool) -> Result<(), TransportError> {
        self.port.write_data_terminal_ready(dtr).map_err(config_err)?;
        self.port.write_request_to_send(rts).map_err(config_err)?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize, TransportError> {
        if self.port.timeout() != timeout {
            let _ = self.port.set_timeout(timeout);
        }

        match self.port.read(buf) {
            Ok(count) => Ok(count),
            // An empty poll interval is not an error, just loop again.
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }
}
