//! Serial link handling
//!
//! [`Link`] is the contract the sequencer drives; [`SerialLink`] implements it
//! on top of an OS serial port.

use serialport::{ClearBuffer, SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::io::Write;
use tracing::debug;

use super::{PortConfig, ProtocolError};

/// Link handle over a serial line.
///
/// Write, break and discard operations are only valid while the link is open.
pub trait Link: Send {
    /// Replace the port parameters. Only allowed while closed.
    fn configure(&mut self, config: PortConfig) -> Result<(), ProtocolError>;

    /// Current port parameters
    fn config(&self) -> &PortConfig;

    /// Whether the port is currently open
    fn is_open(&self) -> bool;

    /// Open the port. Opening an open link is an error.
    fn open(&mut self) -> Result<(), ProtocolError>;

    /// Close the port. Returns `false` when there was nothing to close.
    fn close(&mut self) -> bool;

    /// Assert (`true`) or clear (`false`) the break condition
    fn set_break(&mut self, asserted: bool) -> Result<(), ProtocolError>;

    /// Blocking write bounded by the configured write timeout
    fn write(&mut self, bytes: &[u8]) -> Result<(), ProtocolError>;

    /// Drop bytes received but not yet read
    fn discard_input(&mut self) -> Result<(), ProtocolError>;

    /// Drop bytes queued but not yet transmitted
    fn discard_output(&mut self) -> Result<(), ProtocolError>;

    /// Release the OS resource. Safe to call any number of times.
    fn dispose(&mut self);

    /// Whether [`Link::dispose`] has run
    fn is_disposed(&self) -> bool;
}

/// [`Link`] backed by the `serialport` crate
pub struct SerialLink {
    config: PortConfig,
    port: Option<Box<dyn SerialPort>>,
    disposed: bool,
}

impl SerialLink {
    /// Create a closed link with the given parameters
    pub fn new(config: PortConfig) -> Self {
        Self {
            config,
            port: None,
            disposed: false,
        }
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn SerialPort>, ProtocolError> {
        if self.disposed {
            return Err(ProtocolError::Disposed);
        }
        self.port.as_mut().ok_or(ProtocolError::NotOpen)
    }
}

impl Link for SerialLink {
    fn configure(&mut self, config: PortConfig) -> Result<(), ProtocolError> {
        if self.disposed {
            return Err(ProtocolError::Disposed);
        }
        if self.port.is_some() {
            return Err(ProtocolError::ConfigWhileOpen);
        }
        self.config = config;
        Ok(())
    }

    fn config(&self) -> &PortConfig {
        &self.config
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn open(&mut self) -> Result<(), ProtocolError> {
        if self.disposed {
            return Err(ProtocolError::Disposed);
        }
        if self.port.is_some() {
            return Err(ProtocolError::AlreadyOpen);
        }
        self.config.validate()?;

        // serialport carries a single timeout; nothing is read here, so the
        // write timeout bounds every blocking call.
        let port = serialport::new(&self.config.port_name, self.config.baud_rate)
            .data_bits(self.config.serial_data_bits()?)
            .parity(self.config.serial_parity())
            .stop_bits(self.config.serial_stop_bits()?)
            .flow_control(self.config.serial_flow_control())
            .timeout(self.config.write_timeout())
            .open()?;

        debug!(
            port = %self.config.port_name,
            baud = self.config.baud_rate,
            "serial port opened"
        );
        self.port = Some(port);
        Ok(())
    }

    fn close(&mut self) -> bool {
        // Dropping the handle closes the OS port
        match self.port.take() {
            Some(port) => {
                drop(port);
                debug!(port = %self.config.port_name, "serial port closed");
                true
            }
            None => false,
        }
    }

    fn set_break(&mut self, asserted: bool) -> Result<(), ProtocolError> {
        let port = self.port_mut()?;
        if asserted {
            port.set_break()?;
        } else {
            port.clear_break()?;
        }
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        let port = self.port_mut()?;
        port.write_all(bytes).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                ProtocolError::Timeout
            } else {
                ProtocolError::IoError(e)
            }
        })?;
        port.flush()?;
        Ok(())
    }

    fn discard_input(&mut self) -> Result<(), ProtocolError> {
        self.port_mut()?.clear(ClearBuffer::Input)?;
        Ok(())
    }

    fn discard_output(&mut self) -> Result<(), ProtocolError> {
        self.port_mut()?.clear(ClearBuffer::Output)?;
        Ok(())
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.close();
        self.disposed = true;
        debug!(port = %self.config.port_name, "serial link disposed");
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM4")
    pub name: String,

    /// USB vendor and product ID, for USB adapters
    pub usb_id: Option<(u16, u16)>,

    /// Product description reported by the adapter
    pub product: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                name: info.port_name,
                usb_id: Some((usb.vid, usb.pid)),
                product: usb.product,
            },
            _ => Self {
                name: info.port_name,
                usb_id: None,
                product: None,
            },
        }
    }
}

/// USB-serial adapters (ttyUSB*) first, then CDC-ACM, then the rest
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    for (rank, prefix) in [(0u8, "ttyUSB"), (1, "ttyACM"), (2, "COM")] {
        if let Some(rest) = basename.strip_prefix(prefix) {
            let num = rest.parse::<usize>().unwrap_or(usize::MAX);
            return (rank, num, basename.to_string());
        }
    }
    (3, 0, basename.to_string())
}

/// List available serial ports in a stable order
pub fn list_ports() -> Vec<PortInfo> {
    let mut found: HashMap<String, PortInfo> = HashMap::new();
    for info in serialport::available_ports().unwrap_or_default() {
        let port = PortInfo::from(info);
        found.entry(port.name.clone()).or_insert(port);
    }

    // Some kernels expose USB adapters the enumeration API misses
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            let Some(fname) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            if fname.starts_with("ttyUSB") || fname.starts_with("ttyACM") {
                let name = format!("/dev/{}", fname);
                found.entry(name.clone()).or_insert(PortInfo {
                    name,
                    usb_id: None,
                    product: None,
                });
            }
        }
    }

    let mut ports: Vec<PortInfo> = found.into_values().collect();
    ports.sort_by_key(|p| port_sort_key(&p.name));
    ports
}
