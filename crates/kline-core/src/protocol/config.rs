//! Port configuration and handshake timing

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use super::{ProtocolError, DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT_MS, DEFAULT_WRITE_TIMEOUT_MS};

/// Parity checking mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    /// No parity bit
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

/// Handshake (flow control) mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    /// No flow control
    #[default]
    None,
    /// XON/XOFF
    Software,
    /// RTS/CTS
    Hardware,
}

/// Serial port configuration, fixed for the lifetime of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortConfig {
    /// Port identifier (e.g. "/dev/ttyUSB0" or "COM4")
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits per character (5-8)
    pub data_bits: u8,
    /// Parity mode
    pub parity: Parity,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
    /// Handshake mode
    pub flow_control: FlowControl,
    /// Read timeout in milliseconds. `serialport` carries a single timeout and
    /// nothing is read during the handshake, so only the write timeout is
    /// applied to the port.
    pub read_timeout_ms: u64,
    /// Write timeout in milliseconds
    pub write_timeout_ms: u64,
}

fn default_port_name() -> String {
    if cfg!(windows) {
        "COM4".to_string()
    } else {
        "/dev/ttyUSB0".to_string()
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            port_name: default_port_name(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: 8,
            parity: Parity::None,
            stop_bits: 1,
            flow_control: FlowControl::None,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
        }
    }
}

impl PortConfig {
    /// Default configuration for the given port
    pub fn for_port(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..Self::default()
        }
    }

    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        let config: PortConfig = serde_json::from_str(&content)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(config)
    }

    /// Render as pretty JSON
    pub fn to_json(&self) -> io::Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    /// Check that every parameter can be applied to a serial port
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.port_name.trim().is_empty() {
            return Err(ProtocolError::InvalidConfig("port name is empty".into()));
        }
        if self.baud_rate == 0 {
            return Err(ProtocolError::InvalidConfig("baud rate must be non-zero".into()));
        }
        self.serial_data_bits()?;
        self.serial_stop_bits()?;
        Ok(())
    }

    /// Write timeout as a duration
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub(crate) fn serial_data_bits(&self) -> Result<serialport::DataBits, ProtocolError> {
        match self.data_bits {
            5 => Ok(serialport::DataBits::Five),
            6 => Ok(serialport::DataBits::Six),
            7 => Ok(serialport::DataBits::Seven),
            8 => Ok(serialport::DataBits::Eight),
            n => Err(ProtocolError::InvalidConfig(format!(
                "unsupported data bits: {}",
                n
            ))),
        }
    }

    pub(crate) fn serial_stop_bits(&self) -> Result<serialport::StopBits, ProtocolError> {
        match self.stop_bits {
            1 => Ok(serialport::StopBits::One),
            2 => Ok(serialport::StopBits::Two),
            n => Err(ProtocolError::InvalidConfig(format!(
                "unsupported stop bits: {}",
                n
            ))),
        }
    }

    pub(crate) fn serial_parity(&self) -> serialport::Parity {
        match self.parity {
            Parity::None => serialport::Parity::None,
            Parity::Odd => serialport::Parity::Odd,
            Parity::Even => serialport::Parity::Even,
        }
    }

    pub(crate) fn serial_flow_control(&self) -> serialport::FlowControl {
        match self.flow_control {
            FlowControl::None => serialport::FlowControl::None,
            FlowControl::Software => serialport::FlowControl::Software,
            FlowControl::Hardware => serialport::FlowControl::Hardware,
        }
    }
}

/// Mandated delays of the handshake and disconnect procedures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeTiming {
    /// Wait after closing a port that was found open before connect
    pub close_settle: Duration,
    /// Line idle (break cleared) before the pulse
    pub break_idle: Duration,
    /// Break asserted
    pub break_low: Duration,
    /// Line idle after the pulse, before the wake-up bytes
    pub break_recovery: Duration,
    /// Gap after the wake-up sequence
    pub wakeup_gap: Duration,
    /// Gap after the init sequence
    pub init_gap: Duration,
    /// Wait after closing the port on disconnect
    pub disconnect_settle: Duration,
}

impl Default for HandshakeTiming {
    fn default() -> Self {
        Self {
            close_settle: Duration::from_millis(100),
            break_idle: Duration::from_millis(100),
            break_low: Duration::from_millis(70),
            break_recovery: Duration::from_millis(150),
            wakeup_gap: Duration::from_millis(30),
            init_gap: Duration::from_millis(30),
            disconnect_settle: Duration::from_millis(1000),
        }
    }
}

impl HandshakeTiming {
    /// Sum of the delays of a connect that starts from a closed port
    pub fn connect_total(&self) -> Duration {
        self.break_idle + self.break_low + self.break_recovery + self.wakeup_gap + self.init_gap
    }
}
