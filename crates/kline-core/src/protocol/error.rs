//! Protocol errors

use thiserror::Error;

/// Errors that can occur while driving the serial link
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Failure reported by the serial driver
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// Device missing or claimed by another process
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Parameters the port cannot apply
    #[error("Invalid port configuration: {0}")]
    InvalidConfig(String),

    /// The configured read/write timeout elapsed
    #[error("Serial operation timed out")]
    Timeout,

    /// OS-level I/O failure
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Operation requires an open port
    #[error("Port is not open")]
    NotOpen,

    /// Open requested on an open port
    #[error("Port is already open")]
    AlreadyOpen,

    /// Configure requested on an open port
    #[error("Port configuration cannot change while the port is open")]
    ConfigWhileOpen,

    /// Disconnect requested with no open port
    #[error("Nothing to disconnect")]
    NothingToDisconnect,

    /// Link used after disposal
    #[error("Link has been disposed")]
    Disposed,

    /// Another operation holds the link
    #[error("Another operation is in progress on this link")]
    Busy,
}

impl ProtocolError {
    /// Open, write, close and buffer failures reported by the device or OS
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Self::SerialError(_)
                | Self::PortNotFound(_)
                | Self::InvalidConfig(_)
                | Self::Timeout
                | Self::IoError(_)
        )
    }

    /// Timeout is the distinguished I/O sub-kind
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout => true,
            Self::IoError(e) => e.kind() == std::io::ErrorKind::TimedOut,
            _ => false,
        }
    }

    /// Operation requested in a state that does not allow it
    pub fn is_invalid_state(&self) -> bool {
        !self.is_io()
    }
}

impl From<serialport::Error> for ProtocolError {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::NoDevice => Self::PortNotFound(e.description),
            serialport::ErrorKind::InvalidInput => Self::InvalidConfig(e.description),
            serialport::ErrorKind::Io(std::io::ErrorKind::TimedOut) => Self::Timeout,
            _ => Self::SerialError(e.description),
        }
    }
}
