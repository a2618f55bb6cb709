//! K-line slow-init protocol
//!
//! Implements the break pulse, wake-up and init byte handshake that brings a
//! control unit into diagnostic mode, plus the matching disconnect procedure.

pub mod cancel;
pub mod config;
mod error;
pub mod sequencer;
pub mod serial;
mod session;

pub use cancel::{CancelSignal, CancelSource, SignalState};
pub use config::{FlowControl, HandshakeTiming, Parity, PortConfig};
pub use error::ProtocolError;
pub use sequencer::{Outcome, Sequencer, SequencerState};
pub use serial::{list_ports, Link, PortInfo, SerialLink};
pub use session::Session;

/// Baud rate of the K-line protocol variant
pub const DEFAULT_BAUD_RATE: u32 = 10400;

/// Default read timeout in milliseconds
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 1000;

/// Default write timeout in milliseconds
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 1000;

/// Grace period given to an in-flight operation during session teardown
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 500;

/// Wake-up sequence, sent after the break pulse
pub const WAKEUP_SEQUENCE: [u8; 4] = [0xFE, 0x04, 0x72, 0x8C];

/// Init sequence, sent after the wake-up sequence
pub const INIT_SEQUENCE: [u8; 5] = [0x72, 0x05, 0x00, 0xF0, 0x99];
