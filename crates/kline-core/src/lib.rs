//! # kline-core
//!
//! Core functionality for bringing an automotive control unit into a
//! diagnostic-ready state over a K-line style serial link.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - A link handle wrapping the OS serial port (open/close/break/write/discard)
//! - One-shot cancellation signals with a re-arming owner
//! - The timed slow-init handshake and disconnect sequencer
//! - A session type serializing requests and handling teardown
//!
//! ## Example
//!
//! ```rust,ignore
//! use kline_core::protocol::{PortConfig, SerialLink, Session};
//!
//! let session = Session::new(SerialLink::new(PortConfig::default()));
//! let outcome = session.connect().await;
//! println!("connect: {outcome}");
//! session.shutdown().await;
//! ```

pub mod protocol;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::protocol::{
        CancelSignal, CancelSource, Link, Outcome, PortConfig, ProtocolError, Sequencer,
        SequencerState, SerialLink, Session,
    };
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
