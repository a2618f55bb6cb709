//! Connection sequencer
//!
//! Drives the slow-init wake-up handshake and the disconnect procedure
//! against a [`Link`]. Every mandated delay is a suspension point raced
//! against a [`CancelSignal`]; the serial calls between delays are blocking
//! and bounded by the port timeouts.

use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{CancelSignal, HandshakeTiming, Link, ProtocolError, INIT_SEQUENCE, WAKEUP_SEQUENCE};

/// Terminal result of a connect or disconnect operation
#[derive(Debug)]
pub enum Outcome {
    /// The full sequence completed
    Succeeded,
    /// The sequence stopped on an error
    Failed(ProtocolError),
    /// The cancellation signal fired during a delay
    Cancelled,
}

impl Outcome {
    /// Whether the operation completed
    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Whether the operation was aborted by cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether the operation failed
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// The failure cause, if any
    pub fn error(&self) -> Option<&ProtocolError> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed(e) => write!(f, "failed: {}", e),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Sequencer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// No operation running, no handshake completed
    Idle,
    /// Handshake in progress
    Connecting,
    /// Handshake completed, link held open
    Connected,
    /// Disconnect in progress
    Disconnecting,
}

/// Why a sequence stopped early
enum Abort {
    Cancelled,
    Failed(ProtocolError),
}

impl From<ProtocolError> for Abort {
    fn from(e: ProtocolError) -> Self {
        Abort::Failed(e)
    }
}

/// Wait for `duration` unless `signal` fires first
async fn delay(duration: Duration, signal: &CancelSignal) -> Result<(), Abort> {
    tokio::select! {
        biased;
        _ = signal.fired() => Err(Abort::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// State machine running the handshake and disconnect procedures
#[derive(Debug)]
pub struct Sequencer {
    state: SequencerState,
    timing: HandshakeTiming,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequencer {
    /// Sequencer using the protocol's mandated delays
    pub fn new() -> Self {
        Self::with_timing(HandshakeTiming::default())
    }

    /// Sequencer using custom delays
    pub fn with_timing(timing: HandshakeTiming) -> Self {
        Self {
            state: SequencerState::Idle,
            timing,
        }
    }

    /// Current state
    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// Delay table in use
    pub fn timing(&self) -> &HandshakeTiming {
        &self.timing
    }

    /// Run the slow-init handshake.
    ///
    /// On cancellation or failure the link is closed before reporting. A
    /// signal that has already fired starts nothing: an open link is closed
    /// and `Cancelled` is reported.
    pub async fn connect<L: Link>(&mut self, link: &mut L, signal: &CancelSignal) -> Outcome {
        if signal.is_fired() {
            if link.close() {
                debug!(port = %link.config().port_name, "closed link before refusing connect");
            }
            self.state = SequencerState::Idle;
            warn!("connect refused: cancellation signal already fired");
            return Outcome::Cancelled;
        }

        self.state = SequencerState::Connecting;
        let port = link.config().port_name.clone();
        info!(port = %port, "starting slow-init handshake");

        let outcome = match self.handshake(link, signal).await {
            Ok(()) => {
                self.state = SequencerState::Connected;
                info!(port = %port, "handshake complete");
                return Outcome::Succeeded;
            }
            Err(Abort::Cancelled) => {
                warn!(port = %port, "handshake cancelled");
                Outcome::Cancelled
            }
            Err(Abort::Failed(e)) => {
                warn!(port = %port, error = %e, "handshake failed");
                Outcome::Failed(e)
            }
        };

        if link.close() {
            debug!(port = %port, "closed link after aborted handshake");
        }
        self.state = SequencerState::Idle;
        outcome
    }

    async fn handshake<L: Link>(&mut self, link: &mut L, signal: &CancelSignal) -> Result<(), Abort> {
        let t = self.timing;

        if link.close() {
            debug!(delay_ms = t.close_settle.as_millis() as u64, "closed stale link");
            delay(t.close_settle, signal).await?;
        }

        link.open()?;

        debug!("break pulse");
        link.set_break(false)?;
        delay(t.break_idle, signal).await?;
        link.set_break(true)?;
        delay(t.break_low, signal).await?;
        link.set_break(false)?;
        delay(t.break_recovery, signal).await?;

        debug!(bytes = ?WAKEUP_SEQUENCE, "sending wake-up sequence");
        link.write(&WAKEUP_SEQUENCE)?;
        delay(t.wakeup_gap, signal).await?;

        debug!(bytes = ?INIT_SEQUENCE, "sending init sequence");
        link.write(&INIT_SEQUENCE)?;
        delay(t.init_gap, signal).await?;

        link.discard_output()?;
        link.discard_input()?;
        Ok(())
    }

    /// Release the link and wait for the device to register it.
    ///
    /// Buffers are discarded and the port closed even when the signal has
    /// already fired; cancellation only skips the settle wait.
    pub async fn disconnect<L: Link>(&mut self, link: &mut L, signal: &CancelSignal) -> Outcome {
        if !link.is_open() {
            return Outcome::Failed(ProtocolError::NothingToDisconnect);
        }

        self.state = SequencerState::Disconnecting;
        let outcome = match Self::release(link) {
            Ok(()) => match delay(self.timing.disconnect_settle, signal).await {
                Ok(()) => Outcome::Succeeded,
                Err(_) => Outcome::Cancelled,
            },
            Err(e) => Outcome::Failed(e),
        };
        self.state = SequencerState::Idle;
        info!(port = %link.config().port_name, outcome = %outcome, "disconnect finished");
        outcome
    }

    /// Blocking disconnect for contexts that cannot suspend.
    ///
    /// The settle wait blocks the calling thread and cannot be cancelled, so
    /// the port is released before this returns.
    pub fn disconnect_blocking<L: Link>(&mut self, link: &mut L) -> Outcome {
        if !link.is_open() {
            return Outcome::Failed(ProtocolError::NothingToDisconnect);
        }

        self.state = SequencerState::Disconnecting;
        let outcome = match Self::release(link) {
            Ok(()) => {
                std::thread::sleep(self.timing.disconnect_settle);
                Outcome::Succeeded
            }
            Err(e) => Outcome::Failed(e),
        };
        self.state = SequencerState::Idle;
        info!(port = %link.config().port_name, outcome = %outcome, "blocking disconnect finished");
        outcome
    }

    /// Discard both buffers and close; the port is closed even when a discard fails
    fn release<L: Link>(link: &mut L) -> Result<(), ProtocolError> {
        let discarded = link.discard_input().and_then(|_| link.discard_output());
        link.close();
        if let Err(ref e) = discarded {
            warn!(error = %e, "buffer discard failed, port closed anyway");
        }
        discarded
    }
}
