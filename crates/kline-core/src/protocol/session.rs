//! Session lifecycle
//!
//! A [`Session`] owns one link, one sequencer and the cancel source. Requests
//! are serialized: while an operation holds the link, other requests report
//! [`ProtocolError::Busy`] instead of interleaving with it.

use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{
    CancelSignal, CancelSource, Link, Outcome, ProtocolError, Sequencer, SequencerState,
    DEFAULT_SHUTDOWN_GRACE_MS,
};

struct Inner<L> {
    link: L,
    sequencer: Sequencer,
}

/// Caller-facing handle for one logical connection
pub struct Session<L: Link> {
    inner: Mutex<Inner<L>>,
    cancel: CancelSource,
    grace: Duration,
}

impl<L: Link> Session<L> {
    /// Session over `link` with the protocol's delays
    pub fn new(link: L) -> Self {
        Self::with_sequencer(link, Sequencer::new())
    }

    /// Session over `link` driven by a custom sequencer
    pub fn with_sequencer(link: L, sequencer: Sequencer) -> Self {
        Self {
            inner: Mutex::new(Inner { link, sequencer }),
            cancel: CancelSource::new(),
            grace: Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS),
        }
    }

    /// Override the teardown grace period
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Run the wake-up handshake with the current cancellation signal
    pub async fn connect(&self) -> Outcome {
        let Ok(mut inner) = self.inner.try_lock() else {
            return Outcome::Failed(ProtocolError::Busy);
        };
        if inner.link.is_disposed() {
            return Outcome::Failed(ProtocolError::Disposed);
        }
        let signal = self.cancel.signal();
        let Inner { link, sequencer } = &mut *inner;
        sequencer.connect(link, &signal).await
    }

    /// Release the link; the settle wait honours the current signal
    pub async fn disconnect(&self) -> Outcome {
        let Ok(mut inner) = self.inner.try_lock() else {
            return Outcome::Failed(ProtocolError::Busy);
        };
        if inner.link.is_disposed() {
            return Outcome::Failed(ProtocolError::Disposed);
        }
        let signal = self.cancel.signal();
        let Inner { link, sequencer } = &mut *inner;
        sequencer.disconnect(link, &signal).await
    }

    /// Release the link, blocking the calling thread through the settle wait.
    ///
    /// Returns `true` only when the port was open and has been released. Meant
    /// for contexts that cannot suspend, e.g. right before another process
    /// takes over the port. Call it from a blocking thread, not from inside
    /// an async task.
    pub fn disconnect_blocking(&self) -> bool {
        let Ok(mut inner) = self.inner.try_lock() else {
            warn!("blocking disconnect skipped: operation in progress");
            return false;
        };
        let Inner { link, sequencer } = &mut *inner;
        sequencer.disconnect_blocking(link).is_succeeded()
    }

    /// Abort the in-flight operation at its next delay and re-arm for later ones
    pub fn cancel_current_operation(&self) {
        self.cancel.cancel_and_rearm();
        info!("current operation cancelled");
    }

    /// Signal the next operation will observe
    pub fn signal(&self) -> CancelSignal {
        self.cancel.signal()
    }

    /// Sequencer state, waiting for any in-flight operation to finish
    pub async fn state(&self) -> SequencerState {
        self.inner.lock().await.sequencer.state()
    }

    /// Whether the link is open, waiting for any in-flight operation to finish
    pub async fn is_open(&self) -> bool {
        self.inner.lock().await.link.is_open()
    }

    /// Tear the session down.
    ///
    /// Fires the cancellation signal and waits for the in-flight operation to
    /// hand the link back, then releases the port with an uncancellable
    /// disconnect and disposes the link and the cancel source. A second call
    /// reports `Failed(Disposed)`.
    ///
    /// The grace period does not bound teardown: the link is only touched once
    /// the running operation has returned it, so there is no force-close racing
    /// an operation still using the port. Async operations leave at their next
    /// delay; a blocking disconnect holds the link through its settle wait.
    /// Exceeding the grace period is logged as a warning.
    pub async fn shutdown(&self) -> Outcome {
        if self.cancel.is_disposed() {
            return Outcome::Failed(ProtocolError::Disposed);
        }
        // Retiring the source fires the live signal and keeps any request
        // racing this teardown from getting an armed one.
        self.cancel.dispose();

        let mut inner = match tokio::time::timeout(self.grace, self.inner.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                warn!(
                    grace_ms = self.grace.as_millis() as u64,
                    "operation still running after grace period, waiting for it to yield"
                );
                self.inner.lock().await
            }
        };

        let Inner { link, sequencer } = &mut *inner;
        let outcome = if link.is_open() {
            sequencer.disconnect(link, &CancelSignal::new()).await
        } else {
            debug!("link already closed at shutdown");
            Outcome::Succeeded
        };

        link.close();
        link.dispose();
        info!(outcome = %outcome, "session shut down");
        outcome
    }
}
