//! Cancellation signals
//!
//! A [`CancelSignal`] is a one-shot token: it starts `Armed` and, once fired,
//! stays `Fired` forever. Operations take the signal as an explicit argument
//! and race each of their delays against it. A [`CancelSource`] owns the
//! signal handed to the next operation and replaces it with a fresh one every
//! time it fires, so a fired token is never reused.

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// State of a cancellation signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalState {
    /// No cancellation requested
    Armed,
    /// Cancellation requested; terminal
    Fired,
}

/// One-shot cancellation token. Clones observe the same signal.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    token: CancellationToken,
}

impl CancelSignal {
    /// Create a new armed signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Firing twice has no further effect.
    pub fn fire(&self) {
        self.token.cancel();
    }

    /// Current state
    pub fn state(&self) -> SignalState {
        if self.token.is_cancelled() {
            SignalState::Fired
        } else {
            SignalState::Armed
        }
    }

    /// Shorthand for `state() == SignalState::Fired`
    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal fires
    pub async fn fired(&self) {
        self.token.cancelled().await
    }
}

/// Owner of the signal handed to cancellable operations
#[derive(Debug)]
pub struct CancelSource {
    current: Mutex<CancelSignal>,
    retired: Mutex<bool>,
}

impl Default for CancelSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSource {
    /// Create a source holding a fresh armed signal
    pub fn new() -> Self {
        Self {
            current: Mutex::new(CancelSignal::new()),
            retired: Mutex::new(false),
        }
    }

    /// Signal for the next operation.
    ///
    /// Never returns a fired signal while the source is live. After
    /// [`CancelSource::dispose`] the returned signal is always fired.
    pub fn signal(&self) -> CancelSignal {
        let mut current = self.current.lock();
        if current.is_fired() && !*self.retired.lock() {
            *current = CancelSignal::new();
        }
        current.clone()
    }

    /// Fire the current signal and install a fresh one for later operations.
    ///
    /// Returns the signal that was fired.
    pub fn cancel_and_rearm(&self) -> CancelSignal {
        let mut current = self.current.lock();
        let fired = std::mem::replace(&mut *current, CancelSignal::new());
        fired.fire();
        if *self.retired.lock() {
            current.fire();
        }
        debug!("cancellation signal fired and re-armed");
        fired
    }

    /// Fire the current signal without re-arming
    pub fn fire(&self) {
        self.current.lock().fire();
    }

    /// Retire the source: the current signal fires and no new one is issued
    pub fn dispose(&self) {
        *self.retired.lock() = true;
        self.current.lock().fire();
    }

    /// Whether the source has been disposed
    pub fn is_disposed(&self) -> bool {
        *self.retired.lock()
    }
}
