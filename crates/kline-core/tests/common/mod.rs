//! Recording link used by the integration tests

#![allow(dead_code)]

use kline_core::protocol::{Link, PortConfig, ProtocolError};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::time::Instant;

static TRACING: Once = Once::new();

/// Route library logs to the test harness output (`RUST_LOG` filters them)
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("kline_core=debug"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// One call made against the link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Open,
    Close,
    Break(bool),
    Write(Vec<u8>),
    DiscardInput,
    DiscardOutput,
    Dispose,
}

#[derive(Debug, Default)]
struct Log {
    events: Vec<(Instant, LinkEvent)>,
}

/// Observer half: inspect what the link saw after handing it to a session
#[derive(Debug, Clone)]
pub struct Recorder {
    log: Arc<Mutex<Log>>,
    start: Instant,
}

impl Recorder {
    pub fn events(&self) -> Vec<LinkEvent> {
        self.log.lock().unwrap().events.iter().map(|(_, e)| e.clone()).collect()
    }

    /// Events with their offset from the recorder's creation
    pub fn timeline(&self) -> Vec<(Duration, LinkEvent)> {
        self.log
            .lock()
            .unwrap()
            .events
            .iter()
            .map(|(at, e)| (at.duration_since(self.start), e.clone()))
            .collect()
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LinkEvent::Write(bytes) => Some(bytes),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, event: &LinkEvent) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().events.clear();
    }
}

/// Link that records every call instead of touching hardware
pub struct MockLink {
    config: PortConfig,
    open: bool,
    disposed: bool,
    log: Arc<Mutex<Log>>,
    /// Fail the next open with this error
    pub fail_open: Option<fn() -> ProtocolError>,
    /// Fail the write with this index (0-based) with a timeout
    pub fail_write_at: Option<usize>,
    /// Fail buffer discards
    pub fail_discard: bool,
    writes: usize,
}

impl MockLink {
    pub fn new() -> (Self, Recorder) {
        init_tracing();
        let log = Arc::new(Mutex::new(Log::default()));
        let recorder = Recorder {
            log: log.clone(),
            start: Instant::now(),
        };
        let link = Self {
            config: PortConfig::for_port("/dev/ttyMOCK0"),
            open: false,
            disposed: false,
            log,
            fail_open: None,
            fail_write_at: None,
            fail_discard: false,
            writes: 0,
        };
        (link, recorder)
    }

    /// Link that starts in the open state, as if left open by a previous run
    pub fn already_open() -> (Self, Recorder) {
        let (mut link, recorder) = Self::new();
        link.open = true;
        (link, recorder)
    }

    fn record(&self, event: LinkEvent) {
        self.log.lock().unwrap().events.push((Instant::now(), event));
    }

    fn require_open(&self) -> Result<(), ProtocolError> {
        if self.disposed {
            Err(ProtocolError::Disposed)
        } else if !self.open {
            Err(ProtocolError::NotOpen)
        } else {
            Ok(())
        }
    }
}

impl Link for MockLink {
    fn configure(&mut self, config: PortConfig) -> Result<(), ProtocolError> {
        if self.open {
            return Err(ProtocolError::ConfigWhileOpen);
        }
        self.config = config;
        Ok(())
    }

    fn config(&self) -> &PortConfig {
        &self.config
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn open(&mut self) -> Result<(), ProtocolError> {
        if self.disposed {
            return Err(ProtocolError::Disposed);
        }
        if self.open {
            return Err(ProtocolError::AlreadyOpen);
        }
        if let Some(make_err) = self.fail_open.take() {
            return Err(make_err());
        }
        self.open = true;
        self.record(LinkEvent::Open);
        Ok(())
    }

    fn close(&mut self) -> bool {
        if !self.open {
            return false;
        }
        self.open = false;
        self.record(LinkEvent::Close);
        true
    }

    fn set_break(&mut self, asserted: bool) -> Result<(), ProtocolError> {
        self.require_open()?;
        self.record(LinkEvent::Break(asserted));
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.require_open()?;
        let index = self.writes;
        self.writes += 1;
        if self.fail_write_at == Some(index) {
            return Err(ProtocolError::Timeout);
        }
        self.record(LinkEvent::Write(bytes.to_vec()));
        Ok(())
    }

    fn discard_input(&mut self) -> Result<(), ProtocolError> {
        self.require_open()?;
        if self.fail_discard {
            return Err(ProtocolError::SerialError("discard failed".into()));
        }
        self.record(LinkEvent::DiscardInput);
        Ok(())
    }

    fn discard_output(&mut self) -> Result<(), ProtocolError> {
        self.require_open()?;
        if self.fail_discard {
            return Err(ProtocolError::SerialError("discard failed".into()));
        }
        self.record(LinkEvent::DiscardOutput);
        Ok(())
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.close();
        self.disposed = true;
        self.record(LinkEvent::Dispose);
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}
