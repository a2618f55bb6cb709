//! Session lifecycle tests: serialization, cancel/re-arm, teardown

mod common;

use common::{LinkEvent, MockLink};
use kline_core::protocol::{
    HandshakeTiming, Outcome, ProtocolError, Sequencer, SequencerState, Session, SignalState,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[tokio::test(start_paused = true)]
async fn test_connect_then_disconnect() {
    let (link, recorder) = MockLink::new();
    let session = Session::new(link);

    assert!(session.connect().await.is_succeeded());
    assert_eq!(session.state().await, SequencerState::Connected);
    assert!(session.is_open().await);

    assert!(session.disconnect().await.is_succeeded());
    assert!(!session.is_open().await);
    assert_eq!(session.state().await, SequencerState::Idle);
    assert_eq!(recorder.events().last(), Some(&LinkEvent::Close));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_without_connect() {
    let (link, recorder) = MockLink::new();
    let session = Session::new(link);

    let outcome = session.disconnect().await;
    assert!(matches!(
        outcome,
        Outcome::Failed(ProtocolError::NothingToDisconnect)
    ));
    assert!(recorder.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_overlapping_request_is_busy() {
    let (link, recorder) = MockLink::new();
    let session = Arc::new(Session::new(link));

    let first = {
        let session = session.clone();
        tokio::spawn(async move { session.connect().await })
    };
    tokio::time::sleep(ms(50)).await;

    assert!(matches!(
        session.connect().await,
        Outcome::Failed(ProtocolError::Busy)
    ));
    assert!(matches!(
        session.disconnect().await,
        Outcome::Failed(ProtocolError::Busy)
    ));

    assert!(first.await.unwrap().is_succeeded());
    assert_eq!(recorder.count(&LinkEvent::Open), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_rearms_for_next_connect() {
    let (link, recorder) = MockLink::new();
    let session = Arc::new(Session::new(link));

    let attempt = {
        let session = session.clone();
        tokio::spawn(async move { session.connect().await })
    };
    tokio::time::sleep(ms(200)).await;
    session.cancel_current_operation();

    assert!(attempt.await.unwrap().is_cancelled());
    assert!(!session.is_open().await);
    assert_eq!(session.signal().state(), SignalState::Armed);

    // A fresh attempt restarts the whole sequence
    recorder.clear();
    assert!(session.connect().await.is_succeeded());
    assert_eq!(recorder.events()[0], LinkEvent::Open);
    assert_eq!(recorder.written().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_disconnect_settle() {
    let (link, _recorder) = MockLink::new();
    let session = Arc::new(Session::new(link));
    assert!(session.connect().await.is_succeeded());

    let release = {
        let session = session.clone();
        tokio::spawn(async move { session.disconnect().await })
    };
    tokio::time::sleep(ms(300)).await;
    session.cancel_current_operation();

    assert!(release.await.unwrap().is_cancelled());
    assert!(!session.is_open().await);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_after_connect_releases_and_disposes() {
    let (link, recorder) = MockLink::new();
    let session = Session::new(link);
    assert!(session.connect().await.is_succeeded());
    recorder.clear();

    let start = Instant::now();
    let outcome = session.shutdown().await;

    assert!(outcome.is_succeeded(), "unexpected outcome: {outcome}");
    assert_eq!(start.elapsed(), ms(1000));
    assert_eq!(
        recorder.events(),
        vec![
            LinkEvent::DiscardInput,
            LinkEvent::DiscardOutput,
            LinkEvent::Close,
            LinkEvent::Dispose,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_connect() {
    let (link, recorder) = MockLink::new();
    let session = Arc::new(Session::new(link));

    let attempt = {
        let session = session.clone();
        tokio::spawn(async move { session.connect().await })
    };
    tokio::time::sleep(ms(120)).await;

    let start = Instant::now();
    let outcome = session.shutdown().await;

    assert!(outcome.is_succeeded());
    assert!(attempt.await.unwrap().is_cancelled());
    assert!(start.elapsed() < ms(500));
    assert!(recorder.written().is_empty());
    assert_eq!(
        recorder.events().last(),
        Some(&LinkEvent::Dispose),
        "link must be disposed last"
    );
    assert_eq!(recorder.count(&LinkEvent::Dispose), 1);
}

#[tokio::test(start_paused = true)]
async fn test_requests_after_shutdown() {
    let (link, recorder) = MockLink::new();
    let session = Session::new(link);

    assert!(session.shutdown().await.is_succeeded());
    assert!(matches!(
        session.shutdown().await,
        Outcome::Failed(ProtocolError::Disposed)
    ));
    assert!(matches!(
        session.connect().await,
        Outcome::Failed(ProtocolError::Disposed)
    ));
    assert!(matches!(
        session.disconnect().await,
        Outcome::Failed(ProtocolError::Disposed)
    ));
    assert!(!session.disconnect_blocking());
    assert_eq!(recorder.events(), vec![LinkEvent::Dispose]);
}

fn quick_timing() -> HandshakeTiming {
    HandshakeTiming {
        close_settle: ms(1),
        break_idle: ms(1),
        break_low: ms(1),
        break_recovery: ms(1),
        wakeup_gap: ms(1),
        init_gap: ms(1),
        disconnect_settle: ms(40),
    }
}

#[test]
fn test_blocking_disconnect() {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let (link, recorder) = MockLink::new();
    let session = Session::with_sequencer(link, Sequencer::with_timing(quick_timing()));

    assert!(runtime.block_on(session.connect()).is_succeeded());

    // Cancellation has no effect on the blocking variant
    session.cancel_current_operation();

    let start = std::time::Instant::now();
    assert!(session.disconnect_blocking());
    assert!(start.elapsed() >= ms(40));
    assert_eq!(recorder.events().last(), Some(&LinkEvent::Close));

    assert!(!session.disconnect_blocking());
}

#[tokio::test(start_paused = true)]
async fn test_grace_period_override() {
    let (link, _recorder) = MockLink::new();
    let session = Session::new(link).with_grace(ms(50));
    assert!(session.connect().await.is_succeeded());

    let outcome = session.shutdown().await;
    assert!(outcome.is_succeeded());
    assert!(!session.is_open().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_waits_for_blocking_release_past_grace() {
    let (link, recorder) = MockLink::new();
    let timing = HandshakeTiming {
        disconnect_settle: ms(200),
        ..quick_timing()
    };
    let session = Arc::new(
        Session::with_sequencer(link, Sequencer::with_timing(timing)).with_grace(ms(50)),
    );
    assert!(session.connect().await.is_succeeded());
    recorder.clear();

    let start = std::time::Instant::now();
    let release = {
        let session = session.clone();
        tokio::task::spawn_blocking(move || session.disconnect_blocking())
    };
    // Let the blocking thread take the link before teardown starts
    tokio::time::sleep(ms(20)).await;

    let outcome = session.shutdown().await;

    assert!(outcome.is_succeeded(), "unexpected outcome: {outcome}");
    assert!(release.await.unwrap(), "blocking release should own the link");
    assert!(start.elapsed() >= ms(200));
    assert_eq!(recorder.count(&LinkEvent::Close), 1);
    assert_eq!(recorder.count(&LinkEvent::Dispose), 1);
    assert_eq!(
        recorder.events(),
        vec![
            LinkEvent::DiscardInput,
            LinkEvent::DiscardOutput,
            LinkEvent::Close,
            LinkEvent::Dispose,
        ]
    );
}
