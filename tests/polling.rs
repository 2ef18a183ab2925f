//! Status polling under paused time.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use proposal_flow::cache::memory::InMemoryCache;
use proposal_flow::error::{RemoteError, WorkflowError};
use proposal_flow::models::ProcessingStage;
use proposal_flow::poller::{PollUpdate, StatusWatch};
use proposal_flow::stage::Stage;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn test_polls_until_processed_and_advances_stage() {
    let gateway = FakeGateway::new();
    gateway.script_statuses(vec![Ok(processing()), Ok(processing()), Ok(processed())]);
    let mut h = Harness::with(gateway, Arc::new(InMemoryCache::new()));
    let session = h.engine.select_document(doc(), None).await.unwrap();

    let started = Instant::now();
    let mut seen = Vec::new();
    let status = session
        .await_processed(|u| seen.push(u.clone()))
        .await
        .unwrap();

    assert_eq!(status.stage, ProcessingStage::Processed);
    assert_eq!(seen.len(), 3);
    assert_eq!(h.gateway.status_calls(), 3);
    assert_eq!(started.elapsed(), Duration::from_secs(2));
    assert_eq!(session.stage(), Stage::ScopePending);
}

#[tokio::test(start_paused = true)]
async fn test_error_status_stops_polling() {
    let gateway = FakeGateway::new();
    gateway.script_statuses(vec![
        Ok(processing()),
        Ok(proposal_flow::models::ProcessingStatus::new(
            ProcessingStage::Error,
            "unreadable PDF",
        )),
    ]);
    let mut h = Harness::with(gateway, Arc::new(InMemoryCache::new()));
    let session = h.engine.select_document(doc(), None).await.unwrap();

    let status = session.await_processed(|_| {}).await.unwrap();
    assert_eq!(status.stage, ProcessingStage::Error);
    assert_eq!(session.stage(), Stage::AwaitingProcessing);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.gateway.status_calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_transport_failures_back_off_and_recover() {
    let gateway = FakeGateway::new();
    gateway.script_statuses(vec![
        Err(RemoteError::network("refused")),
        Err(RemoteError::network("refused")),
        Ok(processed()),
    ]);
    let mut h = Harness::with(gateway, Arc::new(InMemoryCache::new()));
    let session = h.engine.select_document(doc(), None).await.unwrap();

    let started = Instant::now();
    let mut failures = Vec::new();
    session
        .await_processed(|u| {
            if let PollUpdate::TransportFailure { consecutive, .. } = u {
                failures.push(*consecutive);
            }
        })
        .await
        .unwrap();

    assert_eq!(failures, vec![1, 2]);
    // 1s after the first failure, 2s after the second.
    assert_eq!(started.elapsed(), Duration::from_secs(3));
    assert_eq!(session.stage(), Stage::ScopePending);
    assert!(session.snapshot().last_poll_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_watch_gives_up_after_failure_budget() {
    let gateway = FakeGateway::new();
    gateway.script_statuses((0..10).map(|_| Err(RemoteError::http(502, "bad gateway"))).collect());
    let mut h = Harness::with(gateway, Arc::new(InMemoryCache::new()));
    let session = h.engine.select_document(doc(), None).await.unwrap();

    let started = Instant::now();
    let err = session.await_processed(|_| {}).await.unwrap_err();
    assert!(matches!(err, WorkflowError::Transport(ref e) if e.code == "http_502"));
    assert_eq!(h.gateway.status_calls(), 4);
    assert_eq!(started.elapsed(), Duration::from_secs(1 + 2 + 4));
    assert!(session.snapshot().last_poll_error.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_watch_stops_when_session_is_retired() {
    let gateway = FakeGateway::new().with_idle_stage(ProcessingStage::Processing);
    let mut h = Harness::with(gateway, Arc::new(InMemoryCache::new()));
    let session = h.engine.select_document(doc(), None).await.unwrap();

    let watch = session.watch_status();
    let handle = tokio::spawn(watch.collect());
    tokio::time::sleep(Duration::from_millis(2500)).await;
    h.engine.select_document(other_doc(), None).await.unwrap();

    let updates = handle.await.unwrap();
    assert!(!updates.is_empty());
    let calls = h.gateway.status_calls();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.gateway.status_calls(), calls);
}

#[tokio::test(start_paused = true)]
async fn test_standalone_watch_first_poll_is_immediate() {
    let gateway = Arc::new(FakeGateway::new());
    let mut watch = StatusWatch::new(gateway.clone(), doc(), fast_options().poll);

    let started = Instant::now();
    let first = watch.next().await;
    assert!(matches!(first, Some(PollUpdate::Status(ref s)) if s.stage == ProcessingStage::Processed));
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert!(watch.next().await.is_none());
    assert_eq!(gateway.status_calls(), 1);
}
