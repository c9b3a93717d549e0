//! Base sync and resumption

use std::sync::Arc;

use trs_core::domain::{ChangeKind, FeedStatus, PageToken};
use trs_core::ports::{FeedError, SinkError};

use crate::common::*;

#[tokio::test(start_paused = true)]
async fn test_empty_base_polls_from_marker_without_sink_calls() {
    let uri = feed("empty");
    let reader = Arc::new(ScriptedReader::new(uri.clone()).base_page(&[], Some(7)));
    let store = Arc::new(CountingStore::new());
    let sink = Arc::new(RecordingSink::new());

    let running = start(Arc::clone(&reader), store.clone(), Arc::clone(&sink));
    wait_for_change_calls(&reader, 1).await;
    let mut status = running.status.clone();
    status
        .wait_for(|s| *s == FeedStatus::Polling)
        .await
        .unwrap();

    assert_eq!(sink.attempts(), 0);
    assert_eq!(store.position(&uri).await, Some(seq(7)));
    assert_eq!(reader.change_calls()[0].0, Some(seq(7)));

    let report = running.stop().await;
    assert_eq!(report.status, FeedStatus::Stopped);
    assert_eq!(report.cursor, Some(seq(7)));
}

#[tokio::test(start_paused = true)]
async fn test_base_members_delivered_as_creations_at_marker() {
    let uri = feed("paged");
    let reader = Arc::new(
        ScriptedReader::new(uri.clone())
            .base_page(&["https://res.example.com/a", "https://res.example.com/b"], Some(3))
            .base_page(&["https://res.example.com/c"], None),
    );
    let store = Arc::new(CountingStore::new());
    let sink = Arc::new(RecordingSink::new());

    let running = start(Arc::clone(&reader), store.clone(), Arc::clone(&sink));
    wait_for_change_calls(&reader, 1).await;
    let report = running.stop().await;

    let applied = sink.applied();
    assert_eq!(applied.len(), 3);
    assert!(applied
        .iter()
        .all(|r| r.kind == ChangeKind::Creation && r.sequence_id == seq(3)));
    assert_eq!(applied[2].resource_uri.as_str(), "https://res.example.com/c");

    // second page requested with the first page's link
    assert_eq!(
        reader.base_calls(),
        vec![None, Some(PageToken::new("base-1").unwrap())]
    );
    // cursor saved once, after the whole base
    assert_eq!(store.saves(), vec![Some(seq(3))]);
    assert_eq!(report.cursor, Some(seq(3)));
}

#[tokio::test(start_paused = true)]
async fn test_base_without_cutoff_uses_zero_marker() {
    let uri = feed("nocutoff");
    let reader = Arc::new(
        ScriptedReader::new(uri.clone()).base_page(&["https://res.example.com/a"], None),
    );
    let store = Arc::new(CountingStore::new());
    let sink = Arc::new(RecordingSink::new());

    let running = start(Arc::clone(&reader), store.clone(), Arc::clone(&sink));
    wait_for_change_calls(&reader, 1).await;
    running.stop().await;

    assert_eq!(sink.applied_sequences(), vec![0]);
    assert_eq!(store.position(&uri).await, Some(seq(0)));
}

#[tokio::test(start_paused = true)]
async fn test_base_then_changes_with_overlapping_retry() {
    // base at 3, then [4,5], then the provider serves [4,5,6] again
    let uri = feed("scenario");
    let reader = Arc::new(
        ScriptedReader::new(uri.clone())
            .base_page(&["https://res.example.com/a"], Some(3))
            .then(Step::Page(vec![4, 5]))
            .then(Step::Page(vec![4, 5, 6])),
    );
    let store = Arc::new(CountingStore::new());
    let sink = Arc::new(RecordingSink::new());

    let running = start(Arc::clone(&reader), store.clone(), Arc::clone(&sink));
    wait_for_change_calls(&reader, 3).await;
    let report = running.stop().await;

    assert_eq!(sink.applied_sequences(), vec![3, 4, 5, 6]);
    assert_eq!(store.position(&uri).await, Some(seq(6)));
    assert_eq!(report.cursor, Some(seq(6)));

    let since: Vec<_> = reader.change_calls().into_iter().map(|(s, _)| s).collect();
    assert_eq!(since, vec![Some(seq(3)), Some(seq(5)), Some(seq(6))]);
}

#[tokio::test(start_paused = true)]
async fn test_stored_cursor_skips_base() {
    let uri = feed("resume");
    let reader = Arc::new(
        ScriptedReader::new(uri.clone())
            .base_page(&["https://res.example.com/a"], Some(1))
            .then(Step::Page(vec![11])),
    );
    let store = Arc::new(CountingStore::seeded(&uri, 10).await);
    let sink = Arc::new(RecordingSink::new());

    let running = start(Arc::clone(&reader), store.clone(), Arc::clone(&sink));
    wait_for_change_calls(&reader, 2).await;
    running.stop().await;

    assert!(reader.base_calls().is_empty());
    assert_eq!(sink.applied_sequences(), vec![11]);
}

#[tokio::test(start_paused = true)]
async fn test_sink_failure_during_base_restarts_base() {
    let uri = feed("rebase");
    let reader = Arc::new(
        ScriptedReader::new(uri.clone())
            .base_page(&["https://res.example.com/a"], Some(5))
            .base_page(&["https://res.example.com/a"], Some(5)),
    );
    let store = Arc::new(CountingStore::new());
    let sink = Arc::new(RecordingSink::failing(vec![SinkError::Permanent(
        "schema mismatch".into(),
    )]));

    let running = start(Arc::clone(&reader), store.clone(), Arc::clone(&sink));
    wait_for_change_calls(&reader, 1).await;
    let report = running.stop().await;

    // the failed base is not persisted; the second attempt goes through
    assert_eq!(reader.base_calls().len(), 2);
    assert_eq!(sink.applied_sequences(), vec![5]);
    assert_eq!(store.saves(), vec![Some(seq(5))]);
    assert_eq!(report.cursor, Some(seq(5)));
}

#[tokio::test(start_paused = true)]
async fn test_base_sink_failure_shows_degraded_until_base_applies() {
    let uri = feed("degraded-base");
    let reader = Arc::new(
        ScriptedReader::new(uri.clone())
            .base_page(&["https://res.example.com/a"], Some(9))
            .base_page(&["https://res.example.com/a"], Some(9)),
    );
    let store = Arc::new(CountingStore::new());
    let sink = Arc::new(RecordingSink::failing(vec![SinkError::Permanent(
        "target offline".into(),
    )]));

    let running = start(Arc::clone(&reader), store.clone(), Arc::clone(&sink));
    let mut status = running.status.clone();
    let degraded = status
        .wait_for(|s| matches!(s, FeedStatus::Degraded(_)))
        .await
        .unwrap()
        .clone();

    assert!(matches!(degraded, FeedStatus::Degraded(reason) if reason.contains("target offline")));
    assert!(store.saves().is_empty());
    assert_eq!(reader.base_calls().len(), 1);

    status
        .wait_for(|s| *s == FeedStatus::Polling)
        .await
        .unwrap();
    assert_eq!(store.saves(), vec![Some(seq(9))]);

    let report = running.stop().await;
    assert_eq!(report.status, FeedStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_base_auth_error_fails_feed() {
    let uri = feed("noauth");
    let reader = Arc::new(
        ScriptedReader::new(uri.clone()).base_error(FeedError::Unauthorized("bad password".into())),
    );
    let store = Arc::new(CountingStore::new());
    let sink = Arc::new(RecordingSink::new());

    let running = start(Arc::clone(&reader), store.clone(), Arc::clone(&sink));
    let report = running.handle.await.unwrap();

    assert!(matches!(report.status, FeedStatus::Failed(_)));
    assert_eq!(report.cursor, None);
    assert_eq!(report.cycles, 0);
    assert_eq!(reader.change_call_count(), 0);
    assert!(store.saves().is_empty());
}
