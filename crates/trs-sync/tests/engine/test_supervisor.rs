//! Multi-feed supervision

use std::sync::Arc;

use trs_core::domain::{FeedStatus, SyncError};
use trs_core::ports::{FeedError, ICursorStore, IFeedReader};
use trs_sync::SyncSupervisor;

use crate::common::*;

fn readers(list: &[&Arc<ScriptedReader>]) -> Vec<Arc<dyn IFeedReader>> {
    list.iter()
        .map(|r| Arc::clone(*r) as Arc<dyn IFeedReader>)
        .collect()
}

#[tokio::test]
async fn test_duplicate_feed_rejected() {
    let a = Arc::new(ScriptedReader::new(feed("a")));
    let again = Arc::new(ScriptedReader::new(feed("a")));
    let store: Arc<dyn ICursorStore> = Arc::new(CountingStore::new());

    let result = SyncSupervisor::spawn(
        readers(&[&a, &again]),
        store,
        Arc::new(RecordingSink::new()),
        settings(),
    );

    assert!(matches!(result, Err(SyncError::InvalidConfiguration(_))));
    assert!(a.base_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_feeds_run_independently_and_shut_down() {
    let good = Arc::new(ScriptedReader::new(feed("good")).then(Step::Page(vec![1, 2])));
    let bad = Arc::new(
        ScriptedReader::new(feed("bad")).then(Step::Fail(FeedError::Unauthorized("401".into()))),
    );
    let store = Arc::new(CountingStore::seeded(&feed("good"), 0).await);
    store.save_at(&feed("bad"), 0).await;
    let sink = Arc::new(RecordingSink::new());

    let mut supervisor = SyncSupervisor::spawn(
        readers(&[&good, &bad]),
        store.clone(),
        sink.clone(),
        settings(),
    )
    .unwrap();

    let failed = supervisor.next_report().await.unwrap();
    assert_eq!(failed.feed_uri, feed("bad"));
    assert!(matches!(failed.status, FeedStatus::Failed(_)));

    wait_for_change_calls(&good, 1).await;
    assert_eq!(supervisor.status(&feed("good")), Some(FeedStatus::Polling));
    assert!(matches!(
        supervisor.status(&feed("bad")),
        Some(FeedStatus::Failed(_))
    ));

    let reports = supervisor.shutdown().await;
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].feed_uri, feed("bad"));
    assert_eq!(reports[1].feed_uri, feed("good"));
    assert_eq!(reports[1].status, FeedStatus::Stopped);
    assert_eq!(reports[1].cursor, Some(seq(2)));
    assert_eq!(sink.applied_sequences(), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_nudge_and_stop_single_feed() {
    let one = Arc::new(ScriptedReader::new(feed("one")));
    let two = Arc::new(ScriptedReader::new(feed("two")));
    let store = Arc::new(CountingStore::seeded(&feed("one"), 0).await);
    store.save_at(&feed("two"), 0).await;

    let mut supervisor = SyncSupervisor::spawn(
        readers(&[&one, &two]),
        store,
        Arc::new(RecordingSink::new()),
        settings(),
    )
    .unwrap();
    wait_for_change_calls(&one, 1).await;
    wait_for_change_calls(&two, 1).await;

    assert!(supervisor.nudge(&feed("one")));
    assert!(!supervisor.nudge(&feed("unknown")));
    wait_for_change_calls(&one, 2).await;
    assert_eq!(two.change_call_count(), 1);

    assert!(supervisor.stop(&feed("two")));
    let stopped = supervisor.next_report().await.unwrap();
    assert_eq!(stopped.feed_uri, feed("two"));
    assert_eq!(stopped.status, FeedStatus::Stopped);
    assert_eq!(supervisor.status(&feed("one")), Some(FeedStatus::Polling));

    let statuses = supervisor.statuses();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[&feed("two")], FeedStatus::Stopped);

    let reports = supervisor.shutdown().await;
    assert!(reports.iter().all(|r| r.status == FeedStatus::Stopped));
}
