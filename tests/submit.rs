use chrono::{Duration as ChronoDuration, Utc};
use report_feed::{
    ConnectionState, DuplicateGuard, MemoryTable, Rejection, RemoteTable, Report, ReportDraft,
    Submitter, SyncEngine, SyncSettings,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

fn submitter(table: &Arc<MemoryTable>) -> Submitter {
    let remote: Arc<dyn RemoteTable> = Arc::clone(table) as Arc<dyn RemoteTable>;
    Submitter::new(Arc::clone(&remote), DuplicateGuard::new(remote, 300))
}

fn draft() -> ReportDraft {
    ReportDraft::new("Ada", "Headache")
        .with_detail("3")
        .with_emoji("🤒")
}

#[tokio::test]
async fn identical_drafts_within_window_persist_once() {
    let table = Arc::new(MemoryTable::new("reports"));
    let submitter = submitter(&table);

    let first = submitter.submit(draft()).await.unwrap();
    assert_eq!(first.reporter, "Ada");

    let second = submitter.submit(draft().with_comment("again")).await;
    assert!(matches!(second, Err(Rejection::DuplicateDetected)));
    assert_eq!(table.len().await, 1);
}

#[tokio::test]
async fn identical_drafts_outside_window_persist_twice() {
    let earlier = Report {
        id: 1,
        created_at: Utc::now() - ChronoDuration::minutes(6),
        reporter: "Ada".into(),
        label: "Headache".into(),
        detail: Some("3".into()),
        comment: None,
        emoji: Some("🤒".into()),
    };
    let table = Arc::new(MemoryTable::with_records("reports", vec![earlier]));
    let submitter = submitter(&table);

    let report = submitter.submit(draft()).await.unwrap();
    assert_eq!(report.id, 2);
    assert_eq!(table.len().await, 2);
}

#[tokio::test]
async fn concurrent_identical_submissions_persist_once() {
    let table = Arc::new(MemoryTable::new("reports"));
    let submitter = Arc::new(submitter(&table));

    let (a, b) = tokio::join!(submitter.submit(draft()), submitter.submit(draft()));
    assert!(a.is_ok() != b.is_ok());
    assert_eq!(table.len().await, 1);
}

#[tokio::test]
async fn drafts_differing_only_in_absent_detail_are_distinct() {
    let table = Arc::new(MemoryTable::new("reports"));
    let submitter = submitter(&table);

    submitter.submit(draft()).await.unwrap();
    let without_detail = ReportDraft::new("Ada", "Headache").with_emoji("🤒");
    submitter.submit(without_detail.clone()).await.unwrap();
    assert!(matches!(
        submitter.submit(without_detail).await,
        Err(Rejection::DuplicateDetected)
    ));
    assert_eq!(table.len().await, 2);
}

#[tokio::test]
async fn missing_fields_are_rejected_before_any_remote_call() {
    let table = Arc::new(MemoryTable::new("reports"));
    table.set_offline(true).await;
    let submitter = submitter(&table);

    assert!(matches!(
        submitter.submit(ReportDraft::new("", "Headache")).await,
        Err(Rejection::MissingRequiredField("reporter"))
    ));
    assert!(matches!(
        submitter.submit(ReportDraft::new("Ada", " ")).await,
        Err(Rejection::MissingRequiredField("label"))
    ));
}

#[tokio::test]
async fn failed_duplicate_check_rejects_without_inserting() {
    let table = Arc::new(MemoryTable::new("reports"));
    table.set_offline(true).await;
    let submitter = submitter(&table);

    assert!(matches!(
        submitter.submit(draft()).await,
        Err(Rejection::DuplicateCheckFailed(_))
    ));

    table.set_offline(false).await;
    assert!(table.is_empty().await);
}

#[tokio::test]
async fn submitted_report_reaches_the_engine_snapshot() {
    let table = Arc::new(MemoryTable::new("reports"));
    let remote: Arc<dyn RemoteTable> = Arc::clone(&table) as Arc<dyn RemoteTable>;
    let engine = SyncEngine::start(Arc::clone(&remote), SyncSettings::default());
    let handle = engine.handle();
    let submitter = Submitter::new(Arc::clone(&remote), DuplicateGuard::new(remote, 300))
        .with_sync(handle.clone());

    let report = submitter.submit(draft()).await.unwrap();

    let mut snapshots = handle.watch_snapshot();
    timeout(Duration::from_secs(5), async {
        loop {
            if snapshots.borrow_and_update().contains(report.id) {
                break;
            }
            snapshots.changed().await.unwrap();
        }
    })
    .await
    .expect("inserted report should be merged");

    assert_eq!(
        handle
            .snapshot()
            .iter()
            .filter(|r| r.id == report.id)
            .count(),
        1
    );
    assert_ne!(handle.status().state, ConnectionState::Disconnected);
    engine.stop().await;
}
