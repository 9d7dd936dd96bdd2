use crate::models::ReportDraft;
use crate::remote::{self, Column, Filter, Query, RemoteTable};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

pub const DEFAULT_RECENCY_WINDOW_SECS: u64 = 300;

/// Rejects drafts whose identity key was already reported within the window.
///
/// The identity key is reporter, label, detail and emoji. Absent fields only
/// match absent fields.
#[derive(Clone)]
pub struct DuplicateGuard {
    remote: Arc<dyn RemoteTable>,
    window: Duration,
}

impl DuplicateGuard {
    pub fn new(remote: Arc<dyn RemoteTable>, window_secs: u64) -> Self {
        let window_secs = i64::try_from(window_secs).unwrap_or(i64::MAX);
        Self {
            remote,
            window: Duration::try_seconds(window_secs).unwrap_or(Duration::MAX),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub async fn is_duplicate(&self, draft: &ReportDraft) -> remote::Result<bool> {
        self.is_duplicate_at(draft, Utc::now()).await
    }

    /// A failed lookup is returned as an error, never as "not a duplicate".
    pub async fn is_duplicate_at(
        &self,
        draft: &ReportDraft,
        now: DateTime<Utc>,
    ) -> remote::Result<bool> {
        let since = now.checked_sub_signed(self.window).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let matches = self.remote.query(&identity_query(draft, since)).await?;
        Ok(!matches.is_empty())
    }
}

fn identity_query(draft: &ReportDraft, since: DateTime<Utc>) -> Query {
    Query::latest(1)
        .filter(Filter::Eq(Column::Reporter, draft.reporter.clone()))
        .filter(Filter::Eq(Column::Label, draft.label.clone()))
        .filter(Filter::null_safe(Column::Detail, draft.detail.as_deref()))
        .filter(Filter::null_safe(Column::Emoji, draft.emoji.as_deref()))
        .filter(Filter::CreatedSince(since))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Report;
    use crate::remote::{MemoryTable, RemoteError};

    fn seeded(created_at: DateTime<Utc>, detail: Option<&str>) -> Arc<MemoryTable> {
        let record = Report {
            id: 1,
            created_at,
            reporter: "Ada".into(),
            label: "headache".into(),
            detail: detail.map(str::to_string),
            comment: None,
            emoji: Some("🩺".into()),
        };
        Arc::new(MemoryTable::with_records("reports", vec![record]))
    }

    fn draft() -> ReportDraft {
        ReportDraft::new("Ada", "headache").with_emoji("🩺")
    }

    #[tokio::test]
    async fn matching_report_inside_window_is_duplicate() {
        let now = Utc::now();
        let guard = DuplicateGuard::new(seeded(now - Duration::seconds(60), None), 300);
        assert!(guard.is_duplicate_at(&draft(), now).await.unwrap());
    }

    #[tokio::test]
    async fn matching_report_outside_window_is_not_duplicate() {
        let now = Utc::now();
        let guard = DuplicateGuard::new(seeded(now - Duration::seconds(301), None), 300);
        assert!(!guard.is_duplicate_at(&draft(), now).await.unwrap());
    }

    #[tokio::test]
    async fn absent_detail_does_not_match_present_detail() {
        let now = Utc::now();
        let guard = DuplicateGuard::new(seeded(now, Some("severe")), 300);
        assert!(!guard.is_duplicate_at(&draft(), now).await.unwrap());
        assert!(
            guard
                .is_duplicate_at(&draft().with_detail("severe"), now)
                .await
                .unwrap()
        );
        assert!(
            !guard
                .is_duplicate_at(&draft().with_detail("mild"), now)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn different_emoji_is_a_different_report() {
        let now = Utc::now();
        let guard = DuplicateGuard::new(seeded(now, None), 300);
        let other = ReportDraft::new("Ada", "headache").with_emoji("😊");
        assert!(!guard.is_duplicate_at(&other, now).await.unwrap());
    }

    #[tokio::test]
    async fn lookup_failure_is_an_error() {
        let table = seeded(Utc::now(), None);
        table.set_offline(true).await;
        let guard = DuplicateGuard::new(table, 300);
        assert!(matches!(
            guard.is_duplicate(&draft()).await,
            Err(RemoteError::Unavailable(_))
        ));
    }
}
