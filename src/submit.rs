use crate::engine::SyncHandle;
use crate::guard::DuplicateGuard;
use crate::models::{Report, ReportDraft};
use crate::remote::{RemoteError, RemoteTable};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Why a draft was not persisted. None of these are retried automatically.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("missing required field: {0}")]
    MissingRequiredField(&'static str),

    #[error("the same report was already submitted recently")]
    DuplicateDetected,

    #[error("could not check for duplicate reports: {0}")]
    DuplicateCheckFailed(#[source] RemoteError),

    #[error("could not save the report: {0}")]
    RemoteInsertFailed(#[source] RemoteError),
}

/// Entry point for new reports: validate, guard, insert, then hand the
/// stored record to the sync engine.
pub struct Submitter {
    remote: Arc<dyn RemoteTable>,
    guard: DuplicateGuard,
    sync: Option<SyncHandle>,
    // Check-then-insert must not interleave between submissions.
    gate: Mutex<()>,
}

impl Submitter {
    pub fn new(remote: Arc<dyn RemoteTable>, guard: DuplicateGuard) -> Self {
        Self {
            remote,
            guard,
            sync: None,
            gate: Mutex::new(()),
        }
    }

    pub fn with_sync(mut self, sync: SyncHandle) -> Self {
        self.sync = Some(sync);
        self
    }

    pub async fn submit(&self, draft: ReportDraft) -> Result<Report, Rejection> {
        let draft = validate(draft)?;
        let _gate = self.gate.lock().await;

        match self.guard.is_duplicate(&draft).await {
            Ok(false) => {}
            Ok(true) => {
                info!(reporter = %draft.reporter, label = %draft.label, "duplicate report rejected");
                return Err(Rejection::DuplicateDetected);
            }
            Err(err) => {
                warn!("duplicate check failed: {err}");
                return Err(Rejection::DuplicateCheckFailed(err));
            }
        }

        let report = self.remote.insert(&draft).await.map_err(|err| {
            warn!("report insert failed: {err}");
            Rejection::RemoteInsertFailed(err)
        })?;
        info!(id = report.id, "report submitted");

        if let Some(sync) = &self.sync {
            sync.record_inserted(report.clone());
        }
        Ok(report)
    }
}

pub fn validate(draft: ReportDraft) -> Result<ReportDraft, Rejection> {
    let draft = draft.normalized();
    if draft.reporter.is_empty() {
        return Err(Rejection::MissingRequiredField("reporter"));
    }
    if draft.label.is_empty() {
        return Err(Rejection::MissingRequiredField("label"));
    }
    Ok(draft)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_requires_reporter_and_label() {
        assert!(matches!(
            validate(ReportDraft::new("  ", "cough")),
            Err(Rejection::MissingRequiredField("reporter"))
        ));
        assert!(matches!(
            validate(ReportDraft::new("Ada", "")),
            Err(Rejection::MissingRequiredField("label"))
        ));
        let draft = validate(ReportDraft::new(" Ada ", "cough").with_comment(" ")).unwrap();
        assert_eq!(draft.reporter, "Ada");
        assert_eq!(draft.comment, None);
    }
}
