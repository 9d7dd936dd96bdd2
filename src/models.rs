use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Emoji attached to plain form submits.
pub const DEFAULT_EMOJI: &str = "🩺";

/// A persisted report as returned by the remote table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub reporter: String,
    pub label: String,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub emoji: Option<String>,
}

impl Report {
    pub fn from_draft(id: i64, created_at: DateTime<Utc>, draft: &ReportDraft) -> Self {
        Self {
            id,
            created_at,
            reporter: draft.reporter.clone(),
            label: draft.label.clone(),
            detail: draft.detail.clone(),
            comment: draft.comment.clone(),
            emoji: draft.emoji.clone(),
        }
    }
}

/// A report the user wants to submit; not yet persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDraft {
    #[serde(default)]
    pub reporter: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}

impl ReportDraft {
    pub fn new(reporter: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            reporter: reporter.into(),
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = Some(emoji.into());
        self
    }

    /// Trims every field and turns blank optional fields into `None`.
    pub fn normalized(self) -> Self {
        Self {
            reporter: self.reporter.trim().to_string(),
            label: self.label.trim().to_string(),
            detail: non_blank(self.detail),
            comment: non_blank(self.comment),
            emoji: non_blank(self.emoji),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LabelCount {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DetailCount {
    pub detail: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct StatsResponse {
    pub total: usize,
    pub top_labels: Vec<LabelCount>,
    pub detail_counts: Vec<DetailCount>,
}

#[derive(Debug, Deserialize, Default)]
pub struct IndexQuery {
    pub notice: Option<String>,
    pub reporter: Option<String>,
}
