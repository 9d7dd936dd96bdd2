mod memory;
mod rest;

pub use memory::MemoryTable;
pub use rest::RestTable;

use crate::models::{Report, ReportDraft};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;

pub type Result<T> = std::result::Result<T, RemoteError>;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote table unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl RemoteError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }
}

/// Filterable report columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Reporter,
    Label,
    Detail,
    Emoji,
}

impl Column {
    pub fn as_str(self) -> &'static str {
        match self {
            Column::Reporter => "reporter",
            Column::Label => "label",
            Column::Detail => "detail",
            Column::Emoji => "emoji",
        }
    }

    pub fn value(self, report: &Report) -> Option<&str> {
        match self {
            Column::Reporter => Some(report.reporter.as_str()),
            Column::Label => Some(report.label.as_str()),
            Column::Detail => report.detail.as_deref(),
            Column::Emoji => report.emoji.as_deref(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq(Column, String),
    IsNull(Column),
    CreatedSince(DateTime<Utc>),
}

impl Filter {
    /// Null-safe equality: `Some(v)` compares by value, `None` only matches null.
    pub fn null_safe(column: Column, value: Option<&str>) -> Self {
        match value {
            Some(value) => Filter::Eq(column, value.to_string()),
            None => Filter::IsNull(column),
        }
    }

    pub fn matches(&self, report: &Report) -> bool {
        match self {
            Filter::Eq(column, value) => column.value(report) == Some(value.as_str()),
            Filter::IsNull(column) => column.value(report).is_none(),
            Filter::CreatedSince(since) => report.created_at >= *since,
        }
    }
}

/// A select ordered by `created_at` descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub limit: usize,
}

impl Query {
    pub fn latest(limit: usize) -> Self {
        Self {
            filters: Vec::new(),
            limit,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn matches(&self, report: &Report) -> bool {
        self.filters.iter().all(|filter| filter.matches(report))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Subscribed,
    ChannelError,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Insert(Report),
    Update(Report),
    /// Delete payloads are not guaranteed to carry the removed id.
    Delete { id: Option<i64> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    Status(ChannelStatus),
    Change(ChangeEvent),
}

/// Push channel for one table. The first message is the subscribe ack.
pub type Subscription = mpsc::Receiver<ChannelMessage>;

#[async_trait]
pub trait RemoteTable: Send + Sync + 'static {
    async fn insert(&self, draft: &ReportDraft) -> Result<Report>;

    async fn query(&self, query: &Query) -> Result<Vec<Report>>;

    async fn subscribe(&self, table: &str) -> Result<Subscription>;

    /// Cheap existence check used before (re)subscribing.
    async fn probe(&self) -> Result<()> {
        self.query(&Query::latest(1)).await.map(|_| ())
    }
}
