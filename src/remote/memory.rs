use super::{
    ChangeEvent, ChannelMessage, ChannelStatus, Query, RemoteError, RemoteTable, Result,
    Subscription,
};
use crate::models::{Report, ReportDraft};
use crate::storage::{load_records, persist_records, TableData};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

const CHANNEL_BUFFER: usize = 256;

/// In-process table with a push channel, optionally persisted as JSON.
///
/// `set_offline` and `close_channels` simulate outages of the hosted store.
pub struct MemoryTable {
    name: String,
    data_path: Option<PathBuf>,
    offline: AtomicBool,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    records: Vec<Report>,
    next_id: i64,
    last_created: Option<DateTime<Utc>>,
    subscribers: Vec<mpsc::Sender<ChannelMessage>>,
}

impl Inner {
    fn seeded(mut records: Vec<Report>) -> Self {
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let next_id = records.iter().map(|r| r.id).max().unwrap_or(0) + 1;
        let last_created = records.last().map(|r| r.created_at);
        Self {
            records,
            next_id,
            last_created,
            subscribers: Vec::new(),
        }
    }

    fn broadcast(&mut self, message: ChannelMessage) {
        self.subscribers.retain(|tx| match tx.try_send(message.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("push subscriber lagging, dropping change event");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    fn snapshot(&self) -> TableData {
        TableData {
            records: self.records.clone(),
        }
    }
}

impl MemoryTable {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_records(name, Vec::new())
    }

    pub fn with_records(name: impl Into<String>, records: Vec<Report>) -> Self {
        Self {
            name: name.into(),
            data_path: None,
            offline: AtomicBool::new(false),
            inner: Mutex::new(Inner::seeded(records)),
        }
    }

    /// Opens a table persisted at `path`, starting empty if the file is missing.
    pub async fn open(name: impl Into<String>, path: &Path) -> Self {
        let data = load_records(path).await;
        let mut table = Self::with_records(name, data.records);
        table.data_path = Some(path.to_path_buf());
        table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn records(&self) -> Vec<Report> {
        self.inner.lock().await.records.clone()
    }

    /// While offline every operation fails and open channels report an error.
    pub async fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
        if offline {
            let mut inner = self.inner.lock().await;
            inner.broadcast(ChannelMessage::Status(ChannelStatus::ChannelError));
            inner.subscribers.clear();
        }
    }

    /// Drops every push subscriber after telling it the channel closed.
    pub async fn close_channels(&self) {
        let mut inner = self.inner.lock().await;
        inner.broadcast(ChannelMessage::Status(ChannelStatus::Closed));
        inner.subscribers.clear();
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        self.ensure_online()?;
        let mut inner = self.inner.lock().await;
        let Some(index) = inner.records.iter().position(|r| r.id == id) else {
            return Ok(false);
        };
        let removed = inner.records.remove(index);
        if let Err(err) = self.persist(&inner).await {
            inner.records.insert(index, removed);
            return Err(err);
        }
        // Delete notifications carry no usable id.
        inner.broadcast(ChannelMessage::Change(ChangeEvent::Delete { id: None }));
        Ok(true)
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable(format!("table `{}` is offline", self.name)));
        }
        Ok(())
    }

    async fn persist(&self, inner: &Inner) -> Result<()> {
        if let Some(path) = &self.data_path {
            persist_records(path, &inner.snapshot()).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteTable for MemoryTable {
    async fn insert(&self, draft: &ReportDraft) -> Result<Report> {
        self.ensure_online()?;
        let mut inner = self.inner.lock().await;

        let now = Utc::now();
        let created_at = match inner.last_created {
            Some(last) if last > now => last,
            _ => now,
        };
        let report = Report::from_draft(inner.next_id, created_at, draft);
        inner.records.push(report.clone());

        if let Err(err) = self.persist(&inner).await {
            inner.records.pop();
            return Err(err);
        }

        inner.next_id += 1;
        inner.last_created = Some(created_at);
        debug!(id = report.id, table = %self.name, "inserted report");
        inner.broadcast(ChannelMessage::Change(ChangeEvent::Insert(report.clone())));
        Ok(report)
    }

    async fn query(&self, query: &Query) -> Result<Vec<Report>> {
        self.ensure_online()?;
        let inner = self.inner.lock().await;
        Ok(inner
            .records
            .iter()
            .rev()
            .filter(|r| query.matches(r))
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn subscribe(&self, table: &str) -> Result<Subscription> {
        self.ensure_online()?;
        if table != self.name {
            return Err(RemoteError::api(404, format!("unknown table `{table}`")));
        }

        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
        tx.try_send(ChannelMessage::Status(ChannelStatus::Subscribed))
            .map_err(|_| RemoteError::Unavailable("subscriber closed".into()))?;
        self.inner.lock().await.subscribers.push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::Filter;
    use crate::remote::Column;

    #[tokio::test]
    async fn insert_assigns_increasing_ids_and_timestamps() {
        let table = MemoryTable::new("reports");
        let a = table.insert(&ReportDraft::new("Ada", "cough")).await.unwrap();
        let b = table.insert(&ReportDraft::new("Bo", "fever")).await.unwrap();

        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert!(b.created_at >= a.created_at);

        let latest = table.query(&Query::latest(10)).await.unwrap();
        let ids: Vec<i64> = latest.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[tokio::test]
    async fn query_applies_filters_and_limit() {
        let table = MemoryTable::new("reports");
        for name in ["Ada", "Bo", "Ada"] {
            table.insert(&ReportDraft::new(name, "cough")).await.unwrap();
        }

        let query = Query::latest(1).filter(Filter::Eq(Column::Reporter, "Ada".into()));
        let found = table.query(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 3);
    }

    #[tokio::test]
    async fn subscribers_receive_ack_then_changes() {
        let table = MemoryTable::new("reports");
        let mut sub = table.subscribe("reports").await.unwrap();
        assert_eq!(
            sub.recv().await,
            Some(ChannelMessage::Status(ChannelStatus::Subscribed))
        );

        let report = table.insert(&ReportDraft::new("Ada", "cough")).await.unwrap();
        assert_eq!(
            sub.recv().await,
            Some(ChannelMessage::Change(ChangeEvent::Insert(report.clone())))
        );

        table.delete(report.id).await.unwrap();
        assert_eq!(
            sub.recv().await,
            Some(ChannelMessage::Change(ChangeEvent::Delete { id: None }))
        );

        table.close_channels().await;
        assert_eq!(
            sub.recv().await,
            Some(ChannelMessage::Status(ChannelStatus::Closed))
        );
        assert_eq!(sub.recv().await, None);
    }

    #[tokio::test]
    async fn offline_table_rejects_operations() {
        let table = MemoryTable::new("reports");
        table.set_offline(true).await;
        assert!(matches!(
            table.probe().await,
            Err(RemoteError::Unavailable(_))
        ));
        assert!(table.insert(&ReportDraft::new("Ada", "cough")).await.is_err());
        assert!(table.subscribe("reports").await.is_err());

        table.set_offline(false).await;
        assert!(table.probe().await.is_ok());
    }

    #[tokio::test]
    async fn subscribe_to_unknown_table_fails() {
        let table = MemoryTable::new("reports");
        assert!(matches!(
            table.subscribe("moods").await,
            Err(RemoteError::Api { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn open_round_trips_through_data_file() {
        let path = std::env::temp_dir().join(format!(
            "report_feed_memory_{}_{}.json",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));

        let table = MemoryTable::open("reports", &path).await;
        table.insert(&ReportDraft::new("Ada", "cough")).await.unwrap();

        let reopened = MemoryTable::open("reports", &path).await;
        assert_eq!(reopened.len().await, 1);
        let next = reopened.insert(&ReportDraft::new("Bo", "fever")).await.unwrap();
        assert_eq!(next.id, 2);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn failed_persist_leaves_records_unchanged() {
        let blocker = std::env::temp_dir().join(format!(
            "report_feed_blocker_{}_{}",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        std::fs::write(&blocker, b"not a directory").unwrap();

        let mut table = MemoryTable::new("reports");
        let kept = table.insert(&ReportDraft::new("Ada", "cough")).await.unwrap();
        table.data_path = Some(blocker.join("reports.json"));
        let mut sub = table.subscribe("reports").await.unwrap();
        sub.recv().await;

        assert!(table.delete(kept.id).await.is_err());
        assert!(table.insert(&ReportDraft::new("Bo", "fever")).await.is_err());
        assert_eq!(table.records().await, vec![kept]);
        assert!(sub.try_recv().is_err());

        let _ = std::fs::remove_file(&blocker);
    }
}
