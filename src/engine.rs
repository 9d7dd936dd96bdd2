use crate::health::{ConnectionState, HealthAction, HealthEvent, HealthMachine};
use crate::models::Report;
use crate::presenter::Presenter;
use crate::remote::{
    self, ChangeEvent, ChannelMessage, ChannelStatus, Query, RemoteError, RemoteTable,
    Subscription,
};
use crate::snapshot::{ListSnapshot, LoadOutcome, LoadTicket, Reconciler, DEFAULT_CAPACITY};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_RECOVERY_CHECK_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub table: String,
    pub capacity: usize,
    pub poll_interval: Duration,
    pub recovery_check_interval: Duration,
    pub retry_backoff: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            table: "reports".to_string(),
            capacity: DEFAULT_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            recovery_check_interval: DEFAULT_RECOVERY_CHECK_INTERVAL,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}

/// What the status banner shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct SyncStatus {
    pub state: ConnectionState,
    pub last_error: Option<String>,
    pub last_loaded_at: Option<DateTime<Utc>>,
    pub loads_issued: u64,
}

enum Event {
    LocalInsert(Report),
    ReloadRequested,
    Push { generation: u64, message: ChannelMessage },
    PushEnded { generation: u64 },
    Loaded { ticket: LoadTicket, result: remote::Result<Vec<Report>> },
    Probed(remote::Result<()>),
    SubscribeFinished {
        generation: u64,
        result: remote::Result<Subscription>,
    },
    RetryElapsed,
}

/// Cloneable view of a running engine.
#[derive(Clone)]
pub struct SyncHandle {
    events: mpsc::UnboundedSender<Event>,
    snapshot: watch::Receiver<Arc<ListSnapshot>>,
    status: watch::Receiver<SyncStatus>,
}

impl SyncHandle {
    pub fn snapshot(&self) -> Arc<ListSnapshot> {
        Arc::clone(&self.snapshot.borrow())
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<Arc<ListSnapshot>> {
        self.snapshot.clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    /// Merges a record this client just inserted. Returns false once the
    /// engine has stopped.
    pub fn record_inserted(&self, report: Report) -> bool {
        self.events.send(Event::LocalInsert(report)).is_ok()
    }

    pub fn reload(&self) -> bool {
        self.events.send(Event::ReloadRequested).is_ok()
    }

    /// Renders the current snapshot now and after every change until the
    /// engine stops.
    pub fn attach<P: Presenter>(&self, presenter: Arc<P>) -> JoinHandle<()> {
        let mut snapshots = self.watch_snapshot();
        tokio::spawn(async move {
            loop {
                let snapshot = Arc::clone(&snapshots.borrow_and_update());
                presenter.render(&snapshot);
                if snapshots.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}

pub struct SyncEngine {
    handle: SyncHandle,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SyncEngine {
    /// Spawns the engine on the current tokio runtime and begins connecting.
    pub fn start(remote: Arc<dyn RemoteTable>, settings: SyncSettings) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) =
            watch::channel(Arc::new(ListSnapshot::with_capacity(settings.capacity)));
        let (status_tx, status_rx) = watch::channel(SyncStatus::default());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let worker = Worker {
            reconciler: Reconciler::new(settings.capacity),
            health: HealthMachine::new(),
            status: SyncStatus::default(),
            remote,
            settings,
            events: events_tx.clone(),
            snapshot_tx,
            status_tx,
            tasks: JoinSet::new(),
            generation: 0,
            forwarder: None,
        };
        let task = tokio::spawn(worker.run(events_rx, shutdown_rx));

        Self {
            handle: SyncHandle {
                events: events_tx,
                snapshot: snapshot_rx,
                status: status_rx,
            },
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    pub fn handle(&self) -> SyncHandle {
        self.handle.clone()
    }

    /// Stops timers, the push forwarder and all in-flight remote calls.
    pub async fn stop(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!("sync engine task ended abnormally: {err}");
            }
        }
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

struct Worker {
    remote: Arc<dyn RemoteTable>,
    settings: SyncSettings,
    reconciler: Reconciler,
    health: HealthMachine,
    status: SyncStatus,
    events: mpsc::UnboundedSender<Event>,
    snapshot_tx: watch::Sender<Arc<ListSnapshot>>,
    status_tx: watch::Sender<SyncStatus>,
    tasks: JoinSet<()>,
    generation: u64,
    forwarder: Option<JoinHandle<()>>,
}

impl Worker {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<Event>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let mut poll = interval_at(
            Instant::now() + self.settings.poll_interval,
            self.settings.poll_interval,
        );
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut recovery = interval_at(
            Instant::now() + self.settings.recovery_check_interval,
            self.settings.recovery_check_interval,
        );
        recovery.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(table = %self.settings.table, "sync engine started");
        self.on_health(HealthEvent::Start);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(event) = events.recv() => self.handle(event),
                _ = poll.tick() => self.issue_load("poll"),
                _ = recovery.tick() => self.on_health(HealthEvent::RecoveryCheck),
                Some(_) = self.tasks.join_next(), if !self.tasks.is_empty() => {}
            }
        }

        self.drop_subscription();
        self.tasks.shutdown().await;
        info!("sync engine stopped");
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::LocalInsert(report) => self.merge_insert(report),
            Event::ReloadRequested => self.issue_load("requested"),
            Event::Push { generation, message } if generation == self.generation => {
                self.on_push(message)
            }
            Event::PushEnded { generation } if generation == self.generation => {
                warn!("push channel ended");
                self.drop_subscription();
                self.on_health(HealthEvent::ChannelLost);
            }
            Event::Push { .. } | Event::PushEnded { .. } => {}
            Event::Loaded { ticket, result } => self.on_loaded(ticket, result),
            Event::Probed(Ok(())) => self.on_health(HealthEvent::ProbeSucceeded),
            Event::Probed(Err(err)) => {
                warn!("remote table probe failed: {err}");
                self.status.last_error = Some(err.to_string());
                self.on_health(HealthEvent::ProbeFailed);
            }
            Event::SubscribeFinished { generation, .. } if generation != self.generation => {
                debug!("discarded abandoned subscription");
            }
            Event::SubscribeFinished { result: Ok(subscription), .. } => self.forward(subscription),
            Event::SubscribeFinished { result: Err(err), .. } => {
                match err {
                    RemoteError::Unsupported(_) => debug!("push channel unavailable: {err}"),
                    _ => warn!("subscribe failed: {err}"),
                }
                self.on_health(HealthEvent::ChannelLost);
            }
            Event::RetryElapsed => self.on_health(HealthEvent::RetryElapsed),
        }
    }

    fn on_push(&mut self, message: ChannelMessage) {
        match message {
            ChannelMessage::Status(ChannelStatus::Subscribed) => {
                self.on_health(HealthEvent::Subscribed)
            }
            ChannelMessage::Status(status) => {
                warn!(?status, "push channel lost");
                self.drop_subscription();
                self.on_health(HealthEvent::ChannelLost);
            }
            ChannelMessage::Change(ChangeEvent::Insert(report)) => self.merge_insert(report),
            ChannelMessage::Change(ChangeEvent::Update(report)) => {
                if self.reconciler.apply_update(report) {
                    self.publish_snapshot();
                }
            }
            ChannelMessage::Change(ChangeEvent::Delete { .. }) => self.issue_load("delete"),
        }
    }

    fn on_health(&mut self, event: HealthEvent) {
        let before = self.health.state();
        let actions = self.health.handle(event);
        let after = self.health.state();
        if before != after {
            info!(from = before.as_str(), to = after.as_str(), "connection state changed");
        }
        self.status.state = after;
        self.publish_status();

        for action in actions {
            match action {
                HealthAction::Probe => self.spawn_probe(),
                HealthAction::Subscribe => self.spawn_subscribe(),
                HealthAction::ScheduleRetry => self.spawn_retry(),
                HealthAction::Reload => self.issue_load("reconnect"),
                HealthAction::DropChannel => {
                    warn!("push channel never acknowledged, continuing on the poll");
                    self.drop_subscription();
                }
            }
        }
    }

    fn merge_insert(&mut self, report: Report) {
        let id = report.id;
        if self.reconciler.apply_insert(report) {
            debug!(id, "merged inserted report");
            self.publish_snapshot();
        }
    }

    fn issue_load(&mut self, reason: &'static str) {
        let ticket = self.reconciler.begin_load();
        debug!(seq = ticket.seq(), reason, "bulk load issued");
        self.status.loads_issued += 1;
        self.publish_status();

        let remote = Arc::clone(&self.remote);
        let events = self.events.clone();
        let query = Query::latest(self.settings.capacity);
        self.tasks.spawn(async move {
            let result = remote.query(&query).await;
            let _ = events.send(Event::Loaded { ticket, result });
        });
    }

    fn on_loaded(&mut self, ticket: LoadTicket, result: remote::Result<Vec<Report>>) {
        match result {
            Ok(records) => match self.reconciler.apply_load(ticket, records) {
                LoadOutcome::Applied => {
                    debug!(seq = ticket.seq(), "bulk load applied");
                    self.status.last_loaded_at = Some(Utc::now());
                    self.status.last_error = None;
                    self.publish_snapshot();
                    self.publish_status();
                }
                LoadOutcome::Stale => debug!(seq = ticket.seq(), "discarded stale bulk load"),
            },
            Err(err) => {
                warn!(seq = ticket.seq(), "bulk load failed: {err}");
                self.status.last_error = Some(err.to_string());
                self.publish_status();
            }
        }
    }

    fn spawn_probe(&mut self) {
        let remote = Arc::clone(&self.remote);
        let events = self.events.clone();
        self.tasks.spawn(async move {
            let result = remote.probe().await;
            let _ = events.send(Event::Probed(result));
        });
    }

    fn spawn_subscribe(&mut self) {
        self.drop_subscription();
        let remote = Arc::clone(&self.remote);
        let events = self.events.clone();
        let table = self.settings.table.clone();
        let generation = self.generation;
        self.tasks.spawn(async move {
            let result = remote.subscribe(&table).await;
            let _ = events.send(Event::SubscribeFinished { generation, result });
        });
    }

    fn spawn_retry(&mut self) {
        let events = self.events.clone();
        let backoff = self.settings.retry_backoff;
        debug!(?backoff, "scheduling reconnect");
        self.tasks.spawn(async move {
            sleep(backoff).await;
            let _ = events.send(Event::RetryElapsed);
        });
    }

    fn forward(&mut self, mut subscription: Subscription) {
        self.drop_subscription();
        let generation = self.generation;
        let events = self.events.clone();
        self.forwarder = Some(tokio::spawn(async move {
            while let Some(message) = subscription.recv().await {
                if events.send(Event::Push { generation, message }).is_err() {
                    return;
                }
            }
            let _ = events.send(Event::PushEnded { generation });
        }));
    }

    /// Forgets the current push channel; anything it still delivers is ignored.
    fn drop_subscription(&mut self) {
        self.generation += 1;
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }

    fn publish_snapshot(&self) {
        self.snapshot_tx
            .send_replace(Arc::new(self.reconciler.snapshot().clone()));
    }

    fn publish_status(&self) {
        let status = &self.status;
        self.status_tx.send_if_modified(|current| {
            if current == status {
                return false;
            }
            *current = status.clone();
            true
        });
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }
}
