use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Table reachable, push channel down; the poll keeps the list fresh.
    Degraded,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Degraded => "degraded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthEvent {
    Start,
    RetryElapsed,
    ProbeSucceeded,
    ProbeFailed,
    /// The push channel acknowledged the subscription.
    Subscribed,
    /// Subscribe failed, or the channel reported an error or closed.
    ChannelLost,
    RecoveryCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthAction {
    Probe,
    Subscribe,
    ScheduleRetry,
    Reload,
    /// Give up on the pending subscription and ignore anything it delivers.
    DropChannel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pending {
    Probe,
    Subscribe,
    // Still unacknowledged at one recovery check; the next one gives up.
    SubscribeOverdue,
}

#[derive(Debug, Default)]
pub struct HealthMachine {
    state: ConnectionState,
    pending: Option<Pending>,
}

impl HealthMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn handle(&mut self, event: HealthEvent) -> Vec<HealthAction> {
        use ConnectionState::*;
        use HealthEvent::*;

        match (self.state, event) {
            (Disconnected, Start | RetryElapsed) => {
                self.state = Connecting;
                self.request(Pending::Probe)
            }

            // The first load does not wait for the push channel.
            (Connecting, ProbeSucceeded) if self.pending == Some(Pending::Probe) => {
                let mut actions = self.request(Pending::Subscribe);
                actions.push(HealthAction::Reload);
                actions
            }
            (Degraded, ProbeSucceeded) if self.pending == Some(Pending::Probe) => {
                self.request(Pending::Subscribe)
            }
            (Connecting | Degraded, ProbeFailed) if self.pending == Some(Pending::Probe) => {
                self.pending = None;
                self.state = Disconnected;
                vec![HealthAction::ScheduleRetry]
            }

            (Connecting | Degraded, Subscribed) if self.awaiting_ack() => {
                self.pending = None;
                self.state = Connected;
                vec![HealthAction::Reload]
            }

            // Probe passed but no push channel: serve from the poll.
            (Connecting | Degraded, ChannelLost) if self.awaiting_ack() => {
                self.pending = None;
                self.state = Degraded;
                Vec::new()
            }
            (Connected, ChannelLost) => {
                self.state = Degraded;
                Vec::new()
            }

            (Connecting | Degraded, RecoveryCheck) if self.pending == Some(Pending::Subscribe) => {
                self.pending = Some(Pending::SubscribeOverdue);
                Vec::new()
            }
            (Connecting | Degraded, RecoveryCheck)
                if self.pending == Some(Pending::SubscribeOverdue) =>
            {
                self.pending = None;
                self.state = Degraded;
                vec![HealthAction::DropChannel]
            }
            (Degraded, RecoveryCheck) if self.pending.is_none() => self.request(Pending::Probe),

            _ => Vec::new(),
        }
    }

    fn awaiting_ack(&self) -> bool {
        matches!(
            self.pending,
            Some(Pending::Subscribe | Pending::SubscribeOverdue)
        )
    }

    fn request(&mut self, pending: Pending) -> Vec<HealthAction> {
        self.pending = Some(pending);
        match pending {
            Pending::Probe => vec![HealthAction::Probe],
            Pending::Subscribe | Pending::SubscribeOverdue => vec![HealthAction::Subscribe],
        }
    }
}
