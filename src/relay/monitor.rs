use std::collections::BTreeMap;

use serde::Serialize;
use tokio::time::{Duration, Instant};

use super::transport::ReadyState;

pub const MONITOR_INTERVAL: Duration = Duration::from_secs(10);
/// Silence on an active workout longer than this is worth a warning.
pub const SILENCE_WARNING: Duration = Duration::from_secs(15);
pub const SUMMARY_EVERY: u64 = 20;

/// Inbound message accounting for the current connection.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStats {
    pub count: u64,
    #[serde(skip)]
    pub last_message_at: Option<Instant>,
    pub by_type: BTreeMap<String, u64>,
}

impl MessageStats {
    /// Counts one raw frame. Returns true when a periodic summary is due.
    pub fn record_frame(&mut self, now: Instant) -> bool {
        self.count += 1;
        self.last_message_at = Some(now);
        self.count % SUMMARY_EVERY == 0
    }

    pub fn record_kind(&mut self, kind: &str) {
        *self.by_type.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn count_of(&self, kind: &str) -> u64 {
        self.by_type.get(kind).copied().unwrap_or(0)
    }

    pub fn summary(&self) -> String {
        let breakdown = self
            .by_type
            .iter()
            .map(|(kind, count)| format!("{kind}={count}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{} messages ({breakdown})", self.count)
    }

    pub fn since_last(&self, now: Instant) -> Option<Duration> {
        self.last_message_at
            .map(|at| now.saturating_duration_since(at))
    }
}

/// One connection-monitor observation.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorReport {
    pub ready_state: Option<ReadyState>,
    pub is_connected: bool,
    pub message_count: u64,
    pub since_last_message: Option<Duration>,
    pub workout_active: bool,
}

impl MonitorReport {
    /// The client believes it is connected but the socket says otherwise.
    pub fn state_mismatch(&self) -> bool {
        self.is_connected && self.ready_state != Some(ReadyState::Open)
    }

    pub fn relay_silent(&self) -> bool {
        if !self.workout_active {
            return false;
        }
        match self.since_last_message {
            Some(gap) => gap > SILENCE_WARNING,
            None => true,
        }
    }

    pub fn describe(&self) -> String {
        let state = self
            .ready_state
            .map(|state| state.as_str())
            .unwrap_or("NONE");
        let last = self
            .since_last_message
            .map(|gap| format!("{}s ago", gap.as_secs()))
            .unwrap_or_else(|| "never".to_string());
        format!(
            "socket={state} messages={} last={last}",
            self.message_count
        )
    }
}
