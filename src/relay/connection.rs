use std::time::Duration;

use serde::Serialize;

use crate::settings::RelayConfig;

use super::transport::CLOSE_NORMAL;

/// What the close handler should do about a lost connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Attempt budget exhausted; stays disconnected until a manual reconnect.
    GiveUp,
    /// Idle and nothing has failed before: the user never engaged the relay.
    Skip,
    Schedule { attempt: u32, delay: Duration },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum ConnectionStatus {
    Connected,
    Reconnecting { attempt: u32, max: u32 },
    GaveUp { max: u32 },
    Disconnected,
}

impl ConnectionStatus {
    pub fn text(&self) -> String {
        match self {
            ConnectionStatus::Connected => "Connected to Relay Node".to_string(),
            ConnectionStatus::Reconnecting { attempt, max } => {
                format!("Reconnecting... ({attempt}/{max})")
            }
            ConnectionStatus::GaveUp { .. } => "Disconnected, not retrying".to_string(),
            ConnectionStatus::Disconnected => "Disconnected from Relay Node".to_string(),
        }
    }
}

/// Connection bookkeeping owned by the relay client. Only socket lifecycle
/// events move it.
#[derive(Debug, Clone)]
pub struct RelayConnectionState {
    pub is_connected: bool,
    pub reconnect_attempts: u32,
    /// Set once the budget is spent and a close found nothing left to schedule.
    pub gave_up: bool,
    pub config: RelayConfig,
}

impl RelayConnectionState {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            is_connected: false,
            reconnect_attempts: 0,
            gave_up: false,
            config,
        }
    }

    /// A clean 1000 close while idle is treated as intentional.
    pub fn should_reconnect_after_close(&self, code: u16, workout_active: bool) -> bool {
        code != CLOSE_NORMAL || workout_active
    }

    pub fn next_reconnect(&mut self, workout_active: bool) -> ReconnectDecision {
        if self.reconnect_attempts >= self.config.max_reconnect_attempts {
            self.gave_up = true;
            return ReconnectDecision::GiveUp;
        }
        if !workout_active && self.reconnect_attempts == 0 {
            return ReconnectDecision::Skip;
        }

        self.reconnect_attempts += 1;
        ReconnectDecision::Schedule {
            attempt: self.reconnect_attempts,
            delay: Duration::from_millis(self.config.reconnect_interval_ms),
        }
    }

    pub fn mark_open(&mut self) {
        self.is_connected = true;
        self.reconnect_attempts = 0;
        self.gave_up = false;
    }

    /// Clears the attempt budget without touching the connected flag.
    pub fn reset_attempts(&mut self) {
        self.reconnect_attempts = 0;
        self.gave_up = false;
    }

    pub fn status(&self) -> ConnectionStatus {
        let max = self.config.max_reconnect_attempts;
        if self.is_connected {
            ConnectionStatus::Connected
        } else if self.gave_up {
            ConnectionStatus::GaveUp { max }
        } else if self.reconnect_attempts > 0 {
            ConnectionStatus::Reconnecting {
                attempt: self.reconnect_attempts,
                max,
            }
        } else {
            ConnectionStatus::Disconnected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(max: u32) -> RelayConnectionState {
        RelayConnectionState::new(RelayConfig {
            max_reconnect_attempts: max,
            reconnect_interval_ms: 2000,
            ..RelayConfig::default()
        })
    }

    #[test]
    fn clean_idle_close_is_not_retried() {
        let conn = state(10);
        assert!(!conn.should_reconnect_after_close(1000, false));
        assert!(conn.should_reconnect_after_close(1000, true));
        assert!(conn.should_reconnect_after_close(1006, false));
    }

    #[test]
    fn first_idle_failure_is_skipped() {
        let mut conn = state(10);
        assert_eq!(conn.next_reconnect(false), ReconnectDecision::Skip);
        assert_eq!(conn.reconnect_attempts, 0);
    }

    #[test]
    fn attempts_are_capped() {
        let mut conn = state(3);
        for attempt in 1..=3 {
            assert_eq!(
                conn.next_reconnect(true),
                ReconnectDecision::Schedule {
                    attempt,
                    delay: Duration::from_millis(2000)
                }
            );
        }
        assert_eq!(conn.next_reconnect(true), ReconnectDecision::GiveUp);
        assert_eq!(conn.reconnect_attempts, 3);
        assert_eq!(conn.status(), ConnectionStatus::GaveUp { max: 3 });
    }

    #[test]
    fn last_scheduled_retry_is_still_reconnecting() {
        let mut conn = state(3);
        for _ in 0..3 {
            conn.next_reconnect(true);
        }
        assert_eq!(
            conn.status(),
            ConnectionStatus::Reconnecting { attempt: 3, max: 3 }
        );
        assert_eq!(conn.status().text(), "Reconnecting... (3/3)");

        assert_eq!(conn.next_reconnect(true), ReconnectDecision::GiveUp);
        assert_eq!(conn.status(), ConnectionStatus::GaveUp { max: 3 });

        conn.reset_attempts();
        assert_eq!(conn.status(), ConnectionStatus::Disconnected);
    }

    #[test]
    fn idle_retry_continues_once_started() {
        let mut conn = state(5);
        conn.next_reconnect(true);
        assert!(matches!(
            conn.next_reconnect(false),
            ReconnectDecision::Schedule { attempt: 2, .. }
        ));
    }

    #[test]
    fn open_resets_attempts() {
        let mut conn = state(5);
        conn.next_reconnect(true);
        assert_eq!(
            conn.status(),
            ConnectionStatus::Reconnecting { attempt: 1, max: 5 }
        );
        conn.mark_open();
        assert_eq!(conn.reconnect_attempts, 0);
        assert_eq!(conn.status(), ConnectionStatus::Connected);
        assert_eq!(conn.status().text(), "Connected to Relay Node");
    }
}
