use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Repeating timer task. The first tick fires one `period` after spawn; the
/// loop ends when the callback returns `false` or the ticker is stopped.
pub struct Ticker {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Ticker {
    pub fn spawn<F>(period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();

        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if !on_tick() {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            cancel_token,
            handle,
        }
    }

    /// Takes effect before the next tick runs.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.cancel_token.is_cancelled() && !self.handle.is_finished()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}
