use std::time::Duration;

use tokio::{sync::watch, task::JoinHandle, time::interval};

/// Local per-round countdown.
///
/// Seeded from the broadcast time limit and decremented once per second by a
/// spawned task; never synchronised to any remote clock. The remaining value
/// is observable through a `watch` channel that stays open after reaching
/// zero, so late observers still read the final value.
pub struct RoundClock {
    remaining: watch::Receiver<u32>,
    ticker: JoinHandle<()>,
}

impl RoundClock {
    /// Start a countdown from `seconds`.
    pub fn start(seconds: u32) -> Self {
        let (tx, rx) = watch::channel(seconds);
        let ticker = tokio::spawn(async move {
            // Ticks keep absolute deadlines, so a busy client catches up
            // instead of drifting.
            let mut tick = interval(Duration::from_secs(1));
            tick.tick().await;
            let mut left = seconds;
            while left > 0 {
                tick.tick().await;
                left -= 1;
                if tx.send(left).is_err() {
                    return;
                }
            }
            // Keep the sender alive so watchers do not observe a closed
            // channel once the countdown has finished.
            tx.closed().await;
        });
        Self {
            remaining: rx,
            ticker,
        }
    }

    /// Seconds left on the clock right now.
    pub fn remaining(&self) -> u32 {
        *self.remaining.borrow()
    }

    /// Whether the countdown has reached zero.
    pub fn is_expired(&self) -> bool {
        self.remaining() == 0
    }

    /// Watcher over the remaining seconds.
    pub fn watcher(&self) -> watch::Receiver<u32> {
        self.remaining.clone()
    }

    /// Stop ticking, leaving the remaining value where it is.
    pub fn freeze(&self) {
        self.ticker.abort();
    }
}

impl Drop for RoundClock {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}
