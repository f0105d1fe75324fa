use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::debug;

/// Global gate for outbound relation source calls.
///
/// Grants are spaced by at least the current interval. The interval starts at
/// `base` and widens on [`RateLimiter::back_off`], then drifts back toward
/// `base` on [`RateLimiter::recover`].
pub struct RateLimiter {
    base: Duration,
    max: Duration,
    state: Mutex<LimiterState>,
}

struct LimiterState {
    interval: Duration,
    next_slot: Option<Instant>,
}

impl RateLimiter {
    pub fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            state: Mutex::new(LimiterState {
                interval: base,
                next_slot: None,
            }),
        }
    }

    /// Wait for the next call slot.
    pub async fn acquire(&self) {
        // The slot is reserved under the lock and awaited outside it, so
        // concurrent callers queue up one interval apart.
        let slot = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let slot = match state.next_slot {
                Some(next) if next > now => next,
                _ => now,
            };
            state.next_slot = Some(slot + state.interval);
            slot
        };

        if slot > Instant::now() {
            sleep_until(slot).await;
        }
    }

    /// Widen the spacing after the source pushed back. The next grant is
    /// pushed out by the widened interval as well.
    pub async fn back_off(&self, retry_after: Option<Duration>) {
        let mut state = self.state.lock().await;
        let doubled = (state.interval * 2).max(Duration::from_millis(100));
        let widened = retry_after.map_or(doubled, |hint| hint.max(doubled));
        state.interval = widened.min(self.max);

        let earliest = Instant::now() + state.interval;
        if state.next_slot.is_none_or(|next| next < earliest) {
            state.next_slot = Some(earliest);
        }
        debug!("Rate limiter backing off to {:?}", state.interval);
    }

    /// Narrow the spacing back toward the base interval after a success.
    pub async fn recover(&self) {
        let mut state = self.state.lock().await;
        if state.interval > self.base {
            let excess = state.interval - self.base;
            state.interval = self.base + excess / 2;
        }
    }

    pub async fn current_interval(&self) -> Duration {
        self.state.lock().await.interval
    }

    pub fn base_interval(&self) -> Duration {
        self.base
    }
}
