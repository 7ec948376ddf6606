//! Cooperative self-throttling for calls against a rate-limited API.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Longest wait imposed for an exhausted quota.
const MAX_QUOTA_WAIT: Duration = Duration::from_secs(60);

/// Per-client throttle state. One instance per run; never shared globally.
#[derive(Debug)]
pub struct Throttle {
    delay: Duration,
    state: Mutex<ThrottleState>,
}

#[derive(Debug, Default)]
struct ThrottleState {
    next_slot: Option<Instant>,
    remaining: Option<u64>,
    reset_at: Option<Instant>,
}

impl Throttle {
    /// Space calls at least `delay` apart.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: Mutex::new(ThrottleState::default()),
        }
    }

    /// Wait until the next call may be issued.
    ///
    /// Each caller reserves its own slot, so concurrent callers are spaced
    /// `delay` apart without holding a lock across the sleep.
    pub async fn wait(&self) {
        let slot = self.reserve(Instant::now());
        tokio::time::sleep_until(slot).await;
    }

    /// Record quota headers from the latest response.
    pub fn observe(&self, remaining: Option<u64>, reset_in: Option<Duration>) {
        let mut state = self.lock();
        state.remaining = remaining;
        state.reset_at = reset_in.map(|wait| Instant::now() + wait.min(MAX_QUOTA_WAIT));
        if remaining == Some(0) {
            log::warn!(
                "API quota exhausted; pausing for {:?}",
                reset_in.unwrap_or(MAX_QUOTA_WAIT).min(MAX_QUOTA_WAIT)
            );
        }
    }

    /// Last observed remaining quota.
    pub fn remaining(&self) -> Option<u64> {
        self.lock().remaining
    }

    fn reserve(&self, now: Instant) -> Instant {
        let mut state = self.lock();
        let mut slot = state.next_slot.map_or(now, |next| next.max(now));
        if state.remaining == Some(0) {
            let reset = state.reset_at.unwrap_or(now + MAX_QUOTA_WAIT);
            slot = slot.max(reset);
            state.remaining = None;
        }
        state.next_slot = Some(slot + self.delay);
        slot
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ThrottleState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
