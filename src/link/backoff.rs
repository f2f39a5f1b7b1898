use embassy_time::{Duration, Instant};

/// Delayed link retries with exponential backoff.
///
/// At most one retry is ever pending. Each scheduled retry doubles the delay used for the
/// next one (capped at `max_backoff_ms`); a successful connect resets it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectBackoff {
    next_attempt_at: Option<Instant>,
    backoff_ms: u32,
    min_backoff_ms: u32,
    max_backoff_ms: u32,
}

impl ReconnectBackoff {
    pub fn new(min_backoff_ms: u32, max_backoff_ms: u32) -> Self {
        let min_backoff_ms = min_backoff_ms.max(1);
        let max_backoff_ms = max_backoff_ms.max(min_backoff_ms);
        Self {
            next_attempt_at: None,
            backoff_ms: min_backoff_ms,
            min_backoff_ms,
            max_backoff_ms,
        }
    }

    /// Returns `false` when a retry is already pending; nothing changes in that case.
    pub fn schedule_reconnect(&mut self, now: Instant) -> bool {
        if self.next_attempt_at.is_some() {
            return false;
        }
        self.next_attempt_at = Some(now + Duration::from_millis(self.backoff_ms as u64));
        self.backoff_ms = self
            .backoff_ms
            .saturating_mul(2)
            .min(self.max_backoff_ms);
        true
    }

    /// Returns `true` exactly once per scheduled retry, when it comes due.
    pub fn tick(&mut self, now: Instant) -> bool {
        match self.next_attempt_at {
            Some(at) if now >= at => {
                self.next_attempt_at = None;
                true
            }
            _ => false,
        }
    }

    pub fn on_success(&mut self) {
        self.backoff_ms = self.min_backoff_ms;
        self.next_attempt_at = None;
    }

    pub fn pending(&self) -> bool {
        self.next_attempt_at.is_some()
    }

    pub fn next_attempt_at(&self) -> Option<Instant> {
        self.next_attempt_at
    }

    /// Delay the next `schedule_reconnect` will use.
    pub fn backoff_ms(&self) -> u32 {
        self.backoff_ms
    }

    pub fn bounds_ms(&self) -> (u32, u32) {
        (self.min_backoff_ms, self.max_backoff_ms)
    }
}
