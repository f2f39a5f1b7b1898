//! Duty-cycled servicing of the embedded MQTT broker and its liveness tracking.


use embassy_time::{Duration, Instant};
use log::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrokerPolicy {
    /// One slice of at most `slice_ms`, no more often than every `period_ms`.
    TimeSliced { period_ms: u32, slice_ms: u32 },
    /// One slice per loop pass.
    Plain { slice_ms: u32 },
}

impl BrokerPolicy {
    pub const fn slice_budget(self) -> Duration {
        match self {
            Self::TimeSliced { slice_ms, .. } | Self::Plain { slice_ms } => {
                Duration::from_millis(slice_ms as u64)
            }
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TimeSliced { .. } => "time_sliced",
            Self::Plain { .. } => "plain",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrokerError {
    NotRunning,
    Io,
    Other(u8),
}

impl BrokerError {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotRunning => "not_running",
            Self::Io => "io",
            Self::Other(_) => "other",
        }
    }
}

impl core::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Other(code) => write!(f, "other code={}", code),
            _ => f.write_str(self.as_str()),
        }
    }
}

/// Broker entry points; dispatch and topic matching live behind them.
pub trait BrokerService {
    /// Processes pending broker work for at most `budget` of wall-clock time.
    fn service_slice(&mut self, budget: Duration) -> Result<(), BrokerError>;
    fn restart(&mut self) -> Result<(), BrokerError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SliceOutcome {
    Skipped,
    Serviced,
    Failed(BrokerError),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BrokerCounters {
    pub slices: u32,
    pub slice_errors: u32,
    pub restarts: u32,
    pub restart_errors: u32,
}

pub struct BrokerScheduler<B> {
    broker: B,
    policy: BrokerPolicy,
    stall_threshold: Duration,
    last_slice_at: Option<Instant>,
    last_service_at: Instant,
    error_streak: u32,
    counters: BrokerCounters,
}

impl<B: BrokerService> BrokerScheduler<B> {
    pub fn new(broker: B, policy: BrokerPolicy, stall_threshold_ms: u32, now: Instant) -> Self {
        Self {
            broker,
            policy,
            stall_threshold: Duration::from_millis(stall_threshold_ms as u64),
            last_slice_at: None,
            last_service_at: now,
            error_streak: 0,
            counters: BrokerCounters::default(),
        }
    }

    pub fn policy(&self) -> BrokerPolicy {
        self.policy
    }

    pub fn counters(&self) -> BrokerCounters {
        self.counters
    }

    pub fn broker_mut(&mut self) -> &mut B {
        &mut self.broker
    }

    pub fn last_service_at(&self) -> Instant {
        self.last_service_at
    }

    pub fn service(&mut self, now: Instant) -> SliceOutcome {
        if let BrokerPolicy::TimeSliced { period_ms, .. } = self.policy {
            if let Some(last) = self.last_slice_at {
                if now.saturating_duration_since(last) < Duration::from_millis(period_ms as u64) {
                    return SliceOutcome::Skipped;
                }
            }
        }
        self.last_slice_at = Some(now);
        self.counters.slices = self.counters.slices.saturating_add(1);

        match self.broker.service_slice(self.policy.slice_budget()) {
            Ok(()) => {
                if self.error_streak > 0 {
                    info!("broker: recovered after {} failed slices", self.error_streak);
                    self.error_streak = 0;
                }
                self.last_service_at = now;
                SliceOutcome::Serviced
            }
            Err(err) => {
                self.counters.slice_errors = self.counters.slice_errors.saturating_add(1);
                if self.error_streak == 0 {
                    warn!("broker: slice err={}", err);
                }
                self.error_streak = self.error_streak.saturating_add(1);
                SliceOutcome::Failed(err)
            }
        }
    }

    pub fn liveness_age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_service_at)
    }

    pub fn is_stalled(&self, now: Instant) -> bool {
        self.liveness_age(now) > self.stall_threshold
    }

    /// Restarts the broker. Liveness is left untouched so a broker that stays stuck is
    /// restarted again on the next health tick.
    pub fn restart(&mut self, now: Instant) -> bool {
        self.counters.restarts = self.counters.restarts.saturating_add(1);
        warn!(
            "broker: stalled age_ms={} restarting count={}",
            self.liveness_age(now).as_millis(),
            self.counters.restarts
        );
        match self.broker.restart() {
            Ok(()) => true,
            Err(err) => {
                self.counters.restart_errors = self.counters.restart_errors.saturating_add(1);
                warn!("broker: restart err={}", err);
                false
            }
        }
    }
}
