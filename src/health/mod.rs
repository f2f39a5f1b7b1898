//! Periodic health checks and the corrective actions they trigger.
//!
//! Each check is independent and idempotent; a check that finds nothing wrong changes
//! nothing. Corrective work is always initiated from the loop, never from a callback.

mod telemetry;
#[cfg(test)]
mod tests;

use core::net::Ipv4Addr;

use embassy_time::{Duration, Instant};
use log::{debug, info, warn};

pub use telemetry::{fragmentation_pct, TelemetrySnapshot};

use crate::{
    broker::{BrokerScheduler, BrokerService},
    config::GatewayPolicy,
    link::{LinkFactory, LinkManager, LinkStatus},
    nat::{NatEnabler, NatProvider, NatReadiness},
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApStatus {
    pub up: bool,
    pub address: Option<Ipv4Addr>,
    pub stations: u8,
}

impl ApStatus {
    pub const fn healthy(self) -> bool {
        self.up && self.address.is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApError {
    Radio,
    Config,
}

impl ApError {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Radio => "radio",
            Self::Config => "config",
        }
    }
}

impl core::fmt::Display for ApError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The local access point and its DHCP side.
pub trait AccessPoint {
    fn status(&mut self) -> ApStatus;
    fn reinit(&mut self) -> Result<(), ApError>;
}

/// Web and telnet listeners.
pub trait AncillaryServices {
    /// Starts whatever is not running. Returns how many listeners had to be (re)started.
    fn ensure_running(&mut self) -> u8;
}

pub trait SystemProbe {
    fn free_memory(&self) -> u32;
    fn largest_free_block(&self) -> u32;
    /// Seconds since the Unix epoch once the clock has been set.
    fn wall_clock_secs(&self) -> Option<u64>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApCheck {
    Disabled,
    Healthy,
    Reinitialized,
    /// Needed a re-init but one already ran within the last health period.
    Throttled,
    Failed(ApError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkCheck {
    Healthy,
    /// Negotiation in progress; the connect timeout guards it.
    Negotiating,
    EngineRecreated,
    EngineUnavailable,
    HandedOff,
    RetryPending,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HealthReport {
    pub ap: ApCheck,
    pub link: LinkCheck,
    /// `None` while the link is not up.
    pub nat: Option<NatReadiness>,
    pub broker_restarted: bool,
    pub services_restarted: u8,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HealthCounters {
    pub ticks: u32,
    pub ap_reinits: u32,
    pub ap_reinit_throttled: u32,
    pub ap_reinit_errors: u32,
    pub engine_recreations: u32,
    pub reconnect_handoffs: u32,
    pub broker_restarts: u32,
    pub service_restarts: u32,
    pub telemetry_samples: u32,
}

/// Everything one health tick inspects, borrowed from the supervisor for the duration.
pub struct HealthTargets<'r, 'a, F: LinkFactory, N, B, A, S> {
    pub link: &'r mut LinkManager<'a, F>,
    pub nat: &'r mut NatEnabler<N>,
    pub broker: &'r mut BrokerScheduler<B>,
    pub ap: &'r mut A,
    pub services: &'r mut S,
}

pub struct HealthSupervisor {
    ap_enabled: bool,
    period: Duration,
    telemetry_period: Duration,
    next_tick: Instant,
    next_telemetry: Instant,
    last_ap_reinit: Option<Instant>,
    telemetry: Option<TelemetrySnapshot>,
    counters: HealthCounters,
}

impl HealthSupervisor {
    pub fn new(policy: &GatewayPolicy, now: Instant) -> Self {
        let period = Duration::from_millis(policy.health_tick_ms as u64);
        let telemetry_period = Duration::from_millis(policy.telemetry_period_ms as u64);
        Self {
            ap_enabled: policy.ap_enabled,
            period,
            telemetry_period,
            next_tick: now + period,
            next_telemetry: now,
            last_ap_reinit: None,
            telemetry: None,
            counters: HealthCounters::default(),
        }
    }

    pub fn counters(&self) -> HealthCounters {
        self.counters
    }

    pub fn next_tick(&self) -> Instant {
        self.next_tick
    }

    pub fn telemetry(&self) -> Option<&TelemetrySnapshot> {
        self.telemetry.as_ref()
    }

    /// Claims the tick if it is due. Missed ticks are not replayed.
    pub fn tick_due(&mut self, now: Instant) -> bool {
        if now < self.next_tick {
            return false;
        }
        self.next_tick = now + self.period;
        self.counters.ticks = self.counters.ticks.saturating_add(1);
        true
    }

    /// Runs every check once, in order: access point, link, NAT, broker, listeners.
    pub fn run_checks<F, N, B, A, S>(
        &mut self,
        now: Instant,
        targets: HealthTargets<'_, '_, F, N, B, A, S>,
    ) -> HealthReport
    where
        F: LinkFactory,
        N: NatProvider,
        B: BrokerService,
        A: AccessPoint,
        S: AncillaryServices,
    {
        let ap = self.check_access_point(now, targets.ap);
        let link = self.check_link(now, targets.link);
        let nat = self.check_nat(targets.link, targets.nat);
        let broker_restarted = self.check_broker(now, targets.broker);
        let services_restarted = self.check_services(targets.services);
        HealthReport {
            ap,
            link,
            nat,
            broker_restarted,
            services_restarted,
        }
    }

    pub fn check_access_point<A: AccessPoint>(&mut self, now: Instant, ap: &mut A) -> ApCheck {
        if !self.ap_enabled {
            return ApCheck::Disabled;
        }
        let status = ap.status();
        if status.healthy() {
            return ApCheck::Healthy;
        }
        if let Some(last) = self.last_ap_reinit {
            if now.saturating_duration_since(last) < self.period {
                self.counters.ap_reinit_throttled =
                    self.counters.ap_reinit_throttled.saturating_add(1);
                debug!("health: ap re-init throttled");
                return ApCheck::Throttled;
            }
        }

        self.last_ap_reinit = Some(now);
        self.counters.ap_reinits = self.counters.ap_reinits.saturating_add(1);
        warn!(
            "health: ap down up={} addr_set={} reinit count={}",
            status.up,
            status.address.is_some(),
            self.counters.ap_reinits
        );
        match ap.reinit() {
            Ok(()) => ApCheck::Reinitialized,
            Err(err) => {
                self.counters.ap_reinit_errors = self.counters.ap_reinit_errors.saturating_add(1);
                warn!("health: ap reinit err={}", err);
                ApCheck::Failed(err)
            }
        }
    }

    /// Never connects directly; a link that needs work is handed to the backoff controller.
    pub fn check_link<F: LinkFactory>(
        &mut self,
        now: Instant,
        link: &mut LinkManager<'_, F>,
    ) -> LinkCheck {
        let _ = link.check_connect_timeout(now);

        if !link.engine_present() {
            if !link.ensure_engine() {
                let _ = link.schedule_reconnect(now);
                return LinkCheck::EngineUnavailable;
            }
            self.counters.engine_recreations = self.counters.engine_recreations.saturating_add(1);
            if link.schedule_reconnect(now) {
                self.counters.reconnect_handoffs =
                    self.counters.reconnect_handoffs.saturating_add(1);
            }
            return LinkCheck::EngineRecreated;
        }

        match link.status() {
            LinkStatus::Up => LinkCheck::Healthy,
            LinkStatus::Connecting => LinkCheck::Negotiating,
            LinkStatus::Down | LinkStatus::Error(_) => {
                if link.schedule_reconnect(now) {
                    self.counters.reconnect_handoffs =
                        self.counters.reconnect_handoffs.saturating_add(1);
                    LinkCheck::HandedOff
                } else {
                    LinkCheck::RetryPending
                }
            }
        }
    }

    pub fn check_nat<F: LinkFactory, N: NatProvider>(
        &mut self,
        link: &LinkManager<'_, F>,
        nat: &mut NatEnabler<N>,
    ) -> Option<NatReadiness> {
        if !link.is_up() {
            nat.invalidate();
            return None;
        }
        Some(nat.ensure(link.interface()))
    }

    /// At most one restart per call; liveness is left for the next successful slice to refresh.
    pub fn check_broker<B: BrokerService>(
        &mut self,
        now: Instant,
        broker: &mut BrokerScheduler<B>,
    ) -> bool {
        if !broker.is_stalled(now) {
            return false;
        }
        self.counters.broker_restarts = self.counters.broker_restarts.saturating_add(1);
        broker.restart(now)
    }

    pub fn check_services<S: AncillaryServices>(&mut self, services: &mut S) -> u8 {
        let restarted = services.ensure_running();
        if restarted > 0 {
            self.counters.service_restarts =
                self.counters.service_restarts.saturating_add(restarted as u32);
            info!("health: listeners restarted count={}", restarted);
        }
        restarted
    }

    /// Recomputes and logs the telemetry snapshot when the telemetry period has elapsed.
    pub fn sample_telemetry<F, A, Y>(
        &mut self,
        now: Instant,
        boot: Instant,
        link: &LinkManager<'_, F>,
        ap: &mut A,
        system: &Y,
    ) -> Option<&TelemetrySnapshot>
    where
        F: LinkFactory,
        A: AccessPoint,
        Y: SystemProbe,
    {
        if now < self.next_telemetry {
            return None;
        }
        self.next_telemetry = now + self.telemetry_period;
        let ap_status = if self.ap_enabled {
            ap.status()
        } else {
            ApStatus::default()
        };
        let snapshot = TelemetrySnapshot::capture(
            now.saturating_duration_since(boot),
            system,
            ap_status,
            link.status(),
            link.address(),
        );
        self.counters.telemetry_samples = self.counters.telemetry_samples.saturating_add(1);
        info!("{}", snapshot.log_line());
        self.telemetry = Some(snapshot);
        self.telemetry.as_ref()
    }
}
