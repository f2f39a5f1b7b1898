//! The cooperative scheduler loop and the context that owns every component.


use embassy_time::{block_for, Duration, Instant};
use embedded_io::{Read, ReadReady, Write, WriteReady};
use log::{info, warn};

use crate::{
    broker::{BrokerCounters, BrokerScheduler, BrokerService, SliceOutcome},
    config::{GatewayPolicy, LOOP_IDLE_DELAY_US},
    health::{
        AccessPoint, AncillaryServices, HealthCounters, HealthReport, HealthSupervisor,
        HealthTargets, SystemProbe, TelemetrySnapshot,
    },
    link::{
        LinkCounters, LinkFactory, LinkManager, LinkTransition, LinkTransport,
        StatusFlags, TransportReport,
    },
    nat::{NatCounters, NatEnabler, NatProvider},
};

/// The provider types a gateway is assembled from.
pub trait Platform {
    type Device: Read + Write + ReadReady + WriteReady;
    type Links: LinkFactory;
    type Nat: NatProvider;
    type Broker: BrokerService;
    type AccessPoint: AccessPoint;
    type Services: AncillaryServices;
    type System: SystemProbe;
}

pub struct PlatformParts<P: Platform> {
    pub device: P::Device,
    pub links: P::Links,
    pub nat: P::Nat,
    pub broker: P::Broker,
    pub access_point: P::AccessPoint,
    pub services: P::Services,
    pub system: P::System,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub errors: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SupervisorCounters {
    pub passes: u32,
    pub link: LinkCounters,
    pub nat: NatCounters,
    pub broker: BrokerCounters,
    pub health: HealthCounters,
    pub transport: TransportCounters,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassReport {
    pub transport: TransportReport,
    pub transition: Option<LinkTransition>,
    pub reconnect_fired: bool,
    pub broker: SliceOutcome,
    pub health: Option<HealthReport>,
}

/// Single owner of all gateway state. One [`poll`](Self::poll) is one cooperative pass.
pub struct Supervisor<'a, P: Platform> {
    boot: Instant,
    policy: GatewayPolicy,
    transport: LinkTransport<P::Device>,
    link: LinkManager<'a, P::Links>,
    nat: NatEnabler<P::Nat>,
    broker: BrokerScheduler<P::Broker>,
    health: HealthSupervisor,
    access_point: P::AccessPoint,
    services: P::Services,
    system: P::System,
    passes: u32,
    transport_counters: TransportCounters,
}

impl<'a, P: Platform> Supervisor<'a, P> {
    pub fn new(
        parts: PlatformParts<P>,
        flags: &'a StatusFlags,
        policy: GatewayPolicy,
        boot: Instant,
    ) -> Self {
        let policy = policy.validated();
        Self {
            boot,
            transport: LinkTransport::new(parts.device),
            link: LinkManager::new(parts.links, flags, &policy),
            nat: NatEnabler::new(parts.nat, &policy),
            broker: BrokerScheduler::new(parts.broker, policy.broker, policy.broker_stall_ms, boot),
            health: HealthSupervisor::new(&policy, boot),
            access_point: parts.access_point,
            services: parts.services,
            system: parts.system,
            passes: 0,
            transport_counters: TransportCounters::default(),
            policy,
        }
    }

    pub fn policy(&self) -> &GatewayPolicy {
        &self.policy
    }

    pub fn link(&self) -> &LinkManager<'a, P::Links> {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut LinkManager<'a, P::Links> {
        &mut self.link
    }

    pub fn transport(&self) -> &LinkTransport<P::Device> {
        &self.transport
    }

    pub fn nat(&self) -> &NatEnabler<P::Nat> {
        &self.nat
    }

    pub fn broker(&self) -> &BrokerScheduler<P::Broker> {
        &self.broker
    }

    pub fn health(&self) -> &HealthSupervisor {
        &self.health
    }

    pub fn telemetry(&self) -> Option<&TelemetrySnapshot> {
        self.health.telemetry()
    }

    pub fn counters(&self) -> SupervisorCounters {
        SupervisorCounters {
            passes: self.passes,
            link: self.link.counters(),
            nat: self.nat.counters(),
            broker: self.broker.counters(),
            health: self.health.counters(),
            transport: self.transport_counters,
        }
    }

    /// First bring-up: access point, link engine and first connect, listeners.
    pub fn start(&mut self, now: Instant) {
        info!(
            "supervisor: start ap_enabled={} broker_policy={} backoff_ms={}..{}",
            self.policy.ap_enabled,
            self.policy.broker.as_str(),
            self.policy.min_backoff_ms,
            self.policy.max_backoff_ms
        );

        if self.policy.ap_enabled && !self.access_point.status().healthy() {
            if let Err(err) = self.access_point.reinit() {
                warn!("supervisor: ap init err={}", err);
            }
        }

        if self.link.ensure_engine() {
            if let Err(err) = self.link.connect(now) {
                warn!("supervisor: first connect err={}", err);
            }
        } else {
            let _ = self.link.schedule_reconnect(now);
        }

        let _ = self.services.ensure_running();
    }

    pub fn poll(&mut self, now: Instant) -> PassReport {
        self.passes = self.passes.wrapping_add(1);

        let transport = self.transport.service(&mut self.link);
        self.transport_counters.rx_bytes += transport.rx_bytes as u64;
        self.transport_counters.tx_bytes += transport.tx_bytes as u64;
        if let Some(err) = transport.error {
            self.transport_counters.errors = self.transport_counters.errors.saturating_add(1);
            if self.transport_counters.errors == 1 || self.transport_counters.errors % 100 == 0 {
                warn!(
                    "supervisor: transport err={} count={}",
                    err, self.transport_counters.errors
                );
            }
        }

        let mut transition = self.link.poll_status(now);
        if let Some(timeout) = self.link.check_connect_timeout(now) {
            transition = Some(timeout);
        }
        match transition {
            Some(LinkTransition::Up) => {
                let _ = self.nat.ensure(self.link.interface());
            }
            Some(LinkTransition::Failed(_) | LinkTransition::Lost) => self.nat.invalidate(),
            Some(LinkTransition::Connecting) | None => {}
        }

        let reconnect_fired = self.link.service_reconnect(now);
        let broker = self.broker.service(now);

        let health = if self.health.tick_due(now) {
            Some(self.health.run_checks(
                now,
                HealthTargets {
                    link: &mut self.link,
                    nat: &mut self.nat,
                    broker: &mut self.broker,
                    ap: &mut self.access_point,
                    services: &mut self.services,
                },
            ))
        } else {
            None
        };

        let _ = self.health.sample_telemetry(
            now,
            self.boot,
            &self.link,
            &mut self.access_point,
            &self.system,
        );

        PassReport {
            transport,
            transition,
            reconnect_fired,
            broker,
            health,
        }
    }

    /// Polls forever, pausing briefly between passes so the idle task can feed the watchdog.
    pub fn run(&mut self, mut clock: impl FnMut() -> Instant) -> ! {
        self.start(clock());
        let pause = Duration::from_micros(LOOP_IDLE_DELAY_US);
        loop {
            let _ = self.poll(clock());
            block_for(pause);
        }
    }
}
