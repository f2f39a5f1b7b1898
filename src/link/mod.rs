//! PPP uplink: byte transport, protocol state, status handoff and reconnect backoff.

mod backoff;
mod machine;
mod status;
mod transport;

use core::net::Ipv4Addr;

use embassy_time::{Duration, Instant};
use log::{debug, info, warn};

pub use backoff::ReconnectBackoff;
pub use machine::LinkTransition;
pub use status::{
    status_code_label, StatusFlags, StatusNotice, LINK_CODE_CONNECT_TIME, LINK_CODE_OK,
};
pub use transport::{LinkTransport, TransportError, TransportReport};

use crate::config::GatewayPolicy;
use machine::{LinkEvent, LinkStateMachine};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkStatus {
    Down,
    Connecting,
    Up,
    Error(u8),
}

impl LinkStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Down => "down",
            Self::Connecting => "connecting",
            Self::Up => "up",
            Self::Error(_) => "error",
        }
    }
}

/// Network interface handle as numbered by the IP stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InterfaceId(pub u8);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkError {
    CreateFailed,
    NoEngine,
    ConnectRejected(u8),
}

impl LinkError {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreateFailed => "create_failed",
            Self::NoEngine => "no_engine",
            Self::ConnectRejected(_) => "connect_rejected",
        }
    }
}

impl core::fmt::Display for LinkError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ConnectRejected(code) => {
                write!(f, "{} code={} ({})", self.as_str(), code, status_code_label(*code))
            }
            _ => f.write_str(self.as_str()),
        }
    }
}

/// The PPP engine supplied by the network stack.
///
/// Negotiation happens inside the engine; status changes come back through the
/// [`StatusFlags`] the factory wired into it.
pub trait LinkEngine {
    /// Hands received serial bytes to the engine. Must not block.
    fn feed(&mut self, bytes: &[u8]);
    /// Copies bytes the engine wants on the wire into `out`; returns the count.
    fn poll_transmit(&mut self, out: &mut [u8]) -> usize;
    fn connect(&mut self) -> Result<(), LinkError>;
    fn interface(&self) -> Option<InterfaceId>;
    fn address(&self) -> Option<Ipv4Addr>;
}

pub trait LinkFactory {
    type Engine: LinkEngine;

    fn create(&mut self) -> Result<Self::Engine, LinkError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkCounters {
    pub status_events: u32,
    pub status_coalesced: u32,
    pub reconnects_scheduled: u32,
    pub connect_attempts: u32,
    pub engines_created: u32,
    pub connect_timeouts: u32,
    pub dropped_feed_bytes: u32,
}

/// Owns the engine handle, the protocol state machine and the backoff controller.
pub struct LinkManager<'a, F: LinkFactory> {
    factory: F,
    engine: Option<F::Engine>,
    flags: &'a StatusFlags,
    machine: LinkStateMachine,
    backoff: ReconnectBackoff,
    connecting_since: Option<Instant>,
    connect_timeout: Duration,
    counters: LinkCounters,
}

impl<'a, F: LinkFactory> LinkManager<'a, F> {
    pub fn new(factory: F, flags: &'a StatusFlags, policy: &GatewayPolicy) -> Self {
        Self {
            factory,
            engine: None,
            flags,
            machine: LinkStateMachine::new(),
            backoff: ReconnectBackoff::new(policy.min_backoff_ms, policy.max_backoff_ms),
            connecting_since: None,
            connect_timeout: Duration::from_millis(policy.connect_timeout_ms as u64),
            counters: LinkCounters::default(),
        }
    }

    pub fn status(&self) -> LinkStatus {
        self.machine.status()
    }

    pub fn is_up(&self) -> bool {
        matches!(self.status(), LinkStatus::Up)
    }

    pub fn engine_present(&self) -> bool {
        self.engine.is_some()
    }

    pub fn engine(&self) -> Option<&F::Engine> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut F::Engine> {
        self.engine.as_mut()
    }

    pub fn backoff(&self) -> &ReconnectBackoff {
        &self.backoff
    }

    pub fn counters(&self) -> LinkCounters {
        self.counters
    }

    pub fn interface(&self) -> Option<InterfaceId> {
        self.engine.as_ref().and_then(LinkEngine::interface)
    }

    pub fn address(&self) -> Option<Ipv4Addr> {
        self.engine.as_ref().and_then(LinkEngine::address)
    }

    /// Creates the engine if the handle is absent. Returns whether an engine exists after.
    pub fn ensure_engine(&mut self) -> bool {
        if self.engine.is_some() {
            return true;
        }
        match self.factory.create() {
            Ok(engine) => {
                self.engine = Some(engine);
                self.counters.engines_created = self.counters.engines_created.saturating_add(1);
                self.connecting_since = None;
                let _ = self.machine.dispatch(LinkEvent::EngineLost);
                info!(
                    "link: engine created count={}",
                    self.counters.engines_created
                );
                true
            }
            Err(err) => {
                warn!("link: engine create err={}", err);
                false
            }
        }
    }

    /// Forgets the engine handle, e.g. after the stack tore the interface down.
    pub fn drop_engine(&mut self) -> Option<LinkTransition> {
        self.engine = None;
        self.connecting_since = None;
        self.machine.dispatch(LinkEvent::EngineLost)
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        match self.engine.as_mut() {
            Some(engine) => engine.feed(bytes),
            None => {
                self.counters.dropped_feed_bytes = self
                    .counters
                    .dropped_feed_bytes
                    .saturating_add(bytes.len() as u32);
            }
        }
    }

    pub fn poll_transmit(&mut self, out: &mut [u8]) -> usize {
        self.engine
            .as_mut()
            .map(|engine| engine.poll_transmit(out))
            .unwrap_or(0)
    }

    /// Starts negotiation. A no-op while already connecting or up.
    pub fn connect(&mut self, now: Instant) -> Result<(), LinkError> {
        if matches!(self.status(), LinkStatus::Connecting | LinkStatus::Up) {
            return Ok(());
        }
        let Some(engine) = self.engine.as_mut() else {
            return Err(LinkError::NoEngine);
        };
        self.counters.connect_attempts = self.counters.connect_attempts.saturating_add(1);
        let result = engine.connect();
        let _ = self.machine.dispatch(LinkEvent::ConnectRequested);
        self.connecting_since = Some(now);
        match result {
            Ok(()) => {
                debug!(
                    "link: connect attempt={}",
                    self.counters.connect_attempts
                );
                Ok(())
            }
            Err(err) => {
                warn!("link: connect err={}", err);
                let code = match err {
                    LinkError::ConnectRejected(code) => code,
                    LinkError::CreateFailed | LinkError::NoEngine => 3,
                };
                self.apply(now, LinkEvent::Status(code));
                Err(err)
            }
        }
    }

    /// Drains the status callback flags; runs on the main loop only.
    pub fn poll_status(&mut self, now: Instant) -> Option<LinkTransition> {
        let notice = self.flags.take()?;
        self.counters.status_events = self.counters.status_events.saturating_add(1);
        self.counters.status_coalesced =
            self.counters.status_coalesced.saturating_add(notice.coalesced);
        self.apply(now, LinkEvent::Status(notice.code))
    }

    /// Fails a negotiation that has been connecting for longer than the connect timeout.
    pub fn check_connect_timeout(&mut self, now: Instant) -> Option<LinkTransition> {
        let since = self.connecting_since?;
        if !matches!(self.status(), LinkStatus::Connecting) {
            self.connecting_since = None;
            return None;
        }
        if now.saturating_duration_since(since) < self.connect_timeout {
            return None;
        }
        self.counters.connect_timeouts = self.counters.connect_timeouts.saturating_add(1);
        self.apply(now, LinkEvent::ConnectTimeout(LINK_CODE_CONNECT_TIME))
    }

    /// Returns whether a retry was actually scheduled (false if one is already pending).
    pub fn schedule_reconnect(&mut self, now: Instant) -> bool {
        let delay_ms = self.backoff.backoff_ms();
        if !self.backoff.schedule_reconnect(now) {
            return false;
        }
        self.counters.reconnects_scheduled = self.counters.reconnects_scheduled.saturating_add(1);
        info!(
            "link: reconnect scheduled delay_ms={} next_backoff_ms={}",
            delay_ms,
            self.backoff.backoff_ms()
        );
        true
    }

    /// Runs a due retry: recreates the engine when needed, then connects.
    pub fn service_reconnect(&mut self, now: Instant) -> bool {
        if !self.backoff.tick(now) {
            return false;
        }
        if !self.ensure_engine() {
            let _ = self.schedule_reconnect(now);
            return true;
        }
        let _ = self.connect(now);
        true
    }

    fn apply(&mut self, now: Instant, event: LinkEvent) -> Option<LinkTransition> {
        let transition = self.machine.dispatch(event)?;
        match transition {
            LinkTransition::Up => {
                self.connecting_since = None;
                self.backoff.on_success();
                match self.address() {
                    Some(addr) => info!("link: up addr={}", addr),
                    None => info!("link: up"),
                }
            }
            LinkTransition::Failed(code) => {
                self.connecting_since = None;
                warn!(
                    "link: failed code={} ({})",
                    code,
                    status_code_label(code)
                );
                let _ = self.schedule_reconnect(now);
            }
            LinkTransition::Lost => {
                self.connecting_since = None;
                info!("link: engine lost");
            }
            LinkTransition::Connecting => {}
        }
        Some(transition)
    }
}
