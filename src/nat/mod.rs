//! NAPT between the uplink interface and the access point.


use core::net::Ipv4Addr;

use heapless::Vec;
use log::{debug, info, warn};

use crate::{
    config::{GatewayPolicy, NAT_PORT_MAP_ENTRIES, NAT_PORT_MAP_SLOTS, NAT_TRANSLATION_ENTRIES},
    link::InterfaceId,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NatProtocol {
    Tcp,
    Udp,
}

/// Static inbound forward from the uplink side to a host on the AP side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortMapping {
    pub protocol: NatProtocol,
    pub external_port: u16,
    pub internal_addr: Ipv4Addr,
    pub internal_port: u16,
}

/// Table sizes handed to the translation engine; fixed at build time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NatCapacity {
    pub translation_entries: u16,
    pub port_map_entries: u8,
}

impl NatCapacity {
    pub const fn build_time() -> Self {
        Self {
            translation_entries: NAT_TRANSLATION_ENTRIES,
            port_map_entries: NAT_PORT_MAP_ENTRIES,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NatError {
    InterfaceMissing,
    TableFull,
    Rejected(i8),
}

impl NatError {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InterfaceMissing => "interface_missing",
            Self::TableFull => "table_full",
            Self::Rejected(_) => "rejected",
        }
    }
}

impl core::fmt::Display for NatError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Rejected(code) => write!(f, "rejected code={}", code),
            _ => f.write_str(self.as_str()),
        }
    }
}

/// The translation engine inside the IP stack.
pub trait NatProvider {
    fn find_interface(&mut self, id: InterfaceId) -> bool;
    fn is_enabled(&mut self, id: InterfaceId) -> bool;
    fn enable(&mut self, id: InterfaceId, capacity: NatCapacity) -> Result<(), NatError>;
    fn add_port_map(&mut self, mapping: &PortMapping) -> Result<(), NatError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NatBinding {
    pub source_interface: Option<InterfaceId>,
    pub established: bool,
    /// Configured port maps the provider has not accepted yet.
    pub pending_port_maps: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NatReadiness {
    NotReady,
    Armed,
    AlreadyArmed,
    Failed(NatError),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NatCounters {
    pub arms: u32,
    pub failures: u32,
    pub port_map_failures: u32,
    pub not_ready: u32,
}

// One bit per port map slot in `NatEnabler::applied`.
const _: () = assert!(NAT_PORT_MAP_SLOTS <= u32::BITS as usize);

pub struct NatEnabler<N> {
    provider: N,
    binding: NatBinding,
    capacity: NatCapacity,
    port_maps: Vec<PortMapping, NAT_PORT_MAP_SLOTS>,
    applied: u32,
    counters: NatCounters,
}

impl<N: NatProvider> NatEnabler<N> {
    pub fn new(provider: N, policy: &GatewayPolicy) -> Self {
        Self {
            provider,
            binding: NatBinding::default(),
            capacity: NatCapacity::build_time(),
            port_maps: policy.port_maps.clone(),
            applied: 0,
            counters: NatCounters::default(),
        }
    }

    pub fn binding(&self) -> NatBinding {
        self.binding
    }

    pub fn counters(&self) -> NatCounters {
        self.counters
    }

    pub fn provider_mut(&mut self) -> &mut N {
        &mut self.provider
    }

    /// Arms translation on `link_interface` unless it is already armed there.
    ///
    /// Called every health tick while the link is up; a binding the provider lost (interface
    /// recreated underneath us) is re-armed here, and port maps the provider refused earlier
    /// are offered again.
    pub fn ensure(&mut self, link_interface: Option<InterfaceId>) -> NatReadiness {
        let Some(id) = link_interface else {
            self.counters.not_ready = self.counters.not_ready.saturating_add(1);
            return NatReadiness::NotReady;
        };
        if !self.provider.find_interface(id) {
            self.counters.not_ready = self.counters.not_ready.saturating_add(1);
            debug!("nat: interface {} not ready", id.0);
            return NatReadiness::NotReady;
        }

        if self.binding.established
            && self.binding.source_interface == Some(id)
            && self.provider.is_enabled(id)
        {
            if self.binding.pending_port_maps > 0 {
                self.apply_port_maps();
            }
            return NatReadiness::AlreadyArmed;
        }

        if let Err(err) = self.provider.enable(id, self.capacity) {
            self.binding.established = false;
            self.counters.failures = self.counters.failures.saturating_add(1);
            warn!("nat: arm err={} if={}", err, id.0);
            return NatReadiness::Failed(err);
        }

        self.applied = 0;
        self.binding = NatBinding {
            source_interface: Some(id),
            established: true,
            pending_port_maps: 0,
        };
        self.apply_port_maps();
        self.counters.arms = self.counters.arms.saturating_add(1);
        info!(
            "nat: armed if={} entries={} port_maps={} pending={}",
            id.0,
            self.capacity.translation_entries,
            self.port_maps.len(),
            self.binding.pending_port_maps
        );
        NatReadiness::Armed
    }

    /// The link left Up; the binding dies with it.
    pub fn invalidate(&mut self) {
        if self.binding.established {
            debug!("nat: binding released");
        }
        self.binding = NatBinding::default();
        self.applied = 0;
    }

    fn apply_port_maps(&mut self) {
        for (slot, mapping) in self.port_maps.iter().enumerate() {
            let bit = 1u32 << slot;
            if self.applied & bit != 0 {
                continue;
            }
            match self.provider.add_port_map(mapping) {
                Ok(()) => self.applied |= bit,
                Err(err) => {
                    self.counters.port_map_failures =
                        self.counters.port_map_failures.saturating_add(1);
                    warn!(
                        "nat: port_map err={} ext={} -> {}:{}",
                        err, mapping.external_port, mapping.internal_addr, mapping.internal_port
                    );
                }
            }
        }
        let pending = self.port_maps.len() - self.applied.count_ones() as usize;
        self.binding.pending_port_maps = pending as u8;
    }
}
