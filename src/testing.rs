//! Host-side stand-ins for every provider the supervisor talks to.
//!
//! Each fake keeps its state behind `Rc<RefCell<..>>` so a test can hand one clone to the
//! component under test and keep another for inspection and fault injection.

use std::{cell::RefCell, collections::VecDeque, net::Ipv4Addr, rc::Rc, vec::Vec};

use embassy_time::Duration;
use embedded_io::{ErrorKind, ErrorType, Read, ReadReady, Write, WriteReady};
use embedded_storage::{ReadStorage, Storage};

use crate::{
    broker::{BrokerError, BrokerService},
    health::{AccessPoint, AncillaryServices, ApError, ApStatus, SystemProbe},
    link::{InterfaceId, LinkEngine, LinkError, LinkFactory},
    nat::{NatCapacity, NatError, NatProvider, PortMapping},
    runtime::{Platform, PlatformParts},
};

#[derive(Default)]
pub(crate) struct SerialState {
    pub rx: VecDeque<u8>,
    pub tx: Vec<u8>,
    /// Bytes accepted per `write` call; `None` accepts everything.
    pub write_chunk: Option<usize>,
    pub write_blocked: bool,
    pub reads: u32,
    pub read_error: Option<ErrorKind>,
    pub write_error: Option<ErrorKind>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeSerial(pub Rc<RefCell<SerialState>>);

impl ErrorType for FakeSerial {
    type Error = ErrorKind;
}

impl Read for FakeSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut state = self.0.borrow_mut();
        state.reads += 1;
        if let Some(kind) = state.read_error {
            return Err(kind);
        }
        let n = buf.len().min(state.rx.len());
        for slot in &mut buf[..n] {
            *slot = state.rx.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl ReadReady for FakeSerial {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        let state = self.0.borrow();
        Ok(!state.rx.is_empty() || state.read_error.is_some())
    }
}

impl Write for FakeSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut state = self.0.borrow_mut();
        if let Some(kind) = state.write_error {
            return Err(kind);
        }
        let n = state.write_chunk.map_or(buf.len(), |chunk| chunk.min(buf.len()));
        state.tx.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl WriteReady for FakeSerial {
    fn write_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.0.borrow().write_blocked)
    }
}

pub(crate) struct EngineState {
    pub fed: Vec<u8>,
    pub outbound: VecDeque<u8>,
    pub connects: u32,
    pub connect_result: Result<(), LinkError>,
    pub interface: Option<InterfaceId>,
    pub address: Option<Ipv4Addr>,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            fed: Vec::new(),
            outbound: VecDeque::new(),
            connects: 0,
            connect_result: Ok(()),
            interface: Some(InterfaceId(2)),
            address: Some(Ipv4Addr::new(10, 64, 64, 2)),
        }
    }
}

pub(crate) struct FakeEngine(Rc<RefCell<EngineState>>);

impl LinkEngine for FakeEngine {
    fn feed(&mut self, bytes: &[u8]) {
        self.0.borrow_mut().fed.extend_from_slice(bytes);
    }

    fn poll_transmit(&mut self, out: &mut [u8]) -> usize {
        let mut state = self.0.borrow_mut();
        let n = out.len().min(state.outbound.len());
        for slot in &mut out[..n] {
            *slot = state.outbound.pop_front().unwrap();
        }
        n
    }

    fn connect(&mut self) -> Result<(), LinkError> {
        let mut state = self.0.borrow_mut();
        state.connects += 1;
        state.connect_result
    }

    fn interface(&self) -> Option<InterfaceId> {
        self.0.borrow().interface
    }

    fn address(&self) -> Option<Ipv4Addr> {
        self.0.borrow().address
    }
}

#[derive(Default)]
pub(crate) struct FactoryState {
    pub engine: Rc<RefCell<EngineState>>,
    pub created: u32,
    pub fail_next: u32,
}

#[derive(Clone, Default)]
pub(crate) struct FakeFactory(pub Rc<RefCell<FactoryState>>);

impl FakeFactory {
    pub fn engine(&self) -> Rc<RefCell<EngineState>> {
        self.0.borrow().engine.clone()
    }
}

impl LinkFactory for FakeFactory {
    type Engine = FakeEngine;

    fn create(&mut self) -> Result<FakeEngine, LinkError> {
        let mut state = self.0.borrow_mut();
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(LinkError::CreateFailed);
        }
        state.created += 1;
        Ok(FakeEngine(state.engine.clone()))
    }
}

#[derive(Default)]
pub(crate) struct NatState {
    pub interfaces: Vec<InterfaceId>,
    pub enabled_on: Option<InterfaceId>,
    pub enable_calls: u32,
    pub fail_next_enable: Option<NatError>,
    pub port_maps: Vec<PortMapping>,
    pub port_map_calls: u32,
    pub fail_next_port_map: Option<NatError>,
    pub last_capacity: Option<NatCapacity>,
    pub find_calls: u32,
}

#[derive(Clone, Default)]
pub(crate) struct FakeNat(pub Rc<RefCell<NatState>>);

impl FakeNat {
    pub fn with_interface(id: InterfaceId) -> Self {
        let nat = Self::default();
        nat.0.borrow_mut().interfaces.push(id);
        nat
    }
}

impl NatProvider for FakeNat {
    fn find_interface(&mut self, id: InterfaceId) -> bool {
        let mut state = self.0.borrow_mut();
        state.find_calls += 1;
        state.interfaces.contains(&id)
    }

    fn is_enabled(&mut self, id: InterfaceId) -> bool {
        self.0.borrow().enabled_on == Some(id)
    }

    fn enable(&mut self, id: InterfaceId, capacity: NatCapacity) -> Result<(), NatError> {
        let mut state = self.0.borrow_mut();
        state.enable_calls += 1;
        state.last_capacity = Some(capacity);
        if let Some(err) = state.fail_next_enable.take() {
            return Err(err);
        }
        state.enabled_on = Some(id);
        Ok(())
    }

    fn add_port_map(&mut self, mapping: &PortMapping) -> Result<(), NatError> {
        let mut state = self.0.borrow_mut();
        state.port_map_calls += 1;
        if let Some(err) = state.fail_next_port_map.take() {
            return Err(err);
        }
        state.port_maps.push(*mapping);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct BrokerState {
    pub slices: u32,
    pub budgets: Vec<Duration>,
    pub restarts: u32,
    pub failing: Option<BrokerError>,
}

#[derive(Clone, Default)]
pub(crate) struct FakeBroker(pub Rc<RefCell<BrokerState>>);

impl BrokerService for FakeBroker {
    fn service_slice(&mut self, budget: Duration) -> Result<(), BrokerError> {
        let mut state = self.0.borrow_mut();
        state.slices += 1;
        state.budgets.push(budget);
        match state.failing {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn restart(&mut self) -> Result<(), BrokerError> {
        self.0.borrow_mut().restarts += 1;
        Ok(())
    }
}

pub(crate) struct ApState {
    pub status: ApStatus,
    pub reinits: u32,
    /// Whether a re-init brings the AP back up.
    pub reinit_heals: bool,
}

impl Default for ApState {
    fn default() -> Self {
        Self {
            status: ApStatus {
                up: true,
                address: Some(Ipv4Addr::new(192, 168, 4, 1)),
                stations: 0,
            },
            reinits: 0,
            reinit_heals: true,
        }
    }
}

#[derive(Clone, Default)]
pub(crate) struct FakeAp(pub Rc<RefCell<ApState>>);

impl FakeAp {
    pub fn set_down(&self) {
        let mut state = self.0.borrow_mut();
        state.status.up = false;
        state.status.address = None;
    }
}

impl AccessPoint for FakeAp {
    fn status(&mut self) -> ApStatus {
        self.0.borrow().status
    }

    fn reinit(&mut self) -> Result<(), ApError> {
        let mut state = self.0.borrow_mut();
        state.reinits += 1;
        if state.reinit_heals {
            state.status.up = true;
            state.status.address = Some(Ipv4Addr::new(192, 168, 4, 1));
            Ok(())
        } else {
            Err(ApError::Radio)
        }
    }
}

#[derive(Default)]
pub(crate) struct ServicesState {
    pub calls: u32,
    /// Listeners that will report as restarted on the next call.
    pub down: u8,
}

#[derive(Clone, Default)]
pub(crate) struct FakeServices(pub Rc<RefCell<ServicesState>>);

impl AncillaryServices for FakeServices {
    fn ensure_running(&mut self) -> u8 {
        let mut state = self.0.borrow_mut();
        state.calls += 1;
        core::mem::take(&mut state.down)
    }
}

#[derive(Clone, Copy)]
pub(crate) struct FakeSystem {
    pub free: u32,
    pub largest: u32,
    pub clock: Option<u64>,
}

impl Default for FakeSystem {
    fn default() -> Self {
        Self {
            free: 120_000,
            largest: 90_000,
            clock: None,
        }
    }
}

impl SystemProbe for FakeSystem {
    fn free_memory(&self) -> u32 {
        self.free
    }

    fn largest_free_block(&self) -> u32 {
        self.largest
    }

    fn wall_clock_secs(&self) -> Option<u64> {
        self.clock
    }
}

pub(crate) struct FakePlatform;

impl Platform for FakePlatform {
    type Device = FakeSerial;
    type Links = FakeFactory;
    type Nat = FakeNat;
    type Broker = FakeBroker;
    type AccessPoint = FakeAp;
    type Services = FakeServices;
    type System = FakeSystem;
}

/// Handles that stay with the test after the parts move into a supervisor.
#[derive(Clone)]
pub(crate) struct Probes {
    pub serial: FakeSerial,
    pub links: FakeFactory,
    pub nat: FakeNat,
    pub broker: FakeBroker,
    pub ap: FakeAp,
    pub services: FakeServices,
}

pub(crate) fn fake_parts() -> (PlatformParts<FakePlatform>, Probes) {
    let probes = Probes {
        serial: FakeSerial::default(),
        links: FakeFactory::default(),
        nat: FakeNat::with_interface(InterfaceId(2)),
        broker: FakeBroker::default(),
        ap: FakeAp::default(),
        services: FakeServices::default(),
    };
    let parts = PlatformParts {
        device: probes.serial.clone(),
        links: probes.links.clone(),
        nat: probes.nat.clone(),
        broker: probes.broker.clone(),
        access_point: probes.ap.clone(),
        services: probes.services.clone(),
        system: FakeSystem::default(),
    };
    (parts, probes)
}

/// Byte-addressed flash image that starts erased.
pub(crate) struct MemFlash {
    pub bytes: Vec<u8>,
    pub writes: u32,
}

impl MemFlash {
    pub fn erased(len: usize) -> Self {
        Self {
            bytes: vec![0xFF; len],
            writes: 0,
        }
    }
}

#[derive(Debug)]
pub(crate) struct OutOfBounds;

impl ReadStorage for MemFlash {
    type Error = OutOfBounds;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        let src = self
            .bytes
            .get(start..start + bytes.len())
            .ok_or(OutOfBounds)?;
        bytes.copy_from_slice(src);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.bytes.len()
    }
}

impl Storage for MemFlash {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        let dst = self
            .bytes
            .get_mut(start..start + bytes.len())
            .ok_or(OutOfBounds)?;
        dst.copy_from_slice(bytes);
        self.writes += 1;
        Ok(())
    }
}
