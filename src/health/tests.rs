use core::net::Ipv4Addr;

use embassy_time::Instant;

use super::{
    fragmentation_pct, ApCheck, ApStatus, HealthSupervisor, HealthTargets, LinkCheck,
    TelemetrySnapshot,
};
use crate::{
    broker::{BrokerScheduler, BrokerPolicy},
    config::GatewayPolicy,
    link::{LinkManager, LinkStatus, StatusFlags, LINK_CODE_OK},
    nat::{NatEnabler, NatReadiness},
    testing::{FakeAp, FakeBroker, FakeFactory, FakeNat, FakeServices, FakeSystem},
};

fn at(ms: u64) -> Instant {
    Instant::from_millis(ms)
}

fn supervisor() -> HealthSupervisor {
    HealthSupervisor::new(&GatewayPolicy::defaults(), at(0))
}

#[test]
fn tick_is_due_once_per_period_without_catch_up() {
    let mut health = supervisor();
    assert!(!health.tick_due(at(2_999)));
    assert!(health.tick_due(at(3_000)));
    assert!(!health.tick_due(at(3_001)));
    // A long stall yields one tick, not a burst.
    assert!(health.tick_due(at(20_000)));
    assert!(!health.tick_due(at(22_999)));
    assert!(health.tick_due(at(23_000)));
    assert_eq!(health.counters().ticks, 3);
}

#[test]
fn healthy_ap_is_left_alone() {
    let ap = FakeAp::default();
    let mut health = supervisor();
    assert_eq!(
        health.check_access_point(at(3_000), &mut ap.clone()),
        ApCheck::Healthy
    );
    assert_eq!(ap.0.borrow().reinits, 0);
}

#[test]
fn ap_without_address_counts_as_down() {
    let ap = FakeAp::default();
    ap.0.borrow_mut().status.address = None;
    let mut health = supervisor();
    assert_eq!(
        health.check_access_point(at(3_000), &mut ap.clone()),
        ApCheck::Reinitialized
    );
}

#[test]
fn two_ap_reinits_within_one_period_do_not_both_fire() {
    let ap = FakeAp::default();
    ap.0.borrow_mut().reinit_heals = false;
    ap.set_down();
    let mut health = supervisor();
    let mut handle = ap.clone();

    assert!(matches!(
        health.check_access_point(at(3_000), &mut handle),
        ApCheck::Failed(_)
    ));
    assert_eq!(
        health.check_access_point(at(4_500), &mut handle),
        ApCheck::Throttled
    );
    assert_eq!(ap.0.borrow().reinits, 1);

    assert!(matches!(
        health.check_access_point(at(6_000), &mut handle),
        ApCheck::Failed(_)
    ));
    assert_eq!(ap.0.borrow().reinits, 2);
    assert_eq!(health.counters().ap_reinit_throttled, 1);
}

#[test]
fn disabled_ap_is_never_touched() {
    let ap = FakeAp::default();
    ap.set_down();
    let mut policy = GatewayPolicy::defaults();
    policy.ap_enabled = false;
    let mut health = HealthSupervisor::new(&policy, at(0));
    assert_eq!(
        health.check_access_point(at(3_000), &mut ap.clone()),
        ApCheck::Disabled
    );
    assert_eq!(ap.0.borrow().reinits, 0);
}

#[test]
fn missing_engine_is_recreated_and_handed_to_backoff() {
    let factory = FakeFactory::default();
    let flags = StatusFlags::new();
    let mut link = LinkManager::new(factory.clone(), &flags, &GatewayPolicy::defaults());
    let mut health = supervisor();

    assert_eq!(health.check_link(at(3_000), &mut link), LinkCheck::EngineRecreated);
    assert!(link.engine_present());
    assert!(link.backoff().pending());
    // The check itself never connects.
    assert_eq!(factory.engine().borrow().connects, 0);
    assert_eq!(health.counters().engine_recreations, 1);
}

#[test]
fn failed_link_is_handed_off_once() {
    let factory = FakeFactory::default();
    let flags = StatusFlags::new();
    let mut link = LinkManager::new(factory.clone(), &flags, &GatewayPolicy::defaults());
    assert!(link.ensure_engine());
    let mut health = supervisor();

    assert_eq!(health.check_link(at(3_000), &mut link), LinkCheck::HandedOff);
    assert_eq!(health.check_link(at(3_100), &mut link), LinkCheck::RetryPending);
    assert_eq!(link.counters().reconnects_scheduled, 1);
}

#[test]
fn negotiating_link_is_not_disturbed() {
    let factory = FakeFactory::default();
    let flags = StatusFlags::new();
    let mut link = LinkManager::new(factory.clone(), &flags, &GatewayPolicy::defaults());
    assert!(link.ensure_engine());
    let _ = link.connect(at(0));
    let mut health = supervisor();

    assert_eq!(health.check_link(at(3_000), &mut link), LinkCheck::Negotiating);
    assert!(!link.backoff().pending());

    // Past the connect timeout the check fails it first.
    assert_eq!(health.check_link(at(30_000), &mut link), LinkCheck::RetryPending);
    assert!(matches!(link.status(), LinkStatus::Error(_)));
}

#[test]
fn nat_is_only_asserted_while_link_is_up() {
    let factory = FakeFactory::default();
    let flags = StatusFlags::new();
    let mut link = LinkManager::new(factory.clone(), &flags, &GatewayPolicy::defaults());
    let nat_probe = FakeNat::with_interface(crate::link::InterfaceId(2));
    let mut nat = NatEnabler::new(nat_probe.clone(), &GatewayPolicy::defaults());
    let mut health = supervisor();

    assert_eq!(health.check_nat(&link, &mut nat), None);
    assert_eq!(nat_probe.0.borrow().find_calls, 0);

    assert!(link.ensure_engine());
    let _ = link.connect(at(0));
    flags.post(LINK_CODE_OK);
    let _ = link.poll_status(at(10));
    assert_eq!(health.check_nat(&link, &mut nat), Some(NatReadiness::Armed));
    assert_eq!(
        health.check_nat(&link, &mut nat),
        Some(NatReadiness::AlreadyArmed)
    );
}

#[test]
fn stalled_broker_restarts_once_per_tick_until_refreshed() {
    let broker_probe = FakeBroker::default();
    let mut broker = BrokerScheduler::new(
        broker_probe.clone(),
        BrokerPolicy::Plain { slice_ms: 20 },
        10_000,
        at(0),
    );
    let mut health = supervisor();

    assert!(!health.check_broker(at(9_000), &mut broker));
    assert!(health.check_broker(at(12_000), &mut broker));
    assert_eq!(broker_probe.0.borrow().restarts, 1);
    assert!(health.check_broker(at(15_000), &mut broker));
    assert_eq!(broker_probe.0.borrow().restarts, 2);

    let _ = broker.service(at(15_100));
    assert!(!health.check_broker(at(18_000), &mut broker));
    assert_eq!(broker_probe.0.borrow().restarts, 2);
}

#[test]
fn listeners_are_reasserted_every_tick() {
    let services = FakeServices::default();
    let mut health = supervisor();
    let mut handle = services.clone();
    assert_eq!(health.check_services(&mut handle), 0);
    services.0.borrow_mut().down = 2;
    assert_eq!(health.check_services(&mut handle), 2);
    assert_eq!(services.0.borrow().calls, 2);
    assert_eq!(health.counters().service_restarts, 2);
}

#[test]
fn run_checks_covers_every_component() {
    let factory = FakeFactory::default();
    let flags = StatusFlags::new();
    let mut link = LinkManager::new(factory.clone(), &flags, &GatewayPolicy::defaults());
    let mut nat = NatEnabler::new(
        FakeNat::with_interface(crate::link::InterfaceId(2)),
        &GatewayPolicy::defaults(),
    );
    let mut broker = BrokerScheduler::new(
        FakeBroker::default(),
        BrokerPolicy::Plain { slice_ms: 20 },
        10_000,
        at(0),
    );
    let ap = FakeAp::default();
    ap.set_down();
    let services = FakeServices::default();
    let mut health = supervisor();

    let report = health.run_checks(
        at(12_000),
        HealthTargets {
            link: &mut link,
            nat: &mut nat,
            broker: &mut broker,
            ap: &mut ap.clone(),
            services: &mut services.clone(),
        },
    );
    assert_eq!(report.ap, ApCheck::Reinitialized);
    assert_eq!(report.link, LinkCheck::EngineRecreated);
    assert_eq!(report.nat, None);
    assert!(report.broker_restarted);
    assert_eq!(services.0.borrow().calls, 1);
}

#[test]
fn fragmentation_is_share_of_free_memory_outside_largest_block() {
    assert_eq!(fragmentation_pct(0, 0), 0);
    assert_eq!(fragmentation_pct(100_000, 100_000), 0);
    assert_eq!(fragmentation_pct(100_000, 25_000), 75);
    assert_eq!(fragmentation_pct(100, 500), 0);
}

#[test]
fn telemetry_is_sampled_on_its_own_period() {
    let factory = FakeFactory::default();
    let flags = StatusFlags::new();
    let link = LinkManager::new(factory, &flags, &GatewayPolicy::defaults());
    let mut ap = FakeAp::default();
    let system = FakeSystem {
        clock: Some(1_700_000_000),
        ..FakeSystem::default()
    };
    let mut health = supervisor();

    let snapshot = *health
        .sample_telemetry(at(0), at(0), &link, &mut ap, &system)
        .unwrap();
    assert_eq!(snapshot.fragmentation_pct, 25);
    assert_eq!(snapshot.link_status, LinkStatus::Down);
    assert_eq!(snapshot.timestamp, Some(1_700_000_000));

    assert!(health
        .sample_telemetry(at(29_999), at(0), &link, &mut ap, &system)
        .is_none());
    let later = health
        .sample_telemetry(at(30_000), at(0), &link, &mut ap, &system)
        .unwrap();
    assert_eq!(later.uptime_ms, 30_000);
    assert_eq!(health.counters().telemetry_samples, 2);
}

#[test]
fn telemetry_line_names_link_state_and_address() {
    let snapshot = TelemetrySnapshot {
        uptime_ms: 61_000,
        free_memory: 100_000,
        largest_free_block: 50_000,
        fragmentation_pct: 50,
        ap: ApStatus {
            up: true,
            address: Some(Ipv4Addr::new(192, 168, 4, 1)),
            stations: 3,
        },
        link_status: LinkStatus::Up,
        link_address: Some(Ipv4Addr::new(10, 64, 64, 2)),
        timestamp: None,
    };
    assert_eq!(
        snapshot.log_line().as_str(),
        "telemetry: uptime_ms=61000 free=100000 largest=50000 frag_pct=50 ap_up=true \
         stations=3 link=up link_addr=10.64.64.2"
    );
}
