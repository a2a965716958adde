use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

use ecm::{Ecm, EcmError, EcmEvent, EthInterface, InterfaceId, IpSetting, StackError};
use ecm_test_support::{fast_config, init_logging, Dhcp, EventLog, SimMac, SimPhy, SimStack};

struct Rig {
    ecm: Ecm,
    stack: Arc<SimStack>,
    iface: EthInterface,
}

fn rig(stack: SimStack) -> Rig {
    init_logging();
    let stack = Arc::new(stack);
    let ecm = Ecm::new(fast_config(), Arc::new(SimMac::new()), stack.clone()).expect("manager");
    ecm.init().expect("init");
    let iface = ecm.open(InterfaceId::Eth0, Arc::new(SimPhy::new())).expect("open");
    Rig { ecm, stack, iface }
}

fn static_v4() -> IpSetting {
    IpSetting {
        ip_address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)),
        gateway: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        netmask: IpAddr::V4(Ipv4Addr::new(255, 255, 0, 0)),
    }
}

#[test]
fn dhcp_connect_yields_address_and_rejects_reconnect() {
    let rig = rig(SimStack::new());

    let address = rig.iface.connect(None).expect("connect");
    assert_eq!(address, IpAddr::V4(Ipv4Addr::new(192, 168, 1, 42)));
    assert!(rig.iface.is_connected());

    let err = rig.iface.connect(None).expect_err("second connect");
    assert!(matches!(err, EcmError::AlreadyConnected));
    assert!(rig.iface.is_connected());
    assert_eq!(rig.stack.stats().added, 1);
    assert_eq!(rig.stack.registered(), 1);
}

#[test]
fn connect_waits_for_a_late_lease() {
    let rig = rig(SimStack::new().with_dhcp(Dhcp::LeaseAfter {
        polls: 10,
        address: Ipv4Addr::new(172, 16, 0, 9),
    }));
    let address = rig.iface.connect(None).expect("connect");
    assert_eq!(address, IpAddr::V4(Ipv4Addr::new(172, 16, 0, 9)));
}

#[test]
fn disconnect_removes_interface_exactly_once() {
    let rig = rig(SimStack::new());
    rig.iface.connect(None).expect("connect");

    rig.iface.disconnect().expect("disconnect");
    assert!(!rig.iface.is_connected());
    let stats = rig.stack.stats();
    assert_eq!(stats.removed, 1);
    assert_eq!(stats.ip_down, 1);
    assert_eq!(rig.stack.registered(), 0);

    let err = rig.iface.disconnect().expect_err("second disconnect");
    assert!(matches!(err, EcmError::NotConnected));
    assert_eq!(rig.stack.stats().removed, 1);
}

#[test]
fn reconnect_after_disconnect() {
    let rig = rig(SimStack::new());
    rig.iface.connect(None).expect("connect");
    rig.iface.disconnect().expect("disconnect");
    rig.iface.connect(None).expect("reconnect");
    assert!(rig.iface.is_connected());
    assert_eq!(rig.stack.stats().added, 2);
}

#[test]
fn dhcp_budget_exhaustion_unwinds_registration() {
    let rig = rig(SimStack::new().with_dhcp(Dhcp::Never));

    let err = rig.iface.connect(None).expect_err("no lease");
    assert!(matches!(err, EcmError::DhcpTimeout));
    assert!(!rig.iface.is_connected());
    let stats = rig.stack.stats();
    assert_eq!(stats.ip_down, 1);
    assert_eq!(stats.removed, 1);
    assert_eq!(rig.stack.registered(), 0);
}

#[test]
fn ip_up_failures_are_mapped() {
    let cases: [(StackError, fn(&EcmError) -> bool); 3] = [
        (StackError::StartingDhcp, |err| matches!(err, EcmError::StartingDhcp)),
        (StackError::DhcpWaitTimeout, |err| matches!(err, EcmError::DhcpTimeout)),
        (StackError::Other("arp table full".into()), |err| matches!(err, EcmError::Connection(_))),
    ];
    for (stack_err, expected) in cases {
        let rig = rig(SimStack::new().failing_ip_up(stack_err));
        let err = rig.iface.connect(None).expect_err("ip up fails");
        assert!(expected(&err), "unexpected error {err:?}");
        assert_eq!(rig.stack.registered(), 0);
        assert_eq!(rig.stack.stats().removed, 1);
        assert!(!rig.iface.is_connected());
    }
}

#[test]
fn static_ipv6_is_rejected_before_registration() {
    let rig = rig(SimStack::new());
    let setting = IpSetting {
        ip_address: IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 5)),
        gateway: IpAddr::V6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1)),
        netmask: IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    let err = rig.iface.connect(Some(&setting)).expect_err("ipv6 static");
    assert!(matches!(err, EcmError::StaticIpNotSupported));
    assert_eq!(rig.stack.stats().added, 0);
}

#[test]
fn static_ipv4_skips_dhcp() {
    let rig = rig(SimStack::new().with_dhcp(Dhcp::Never));
    let setting = static_v4();

    let address = rig.iface.connect(Some(&setting)).expect("connect");
    assert_eq!(address, setting.ip_address);
    assert_eq!(IpAddr::V4(rig.iface.gateway_address().expect("gateway")), setting.gateway);
    assert_eq!(IpAddr::V4(rig.iface.netmask_address().expect("netmask")), setting.netmask);
}

#[test]
fn connect_registers_configured_mac() {
    let rig = rig(SimStack::new());
    rig.iface.connect(None).expect("connect");
    assert_eq!(rig.stack.mac_for(InterfaceId::Eth0), Some(rig.iface.mac_address()));
}

#[test]
fn connect_times_out_when_link_drops() {
    init_logging();
    let stack = Arc::new(SimStack::new());
    let phy = Arc::new(SimPhy::new());
    let ecm = Ecm::new(fast_config(), Arc::new(SimMac::new()), stack.clone()).expect("manager");
    ecm.init().expect("init");
    let log = EventLog::new();
    ecm.register_event_handler(log.handler("watch")).expect("register");
    let iface = ecm.open(InterfaceId::Eth0, phy.clone()).expect("open");

    // Let the monitor record link up, then pull the cable.
    assert!(log.wait_for(1, Duration::from_secs(2)));
    phy.set_link(false);
    assert!(log.wait_for(2, Duration::from_secs(2)));
    assert_eq!(log.events_for("watch"), vec![EcmEvent::Connected, EcmEvent::Disconnected]);

    let err = iface.connect(None).expect_err("link down");
    assert!(matches!(err, EcmError::LinkTimeout(_)));
    assert_eq!(stack.registered(), 0);
    assert!(!iface.is_connected());
}

#[test]
fn connect_requires_initialized_manager() {
    let rig = rig(SimStack::new());
    rig.ecm.deinit().expect("deinit");
    assert!(matches!(rig.iface.connect(None), Err(EcmError::NotInitialized)));
    assert!(matches!(rig.iface.disconnect(), Err(EcmError::NotInitialized)));
}

#[test]
fn address_changes_reach_event_handlers() {
    let log = EventLog::new();
    let rig = rig(SimStack::new());
    rig.ecm.register_event_handler(log.handler("addr")).expect("register");
    rig.iface.connect(None).expect("connect");

    let netif = rig.stack.netif_for(InterfaceId::Eth0).expect("netif");
    let renewed = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 77));
    assert!(rig.stack.trigger_ip_change(netif, renewed));

    let changes: Vec<_> = log
        .records()
        .into_iter()
        .filter(|record| record.event == EcmEvent::IpChanged)
        .collect();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].data.ip_address, Some(renewed));
    assert_eq!(changes[0].data.interface, Some(InterfaceId::Eth0));

    rig.iface.disconnect().expect("disconnect");
    assert!(!rig.stack.has_ip_callback(netif));
    assert!(!rig.stack.trigger_ip_change(netif, renewed));
}

#[test]
fn close_tears_down_a_live_connection() {
    let rig = rig(SimStack::new());
    rig.iface.connect(None).expect("connect");

    let Rig { ecm, stack, iface } = rig;
    iface.close().expect("close");
    assert_eq!(stack.registered(), 0);
    assert_eq!(stack.stats().ip_down, 1);
    assert!(!ecm.monitor_running());
}

fn address_changes(log: &EventLog) -> Vec<IpAddr> {
    log.records()
        .into_iter()
        .filter(|record| record.event == EcmEvent::IpChanged)
        .filter_map(|record| record.data.ip_address)
        .collect()
}

#[test]
fn disconnect_does_not_report_the_cleared_address() {
    let rig = rig(SimStack::new().reporting_ip_down());
    rig.iface.connect(None).expect("connect");
    let log = EventLog::new();
    rig.ecm.register_event_handler(log.handler("addr")).expect("register");

    rig.iface.disconnect().expect("disconnect");
    assert_eq!(rig.stack.stats().ip_down, 1);
    assert_eq!(address_changes(&log), Vec::<IpAddr>::new());
}

#[test]
fn close_does_not_report_the_cleared_address() {
    let rig = rig(SimStack::new().reporting_ip_down());
    rig.iface.connect(None).expect("connect");
    let log = EventLog::new();
    rig.ecm.register_event_handler(log.handler("addr")).expect("register");

    let Rig { ecm: _ecm, stack, iface } = rig;
    iface.close().expect("close");
    assert_eq!(stack.stats().ip_down, 1);
    assert_eq!(address_changes(&log), Vec::<IpAddr>::new());
}

#[test]
fn dhcp_unwind_does_not_report_the_cleared_address() {
    let rig = rig(SimStack::new().with_dhcp(Dhcp::Never).reporting_ip_down());
    let log = EventLog::new();
    rig.ecm.register_event_handler(log.handler("addr")).expect("register");

    assert!(matches!(rig.iface.connect(None), Err(EcmError::DhcpTimeout)));
    assert_eq!(rig.stack.stats().ip_down, 1);
    assert_eq!(address_changes(&log), Vec::<IpAddr>::new());
}
