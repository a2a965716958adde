use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ecm::{Ecm, EcmError, EcmEvent, EventData, EventHandler, InterfaceId};
use ecm_test_support::{fast_config, init_logging, EventLog, SimMac, SimPhy, SimStack};

const WAIT: Duration = Duration::from_secs(2);

fn manager() -> Ecm {
    init_logging();
    let ecm = Ecm::new(fast_config(), Arc::new(SimMac::new()), Arc::new(SimStack::new()))
        .expect("manager");
    ecm.init().expect("init");
    ecm
}

fn settle() {
    thread::sleep(Duration::from_millis(40));
}

#[test]
fn link_readings_raise_one_event_per_transition() {
    let ecm = manager();
    let log = EventLog::new();
    ecm.register_event_handler(log.handler("watch")).expect("register");

    // The first reading is consumed by the bring-up link wait.
    let phy = Arc::new(SimPhy::new().with_link_script(&[true, false, false, true, true, false]));
    let iface = ecm.open(InterfaceId::Eth0, phy.clone()).expect("open");

    assert!(log.wait_for(2, WAIT));
    while phy.script_remaining() > 0 {
        thread::sleep(Duration::from_millis(5));
    }
    settle();

    assert_eq!(log.events_for("watch"), vec![EcmEvent::Connected, EcmEvent::Disconnected]);
    assert!(!ecm.link_snapshot(InterfaceId::Eth0).link_up);
    iface.close().expect("close");
}

#[test]
fn handlers_run_in_registration_order() {
    let ecm = manager();
    let log = EventLog::new();
    let a = log.handler("a");
    let b = log.handler("b");
    let c = log.handler("c");
    ecm.register_event_handler(a).expect("a");
    ecm.register_event_handler(b.clone()).expect("b");
    ecm.register_event_handler(c).expect("c");

    let phy = Arc::new(SimPhy::new());
    let iface = ecm.open(InterfaceId::Eth0, phy.clone()).expect("open");
    assert!(log.wait_for(3, WAIT));
    settle();
    assert_eq!(log.labels(), vec!["a", "b", "c"]);
    assert!(log.records().iter().all(|record| record.event == EcmEvent::Connected));

    ecm.deregister_event_handler(&b).expect("deregister");
    log.clear();
    phy.set_link(false);
    assert!(log.wait_for(2, WAIT));
    settle();
    assert_eq!(log.labels(), vec!["a", "c"]);
    assert_eq!(log.events_for("a"), vec![EcmEvent::Disconnected]);
    iface.close().expect("close");
}

#[test]
fn registry_capacity_is_enforced() {
    let ecm = manager();
    let log = EventLog::new();
    for label in ["a", "b", "c"] {
        ecm.register_event_handler(log.handler(label)).expect("register");
    }
    let err = ecm.register_event_handler(log.handler("d")).expect_err("full");
    assert!(matches!(err, EcmError::CallbacksFull { capacity: 3 }));
    assert_eq!(ecm.event_handler_count(), 3);
}

#[test]
fn capacity_follows_config() {
    init_logging();
    let mut config = fast_config();
    config.max_event_handlers = 5;
    let ecm = Ecm::new(config, Arc::new(SimMac::new()), Arc::new(SimStack::new()))
        .expect("manager");
    ecm.init().expect("init");
    let log = EventLog::new();
    for label in ["a", "b", "c", "d", "e"] {
        ecm.register_event_handler(log.handler(label)).expect("register");
    }
    assert!(ecm.register_event_handler(log.handler("f")).is_err());
}

#[test]
fn registration_requires_initialized_manager() {
    init_logging();
    let ecm = Ecm::new(fast_config(), Arc::new(SimMac::new()), Arc::new(SimStack::new()))
        .expect("manager");
    let handler: Arc<dyn EventHandler> = Arc::new(|_: EcmEvent, _: &EventData| {});
    assert!(matches!(ecm.register_event_handler(handler.clone()), Err(EcmError::NotInitialized)));
    assert!(matches!(ecm.deregister_event_handler(&handler), Err(EcmError::NotInitialized)));
}

#[test]
fn deregistering_an_unknown_handler_is_ignored() {
    let ecm = manager();
    let log = EventLog::new();
    ecm.register_event_handler(log.handler("a")).expect("register");
    ecm.deregister_event_handler(&log.handler("stranger")).expect("deregister");
    assert_eq!(ecm.event_handler_count(), 1);
}

#[test]
fn every_open_interface_is_monitored() {
    let ecm = manager();
    let log = EventLog::new();
    ecm.register_event_handler(log.handler("watch")).expect("register");

    let eth0 = ecm.open(InterfaceId::Eth0, Arc::new(SimPhy::new())).expect("open eth0");
    let eth1 = ecm.open(InterfaceId::Eth1, Arc::new(SimPhy::new())).expect("open eth1");
    assert!(log.wait_for(2, WAIT));

    let mut interfaces: Vec<_> = log
        .records()
        .iter()
        .filter(|record| record.event == EcmEvent::Connected)
        .filter_map(|record| record.data.interface)
        .collect();
    interfaces.sort_by_key(|id| id.index());
    assert_eq!(interfaces, vec![InterfaceId::Eth0, InterfaceId::Eth1]);
    assert!(ecm.link_snapshot(InterfaceId::Eth1).link_up);

    eth0.close().expect("close eth0");
    eth1.close().expect("close eth1");
}

#[test]
fn monitor_stops_polling_after_last_close() {
    let ecm = manager();
    let phy = Arc::new(SimPhy::new());
    let iface = ecm.open(InterfaceId::Eth0, phy.clone()).expect("open");
    settle();
    iface.close().expect("close");

    let reads = phy.link_reads();
    settle();
    assert_eq!(phy.link_reads(), reads);
    assert!(!ecm.monitor_running());
}

#[test]
fn handlers_may_reenter_the_manager() {
    let ecm = manager();
    let seen = EventLog::new();
    let inner = ecm.clone();
    let sink = seen.handler("reentrant");
    let handler: Arc<dyn EventHandler> = Arc::new(move |event: EcmEvent, data: &EventData| {
        let _ = inner.link_snapshot(InterfaceId::Eth0);
        let _ = inner.event_handler_count();
        sink.on_event(event, data);
    });
    ecm.register_event_handler(handler).expect("register");

    let iface = ecm.open(InterfaceId::Eth0, Arc::new(SimPhy::new())).expect("open");
    assert!(seen.wait_for(1, WAIT));
    iface.close().expect("close");
}
