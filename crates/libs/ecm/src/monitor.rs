//! Per-interface link flags and the background thread that watches them.

use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::events::{EcmEvent, EventData, EventRegistry};
use crate::phy::PhyDriver;
use crate::types::InterfaceId;
use crate::wait::StopSignal;

#[derive(Default)]
struct LinkSlot {
    phy: Option<Arc<dyn PhyDriver>>,
    driver_initialized: bool,
    link_up: bool,
}

/// Point-in-time view of one interface's flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkSnapshot {
    pub driver_initialized: bool,
    pub link_up: bool,
}

/// Flags shared between API calls and the monitor. Writers hold the
/// lifecycle mutex as well; the monitor only takes this lock.
#[derive(Default)]
pub(crate) struct LinkTable {
    slots: RwLock<[LinkSlot; InterfaceId::COUNT]>,
}

impl LinkTable {
    pub(crate) fn snapshot(&self, id: InterfaceId) -> LinkSnapshot {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let slot = &slots[id.index()];
        LinkSnapshot { driver_initialized: slot.driver_initialized, link_up: slot.link_up }
    }

    pub(crate) fn is_driver_initialized(&self, id: InterfaceId) -> bool {
        self.snapshot(id).driver_initialized
    }

    pub(crate) fn is_link_up(&self, id: InterfaceId) -> bool {
        self.snapshot(id).link_up
    }

    pub(crate) fn mark_initialized(&self, id: InterfaceId, phy: Arc<dyn PhyDriver>) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let slot = &mut slots[id.index()];
        slot.phy = Some(phy);
        slot.driver_initialized = true;
    }

    pub(crate) fn clear(&self, id: InterfaceId) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots[id.index()] = LinkSlot::default();
    }

    pub(crate) fn set_link_up(&self, id: InterfaceId, up: bool) {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots[id.index()].link_up = up;
    }

    /// Interfaces whose driver is initialized, with their PHY.
    fn active(&self) -> Vec<(InterfaceId, Arc<dyn PhyDriver>)> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        InterfaceId::ALL
            .iter()
            .filter_map(|&id| {
                let slot = &slots[id.index()];
                match (&slot.phy, slot.driver_initialized) {
                    (Some(phy), true) => Some((id, Arc::clone(phy))),
                    _ => None,
                }
            })
            .collect()
    }

    /// Record a link reading. Returns the event to raise when it differs
    /// from the stored state.
    pub(crate) fn record_link(&self, id: InterfaceId, up: bool) -> Option<EcmEvent> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let slot = &mut slots[id.index()];
        if !slot.driver_initialized || slot.link_up == up {
            return None;
        }
        slot.link_up = up;
        Some(if up { EcmEvent::Connected } else { EcmEvent::Disconnected })
    }
}

pub(crate) struct LinkMonitor {
    stop: StopSignal,
    join: Option<JoinHandle<()>>,
}

impl LinkMonitor {
    pub(crate) fn spawn(
        links: Arc<LinkTable>,
        events: Arc<EventRegistry>,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let stop = StopSignal::new();
        let stop_for_thread = stop.clone();
        let join = thread::Builder::new()
            .name("ecm-link-monitor".into())
            .spawn(move || run(&links, &events, interval, &stop_for_thread))?;
        log::debug!("ecm: link monitor started interval={:?}", interval);
        Ok(Self { stop, join: Some(join) })
    }

    pub(crate) fn request_stop(&self) {
        self.stop.stop();
    }

    /// Stop and wait for the thread. A panicked monitor is logged and ignored.
    pub(crate) fn shutdown(mut self) {
        self.stop.stop();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::warn!("ecm: link monitor thread panicked");
            }
        }
        log::debug!("ecm: link monitor stopped");
    }
}

impl Drop for LinkMonitor {
    fn drop(&mut self) {
        self.stop.stop();
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

fn run(links: &LinkTable, events: &EventRegistry, interval: Duration, stop: &StopSignal) {
    loop {
        for (id, phy) in links.active() {
            if stop.is_stopped() {
                return;
            }
            let up = match phy.link_status(id) {
                Ok(up) => up,
                Err(err) => {
                    log::debug!("ecm: link status read failed iface={} err={}", id, err);
                    continue;
                }
            };
            if let Some(event) = links.record_link(id, up) {
                log::info!("ecm: link {} iface={}", if up { "up" } else { "down" }, id);
                events.dispatch(event, &EventData::link(id));
            }
        }
        if stop.wait_timeout(interval) {
            return;
        }
    }
}
