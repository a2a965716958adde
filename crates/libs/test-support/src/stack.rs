use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use ecm::stack::{IpChangeCallback, NetifId, NetworkStack, StackError};
use ecm::{InterfaceId, IpSetting, Ipv6Scope, MacAddress};

/// How the simulated DHCP server answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dhcp {
    /// Bind `address` after `polls` unanswered address queries.
    LeaseAfter { polls: usize, address: Ipv4Addr },
    Never,
}

impl Default for Dhcp {
    fn default() -> Self {
        Dhcp::LeaseAfter { polls: 0, address: Ipv4Addr::new(192, 168, 1, 42) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StackStats {
    pub init_calls: usize,
    pub deinit_calls: usize,
    pub added: usize,
    pub removed: usize,
    pub ip_up: usize,
    pub ip_down: usize,
}

struct SimNetif {
    id: InterfaceId,
    mac: MacAddress,
    static_ip: Option<IpSetting>,
    up: bool,
    address_polls: usize,
}

#[derive(Default)]
struct StackState {
    stats: StackStats,
    next_id: u32,
    netifs: HashMap<NetifId, SimNetif>,
    callbacks: HashMap<NetifId, IpChangeCallback>,
    dhcp: Dhcp,
    ip_up_error: Option<StackError>,
    init_error: Option<StackError>,
    deinit_error: Option<StackError>,
    report_ip_down: bool,
    panic_on_ping: bool,
}

/// In-memory network stack.
#[derive(Default)]
pub struct SimStack {
    state: Mutex<StackState>,
}

impl SimStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dhcp(self, dhcp: Dhcp) -> Self {
        self.lock().dhcp = dhcp;
        self
    }

    pub fn failing_ip_up(self, err: StackError) -> Self {
        self.lock().ip_up_error = Some(err);
        self
    }

    pub fn failing_init(self, err: StackError) -> Self {
        self.lock().init_error = Some(err);
        self
    }

    pub fn failing_deinit(self, err: StackError) -> Self {
        self.lock().deinit_error = Some(err);
        self
    }

    /// Report the cleared address through the IP-change callback when IP
    /// goes down, as lwIP's netif status callback does.
    pub fn reporting_ip_down(self) -> Self {
        self.lock().report_ip_down = true;
        self
    }

    /// Panic inside `ping`, before touching the stack's own state.
    pub fn panicking_ping(self) -> Self {
        self.lock().panic_on_ping = true;
        self
    }

    pub fn stats(&self) -> StackStats {
        self.lock().stats
    }

    pub fn registered(&self) -> usize {
        self.lock().netifs.len()
    }

    /// Netif registered for `id`, if any.
    pub fn netif_for(&self, id: InterfaceId) -> Option<NetifId> {
        self.lock()
            .netifs
            .iter()
            .find(|(_, netif)| netif.id == id)
            .map(|(handle, _)| *handle)
    }

    pub fn mac_for(&self, id: InterfaceId) -> Option<MacAddress> {
        self.lock().netifs.values().find(|netif| netif.id == id).map(|netif| netif.mac)
    }

    pub fn has_ip_callback(&self, netif: NetifId) -> bool {
        self.lock().callbacks.contains_key(&netif)
    }

    /// Fire the IP-change callback of `netif` the way a lease renewal would.
    /// Returns `false` when none is registered.
    pub fn trigger_ip_change(&self, netif: NetifId, address: IpAddr) -> bool {
        let callback = self.lock().callbacks.get(&netif).cloned();
        match callback {
            Some(callback) => {
                callback(address);
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StackState> {
        self.state.lock().expect("sim stack state poisoned")
    }
}

fn unknown(netif: NetifId) -> StackError {
    StackError::UnknownInterface(netif)
}

impl NetworkStack for SimStack {
    fn init(&self) -> Result<(), StackError> {
        let mut state = self.lock();
        state.stats.init_calls += 1;
        match state.init_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn deinit(&self) -> Result<(), StackError> {
        let mut state = self.lock();
        state.stats.deinit_calls += 1;
        match state.deinit_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn add_interface(
        &self,
        id: InterfaceId,
        mac: MacAddress,
        static_ip: Option<&IpSetting>,
    ) -> Result<NetifId, StackError> {
        let mut state = self.lock();
        state.next_id += 1;
        let handle = NetifId(state.next_id);
        state.netifs.insert(
            handle,
            SimNetif { id, mac, static_ip: static_ip.copied(), up: false, address_polls: 0 },
        );
        state.stats.added += 1;
        Ok(handle)
    }

    fn remove_interface(&self, netif: NetifId) -> Result<(), StackError> {
        let mut state = self.lock();
        state.netifs.remove(&netif).ok_or_else(|| unknown(netif))?;
        state.stats.removed += 1;
        Ok(())
    }

    fn ip_up(&self, netif: NetifId) -> Result<(), StackError> {
        let mut state = self.lock();
        state.stats.ip_up += 1;
        if let Some(err) = state.ip_up_error.clone() {
            return Err(err);
        }
        state.netifs.get_mut(&netif).ok_or_else(|| unknown(netif))?.up = true;
        Ok(())
    }

    fn ip_down(&self, netif: NetifId) -> Result<(), StackError> {
        let callback = {
            let mut state = self.lock();
            state.stats.ip_down += 1;
            state.netifs.get_mut(&netif).ok_or_else(|| unknown(netif))?.up = false;
            if state.report_ip_down {
                state.callbacks.get(&netif).cloned()
            } else {
                None
            }
        };
        if let Some(callback) = callback {
            callback(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        }
        Ok(())
    }

    fn set_ip_change_callback(&self, netif: NetifId, callback: Option<IpChangeCallback>) {
        let mut state = self.lock();
        match callback {
            Some(callback) => {
                state.callbacks.insert(netif, callback);
            }
            None => {
                state.callbacks.remove(&netif);
            }
        }
    }

    fn ipv4_address(&self, netif: NetifId) -> Result<Ipv4Addr, StackError> {
        let mut state = self.lock();
        let dhcp = state.dhcp;
        let entry = state.netifs.get_mut(&netif).ok_or_else(|| unknown(netif))?;
        if !entry.up {
            return Err(StackError::AddressUnavailable);
        }
        if let Some(setting) = entry.static_ip {
            return match setting.ip_address {
                IpAddr::V4(address) => Ok(address),
                IpAddr::V6(_) => Err(StackError::AddressUnavailable),
            };
        }
        match dhcp {
            Dhcp::LeaseAfter { polls, address } => {
                entry.address_polls += 1;
                if entry.address_polls > polls {
                    Ok(address)
                } else {
                    Err(StackError::AddressUnavailable)
                }
            }
            Dhcp::Never => Err(StackError::AddressUnavailable),
        }
    }

    fn ipv6_address(&self, netif: NetifId, scope: Ipv6Scope) -> Result<Ipv6Addr, StackError> {
        let state = self.lock();
        let entry = state.netifs.get(&netif).ok_or_else(|| unknown(netif))?;
        match (entry.up, scope) {
            (true, Ipv6Scope::LinkLocal) => {
                let [a, b, c, d, e, f] = entry.mac.octets();
                Ok(Ipv6Addr::new(
                    0xfe80,
                    0,
                    0,
                    0,
                    u16::from_be_bytes([a ^ 0x02, b]),
                    u16::from_be_bytes([c, 0xff]),
                    u16::from_be_bytes([0xfe, d]),
                    u16::from_be_bytes([e, f]),
                ))
            }
            _ => Err(StackError::AddressUnavailable),
        }
    }

    fn gateway_address(&self, netif: NetifId) -> Result<Ipv4Addr, StackError> {
        let state = self.lock();
        let entry = state.netifs.get(&netif).ok_or_else(|| unknown(netif))?;
        match entry.static_ip.map(|setting| setting.gateway) {
            Some(IpAddr::V4(gateway)) => Ok(gateway),
            Some(IpAddr::V6(_)) => Err(StackError::AddressUnavailable),
            None => Ok(Ipv4Addr::new(192, 168, 1, 1)),
        }
    }

    fn netmask(&self, netif: NetifId) -> Result<Ipv4Addr, StackError> {
        let state = self.lock();
        let entry = state.netifs.get(&netif).ok_or_else(|| unknown(netif))?;
        match entry.static_ip.map(|setting| setting.netmask) {
            Some(IpAddr::V4(netmask)) => Ok(netmask),
            Some(IpAddr::V6(_)) => Err(StackError::AddressUnavailable),
            None => Ok(Ipv4Addr::new(255, 255, 255, 0)),
        }
    }

    fn gateway_mac_address(&self, netif: NetifId) -> Result<MacAddress, StackError> {
        let state = self.lock();
        state.netifs.get(&netif).ok_or_else(|| unknown(netif))?;
        Ok(MacAddress([0x02, 0x00, 0x5e, 0x10, 0x00, 0x01]))
    }

    fn ping(&self, netif: NetifId, target: IpAddr, timeout: Duration) -> Result<Duration, StackError> {
        let state = self.lock();
        if state.panic_on_ping {
            drop(state);
            panic!("simulated stack fault in ping");
        }
        state.netifs.get(&netif).ok_or_else(|| unknown(netif))?;
        if target.is_unspecified() {
            return Err(StackError::Other(format!("no reply from {target} within {timeout:?}")));
        }
        Ok(Duration::from_millis(1).min(timeout))
    }
}
