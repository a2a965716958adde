use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{EcmError, Result};
use crate::events::{EcmEvent, EventData};
use crate::manager::EcmInner;
use crate::phy::PhyDriver;
use crate::stack::{IpChangeCallback, NetifId, StackError};
use crate::types::{
    Duplex, FilterAddress, InterfaceId, IpSetting, Ipv6Scope, MacAddress, MacBase, PhyConfig,
    PhySpeed,
};
use crate::wait::{poll_until, PollOutcome};

#[derive(Debug, Default)]
struct NetState {
    connected: bool,
    netif: Option<NetifId>,
}

/// An opened Ethernet interface.
///
/// Dropping the handle without calling [`close`](Self::close) performs the
/// same teardown and logs any failure.
pub struct EthInterface {
    ecm: Arc<EcmInner>,
    id: InterfaceId,
    base: MacBase,
    phy: Arc<dyn PhyDriver>,
    mac_address: MacAddress,
    phy_config: PhyConfig,
    net: Mutex<NetState>,
    closed: bool,
}

impl std::fmt::Debug for EthInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EthInterface")
            .field("id", &self.id)
            .field("base", &self.base)
            .field("mac_address", &self.mac_address)
            .field("phy_config", &self.phy_config)
            .finish_non_exhaustive()
    }
}

impl EthInterface {
    pub(crate) fn new(
        ecm: Arc<EcmInner>,
        id: InterfaceId,
        base: MacBase,
        phy: Arc<dyn PhyDriver>,
        mac_address: MacAddress,
        phy_config: PhyConfig,
    ) -> Self {
        Self {
            ecm,
            id,
            base,
            phy,
            mac_address,
            phy_config,
            net: Mutex::new(NetState::default()),
            closed: false,
        }
    }

    pub fn id(&self) -> InterfaceId {
        self.id
    }

    /// PHY settings after negotiation.
    pub fn phy_config(&self) -> PhyConfig {
        self.phy_config
    }

    /// This interface's own hardware address.
    pub fn mac_address(&self) -> MacAddress {
        self.mac_address
    }

    pub fn is_connected(&self) -> bool {
        self.net.lock().map(|net| net.connected).unwrap_or(false)
    }

    fn lock_net(&self) -> Result<MutexGuard<'_, NetState>> {
        self.net.lock().map_err(|_| EcmError::Mutex("interface"))
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Release the interface. Stops the link monitor when this was the last
    /// open interface.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        // Runs at most once, even when the lock below fails.
        self.closed = true;
        let mut state = self.ecm.lock()?;

        {
            let mut net = self.net.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(netif) = net.netif.take() {
                log::warn!("ecm: closing connected interface iface={}", self.id);
                self.teardown_netif(netif);
                net.connected = false;
            }
        }

        state.monitor_refs = state.monitor_refs.saturating_sub(1);
        let monitor = if state.monitor_refs == 0 { state.monitor.take() } else { None };
        if let Some(monitor) = &monitor {
            monitor.request_stop();
        }
        self.ecm.mac.deregister_callbacks(self.base);
        self.ecm.links.clear(self.id);
        drop(state);

        // Joined outside the lock so a monitor blocked on the link table
        // cannot hold up close.
        if let Some(monitor) = monitor {
            monitor.shutdown();
        }
        log::info!("ecm: closed iface={}", self.id);
        Ok(())
    }

    /// Register with the network stack, wait for link and bring IP up.
    ///
    /// Without `static_ip` the stack runs DHCP and this call blocks until a
    /// lease arrives or the DHCP budget runs out. Returns the bound address.
    pub fn connect(&self, static_ip: Option<&IpSetting>) -> Result<IpAddr> {
        self.ecm.ensure_initialized()?;
        let _state = self.ecm.lock()?;
        let mut net = self.lock_net()?;
        if net.connected {
            return Err(EcmError::AlreadyConnected);
        }
        if static_ip.is_some_and(|setting| !setting.is_ipv4()) {
            return Err(EcmError::StaticIpNotSupported);
        }

        let stack = self.ecm.stack.as_ref();
        let netif = stack
            .add_interface(self.id, self.mac_address, static_ip)
            .map_err(|err| {
                log::error!("ecm: add interface failed iface={} err={}", self.id, err);
                EcmError::Interface(err)
            })?;
        stack.set_ip_change_callback(netif, Some(self.ip_change_callback()));

        if !self.ecm.links.is_link_up(self.id) {
            if let Err(err) = self.wait_for_link() {
                self.unregister(netif);
                return Err(err);
            }
            self.ecm.links.set_link_up(self.id, true);
        }

        if let Err(err) = stack.ip_up(netif) {
            log::error!("ecm: ip up failed iface={} err={}", self.id, err);
            self.unregister(netif);
            return Err(match err {
                StackError::StartingDhcp => EcmError::StartingDhcp,
                StackError::DhcpWaitTimeout => EcmError::DhcpTimeout,
                other => EcmError::Connection(other),
            });
        }

        let timing = &self.ecm.config.timing;
        let outcome = poll_until(timing.dhcp_poll(), Some(timing.dhcp_timeout()), None, || {
            stack.ipv4_address(netif).ok().filter(|addr| !addr.is_unspecified())
        });
        let address = match outcome {
            PollOutcome::Ready(address) => address,
            _ => {
                log::error!(
                    "ecm: no address within {:?} iface={}",
                    timing.dhcp_timeout(),
                    self.id
                );
                self.teardown_netif(netif);
                return Err(EcmError::DhcpTimeout);
            }
        };

        net.connected = true;
        net.netif = Some(netif);
        log::info!(
            "ecm: connected iface={} ip={} dhcp={}",
            self.id,
            address,
            static_ip.is_none()
        );
        Ok(IpAddr::V4(address))
    }

    pub fn disconnect(&self) -> Result<()> {
        self.ecm.ensure_initialized()?;
        let _state = self.ecm.lock()?;
        let mut net = self.lock_net()?;
        let netif = match net.netif {
            Some(netif) if net.connected => netif,
            _ => return Err(EcmError::NotConnected),
        };
        self.teardown_netif(netif);
        net.connected = false;
        net.netif = None;
        log::info!("ecm: disconnected iface={}", self.id);
        Ok(())
    }

    fn ip_change_callback(&self) -> IpChangeCallback {
        let events = Arc::downgrade(&self.ecm.events);
        let id = self.id;
        Arc::new(move |address: IpAddr| {
            if let Some(events) = events.upgrade() {
                events.dispatch(EcmEvent::IpChanged, &EventData::address(id, address));
            }
        })
    }

    fn wait_for_link(&self) -> Result<()> {
        let timing = &self.ecm.config.timing;
        let outcome = poll_until(timing.link_check_interval(), Some(timing.link_wait()), None, || {
            matches!(self.phy.link_status(self.id), Ok(true)).then_some(())
        });
        match outcome {
            PollOutcome::Ready(()) => Ok(()),
            _ => {
                log::error!("ecm: link down after {:?} iface={}", timing.link_wait(), self.id);
                Err(EcmError::LinkTimeout(timing.link_wait()))
            }
        }
    }

    /// Undo `add_interface` for a connection that never came up.
    fn unregister(&self, netif: NetifId) {
        let stack = self.ecm.stack.as_ref();
        stack.set_ip_change_callback(netif, None);
        if let Err(err) = stack.remove_interface(netif) {
            log::warn!("ecm: remove interface failed iface={} err={}", self.id, err);
        }
    }

    /// Detach the address observer first so bringing IP down is not
    /// reported as an address change.
    fn teardown_netif(&self, netif: NetifId) {
        let stack = self.ecm.stack.as_ref();
        stack.set_ip_change_callback(netif, None);
        if let Err(err) = stack.ip_down(netif) {
            log::warn!("ecm: ip down failed iface={} err={}", self.id, err);
        }
        if let Err(err) = stack.remove_interface(netif) {
            log::warn!("ecm: remove interface failed iface={} err={}", self.id, err);
        }
    }

    // ── Frame filtering ─────────────────────────────────────────────

    fn ensure_driver_ready(&self) -> Result<()> {
        self.ecm.ensure_initialized()?;
        if self.ecm.links.is_driver_initialized(self.id) {
            Ok(())
        } else {
            Err(EcmError::NotInitialized)
        }
    }

    pub fn set_promiscuous_mode(&self, enable: bool) -> Result<()> {
        self.ensure_driver_ready()?;
        let _state = self.ecm.lock()?;
        self.ecm.mac.set_promiscuous_mode(self.base, enable)?;
        log::debug!("ecm: promiscuous={} iface={}", enable, self.id);
        Ok(())
    }

    /// `true` drops broadcast frames.
    pub fn set_broadcast_disable(&self, disable: bool) -> Result<()> {
        self.ensure_driver_ready()?;
        let _state = self.ecm.lock()?;
        self.ecm.mac.set_no_broadcast(self.base, disable)?;
        log::debug!("ecm: broadcast_disabled={} iface={}", disable, self.id);
        Ok(())
    }

    /// Program up to four address filters into hardware slots 1..=4.
    pub fn set_filter_addresses(&self, filters: &[FilterAddress]) -> Result<()> {
        if filters.is_empty() || filters.len() > FilterAddress::MAX_FILTERS {
            return Err(EcmError::bad_argument(format!(
                "expected 1..={} filters, got {}",
                FilterAddress::MAX_FILTERS,
                filters.len()
            )));
        }
        self.ensure_driver_ready()?;
        let _state = self.ecm.lock()?;
        for (slot, filter) in (1u8..).zip(filters) {
            self.ecm.mac.set_filter_address(self.base, slot, filter)?;
        }
        log::debug!("ecm: filters={} iface={}", filters.len(), self.id);
        Ok(())
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Wait up to the link budget for link. A link that stays down is
    /// reported as `false`, not as an error.
    pub fn link_status(&self) -> Result<bool> {
        self.ecm.ensure_initialized()?;
        let _state = self.ecm.lock()?;
        let timing = &self.ecm.config.timing;
        let outcome = poll_until(timing.link_check_interval(), Some(timing.link_wait()), None, || {
            matches!(self.phy.link_status(self.id), Ok(true)).then_some(())
        });
        Ok(matches!(outcome, PollOutcome::Ready(())))
    }

    /// Wait for link, then report the operating duplex and speed.
    pub fn link_speed(&self) -> Result<(Duplex, PhySpeed)> {
        self.ecm.ensure_initialized()?;
        let _state = self.ecm.lock()?;
        let timing = &self.ecm.config.timing;
        let outcome = poll_until(timing.link_check_interval(), Some(timing.link_wait()), None, || {
            match self.phy.link_status(self.id) {
                Ok(true) => self.phy.link_speed(self.id).ok(),
                _ => None,
            }
        });
        match outcome {
            PollOutcome::Ready(speed) => Ok(speed),
            _ => Err(EcmError::LinkTimeout(timing.link_wait())),
        }
    }

    /// Run `query` against the connected netif under both locks.
    fn with_netif<T>(&self, query: impl FnOnce(NetifId) -> Result<T>) -> Result<T> {
        self.ecm.ensure_initialized()?;
        let _state = self.ecm.lock()?;
        let net = self.lock_net()?;
        match net.netif {
            Some(netif) if net.connected => query(netif),
            _ => Err(EcmError::NotConnected),
        }
    }

    pub fn ip_address(&self) -> Result<IpAddr> {
        self.with_netif(|netif| {
            self.ecm
                .stack
                .ipv4_address(netif)
                .map(IpAddr::V4)
                .map_err(EcmError::IpAddress)
        })
    }

    /// Only link-local addresses are supported.
    pub fn ipv6_address(&self, scope: Ipv6Scope) -> Result<Ipv6Addr> {
        if scope == Ipv6Scope::Global {
            return Err(EcmError::Ipv6GlobalUnsupported);
        }
        self.with_netif(|netif| {
            self.ecm
                .stack
                .ipv6_address(netif, scope)
                .map_err(EcmError::Ipv6NotReady)
        })
    }

    pub fn gateway_address(&self) -> Result<Ipv4Addr> {
        self.with_netif(|netif| {
            self.ecm.stack.gateway_address(netif).map_err(EcmError::GatewayAddress)
        })
    }

    pub fn netmask_address(&self) -> Result<Ipv4Addr> {
        self.with_netif(|netif| self.ecm.stack.netmask(netif).map_err(EcmError::NetmaskAddress))
    }

    /// Hardware address of the default gateway.
    pub fn gateway_mac_address(&self) -> Result<MacAddress> {
        self.with_netif(|netif| {
            self.ecm
                .stack
                .gateway_mac_address(netif)
                .map_err(EcmError::GatewayAddress)
        })
    }

    /// Returns the round-trip time.
    pub fn ping(&self, target: IpAddr, timeout: Duration) -> Result<Duration> {
        self.with_netif(|netif| {
            self.ecm.stack.ping(netif, target, timeout).map_err(|err| {
                log::debug!("ecm: ping failed iface={} target={} err={}", self.id, target, err);
                EcmError::Ping(err)
            })
        })
    }
}

impl Drop for EthInterface {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = self.release() {
            log::warn!("ecm: interface teardown on drop failed iface={} err={}", self.id, err);
        }
    }
}
