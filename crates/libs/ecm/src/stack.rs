//! Network stack contract: interface registration, address bring-up and
//! the queries the connection manager forwards.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

use crate::types::{InterfaceId, IpSetting, Ipv6Scope, MacAddress};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum StackError {
    #[error("network stack: could not start DHCP client")]
    StartingDhcp,

    #[error("network stack: DHCP wait timed out")]
    DhcpWaitTimeout,

    #[error("network stack: no address assigned")]
    AddressUnavailable,

    #[error("network stack: unknown interface {0:?}")]
    UnknownInterface(NetifId),

    #[error("network stack: {0}")]
    Other(String),
}

/// Opaque handle for an interface registered with the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetifId(pub u32);

/// Invoked by the stack when the interface's IPv4 address changes.
pub type IpChangeCallback = Arc<dyn Fn(IpAddr) + Send + Sync>;

pub trait NetworkStack: Send + Sync {
    fn init(&self) -> Result<(), StackError>;

    fn deinit(&self) -> Result<(), StackError>;

    /// Register an interface. `static_ip == None` selects DHCP on `ip_up`.
    fn add_interface(
        &self,
        id: InterfaceId,
        mac: MacAddress,
        static_ip: Option<&IpSetting>,
    ) -> Result<NetifId, StackError>;

    fn remove_interface(&self, netif: NetifId) -> Result<(), StackError>;

    fn ip_up(&self, netif: NetifId) -> Result<(), StackError>;

    fn ip_down(&self, netif: NetifId) -> Result<(), StackError>;

    /// `None` clears a previous registration.
    fn set_ip_change_callback(&self, netif: NetifId, callback: Option<IpChangeCallback>);

    /// Fails with [`StackError::AddressUnavailable`] until an address is bound.
    fn ipv4_address(&self, netif: NetifId) -> Result<Ipv4Addr, StackError>;

    fn ipv6_address(&self, netif: NetifId, scope: Ipv6Scope) -> Result<Ipv6Addr, StackError>;

    fn gateway_address(&self, netif: NetifId) -> Result<Ipv4Addr, StackError>;

    fn netmask(&self, netif: NetifId) -> Result<Ipv4Addr, StackError>;

    /// Hardware address of the default gateway, resolved through ARP.
    fn gateway_mac_address(&self, netif: NetifId) -> Result<MacAddress, StackError>;

    /// Returns the round-trip time.
    fn ping(&self, netif: NetifId, target: IpAddr, timeout: Duration) -> Result<Duration, StackError>;
}
