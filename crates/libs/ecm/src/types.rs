use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── Interface identity ──────────────────────────────────────────────

/// Ethernet interface selector. Picks the hardware instance and the
/// per-interface flag slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterfaceId {
    Eth0,
    Eth1,
}

impl InterfaceId {
    pub const COUNT: usize = 2;
    pub const ALL: [InterfaceId; Self::COUNT] = [InterfaceId::Eth0, InterfaceId::Eth1];

    pub fn index(self) -> usize {
        match self {
            InterfaceId::Eth0 => 0,
            InterfaceId::Eth1 => 1,
        }
    }
}

impl TryFrom<u8> for InterfaceId {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(InterfaceId::Eth0),
            1 => Ok(InterfaceId::Eth1),
            other => Err(other),
        }
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceId::Eth0 => f.write_str("eth0"),
            InterfaceId::Eth1 => f.write_str("eth1"),
        }
    }
}

/// Register block of one MAC hardware instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacBase(pub u8);

impl fmt::Display for MacBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ETH{}", self.0)
    }
}

// ── PHY configuration ───────────────────────────────────────────────

/// Electrical interface between MAC and PHY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhyInterfaceMode {
    Mii,
    Gmii,
    Rgmii,
    Rmii,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhySpeed {
    #[serde(rename = "10")]
    Mbps10,
    #[serde(rename = "100")]
    Mbps100,
    #[serde(rename = "1000")]
    Mbps1000,
    #[serde(rename = "auto")]
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Duplex {
    Half,
    Full,
    Auto,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhyConfig {
    pub interface: PhyInterfaceMode,
    pub speed: PhySpeed,
    pub duplex: Duplex,
}

impl PhyConfig {
    pub fn new(interface: PhyInterfaceMode, speed: PhySpeed, duplex: Duplex) -> Self {
        Self { interface, speed, duplex }
    }

    /// Auto-negotiation is requested when either speed or duplex is auto.
    pub fn wants_auto_negotiation(&self) -> bool {
        self.speed == PhySpeed::Auto || self.duplex == Duplex::Auto
    }

    /// Replace requested values with the negotiated result.
    pub fn resolve(&mut self, duplex: Duplex, speed: PhySpeed) {
        self.duplex = duplex;
        self.speed = speed;
    }
}

// ── Addresses ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const DEFAULT: MacAddress = MacAddress([0x00, 0x03, 0x19, 0x45, 0x00, 0x00]);

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid mac address '{0}'")]
pub struct ParseMacError(String);

impl FromStr for MacAddress {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.split([':', '-']).collect();
        if compact.len() != 12 || s.split([':', '-']).any(|part| part.len() != 2) {
            return Err(ParseMacError(s.to_string()));
        }
        let bytes = hex::decode(&compact).map_err(|_| ParseMacError(s.to_string()))?;
        let octets: [u8; 6] = bytes.try_into().map_err(|_| ParseMacError(s.to_string()))?;
        Ok(MacAddress(octets))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = ParseMacError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddress> for String {
    fn from(value: MacAddress) -> Self {
        value.to_string()
    }
}

/// Static addressing handed to `connect`. IPv4 only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpSetting {
    pub ip_address: IpAddr,
    pub gateway: IpAddr,
    pub netmask: IpAddr,
}

impl IpSetting {
    pub fn is_ipv4(&self) -> bool {
        self.ip_address.is_ipv4() && self.gateway.is_ipv4() && self.netmask.is_ipv4()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ipv6Scope {
    LinkLocal,
    Global,
}

// ── Frame filters ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    Destination,
    Source,
}

/// One hardware address filter. Bit `n` of `ignore_bytes` excludes byte
/// `n` of the address from the comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterAddress {
    pub filter_type: FilterType,
    pub address: MacAddress,
    pub ignore_bytes: u8,
}

impl FilterAddress {
    pub const MAX_FILTERS: usize = 4;

    pub fn destination(address: MacAddress) -> Self {
        Self { filter_type: FilterType::Destination, address, ignore_bytes: 0 }
    }

    pub fn source(address: MacAddress) -> Self {
        Self { filter_type: FilterType::Source, address, ignore_bytes: 0 }
    }

    pub fn with_ignore_bytes(mut self, mask: u8) -> Self {
        self.ignore_bytes = mask;
        self
    }
}
