//! Ethernet connection manager.
//!
//! Takes an Ethernet MAC/PHY pair from power-on to an IP-connected
//! interface, watches the physical link in the background and tells
//! registered observers when the link or the address changes.
//!
//! The crate drives three collaborators it does not implement:
//!
//! - [`PhyDriver`]: the PHY chip (reset, negotiation, link status)
//! - [`MacDriver`]: register-level EMAC operations
//! - [`NetworkStack`]: interface registration, DHCP, address queries, ping
//!
//! # Lifecycle
//!
//! ```text
//! Ecm::new -> init -> open(id, phy) -> connect -> ... -> disconnect -> close -> deinit
//! ```
//!
//! `open` performs the MAC/PHY bring-up and starts the link monitor thread
//! with the first interface; `close` of the last interface stops it.
//! Every public operation is serialized by one lifecycle mutex, which is
//! held across the link and DHCP waits.

mod bringup;
pub mod config;
pub mod error;
pub mod events;
mod interface;
pub mod mac;
mod manager;
mod monitor;
pub mod phy;
pub mod stack;
pub mod types;
pub mod wait;

pub use config::{ConfigError, EcmConfig, InterfaceConfig, Timing};
pub use error::{DriverError, EcmError, Result};
pub use events::{EcmEvent, EventData, EventHandler};
pub use interface::EthInterface;
pub use mac::{InterfaceSelection, MacDriver, MacError, RefClockSource, WrapperConfig};
pub use manager::Ecm;
pub use monitor::LinkSnapshot;
pub use phy::{PhyDriver, PhyError};
pub use stack::{IpChangeCallback, NetifId, NetworkStack, StackError};
pub use types::{
    Duplex, FilterAddress, FilterType, InterfaceId, IpSetting, Ipv6Scope, MacAddress, MacBase,
    PhyConfig, PhyInterfaceMode, PhySpeed,
};
