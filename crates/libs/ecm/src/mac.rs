//! Register-level MAC driver contract and the wrapper configuration derived
//! from the PHY settings.

use serde::{Deserialize, Serialize};

use crate::types::{FilterAddress, MacBase, PhyInterfaceMode, PhySpeed};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation} failed: {reason}")]
pub struct MacError {
    pub operation: &'static str,
    pub reason: String,
}

impl MacError {
    pub fn new(operation: &'static str, reason: impl Into<String>) -> Self {
        Self { operation, reason: reason.into() }
    }
}

pub type MacResult<T> = Result<T, MacError>;

/// Operations the connection manager needs from the EMAC block.
///
/// Descriptor rings, buffer pools and interrupt routing stay inside the
/// implementation; `init` is expected to leave the MAC ready to exchange
/// frames once the PHY reports link.
pub trait MacDriver: Send + Sync {
    /// Enable the management interface only, so the PHY can be reached
    /// before the full MAC configuration is known.
    fn mdio_init(&self, base: MacBase) -> MacResult<()>;

    fn init(&self, base: MacBase, wrapper: &WrapperConfig) -> MacResult<()>;

    /// Hook the driver's frame callbacks into the network stack.
    fn register_callbacks(&self, base: MacBase);

    fn deregister_callbacks(&self, base: MacBase);

    fn set_promiscuous_mode(&self, base: MacBase, enable: bool) -> MacResult<()>;

    /// `reject == true` drops broadcast frames.
    fn set_no_broadcast(&self, base: MacBase, reject: bool) -> MacResult<()>;

    /// Program filter `slot` (1-based).
    fn set_filter_address(&self, base: MacBase, slot: u8, filter: &FilterAddress) -> MacResult<()>;

    fn lock_deep_sleep(&self) {}

    fn unlock_deep_sleep(&self) {}
}

// ── Wrapper configuration ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefClockSource {
    #[default]
    External,
    Internal,
}

/// Interface/speed selection written to the MAC wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceSelection {
    Mii10,
    Mii100,
    Gmii1000,
    Rgmii10,
    Rgmii100,
    Rgmii1000,
    Rmii10,
    Rmii100,
}

impl InterfaceSelection {
    /// Map mode and negotiated speed to a wrapper selection. Combinations
    /// the hardware cannot run fall back to RGMII at 1000 Mbit.
    pub fn derive(mode: PhyInterfaceMode, speed: PhySpeed) -> Self {
        let selected = match (mode, speed) {
            (PhyInterfaceMode::Mii, PhySpeed::Mbps10) => Some(Self::Mii10),
            (PhyInterfaceMode::Mii, PhySpeed::Mbps100) => Some(Self::Mii100),
            (PhyInterfaceMode::Gmii, PhySpeed::Mbps1000) => Some(Self::Gmii1000),
            (PhyInterfaceMode::Rgmii, PhySpeed::Mbps10) => Some(Self::Rgmii10),
            (PhyInterfaceMode::Rgmii, PhySpeed::Mbps100) => Some(Self::Rgmii100),
            (PhyInterfaceMode::Rgmii, PhySpeed::Mbps1000) => Some(Self::Rgmii1000),
            (PhyInterfaceMode::Rmii, PhySpeed::Mbps10) => Some(Self::Rmii10),
            (PhyInterfaceMode::Rmii, PhySpeed::Mbps100) => Some(Self::Rmii100),
            _ => None,
        };
        selected.unwrap_or_else(|| {
            log::warn!(
                "ecm: unsupported phy combination mode={:?} speed={:?}, using rgmii-1000",
                mode,
                speed
            );
            Self::Rgmii1000
        })
    }

    pub fn is_10m(self) -> bool {
        matches!(self, Self::Mii10 | Self::Rgmii10 | Self::Rmii10)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrapperConfig {
    pub interface: InterfaceSelection,
    pub ref_clock: RefClockSource,
    pub ref_clk_div: u8,
}

impl WrapperConfig {
    /// `div_10m` is the reference clock divider used at 10 Mbit; every
    /// other speed runs undivided.
    pub fn derive(
        mode: PhyInterfaceMode,
        speed: PhySpeed,
        ref_clock: RefClockSource,
        div_10m: u8,
    ) -> Self {
        let interface = InterfaceSelection::derive(mode, speed);
        let ref_clk_div = if interface.is_10m() { div_10m } else { 1 };
        Self { interface, ref_clock, ref_clk_div }
    }
}
