//! PHY capability contract.
//!
//! A PHY driver is handed to [`Ecm::open`](crate::Ecm::open) and shared with
//! the link monitor thread, so every method takes `&self` and the driver must
//! be `Send + Sync`.

use crate::types::{Duplex, InterfaceId, MacBase, PhySpeed};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct PhyError(String);

impl PhyError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type PhyResult<T> = Result<T, PhyError>;

pub trait PhyDriver: Send + Sync {
    /// Bind the driver to the MDIO bus of `base`.
    fn init(&self, id: InterfaceId, base: MacBase) -> PhyResult<()>;

    /// Issue a soft reset.
    fn reset(&self, id: InterfaceId, base: MacBase) -> PhyResult<()>;

    /// Probe the bus for the PHY address.
    fn discover(&self, id: InterfaceId) -> PhyResult<()>;

    /// Program duplex and speed. `Auto` values enable auto-negotiation.
    fn configure(&self, id: InterfaceId, duplex: Duplex, speed: PhySpeed) -> PhyResult<()>;

    fn enable_ext_reg(&self, base: MacBase, speed: PhySpeed) -> PhyResult<()>;

    /// Current link state, `true` when up.
    fn link_status(&self, id: InterfaceId) -> PhyResult<bool>;

    /// Currently operating duplex and speed.
    fn link_speed(&self, id: InterfaceId) -> PhyResult<(Duplex, PhySpeed)>;

    /// `true` once auto-negotiation has completed.
    fn auto_negotiation_status(&self, id: InterfaceId) -> PhyResult<bool>;

    /// Duplex and speed advertised by the link partner.
    fn link_partner_capability(&self, id: InterfaceId) -> PhyResult<(Duplex, PhySpeed)>;
}
