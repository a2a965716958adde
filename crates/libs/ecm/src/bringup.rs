//! MAC/PHY bring-up.
//!
//! The first interface opened in the process performs the full sequence:
//!
//! 1. MDIO pre-init and PHY auto-negotiation (when speed or duplex is auto)
//! 2. Wrapper selection and reference clock derived from the resolved speed
//! 3. Full MAC init
//!
//! Later opens find the MAC already configured and only re-run PHY init,
//! picking up the PHY's current speed when auto-negotiation was requested.
//! Both paths then reset, discover and configure the PHY and wait for link.

use std::thread;

use crate::config::{InterfaceConfig, Timing};
use crate::error::DriverError;
use crate::mac::{MacDriver, WrapperConfig};
use crate::phy::PhyDriver;
use crate::types::{Duplex, InterfaceId, MacBase, PhyConfig, PhySpeed};
use crate::wait::{poll_until, PollOutcome};

/// Holds the deep-sleep lock for the lifetime of the guard.
pub(crate) struct DeepSleepGuard<'a> {
    mac: &'a dyn MacDriver,
}

impl<'a> DeepSleepGuard<'a> {
    pub(crate) fn acquire(mac: &'a dyn MacDriver) -> Self {
        mac.lock_deep_sleep();
        Self { mac }
    }
}

impl Drop for DeepSleepGuard<'_> {
    fn drop(&mut self) {
        self.mac.unlock_deep_sleep();
    }
}

pub(crate) struct BringUp<'a> {
    pub mac: &'a dyn MacDriver,
    pub phy: &'a dyn PhyDriver,
    pub timing: &'a Timing,
    pub id: InterfaceId,
    pub base: MacBase,
}

impl BringUp<'_> {
    /// Run the sequence. `mac_configured` is the process-wide "MAC already
    /// initialized" flag; it is set only after a successful full init.
    /// Returns the PHY configuration with negotiated values filled in.
    pub(crate) fn run(
        &self,
        iface: &InterfaceConfig,
        mac_configured: &mut bool,
    ) -> Result<PhyConfig, DriverError> {
        let mut phy_config = iface.phy_config();
        if *mac_configured {
            self.reconfigure(&mut phy_config)?;
        } else {
            self.first_bring_up(iface, &mut phy_config)?;
            *mac_configured = true;
        }

        self.phy.reset(self.id, self.base)?;
        self.phy.discover(self.id)?;
        self.phy.configure(self.id, phy_config.duplex, phy_config.speed)?;
        self.phy.enable_ext_reg(self.base, phy_config.speed)?;

        self.wait_for_link()?;
        self.mac.register_callbacks(self.base);
        log::info!(
            "ecm: driver ready iface={} base={} mode={:?} speed={:?} duplex={:?}",
            self.id,
            self.base,
            phy_config.interface,
            phy_config.speed,
            phy_config.duplex
        );
        Ok(phy_config)
    }

    fn first_bring_up(
        &self,
        iface: &InterfaceConfig,
        phy_config: &mut PhyConfig,
    ) -> Result<(), DriverError> {
        let auto = phy_config.wants_auto_negotiation();
        if auto {
            self.mac.mdio_init(self.base)?;
            self.phy.init(self.id, self.base)?;
            self.phy.configure(self.id, Duplex::Auto, PhySpeed::Auto)?;
            thread::sleep(self.timing.autoneg_settle());
            self.wait_for_auto_negotiation()?;
            let (duplex, speed) = self.phy.link_partner_capability(self.id)?;
            log::debug!(
                "ecm: link partner iface={} speed={:?} duplex={:?}",
                self.id,
                speed,
                duplex
            );
            phy_config.resolve(duplex, speed);
        }

        let wrapper = WrapperConfig::derive(
            phy_config.interface,
            phy_config.speed,
            iface.ref_clock,
            iface.ref_clk_div_10m,
        );
        log::debug!(
            "ecm: mac init base={} selection={:?} ref_clk_div={}",
            self.base,
            wrapper.interface,
            wrapper.ref_clk_div
        );
        self.mac.init(self.base, &wrapper)?;

        if !auto {
            self.phy.init(self.id, self.base)?;
        }
        Ok(())
    }

    fn reconfigure(&self, phy_config: &mut PhyConfig) -> Result<(), DriverError> {
        self.phy.init(self.id, self.base)?;
        if phy_config.wants_auto_negotiation() {
            match self.phy.link_speed(self.id) {
                Ok((duplex, speed)) => phy_config.resolve(duplex, speed),
                Err(err) => log::warn!(
                    "ecm: keeping requested phy settings iface={} err={}",
                    self.id,
                    err
                ),
            }
        }
        Ok(())
    }

    /// A status read failure ends the wait early and the partner
    /// capability is read regardless.
    fn wait_for_auto_negotiation(&self) -> Result<(), DriverError> {
        let budget = self.timing.autoneg_timeout();
        let outcome = poll_until(self.timing.autoneg_poll(), Some(budget), None, || {
            match self.phy.auto_negotiation_status(self.id) {
                Ok(true) => Some(()),
                Ok(false) => None,
                Err(err) => {
                    log::warn!("ecm: auto-negotiation status failed iface={} err={}", self.id, err);
                    Some(())
                }
            }
        });
        match outcome {
            PollOutcome::TimedOut(_) => Err(DriverError::AutoNegotiationTimeout(budget)),
            _ => Ok(()),
        }
    }

    fn wait_for_link(&self) -> Result<(), DriverError> {
        let budget = self.timing.link_wait();
        let outcome = poll_until(self.timing.driver_link_poll(), Some(budget), None, || {
            matches!(self.phy.link_status(self.id), Ok(true)).then_some(())
        });
        match outcome {
            PollOutcome::Ready(()) => Ok(()),
            _ => Err(DriverError::LinkTimeout(budget)),
        }
    }
}
