//! Simulated collaborators for the connection manager.
//!
//! [`SimPhy`], [`SimMac`] and [`SimStack`] record every call and let tests
//! script link state, negotiation results and DHCP behaviour. [`EventLog`]
//! captures events across several handlers in dispatch order.

use std::sync::OnceLock;

use ecm::{EcmConfig, InterfaceConfig, InterfaceId, Timing};

mod events;
mod mac;
mod phy;
mod stack;

pub use events::{EventLog, EventRecord};
pub use mac::{MacCall, SimMac};
pub use phy::{PhyCall, SimPhy};
pub use stack::{Dhcp, SimStack, StackStats};

static LOGGER: OnceLock<()> = OnceLock::new();

/// Install `env_logger` once per test binary. `RUST_LOG` overrides the
/// default `warn` filter.
pub fn init_logging() {
    LOGGER.get_or_init(|| {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
            .is_test(true)
            .try_init();
    });
}

/// Millisecond-scale timings so bounded waits finish quickly.
pub fn fast_timing() -> Timing {
    Timing {
        monitor_interval_ms: 5,
        link_check_interval_ms: 1,
        driver_link_poll_ms: 1,
        link_wait_ms: 40,
        autoneg_settle_ms: 0,
        autoneg_poll_ms: 1,
        autoneg_timeout_ms: 40,
        dhcp_poll_ms: 1,
        dhcp_timeout_ms: 40,
    }
}

/// Both interfaces enabled with default PHY settings and [`fast_timing`].
pub fn fast_config() -> EcmConfig {
    EcmConfig::default()
        .with_interface(InterfaceConfig::new(InterfaceId::Eth0))
        .with_interface(InterfaceConfig::new(InterfaceId::Eth1))
        .with_timing(fast_timing())
}
