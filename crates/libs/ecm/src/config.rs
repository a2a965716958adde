use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::mac::RefClockSource;
use crate::types::{Duplex, InterfaceId, MacAddress, MacBase, PhyConfig, PhyInterfaceMode, PhySpeed};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Board-level settings for the connection manager.
///
/// ```toml
/// mac_instances = 2
///
/// [timing]
/// dhcp_timeout_ms = 30000
///
/// [[interfaces]]
/// id = "eth0"
/// mac_address = "00:03:19:45:00:00"
/// phy_interface = "rgmii"
/// speed = "auto"
/// duplex = "auto"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EcmConfig {
    #[serde(default = "default_mac_instances")]
    pub mac_instances: u8,
    #[serde(default = "default_max_event_handlers")]
    pub max_event_handlers: usize,
    #[serde(default)]
    pub timing: Timing,
    #[serde(default)]
    pub interfaces: Vec<InterfaceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceConfig {
    pub id: InterfaceId,
    pub enabled: Option<bool>,
    #[serde(default)]
    pub mac_address: Option<MacAddress>,
    #[serde(default = "default_phy_interface")]
    pub phy_interface: PhyInterfaceMode,
    #[serde(default = "default_speed")]
    pub speed: PhySpeed,
    #[serde(default = "default_duplex")]
    pub duplex: Duplex,
    #[serde(default)]
    pub promiscuous: bool,
    #[serde(default = "default_true")]
    pub accept_broadcast: bool,
    #[serde(default)]
    pub ref_clock: RefClockSource,
    #[serde(default = "default_ref_clk_div_10m")]
    pub ref_clk_div_10m: u8,
}

/// Poll intervals and wait budgets, in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Timing {
    pub monitor_interval_ms: u64,
    pub link_check_interval_ms: u64,
    pub driver_link_poll_ms: u64,
    pub link_wait_ms: u64,
    pub autoneg_settle_ms: u64,
    pub autoneg_poll_ms: u64,
    pub autoneg_timeout_ms: u64,
    pub dhcp_poll_ms: u64,
    pub dhcp_timeout_ms: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            monitor_interval_ms: 1000,
            link_check_interval_ms: 100,
            driver_link_poll_ms: 1,
            link_wait_ms: 10_000,
            autoneg_settle_ms: 100,
            autoneg_poll_ms: 100,
            autoneg_timeout_ms: 10_000,
            dhcp_poll_ms: 10,
            dhcp_timeout_ms: 60_000,
        }
    }
}

impl Timing {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn link_check_interval(&self) -> Duration {
        Duration::from_millis(self.link_check_interval_ms)
    }

    pub fn driver_link_poll(&self) -> Duration {
        Duration::from_millis(self.driver_link_poll_ms)
    }

    pub fn link_wait(&self) -> Duration {
        Duration::from_millis(self.link_wait_ms)
    }

    pub fn autoneg_settle(&self) -> Duration {
        Duration::from_millis(self.autoneg_settle_ms)
    }

    pub fn autoneg_poll(&self) -> Duration {
        Duration::from_millis(self.autoneg_poll_ms)
    }

    pub fn autoneg_timeout(&self) -> Duration {
        Duration::from_millis(self.autoneg_timeout_ms)
    }

    pub fn dhcp_poll(&self) -> Duration {
        Duration::from_millis(self.dhcp_poll_ms)
    }

    pub fn dhcp_timeout(&self) -> Duration {
        Duration::from_millis(self.dhcp_timeout_ms)
    }
}

fn default_mac_instances() -> u8 {
    2
}

fn default_max_event_handlers() -> usize {
    3
}

fn default_phy_interface() -> PhyInterfaceMode {
    PhyInterfaceMode::Rgmii
}

fn default_speed() -> PhySpeed {
    PhySpeed::Auto
}

fn default_duplex() -> Duplex {
    Duplex::Auto
}

fn default_true() -> bool {
    true
}

fn default_ref_clk_div_10m() -> u8 {
    10
}

impl Default for EcmConfig {
    /// One enabled `eth0` with auto-negotiated RGMII.
    fn default() -> Self {
        Self {
            mac_instances: default_mac_instances(),
            max_event_handlers: default_max_event_handlers(),
            timing: Timing::default(),
            interfaces: vec![InterfaceConfig::new(InterfaceId::Eth0)],
        }
    }
}

impl EcmConfig {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn with_interface(mut self, interface: InterfaceConfig) -> Self {
        self.interfaces.retain(|existing| existing.id != interface.id);
        self.interfaces.push(interface);
        self
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=InterfaceId::COUNT as u8).contains(&self.mac_instances) {
            return Err(ConfigError::Invalid(format!(
                "mac_instances must be 1 or 2, got {}",
                self.mac_instances
            )));
        }
        let mut seen = HashSet::new();
        for iface in &self.interfaces {
            if !seen.insert(iface.id) {
                return Err(ConfigError::Invalid(format!("duplicate interface {}", iface.id)));
            }
        }
        let t = &self.timing;
        let intervals = [
            ("monitor_interval_ms", t.monitor_interval_ms),
            ("link_check_interval_ms", t.link_check_interval_ms),
            ("driver_link_poll_ms", t.driver_link_poll_ms),
            ("autoneg_poll_ms", t.autoneg_poll_ms),
            ("dhcp_poll_ms", t.dhcp_poll_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be non-zero")));
        }
        Ok(())
    }

    /// The configuration for `id`, if present and enabled.
    pub fn interface(&self, id: InterfaceId) -> Option<&InterfaceConfig> {
        self.interfaces
            .iter()
            .find(|iface| iface.id == id && iface.enabled.unwrap_or(true))
    }

    /// With a single MAC block both identifiers address instance 0.
    pub fn mac_base(&self, id: InterfaceId) -> MacBase {
        if self.mac_instances > 1 {
            MacBase(id.index() as u8)
        } else {
            MacBase(0)
        }
    }
}

impl InterfaceConfig {
    pub fn new(id: InterfaceId) -> Self {
        Self {
            id,
            enabled: Some(true),
            mac_address: None,
            phy_interface: default_phy_interface(),
            speed: default_speed(),
            duplex: default_duplex(),
            promiscuous: false,
            accept_broadcast: true,
            ref_clock: RefClockSource::default(),
            ref_clk_div_10m: default_ref_clk_div_10m(),
        }
    }

    pub fn with_phy(mut self, mode: PhyInterfaceMode, speed: PhySpeed, duplex: Duplex) -> Self {
        self.phy_interface = mode;
        self.speed = speed;
        self.duplex = duplex;
        self
    }

    pub fn with_mac_address(mut self, mac: MacAddress) -> Self {
        self.mac_address = Some(mac);
        self
    }

    pub fn mac_address(&self) -> MacAddress {
        self.mac_address.unwrap_or(MacAddress::DEFAULT)
    }

    pub fn phy_config(&self) -> PhyConfig {
        PhyConfig::new(self.phy_interface, self.speed, self.duplex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn parses_full_document() {
        let cfg = EcmConfig::from_toml(
            r#"
            mac_instances = 1
            max_event_handlers = 5

            [timing]
            dhcp_timeout_ms = 30000
            monitor_interval_ms = 250

            [[interfaces]]
            id = "eth0"
            mac_address = "02:00:00:aa:bb:cc"
            phy_interface = "rmii"
            speed = "100"
            duplex = "full"
            promiscuous = true
            accept_broadcast = false
            ref_clock = "internal"
            ref_clk_div_10m = 1

            [[interfaces]]
            id = "eth1"
            enabled = false
            "#,
        )
        .expect("config");

        assert_eq!(cfg.max_event_handlers, 5);
        assert_eq!(cfg.timing.dhcp_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.timing.monitor_interval(), Duration::from_millis(250));
        assert_eq!(cfg.timing.link_wait(), Duration::from_secs(10));

        let eth0 = cfg.interface(InterfaceId::Eth0).expect("eth0");
        assert_eq!(eth0.mac_address().to_string(), "02:00:00:aa:bb:cc");
        assert_eq!(
            eth0.phy_config(),
            PhyConfig::new(PhyInterfaceMode::Rmii, PhySpeed::Mbps100, Duplex::Full)
        );
        assert!(eth0.promiscuous);
        assert!(!eth0.accept_broadcast);
        assert_eq!(eth0.ref_clock, RefClockSource::Internal);
        assert!(cfg.interface(InterfaceId::Eth1).is_none());
        assert_eq!(cfg.mac_base(InterfaceId::Eth1), MacBase(0));
    }

    #[test]
    fn defaults_use_factory_mac_and_auto_negotiation() {
        let cfg = EcmConfig::from_toml("[[interfaces]]\nid = \"eth1\"\n").expect("config");
        let eth1 = cfg.interface(InterfaceId::Eth1).expect("eth1");
        assert_eq!(eth1.mac_address(), MacAddress::DEFAULT);
        assert!(eth1.phy_config().wants_auto_negotiation());
        assert!(eth1.accept_broadcast);
        assert_eq!(cfg.mac_base(InterfaceId::Eth1), MacBase(1));
        assert_eq!(cfg.max_event_handlers, 3);
    }

    #[test]
    fn rejects_duplicate_interfaces() {
        let err = EcmConfig::from_toml("[[interfaces]]\nid = \"eth0\"\n[[interfaces]]\nid = \"eth0\"\n")
            .expect_err("duplicate");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_intervals_and_bad_instance_count() {
        let err = EcmConfig::from_toml("[timing]\ndhcp_poll_ms = 0\n").expect_err("zero interval");
        assert!(err.to_string().contains("dhcp_poll_ms"));

        let err = EcmConfig::from_toml("mac_instances = 3\n").expect_err("instances");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_malformed_mac() {
        let err = EcmConfig::from_toml("[[interfaces]]\nid = \"eth0\"\nmac_address = \"00:11\"\n")
            .expect_err("mac");
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn loads_from_path() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[[interfaces]]\nid = \"eth0\"\nspeed = \"1000\"\nduplex = \"full\"")
            .expect("write");
        let cfg = EcmConfig::from_path(file.path()).expect("config");
        assert_eq!(cfg.interface(InterfaceId::Eth0).expect("eth0").speed, PhySpeed::Mbps1000);

        let missing = EcmConfig::from_path(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }

    #[test]
    fn with_interface_replaces_existing_entry() {
        let cfg = EcmConfig::default().with_interface(
            InterfaceConfig::new(InterfaceId::Eth0)
                .with_phy(PhyInterfaceMode::Mii, PhySpeed::Mbps10, Duplex::Half),
        );
        assert_eq!(cfg.interfaces.len(), 1);
        assert_eq!(cfg.interface(InterfaceId::Eth0).expect("eth0").speed, PhySpeed::Mbps10);
    }
}
