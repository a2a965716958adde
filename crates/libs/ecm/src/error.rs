use std::time::Duration;

use crate::config::ConfigError;
use crate::mac::MacError;
use crate::phy::PhyError;
use crate::stack::StackError;

pub type Result<T> = std::result::Result<T, EcmError>;

/// Errors returned by the connection manager's public operations.
///
/// Contract failures (PHY, MAC, network stack) are carried as sources so the
/// caller sees both the lifecycle step that failed and the collaborator's
/// own reason.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum EcmError {
    #[error("bad argument: {0}")]
    BadArgument(String),

    #[error("connection manager not initialized")]
    NotInitialized,

    #[error("already initialized")]
    AlreadyInitialized,

    #[error("interface already connected")]
    AlreadyConnected,

    #[error("interface not connected")]
    NotConnected,

    #[error("lock poisoned: {0}")]
    Mutex(&'static str),

    #[error("network stack initialization failed: {0}")]
    NetworkInit(#[source] StackError),

    #[error("network stack teardown failed: {0}")]
    NetworkDeinit(#[source] StackError),

    #[error("network interface registration failed: {0}")]
    Interface(#[source] StackError),

    #[error("failed to start DHCP client")]
    StartingDhcp,

    #[error("timed out waiting for a DHCP lease")]
    DhcpTimeout,

    #[error("connection failed: {0}")]
    Connection(#[source] StackError),

    #[error("static IPv6 addressing is not supported")]
    StaticIpNotSupported,

    #[error("only link-local IPv6 addresses are supported")]
    Ipv6GlobalUnsupported,

    #[error("IPv6 link-local address not ready: {0}")]
    Ipv6NotReady(#[source] StackError),

    #[error("ip address query failed: {0}")]
    IpAddress(#[source] StackError),

    #[error("gateway address query failed: {0}")]
    GatewayAddress(#[source] StackError),

    #[error("netmask query failed: {0}")]
    NetmaskAddress(#[source] StackError),

    #[error("ping failed: {0}")]
    Ping(#[source] StackError),

    #[error("link did not come up within {0:?}")]
    LinkTimeout(Duration),

    #[error("driver: {0}")]
    Driver(#[from] DriverError),

    #[error("event handler registry full ({capacity} handlers)")]
    CallbacksFull { capacity: usize },

    #[error("link monitor: {0}")]
    Monitor(String),

    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
}

impl EcmError {
    pub fn bad_argument(message: impl Into<String>) -> Self {
        Self::BadArgument(message.into())
    }

    /// Returns `true` for failures caused by a wait budget running out.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::DhcpTimeout
                | Self::LinkTimeout(_)
                | Self::Driver(DriverError::LinkTimeout(_))
                | Self::Driver(DriverError::AutoNegotiationTimeout(_))
        )
    }
}

impl From<MacError> for EcmError {
    fn from(err: MacError) -> Self {
        Self::Driver(DriverError::Mac(err))
    }
}

/// Failures of the hardware bring-up sequence.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DriverError {
    #[error("mac: {0}")]
    Mac(#[from] MacError),

    #[error("phy: {0}")]
    Phy(#[from] PhyError),

    #[error("auto-negotiation did not complete within {0:?}")]
    AutoNegotiationTimeout(Duration),

    #[error("link did not come up within {0:?}")]
    LinkTimeout(Duration),
}
