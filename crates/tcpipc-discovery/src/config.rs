use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use tcpipc_common::{Result, TcpipcError};

/// Default multicast group announcements are sent to.
pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 42, 99);

/// Default UDP port announcements are sent to.
pub const DEFAULT_PORT: u16 = 62100;

/// Where and how often services are announced.
///
/// `group` is normally a multicast address. A unicast address is accepted
/// too, in which case announcements go straight to that host and no group
/// is joined.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryConfig {
    pub group: Ipv4Addr,
    pub port: u16,
    /// Time between two announcements (default: 1 second).
    pub interval: Duration,
    /// How often a listener checks whether it was stopped (default: 200 ms).
    pub poll_interval: Duration,
    /// Multicast time-to-live (default: 1, the local network only).
    pub ttl: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP,
            port: DEFAULT_PORT,
            interval: Duration::from_secs(1),
            poll_interval: Duration::from_millis(200),
            ttl: 1,
        }
    }
}

impl DiscoveryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, group: Ipv4Addr) -> Self {
        self.group = group;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = ttl;
        self
    }

    pub(crate) fn target(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(self.group, self.port))
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(TcpipcError::Configuration(
                "discovery port must not be zero".to_string(),
            ));
        }
        if self.interval.is_zero() || self.poll_interval.is_zero() {
            return Err(TcpipcError::Configuration(
                "discovery intervals must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
