//! tcpipc service discovery
//!
//! A server announces the contract it hosts by periodically sending the
//! contract's type identifier over UDP multicast. A client listens on the
//! same group and port and learns the server's IP address from the first
//! matching announcement. Discovery only finds an address; the call
//! protocol itself starts with a normal TCP connect.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tcpipc_discovery::{DiscoveryConfig, ServiceAdvertiser, ServiceDiscoverer};
//!
//! let advertiser = ServiceAdvertiser::start("Calculator", DiscoveryConfig::default())?;
//!
//! let found = ServiceDiscoverer::wait_for(
//!     "calculator",
//!     DiscoveryConfig::default(),
//!     Duration::from_secs(5),
//! )?;
//! println!("calculator at {:?}", found);
//!
//! advertiser.stop();
//! # Ok::<(), tcpipc_common::TcpipcError>(())
//! ```

pub mod advertiser;
pub mod config;
pub mod discoverer;

pub use advertiser::ServiceAdvertiser;
pub use config::{DiscoveryConfig, DEFAULT_GROUP, DEFAULT_PORT};
pub use discoverer::ServiceDiscoverer;

/// Whether an announcement names the wanted type, ignoring case.
pub fn matches_type_id(announced: &str, wanted: &str) -> bool {
    announced.trim().to_lowercase() == wanted.trim().to_lowercase()
}
