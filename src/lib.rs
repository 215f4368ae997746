//! tcpipc
//!
//! Synchronous remote method calls over TCP. A contract is declared once
//! with [`remote_contract!`]; servers host an implementation of it and
//! clients call it through a generated proxy.
//!
//! This crate re-exports the workspace crates:
//!
//! - [`common`] - wire protocol, codec, transport and contract machinery
//! - [`client`] - the blocking client
//! - [`server`] - the threaded server and its dispatcher
//! - [`discovery`] - UDP multicast advertisement and discovery
//!
//! # Example
//!
//! ```no_run
//! use tcpipc::{remote_contract, Client, Server};
//!
//! remote_contract! {
//!     #[proxy(GreeterProxy)]
//!     pub trait Greeter {
//!         fn greet(&mut self, name: String) -> String;
//!     }
//! }
//!
//! struct English;
//!
//! impl Greeter for English {
//!     fn greet(&mut self, name: String) -> tcpipc::Result<String> {
//!         Ok(format!("Hello, {}!", name))
//!     }
//! }
//!
//! let server = Server::new::<dyn Greeter>(English)?.listen()?;
//! let client = Client::connect(server.local_addr())?;
//! let mut greeter = client.proxy::<dyn Greeter>();
//! assert_eq!(greeter.greet("Ada".to_string())?, "Hello, Ada!");
//! # Ok::<(), tcpipc::TcpipcError>(())
//! ```

pub use tcpipc_client as client;
pub use tcpipc_common as common;
pub use tcpipc_discovery as discovery;
pub use tcpipc_server as server;

pub use tcpipc_client::{Client, ClientConfig};
pub use tcpipc_common::contract::{BulkPayload, Dispatch, LocalDispatch, RemoteContract};
pub use tcpipc_common::{remote_contract, Result, TcpipcError};
pub use tcpipc_discovery::{DiscoveryConfig, ServiceAdvertiser, ServiceDiscoverer};
pub use tcpipc_server::{Dispatcher, Server, ServerConfig, ServerEvent, ServerHandle};
