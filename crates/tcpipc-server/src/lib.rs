//! tcpipc Server
//!
//! This crate hosts a service behind a remote contract. It accepts TCP
//! connections, runs one session thread per client, and funnels every
//! method invocation through a single-threaded [`Dispatcher`].
//!
//! # Components
//!
//! - [`Server`] / [`ServerHandle`] - accept loop, sessions and shutdown
//! - [`Dispatcher`] - the one place where service code runs
//! - [`ServerConfig`] - bind address, line limits, bulk chunk size

pub mod config;
pub mod dispatcher;
pub mod server;
mod session;

pub use config::ServerConfig;
pub use dispatcher::Dispatcher;
pub use server::{Server, ServerEvent, ServerHandle};
