//! Blocking tcpipc client
//!
//! A [`Client`] owns one TCP connection to a server and implements
//! [`Dispatch`](tcpipc_common::contract::Dispatch), so any contract proxy can
//! run over it. Calls are strictly sequential: the connection carries at
//! most one outstanding call, and concurrent callers on clones of the same
//! client wait their turn.

pub mod client;
pub mod config;

pub use client::Client;
pub use config::ClientConfig;
