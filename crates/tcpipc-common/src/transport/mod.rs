//! tcpipc Transport Layer
//!
//! This module provides the TCP connection and the codecs for sending and
//! receiving call messages.
//!
//! # Architecture
//!
//! - **Transport**: one blocking TCP stream per client
//! - **Codec**: any [`LineCodec`]; [`JsonCodec`] by default, or the more
//!   compact [`PositionalJsonCodec`]
//! - **Wire Format**: newline-delimited control lines, followed by raw bytes
//!   only inside a bulk transfer
//!
//! # Components
//!
//! - **[`LineCodec`]** / **[`JsonCodec`]** / **[`PositionalJsonCodec`]**: encode/decode call
//!   messages to single lines
//! - **[`Connection`]**: line and raw sub-channels over one `TcpStream`
//!
//! # Example
//!
//! ```no_run
//! use tcpipc_common::transport::{Connection, JsonCodec, LineCodec, DEFAULT_CONNECT_TIMEOUT};
//! use tcpipc_common::protocol::CallRequest;
//! use serde_json::json;
//!
//! let mut conn = Connection::connect("127.0.0.1:62001", DEFAULT_CONNECT_TIMEOUT).unwrap();
//! let line = JsonCodec.encode_request(&CallRequest::new("Add", vec![json!(4), json!(1)])).unwrap();
//! conn.write_line(&line).unwrap();
//! let reply = conn.read_line().unwrap();
//! ```

pub mod codec;
pub mod tcp;

pub use codec::{JsonCodec, LineCodec, PositionalJsonCodec};
pub use tcp::{map_io_error, Connection, DEFAULT_CONNECT_TIMEOUT};

#[cfg(test)]
mod tests;
