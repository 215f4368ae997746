//! tcpipc Common Types, Contracts and Transport
//!
//! This crate holds what both ends of a tcpipc connection agree on.
//!
//! # Overview
//!
//! tcpipc is a synchronous request/response RPC system over TCP. A client
//! obtains a proxy for a contract and its method calls travel to a server
//! hosting a concrete service, where they run one at a time on a dispatcher
//! thread.
//!
//! - **Protocol Layer**: call requests, call responses, errors and constants
//! - **Transport Layer**: the line codec and the blocking TCP connection
//! - **Contract Layer**: the [`remote_contract!`] macro, proxies and method tables
//!
//! # Wire Format
//!
//! - **Framing**: one UTF-8 JSON message per `\n`-terminated line
//! - **Bulk**: after a bulky response the client sends `READY_FOR_BULK` and
//!   the server writes exactly the announced number of raw bytes
//!
//! # Example
//!
//! ```
//! use tcpipc_common::{CallRequest, CallResponse};
//! use tcpipc_common::transport::{JsonCodec, LineCodec};
//! use serde_json::json;
//!
//! let codec = JsonCodec;
//! let line = codec
//!     .encode_request(&CallRequest::new("Add", vec![json!(2), json!(3)]))
//!     .unwrap();
//! assert_eq!(line, r#"{"MethodName":"Add","Arguments":[2,3]}"#);
//!
//! let response = codec.decode_response(r#"{"ReturnValue":5}"#).unwrap();
//! assert_eq!(response, Some(CallResponse::plain(json!(5))));
//! ```

pub mod contract;
pub mod protocol;
pub mod transport;

pub use protocol::*;
