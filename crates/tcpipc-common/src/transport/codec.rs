use serde_json::Value;

use crate::protocol::error::{Result, TcpipcError};
use crate::protocol::{Argument, CallRequest, CallResponse};

/// Converts protocol messages to and from single text lines.
///
/// Implementations must never produce a line containing `\n`; the transport
/// rejects such lines. Decoding an empty line yields `None`, mirroring an
/// encoder that turns "no message" into an empty line.
///
/// Client and server only ever talk to this trait, so any number of
/// interchangeable codecs can be installed as long as both peers agree.
pub trait LineCodec: Send + Sync + 'static {
    /// Short name used in log output.
    fn name(&self) -> &'static str;

    fn encode_request(&self, request: &CallRequest) -> Result<String>;

    fn decode_request(&self, line: &str) -> Result<Option<CallRequest>>;

    fn encode_response(&self, response: &CallResponse) -> Result<String>;

    fn decode_response(&self, line: &str) -> Result<Option<CallResponse>>;
}

/// JSON codec for encoding/decoding call messages
///
/// Uses `serde_json`, whose compact output escapes control characters, so a
/// message always fits on one line.
///
/// # Example
///
/// ```
/// use tcpipc_common::transport::{JsonCodec, LineCodec};
/// use tcpipc_common::protocol::CallRequest;
/// use serde_json::json;
///
/// let codec = JsonCodec;
/// let request = CallRequest::new("Add", vec![json!(4), json!(1)]);
///
/// let line = codec.encode_request(&request).unwrap();
/// let decoded = codec.decode_request(&line).unwrap();
/// assert_eq!(decoded, Some(request));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl LineCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode_request(&self, request: &CallRequest) -> Result<String> {
        Ok(serde_json::to_string(request)?)
    }

    fn decode_request(&self, line: &str) -> Result<Option<CallRequest>> {
        if line.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(line)
            .map(Some)
            .map_err(|e| TcpipcError::Protocol(format!("Malformed call request: {}", e)))
    }

    fn encode_response(&self, response: &CallResponse) -> Result<String> {
        Ok(serde_json::to_string(response)?)
    }

    fn decode_response(&self, line: &str) -> Result<Option<CallResponse>> {
        if line.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(line)
            .map(Some)
            .map_err(|e| TcpipcError::Protocol(format!("Malformed call response: {}", e)))
    }
}

/// Compact codec that drops field names and writes every message as a
/// positional JSON array.
///
/// ```text
/// request:  ["GetData",[1,"two"]]
/// response: [false,true,1048576]     (CaughtException, IsBulky, ReturnValue)
/// ```
///
/// Both peers must use the same codec; lines from [`JsonCodec`] are
/// rejected as malformed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionalJsonCodec;

impl LineCodec for PositionalJsonCodec {
    fn name(&self) -> &'static str {
        "positional-json"
    }

    fn encode_request(&self, request: &CallRequest) -> Result<String> {
        Ok(serde_json::to_string(&(&request.method_name, &request.arguments))?)
    }

    fn decode_request(&self, line: &str) -> Result<Option<CallRequest>> {
        if line.trim().is_empty() {
            return Ok(None);
        }
        let (method_name, arguments): (String, Vec<Argument>) = serde_json::from_str(line)
            .map_err(|e| TcpipcError::Protocol(format!("Malformed call request: {}", e)))?;
        Ok(Some(CallRequest::new(method_name, arguments)))
    }

    fn encode_response(&self, response: &CallResponse) -> Result<String> {
        Ok(serde_json::to_string(&response.clone().into_parts())?)
    }

    fn decode_response(&self, line: &str) -> Result<Option<CallResponse>> {
        if line.trim().is_empty() {
            return Ok(None);
        }
        let (caught_exception, is_bulky, return_value): (bool, bool, Value) =
            serde_json::from_str(line)
                .map_err(|e| TcpipcError::Protocol(format!("Malformed call response: {}", e)))?;
        CallResponse::from_parts(caught_exception, is_bulky, return_value)
            .map(Some)
            .map_err(|e| TcpipcError::Protocol(format!("Malformed call response: {}", e)))
    }
}
