//! Call response types
//!
//! A response is exactly one of three outcomes. On the wire it is flattened
//! into a record with `CaughtException`, `IsBulky` and `ReturnValue` fields:
//!
//! | Outcome   | CaughtException | IsBulky | ReturnValue        |
//! |-----------|-----------------|---------|--------------------|
//! | `Fault`   | `true`          | `false` | fault message text |
//! | `Plain`   | `false`         | `false` | the return value   |
//! | `Bulky`   | `false`         | `true`  | payload length     |

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The outcome of one call, as sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireResponse", try_from = "WireResponse")]
pub enum CallResponse {
    /// The remote method failed; carries its message text.
    Fault { message: String },
    /// The remote method returned a value that travels inline.
    Plain { value: Value },
    /// The remote method returned a byte payload of `byte_length` bytes,
    /// delivered through the bulk sub-protocol.
    Bulky { byte_length: u64 },
}

impl CallResponse {
    pub fn fault(message: impl Into<String>) -> Self {
        CallResponse::Fault {
            message: message.into(),
        }
    }

    pub fn plain(value: Value) -> Self {
        CallResponse::Plain { value }
    }

    pub fn bulky(byte_length: u64) -> Self {
        CallResponse::Bulky { byte_length }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, CallResponse::Fault { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WireResponse {
    #[serde(default)]
    caught_exception: bool,
    #[serde(default)]
    is_bulky: bool,
    #[serde(default)]
    return_value: Value,
}

impl From<CallResponse> for WireResponse {
    fn from(response: CallResponse) -> Self {
        let (caught_exception, is_bulky, return_value) = response.into_parts();
        WireResponse {
            caught_exception,
            is_bulky,
            return_value,
        }
    }
}

impl TryFrom<WireResponse> for CallResponse {
    type Error = String;

    fn try_from(wire: WireResponse) -> Result<Self, Self::Error> {
        CallResponse::from_parts(wire.caught_exception, wire.is_bulky, wire.return_value)
    }
}

impl CallResponse {
    /// Splits a response into its `(CaughtException, IsBulky, ReturnValue)`
    /// wire fields.
    pub fn into_parts(self) -> (bool, bool, Value) {
        match self {
            CallResponse::Fault { message } => (true, false, Value::String(message)),
            CallResponse::Plain { value } => (false, false, value),
            CallResponse::Bulky { byte_length } => (false, true, Value::from(byte_length)),
        }
    }

    /// Rebuilds a response from its wire fields, rejecting combinations
    /// that name more than one outcome.
    pub fn from_parts(
        caught_exception: bool,
        is_bulky: bool,
        return_value: Value,
    ) -> Result<Self, String> {
        match (caught_exception, is_bulky) {
            (true, true) => Err("response is flagged both as a fault and as bulky".to_string()),
            (true, false) => {
                let message = match return_value {
                    Value::String(message) => message,
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                Ok(CallResponse::Fault { message })
            }
            (false, true) => {
                let byte_length = match &return_value {
                    Value::Number(n) => n.as_u64(),
                    // some codecs render 64-bit lengths as strings
                    Value::String(s) => s.parse().ok(),
                    _ => None,
                };
                byte_length
                    .map(|byte_length| CallResponse::Bulky { byte_length })
                    .ok_or_else(|| {
                        format!("bulky response has an invalid length: {}", return_value)
                    })
            }
            (false, false) => Ok(CallResponse::Plain {
                value: return_value,
            }),
        }
    }
}
