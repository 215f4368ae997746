use serde::{Deserialize, Serialize};

pub type MethodName = String;
pub type Argument = serde_json::Value;

/// A method call travelling from client to server.
///
/// Arguments are positional and must appear in the order the contract
/// declares its parameters. Field names on the wire are `MethodName` and
/// `Arguments`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct CallRequest {
    pub method_name: MethodName,
    #[serde(default)]
    pub arguments: Vec<Argument>,
}

impl CallRequest {
    pub fn new(method_name: impl Into<String>, arguments: Vec<Argument>) -> Self {
        CallRequest {
            method_name: method_name.into(),
            arguments,
        }
    }

    pub fn arity(&self) -> usize {
        self.arguments.len()
    }
}
