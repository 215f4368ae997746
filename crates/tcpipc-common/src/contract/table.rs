use std::collections::HashMap;
use std::fmt;
use std::vec;

use serde::de::DeserializeOwned;

use crate::contract::Reply;
use crate::protocol::error::{Result, TcpipcError};
use crate::protocol::requests::Argument;

/// Server-side entry point for one method: decodes the positional
/// arguments, calls the service and encodes what it returned.
pub type Handler<S> = Box<dyn Fn(&mut S, Vec<Argument>) -> Result<Reply> + Send + Sync>;

/// Maps the method names of one contract to handlers over a service `S`.
pub struct MethodTable<S> {
    contract: String,
    handlers: HashMap<String, Handler<S>>,
}

impl<S> MethodTable<S> {
    pub fn builder(contract: impl Into<String>) -> MethodTableBuilder<S> {
        MethodTableBuilder {
            contract: contract.into(),
            handlers: HashMap::new(),
            duplicates: Vec::new(),
        }
    }

    pub fn contract_name(&self) -> &str {
        &self.contract
    }

    pub fn contains(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Method names in sorted order.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs `method` against `service`.
    ///
    /// # Errors
    ///
    /// `Remote` when the method is not part of the contract, otherwise
    /// whatever the handler returns.
    pub fn invoke(&self, service: &mut S, method: &str, arguments: Vec<Argument>) -> Result<Reply> {
        let handler = self.handlers.get(method).ok_or_else(|| {
            TcpipcError::Remote(format!(
                "method '{}' is not part of contract '{}'",
                method, self.contract
            ))
        })?;
        handler(service, arguments)
    }
}

impl<S> fmt::Debug for MethodTable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("contract", &self.contract)
            .field("methods", &self.method_names())
            .finish()
    }
}

pub struct MethodTableBuilder<S> {
    contract: String,
    handlers: HashMap<String, Handler<S>>,
    duplicates: Vec<String>,
}

impl<S> MethodTableBuilder<S> {
    pub fn method<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut S, Vec<Argument>) -> Result<Reply> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.handlers.contains_key(&name) {
            self.duplicates.push(name);
        } else {
            self.handlers.insert(name, Box::new(handler));
        }
        self
    }

    /// # Errors
    ///
    /// `Configuration` when the contract name is empty or a method name
    /// was registered twice. Overloads are not supported.
    pub fn build(self) -> Result<MethodTable<S>> {
        if self.contract.trim().is_empty() {
            return Err(TcpipcError::Configuration(
                "contract name must not be empty".to_string(),
            ));
        }
        if !self.duplicates.is_empty() {
            return Err(TcpipcError::Configuration(format!(
                "contract '{}' declares overloaded methods: {}",
                self.contract,
                self.duplicates.join(", ")
            )));
        }
        Ok(MethodTable {
            contract: self.contract,
            handlers: self.handlers,
        })
    }
}

/// Positional argument cursor used by generated handlers.
#[derive(Debug)]
pub struct Arguments {
    method: String,
    values: vec::IntoIter<Argument>,
    position: usize,
}

impl Arguments {
    /// Fails with `Remote` when the caller sent a different number of
    /// arguments than the method declares.
    pub fn new(method: &str, values: Vec<Argument>, expected: usize) -> Result<Self> {
        if values.len() != expected {
            return Err(TcpipcError::Remote(format!(
                "method '{}' expects {} argument(s), got {}",
                method,
                expected,
                values.len()
            )));
        }
        Ok(Self {
            method: method.to_string(),
            values: values.into_iter(),
            position: 0,
        })
    }

    /// Decodes the next argument as `T`.
    pub fn next<T: DeserializeOwned>(&mut self, name: &str) -> Result<T> {
        let position = self.position;
        self.position += 1;
        let value = self.values.next().ok_or_else(|| {
            TcpipcError::Remote(format!(
                "method '{}' is missing argument {} ('{}')",
                self.method, position, name
            ))
        })?;
        serde_json::from_value(value).map_err(|e| {
            TcpipcError::Conversion(format!(
                "argument {} ('{}') of '{}': {}",
                position, name, self.method, e
            ))
        })
    }
}
