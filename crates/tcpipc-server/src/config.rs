//! Server configuration.

use tcpipc_common::{Result, TcpipcError, BULK_CHUNK_SIZE, MAX_LINE_LEN};

/// Default address a server binds to: loopback, ephemeral port.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:0";

/// Default name of the dispatcher thread a server creates for itself.
pub const DEFAULT_DISPATCHER_NAME: &str = "tcpipc-dispatcher";

/// Settings for a [`Server`](crate::Server).
///
/// # Fields
///
/// - `bind_addr` - Address to listen on (default: `127.0.0.1:0`)
/// - `max_line_len` - Longest request line accepted (default: 16 MiB)
/// - `bulk_chunk_size` - Write buffer size for bulk payloads (default: 4 MiB)
/// - `dispatcher_name` - Thread name of the dispatcher the server creates
///   when none is injected
///
/// # Example
///
/// ```
/// use tcpipc_server::ServerConfig;
///
/// let config = ServerConfig::new()
///     .with_bind_addr("0.0.0.0:9000")
///     .with_dispatcher_name("calculator");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_line_len: usize,
    pub bulk_chunk_size: usize,
    pub dispatcher_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            max_line_len: MAX_LINE_LEN,
            bulk_chunk_size: BULK_CHUNK_SIZE,
            dispatcher_name: DEFAULT_DISPATCHER_NAME.to_string(),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bind_addr(mut self, bind_addr: impl Into<String>) -> Self {
        self.bind_addr = bind_addr.into();
        self
    }

    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    pub fn with_bulk_chunk_size(mut self, bulk_chunk_size: usize) -> Self {
        self.bulk_chunk_size = bulk_chunk_size;
        self
    }

    pub fn with_dispatcher_name(mut self, name: impl Into<String>) -> Self {
        self.dispatcher_name = name.into();
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if:
    /// - the bind address is empty
    /// - `max_line_len` or `bulk_chunk_size` is zero
    pub fn validate(&self) -> Result<()> {
        if self.bind_addr.trim().is_empty() {
            return Err(TcpipcError::Configuration(
                "bind address must not be empty".to_string(),
            ));
        }

        if self.max_line_len == 0 {
            return Err(TcpipcError::Configuration(
                "max_line_len must be greater than zero".to_string(),
            ));
        }

        if self.bulk_chunk_size == 0 {
            return Err(TcpipcError::Configuration(
                "bulk_chunk_size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}
