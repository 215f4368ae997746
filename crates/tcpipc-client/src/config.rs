use std::time::Duration;

use tcpipc_common::transport::DEFAULT_CONNECT_TIMEOUT;
use tcpipc_common::{Result, TcpipcError, BULK_CHUNK_SIZE, MAX_LINE_LEN};

/// Client connection settings.
///
/// There is no per-call timeout: a call blocks until the
/// server answers or the connection fails.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tcpipc_client::ClientConfig;
///
/// let config = ClientConfig::new()
///     .with_connect_timeout(Duration::from_secs(1))
///     .with_bulk_chunk_size(64 * 1024);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    /// Longest response line accepted from the server.
    pub max_line_len: usize,
    /// Read buffer size for bulk payloads; progress is reported once per chunk.
    pub bulk_chunk_size: usize,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
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

    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(TcpipcError::Configuration(
                "connect_timeout must be greater than zero".to_string(),
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

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_line_len: MAX_LINE_LEN,
            bulk_chunk_size: BULK_CHUNK_SIZE,
        }
    }
}
