use thiserror::Error;

/// Every failure a tcpipc call or setup step can produce.
///
/// The variants follow the lifecycle of a connection:
///
/// - `Configuration` is only ever returned while building contracts,
///   method tables or servers, never from a running session.
/// - `Protocol` means the peer sent something that does not fit the wire
///   protocol. It ends the affected session or connection only.
/// - `Remote` carries the message text of a fault raised on the other side.
/// - `Connection` means the byte stream itself failed (reset, EOF, closed).
#[derive(Error, Debug)]
pub enum TcpipcError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Remote fault: {0}")]
    Remote(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TcpipcError {
    /// Builds a fault the way a service implementation reports failure.
    pub fn remote(message: impl Into<String>) -> Self {
        TcpipcError::Remote(message.into())
    }

    /// Whether the connection this error came from is still usable.
    ///
    /// Faults and conversion failures leave the line protocol aligned;
    /// everything else means the stream is gone or out of step.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TcpipcError::Remote(_) | TcpipcError::Conversion(_))
    }
}

impl From<std::net::AddrParseError> for TcpipcError {
    fn from(err: std::net::AddrParseError) -> Self {
        TcpipcError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TcpipcError>;
