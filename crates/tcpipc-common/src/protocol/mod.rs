pub mod error;
pub mod requests;
pub mod responses;

#[cfg(test)]
mod tests;

pub use error::{Result, TcpipcError};
pub use requests::{Argument, CallRequest, MethodName};
pub use responses::CallResponse;

/// Line the client sends to confirm it is ready to receive bulk bytes.
///
/// The server compares it case-insensitively.
pub const READY_FOR_BULK: &str = "READY_FOR_BULK";

/// Chunk size used on both sides when moving bulk payload bytes (4 MiB).
pub const BULK_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Longest control line either side accepts (16 MiB).
pub const MAX_LINE_LEN: usize = 16 * 1024 * 1024;

/// Whether `line` is exactly the bulk acknowledgement token, ignoring case.
pub fn is_bulk_ack(line: &str) -> bool {
    line.eq_ignore_ascii_case(READY_FOR_BULK)
}
