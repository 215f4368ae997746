use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, trace};

use crate::protocol::error::{Result, TcpipcError};
use crate::protocol::MAX_LINE_LEN;

/// Default timeout for establishing a connection (5 seconds)
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Preallocation cap for incoming bulk payloads; larger payloads grow as
/// bytes arrive instead of trusting the declared length up front.
const MAX_BULK_PREALLOC: usize = 64 * 1024 * 1024;

/// One TCP stream carrying two sub-channels.
///
/// - a **line channel**: UTF-8 control messages, one per line, `\n` terminated
/// - a **raw channel**: unframed bulk payload bytes, only ever read or
///   written right after a bulk acknowledgement
///
/// Both share the same buffered reader, so bytes that arrive together with
/// a control line are never lost when switching to raw reads.
///
/// # Wire Protocol
///
/// ```text
/// client: {"MethodName":"GetData","Arguments":[]}\n
/// server: {"CaughtException":false,"IsBulky":true,"ReturnValue":1048576}\n
/// client: READY_FOR_BULK\n
/// server: <1048576 raw bytes>
/// ```
pub struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    peer_addr: SocketAddr,
    max_line_len: usize,
}

impl Connection {
    /// Connects to a remote endpoint.
    ///
    /// The address may resolve to several socket addresses; each is tried in
    /// turn until one accepts the connection.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the address cannot be resolved or no resolved
    /// address accepts the connection within `timeout`.
    pub fn connect(addr: impl ToSocketAddrs + std::fmt::Debug, timeout: Duration) -> Result<Self> {
        let socket_addrs = addr
            .to_socket_addrs()
            .map_err(|e| TcpipcError::Connection(format!("Invalid address {:?}: {}", addr, e)))?;

        let mut last_err = None;
        for socket_addr in socket_addrs {
            match TcpStream::connect_timeout(&socket_addr, timeout) {
                Ok(stream) => {
                    debug!("Connected to {}", socket_addr);
                    return Self::from_stream(stream);
                }
                Err(e) => {
                    debug!("Connection attempt to {} failed: {}", socket_addr, e);
                    last_err = Some(e);
                }
            }
        }

        Err(TcpipcError::Connection(format!(
            "Failed to connect to {:?}: {}",
            addr,
            last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "address resolved to nothing".to_string())
        )))
    }

    /// Wraps an already established stream (e.g. one returned by `accept`).
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map_err(|e| map_io_error(e, "reading peer address"))?;
        stream
            .set_nonblocking(false)
            .map_err(|e| map_io_error(e, "configuring stream"))?;
        // control lines must leave immediately, not wait for Nagle
        stream
            .set_nodelay(true)
            .map_err(|e| map_io_error(e, "configuring stream"))?;

        let writer = stream
            .try_clone()
            .map_err(|e| map_io_error(e, "cloning stream"))?;

        Ok(Self {
            reader: BufReader::new(stream),
            writer,
            peer_addr,
            max_line_len: MAX_LINE_LEN,
        })
    }

    pub fn with_max_line_len(mut self, max_line_len: usize) -> Self {
        self.max_line_len = max_line_len;
        self
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Returns an independent handle to the socket that can shut it down
    /// from another thread, unblocking any pending read.
    pub fn shutdown_handle(&self) -> Result<TcpStream> {
        self.writer
            .try_clone()
            .map_err(|e| map_io_error(e, "cloning stream"))
    }

    /// Writes one control line and flushes it.
    ///
    /// # Errors
    ///
    /// Returns `Protocol` if `line` contains a newline, `Connection` if the
    /// write fails.
    pub fn write_line(&mut self, line: &str) -> Result<()> {
        if line.contains('\n') {
            return Err(TcpipcError::Protocol(
                "control lines must not contain newlines".to_string(),
            ));
        }

        let mut framed = Vec::with_capacity(line.len() + 1);
        framed.extend_from_slice(line.as_bytes());
        framed.push(b'\n');

        self.writer
            .write_all(&framed)
            .map_err(|e| map_io_error(e, "writing line"))?;
        self.writer
            .flush()
            .map_err(|e| map_io_error(e, "flushing stream"))?;

        Ok(())
    }

    /// Reads one control line, without its terminator.
    ///
    /// Returns `Ok(None)` on a clean end of stream. A final line without a
    /// terminator is still returned.
    ///
    /// # Errors
    ///
    /// Returns `Protocol` if the line is longer than the configured maximum
    /// or not valid UTF-8, `Connection` if reading fails.
    pub fn read_line(&mut self) -> Result<Option<String>> {
        let mut buf = Vec::new();
        let limit = self.max_line_len as u64 + 1;
        let read = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut buf)
            .map_err(|e| map_io_error(e, "reading line"))?;

        if read == 0 {
            return Ok(None);
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        } else if buf.len() > self.max_line_len {
            return Err(TcpipcError::Protocol(format!(
                "Line too large: more than {} bytes",
                self.max_line_len
            )));
        }

        String::from_utf8(buf)
            .map(Some)
            .map_err(|_| TcpipcError::Protocol("control line is not valid UTF-8".to_string()))
    }

    /// Copies exactly `len` bytes from `source` to the raw channel.
    ///
    /// # Errors
    ///
    /// Returns `Protocol` if `source` runs dry before `len` bytes, which
    /// would leave the peer waiting for bytes that never come.
    pub fn write_bulk(&mut self, source: &mut dyn Read, len: u64, chunk_size: usize) -> Result<()> {
        trace!("Writing {} bulk bytes to {}", len, self.peer_addr);
        let buf_len = usize::try_from(len).unwrap_or(usize::MAX).min(chunk_size).max(1);
        let mut buf = vec![0u8; buf_len];
        let mut remaining = len;

        while remaining > 0 {
            let want = remaining.min(buf.len() as u64) as usize;
            let n = match source.read(&mut buf[..want]) {
                Ok(0) => {
                    return Err(TcpipcError::Protocol(format!(
                        "bulk source ended after {} of {} bytes",
                        len - remaining,
                        len
                    )))
                }
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(TcpipcError::Io(e)),
            };
            self.writer
                .write_all(&buf[..n])
                .map_err(|e| map_io_error(e, "writing bulk payload"))?;
            remaining -= n as u64;
        }

        self.writer
            .flush()
            .map_err(|e| map_io_error(e, "flushing stream"))?;
        Ok(())
    }

    /// Reads exactly `len` bytes from the raw channel.
    ///
    /// `on_chunk` is called after every chunk with the total number of bytes
    /// received so far.
    pub fn read_bulk(
        &mut self,
        len: u64,
        chunk_size: usize,
        mut on_chunk: impl FnMut(u64),
    ) -> Result<Vec<u8>> {
        let expected = usize::try_from(len).map_err(|_| {
            TcpipcError::Protocol(format!("bulk payload of {} bytes does not fit in memory", len))
        })?;

        let mut data = Vec::with_capacity(expected.min(MAX_BULK_PREALLOC));
        let mut buf = vec![0u8; expected.min(chunk_size).max(1)];

        while data.len() < expected {
            let want = (expected - data.len()).min(buf.len());
            let n = match self.reader.read(&mut buf[..want]) {
                Ok(0) => {
                    return Err(TcpipcError::Connection(format!(
                        "connection closed after {} of {} bulk bytes",
                        data.len(),
                        expected
                    )))
                }
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(map_io_error(e, "reading bulk payload")),
            };
            data.extend_from_slice(&buf[..n]);
            on_chunk(data.len() as u64);
        }

        trace!("Read {} bulk bytes from {}", expected, self.peer_addr);
        Ok(data)
    }

    /// Shuts down both directions of the stream. Errors are ignored; the
    /// socket may already be gone.
    pub fn shutdown(&self) {
        let _ = self.writer.shutdown(Shutdown::Both);
    }
}

/// Map IO errors to appropriate TcpipcError variants
///
/// - Timeouts and lost peers -> `Connection`
/// - Other IO errors -> `Io`
pub fn map_io_error(err: std::io::Error, context: &str) -> TcpipcError {
    match err.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            TcpipcError::Connection(format!("{}: timed out", context))
        }
        ErrorKind::ConnectionReset
        | ErrorKind::ConnectionAborted
        | ErrorKind::NotConnected
        | ErrorKind::BrokenPipe
        | ErrorKind::UnexpectedEof => {
            TcpipcError::Connection(format!("{}: Connection lost ({})", context, err))
        }
        _ => TcpipcError::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    /// Connected client/server pair over loopback.
    fn pair() -> (Connection, Connection) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = thread::spawn(move || listener.accept().unwrap().0);
        let client = Connection::connect(addr, DEFAULT_CONNECT_TIMEOUT).unwrap();
        let server = Connection::from_stream(accept.join().unwrap()).unwrap();
        (client, server)
    }

    #[test]
    fn test_lines_round_trip() {
        let (mut client, mut server) = pair();
        client.write_line("first").unwrap();
        client.write_line("second").unwrap();

        assert_eq!(server.read_line().unwrap().as_deref(), Some("first"));
        assert_eq!(server.read_line().unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn test_crlf_is_stripped() {
        let (client, mut server) = pair();
        let mut raw = client.shutdown_handle().unwrap();
        raw.write_all(b"hello\r\n").unwrap();
        assert_eq!(server.read_line().unwrap().as_deref(), Some("hello"));
    }

    #[test]
    fn test_embedded_newline_rejected() {
        let (mut client, _server) = pair();
        let err = client.write_line("a\nb").unwrap_err();
        assert!(matches!(err, TcpipcError::Protocol(_)));
    }

    #[test]
    fn test_eof_reads_none() {
        let (client, mut server) = pair();
        client.shutdown();
        drop(client);
        assert_eq!(server.read_line().unwrap(), None);
    }

    #[test]
    fn test_line_limit_enforced() {
        let (mut client, server) = pair();
        let mut server = server.with_max_line_len(8);
        client.write_line("0123456789abcdef").unwrap();
        let err = server.read_line().unwrap_err();
        assert!(matches!(err, TcpipcError::Protocol(_)));
    }

    #[test]
    fn test_bulk_follows_line_without_loss() {
        let (mut client, mut server) = pair();
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

        let writer = thread::spawn(move || {
            server.write_line("header").unwrap();
            server
                .write_bulk(&mut payload.as_slice(), payload.len() as u64, 1024)
                .unwrap();
            server.write_line("trailer").unwrap();
            payload
        });

        assert_eq!(client.read_line().unwrap().as_deref(), Some("header"));
        let mut seen = Vec::new();
        let received = client.read_bulk(10_000, 1024, |n| seen.push(n)).unwrap();
        assert_eq!(client.read_line().unwrap().as_deref(), Some("trailer"));

        let payload = writer.join().unwrap();
        assert_eq!(received, payload);
        assert_eq!(seen.last().copied(), Some(10_000));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_short_bulk_source_is_protocol_error() {
        let (_client, mut server) = pair();
        let err = server.write_bulk(&mut &b"abc"[..], 10, 4).unwrap_err();
        assert!(matches!(err, TcpipcError::Protocol(_)));
    }

    #[test]
    fn test_bulk_read_detects_early_close() {
        let (mut client, mut server) = pair();
        server.write_bulk(&mut &b"abc"[..], 3, 4).unwrap();
        server.shutdown();
        drop(server);

        let err = client.read_bulk(10, 4, |_| {}).unwrap_err();
        assert!(matches!(err, TcpipcError::Connection(_)));
    }

    #[test]
    fn test_connect_to_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = Connection::connect(addr, Duration::from_millis(500));
        assert!(matches!(result, Err(TcpipcError::Connection(_))));
    }

    #[test]
    fn test_map_io_error_kinds() {
        let err = map_io_error(std::io::Error::from(ErrorKind::ConnectionReset), "reading");
        assert!(matches!(err, TcpipcError::Connection(_)));

        let err = map_io_error(std::io::Error::from(ErrorKind::PermissionDenied), "reading");
        assert!(matches!(err, TcpipcError::Io(_)));
    }
}
