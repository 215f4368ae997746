use std::fmt;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tcpipc_common::contract::{BulkPayload, Dispatch, ProxyFactory, Reply};
use tcpipc_common::transport::{Connection, JsonCodec, LineCodec};
use tcpipc_common::{Argument, CallRequest, CallResponse, Result, TcpipcError, READY_FOR_BULK};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;

type ProgressCallback = Box<dyn FnMut(f64) + Send>;

/// tcpipc client for making remote calls over one TCP connection
///
/// Cloning is cheap and every clone shares the same connection. Calls made
/// from several threads are serialized, since the protocol allows only one
/// outstanding call per connection.
///
/// # Example
///
/// ```no_run
/// use tcpipc_client::Client;
/// use tcpipc_common::remote_contract;
///
/// remote_contract! {
///     #[proxy(CalculatorProxy)]
///     pub trait Calculator {
///         fn add(&mut self, a: i64, b: i64) -> i64;
///     }
/// }
///
/// let client = Client::connect("127.0.0.1:9000")?;
/// let mut calculator = client.proxy::<dyn Calculator>();
/// assert_eq!(calculator.add(2, 3)?, 5);
/// # Ok::<(), tcpipc_common::TcpipcError>(())
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    peer_addr: SocketAddr,
    connection: Mutex<Connection>,
    /// Clone of the socket used to interrupt a call blocked in a read.
    shutdown_handle: TcpStream,
    closed: AtomicBool,
    codec: Box<dyn LineCodec>,
    config: ClientConfig,
    progress: Mutex<Option<ProgressCallback>>,
}

impl Client {
    /// Connects with the default configuration and the JSON codec.
    pub fn connect(addr: impl ToSocketAddrs + fmt::Debug) -> Result<Self> {
        Self::connect_with(addr, ClientConfig::default())
    }

    pub fn connect_with(addr: impl ToSocketAddrs + fmt::Debug, config: ClientConfig) -> Result<Self> {
        Self::connect_with_codec(addr, config, JsonCodec)
    }

    /// Connects using a custom codec. The server must speak the same one.
    pub fn connect_with_codec(
        addr: impl ToSocketAddrs + fmt::Debug,
        config: ClientConfig,
        codec: impl LineCodec,
    ) -> Result<Self> {
        config.validate()?;
        let connection = Connection::connect(addr, config.connect_timeout)?
            .with_max_line_len(config.max_line_len);
        let peer_addr = connection.peer_addr();
        let shutdown_handle = connection.shutdown_handle()?;

        info!("Connected to {} ({} codec)", peer_addr, codec.name());

        Ok(Self {
            inner: Arc::new(ClientInner {
                peer_addr,
                connection: Mutex::new(connection),
                shutdown_handle,
                closed: AtomicBool::new(false),
                codec: Box::new(codec),
                config,
                progress: Mutex::new(None),
            }),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.inner.peer_addr
    }

    /// Creates a proxy for contract `C` that forwards through this client.
    pub fn proxy<C>(&self) -> C::Proxy
    where
        C: ProxyFactory<Client> + ?Sized,
    {
        C::create_proxy(self.clone())
    }

    /// Registers the callback that receives bulk transfer progress.
    ///
    /// It is called on the calling thread while a bulk result is being
    /// received: once with `0.0` after the acknowledgement, then after every
    /// chunk with the percentage received so far, ending at `100.0`. The
    /// callback must not make calls through this client.
    pub fn on_bulk_progress(&self, callback: impl FnMut(f64) + Send + 'static) {
        *self.inner.progress.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Box::new(callback));
    }

    /// Sends one call and waits for its reply.
    ///
    /// # Errors
    ///
    /// - `Remote` when the service reports a fault
    /// - `Protocol` when the server sends something malformed
    /// - `Connection` on I/O failure or when the client is closed
    ///
    /// `Protocol` and `Connection` errors close the client.
    pub fn call(&self, method: &str, arguments: Vec<Argument>) -> Result<Reply> {
        self.ensure_open()?;
        let line = self
            .inner
            .codec
            .encode_request(&CallRequest::new(method, arguments))?;

        let mut connection = self
            .inner
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.ensure_open()?;

        debug!("Calling '{}' on {}", method, self.inner.peer_addr);
        match self.exchange(&mut connection, method, &line) {
            Ok(reply) => Ok(reply),
            Err(_) if self.is_closed() => Err(TcpipcError::Connection(format!(
                "client closed during call '{}'",
                method
            ))),
            Err(e) => {
                if !e.is_recoverable() {
                    warn!("Call '{}' failed, closing connection: {}", method, e);
                    self.close();
                }
                Err(e)
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Closes the connection. A call blocked on another thread fails with a
    /// `Connection` error, and so does every later call.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::SeqCst) {
            debug!("Closing connection to {}", self.inner.peer_addr);
            let _ = self.inner.shutdown_handle.shutdown(Shutdown::Both);
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(TcpipcError::Connection("client is closed".to_string()))
        } else {
            Ok(())
        }
    }

    fn exchange(&self, connection: &mut Connection, method: &str, line: &str) -> Result<Reply> {
        connection.write_line(line)?;

        let line = connection.read_line()?.ok_or_else(|| {
            TcpipcError::Connection(format!("server closed the connection during call '{}'", method))
        })?;
        let response = self
            .inner
            .codec
            .decode_response(&line)?
            .ok_or_else(|| TcpipcError::Protocol("empty response line".to_string()))?;

        match response {
            CallResponse::Fault { message } => Err(TcpipcError::Remote(message)),
            CallResponse::Plain { value } => Ok(Reply::Plain(value)),
            CallResponse::Bulky { byte_length } => {
                debug!("'{}' returned {} bulk bytes", method, byte_length);
                self.receive_bulk(connection, byte_length)
            }
        }
    }

    fn receive_bulk(&self, connection: &mut Connection, len: u64) -> Result<Reply> {
        connection.write_line(READY_FOR_BULK)?;

        let mut progress = self
            .inner
            .progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut emit = |percent: f64| {
            if let Some(callback) = progress.as_mut() {
                callback(percent);
            }
        };

        emit(0.0);
        let data = connection.read_bulk(len, self.inner.config.bulk_chunk_size, |received| {
            emit(received as f64 / len as f64 * 100.0)
        })?;
        if len == 0 {
            emit(100.0);
        }

        Ok(Reply::Bulky(BulkPayload::from_bytes(data)))
    }
}

impl Dispatch for Client {
    fn dispatch(&self, method: &str, arguments: Vec<Argument>) -> Result<Reply> {
        self.call(method, arguments)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("peer_addr", &self.inner.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        let _ = self.shutdown_handle.shutdown(Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    /// Accepts one connection and hands it to `script`.
    fn fake_server<F>(script: F) -> (SocketAddr, thread::JoinHandle<()>)
    where
        F: FnOnce(BufReader<TcpStream>, TcpStream) + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let writer = stream.try_clone().unwrap();
            script(BufReader::new(stream), writer);
        });
        (addr, handle)
    }

    fn read_line(reader: &mut BufReader<TcpStream>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        line.trim_end().to_string()
    }

    #[test]
    fn test_plain_call() {
        let (addr, server) = fake_server(|mut reader, mut writer| {
            let request = read_line(&mut reader);
            assert_eq!(request, r#"{"MethodName":"Add","Arguments":[2,3]}"#);
            writer
                .write_all(b"{\"CaughtException\":false,\"IsBulky\":false,\"ReturnValue\":5}\n")
                .unwrap();
        });

        let client = Client::connect(addr).unwrap();
        let reply = client.call("Add", vec![json!(2), json!(3)]).unwrap();
        assert_eq!(reply.into_return::<i64>().unwrap(), 5);
        server.join().unwrap();
    }

    #[test]
    fn test_fault_is_remote_error_and_keeps_connection() {
        let (addr, server) = fake_server(|mut reader, mut writer| {
            read_line(&mut reader);
            writer
                .write_all(b"{\"CaughtException\":true,\"IsBulky\":false,\"ReturnValue\":\"boom\"}\n")
                .unwrap();
            read_line(&mut reader);
            writer.write_all(b"{\"ReturnValue\":\"ok\"}\n").unwrap();
        });

        let client = Client::connect(addr).unwrap();
        let err = client.call("Explode", vec![]).unwrap_err();
        assert!(matches!(err, TcpipcError::Remote(ref m) if m == "boom"));
        assert!(!client.is_closed());

        let reply = client.call("Ping", vec![]).unwrap();
        assert_eq!(reply.into_return::<String>().unwrap(), "ok");
        server.join().unwrap();
    }

    #[test]
    fn test_bulk_call_reports_progress() {
        let (addr, server) = fake_server(|mut reader, mut writer| {
            read_line(&mut reader);
            writer
                .write_all(b"{\"CaughtException\":false,\"IsBulky\":true,\"ReturnValue\":10}\n")
                .unwrap();
            assert_eq!(read_line(&mut reader), READY_FOR_BULK);
            writer.write_all(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]).unwrap();
        });

        let config = ClientConfig::default().with_bulk_chunk_size(4);
        let client = Client::connect_with(addr, config).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        client.on_bulk_progress(move |p| sink.lock().unwrap().push(p));

        let reply = client.call("GetData", vec![]).unwrap();
        let payload: BulkPayload = reply.into_return().unwrap();
        assert_eq!(payload.into_bytes().unwrap(), (1..=10).collect::<Vec<u8>>());

        let seen = seen.lock().unwrap();
        assert_eq!(seen.first(), Some(&0.0));
        assert_eq!(seen.last(), Some(&100.0));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        server.join().unwrap();
    }

    #[test]
    fn test_empty_bulk_still_ends_at_hundred() {
        let (addr, server) = fake_server(|mut reader, mut writer| {
            read_line(&mut reader);
            writer
                .write_all(b"{\"CaughtException\":false,\"IsBulky\":true,\"ReturnValue\":0}\n")
                .unwrap();
            read_line(&mut reader);
        });

        let client = Client::connect(addr).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        client.on_bulk_progress(move |p| sink.lock().unwrap().push(p));

        let payload: BulkPayload = client.call("Nothing", vec![]).unwrap().into_return().unwrap();
        assert!(payload.is_empty());
        assert_eq!(*seen.lock().unwrap(), vec![0.0, 100.0]);
        server.join().unwrap();
    }

    #[test]
    fn test_server_hangup_is_connection_error() {
        let (addr, server) = fake_server(|mut reader, _writer| {
            read_line(&mut reader);
        });

        let client = Client::connect(addr).unwrap();
        let err = client.call("Add", vec![]).unwrap_err();
        assert!(matches!(err, TcpipcError::Connection(_)), "got {:?}", err);
        assert!(client.is_closed());

        let err = client.call("Add", vec![]).unwrap_err();
        assert!(matches!(err, TcpipcError::Connection(_)));
        server.join().unwrap();
    }

    #[test]
    fn test_malformed_response_is_protocol_error() {
        let (addr, server) = fake_server(|mut reader, mut writer| {
            read_line(&mut reader);
            writer.write_all(b"not json\n").unwrap();
        });

        let client = Client::connect(addr).unwrap();
        let err = client.call("Add", vec![]).unwrap_err();
        assert!(matches!(err, TcpipcError::Protocol(_)), "got {:?}", err);
        server.join().unwrap();
    }

    #[test]
    fn test_close_unblocks_pending_call() {
        let (addr, server) = fake_server(|mut reader, _writer| {
            read_line(&mut reader);
            // never answer; wait for the client to go away
            let mut rest = String::new();
            let _ = reader.read_line(&mut rest);
        });

        let client = Client::connect(addr).unwrap();
        let closer = client.clone();
        let caller = thread::spawn(move || client.call("Hang", vec![]));

        thread::sleep(Duration::from_millis(100));
        closer.close();

        let err = caller.join().unwrap().unwrap_err();
        assert!(matches!(err, TcpipcError::Connection(_)), "got {:?}", err);
        server.join().unwrap();
    }

    #[test]
    fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = Client::connect(addr).unwrap_err();
        assert!(matches!(err, TcpipcError::Connection(_)), "got {:?}", err);
    }
}
