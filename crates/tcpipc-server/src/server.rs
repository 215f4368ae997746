use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tcpipc_common::contract::{MethodTable, Serve};
use tcpipc_common::transport::{map_io_error, Connection, JsonCodec, LineCodec};
use tcpipc_common::{Result, TcpipcError};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::session::Session;

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// How long shutdown waits for its wake-up connection to be accepted.
const WAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// Connection lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerEvent {
    ClientConnected(SocketAddr),
    ClientDisconnected(SocketAddr),
}

type EventCallback = dyn Fn(ServerEvent) + Send + Sync;

/// A TCP server hosting one service behind one contract.
///
/// Each accepted connection gets its own session thread, while every
/// method invocation runs on the server's [`Dispatcher`], one at a time.
///
/// # Example
///
/// ```no_run
/// use tcpipc_common::remote_contract;
/// use tcpipc_server::{Server, ServerConfig};
///
/// remote_contract! {
///     #[proxy(CalculatorProxy)]
///     pub trait Calculator {
///         fn add(&mut self, a: i64, b: i64) -> i64;
///     }
/// }
///
/// struct Adder;
///
/// impl Calculator for Adder {
///     fn add(&mut self, a: i64, b: i64) -> tcpipc_common::Result<i64> {
///         Ok(a + b)
///     }
/// }
///
/// let handle = Server::new::<dyn Calculator>(Adder)?
///     .with_config(ServerConfig::new().with_bind_addr("0.0.0.0:9000"))
///     .on_event(|event| println!("{:?}", event))
///     .listen()?;
/// println!("listening on {}", handle.local_addr());
/// handle.shutdown();
/// # Ok::<(), tcpipc_common::TcpipcError>(())
/// ```
pub struct Server<S> {
    service: S,
    table: MethodTable<S>,
    config: ServerConfig,
    dispatcher: Option<Dispatcher>,
    codec: Arc<dyn LineCodec>,
    events: Option<Arc<EventCallback>>,
}

impl<S: Send + 'static> Server<S> {
    /// Hosts `service` behind contract `C`.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the contract's method table is invalid.
    pub fn new<C: Serve<S> + ?Sized>(service: S) -> Result<Self> {
        Ok(Self::with_table(service, C::method_table()?))
    }

    /// Hosts `service` behind a hand-built method table.
    pub fn with_table(service: S, table: MethodTable<S>) -> Self {
        Self {
            service,
            table,
            config: ServerConfig::default(),
            dispatcher: None,
            codec: Arc::new(JsonCodec),
            events: None,
        }
    }

    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs invocations on an existing dispatcher, shared with whoever else
    /// holds it. The server does not shut an injected dispatcher down.
    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn with_codec(mut self, codec: impl LineCodec) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Registers the connection event callback. It runs on the dispatcher
    /// thread, so it never overlaps a method invocation.
    pub fn on_event(mut self, callback: impl Fn(ServerEvent) + Send + Sync + 'static) -> Self {
        self.events = Some(Arc::new(callback));
        self
    }

    /// Binds `bind_addr` and starts accepting connections.
    ///
    /// # Errors
    ///
    /// - `Configuration` if the configuration is invalid
    /// - `Connection` if the address cannot be bound
    pub fn listen(self) -> Result<ServerHandle> {
        self.config.validate()?;
        let listener = TcpListener::bind(&self.config.bind_addr).map_err(|e| {
            TcpipcError::Connection(format!("Failed to bind {}: {}", self.config.bind_addr, e))
        })?;
        self.listen_on(listener)
    }

    /// Starts accepting connections on an already bound listener.
    pub fn listen_on(self, listener: TcpListener) -> Result<ServerHandle> {
        self.config.validate()?;
        listener
            .set_nonblocking(false)
            .map_err(|e| map_io_error(e, "configuring listener"))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| map_io_error(e, "reading listener address"))?;

        let (dispatcher, owns_dispatcher) = match self.dispatcher {
            Some(dispatcher) => (dispatcher, false),
            None => (Dispatcher::named(self.config.dispatcher_name.clone())?, true),
        };

        let registry = Arc::new(Registry::default());
        let context = Arc::new(ServerContext {
            contract: self.table.contract_name().to_string(),
            service: Arc::new(Mutex::new(self.service)),
            table: Arc::new(self.table),
            config: self.config,
            dispatcher: dispatcher.clone(),
            codec: self.codec,
            events: self.events,
            registry: Arc::clone(&registry),
        });

        info!(
            "Serving contract '{}' on {} ({} codec)",
            context.contract,
            local_addr,
            context.codec.name()
        );

        let accept_thread = thread::Builder::new()
            .name(format!("tcpipc-accept-{}", local_addr.port()))
            .spawn(move || accept_loop(listener, context))
            .map_err(|e| {
                TcpipcError::Configuration(format!("cannot spawn accept thread: {}", e))
            })?;

        Ok(ServerHandle {
            local_addr,
            registry,
            dispatcher,
            owns_dispatcher,
            accept_thread: Some(accept_thread),
        })
    }
}

/// State shared by the accept loop and every session of one server.
pub(crate) struct ServerContext<S> {
    pub(crate) contract: String,
    pub(crate) service: Arc<Mutex<S>>,
    pub(crate) table: Arc<MethodTable<S>>,
    pub(crate) config: ServerConfig,
    pub(crate) dispatcher: Dispatcher,
    pub(crate) codec: Arc<dyn LineCodec>,
    events: Option<Arc<EventCallback>>,
    registry: Arc<Registry>,
}

impl<S> ServerContext<S> {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.registry.is_cancelled()
    }

    fn notify(&self, event: ServerEvent) {
        if let Some(callback) = &self.events {
            let callback = Arc::clone(callback);
            if let Err(e) = self.dispatcher.post(move || callback(event)) {
                debug!("Dropped {:?}: {}", event, e);
            }
        }
    }
}

/// Cancellation flag plus the streams of every live session, kept so that
/// shutdown can unblock sessions waiting on a read.
#[derive(Default)]
struct Registry {
    cancelled: AtomicBool,
    next_id: AtomicU64,
    clients: Mutex<HashMap<u64, (SocketAddr, TcpStream)>>,
}

impl Registry {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn register(&self, addr: SocketAddr, stream: TcpStream) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.lock().insert(id, (addr, stream));
        id
    }

    fn unregister(&self, id: u64) {
        self.lock().remove(&id);
    }

    fn addresses(&self) -> Vec<SocketAddr> {
        let mut addrs: Vec<SocketAddr> = self.lock().values().map(|(addr, _)| *addr).collect();
        addrs.sort();
        addrs
    }

    fn close_all(&self) {
        for (addr, stream) in self.lock().values() {
            debug!("Closing session with {}", addr);
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, (SocketAddr, TcpStream)>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn accept_loop<S: Send + 'static>(
    listener: TcpListener,
    context: Arc<ServerContext<S>>,
) -> Vec<JoinHandle<()>> {
    let mut sessions: Vec<JoinHandle<()>> = Vec::new();

    loop {
        let accepted = listener.accept();
        // shutdown wakes the blocking accept with a connection of its own
        if context.is_cancelled() {
            break;
        }
        match accepted {
            Ok((stream, addr)) => match spawn_session(&context, stream, addr) {
                Ok(session) => sessions.push(session),
                Err(e) => warn!("Could not start session with {}: {}", addr, e),
            },
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                thread::sleep(ACCEPT_ERROR_BACKOFF);
            }
        }
        sessions.retain(|session| !session.is_finished());
    }

    info!("Stopped accepting connections for '{}'", context.contract);
    sessions
}

fn spawn_session<S: Send + 'static>(
    context: &Arc<ServerContext<S>>,
    stream: TcpStream,
    addr: SocketAddr,
) -> Result<JoinHandle<()>> {
    let connection = Connection::from_stream(stream)?.with_max_line_len(context.config.max_line_len);
    let id = context.registry.register(addr, connection.shutdown_handle()?);

    info!("Client {} connected (session {})", addr, id);
    context.notify(ServerEvent::ClientConnected(addr));

    let session_context = Arc::clone(context);
    let spawned = thread::Builder::new()
        .name(format!("tcpipc-session-{}", id))
        .spawn(move || {
            Session::new(id, connection, Arc::clone(&session_context)).run();
            session_context.registry.unregister(id);
            info!("Client {} disconnected (session {})", addr, id);
            session_context.notify(ServerEvent::ClientDisconnected(addr));
        });

    spawned.map_err(|e| {
        context.registry.unregister(id);
        context.notify(ServerEvent::ClientDisconnected(addr));
        TcpipcError::Connection(format!("cannot spawn session thread: {}", e))
    })
}

/// Running server. Dropping it shuts the server down.
pub struct ServerHandle {
    local_addr: SocketAddr,
    registry: Arc<Registry>,
    dispatcher: Dispatcher,
    owns_dispatcher: bool,
    accept_thread: Option<JoinHandle<Vec<JoinHandle<()>>>>,
}

impl ServerHandle {
    /// Address the server is listening on, with the real port when an
    /// ephemeral one was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Peers with a live session, in address order.
    pub fn connected_clients(&self) -> Vec<SocketAddr> {
        self.registry.addresses()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn is_running(&self) -> bool {
        !self.registry.is_cancelled()
    }

    /// Stops accepting, ends every session and waits for them to finish.
    ///
    /// An invocation already running on the dispatcher completes first; a
    /// method that never returns keeps its session, and this call, waiting.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(accept_thread) = self.accept_thread.take() else {
            return;
        };

        info!("Shutting down server on {}", self.local_addr);
        self.registry.cancelled.store(true, Ordering::SeqCst);
        wake_accept_loop(self.local_addr);

        let sessions = match accept_thread.join() {
            Ok(sessions) => sessions,
            Err(_) => {
                error!("Accept loop on {} panicked", self.local_addr);
                Vec::new()
            }
        };

        self.registry.close_all();
        for session in sessions {
            if session.join().is_err() {
                error!("A session thread on {} panicked", self.local_addr);
            }
        }

        if self.owns_dispatcher {
            self.dispatcher.shutdown();
        }
        info!("Server on {} stopped", self.local_addr);
    }
}

/// Unblocks the accept loop by connecting to it. A listener bound to the
/// unspecified address is reached through loopback.
fn wake_accept_loop(local_addr: SocketAddr) {
    let mut target = local_addr;
    if target.ip().is_unspecified() {
        target.set_ip(match target.ip() {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
        });
    }
    if let Err(e) = TcpStream::connect_timeout(&target, WAKE_TIMEOUT) {
        warn!("Could not wake accept loop on {}: {}", target, e);
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("local_addr", &self.local_addr)
            .field("running", &self.is_running())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
