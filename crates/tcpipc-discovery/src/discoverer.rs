use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tcpipc_common::transport::map_io_error;
use tcpipc_common::{Result, TcpipcError};
use tracing::{debug, info, trace, warn};

use crate::config::DiscoveryConfig;
use crate::matches_type_id;

/// Longest announcement accepted; longer datagrams are truncated.
const MAX_ANNOUNCEMENT_LEN: usize = 1024;

/// Listens for announcements of one service type on a background thread.
pub struct ServiceDiscoverer {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

/// Binds the discovery port so that other listeners on this host can bind
/// it too.
fn bind_shared(port: u16) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)).into())?;
    Ok(socket.into())
}

impl ServiceDiscoverer {
    /// Binds the discovery port and starts listening. `on_found` is called
    /// on the listener thread with the sender address of every matching
    /// announcement, so it fires repeatedly while a service keeps
    /// advertising.
    ///
    /// # Errors
    ///
    /// Fails if the port cannot be bound or the group cannot be joined.
    pub fn start(
        type_id: impl Into<String>,
        config: DiscoveryConfig,
        mut on_found: impl FnMut(IpAddr) + Send + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let type_id = type_id.into();

        let socket = bind_shared(config.port).map_err(|e| {
            TcpipcError::Connection(format!(
                "Failed to bind discovery port {}: {}",
                config.port, e
            ))
        })?;
        if config.group.is_multicast() {
            socket
                .join_multicast_v4(&config.group, &Ipv4Addr::UNSPECIFIED)
                .map_err(|e| map_io_error(e, "joining multicast group"))?;
        }
        socket
            .set_read_timeout(Some(config.poll_interval))
            .map_err(|e| map_io_error(e, "configuring discovery socket"))?;

        info!(
            "Looking for '{}' on {}:{}",
            type_id, config.group, config.port
        );

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name("tcpipc-discoverer".to_string())
            .spawn(move || {
                let mut buf = [0u8; MAX_ANNOUNCEMENT_LEN];
                while !stop_flag.load(Ordering::SeqCst) {
                    let (len, sender) = match socket.recv_from(&mut buf) {
                        Ok(received) => received,
                        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => continue,
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => {
                            warn!("Discovery listener failed: {}", e);
                            break;
                        }
                    };

                    let announced = String::from_utf8_lossy(&buf[..len]);
                    if matches_type_id(&announced, &type_id) {
                        debug!("Found '{}' at {}", type_id, sender.ip());
                        on_found(sender.ip());
                    } else {
                        trace!("Ignoring announcement '{}' from {}", announced, sender);
                    }
                }
            })
            .map_err(|e| {
                TcpipcError::Configuration(format!("cannot spawn discoverer thread: {}", e))
            })?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// Listens until the first matching announcement or until `timeout`
    /// passes, whichever comes first.
    pub fn wait_for(
        type_id: impl Into<String>,
        config: DiscoveryConfig,
        timeout: Duration,
    ) -> Result<Option<IpAddr>> {
        let (found, first) = mpsc::channel();
        let discoverer = Self::start(type_id, config, move |addr| {
            let _ = found.send(addr);
        })?;
        let addr = first.recv_timeout(timeout).ok();
        discoverer.stop();
        Ok(addr)
    }

    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ServiceDiscoverer {
    fn drop(&mut self) {
        self.halt();
    }
}
