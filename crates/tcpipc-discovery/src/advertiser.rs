use std::net::{Ipv4Addr, UdpSocket};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

use tcpipc_common::transport::map_io_error;
use tcpipc_common::{Result, TcpipcError};
use tracing::{debug, info, warn};

use crate::config::DiscoveryConfig;

/// Announces a service type on a background thread.
///
/// The first announcement goes out immediately, then one per
/// `config.interval` until the advertiser is stopped or dropped.
pub struct ServiceAdvertiser {
    type_id: String,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ServiceAdvertiser {
    pub fn start(type_id: impl Into<String>, config: DiscoveryConfig) -> Result<Self> {
        Self::start_with_callback(type_id, config, |_| {})
    }

    /// Like [`start`](Self::start), calling `on_advertise` with the time of
    /// every announcement just before it is sent.
    pub fn start_with_callback(
        type_id: impl Into<String>,
        config: DiscoveryConfig,
        mut on_advertise: impl FnMut(SystemTime) + Send + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let type_id = type_id.into();
        if type_id.trim().is_empty() {
            return Err(TcpipcError::Configuration(
                "advertised type identifier must not be empty".to_string(),
            ));
        }

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .map_err(|e| map_io_error(e, "binding advertiser socket"))?;
        if config.group.is_multicast() {
            socket
                .set_multicast_ttl_v4(config.ttl)
                .map_err(|e| map_io_error(e, "configuring multicast"))?;
            socket
                .set_multicast_loop_v4(true)
                .map_err(|e| map_io_error(e, "configuring multicast"))?;
        }

        let target = config.target();
        let (stop, stopped) = mpsc::channel::<()>();
        let message = type_id.clone();
        let interval = config.interval;

        let thread = thread::Builder::new()
            .name("tcpipc-advertiser".to_string())
            .spawn(move || loop {
                on_advertise(SystemTime::now());
                if let Err(e) = socket.send_to(message.as_bytes(), target) {
                    warn!("Failed to advertise '{}' to {}: {}", message, target, e);
                }

                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => continue,
                    _ => break,
                }
            })
            .map_err(|e| {
                TcpipcError::Configuration(format!("cannot spawn advertiser thread: {}", e))
            })?;

        info!("Advertising '{}' to {} every {:?}", type_id, target, interval);

        Ok(Self {
            type_id,
            stop: Some(stop),
            thread: Some(thread),
        })
    }

    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
            debug!("Stopped advertising '{}'", self.type_id);
        }
    }
}

impl Drop for ServiceAdvertiser {
    fn drop(&mut self) {
        self.halt();
    }
}
