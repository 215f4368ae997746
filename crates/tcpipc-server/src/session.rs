//! Per-connection request loop.

use std::net::SocketAddr;
use std::sync::{Arc, PoisonError};

use tcpipc_common::contract::{BulkPayload, Reply};
use tcpipc_common::transport::Connection;
use tcpipc_common::{is_bulk_ack, CallRequest, CallResponse, Result, TcpipcError};
use tracing::{debug, info, warn};

use crate::server::ServerContext;

pub(crate) struct Session<S> {
    id: u64,
    peer_addr: SocketAddr,
    connection: Connection,
    context: Arc<ServerContext<S>>,
}

impl<S: Send + 'static> Session<S> {
    pub(crate) fn new(id: u64, connection: Connection, context: Arc<ServerContext<S>>) -> Self {
        Self {
            id,
            peer_addr: connection.peer_addr(),
            connection,
            context,
        }
    }

    /// Serves calls until the peer hangs up, sends an empty line, the
    /// server shuts down, or the stream fails.
    pub(crate) fn run(mut self) {
        info!("Session {} with {} started", self.id, self.peer_addr);

        loop {
            if self.context.is_cancelled() {
                debug!("Session {} stopping: server shutting down", self.id);
                break;
            }

            let line = match self.connection.read_line() {
                Ok(Some(line)) if line.trim().is_empty() => {
                    debug!("Session {} received an empty line", self.id);
                    break;
                }
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(e) => {
                    if !self.context.is_cancelled() {
                        warn!("Session {} with {} failed: {}", self.id, self.peer_addr, e);
                    }
                    break;
                }
            };

            if let Err(e) = self.handle_line(&line) {
                if !self.context.is_cancelled() {
                    warn!("Session {} with {} ended: {}", self.id, self.peer_addr, e);
                }
                break;
            }
        }

        self.connection.shutdown();
    }

    /// Handles one request line. An `Err` means the stream can no longer be
    /// trusted and the session must end; call failures are answered with a
    /// fault instead.
    fn handle_line(&mut self, line: &str) -> Result<()> {
        let request = match self.context.codec.decode_request(line) {
            Ok(Some(request)) => request,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!("Session {} sent an undecodable request: {}", self.id, e);
                return self.send(&CallResponse::fault(e.to_string()));
            }
        };

        let method = request.method_name.clone();
        debug!(
            "Session {} calling '{}' with {} argument(s)",
            self.id,
            method,
            request.arity()
        );

        match self.execute(request) {
            Ok(Reply::Plain(value)) => self.send(&CallResponse::plain(value)),
            Ok(Reply::Bulky(payload)) => self.send_bulk(&method, payload),
            Err(e) => {
                let message = fault_message(e);
                warn!("Call '{}' from {} faulted: {}", method, self.peer_addr, message);
                self.send(&CallResponse::fault(message))
            }
        }
    }

    fn execute(&self, request: CallRequest) -> Result<Reply> {
        let CallRequest {
            method_name,
            arguments,
        } = request;

        if !self.context.table.contains(&method_name) {
            return Err(TcpipcError::Remote(format!(
                "method '{}' is not part of contract '{}'",
                method_name,
                self.context.table.contract_name()
            )));
        }

        let service = Arc::clone(&self.context.service);
        let table = Arc::clone(&self.context.table);
        self.context
            .dispatcher
            .invoke(move || {
                let mut service = service.lock().unwrap_or_else(PoisonError::into_inner);
                table.invoke(&mut service, &method_name, arguments)
            })
            .and_then(|outcome| outcome)
    }

    fn send_bulk(&mut self, method: &str, mut payload: BulkPayload) -> Result<()> {
        let len = payload.len();
        debug!("Session {} sending {} bulk bytes for '{}'", self.id, len, method);
        self.send(&CallResponse::bulky(len))?;

        let ack = self.connection.read_line()?.ok_or_else(|| {
            TcpipcError::Connection("peer closed before acknowledging the bulk payload".to_string())
        })?;
        if !is_bulk_ack(&ack) {
            return Err(TcpipcError::Protocol(format!(
                "expected bulk acknowledgement, got {:?}",
                ack
            )));
        }

        self.connection
            .write_bulk(&mut payload, len, self.context.config.bulk_chunk_size)
    }

    fn send(&mut self, response: &CallResponse) -> Result<()> {
        let line = self.context.codec.encode_response(response)?;
        self.connection.write_line(&line)
    }
}

/// Text sent back to the caller for a failed call.
fn fault_message(err: TcpipcError) -> String {
    match err {
        TcpipcError::Remote(message) => message,
        other => other.to_string(),
    }
}
