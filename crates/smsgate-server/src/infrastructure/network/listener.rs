//! Thread-per-connection TCP listener for the session protocol.
//!
//! The accept loop runs on its own named thread with a non-blocking socket
//! and polls the shared `running` flag between accepts.  Every accepted
//! connection gets a dedicated thread, so a `send_message` that blocks on the
//! modem lock only blocks its own caller.
//!
//! Connection sockets use a short read timeout.  On each timeout the thread
//! re-checks `running`; after [`RpcListener::shutdown`] idle connections
//! wind down within one poll interval.
//!
//! The registry maps service names to `Weak` references.  The host owns the
//! service; a connection upgrades the reference only for the duration of one
//! call, and a call arriving after `unpublish` is answered with
//! `service_unavailable`.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use smsgate_core::protocol::MAX_FRAME_LEN;
use smsgate_core::{
    decode_frame, encode_frame, CallerIdentity, ClientRequest, ConnectionEndpoint,
    ProtocolError, RemoteErrorKind, SendRequest, ServerReply,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::send_service::{RemoteSendService, ServiceError};
use crate::infrastructure::auth::ConnectionAuthorizer;

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const READ_POLL: Duration = Duration::from_millis(250);

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Where the listener binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    pub bind_address: String,
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 2000,
        }
    }
}

type Registry = Arc<RwLock<HashMap<String, Weak<RemoteSendService>>>>;

/// A bound listener publishing send services by name.
pub struct RpcListener {
    local_addr: SocketAddr,
    registry: Registry,
    running: Arc<AtomicBool>,
    accept_thread: Option<JoinHandle<()>>,
}

impl RpcListener {
    /// Binds the socket and starts accepting connections.
    ///
    /// With a `gate`, every connection is checked at accept time and again
    /// when the caller's `hello` arrives.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::BindFailed`] if the address cannot be bound,
    /// or [`NetworkError::Io`] if the socket cannot be configured.
    pub fn bind(
        config: &ListenerConfig,
        gate: Option<Arc<dyn ConnectionAuthorizer>>,
    ) -> Result<Self, NetworkError> {
        let addr = format!("{}:{}", config.bind_address, config.port);
        let listener = TcpListener::bind((config.bind_address.as_str(), config.port))
            .map_err(|source| NetworkError::BindFailed {
                addr: addr.clone(),
                source,
            })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        let registry: Registry = Arc::new(RwLock::new(HashMap::new()));
        let running = Arc::new(AtomicBool::new(true));

        let accept_thread = {
            let registry = Arc::clone(&registry);
            let running = Arc::clone(&running);
            std::thread::Builder::new()
                .name("smsgate-accept".to_string())
                .spawn(move || accept_loop(listener, registry, gate, running))?
        };

        info!("listening on {local_addr}");
        Ok(Self {
            local_addr,
            registry,
            running,
            accept_thread: Some(accept_thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Makes `service` reachable under `name`, replacing any previous entry.
    pub fn publish(&self, name: &str, service: &Arc<RemoteSendService>) {
        self.registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::downgrade(service));
        info!(service = name, "service published");
    }

    /// Removes the entry for `name`.  Returns `false` if nothing was published.
    pub fn unpublish(&self, name: &str) -> bool {
        let removed = self
            .registry
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name)
            .is_some();
        if removed {
            info!(service = name, "service unpublished");
        }
        removed
    }

    pub fn is_published(&self, name: &str) -> bool {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Stops accepting and releases the port.  Idempotent.
    ///
    /// Open connections close at their next read timeout.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.accept_thread.take() {
            if handle.join().is_err() {
                error!("accept thread panicked");
            }
            info!("listener on {} closed", self.local_addr);
        }
    }
}

impl Drop for RpcListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn accept_loop(
    listener: TcpListener,
    registry: Registry,
    gate: Option<Arc<dyn ConnectionAuthorizer>>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let session = Session {
                    registry: Arc::clone(&registry),
                    gate: gate.clone(),
                    running: Arc::clone(&running),
                };
                let spawned = std::thread::Builder::new()
                    .name(format!("smsgate-conn-{peer}"))
                    .spawn(move || session.run(stream, peer));
                if let Err(e) = spawned {
                    error!("failed to spawn connection thread for {peer}: {e}");
                }
            }
            Err(e) if is_timeout_error(&e) => std::thread::sleep(ACCEPT_POLL),
            Err(e) => {
                error!("accept error: {e}");
                std::thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

/// State shared by one connection thread.
struct Session {
    registry: Registry,
    gate: Option<Arc<dyn ConnectionAuthorizer>>,
    running: Arc<AtomicBool>,
}

/// Reads newline-terminated frames across read timeouts.
struct FrameReader {
    reader: BufReader<TcpStream>,
    pending: Vec<u8>,
}

impl FrameReader {
    /// Returns the next frame, or `None` on EOF or listener shutdown.
    fn next_frame(&mut self, running: &AtomicBool) -> Result<Option<String>, NetworkError> {
        loop {
            if !running.load(Ordering::Relaxed) {
                return Ok(None);
            }
            let budget = (MAX_FRAME_LEN + 1).saturating_sub(self.pending.len());
            if budget == 0 {
                return Err(ProtocolError::FrameTooLarge {
                    len: self.pending.len(),
                }
                .into());
            }
            match (&mut self.reader)
                .take(budget as u64)
                .read_until(b'\n', &mut self.pending)
            {
                Ok(0) => return Ok(None),
                Ok(_) if self.pending.last() == Some(&b'\n') => {
                    let line = String::from_utf8(std::mem::take(&mut self.pending))
                        .map_err(|_| ProtocolError::NotUtf8)?;
                    return Ok(Some(line));
                }
                Ok(_) => continue,
                Err(e) if is_timeout_error(&e) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Session {
    fn run(self, stream: TcpStream, peer: SocketAddr) {
        match self.serve(stream, peer) {
            Ok(()) => debug!("connection from {peer} closed"),
            Err(e) => warn!("connection from {peer} ended: {e}"),
        }
    }

    fn serve(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), NetworkError> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(READ_POLL))?;
        let endpoint = ConnectionEndpoint {
            peer,
            local: stream.local_addr()?,
        };
        let mut writer = stream.try_clone()?;
        let mut frames = FrameReader {
            reader: BufReader::new(stream),
            pending: Vec::new(),
        };

        if let Some(gate) = &self.gate {
            if !gate.is_endpoint_authorized(&endpoint) {
                warn!("refusing {peer}: endpoint not authorized");
                return reply(&mut writer, &refused("endpoint not authorized"));
            }
        }

        let Some(line) = self.next_frame(&mut frames, &mut writer)? else {
            return Ok(());
        };
        let request = match decode_frame::<ClientRequest>(&line) {
            Ok(request) => request,
            Err(e) => {
                reply(&mut writer, &refused("malformed hello"))?;
                return Err(e.into());
            }
        };
        let (service_name, identity) = match (request.hello_identity(), request) {
            (Some(identity), ClientRequest::Hello { service, .. }) => (service, identity),
            (_, other) => {
                return reply(
                    &mut writer,
                    &refused(&format!("expected hello, got {}", other.type_name())),
                );
            }
        };

        if let Some(gate) = &self.gate {
            if !gate.admits(&identity) {
                warn!("refusing {peer}: identity {identity} not authorized");
                return reply(&mut writer, &refused("caller not authorized"));
            }
        }
        if self.lookup(&service_name).is_none() {
            debug!("refusing {peer}: no service named {service_name:?}");
            return reply(
                &mut writer,
                &refused(&format!("no service published as {service_name:?}")),
            );
        }

        info!("session opened: {identity} from {peer} on {service_name}");
        reply(
            &mut writer,
            &ServerReply::Welcome {
                service: service_name.clone(),
            },
        )?;

        while let Some(line) = self.next_frame(&mut frames, &mut writer)? {
            let request = match decode_frame::<ClientRequest>(&line) {
                Ok(request) => request,
                Err(ProtocolError::EmptyFrame) => continue,
                Err(e) => {
                    reply(&mut writer, &refused("malformed frame"))?;
                    return Err(e.into());
                }
            };
            match request.as_send_request() {
                Some((id, send)) => {
                    let answer = self.call(&service_name, &identity, id, send);
                    reply(&mut writer, &answer)?;
                }
                None if matches!(request, ClientRequest::Goodbye) => break,
                None => {
                    let reason = format!("unexpected {} in session", request.type_name());
                    return reply(&mut writer, &refused(&reason));
                }
            }
        }
        Ok(())
    }

    /// Reads the next frame.  A frame that cannot be read as text is answered
    /// with `refused` before the session ends.
    fn next_frame(
        &self,
        frames: &mut FrameReader,
        writer: &mut TcpStream,
    ) -> Result<Option<String>, NetworkError> {
        match frames.next_frame(&self.running) {
            Err(NetworkError::Protocol(e)) => {
                reply(writer, &refused(&e.to_string()))?;
                Err(e.into())
            }
            other => other,
        }
    }

    fn lookup(&self, name: &str) -> Option<Arc<RemoteSendService>> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .and_then(Weak::upgrade)
    }

    /// Executes one `send_message` on behalf of `identity`.
    fn call(
        &self,
        service_name: &str,
        identity: &CallerIdentity,
        id: u64,
        request: SendRequest,
    ) -> ServerReply {
        let Some(service) = self.lookup(service_name) else {
            return ServerReply::SendError {
                id,
                kind: RemoteErrorKind::ServiceUnavailable,
                detail: format!("service {service_name:?} is not published"),
            };
        };
        match service.send_message(identity, request) {
            Ok(()) => ServerReply::SendOk { id },
            Err(e) => ServerReply::SendError {
                id,
                kind: remote_kind(&e),
                detail: e.to_string(),
            },
        }
    }
}

fn remote_kind(e: &ServiceError) -> RemoteErrorKind {
    match e {
        ServiceError::ResourceDisposed => RemoteErrorKind::ResourceDisposed,
        ServiceError::Encode(_) => RemoteErrorKind::InvalidMessage,
        ServiceError::SendFailure(_)
        | ServiceError::ResourceOpenFailure { .. }
        | ServiceError::ResourceCloseFailure(_) => RemoteErrorKind::SendFailure,
    }
}

fn refused(reason: &str) -> ServerReply {
    ServerReply::Refused {
        reason: reason.to_string(),
    }
}

fn reply(writer: &mut TcpStream, message: &ServerReply) -> Result<(), NetworkError> {
    let frame = encode_frame(message)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
