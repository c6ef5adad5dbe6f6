//! SSH transport backed by `russh`.
//!
//! The russh [`Handler`] callbacks are turned into the stream model of
//! [`osh_core::transport`]:
//!
//! - once public-key authentication succeeds, an [`IncomingConnection`] is
//!   handed to the supervisor;
//! - channel opens of any type wait on the router's accept/reject decision;
//! - channel requests are re-encoded to their wire payloads and wait on the
//!   session's reply before answering the client;
//! - channel data feeds the session's input stream, EOF and close end it.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use russh::keys::ssh_key::rand_core::OsRng;
use russh::keys::ssh_key::{Algorithm, HashAlg};
use russh::keys::{PrivateKey, PublicKey};
use russh::server::{Auth, Handle, Msg, Session};
use russh::{Channel, CryptoVec, Disconnect, Pty, Sig};
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{Instrument, debug, info, info_span, warn};

use osh_core::constants::{
    AUTH_REJECTION_TIME, CHANNEL_OPEN_QUEUE_DEPTH, INPUT_QUEUE_DEPTH, REQ_CANCEL_TCPIP_FORWARD,
    REQ_ENV, REQ_EXEC, REQ_EXIT_STATUS, REQ_PTY, REQ_SHELL, REQ_SIGNAL, REQ_SUBSYSTEM,
    REQ_TCPIP_FORWARD, REQ_WINDOW_CHANGE, REQUEST_QUEUE_DEPTH,
};
use osh_core::error::{Error, Result};
use osh_core::protocol::{
    EnvRequest, ExitStatus, NamedRequest, PtyRequest, RejectReason, TcpipForward, WindowChange,
    put_string,
};
use osh_core::transport::{
    ChannelId, ChannelOpener, ChannelSink, Connection, IncomingConnection, NewChannel, Request,
    SessionChannel,
};

use crate::connection::{ServerContext, serve_connection};

/// Terminal mode list terminator.
const TTY_OP_END: u8 = 0;

// =============================================================================
// Keys and Configuration
// =============================================================================

/// The single public key allowed to log in.
#[derive(Clone)]
pub struct AuthorizedKey {
    encoded: Arc<[u8]>,
    fingerprint: String,
}

impl AuthorizedKey {
    /// Parse an OpenSSH `authorized_keys` style line.
    pub fn parse(line: &str) -> Result<Self> {
        let key = PublicKey::from_openssh(line.trim()).map_err(|e| Error::Config {
            message: format!("invalid authorized key: {}", e),
        })?;
        let encoded = key.to_bytes().map_err(|e| Error::Config {
            message: format!("unable to encode authorized key: {}", e),
        })?;
        Ok(Self {
            encoded: encoded.into(),
            fingerprint: key.fingerprint(HashAlg::Sha256).to_string(),
        })
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Constant-time comparison against an offered key.
    pub fn matches(&self, offered: &PublicKey) -> bool {
        match offered.to_bytes() {
            Ok(bytes) => self.encoded.as_ref().ct_eq(bytes.as_slice()).into(),
            Err(_) => false,
        }
    }

    /// Like [`AuthorizedKey::matches`], as a `Result` for the login path.
    pub fn verify(&self, offered: &PublicKey) -> Result<()> {
        if self.matches(offered) {
            Ok(())
        } else {
            Err(Error::AuthenticationFailed)
        }
    }
}

impl std::fmt::Debug for AuthorizedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizedKey")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// Load an OpenSSH private host key, or generate an ephemeral Ed25519 key.
pub fn load_host_key(path: Option<&Path>) -> Result<PrivateKey> {
    let key = match path {
        Some(path) => {
            russh::keys::load_secret_key(path, None).map_err(|e| Error::Config {
                message: format!("unable to load host key {}: {}", path.display(), e),
            })?
        }
        None => PrivateKey::random(&mut OsRng, Algorithm::Ed25519).map_err(|e| Error::Config {
            message: format!("unable to generate host key: {}", e),
        })?,
    };
    info!(
        fingerprint = %key.public_key().fingerprint(HashAlg::Sha256),
        ephemeral = path.is_none(),
        "host key ready"
    );
    Ok(key)
}

/// Build the russh server configuration.
pub fn server_config(host_key: PrivateKey, server_id: &str) -> russh::server::Config {
    russh::server::Config {
        server_id: russh::SshId::Standard(server_id.to_string()),
        auth_rejection_time: AUTH_REJECTION_TIME,
        auth_rejection_time_initial: Some(Duration::from_secs(0)),
        keys: vec![host_key],
        ..Default::default()
    }
}

// =============================================================================
// Accept Loop
// =============================================================================

/// Accept TCP connections forever, serving each on its own task.
///
/// Returns only when accepting fails.
pub async fn serve(
    listener: TcpListener,
    config: Arc<russh::server::Config>,
    authorized: AuthorizedKey,
    ctx: ServerContext,
) -> Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        let local = match stream.local_addr() {
            Ok(local) => local,
            Err(e) => {
                warn!(peer = %peer, error = %e, "dropping connection without local address");
                continue;
            }
        };
        debug!(peer = %peer, local = %local, "new connection");

        let config = config.clone();
        let authorized = authorized.clone();
        let ctx = ctx.clone();
        tokio::spawn(
            async move {
                let (ready_tx, ready_rx) = oneshot::channel();
                let (done_tx, done_rx) = watch::channel(None);
                let handler = SshHandler::new(peer, local, authorized, ready_tx, done_rx);

                let running = match russh::server::run_stream(config, stream, handler).await {
                    Ok(running) => running,
                    Err(e) => {
                        warn!(error = %e, "ssh handshake failed");
                        return;
                    }
                };

                let session = async move {
                    let result = running.await.map_err(|e| e.to_string());
                    if let Err(e) = &result {
                        debug!(error = %e, "ssh session ended with error");
                    }
                    done_tx.send_replace(Some(result));
                };
                let supervise = async move {
                    match ready_rx.await {
                        Ok(incoming) => serve_connection(incoming, ctx).await,
                        Err(_) => debug!("connection ended before authentication"),
                    }
                };
                tokio::join!(session, supervise);
            }
            .instrument(info_span!("ssh", peer = %peer)),
        );
    }
}

// =============================================================================
// Connection
// =============================================================================

type SessionResult = Option<std::result::Result<(), String>>;

/// An authenticated russh session.
pub struct SshConnection {
    remote_addr: SocketAddr,
    local_addr: SocketAddr,
    user: String,
    handle: Handle,
    done: watch::Receiver<SessionResult>,
}

#[async_trait]
impl Connection for SshConnection {
    fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn user(&self) -> &str {
        &self.user
    }

    async fn wait(&self) -> Result<()> {
        let mut done = self.done.clone();
        let result = done
            .wait_for(Option::is_some)
            .await
            .map_err(|_| Error::ConnectionClosed)?
            .clone();
        match result {
            Some(Err(message)) => Err(Error::Transport { message }),
            _ => Ok(()),
        }
    }

    async fn close(&self) -> Result<()> {
        if self.done.borrow().is_some() {
            return Ok(());
        }
        self.handle
            .disconnect(Disconnect::ByApplication, "closing".into(), "en".into())
            .await
            .map_err(|e| Error::Transport {
                message: e.to_string(),
            })
    }
}

// =============================================================================
// Channels
// =============================================================================

/// Per-channel hand-off into the session.
struct ChannelBridge {
    data_tx: Option<mpsc::Sender<Bytes>>,
    requests_tx: mpsc::Sender<Request>,
}

enum OpenDecision {
    Accept(ChannelBridge),
    Reject { reason: RejectReason, message: String },
}

struct SshChannelOpener {
    id: ChannelId,
    russh_id: russh::ChannelId,
    handle: Handle,
    decision_tx: oneshot::Sender<OpenDecision>,
}

#[async_trait]
impl ChannelOpener for SshChannelOpener {
    async fn accept(self: Box<Self>) -> Result<SessionChannel> {
        let (data_tx, input) = mpsc::channel(INPUT_QUEUE_DEPTH);
        let (requests_tx, requests) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let bridge = ChannelBridge {
            data_tx: Some(data_tx),
            requests_tx,
        };
        self.decision_tx
            .send(OpenDecision::Accept(bridge))
            .map_err(|_| Error::ConnectionClosed)?;

        Ok(SessionChannel {
            id: self.id,
            input,
            sink: Arc::new(SshChannelSink {
                id: self.russh_id,
                handle: self.handle,
            }),
            requests,
        })
    }

    async fn reject(self: Box<Self>, reason: RejectReason, message: &str) -> Result<()> {
        self.decision_tx
            .send(OpenDecision::Reject {
                reason,
                message: message.to_string(),
            })
            .map_err(|_| Error::ConnectionClosed)
    }
}

/// A write the russh session refused. Not a clean end of input.
fn not_delivered(what: &str, id: russh::ChannelId) -> Error {
    Error::Transport {
        message: format!("{} not delivered on channel {:?}", what, id),
    }
}

/// Output half of a russh channel.
struct SshChannelSink {
    id: russh::ChannelId,
    handle: Handle,
}

#[async_trait]
impl ChannelSink for SshChannelSink {
    async fn data(&self, data: Bytes) -> Result<()> {
        self.handle
            .data(self.id, CryptoVec::from_slice(&data))
            .await
            .map_err(|_| not_delivered("data", self.id))
    }

    async fn extended_data(&self, code: u32, data: Bytes) -> Result<()> {
        self.handle
            .extended_data(self.id, code, CryptoVec::from_slice(&data))
            .await
            .map_err(|_| not_delivered("extended data", self.id))
    }

    async fn send_request(&self, kind: &str, _want_reply: bool, payload: Bytes) -> Result<bool> {
        match kind {
            REQ_EXIT_STATUS => {
                let ExitStatus(status) = ExitStatus::decode(&payload)?;
                self.handle
                    .exit_status_request(self.id, status)
                    .await
                    .map_err(|_| not_delivered("exit-status", self.id))?;
                Ok(false)
            }
            other => Err(Error::Protocol {
                message: format!("unsupported outbound channel request {:?}", other),
            }),
        }
    }

    async fn close(&self) -> Result<()> {
        // EOF may fail if the client already closed; close still matters.
        let _ = self.handle.eof(self.id).await;
        self.handle
            .close(self.id)
            .await
            .map_err(|_| not_delivered("close", self.id))
    }
}

// =============================================================================
// Handler
// =============================================================================

/// Streams created once the client has authenticated.
struct Streams {
    global_tx: mpsc::Sender<Request>,
    channel_tx: mpsc::Sender<NewChannel>,
}

/// russh handler for one TCP connection.
pub struct SshHandler {
    peer: SocketAddr,
    local: SocketAddr,
    authorized: AuthorizedKey,
    user: Option<String>,
    ready_tx: Option<oneshot::Sender<IncomingConnection>>,
    done_rx: watch::Receiver<SessionResult>,
    streams: Option<Streams>,
    channels: HashMap<russh::ChannelId, ChannelBridge>,
    next_channel: u32,
}

impl SshHandler {
    fn new(
        peer: SocketAddr,
        local: SocketAddr,
        authorized: AuthorizedKey,
        ready_tx: oneshot::Sender<IncomingConnection>,
        done_rx: watch::Receiver<SessionResult>,
    ) -> Self {
        Self {
            peer,
            local,
            authorized,
            user: None,
            ready_tx: Some(ready_tx),
            done_rx,
            streams: None,
            channels: HashMap::new(),
            next_channel: 0,
        }
    }

    fn reject() -> Auth {
        Auth::Reject {
            proceed_with_methods: None,
            partial_success: false,
        }
    }

    /// Offer a channel to the router and wait for its decision.
    async fn open_channel(
        &mut self,
        channel: Channel<Msg>,
        channel_type: &str,
        extra_data: Bytes,
        session: &mut Session,
    ) -> bool {
        let Some(streams) = &self.streams else {
            return false;
        };

        let russh_id = channel.id();
        let id = ChannelId(self.next_channel);
        self.next_channel = self.next_channel.wrapping_add(1);

        let (decision_tx, decision_rx) = oneshot::channel();
        let opener = SshChannelOpener {
            id,
            russh_id,
            handle: session.handle(),
            decision_tx,
        };
        let new_channel = NewChannel::new(channel_type, extra_data, Box::new(opener));
        if streams.channel_tx.send(new_channel).await.is_err() {
            return false;
        }

        match decision_rx.await {
            Ok(OpenDecision::Accept(bridge)) => {
                self.channels.insert(russh_id, bridge);
                true
            }
            Ok(OpenDecision::Reject { reason, message }) => {
                debug!(
                    channel_type,
                    reason = %reason,
                    code = reason.code(),
                    message = %message,
                    "channel open rejected"
                );
                false
            }
            Err(_) => false,
        }
    }

    /// Pass a channel request to the session and answer with its reply.
    async fn forward_request(
        &mut self,
        id: russh::ChannelId,
        kind: &str,
        payload: Bytes,
        session: &mut Session,
    ) {
        let ok = match self.channels.get(&id) {
            Some(bridge) => {
                let (request, reply) = Request::new(kind, true, payload);
                if bridge.requests_tx.send(request).await.is_err() {
                    false
                } else {
                    match reply.await {
                        Ok(reply) => {
                            if !reply.ok && !reply.payload.is_empty() {
                                debug!(
                                    request = kind,
                                    message = %String::from_utf8_lossy(&reply.payload),
                                    "channel request refused"
                                );
                            }
                            reply.ok
                        }
                        Err(_) => false,
                    }
                }
            }
            None => false,
        };

        if ok {
            let _ = session.channel_success(id);
        } else {
            let _ = session.channel_failure(id);
        }
    }

    /// Pass a global request to the handler and return its answer.
    async fn forward_global(&mut self, kind: &str, payload: Bytes) -> bool {
        let Some(streams) = &self.streams else {
            return false;
        };
        let (request, reply) = Request::new(kind, true, payload);
        if streams.global_tx.send(request).await.is_err() {
            return false;
        }
        reply.await.map(|r| r.ok).unwrap_or(false)
    }
}

fn encode_modes(modes: &[(Pty, u32)]) -> Bytes {
    let mut buf = BytesMut::with_capacity(modes.len() * 5 + 1);
    for &(opcode, value) in modes {
        buf.put_u8(opcode as u8);
        buf.put_u32(value);
    }
    buf.put_u8(TTY_OP_END);
    buf.freeze()
}

fn string_payload(value: &[u8]) -> Bytes {
    let mut buf = BytesMut::new();
    put_string(&mut buf, value);
    buf.freeze()
}

/// Signal name as sent on the wire, without the `SIG` prefix.
fn signal_name(signal: &Sig) -> String {
    match signal {
        Sig::Custom(name) => name.clone(),
        other => format!("{:?}", other),
    }
}

impl russh::server::Handler for SshHandler {
    type Error = russh::Error;

    async fn auth_publickey_offered(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> std::result::Result<Auth, Self::Error> {
        if self.authorized.matches(public_key) {
            Ok(Auth::Accept)
        } else {
            debug!(user, peer = %self.peer, "offered key not authorized");
            Ok(Self::reject())
        }
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> std::result::Result<Auth, Self::Error> {
        match self.authorized.verify(public_key) {
            Ok(()) => {
                info!(user, peer = %self.peer, "public key accepted");
                self.user = Some(user.to_string());
                Ok(Auth::Accept)
            }
            Err(e) => {
                warn!(
                    user,
                    peer = %self.peer,
                    fingerprint = %public_key.fingerprint(HashAlg::Sha256),
                    error = %e,
                    "login refused"
                );
                Ok(Self::reject())
            }
        }
    }

    async fn auth_succeeded(&mut self, session: &mut Session) -> std::result::Result<(), Self::Error> {
        let Some(ready_tx) = self.ready_tx.take() else {
            return Ok(());
        };
        let (global_tx, global_requests) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let (channel_tx, channels) = mpsc::channel(CHANNEL_OPEN_QUEUE_DEPTH);
        self.streams = Some(Streams {
            global_tx,
            channel_tx,
        });

        let connection = SshConnection {
            remote_addr: self.peer,
            local_addr: self.local,
            user: self.user.clone().unwrap_or_default(),
            handle: session.handle(),
            done: self.done_rx.clone(),
        };
        let incoming = IncomingConnection {
            connection: Arc::new(connection),
            global_requests,
            channels,
        };
        if ready_tx.send(incoming).is_err() {
            debug!("supervisor gone before authentication completed");
        }
        Ok(())
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        session: &mut Session,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(self
            .open_channel(channel, "session", Bytes::new(), session)
            .await)
    }

    async fn channel_open_x11(
        &mut self,
        channel: Channel<Msg>,
        originator_address: &str,
        originator_port: u32,
        session: &mut Session,
    ) -> std::result::Result<bool, Self::Error> {
        let mut extra = BytesMut::new();
        put_string(&mut extra, originator_address);
        extra.put_u32(originator_port);
        Ok(self
            .open_channel(channel, "x11", extra.freeze(), session)
            .await)
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        originator_address: &str,
        originator_port: u32,
        session: &mut Session,
    ) -> std::result::Result<bool, Self::Error> {
        let mut extra = BytesMut::new();
        put_string(&mut extra, host_to_connect);
        extra.put_u32(port_to_connect);
        put_string(&mut extra, originator_address);
        extra.put_u32(originator_port);
        Ok(self
            .open_channel(channel, "direct-tcpip", extra.freeze(), session)
            .await)
    }

    async fn channel_eof(
        &mut self,
        channel: russh::ChannelId,
        _session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        if let Some(bridge) = self.channels.get_mut(&channel) {
            bridge.data_tx = None;
        }
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: russh::ChannelId,
        _session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        self.channels.remove(&channel);
        Ok(())
    }

    async fn data(
        &mut self,
        channel: russh::ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        let Some(bridge) = self.channels.get_mut(&channel) else {
            return Ok(());
        };
        let Some(tx) = &bridge.data_tx else {
            return Ok(());
        };
        let sent = tx.try_send(Bytes::copy_from_slice(data));
        match sent {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(?channel, len = data.len(), "input backlog full, discarding");
            }
            // The session stopped reading; nothing will consume more input.
            Err(TrySendError::Closed(_)) => bridge.data_tx = None,
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn pty_request(
        &mut self,
        channel: russh::ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        pix_width: u32,
        pix_height: u32,
        modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        let request = PtyRequest {
            term: term.to_string(),
            cols: col_width,
            rows: row_height,
            pixel_width: pix_width,
            pixel_height: pix_height,
            modes: encode_modes(modes),
        };
        self.forward_request(channel, REQ_PTY, request.to_payload(), session)
            .await;
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: russh::ChannelId,
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        self.forward_request(channel, REQ_SHELL, Bytes::new(), session)
            .await;
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: russh::ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        self.forward_request(channel, REQ_EXEC, string_payload(data), session)
            .await;
        Ok(())
    }

    async fn window_change_request(
        &mut self,
        channel: russh::ChannelId,
        col_width: u32,
        row_height: u32,
        pix_width: u32,
        pix_height: u32,
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        let change = WindowChange {
            cols: col_width,
            rows: row_height,
            pixel_width: pix_width,
            pixel_height: pix_height,
        };
        self.forward_request(channel, REQ_WINDOW_CHANGE, change.to_payload(), session)
            .await;
        Ok(())
    }

    async fn env_request(
        &mut self,
        channel: russh::ChannelId,
        variable_name: &str,
        variable_value: &str,
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        let env = EnvRequest {
            name: variable_name.to_string(),
            value: variable_value.to_string(),
        };
        self.forward_request(channel, REQ_ENV, env.to_payload(), session)
            .await;
        Ok(())
    }

    async fn subsystem_request(
        &mut self,
        channel: russh::ChannelId,
        name: &str,
        session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        let subsystem = NamedRequest {
            name: name.to_string(),
        };
        self.forward_request(channel, REQ_SUBSYSTEM, subsystem.to_payload(), session)
            .await;
        Ok(())
    }

    async fn signal(
        &mut self,
        channel: russh::ChannelId,
        signal: Sig,
        _session: &mut Session,
    ) -> std::result::Result<(), Self::Error> {
        let Some(bridge) = self.channels.get(&channel) else {
            return Ok(());
        };
        let named = NamedRequest {
            name: signal_name(&signal),
        };
        let (request, _) = Request::new(REQ_SIGNAL, false, named.to_payload());
        let _ = bridge.requests_tx.send(request).await;
        Ok(())
    }

    async fn tcpip_forward(
        &mut self,
        address: &str,
        port: &mut u32,
        _session: &mut Session,
    ) -> std::result::Result<bool, Self::Error> {
        let forward = TcpipForward {
            address: address.to_string(),
            port: *port,
        };
        Ok(self
            .forward_global(REQ_TCPIP_FORWARD, forward.to_payload())
            .await)
    }

    async fn cancel_tcpip_forward(
        &mut self,
        address: &str,
        port: u32,
        _session: &mut Session,
    ) -> std::result::Result<bool, Self::Error> {
        let forward = TcpipForward {
            address: address.to_string(),
            port,
        };
        Ok(self
            .forward_global(REQ_CANCEL_TCPIP_FORWARD, forward.to_payload())
            .await)
    }
}
