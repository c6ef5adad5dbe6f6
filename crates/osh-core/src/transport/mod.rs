//! Transport abstractions for osh.
//!
//! The shell logic never talks to an SSH library directly. An adapter turns
//! each authenticated connection into an [`IncomingConnection`]: a handle
//! plus two streams, one of connection-level requests and one of
//! channel-open notifications. Accepted channels become a
//! [`SessionChannel`] with an input byte stream, an output sink and a
//! request stream of their own.
//!
//! This lets the session logic run against the real SSH stack and against
//! in-memory mocks alike.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::error::Result;
use crate::protocol::{RejectReason, RequestKind};

// =============================================================================
// Identifiers
// =============================================================================

/// Per-connection channel identifier assigned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub u32);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Success or failure.
    pub ok: bool,
    /// Optional response payload (global requests only).
    pub payload: Bytes,
}

/// A connection-level or channel-level request awaiting a reply.
///
/// The reply can be sent at most once. Requests that did not ask for a
/// reply accept [`Request::reply`] calls and silently drop them.
#[derive(Debug)]
pub struct Request {
    kind: String,
    want_reply: bool,
    payload: Bytes,
    reply_tx: Option<oneshot::Sender<Reply>>,
}

impl Request {
    /// Create a request and the receiver its reply will arrive on.
    pub fn new(
        kind: impl Into<String>,
        want_reply: bool,
        payload: Bytes,
    ) -> (Self, oneshot::Receiver<Reply>) {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = Self {
            kind: kind.into(),
            want_reply,
            payload,
            reply_tx: Some(reply_tx),
        };
        (request, reply_rx)
    }

    /// Raw type tag.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Type tag classified into a [`RequestKind`].
    pub fn request_kind(&self) -> RequestKind {
        RequestKind::parse(&self.kind)
    }

    /// Whether the sender expects a reply.
    pub fn want_reply(&self) -> bool {
        self.want_reply
    }

    /// Request payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Whether a reply has already been sent or discarded.
    pub fn is_answered(&self) -> bool {
        self.reply_tx.is_none()
    }

    /// Send the reply.
    ///
    /// Returns true if a reply was delivered to a waiting sender. Second and
    /// later calls, and calls on requests without `want_reply`, return false.
    pub fn reply(&mut self, ok: bool, payload: Bytes) -> bool {
        let Some(tx) = self.reply_tx.take() else {
            return false;
        };
        if !self.want_reply {
            return false;
        }
        let delivered = tx.send(Reply { ok, payload }).is_ok();
        if !delivered {
            tracing::debug!(kind = %self.kind, "request sender gone before reply");
        }
        delivered
    }
}

// =============================================================================
// Connection
// =============================================================================

/// An authenticated transport connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Peer address.
    fn remote_addr(&self) -> SocketAddr;

    /// Local address.
    fn local_addr(&self) -> SocketAddr;

    /// Authenticated user name.
    fn user(&self) -> &str;

    /// Wait until the connection ends.
    async fn wait(&self) -> Result<()>;

    /// Close the connection.
    async fn close(&self) -> Result<()>;
}

/// A freshly authenticated connection and its inbound streams.
pub struct IncomingConnection {
    pub connection: Arc<dyn Connection>,
    pub global_requests: mpsc::Receiver<Request>,
    pub channels: mpsc::Receiver<NewChannel>,
}

impl fmt::Debug for IncomingConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingConnection")
            .field("remote_addr", &self.connection.remote_addr())
            .field("user", &self.connection.user())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Channels
// =============================================================================

/// Decision half of a pending channel open.
#[async_trait]
pub trait ChannelOpener: Send {
    /// Accept the channel.
    async fn accept(self: Box<Self>) -> Result<SessionChannel>;

    /// Refuse the channel with a reason code and message.
    async fn reject(self: Box<Self>, reason: RejectReason, message: &str) -> Result<()>;
}

/// A channel-open notification awaiting a decision.
pub struct NewChannel {
    channel_type: String,
    extra_data: Bytes,
    opener: Box<dyn ChannelOpener>,
}

impl NewChannel {
    pub fn new(
        channel_type: impl Into<String>,
        extra_data: Bytes,
        opener: Box<dyn ChannelOpener>,
    ) -> Self {
        Self {
            channel_type: channel_type.into(),
            extra_data,
            opener,
        }
    }

    /// Requested channel type, e.g. `session`.
    pub fn channel_type(&self) -> &str {
        &self.channel_type
    }

    /// Type-specific open data.
    pub fn extra_data(&self) -> &[u8] {
        &self.extra_data
    }

    pub async fn accept(self) -> Result<SessionChannel> {
        self.opener.accept().await
    }

    pub async fn reject(self, reason: RejectReason, message: &str) -> Result<()> {
        self.opener.reject(reason, message).await
    }
}

impl fmt::Debug for NewChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewChannel")
            .field("channel_type", &self.channel_type)
            .field("extra_data_len", &self.extra_data.len())
            .finish_non_exhaustive()
    }
}

/// Outbound half of an accepted channel.
#[async_trait]
pub trait ChannelSink: Send + Sync {
    /// Write to the main data stream.
    async fn data(&self, data: Bytes) -> Result<()>;

    /// Write to an extended data stream (code 1 is stderr).
    async fn extended_data(&self, code: u32, data: Bytes) -> Result<()>;

    /// Send a channel request. Returns the peer's answer, or false when no
    /// reply was requested.
    async fn send_request(&self, kind: &str, want_reply: bool, payload: Bytes) -> Result<bool>;

    /// Close the channel.
    async fn close(&self) -> Result<()>;
}

/// An accepted channel.
pub struct SessionChannel {
    pub id: ChannelId,
    /// Client input; closes on EOF.
    pub input: mpsc::Receiver<Bytes>,
    pub sink: Arc<dyn ChannelSink>,
    /// Requests addressed to this channel.
    pub requests: mpsc::Receiver<Request>,
}

impl fmt::Debug for SessionChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionChannel")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
