//! Mock transport for testing without a real SSH stack.
//!
//! Provides in-memory implementations of the transport traits, allowing
//! the session, router and supervisor logic to be tested without sockets,
//! key exchange or authentication.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Notify, mpsc, oneshot, watch};

use osh_core::constants::{
    CHANNEL_OPEN_QUEUE_DEPTH, INPUT_QUEUE_DEPTH, REQ_EXIT_STATUS, REQUEST_QUEUE_DEPTH,
};
use osh_core::error::{Error, Result};
use osh_core::protocol::{ExitStatus, RejectReason};
use osh_core::transport::{
    ChannelId, ChannelOpener, ChannelSink, Connection, IncomingConnection, NewChannel, Reply,
    Request, SessionChannel,
};

// =============================================================================
// Connection
// =============================================================================

/// A mock connection whose end is triggered by the test.
#[derive(Debug)]
pub struct MockConnection {
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    user: String,
    ended: watch::Sender<bool>,
    closes: AtomicUsize,
}

impl MockConnection {
    /// Create a new mock connection for `user`.
    pub fn new(user: &str) -> Self {
        let (ended, _) = watch::channel(false);
        Self {
            local_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 29384),
            remote_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), 50022),
            user: user.to_string(),
            ended,
            closes: AtomicUsize::new(0),
        }
    }

    /// Simulate the peer going away.
    pub fn finish(&self) {
        self.ended.send_replace(true);
    }

    /// Number of `close` calls received.
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
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
        let mut rx = self.ended.subscribe();
        rx.wait_for(|ended| *ended)
            .await
            .map_err(|_| Error::ConnectionClosed)?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.ended.send_replace(true);
        Ok(())
    }
}

/// Wrap a connection into an [`IncomingConnection`], returning the senders
/// that feed its global request and channel-open streams.
pub fn mock_incoming(
    connection: Arc<MockConnection>,
) -> (
    IncomingConnection,
    mpsc::Sender<Request>,
    mpsc::Sender<NewChannel>,
) {
    let (global_tx, global_requests) = mpsc::channel(REQUEST_QUEUE_DEPTH);
    let (channel_tx, channels) = mpsc::channel(CHANNEL_OPEN_QUEUE_DEPTH);
    let incoming = IncomingConnection {
        connection,
        global_requests,
        channels,
    };
    (incoming, global_tx, channel_tx)
}

// =============================================================================
// Channel Sink
// =============================================================================

/// A request sent by the code under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRequest {
    pub kind: String,
    pub want_reply: bool,
    pub payload: Bytes,
}

#[derive(Debug, Default)]
struct SinkLog {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    requests: Vec<SentRequest>,
    closes: usize,
}

/// Channel sink that records everything written to it.
#[derive(Debug, Default)]
pub struct RecordingSink {
    log: Mutex<SinkLog>,
    changed: Notify,
    fail_writes: AtomicBool,
    fail_transport: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent data writes fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent data writes fail with a transport error rather than
    /// end-of-stream.
    pub fn set_fail_transport(&self, fail: bool) {
        self.fail_transport.store(fail, Ordering::SeqCst);
    }

    /// Main data stream, lossily decoded.
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.lock().stdout).into_owned()
    }

    /// Extended data stream 1, lossily decoded.
    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.lock().stderr).into_owned()
    }

    pub fn requests(&self) -> Vec<SentRequest> {
        self.lock().requests.clone()
    }

    /// Decoded statuses of all `exit-status` requests sent so far.
    pub fn exit_statuses(&self) -> Vec<u32> {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.kind == REQ_EXIT_STATUS)
            .filter_map(|r| ExitStatus::decode(&r.payload).ok())
            .map(|s| s.0)
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    /// Wait until the main data stream contains `needle`.
    pub async fn wait_for_stdout(&self, needle: &str, timeout: Duration) -> bool {
        self.wait_until(timeout, |log| {
            String::from_utf8_lossy(&log.stdout).contains(needle)
        })
        .await
    }

    /// Wait until the channel has been closed at least once.
    pub async fn wait_for_close(&self, timeout: Duration) -> bool {
        self.wait_until(timeout, |log| log.closes > 0).await
    }

    async fn wait_until(&self, timeout: Duration, done: impl Fn(&SinkLog) -> bool) -> bool {
        let wait = async {
            loop {
                let notified = self.changed.notified();
                if done(&self.lock()) {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SinkLog> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, f: impl FnOnce(&mut SinkLog)) {
        f(&mut self.lock());
        self.changed.notify_waiters();
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_transport.load(Ordering::SeqCst) {
            return Err(Error::Transport {
                message: "link lost".into(),
            });
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelSink for RecordingSink {
    async fn data(&self, data: Bytes) -> Result<()> {
        self.check_writable()?;
        self.record(|log| log.stdout.extend_from_slice(&data));
        Ok(())
    }

    async fn extended_data(&self, code: u32, data: Bytes) -> Result<()> {
        self.check_writable()?;
        if code == 1 {
            self.record(|log| log.stderr.extend_from_slice(&data));
        }
        Ok(())
    }

    async fn send_request(&self, kind: &str, want_reply: bool, payload: Bytes) -> Result<bool> {
        self.record(|log| {
            log.requests.push(SentRequest {
                kind: kind.to_string(),
                want_reply,
                payload,
            })
        });
        Ok(false)
    }

    async fn close(&self) -> Result<()> {
        self.record(|log| log.closes += 1);
        Ok(())
    }
}

// =============================================================================
// Channels
// =============================================================================

/// How a mock channel open was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenDecision {
    Accepted,
    Rejected {
        reason: RejectReason,
        message: String,
    },
}

/// Test-side handle of a mock channel.
#[derive(Debug)]
pub struct ChannelPeer {
    input: Option<mpsc::Sender<Bytes>>,
    requests: mpsc::Sender<Request>,
    /// Everything the server wrote to the channel.
    pub sink: Arc<RecordingSink>,
    decision: Option<oneshot::Receiver<OpenDecision>>,
}

impl ChannelPeer {
    /// Wait for the router's decision on the channel open.
    pub async fn decision(&mut self) -> Option<OpenDecision> {
        self.decision.take()?.await.ok()
    }

    /// Send client input bytes.
    pub fn send_input(&self, data: impl Into<Bytes>) -> bool {
        match &self.input {
            Some(tx) => tx.try_send(data.into()).is_ok(),
            None => false,
        }
    }

    /// Signal end of client input.
    pub fn eof(&mut self) {
        self.input = None;
    }

    /// Send a channel request that wants a reply.
    pub async fn request(&self, kind: &str, payload: Bytes) -> oneshot::Receiver<Reply> {
        let (request, reply) = Request::new(kind, true, payload);
        let _ = self.requests.send(request).await;
        reply
    }

    /// Send a channel request and wait for its answer.
    ///
    /// Returns None when the request was dropped without a reply.
    pub async fn request_ok(&self, kind: &str, payload: Bytes) -> Option<bool> {
        self.request(kind, payload).await.await.ok().map(|r| r.ok)
    }
}

struct MockParts {
    channel: SessionChannel,
    decision_tx: oneshot::Sender<OpenDecision>,
}

struct MockOpener {
    parts: MockParts,
}

#[async_trait]
impl ChannelOpener for MockOpener {
    async fn accept(self: Box<Self>) -> Result<SessionChannel> {
        let MockParts {
            channel,
            decision_tx,
        } = self.parts;
        let _ = decision_tx.send(OpenDecision::Accepted);
        Ok(channel)
    }

    async fn reject(self: Box<Self>, reason: RejectReason, message: &str) -> Result<()> {
        let _ = self.parts.decision_tx.send(OpenDecision::Rejected {
            reason,
            message: message.to_string(),
        });
        Ok(())
    }
}

fn channel_parts(id: u32) -> (SessionChannel, ChannelPeer, oneshot::Sender<OpenDecision>) {
    let (input_tx, input) = mpsc::channel(INPUT_QUEUE_DEPTH);
    let (request_tx, requests) = mpsc::channel(REQUEST_QUEUE_DEPTH);
    let (decision_tx, decision_rx) = oneshot::channel();
    let sink = Arc::new(RecordingSink::new());

    let channel = SessionChannel {
        id: ChannelId(id),
        input,
        sink: sink.clone(),
        requests,
    };
    let peer = ChannelPeer {
        input: Some(input_tx),
        requests: request_tx,
        sink,
        decision: Some(decision_rx),
    };
    (channel, peer, decision_tx)
}

/// Create a pending channel open of `channel_type` and its peer handle.
pub fn mock_channel(id: u32, channel_type: &str) -> (NewChannel, ChannelPeer) {
    let (channel, peer, decision_tx) = channel_parts(id);
    let opener = MockOpener {
        parts: MockParts {
            channel,
            decision_tx,
        },
    };
    let new_channel = NewChannel::new(channel_type, Bytes::new(), Box::new(opener));
    (new_channel, peer)
}

/// Create an already-accepted session channel and its peer handle.
pub fn session_pair(id: u32) -> (SessionChannel, ChannelPeer) {
    let (channel, mut peer, _) = channel_parts(id);
    peer.decision = None;
    (channel, peer)
}

// =============================================================================
// Tests
// =============================================================================
