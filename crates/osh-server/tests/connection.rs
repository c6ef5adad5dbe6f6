//! Connection supervisor, channel router and global request tests.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use osh_core::constants::UNKNOWN_CHANNEL_MESSAGE;
use osh_core::protocol::{RejectReason, TcpipForward};
use osh_core::transport::Request;
use osh_server::{CommandRegistry, PromptContext, ServerContext, serve_connection};
use osh_test_utils::{MockConnection, OpenDecision, mock_channel, mock_incoming};

const WAIT: Duration = Duration::from_secs(5);

fn context() -> ServerContext {
    let registry = CommandRegistry::with_builtins().unwrap();
    let prompt = PromptContext::new("tester", "box", false).shared();
    ServerContext::new(Arc::new(registry), prompt, false)
}

#[tokio::test]
async fn non_session_channels_rejected() {
    let conn = Arc::new(MockConnection::new("alice"));
    let (incoming, _global_tx, channel_tx) = mock_incoming(conn.clone());
    let server = tokio::spawn(serve_connection(incoming, context()));

    for (id, channel_type) in [(1, "x11"), (2, "direct-tcpip"), (3, "forwarded-tcpip")] {
        let (new_channel, mut peer) = mock_channel(id, channel_type);
        channel_tx.send(new_channel).await.unwrap();
        assert_eq!(
            peer.decision().await,
            Some(OpenDecision::Rejected {
                reason: RejectReason::UnknownChannelType,
                message: UNKNOWN_CHANNEL_MESSAGE.to_string(),
            }),
            "{channel_type}"
        );
    }

    conn.finish();
    server.await.unwrap();
}

#[tokio::test]
async fn session_channel_accepted_and_served() {
    let conn = Arc::new(MockConnection::new("alice"));
    let (incoming, _global_tx, channel_tx) = mock_incoming(conn.clone());
    let server = tokio::spawn(serve_connection(incoming, context()));

    let (new_channel, mut peer) = mock_channel(1, "session");
    channel_tx.send(new_channel).await.unwrap();
    assert_eq!(peer.decision().await, Some(OpenDecision::Accepted));

    assert_eq!(peer.request_ok("shell", Bytes::new()).await, Some(true));
    peer.send_input("help\nexit\n");
    assert!(peer.sink.wait_for_close(WAIT).await);
    assert!(peer.sink.stdout().contains("Defined commands:"));
    assert_eq!(peer.sink.exit_statuses(), vec![0]);

    conn.finish();
    server.await.unwrap();
}

#[tokio::test]
async fn sessions_on_one_connection_run_concurrently() {
    let conn = Arc::new(MockConnection::new("alice"));
    let (incoming, _global_tx, channel_tx) = mock_incoming(conn.clone());
    let server = tokio::spawn(serve_connection(incoming, context()));

    let (first, mut first_peer) = mock_channel(1, "session");
    let (second, mut second_peer) = mock_channel(2, "session");
    channel_tx.send(first).await.unwrap();
    channel_tx.send(second).await.unwrap();
    first_peer.decision().await;
    second_peer.decision().await;

    first_peer.request_ok("shell", Bytes::new()).await;
    second_peer.request_ok("shell", Bytes::new()).await;

    // The idle first session must not hold up the second.
    second_peer.send_input("exit\n");
    assert!(second_peer.sink.wait_for_close(WAIT).await);
    assert_eq!(first_peer.sink.close_count(), 0);

    first_peer.eof();
    assert!(first_peer.sink.wait_for_close(WAIT).await);

    conn.finish();
    server.await.unwrap();
}

#[tokio::test]
async fn global_requests_declined() {
    let conn = Arc::new(MockConnection::new("alice"));
    let (incoming, global_tx, _channel_tx) = mock_incoming(conn.clone());
    let server = tokio::spawn(serve_connection(incoming, context()));

    let forward = TcpipForward {
        address: "0.0.0.0".into(),
        port: 8080,
    };
    for (kind, payload) in [
        ("tcpip-forward", forward.to_payload()),
        ("no-more-sessions@openssh.com", Bytes::new()),
        ("keepalive@openssh.com", Bytes::new()),
    ] {
        let (request, reply) = Request::new(kind, true, payload);
        global_tx.send(request).await.unwrap();
        assert!(!reply.await.unwrap().ok, "{kind}");
    }

    conn.finish();
    server.await.unwrap();
}

#[tokio::test]
async fn supervisor_closes_connection_once_ended() {
    let conn = Arc::new(MockConnection::new("alice"));
    let (incoming, _global_tx, _channel_tx) = mock_incoming(conn.clone());
    let server = tokio::spawn(serve_connection(incoming, context()));

    tokio::task::yield_now().await;
    assert_eq!(conn.close_count(), 0);

    conn.finish();
    tokio::time::timeout(WAIT, server).await.unwrap().unwrap();
    assert_eq!(conn.close_count(), 1);
}
