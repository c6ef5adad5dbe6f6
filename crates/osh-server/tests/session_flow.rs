//! End-to-end session tests over the mock transport.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use osh_core::constants::{
    EXIT_NOT_FOUND, EXIT_OK, EXIT_READ_ERROR, EXIT_UNPARSEABLE, INPUT_QUEUE_DEPTH,
};
use osh_core::protocol::{ExecRequest, PtyRequest};
use osh_server::{CommandRegistry, PromptContext, ServerContext, run_session};
use osh_test_utils::session_pair;

const WAIT: Duration = Duration::from_secs(5);

fn context(exec_builtins: bool) -> ServerContext {
    let registry = CommandRegistry::with_builtins().unwrap();
    let prompt = PromptContext::new("tester", "box", false).shared();
    ServerContext::new(Arc::new(registry), prompt, exec_builtins)
}

fn exec_payload(command: &str) -> Bytes {
    ExecRequest {
        command: command.to_string(),
    }
    .to_payload()
}

#[tokio::test]
async fn blank_line_then_exit() {
    let (channel, peer) = session_pair(0);
    let session = tokio::spawn(run_session(channel, context(false)));

    assert_eq!(peer.request_ok("shell", Bytes::new()).await, Some(true));
    peer.send_input("\nexit\n");

    assert_eq!(session.await.unwrap(), EXIT_OK);
    assert_eq!(peer.sink.exit_statuses(), vec![0]);
    assert_eq!(peer.sink.close_count(), 1);
    assert_eq!(peer.sink.stdout(), "");
}

#[tokio::test]
async fn comment_lines_are_ignored() {
    let (channel, mut peer) = session_pair(0);
    let session = tokio::spawn(run_session(channel, context(false)));

    peer.request_ok("shell", Bytes::new()).await;
    peer.send_input("# nothing to see\n");
    peer.eof();

    assert_eq!(session.await.unwrap(), EXIT_OK);
    assert_eq!(peer.sink.stdout(), "");
    assert_eq!(peer.sink.stderr(), "");
}

#[tokio::test]
async fn raw_shell_runs_builtins() {
    let (channel, mut peer) = session_pair(1);
    let session = tokio::spawn(run_session(channel, context(false)));

    peer.request_ok("shell", Bytes::new()).await;
    peer.send_input("help\nfrobnicate\necho 'oops\n");
    peer.eof();

    assert_eq!(session.await.unwrap(), EXIT_OK);
    let stdout = peer.sink.stdout();
    assert!(stdout.contains("Defined commands:"), "{stdout}");
    assert!(stdout.contains("ls [-h] [-l] [directory]"), "{stdout}");
    assert!(stdout.contains("Unknown command \"frobnicate\""), "{stdout}");
    assert!(peer.sink.stderr().contains("Unable to parse"));
    assert_eq!(peer.sink.exit_statuses(), vec![0]);
}

#[tokio::test]
async fn cd_changes_only_this_session() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("marker.txt"), b"x").unwrap();
    let ctx = context(false);

    let (channel, mut peer) = session_pair(1);
    let first = tokio::spawn(run_session(channel, ctx.clone()));
    peer.request_ok("shell", Bytes::new()).await;
    peer.send_input(format!("cd {}\nls\n", tmp.path().display()));
    peer.eof();
    first.await.unwrap();
    assert!(peer.sink.stdout().contains("marker.txt"));

    let (channel, mut other) = session_pair(2);
    let second = tokio::spawn(run_session(channel, ctx));
    other.request_ok("shell", Bytes::new()).await;
    other.send_input("ls\n");
    other.eof();
    second.await.unwrap();
    assert!(!other.sink.stdout().contains("marker.txt"));
}

#[tokio::test]
async fn terminal_shell_shows_prompt_and_echoes() {
    let (channel, peer) = session_pair(2);
    let session = tokio::spawn(run_session(channel, context(false)));

    let pty = PtyRequest::new("xterm", 80, 24).to_payload();
    assert_eq!(peer.request_ok("pty-req", pty).await, Some(true));
    assert_eq!(peer.request_ok("shell", Bytes::new()).await, Some(true));

    assert!(peer.sink.wait_for_stdout("[tester@box:", WAIT).await);
    peer.send_input("exit\r");

    assert_eq!(session.await.unwrap(), EXIT_OK);
    let stdout = peer.sink.stdout();
    assert!(stdout.contains("\x1b[31m"), "{stdout:?}");
    assert!(stdout.contains("exit\r\n"), "{stdout:?}");
    assert_eq!(peer.sink.exit_statuses(), vec![0]);
    assert_eq!(peer.sink.close_count(), 1);
}

#[tokio::test]
async fn terminal_output_uses_crlf() {
    let (channel, peer) = session_pair(3);
    let session = tokio::spawn(run_session(channel, context(false)));

    let pty = PtyRequest::new("xterm", 80, 24).to_payload();
    peer.request_ok("pty-req", pty).await;
    peer.request_ok("shell", Bytes::new()).await;
    peer.send_input("help\rbye\r");

    assert_eq!(session.await.unwrap(), EXIT_OK);
    assert!(peer.sink.stdout().contains("Defined commands:\r\n"));
}

#[tokio::test]
async fn exec_is_announced() {
    let (channel, peer) = session_pair(4);
    let session = tokio::spawn(run_session(channel, context(false)));

    assert_eq!(peer.request_ok("exec", exec_payload("ls -l")).await, Some(true));

    assert_eq!(session.await.unwrap(), EXIT_OK);
    assert_eq!(peer.sink.stdout(), "Executing \"ls -l\"\n");
    assert_eq!(peer.sink.exit_statuses(), vec![0]);
    assert_eq!(peer.sink.close_count(), 1);
}

#[tokio::test]
async fn exec_builtins_report_status() {
    for (command, expected) in [
        ("help", EXIT_OK),
        ("frobnicate", EXIT_NOT_FOUND),
        ("ls 'unterminated", EXIT_UNPARSEABLE),
    ] {
        let (channel, peer) = session_pair(5);
        let session = tokio::spawn(run_session(channel, context(true)));
        peer.request_ok("exec", exec_payload(command)).await;
        assert_eq!(session.await.unwrap(), expected, "{command}");
        assert_eq!(peer.sink.exit_statuses(), vec![expected]);
    }
}

#[tokio::test]
async fn only_first_mode_request_is_serviced() {
    let (channel, mut peer) = session_pair(6);
    let session = tokio::spawn(run_session(channel, context(false)));

    assert_eq!(peer.request_ok("shell", Bytes::new()).await, Some(true));
    assert_eq!(peer.request_ok("exec", exec_payload("help")).await, Some(false));
    peer.eof();

    assert_eq!(session.await.unwrap(), EXIT_OK);
    assert!(!peer.sink.stdout().contains("Executing"));
    assert_eq!(peer.sink.exit_statuses(), vec![0]);
}

#[tokio::test]
async fn requests_closed_before_mode_still_reports_status() {
    let (channel, peer) = session_pair(7);
    let sink = peer.sink.clone();
    let session = tokio::spawn(run_session(channel, context(false)));

    drop(peer);

    assert_eq!(session.await.unwrap(), EXIT_OK);
    assert_eq!(sink.exit_statuses(), vec![0]);
    assert_eq!(sink.close_count(), 1);
}

#[tokio::test]
async fn failed_writes_do_not_stop_session() {
    let (channel, peer) = session_pair(8);
    peer.sink.set_fail_writes(true);
    let session = tokio::spawn(run_session(channel, context(false)));

    peer.request_ok("shell", Bytes::new()).await;
    peer.send_input("help\nquit\n");

    assert_eq!(session.await.unwrap(), EXIT_OK);
    assert_eq!(peer.sink.exit_statuses(), vec![0]);
}

#[tokio::test]
async fn terminal_transport_failure_reports_read_error() {
    let (channel, peer) = session_pair(9);
    peer.sink.set_fail_transport(true);
    let session = tokio::spawn(run_session(channel, context(false)));

    let pty = PtyRequest::new("xterm", 80, 24).to_payload();
    assert_eq!(peer.request_ok("pty-req", pty).await, Some(true));
    assert_eq!(peer.request_ok("shell", Bytes::new()).await, Some(true));

    assert_eq!(session.await.unwrap(), EXIT_READ_ERROR);
    assert_eq!(peer.sink.exit_statuses(), vec![EXIT_READ_ERROR]);
    assert_eq!(peer.sink.close_count(), 1);
}

#[tokio::test]
async fn unread_input_is_bounded_and_released() {
    let (channel, peer) = session_pair(10);
    let session = tokio::spawn(run_session(channel, context(false)));

    let queued = (0..INPUT_QUEUE_DEPTH * 2)
        .filter(|_| peer.send_input("noise"))
        .count();
    assert_eq!(queued, INPUT_QUEUE_DEPTH);

    assert_eq!(peer.request_ok("exec", exec_payload("ls")).await, Some(true));
    assert_eq!(session.await.unwrap(), EXIT_OK);
    assert!(!peer.send_input("late"));
}
