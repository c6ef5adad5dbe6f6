//! Session controller.
//!
//! One controller runs per accepted session channel, split over two tasks:
//!
//! - the request task consumes the channel's request stream, negotiates the
//!   pty and hands exactly one mode selection (`shell` or `exec`) to the
//!   main task through a oneshot;
//! - the main task waits for that selection, builds the terminal adapter,
//!   runs the interactive loop or the exec path, then reports the exit
//!   status and closes the channel.
//!
//! Every path through [`run_session`] sends one `exit-status` and performs
//! one close.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tracing::{Instrument, debug, info, info_span, warn};

use osh_core::constants::{EXIT_OK, EXIT_READ_ERROR, REQ_EXIT_STATUS};
use osh_core::protocol::{ExecRequest, ExitStatus, PtyRequest, RequestKind, WindowChange};
use osh_core::transport::{ChannelSink, Request, SessionChannel};

use crate::commands::{CommandRegistry, WorkingDir};
use crate::connection::ServerContext;
use crate::terminal::{LineIo, TerminalState};

/// The one-time choice between interactive and one-shot operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeSelection {
    Shell {
        terminal: Option<TerminalState>,
    },
    Exec {
        command: String,
        terminal: Option<TerminalState>,
    },
}

/// Drive one session channel to completion and return its exit status.
pub async fn run_session(channel: SessionChannel, ctx: ServerContext) -> u32 {
    let SessionChannel {
        id,
        input,
        sink,
        requests,
    } = channel;
    let span = info_span!("session", channel = %id);

    async move {
        let (mode_tx, mode_rx) = oneshot::channel();
        let request_task = tokio::spawn(serve_requests(requests, mode_tx).in_current_span());

        let status = match mode_rx.await {
            Ok(selection) => run_mode(selection, input, sink.clone(), &ctx).await,
            Err(_) => {
                debug!("request stream ended before mode selection");
                EXIT_OK
            }
        };

        finish(sink.as_ref(), status).await;
        request_task.abort();
        status
    }
    .instrument(span)
    .await
}

async fn run_mode(
    selection: ModeSelection,
    input: mpsc::Receiver<Bytes>,
    sink: Arc<dyn ChannelSink>,
    ctx: &ServerContext,
) -> u32 {
    let mut cwd = WorkingDir::from_process();
    match selection {
        ModeSelection::Shell { terminal } => {
            info!(terminal = terminal.is_some(), "starting shell");
            let mut io = LineIo::new(input, sink, terminal, ctx.prompt.clone());
            let status = run_shell(&mut io, &ctx.registry, &mut cwd).await;
            info!(status, "shell exited");
            status
        }
        ModeSelection::Exec { command, terminal } => {
            info!(command = %command, "executing command");
            let mut io = LineIo::new(input, sink, terminal, ctx.prompt.clone());
            let status = ctx.executor.execute(&command, &mut io, &mut cwd).await;
            info!(status, "command exited");
            status
        }
    }
}

/// Read-dispatch loop.
///
/// Returns 0 when input ends or an exit alias is entered, 1 on a hard read
/// error.
pub async fn run_shell(io: &mut LineIo, registry: &CommandRegistry, cwd: &mut WorkingDir) -> u32 {
    loop {
        let line = match io.read_line(cwd).await {
            Ok(line) => line,
            Err(e) if e.is_end_of_stream() => {
                debug!("input ended");
                return EXIT_OK;
            }
            Err(e) => {
                warn!(error = %e, "read failed");
                return EXIT_READ_ERROR;
            }
        };

        let mut stdio = Vec::new();
        let mut stderr = Vec::new();
        let outcome = registry.dispatch(&line, &mut stdio, &mut stderr, cwd);

        if let Err(e) = io.write(&stdio).await {
            debug!(error = %e, "output not delivered");
        }
        if let Err(e) = io.write_stderr(&stderr).await {
            debug!(error = %e, "diagnostics not delivered");
        }
        if outcome.exit {
            return EXIT_OK;
        }
    }
}

/// Consume channel requests until the stream closes.
///
/// The first `shell` or `exec` is handed to `mode_tx`; any later one is
/// refused. `pty-req` is honored only before mode selection and only once.
pub async fn serve_requests(
    mut requests: mpsc::Receiver<Request>,
    mode_tx: oneshot::Sender<ModeSelection>,
) {
    let mut mode_tx = Some(mode_tx);
    let mut pty_negotiated = false;
    let mut terminal: Option<TerminalState> = None;

    while let Some(mut req) = requests.recv().await {
        let kind = req.request_kind();
        debug!(
            request = %kind,
            want_reply = req.want_reply(),
            payload_len = req.payload().len(),
            "channel request"
        );

        match kind {
            RequestKind::Pty => {
                if mode_tx.is_none() || pty_negotiated {
                    debug!("pty-req after negotiation or mode selection");
                    req.reply(false, Bytes::new());
                    continue;
                }
                match PtyRequest::decode(req.payload()) {
                    Ok(pty) => {
                        terminal = TerminalState::from_request(&pty);
                        pty_negotiated = true;
                        debug!(term = %pty.term, cols = pty.cols, rows = pty.rows, "pty negotiated");
                        req.reply(true, Bytes::new());
                    }
                    Err(e) => {
                        let message = format!("Unable to create PTY: {}", e);
                        warn!("{}", message);
                        req.reply(false, Bytes::from(message));
                    }
                }
            }
            RequestKind::Shell => match mode_tx.take() {
                Some(tx) => {
                    req.reply(true, Bytes::new());
                    let _ = tx.send(ModeSelection::Shell {
                        terminal: terminal.take(),
                    });
                }
                None => {
                    debug!("shell after mode selection ignored");
                    req.reply(false, Bytes::new());
                }
            },
            RequestKind::Exec => {
                if mode_tx.is_none() {
                    debug!("exec after mode selection ignored");
                    req.reply(false, Bytes::new());
                    continue;
                }
                match ExecRequest::decode(req.payload()) {
                    Ok(exec) => {
                        req.reply(true, Bytes::new());
                        if let Some(tx) = mode_tx.take() {
                            let _ = tx.send(ModeSelection::Exec {
                                command: exec.command,
                                terminal: terminal.take(),
                            });
                        }
                    }
                    Err(e) => {
                        let message = format!("Unable to read command: {}", e);
                        warn!("{}", message);
                        req.reply(false, Bytes::from(message));
                    }
                }
            }
            RequestKind::WindowChange => {
                // Observed only; the negotiated size is kept.
                if let Ok(size) = WindowChange::decode(req.payload()) {
                    debug!(cols = size.cols, rows = size.rows, "window change");
                }
                req.reply(true, Bytes::new());
            }
            kind if kind.is_cosmetic() => {
                req.reply(true, Bytes::new());
            }
            kind => {
                debug!(request = %kind, "unhandled channel request");
                req.reply(false, Bytes::new());
            }
        }
    }
    debug!("request stream closed");
}

/// Send the exit status and close the channel.
async fn finish(sink: &dyn ChannelSink, status: u32) {
    if let Err(e) = sink
        .send_request(REQ_EXIT_STATUS, false, ExitStatus(status).to_payload())
        .await
    {
        debug!(error = %e, "exit-status not delivered");
    }
    if let Err(e) = sink.close().await {
        debug!(error = %e, "channel close failed");
    }
}
