//! Terminal adapter.
//!
//! [`LineIo`] gives a session one way to read lines and write output no
//! matter how the client connected:
//!
//! - Terminal-backed, when a pty was negotiated before mode selection: input
//!   goes through the [`LineEditor`], the prompt is refreshed before every
//!   read, and output line feeds become CRLF.
//! - Raw-backed otherwise: input is split on line feeds with a trailing CR
//!   removed, no prompt is shown, and diagnostics go to the stderr stream.
//!
//! The variant is fixed at construction.

mod editor;

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

use osh_core::constants::EXTENDED_DATA_STDERR;
use osh_core::error::{Error, Result};
use osh_core::protocol::PtyRequest;
use osh_core::transport::ChannelSink;

pub use editor::{Edit, LineEditor};

use crate::commands::WorkingDir;
use crate::prompt::SharedPrompt;

const PROMPT_COLOR: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Negotiated pseudo-terminal parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalState {
    pub term: String,
    pub cols: u32,
    pub rows: u32,
}

impl TerminalState {
    /// Terminal for a `pty-req`, or None if either dimension is zero.
    pub fn from_request(req: &PtyRequest) -> Option<Self> {
        req.has_size().then(|| Self {
            term: req.term.clone(),
            cols: req.cols,
            rows: req.rows,
        })
    }
}

/// Buffered view of a channel's input stream.
struct ChannelInput {
    rx: mpsc::Receiver<Bytes>,
    pending: BytesMut,
    eof: bool,
}

impl ChannelInput {
    fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        Self {
            rx,
            pending: BytesMut::new(),
            eof: false,
        }
    }

    /// Wait for more input. Returns false once the stream has ended.
    async fn fill(&mut self) -> bool {
        if self.eof {
            return false;
        }
        match self.rx.recv().await {
            Some(data) => {
                self.pending.extend_from_slice(&data);
                true
            }
            None => {
                self.eof = true;
                false
            }
        }
    }
}

enum Mode {
    Terminal {
        state: TerminalState,
        editor: LineEditor,
        prompt: SharedPrompt,
    },
    Raw,
}

/// Line-oriented access to a session channel.
pub struct LineIo {
    input: ChannelInput,
    sink: Arc<dyn ChannelSink>,
    mode: Mode,
}

impl LineIo {
    /// Build the adapter; terminal-backed iff `terminal` is present.
    pub fn new(
        input: mpsc::Receiver<Bytes>,
        sink: Arc<dyn ChannelSink>,
        terminal: Option<TerminalState>,
        prompt: SharedPrompt,
    ) -> Self {
        let mode = match terminal {
            Some(state) => Mode::Terminal {
                state,
                editor: LineEditor::new(),
                prompt,
            },
            None => Mode::Raw,
        };
        Self {
            input: ChannelInput::new(input),
            sink,
            mode,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.mode, Mode::Terminal { .. })
    }

    /// `(cols, rows)` of the negotiated terminal.
    pub fn terminal_size(&self) -> Option<(u32, u32)> {
        match &self.mode {
            Mode::Terminal { state, .. } => Some((state.cols, state.rows)),
            Mode::Raw => None,
        }
    }

    /// Read one line.
    ///
    /// End of input yields [`Error::ConnectionClosed`]. In raw mode a final
    /// line without a line feed is returned before that.
    pub async fn read_line(&mut self, cwd: &WorkingDir) -> Result<String> {
        match &mut self.mode {
            Mode::Terminal { editor, prompt, .. } => {
                let text = {
                    let ctx = prompt.read().unwrap_or_else(|e| e.into_inner());
                    format!("{}{}{}", PROMPT_COLOR, ctx.render(cwd.current()), RESET)
                };
                editor.set_prompt(text.clone());
                self.sink.data(Bytes::from(text)).await?;
                read_edited(&mut self.input, editor, self.sink.as_ref()).await
            }
            Mode::Raw => read_raw(&mut self.input).await,
        }
    }

    /// Write to the output stream.
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let data = match self.mode {
            Mode::Terminal { .. } => to_crlf(data),
            Mode::Raw => Bytes::copy_from_slice(data),
        };
        self.sink.data(data).await
    }

    /// Write diagnostics: to the terminal when there is one, otherwise to
    /// the stderr extended-data stream.
    pub async fn write_stderr(&self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        match self.mode {
            Mode::Terminal { .. } => self.sink.data(to_crlf(data)).await,
            Mode::Raw => {
                self.sink
                    .extended_data(EXTENDED_DATA_STDERR, Bytes::copy_from_slice(data))
                    .await
            }
        }
    }
}

async fn read_edited(
    input: &mut ChannelInput,
    editor: &mut LineEditor,
    sink: &dyn ChannelSink,
) -> Result<String> {
    loop {
        while !input.pending.is_empty() {
            let byte = input.pending.split_to(1)[0];
            let edit = editor.feed(byte);
            let echo = editor.take_echo();
            if !echo.is_empty() {
                sink.data(Bytes::from(echo)).await?;
            }
            match edit {
                Some(Edit::Line(line)) => return Ok(line),
                Some(Edit::Eof) => return Err(Error::ConnectionClosed),
                None => {}
            }
        }
        if !input.fill().await {
            return Err(Error::ConnectionClosed);
        }
    }
}

async fn read_raw(input: &mut ChannelInput) -> Result<String> {
    loop {
        if let Some(pos) = input.pending.iter().position(|&b| b == b'\n') {
            let mut line = input.pending.split_to(pos + 1);
            line.truncate(pos);
            if line.last() == Some(&b'\r') {
                line.truncate(pos - 1);
            }
            return Ok(String::from_utf8_lossy(&line).into_owned());
        }
        if !input.fill().await {
            if input.pending.is_empty() {
                return Err(Error::ConnectionClosed);
            }
            let line = input.pending.split();
            return Ok(String::from_utf8_lossy(&line).into_owned());
        }
    }
}

/// Convert bare LF to CRLF.
fn to_crlf(data: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(data.len() + data.len() / 8);
    let mut prev = 0u8;
    for &b in data {
        if b == b'\n' && prev != b'\r' {
            out.extend_from_slice(b"\r");
        }
        out.extend_from_slice(&[b]);
        prev = b;
    }
    out.freeze()
}
