//! Typed views of control-message payloads.
//!
//! Every type decodes from, and encodes to, the SSH wire layout using the
//! payload codec, so a request built by a transport adapter round-trips
//! through exactly the bytes a real client would send.

use std::fmt;

use bytes::{Bytes, BytesMut};

use crate::constants::{
    REQ_CANCEL_TCPIP_FORWARD, REQ_ENV, REQ_EXEC, REQ_EXIT_STATUS, REQ_NO_MORE_SESSIONS, REQ_PTY,
    REQ_SHELL, REQ_SIGNAL, REQ_SUBSYSTEM, REQ_TCPIP_FORWARD, REQ_WINDOW_CHANGE,
};
use crate::error::Result;
use crate::protocol::codec::{put_string, put_u32, read_bytes, read_string, read_u32};

// =============================================================================
// Request Kinds
// =============================================================================

/// Known request type tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestKind {
    Pty,
    Shell,
    Exec,
    WindowChange,
    Env,
    Subsystem,
    Signal,
    ExitStatus,
    NoMoreSessions,
    TcpipForward,
    CancelTcpipForward,
    /// Any type tag this server has no name for.
    Other(String),
}

impl RequestKind {
    /// Classify a request type tag.
    pub fn parse(tag: &str) -> Self {
        match tag {
            REQ_PTY => RequestKind::Pty,
            REQ_SHELL => RequestKind::Shell,
            REQ_EXEC => RequestKind::Exec,
            REQ_WINDOW_CHANGE => RequestKind::WindowChange,
            REQ_ENV => RequestKind::Env,
            REQ_SUBSYSTEM => RequestKind::Subsystem,
            REQ_SIGNAL => RequestKind::Signal,
            REQ_EXIT_STATUS => RequestKind::ExitStatus,
            REQ_NO_MORE_SESSIONS => RequestKind::NoMoreSessions,
            REQ_TCPIP_FORWARD => RequestKind::TcpipForward,
            REQ_CANCEL_TCPIP_FORWARD => RequestKind::CancelTcpipForward,
            other => RequestKind::Other(other.to_string()),
        }
    }

    /// The wire type tag.
    pub fn as_str(&self) -> &str {
        match self {
            RequestKind::Pty => REQ_PTY,
            RequestKind::Shell => REQ_SHELL,
            RequestKind::Exec => REQ_EXEC,
            RequestKind::WindowChange => REQ_WINDOW_CHANGE,
            RequestKind::Env => REQ_ENV,
            RequestKind::Subsystem => REQ_SUBSYSTEM,
            RequestKind::Signal => REQ_SIGNAL,
            RequestKind::ExitStatus => REQ_EXIT_STATUS,
            RequestKind::NoMoreSessions => REQ_NO_MORE_SESSIONS,
            RequestKind::TcpipForward => REQ_TCPIP_FORWARD,
            RequestKind::CancelTcpipForward => REQ_CANCEL_TCPIP_FORWARD,
            RequestKind::Other(tag) => tag,
        }
    }

    /// Requests acknowledged with success but otherwise ignored.
    ///
    /// Terminal resizes and environment variables only decorate a session;
    /// refusing them makes some clients print warnings.
    pub fn is_cosmetic(&self) -> bool {
        matches!(self, RequestKind::WindowChange | RequestKind::Env)
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Channel Request Payloads
// =============================================================================

/// `pty-req` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyRequest {
    /// TERM value requested by the client.
    pub term: String,
    /// Width in characters.
    pub cols: u32,
    /// Height in characters.
    pub rows: u32,
    /// Width in pixels (0 when absent).
    pub pixel_width: u32,
    /// Height in pixels (0 when absent).
    pub pixel_height: u32,
    /// Encoded terminal modes, kept opaque.
    pub modes: Bytes,
}

impl PtyRequest {
    /// Build a request with no pixel sizes or modes.
    pub fn new(term: impl Into<String>, cols: u32, rows: u32) -> Self {
        Self {
            term: term.into(),
            cols,
            rows,
            pixel_width: 0,
            pixel_height: 0,
            modes: Bytes::new(),
        }
    }

    /// Decode a `pty-req` payload.
    ///
    /// Terminal type, width and height are required. Pixel sizes and the
    /// mode string are read when present.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let (term, rest) = read_string(payload)?;
        let (cols, rest) = read_u32(rest)?;
        let (rows, rest) = read_u32(rest)?;

        let mut req = Self::new(term, cols, rows);
        if let Ok((pixel_width, rest)) = read_u32(rest) {
            req.pixel_width = pixel_width;
            if let Ok((pixel_height, rest)) = read_u32(rest) {
                req.pixel_height = pixel_height;
                if let Ok((modes, _)) = read_bytes(rest) {
                    req.modes = Bytes::copy_from_slice(modes);
                }
            }
        }
        Ok(req)
    }

    /// Encode to the wire layout.
    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        put_string(&mut buf, &self.term);
        put_u32(&mut buf, self.cols);
        put_u32(&mut buf, self.rows);
        put_u32(&mut buf, self.pixel_width);
        put_u32(&mut buf, self.pixel_height);
        put_string(&mut buf, &self.modes);
        buf.freeze()
    }

    /// Whether both character dimensions are usable.
    pub fn has_size(&self) -> bool {
        self.cols != 0 && self.rows != 0
    }
}

/// `exec` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    pub command: String,
}

impl ExecRequest {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let (command, _) = read_string(payload)?;
        Ok(Self { command })
    }

    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        put_string(&mut buf, &self.command);
        buf.freeze()
    }
}

/// `window-change` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowChange {
    pub cols: u32,
    pub rows: u32,
    pub pixel_width: u32,
    pub pixel_height: u32,
}

impl WindowChange {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let (cols, rest) = read_u32(payload)?;
        let (rows, rest) = read_u32(rest)?;
        let (pixel_width, rest) = read_u32(rest)?;
        let (pixel_height, _) = read_u32(rest)?;
        Ok(Self {
            cols,
            rows,
            pixel_width,
            pixel_height,
        })
    }

    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(16);
        put_u32(&mut buf, self.cols);
        put_u32(&mut buf, self.rows);
        put_u32(&mut buf, self.pixel_width);
        put_u32(&mut buf, self.pixel_height);
        buf.freeze()
    }
}

/// `env` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvRequest {
    pub name: String,
    pub value: String,
}

impl EnvRequest {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let (name, rest) = read_string(payload)?;
        let (value, _) = read_string(rest)?;
        Ok(Self { name, value })
    }

    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        put_string(&mut buf, &self.name);
        put_string(&mut buf, &self.value);
        buf.freeze()
    }
}

/// Payload carrying a single name: `subsystem` and `signal`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedRequest {
    pub name: String,
}

impl NamedRequest {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let (name, _) = read_string(payload)?;
        Ok(Self { name })
    }

    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        put_string(&mut buf, &self.name);
        buf.freeze()
    }
}

/// Outbound `exit-status` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus(pub u32);

impl ExitStatus {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let (status, _) = read_u32(payload)?;
        Ok(Self(status))
    }

    /// Encode as a 4-byte big-endian unsigned integer.
    pub fn to_payload(self) -> Bytes {
        Bytes::copy_from_slice(&self.0.to_be_bytes())
    }
}

// =============================================================================
// Global Request Payloads
// =============================================================================

/// `tcpip-forward` / `cancel-tcpip-forward` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpipForward {
    pub address: String,
    pub port: u32,
}

impl TcpipForward {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let (address, rest) = read_string(payload)?;
        let (port, _) = read_u32(rest)?;
        Ok(Self { address, port })
    }

    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::new();
        put_string(&mut buf, &self.address);
        put_u32(&mut buf, self.port);
        buf.freeze()
    }
}

// =============================================================================
// Channel Open Rejection
// =============================================================================

/// Standard channel-open failure reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RejectReason {
    AdministrativelyProhibited = 1,
    ConnectFailed = 2,
    UnknownChannelType = 3,
    ResourceShortage = 4,
}

impl RejectReason {
    /// Numeric code on the wire.
    pub fn code(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RejectReason::AdministrativelyProhibited => "administratively prohibited",
            RejectReason::ConnectFailed => "connect failed",
            RejectReason::UnknownChannelType => "unknown channel type",
            RejectReason::ResourceShortage => "resource shortage",
        };
        f.write_str(name)
    }
}
