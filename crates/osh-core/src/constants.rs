//! Protocol and configuration constants for osh.

use std::time::Duration;

// =============================================================================
// Server Defaults
// =============================================================================

/// Default listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:29384";

/// SSH identification string presented to clients.
pub const DEFAULT_SERVER_ID: &str = "SSH-2.0-OpenSSH_7.0";

/// Environment variable enabling diagnostic logging.
pub const DEBUG_ENV: &str = "DEBUG";

/// Environment variable holding the allow-listed public key.
pub const AUTHORIZED_KEY_ENV: &str = "OSH_AUTHORIZED_KEY";

/// How long to wait for piped arguments on stdin at startup.
pub const STDIN_ARGS_TIMEOUT: Duration = Duration::from_secs(1);

/// Maximum number of bytes of piped arguments read from stdin.
pub const STDIN_ARGS_MAX: usize = 65536;

/// Separator between piped arguments.
pub const STDIN_ARGS_SEPARATOR: char = '|';

/// Delay before answering a rejected authentication attempt.
pub const AUTH_REJECTION_TIME: Duration = Duration::from_secs(1);

// =============================================================================
// Channel and Request Names
// =============================================================================

/// The only channel type the server accepts.
pub const SESSION_CHANNEL: &str = "session";

/// Message sent when refusing a channel of an unsupported type.
pub const UNKNOWN_CHANNEL_MESSAGE: &str = "unknown channel type";

/// Pseudo-terminal negotiation request.
pub const REQ_PTY: &str = "pty-req";

/// Interactive shell request.
pub const REQ_SHELL: &str = "shell";

/// One-shot command request.
pub const REQ_EXEC: &str = "exec";

/// Terminal resize notification.
pub const REQ_WINDOW_CHANGE: &str = "window-change";

/// Environment variable request.
pub const REQ_ENV: &str = "env";

/// Subsystem request.
pub const REQ_SUBSYSTEM: &str = "subsystem";

/// Signal delivery request.
pub const REQ_SIGNAL: &str = "signal";

/// Outbound exit status notification.
pub const REQ_EXIT_STATUS: &str = "exit-status";

/// Client hint that no further session channels will be opened.
pub const REQ_NO_MORE_SESSIONS: &str = "no-more-sessions@openssh.com";

/// Remote port forward request.
pub const REQ_TCPIP_FORWARD: &str = "tcpip-forward";

/// Remote port forward cancellation.
pub const REQ_CANCEL_TCPIP_FORWARD: &str = "cancel-tcpip-forward";

// =============================================================================
// Shell Constants
// =============================================================================

/// Input lines that end an interactive session.
pub const EXIT_ALIASES: &[&str] = &["exit", "quit", "bye"];

/// Prefix marking an input line as a comment.
pub const COMMENT_PREFIX: char = '#';

/// Prompt tail for a privileged server process.
pub const PROMPT_TAIL_ROOT: &str = "]# ";

/// Prompt tail for an unprivileged server process.
pub const PROMPT_TAIL_USER: &str = "]$ ";

/// Hostname shown when the real one cannot be determined.
pub const UNKNOWN_HOST: &str = "<unknown>";

/// Maximum number of remembered input lines per terminal.
pub const HISTORY_LIMIT: usize = 100;

/// Extended data type code for stderr.
pub const EXTENDED_DATA_STDERR: u32 = 1;

/// Exit status for a session that ended cleanly.
pub const EXIT_OK: u32 = 0;

/// Exit status for a session whose input failed.
pub const EXIT_READ_ERROR: u32 = 1;

/// Exit status for an exec line that could not be tokenized.
pub const EXIT_UNPARSEABLE: u32 = 2;

/// Exit status for an exec line naming an unknown command.
pub const EXIT_NOT_FOUND: u32 = 127;

// =============================================================================
// Stream Sizing
// =============================================================================

/// Buffered requests per channel or connection request stream.
pub const REQUEST_QUEUE_DEPTH: usize = 16;

/// Buffered channel-open notifications per connection.
pub const CHANNEL_OPEN_QUEUE_DEPTH: usize = 8;

/// Buffered input chunks per channel; input beyond this is discarded.
pub const INPUT_QUEUE_DEPTH: usize = 64;
