//! Server CLI implementation.
//!
//! Provides command-line argument parsing for the osh server, including the
//! piped-stdin argument override.

use std::ffi::OsString;
use std::io::{BufRead, IsTerminal, Read};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::mpsc;

use clap::{ArgAction, Parser, ValueEnum};
use osh_core::constants::{
    AUTHORIZED_KEY_ENV, DEFAULT_LISTEN_ADDR, DEFAULT_SERVER_ID, STDIN_ARGS_MAX,
    STDIN_ARGS_SEPARATOR, STDIN_ARGS_TIMEOUT,
};

/// Log output format for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CliLogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

impl From<CliLogFormat> for osh_core::LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => osh_core::LogFormat::Text,
            CliLogFormat::Json => osh_core::LogFormat::Json,
        }
    }
}

/// osh server - built-in command shell over SSH.
#[derive(Debug, Parser)]
#[command(
    name = "osh-server",
    version,
    about = "osh server - built-in command shell over SSH"
)]
pub struct Cli {
    /// Address to listen on
    #[arg(short = 'l', long = "listen", default_value = DEFAULT_LISTEN_ADDR)]
    pub listen: SocketAddr,

    /// OpenSSH public key allowed to log in
    #[arg(short = 'k', long = "authorized-key", env = AUTHORIZED_KEY_ENV, value_name = "KEY")]
    pub authorized_key: Option<String>,

    /// OpenSSH private host key (an ephemeral Ed25519 key is generated if omitted)
    #[arg(long = "host-key", value_name = "FILE")]
    pub host_key: Option<PathBuf>,

    /// SSH identification string sent to clients
    #[arg(long = "server-id", default_value = DEFAULT_SERVER_ID)]
    pub server_id: String,

    /// Run exec requests through the built-in commands instead of announcing them
    #[arg(long = "exec-builtins")]
    pub exec_builtins: bool,

    /// User name shown in the prompt
    #[arg(long = "prompt-user", value_name = "NAME")]
    pub prompt_user: Option<String>,

    /// Host name shown in the prompt
    #[arg(long = "prompt-host", value_name = "NAME")]
    pub prompt_host: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Log file path
    #[arg(long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Log format
    #[arg(long = "log-format", value_enum, default_value = "text")]
    pub log_format: CliLogFormat,
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 29384)),
            authorized_key: None,
            host_key: None,
            server_id: DEFAULT_SERVER_ID.to_string(),
            exec_builtins: false,
            prompt_user: None,
            prompt_host: None,
            verbose: 0,
            log_file: None,
            log_format: CliLogFormat::Text,
        }
    }
}

// =============================================================================
// Piped Arguments
// =============================================================================

/// Split a piped argument line into arguments.
///
/// Returns `None` when nothing is left after trimming.
pub fn split_piped_args(line: &str) -> Option<Vec<String>> {
    let trimmed = line.trim_matches(|c| matches!(c, '\n' | '|' | ' ' | '\t'));
    if trimmed.is_empty() {
        return None;
    }
    Some(
        trimmed
            .split(STDIN_ARGS_SEPARATOR)
            .map(str::to_string)
            .collect(),
    )
}

/// Read one line of piped arguments from stdin.
///
/// Returns `None` if stdin is a terminal, nothing arrives within the
/// timeout, or the line is blank.
pub fn read_piped_args() -> Option<Vec<String>> {
    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        return None;
    }

    let (tx, rx) = mpsc::channel();
    // The reader may stay blocked forever on a silent pipe; it is detached.
    std::thread::spawn(move || {
        let mut line = String::new();
        let limit = u64::try_from(STDIN_ARGS_MAX).unwrap_or(u64::MAX);
        let result = std::io::stdin().lock().take(limit).read_line(&mut line);
        let _ = tx.send(result.map(|_| line));
    });

    match rx.recv_timeout(STDIN_ARGS_TIMEOUT) {
        Ok(Ok(line)) => split_piped_args(&line),
        _ => None,
    }
}

/// Build the argument vector, letting piped arguments replace the real ones.
pub fn effective_args(args: Vec<OsString>, piped: Option<Vec<String>>) -> Vec<OsString> {
    match piped {
        Some(parts) => {
            let argv0 = args
                .into_iter()
                .next()
                .unwrap_or_else(|| OsString::from("osh-server"));
            std::iter::once(argv0)
                .chain(parts.into_iter().map(OsString::from))
                .collect()
        }
        None => args,
    }
}

// =============================================================================
// Tests
// =============================================================================
