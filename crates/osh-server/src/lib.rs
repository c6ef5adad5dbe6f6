//! osh-server: Built-in command shell served over SSH.
//!
//! Provides:
//! - Command registry and the `cd`, `help`, `ls`, `whoami` built-ins
//! - Prompt generation and terminal line editing
//! - Session, channel and global request handling
//! - The russh-backed SSH transport

pub mod cli;
pub mod commands;
pub mod connection;
pub mod exec;
pub mod prompt;
pub mod session;
pub mod ssh;
pub mod terminal;

pub use cli::Cli;
pub use commands::{CommandRegistry, WorkingDir};
pub use connection::{ServerContext, serve_connection};
pub use prompt::{PromptContext, SharedPrompt};
pub use session::run_session;
