//! One-shot command execution for `exec` requests.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use osh_core::constants::{EXIT_NOT_FOUND, EXIT_OK, EXIT_UNPARSEABLE};

use crate::commands::{CommandRegistry, WorkingDir};
use crate::terminal::LineIo;

/// Runs the command line of an `exec` request and yields its exit status.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, command: &str, io: &mut LineIo, cwd: &mut WorkingDir) -> u32;
}

/// Acknowledges the command without running anything.
#[derive(Debug, Default)]
pub struct AnnounceExecutor;

#[async_trait]
impl Executor for AnnounceExecutor {
    async fn execute(&self, command: &str, io: &mut LineIo, _cwd: &mut WorkingDir) -> u32 {
        debug!(command, "announcing exec");
        let message = format!("Executing {:?}\n", command);
        if let Err(e) = io.write(message.as_bytes()).await {
            debug!(error = %e, "exec announcement not delivered");
        }
        EXIT_OK
    }
}

/// Runs the command line once through the built-in dispatcher.
pub struct BuiltinExecutor {
    registry: Arc<CommandRegistry>,
}

impl BuiltinExecutor {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Executor for BuiltinExecutor {
    async fn execute(&self, command: &str, io: &mut LineIo, cwd: &mut WorkingDir) -> u32 {
        let mut stdio = Vec::new();
        let mut stderr = Vec::new();
        let outcome = self.registry.dispatch(command, &mut stdio, &mut stderr, cwd);

        if let Err(e) = io.write(&stdio).await {
            warn!(error = %e, "exec output not delivered");
        }
        if let Err(e) = io.write_stderr(&stderr).await {
            warn!(error = %e, "exec diagnostics not delivered");
        }

        if outcome.unparseable {
            EXIT_UNPARSEABLE
        } else if outcome.unfound {
            EXIT_NOT_FOUND
        } else {
            EXIT_OK
        }
    }
}
