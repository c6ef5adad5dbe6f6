//! Shared server state handed to every connection.

use std::fmt;
use std::sync::Arc;

use crate::commands::CommandRegistry;
use crate::exec::{AnnounceExecutor, BuiltinExecutor, Executor};
use crate::prompt::SharedPrompt;

/// Process-wide state used by every session.
#[derive(Clone)]
pub struct ServerContext {
    /// Built-in commands, frozen before the first connection is accepted.
    pub registry: Arc<CommandRegistry>,
    pub prompt: SharedPrompt,
    /// Handler for `exec` requests.
    pub executor: Arc<dyn Executor>,
}

impl ServerContext {
    /// Build a context. `exec_builtins` selects [`BuiltinExecutor`] over
    /// [`AnnounceExecutor`].
    pub fn new(registry: Arc<CommandRegistry>, prompt: SharedPrompt, exec_builtins: bool) -> Self {
        let executor: Arc<dyn Executor> = if exec_builtins {
            Arc::new(BuiltinExecutor::new(registry.clone()))
        } else {
            Arc::new(AnnounceExecutor)
        };
        Self {
            registry,
            prompt,
            executor,
        }
    }
}

impl fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerContext")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
