//! Prompt generation.
//!
//! The prompt reads `[user@host:/current/dir]$ `. The `[user@host:` head is
//! cached and rebuilt whenever the identity changes; the tail is chosen once
//! from the privilege level of the server process.

use std::io;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use nix::unistd::{Uid, User};
use tracing::debug;

use osh_core::constants::{PROMPT_TAIL_ROOT, PROMPT_TAIL_USER, UNKNOWN_HOST};

/// Prompt state shared by every session of the process.
pub type SharedPrompt = Arc<RwLock<PromptContext>>;

/// Cached prompt identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    user: String,
    host: String,
    head: String,
    tail: &'static str,
}

impl PromptContext {
    /// Build a context for an explicit identity.
    pub fn new(user: impl Into<String>, host: impl Into<String>, privileged: bool) -> Self {
        let mut ctx = Self {
            user: user.into(),
            host: host.into(),
            head: String::new(),
            tail: if privileged {
                PROMPT_TAIL_ROOT
            } else {
                PROMPT_TAIL_USER
            },
        };
        ctx.regenerate();
        ctx
    }

    /// Build a context from the identity of the server process.
    ///
    /// The user name falls back to the numeric uid and the host name to a
    /// placeholder when they cannot be looked up.
    pub fn from_process() -> Self {
        let uid = Uid::current();
        let user = match User::from_uid(uid) {
            Ok(Some(user)) => user.name,
            other => {
                debug!(?other, "unable to get username for prompt");
                uid.to_string()
            }
        };
        let host = match nix::unistd::gethostname() {
            Ok(host) => host.to_string_lossy().into_owned(),
            Err(e) => {
                debug!(error = %e, "unable to get hostname for prompt");
                UNKNOWN_HOST.to_string()
            }
        };
        Self::new(user, host, uid.is_root())
    }

    pub fn shared(self) -> SharedPrompt {
        Arc::new(RwLock::new(self))
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn set_user(&mut self, user: impl Into<String>) {
        self.user = user.into();
        self.regenerate();
    }

    pub fn set_host(&mut self, host: impl Into<String>) {
        self.host = host.into();
        self.regenerate();
    }

    /// Compose the prompt for `cwd`.
    ///
    /// If the directory cannot be resolved the error text takes its place.
    pub fn render(&self, cwd: io::Result<PathBuf>) -> String {
        let dir = match cwd {
            Ok(path) => path.display().to_string(),
            Err(e) => e.to_string(),
        };
        format!("{}{}{}", self.head, dir, self.tail)
    }

    fn regenerate(&mut self) {
        self.head = format!("[{}@{}:", self.user, self.host);
    }
}
