//! Built-in commands.
//!
//! A command is a named handler with two behaviors: describing itself with a
//! one-line synopsis, and running against a set of arguments with two output
//! streams. Commands never see the channel directly; the dispatcher hands
//! them buffered writers and flushes those through the terminal adapter.

mod cd;
mod help;
mod ls;
mod registry;
mod whoami;

use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub use cd::Cd;
pub use help::Help;
pub use ls::Ls;
pub use registry::{CommandRegistry, DispatchOutcome, RegistryBuilder};
pub use whoami::Whoami;

/// A built-in command.
pub trait Command: Send + Sync {
    /// One-line synopsis.
    ///
    /// Must be non-empty and must not have side effects.
    fn synopsis(&self) -> &'static str;

    /// Run the command.
    ///
    /// Write failures may be returned but the dispatcher does not act on
    /// them beyond logging.
    fn run(&self, args: &[String], ctx: &mut CommandContext<'_>) -> io::Result<()>;
}

/// Streams and session state handed to a running command.
pub struct CommandContext<'a> {
    /// Combined input/output stream.
    pub stdio: &'a mut dyn Write,
    /// Diagnostic stream.
    pub stderr: &'a mut dyn Write,
    /// Registry the command was dispatched from.
    pub registry: &'a CommandRegistry,
    /// Working directory of the calling session.
    pub cwd: &'a mut WorkingDir,
}

/// Per-session working directory.
///
/// Relative paths given to commands resolve against this value instead of
/// the process working directory, so sessions never observe each other's
/// `cd`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkingDir {
    path: PathBuf,
}

impl WorkingDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Seed from the process working directory, falling back to `/`.
    pub fn from_process() -> Self {
        match std::env::current_dir() {
            Ok(path) => Self::new(path),
            Err(e) => {
                tracing::warn!(error = %e, "process working directory unavailable, using /");
                Self::new("/")
            }
        }
    }

    /// Stored path, without checking that it still exists.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current directory, failing if it no longer exists.
    pub fn current(&self) -> io::Result<PathBuf> {
        std::fs::metadata(&self.path)?;
        Ok(self.path.clone())
    }

    /// Resolve `target` against this directory.
    pub fn resolve(&self, target: impl AsRef<Path>) -> PathBuf {
        self.path.join(target)
    }

    /// Change to `target`, which must name an existing directory.
    pub fn change(&mut self, target: &str) -> io::Result<()> {
        let path = std::fs::canonicalize(self.resolve(target))?;
        if !path.is_dir() {
            return Err(io::Error::other(format!("{}: not a directory", target)));
        }
        self.path = path;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn working_dir_change_relative_and_absolute() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        let root = std::fs::canonicalize(tmp.path()).unwrap();

        let mut cwd = WorkingDir::new(&root);
        cwd.change("sub").unwrap();
        assert_eq!(cwd.path(), root.join("sub"));

        cwd.change("..").unwrap();
        assert_eq!(cwd.path(), root);

        cwd.change(root.join("sub").to_str().unwrap()).unwrap();
        assert_eq!(cwd.path(), root.join("sub"));
    }

    #[test]
    fn working_dir_change_rejects_missing_and_files() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("file"), b"x").unwrap();

        let mut cwd = WorkingDir::new(tmp.path());
        assert!(cwd.change("missing").is_err());
        assert!(cwd.change("file").is_err());
        assert_eq!(cwd.path(), tmp.path());
    }

    #[test]
    fn working_dir_current_fails_after_removal() {
        let tmp = tempfile::tempdir().unwrap();
        let gone = tmp.path().join("gone");
        std::fs::create_dir(&gone).unwrap();

        let cwd = WorkingDir::new(&gone);
        assert!(cwd.current().is_ok());
        std::fs::remove_dir(&gone).unwrap();
        assert!(cwd.current().is_err());
    }
}
