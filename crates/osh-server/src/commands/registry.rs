//! Command registry and line dispatcher.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use tracing::debug;

use osh_core::constants::{COMMENT_PREFIX, EXIT_ALIASES};
use osh_core::error::{Error, Result};

use super::{Cd, Command, CommandContext, Help, Ls, WorkingDir, Whoami};

/// Registration phase of a [`CommandRegistry`].
///
/// Holding the builder by `&mut` is the only way to add commands, so
/// registration is single-writer. [`RegistryBuilder::build`] freezes the
/// table for serving.
#[derive(Default)]
pub struct RegistryBuilder {
    commands: BTreeMap<String, Arc<dyn Command>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `command` under `name`.
    ///
    /// Fails with [`Error::DuplicateRegistration`] if the name is taken.
    pub fn register(&mut self, name: &str, command: impl Command + 'static) -> Result<&mut Self> {
        if self.commands.contains_key(name) {
            return Err(Error::DuplicateRegistration(name.to_string()));
        }
        self.commands.insert(name.to_string(), Arc::new(command));
        Ok(self)
    }

    pub fn build(self) -> CommandRegistry {
        CommandRegistry {
            commands: self.commands,
        }
    }
}

/// Result of dispatching one input line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// The first token named no registered command.
    pub unfound: bool,
    /// The line could not be tokenized.
    pub unparseable: bool,
    /// The line was an exit alias.
    pub exit: bool,
}

/// Immutable name to command table.
pub struct CommandRegistry {
    commands: BTreeMap<String, Arc<dyn Command>>,
}

impl CommandRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// Registry holding `cd`, `help`, `ls` and `whoami`.
    pub fn with_builtins() -> Result<Self> {
        let mut builder = Self::builder();
        builder
            .register("cd", Cd)?
            .register("help", Help)?
            .register("ls", Ls)?
            .register("whoami", Whoami)?;
        Ok(builder.build())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Command>> {
        self.commands.get(name)
    }

    /// Registered names in lexicographic order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    /// `(name, synopsis)` pairs in lexicographic name order.
    pub fn synopses(&self) -> impl Iterator<Item = (&str, &'static str)> {
        self.commands
            .iter()
            .map(|(name, command)| (name.as_str(), command.synopsis()))
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Tokenize `line` and run the command it names.
    ///
    /// Blank and comment lines are ignored. Quoting errors are reported on
    /// `stderr`, unknown commands on `stdio`. Exit aliases are recognized
    /// before any lookup.
    pub fn dispatch(
        &self,
        line: &str,
        stdio: &mut dyn Write,
        stderr: &mut dyn Write,
        cwd: &mut WorkingDir,
    ) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        let line = line.trim();
        if line.is_empty() || line.starts_with(COMMENT_PREFIX) {
            return outcome;
        }

        let Some(parts) = shlex::split(line) else {
            let err = Error::CommandParse {
                line: line.to_string(),
            };
            let _ = writeln!(stderr, "{}", err);
            outcome.unparseable = true;
            return outcome;
        };
        debug!(?parts, "dispatching");

        let Some((name, args)) = parts.split_first() else {
            return outcome;
        };

        if EXIT_ALIASES.contains(&name.as_str()) {
            outcome.exit = true;
            return outcome;
        }

        let Some(command) = self.get(name) else {
            let _ = writeln!(stdio, "{}", Error::CommandNotFound(name.clone()));
            outcome.unfound = true;
            return outcome;
        };

        let mut ctx = CommandContext {
            stdio,
            stderr,
            registry: self,
            cwd,
        };
        if let Err(e) = command.run(args, &mut ctx) {
            debug!(command = %name, error = %e, "command output failed");
        }
        outcome
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.commands.keys().collect::<Vec<_>>())
            .finish()
    }
}
