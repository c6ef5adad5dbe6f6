//! `whoami`: describe the user the server runs as.

use std::io;

use nix::unistd::{Uid, User};

use super::{Command, CommandContext};

pub struct Whoami;

impl Command for Whoami {
    fn synopsis(&self) -> &'static str {
        "whoami"
    }

    fn run(&self, _args: &[String], ctx: &mut CommandContext<'_>) -> io::Result<()> {
        let uid = Uid::current();
        let user = match User::from_uid(uid) {
            Ok(Some(user)) => user,
            Ok(None) => {
                return writeln!(ctx.stderr, "Unable to determine user info: no entry for uid {}", uid);
            }
            Err(e) => return writeln!(ctx.stderr, "Unable to determine user info: {}", e),
        };

        writeln!(ctx.stdio, "Name: {}", user.gecos.to_string_lossy())?;
        writeln!(ctx.stdio, "User: {}", user.name)?;
        writeln!(ctx.stdio, "UID:  {}", user.uid)?;
        writeln!(ctx.stdio, "Home: {}", user.dir.display())?;
        writeln!(ctx.stdio, "GID:  {}", user.gid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CommandRegistry, WorkingDir};

    #[test]
    fn whoami_reports_current_uid() {
        let registry = CommandRegistry::builder().build();
        let mut stdio = Vec::new();
        let mut stderr = Vec::new();
        let mut cwd = WorkingDir::new("/");
        let mut ctx = CommandContext {
            stdio: &mut stdio,
            stderr: &mut stderr,
            registry: &registry,
            cwd: &mut cwd,
        };
        Whoami.run(&[], &mut ctx).unwrap();

        let stdio = String::from_utf8(stdio).unwrap();
        let stderr = String::from_utf8(stderr).unwrap();
        // Containers may run as a uid with no passwd entry.
        if stderr.is_empty() {
            assert!(stdio.contains(&format!("UID:  {}\n", Uid::current())));
            assert_eq!(stdio.lines().count(), 5);
        } else {
            assert!(stderr.starts_with("Unable to determine user info"));
        }
    }
}
