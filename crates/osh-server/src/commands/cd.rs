//! `cd`: change the session working directory.

use std::io;

use super::{Command, CommandContext};

pub struct Cd;

impl Command for Cd {
    fn synopsis(&self) -> &'static str {
        "cd <directory>"
    }

    fn run(&self, args: &[String], ctx: &mut CommandContext<'_>) -> io::Result<()> {
        let Some(target) = args.first() else {
            return writeln!(ctx.stderr, "Usage: {}", self.synopsis());
        };
        if let Err(e) = ctx.cwd.change(target) {
            writeln!(ctx.stderr, "cd {}: {}", target, e)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{CommandRegistry, WorkingDir};

    fn run_cd(args: &[&str], cwd: &mut WorkingDir) -> String {
        let registry = CommandRegistry::builder().build();
        let mut stdio = Vec::new();
        let mut stderr = Vec::new();
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let mut ctx = CommandContext {
            stdio: &mut stdio,
            stderr: &mut stderr,
            registry: &registry,
            cwd,
        };
        Cd.run(&args, &mut ctx).unwrap();
        assert!(stdio.is_empty());
        String::from_utf8(stderr).unwrap()
    }

    #[test]
    fn cd_without_argument_prints_usage() {
        let mut cwd = WorkingDir::new("/");
        assert_eq!(run_cd(&[], &mut cwd), "Usage: cd <directory>\n");
        assert_eq!(cwd.path(), std::path::Path::new("/"));
    }

    #[test]
    fn cd_into_subdirectory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("inner")).unwrap();
        let root = std::fs::canonicalize(tmp.path()).unwrap();

        let mut cwd = WorkingDir::new(&root);
        assert_eq!(run_cd(&["inner"], &mut cwd), "");
        assert_eq!(cwd.path(), root.join("inner"));
    }

    #[test]
    fn cd_to_missing_directory_reports_error() {
        let tmp = tempfile::tempdir().unwrap();
        let mut cwd = WorkingDir::new(tmp.path());
        let err = run_cd(&["nope"], &mut cwd);
        assert!(err.starts_with("cd nope: "), "{err}");
        assert_eq!(cwd.path(), tmp.path());
    }
}
