//! `ls`: list a directory.

use std::fs::{self, Metadata};
use std::io;
use std::os::unix::fs::PermissionsExt;

use clap::Parser;

use super::{Command, CommandContext};

pub struct Ls;

/// Prints the contents of the given directory, or the current directory if
/// no directory is given.
#[derive(Debug, Parser)]
#[command(name = "ls", no_binary_name = true, disable_version_flag = true)]
struct LsArgs {
    /// Long-format listing
    #[arg(short = 'l')]
    long: bool,

    /// Directory to list
    directory: Option<String>,
}

impl Command for Ls {
    fn synopsis(&self) -> &'static str {
        "ls [-h] [-l] [directory]"
    }

    fn run(&self, args: &[String], ctx: &mut CommandContext<'_>) -> io::Result<()> {
        let args = match LsArgs::try_parse_from(args) {
            Ok(args) => args,
            Err(e) => return write!(ctx.stderr, "{}", e.render()),
        };

        let dir = match &args.directory {
            Some(dir) => ctx.cwd.resolve(dir),
            None => ctx.cwd.path().to_path_buf(),
        };
        let entries = match read_sorted(&dir) {
            Ok(entries) => entries,
            Err(e) => return writeln!(ctx.stderr, "ls {}: {}", dir.display(), e),
        };

        for (name, meta) in entries {
            if args.long {
                writeln!(
                    ctx.stdio,
                    "{} {:>10} {}",
                    mode_string(&meta),
                    meta.len(),
                    name
                )?;
            } else {
                writeln!(ctx.stdio, "{}", name)?;
            }
        }
        Ok(())
    }
}

fn read_sorted(dir: &std::path::Path) -> io::Result<Vec<(String, Metadata)>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        // Entries removed mid-listing are skipped.
        let Ok(meta) = fs::symlink_metadata(entry.path()) else {
            continue;
        };
        entries.push((entry.file_name().to_string_lossy().into_owned(), meta));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}

/// `drwxr-xr-x` style rendering of a file's type and permission bits.
fn mode_string(meta: &Metadata) -> String {
    let file_type = meta.file_type();
    let kind = if file_type.is_dir() {
        'd'
    } else if file_type.is_symlink() {
        'l'
    } else {
        '-'
    };

    let mode = meta.permissions().mode();
    let mut out = String::with_capacity(10);
    out.push(kind);
    for shift in [6, 3, 0] {
        let bits = (mode >> shift) & 0o7;
        out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
        out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
        out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
    }
    out
}
