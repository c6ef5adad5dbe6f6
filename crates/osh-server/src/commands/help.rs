//! `help`: list command synopses.

use std::io;

use super::{Command, CommandContext};

pub struct Help;

impl Command for Help {
    fn synopsis(&self) -> &'static str {
        "help [command...]"
    }

    fn run(&self, args: &[String], ctx: &mut CommandContext<'_>) -> io::Result<()> {
        if args.is_empty() {
            writeln!(ctx.stdio, "Defined commands:\n")?;
            for (_, synopsis) in ctx.registry.synopses() {
                writeln!(ctx.stdio, "{}", synopsis)?;
            }
            return Ok(());
        }

        for name in args {
            match ctx.registry.get(name) {
                Some(command) => writeln!(ctx.stdio, "{}", command.synopsis())?,
                None => writeln!(ctx.stderr, "Command {:?} unhelpfully unknown", name)?,
            }
        }
        Ok(())
    }
}
