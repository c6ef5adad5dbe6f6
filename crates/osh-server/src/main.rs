//! osh server binary entry point.
//!
//! Built-in command shell over SSH.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info};

use osh_server::cli::{effective_args, read_piped_args};
use osh_server::ssh::{AuthorizedKey, load_host_key, server_config};
use osh_server::{Cli, CommandRegistry, PromptContext, ServerContext};

/// Exit code for configuration errors.
const EXIT_CONFIG: i32 = 1;
/// Exit code when the listen address cannot be bound.
const EXIT_LISTEN: i32 = 2;
/// Exit code when accepting connections fails.
const EXIT_ACCEPT: i32 = 3;

fn main() {
    let args = effective_args(std::env::args_os().collect(), read_piped_args());
    let cli = Cli::parse_from(args);

    let log_format = cli.log_format.into();
    if let Err(e) = osh_core::init_logging(cli.verbose, cli.log_file.as_deref(), log_format) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(EXIT_CONFIG);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "osh-server starting");

    let code = match run(cli) {
        Ok(()) => 0,
        Err(code) => code,
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> Result<(), i32> {
    let Some(key_line) = cli.authorized_key.as_deref() else {
        error!("no authorized key configured; use --authorized-key or OSH_AUTHORIZED_KEY");
        return Err(EXIT_CONFIG);
    };
    let authorized = AuthorizedKey::parse(key_line).map_err(|e| {
        error!(error = %e, "invalid authorized key");
        EXIT_CONFIG
    })?;
    info!(fingerprint = authorized.fingerprint(), "authorized key loaded");

    let host_key = load_host_key(cli.host_key.as_deref()).map_err(|e| {
        error!(error = %e, "host key unavailable");
        EXIT_CONFIG
    })?;
    let config = Arc::new(server_config(host_key, &cli.server_id));

    let registry = CommandRegistry::with_builtins().map_err(|e| {
        error!(error = %e, "unable to register built-in commands");
        EXIT_CONFIG
    })?;

    let mut prompt = PromptContext::from_process();
    if let Some(user) = &cli.prompt_user {
        prompt.set_user(user.as_str());
    }
    if let Some(host) = &cli.prompt_host {
        prompt.set_host(host.as_str());
    }
    info!(user = prompt.user(), host = prompt.host(), "prompt identity");

    let ctx = ServerContext::new(Arc::new(registry), prompt.shared(), cli.exec_builtins);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| {
            error!(error = %e, "unable to start async runtime");
            EXIT_CONFIG
        })?;

    runtime.block_on(async move {
        let listener = TcpListener::bind(cli.listen).await.map_err(|e| {
            error!(addr = %cli.listen, error = %e, "unable to listen");
            EXIT_LISTEN
        })?;
        let addr = listener.local_addr().unwrap_or(cli.listen);
        info!(addr = %addr, server_id = %cli.server_id, "listening");

        osh_server::ssh::serve(listener, config, authorized, ctx)
            .await
            .map_err(|e| {
                error!(error = %e, "unable to accept connection");
                EXIT_ACCEPT
            })
    })
}
