//! Implementation of the `tasklock serve` command.

use super::open_event_log;
use crate::cli::ServeArgs;
use crate::config::Config;
use crate::error::{Result, TaskLockError};
use crate::transport::{Dispatcher, Server};

/// Execute the `tasklock serve` command.
///
/// Resolves config (file, environment, `--listen`), opens the audit log,
/// binds the listener, and serves until interrupted with Ctrl-C.
pub fn cmd_serve(args: ServeArgs) -> Result<()> {
    let config = Config::resolve(args.config.as_deref(), args.listen.as_deref())?;
    let runtime = tokio::runtime::Runtime::new().map_err(|e| {
        TaskLockError::TransportError(format!("failed to start async runtime: {}", e))
    })?;
    runtime.block_on(serve(config))
}

async fn serve(config: Config) -> Result<()> {
    let addr = config.socket_addr()?;
    let events = open_event_log(&config)?;

    let dispatcher = Dispatcher::new(&config, events);
    let events_path = dispatcher.events().path().map(|p| p.display().to_string());
    let server = Server::bind(addr, &config, dispatcher).await?;

    println!("tasklock listening on {}", server.local_addr()?);
    println!("  max frame:    {} bytes", config.max_frame_bytes);
    println!("  outbox:       {} lines", config.outbox_capacity);
    println!(
        "  watchers:     {}",
        if config.watchers_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!("  token header: {}", config.lock_token_header);
    if let Some(path) = events_path {
        println!("  audit log:    {}", path);
    }

    // Every session is released by the time the dispatcher comes back.
    server.run_until(shutdown_signal()).await?;
    println!("tasklock stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("Warning: failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
