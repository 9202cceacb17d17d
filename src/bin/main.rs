//! Demonstration binary for `httpd-core`: CLI flag parsing, logging
//! setup, and wiring an in-memory credential store into the reactor
//! (SPEC_FULL.md §1 treats all three as external to the core library).

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use httpd_core::{
    CredentialCache, CredentialPool, DispatchModel, Error, InMemoryCredentialPool, Reactor,
    Result, ServerConfig, TriggerMode,
};
use tracing_subscriber::EnvFilter;

/// Single-host HTTP/1.1 serving core.
#[derive(Parser, Debug)]
#[command(name = "httpd-core", version, about)]
struct Cli {
    /// Port to listen on.
    #[arg(short, long, default_value_t = ServerConfig::DEFAULT_PORT)]
    port: u16,

    /// Directory static files and the login/register pages are served from.
    #[arg(short = 'r', long, default_value = "./www")]
    document_root: PathBuf,

    /// Default to `Connection: keep-alive` when a request doesn't ask for it.
    #[arg(long, default_value_t = true)]
    keep_alive: bool,

    /// Readiness trigger mode: 0=both level, 1=both edge, 2=listen
    /// level/client edge, 3=listen edge/client level.
    #[arg(short = 't', long, default_value_t = 0)]
    trigger_mode: u8,

    /// Number of worker threads.
    #[arg(short = 'w', long, default_value_t = ServerConfig::DEFAULT_WORKER_COUNT)]
    workers: usize,

    /// Maximum number of connections queued for worker pickup.
    #[arg(long, default_value_t = ServerConfig::DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Dispatch model: 0=proactor (reactor reads, worker parses+writes),
    /// 1=reactor (worker performs the read or write itself).
    #[arg(short = 'm', long, default_value_t = 0)]
    dispatch_model: u8,

    /// Idle-connection timeout, in seconds.
    #[arg(long, default_value_t = ServerConfig::DEFAULT_IDLE_TIMEOUT_SECS)]
    idle_timeout_secs: u64,

    /// Tracing filter, e.g. `info`, `httpd_core=debug`.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig {
        port: cli.port,
        document_root: cli.document_root,
        keep_alive_default: cli.keep_alive,
        trigger_mode: TriggerMode::from_u8(cli.trigger_mode)?,
        worker_count: cli.workers,
        queue_capacity: cli.queue_capacity,
        dispatch_model: DispatchModel::from_u8(cli.dispatch_model)?,
        idle_timeout: std::time::Duration::from_secs(cli.idle_timeout_secs),
    };

    // Stands in for the external persistent store (SPEC_FULL.md §6); a
    // real deployment supplies its own `CredentialPool` backed by the
    // relational store this core never speaks to directly.
    let store: Arc<dyn CredentialPool> =
        Arc::new(InMemoryCredentialPool::new(std::collections::HashMap::new()));
    let credentials = CredentialCache::load(store.as_ref())
        .map_err(|e| Error::Config(format!("loading credential snapshot: {e}")))?;

    let mut reactor = Reactor::new(config, credentials, store)?;
    reactor.run()
}
