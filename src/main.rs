#![forbid(unsafe_code)]

//! `acp-mux` binary.
//!
//! Speaks ACP to one editor over stdin/stdout and spawns one agent process
//! per session. Diagnostics go to stderr.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use acp_mux::acp::spawner::ProcessSpawner;
use acp_mux::output::OutputSequencer;
use acp_mux::workspace::MappedWorkspaceResolver;
use acp_mux::{AppError, Dispatcher, DispatcherSettings, ProxyConfig, Result};

/// Bound on runtime teardown once `run` has returned; the blocking stdin
/// reader may still be parked in a read.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "acp-mux", about = "Multi-session ACP proxy", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Agent to spawn for every session (overrides `default_agent`).
    #[arg(long)]
    agent: Option<String>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Working directory used when `session/new` carries no `cwd`.
    #[arg(long)]
    workspace: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!(version = env!("CARGO_PKG_VERSION"), "acp-mux starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?;
    let outcome = runtime.block_on(run(args));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);

    if let Err(err) = &outcome {
        error!(%err, "acp-mux exiting on fatal error");
    }
    outcome
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = match &args.config {
        Some(path) => ProxyConfig::load_from_path(path)?,
        None => ProxyConfig::default(),
    };

    let agent_name = args
        .agent
        .clone()
        .or_else(|| config.default_agent.clone())
        .ok_or_else(|| {
            AppError::Config("no agent selected: pass --agent or set default_agent".into())
        })?;

    let default_cwd = match args.workspace {
        Some(ws) => ws
            .canonicalize()
            .map_err(|err| AppError::Config(format!("invalid workspace override: {err}")))?,
        None => std::env::current_dir()?,
    };
    info!(agent = agent_name.as_str(), cwd = %default_cwd.display(), "configuration loaded");

    // ── Wire the proxy ──────────────────────────────────
    let shutdown = CancellationToken::new();
    let (output, sequencer) = OutputSequencer::spawn(tokio::io::stdout(), shutdown.clone());

    let settings = DispatcherSettings {
        agent_name,
        default_cwd,
        server_name: config.server_name.clone(),
        timeouts: config.timeouts(),
    };
    let dispatcher = Dispatcher::new(
        settings,
        Arc::new(ProcessSpawner::new(config.agents)),
        Arc::new(MappedWorkspaceResolver::new(config.workspaces)),
        output,
        shutdown.clone(),
    );

    let signal_ct = shutdown.clone();
    let signal_handle = tokio::spawn(async move {
        tokio::select! {
            () = shutdown_signal() => {
                info!("shutdown signal received");
                signal_ct.cancel();
            }
            () = signal_ct.cancelled() => {}
        }
    });

    info!("acp-mux ready");
    let outcome = dispatcher.run(tokio::io::stdin()).await;

    // ── Drain the editor stream ─────────────────────────
    drop(dispatcher);
    let flushed = sequencer.finish().await;
    signal_handle.abort();
    info!("acp-mux shut down");

    outcome.and(flushed)
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
