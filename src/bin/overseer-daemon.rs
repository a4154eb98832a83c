use anyhow::Context;
use clap::Parser;
use overseer::config::Config;
use overseer::daemon::{daemonize, DaemonManager, PidFile};
use overseer::logging;
use overseer::supervisor::Supervisor;
use std::path::PathBuf;

/// Background health monitor for overseer services
#[derive(Parser, Debug)]
#[command(name = "overseer-daemon", version, about)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Detach from the terminal and run in the background
    #[arg(long)]
    daemonize: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("failed to load configuration")?;

    // Fork before the runtime spawns any threads
    if args.daemonize {
        daemonize().context("failed to daemonize")?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> anyhow::Result<()> {
    let _logging = logging::init_daemon(&config.paths.log_dir, &config.general.log_level)
        .context("failed to initialise logging")?;

    let daemon = DaemonManager::new(PidFile::new(config.pid_file_path()));
    daemon
        .register_daemon()
        .context("failed to register daemon")?;
    tracing::info!(pid = std::process::id(), "overseer daemon started");

    let result = supervise(config).await;

    if let Err(e) = daemon.unregister_daemon() {
        tracing::warn!(error = %e, "failed to remove PID file");
    }
    tracing::info!("overseer daemon stopped");

    result
}

/// Run the health monitor until SIGTERM or SIGINT. Services keep running
/// after the daemon exits.
async fn supervise(config: Config) -> anyhow::Result<()> {
    let supervisor = Supervisor::open(config).context("failed to open service store")?;
    let monitor = supervisor.monitor().spawn();

    shutdown_signal().await?;

    tracing::info!("shutting down health monitor");
    monitor.stop().await;
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => tracing::info!("received SIGTERM"),
        _ = sigint.recv() => tracing::info!("received SIGINT"),
    }

    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")
}
