// CLI module - User-facing command-line interface

mod output;

pub use output::print_error;

use crate::config::Config;
use crate::daemon::{DaemonManager, PidFile};
use crate::error::{OverseerError, Result};
use crate::logging;
use crate::process::parse_command;
use crate::service::ServiceStatus;
use crate::state::NewService;
use crate::supervisor::Supervisor;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;

const DAEMON_BINARY: &str = "overseer-daemon";
const DAEMON_START_TIMEOUT: Duration = Duration::from_secs(5);
const DAEMON_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Overseer - keep long-running commands alive
#[derive(Parser)]
#[command(name = "overseer")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new service
    Add {
        /// Command line to run, quoted as a single argument
        command: String,

        /// Service name (defaults to the program name)
        #[arg(short, long)]
        name: Option<String>,

        /// Do not restart the service when it crashes
        #[arg(long)]
        no_auto_restart: bool,

        /// Working directory (defaults to the current directory)
        #[arg(short = 'w', long)]
        working_dir: Option<PathBuf>,

        /// Environment variables (KEY=VALUE format)
        #[arg(short, long)]
        env: Vec<String>,

        /// Automatic restarts allowed before the service is marked failed
        #[arg(long)]
        max_restarts: Option<u32>,

        /// Seconds to wait before an automatic restart
        #[arg(long)]
        restart_delay: Option<u64>,

        /// Start the service right away
        #[arg(short, long)]
        start: bool,
    },

    /// List all services
    List {
        /// Include CPU, memory and uptime of running services
        #[arg(short, long)]
        status: bool,
    },

    /// Show details of one service
    Status {
        /// Service id or name
        target: String,
    },

    /// Start a service
    Start {
        /// Service id or name
        target: String,
    },

    /// Stop a service
    Stop {
        /// Service id or name
        target: String,

        /// Kill immediately with SIGKILL
        #[arg(short, long)]
        force: bool,
    },

    /// Restart a service
    Restart {
        /// Service id or name
        target: String,

        /// Kill immediately with SIGKILL instead of stopping gracefully
        #[arg(short, long)]
        force: bool,
    },

    /// Suspend a running service
    Pause {
        /// Service id or name
        target: String,
    },

    /// Continue a paused service
    Resume {
        /// Service id or name
        target: String,
    },

    /// Delete a service
    Remove {
        /// Service id or name
        target: String,

        /// Stop the service first if it is running
        #[arg(short, long)]
        force: bool,
    },

    /// Reset the restart counter of a service
    Reset {
        /// Service id or name
        target: String,
    },

    /// View service output
    Logs {
        /// Service id or name
        target: String,

        /// Number of lines to display
        #[arg(short = 'n', long, default_value = "100")]
        lines: usize,

        /// Keep printing new output until interrupted
        #[arg(short, long)]
        follow: bool,

        /// Truncate the log file instead of printing it
        #[arg(long, conflicts_with = "follow")]
        clear: bool,
    },

    /// Run the health monitor in the foreground until Ctrl-C
    Monitor,

    /// Manage the background daemon
    Daemon {
        #[command(subcommand)]
        command: DaemonCommands,
    },
}

#[derive(Subcommand)]
enum DaemonCommands {
    /// Start the daemon
    Start,
    /// Stop the daemon
    Stop,
    /// Check daemon status
    Status,
}

impl Cli {
    /// Parse arguments and run the requested command
    pub async fn run() -> Result<()> {
        Cli::parse().execute().await
    }

    async fn execute(self) -> Result<()> {
        let config = Config::load(self.config.as_deref())?;

        if !config.ui.color_output {
            colored::control::set_override(false);
        }

        // One-shot commands stay quiet unless something goes wrong
        let level = if matches!(self.command, Commands::Monitor) {
            config.general.log_level.as_str()
        } else {
            "warn"
        };
        logging::init_cli(level);

        let supervisor = Supervisor::open(config.clone())?;

        match self.command {
            Commands::Add {
                command,
                name,
                no_auto_restart,
                working_dir,
                env,
                max_restarts,
                restart_delay,
                start,
            } => {
                let name = match name {
                    Some(name) => name,
                    None => default_name(&command)?,
                };
                let new = NewService {
                    name,
                    command,
                    auto_restart: no_auto_restart.then_some(false),
                    working_directory: working_dir,
                    environment: parse_env_vars(&env)?,
                    max_restart_attempts: max_restarts,
                    restart_delay,
                };

                let record = supervisor.add(new).await?;
                output::print_added(&record);

                if start {
                    start_service(&supervisor, record.id.as_str()).await?;
                }
                Ok(())
            }

            Commands::List { status } => {
                let services = supervisor.list().await?;
                if status {
                    let mut reports = Vec::with_capacity(services.len());
                    for service in &services {
                        if let Some(report) = supervisor.status_snapshot(service.id.as_str()).await? {
                            reports.push(report);
                        }
                    }
                    output::print_status_table(&reports);
                } else {
                    output::print_service_table(&services);
                }
                output::print_summary(&supervisor.summary().await?);
                Ok(())
            }

            Commands::Status { target } => {
                let report = supervisor
                    .status_snapshot(&target)
                    .await?
                    .ok_or(OverseerError::NotFound(target))?;
                let log_path = supervisor.log_path(report.record.id.as_str()).await?;
                output::print_detailed_status(&report, &log_path);
                Ok(())
            }

            Commands::Start { target } => start_service(&supervisor, &target).await,

            Commands::Stop { target, force } => {
                let pb = output::create_progress_bar(&format!("Stopping {}...", target));
                if supervisor.stop(&target, force).await? {
                    output::finish_progress_success(pb, &format!("Service '{}' stopped", target));
                    Ok(())
                } else {
                    output::finish_progress_error(pb, &format!("Service '{}' did not stop", target));
                    Err(OverseerError::StopError(
                        target,
                        "process is still alive".to_string(),
                    ))
                }
            }

            Commands::Restart { target, force } => {
                let pb = output::create_progress_bar(&format!("Restarting {}...", target));
                if supervisor.restart(&target, force).await? {
                    output::finish_progress_success(pb, &format!("Service '{}' restarted", target));
                    Ok(())
                } else {
                    output::finish_progress_error(pb, &format!("Service '{}' did not restart", target));
                    Err(failure_reason(&supervisor, &target, "restart").await)
                }
            }

            Commands::Pause { target } => {
                if supervisor.pause(&target).await? {
                    output::print_success_msg(&format!("Service '{}' paused", target));
                    Ok(())
                } else {
                    Err(OverseerError::Other(format!(
                        "Service '{}' is not running",
                        target
                    )))
                }
            }

            Commands::Resume { target } => {
                if supervisor.resume(&target).await? {
                    output::print_success_msg(&format!("Service '{}' resumed", target));
                    Ok(())
                } else {
                    Err(OverseerError::Other(format!(
                        "Service '{}' is not running",
                        target
                    )))
                }
            }

            Commands::Remove { target, force } => {
                if supervisor.remove(&target, force).await? {
                    output::print_success_msg(&format!("Service '{}' removed", target));
                    Ok(())
                } else if force {
                    Err(OverseerError::StopError(
                        target,
                        "process is still alive".to_string(),
                    ))
                } else {
                    Err(OverseerError::Other(format!(
                        "Service '{}' is running; stop it first or pass --force",
                        target
                    )))
                }
            }

            Commands::Reset { target } => {
                let record = supervisor.reset_restarts(&target).await?;
                output::print_success_msg(&format!(
                    "Restart counter of '{}' reset ({})",
                    record.name, record.status
                ));
                Ok(())
            }

            Commands::Logs {
                target,
                lines,
                follow,
                clear,
            } => {
                if clear {
                    supervisor.clear_logs(&target).await?;
                    output::print_success_msg(&format!("Logs of '{}' cleared", target));
                    return Ok(());
                }

                let history = supervisor.logs(&target, lines).await?;
                output::print_logs(&history);

                if follow {
                    let mut stream = supervisor.follow_logs(&target).await?;
                    let mut interrupted = interrupt_channel()?;
                    output::print_info("Following new output (Ctrl-C to stop)");
                    loop {
                        tokio::select! {
                            line = stream.next() => match line {
                                Some(line) => println!("{}", line),
                                None => break,
                            },
                            _ = interrupted.changed() => break,
                        }
                    }
                }
                Ok(())
            }

            Commands::Monitor => {
                let monitor = supervisor.monitor();
                let stop = interrupt_channel()?;
                output::print_info(&format!(
                    "Health monitor running every {}s (Ctrl-C to stop)",
                    monitor.check_interval().as_secs()
                ));
                monitor.run(stop).await;
                output::print_success_msg("Health monitor stopped");
                Ok(())
            }

            Commands::Daemon { command } => {
                run_daemon_command(&command, &config, self.config.as_deref()).await
            }
        }
    }
}

async fn start_service(supervisor: &Supervisor, target: &str) -> Result<()> {
    if supervisor.start(target).await? {
        let pid = supervisor
            .get(target)
            .await?
            .and_then(|record| record.pid)
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "-".to_string());
        output::print_success_msg(&format!("Service '{}' started (PID {})", target, pid));
        Ok(())
    } else {
        Err(failure_reason(supervisor, target, "start").await)
    }
}

/// Explain why a start or restart returned false
async fn failure_reason(supervisor: &Supervisor, target: &str, action: &str) -> OverseerError {
    match supervisor.get(target).await {
        Ok(Some(record)) if record.status == ServiceStatus::Failed => OverseerError::SpawnError(
            format!("Failed to {} service '{}', see its log", action, target),
        ),
        Ok(Some(record)) if record.status.holds_process() => {
            OverseerError::Other(format!("Service '{}' is already {}", target, record.status))
        }
        Ok(_) => OverseerError::Other(format!("Failed to {} service '{}'", action, target)),
        Err(e) => e,
    }
}

async fn run_daemon_command(
    command: &DaemonCommands,
    config: &Config,
    config_path: Option<&Path>,
) -> Result<()> {
    let manager = DaemonManager::new(PidFile::new(config.pid_file_path()));

    match command {
        DaemonCommands::Start => {
            let pb = output::create_progress_bar("Starting daemon...");
            match manager
                .start_daemon(&daemon_binary(), config_path, DAEMON_START_TIMEOUT)
                .await
            {
                Ok(pid) => {
                    output::finish_progress_success(pb, &format!("Daemon started (PID {})", pid));
                    Ok(())
                }
                Err(e) => {
                    output::finish_progress_error(pb, "Daemon failed to start");
                    Err(e)
                }
            }
        }
        DaemonCommands::Stop => {
            let pb = output::create_progress_bar("Stopping daemon...");
            match manager.stop_daemon(DAEMON_STOP_TIMEOUT).await {
                Ok(pid) => {
                    output::finish_progress_success(pb, &format!("Daemon {} stopped", pid));
                    Ok(())
                }
                Err(e) => {
                    output::finish_progress_error(pb, "Daemon did not stop");
                    Err(e)
                }
            }
        }
        DaemonCommands::Status => {
            output::print_daemon_status(&manager.get_status());
            Ok(())
        }
    }
}

/// The daemon binary installed next to this executable, else from `PATH`
fn daemon_binary() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(DAEMON_BINARY)))
        .filter(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(DAEMON_BINARY))
}

/// Flag flipped by the first Ctrl-C
fn interrupt_channel() -> Result<watch::Receiver<bool>> {
    let (tx, rx) = watch::channel(false);
    ctrlc::set_handler(move || {
        let _ = tx.send(true);
    })
    .map_err(|e| OverseerError::Other(format!("Failed to install Ctrl-C handler: {}", e)))?;
    Ok(rx)
}

/// Name a service after the program it runs
fn default_name(command: &str) -> Result<String> {
    let argv = parse_command(command)?;
    let program = argv.first().map(String::as_str).unwrap_or_default();
    let name = Path::new(program)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.to_string());
    Ok(name)
}

/// Parse environment variables from KEY=VALUE format
fn parse_env_vars(env_vars: &[String]) -> Result<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();

    for env_str in env_vars {
        match env_str.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                map.insert(key.to_string(), value.to_string());
            }
            _ => {
                return Err(OverseerError::ConfigError(format!(
                    "Invalid environment variable format: '{}'. Expected KEY=VALUE",
                    env_str
                )));
            }
        }
    }

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_env_vars() {
        let env_vars = vec!["NODE_ENV=production".to_string(), "URL=a=b".to_string()];
        let result = parse_env_vars(&env_vars).unwrap();
        assert_eq!(result.get("NODE_ENV"), Some(&"production".to_string()));
        assert_eq!(result.get("URL"), Some(&"a=b".to_string()));
    }

    #[test]
    fn test_parse_env_vars_invalid() {
        assert!(parse_env_vars(&["INVALID".to_string()]).is_err());
        assert!(parse_env_vars(&["=value".to_string()]).is_err());
    }

    #[test]
    fn test_default_name() {
        assert_eq!(default_name("/usr/bin/python3 -m http.server").unwrap(), "python3");
        assert_eq!(default_name("sleep 10").unwrap(), "sleep");
        assert!(default_name("").is_err());
    }

    #[test]
    fn test_parse_add_with_options() {
        let cli = Cli::try_parse_from([
            "overseer",
            "--config",
            "/tmp/overseer.toml",
            "add",
            "sleep 30",
            "--name",
            "sleeper",
            "--no-auto-restart",
            "-e",
            "A=1",
            "--start",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/overseer.toml")));
        match cli.command {
            Commands::Add {
                command,
                name,
                no_auto_restart,
                env,
                start,
                ..
            } => {
                assert_eq!(command, "sleep 30");
                assert_eq!(name.as_deref(), Some("sleeper"));
                assert!(no_auto_restart);
                assert_eq!(env, vec!["A=1"]);
                assert!(start);
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_logs_follow_conflicts_with_clear() {
        assert!(Cli::try_parse_from(["overseer", "logs", "web", "--follow", "--clear"]).is_err());
    }
}
