//! Actwin Engine - activity window and user action coordination.
//!
//! # Commands
//!
//! - `actwin-engine replay <file>`: Run a timed script in virtual time and
//!   print the report
//! - `actwin-engine live`: Apply commands from stdin in real time, printing
//!   released telemetry as JSON lines
//! - `actwin-engine config`: Print the effective configuration
//!
//! # Environment Variables
//!
//! See the [`config`](actwin_engine::config) module for available
//! configuration options.

use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use actwin_engine::action::TelemetrySink;
use actwin_engine::config::{Config, LogFormat};
use actwin_engine::replay::{parse_command, replay_script, ActionHost};
use actwin_engine::scheduler::RuntimeScheduler;
use actwin_engine::types::TelemetryItem;

/// Poll interval while waiting for the last action to resolve after stdin
/// closes.
const DRAIN_POLL_MS: u64 = 10;

/// Actwin Engine - activity window and user action coordination.
///
/// Decides when user actions end by watching request, DOM and resource
/// signals, and releases the telemetry each action buffered.
#[derive(Parser, Debug)]
#[command(name = "actwin-engine")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    ACTWIN_INACTIVITY_MS       Tracker inactivity timeout (default: 100)
    ACTWIN_DRAIN_TIMEOUT_MS    Tracker drain ceiling (default: 10000)
    ACTWIN_FOLLOW_UP_MS        Controller follow-up timeout (default: 100)
    ACTWIN_HALT_TIMEOUT_MS     Controller halt ceiling (default: 10000)
    ACTWIN_IGNORED_URLS        Comma-separated URL substrings to ignore
    ACTWIN_INTERACTION_EVENTS  Interactions that start actions (default: click,keydown)
    ACTWIN_LOG_FORMAT          text or json (default: text)
    RUST_LOG                   Log filter (default: info)

EXAMPLES:
    # Replay a recorded session
    actwin-engine replay session.jsonl

    # Feed commands interactively
    echo '{\"kind\":\"start_action\",\"name\":\"save\"}' | actwin-engine live
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a timed script in virtual time.
    ///
    /// Each line is a JSON command with an `atMs` field. Prints the action
    /// outcomes and released telemetry as one JSON document.
    Replay {
        /// Script file to replay.
        file: PathBuf,
    },

    /// Apply commands from stdin as they arrive.
    ///
    /// Released telemetry is printed to stdout, one JSON object per line.
    Live,

    /// Print the effective configuration and exit.
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    init_logging(config.log_format);

    match cli.command {
        Command::Replay { file } => run_replay(&file, &config),
        Command::Live => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to create tokio runtime")?;

            let local = tokio::task::LocalSet::new();
            local.block_on(&runtime, run_live(config))
        }
        Command::Config => {
            let rendered = serde_json::to_string_pretty(&config).context("Failed to render configuration")?;
            println!("{rendered}");
            Ok(())
        }
    }
}

/// Replays a script file and prints the report.
fn run_replay(file: &Path, config: &Config) -> Result<()> {
    let script = std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;

    let report = replay_script(&script, config).with_context(|| format!("Failed to replay {}", file.display()))?;
    info!(
        actions = report.outcomes.len(),
        items = report.items.len(),
        "Replay finished"
    );

    let rendered = serde_json::to_string_pretty(&report).context("Failed to render report")?;
    println!("{rendered}");
    Ok(())
}

/// Applies stdin commands in real time until EOF or a shutdown signal.
async fn run_live(config: Config) -> Result<()> {
    info!(
        follow_up_ms = config.follow_up_ms,
        halt_timeout_ms = config.halt_timeout_ms,
        inactivity_ms = config.inactivity_ms,
        "Starting live session"
    );

    let scheduler = Rc::new(RuntimeScheduler::new());
    let sink: Rc<dyn TelemetrySink> = Rc::new(|item: TelemetryItem| match serde_json::to_string(&item) {
        Ok(line) => println!("{line}"),
        Err(e) => error!(error = %e, "Failed to serialize telemetry item"),
    });
    let host = ActionHost::new(config, scheduler.clone(), sink);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);
    let mut stdin_closed = false;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read stdin")? {
                    Some(line) => {
                        let line = line.trim();
                        if line.is_empty() || line.starts_with('#') {
                            continue;
                        }
                        match parse_command(line) {
                            Ok(command) => host.apply(command),
                            Err(e) => warn!(error = %e, "Ignoring malformed command"),
                        }
                    }
                    None => {
                        stdin_closed = true;
                        break;
                    }
                }
            }
            () = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    if stdin_closed {
        debug!("stdin closed, waiting for the running action");
        tokio::select! {
            () = host.wait_until_idle(Duration::from_millis(DRAIN_POLL_MS)) => {}
            () = &mut shutdown => info!("Shutdown signal received"),
        }
    }

    host.shutdown();
    info!(actions = host.outcomes().len(), "Live session finished");
    Ok(())
}

/// Initializes the tracing subscriber on stderr.
fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
