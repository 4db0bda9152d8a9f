//! library-scanner: command-line entry point.
//!
//! Runs one scan or one metadata refresh and exits with status 0 on success,
//! 1 on any fatal or unrecovered failure. With `--events`, progress events
//! are written to stdout as JSON lines and control messages are read from
//! stdin, one JSON object per line.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use library_scanner::{
    bootstrap, ControlMessage, ControlOutcome, CoreService, ExitStatus, LibraryConfig, UpdateMode,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How long buffered events may take to flush after the run ends.
const EVENT_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "library-scanner")]
#[command(about = "Catalog voice works found in local library folders")]
#[command(version)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long, env = "LIBRARY_SCANNER_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format: pretty, json or compact
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Log level for scanner crates, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: LogLevel,

    /// Stream events on stdout and accept control messages on stdin
    #[arg(long)]
    events: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Clean up, discover and catalog work folders
    Scan,
    /// Refresh metadata of every catalogued work
    Update {
        /// Refresh only sales and rating figures
        #[arg(long)]
        dynamic: bool,
    },
}

#[tokio::main]
async fn main() {
    let status = match run(Cli::parse()).await {
        Ok(status) => status,
        Err(e) => {
            eprintln!("library-scanner: {:#}", e);
            ExitStatus::Failure
        }
    };
    std::process::exit(status.code());
}

async fn run(cli: Cli) -> Result<ExitStatus> {
    let mut logging = LoggingConfig::default()
        .with_level(cli.log_level)
        .with_stderr(cli.events);
    if let Some(format) = cli.log_format {
        logging = logging.with_format(format);
    }
    if let Ok(filter) = std::env::var("RUST_LOG") {
        logging = logging.with_filter(filter);
    }
    init_logging(logging).context("Failed to initialize logging")?;

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = LibraryConfig::from_json_file(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    let core = bootstrap(config)
        .await
        .context("Failed to start the scanner")?;

    let stream = cli.events.then(|| spawn_event_stream(&core));

    let job = async {
        match cli.command {
            Command::Scan => core.scan().await,
            Command::Update { dynamic } => {
                let mode = if dynamic {
                    UpdateMode::Dynamic
                } else {
                    UpdateMode::Full
                };
                core.update(mode).await
            }
        }
    };

    let status = tokio::select! {
        status = job => status,
        _ = termination(&core, cli.events) => ExitStatus::Failure,
    };
    info!(%status, "Run finished");

    // Closing the bus lets the stream drain what is still buffered.
    drop(core);
    if let Some(stream) = stream {
        if tokio::time::timeout(EVENT_FLUSH_TIMEOUT, stream).await.is_err() {
            warn!("Event stream did not drain in time");
        }
    }
    Ok(status)
}

fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("library-scanner").join("config.json"))
        .ok_or_else(|| anyhow!("No configuration directory on this platform, pass --config"))
}

/// Forward every event to stdout as one JSON line.
fn spawn_event_stream(core: &CoreService) -> JoinHandle<()> {
    let mut rx = core.subscribe();
    tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let mut line = match serde_json::to_vec(&event) {
                Ok(line) => line,
                Err(e) => {
                    error!(error = %e, "Failed to serialize event");
                    continue;
                }
            };
            line.push(b'\n');
            if let Err(e) = stdout.write_all(&line).await {
                error!(error = %e, "Failed to write event");
                break;
            }
            stdout.flush().await.ok();
        }
    })
}

/// Resolves once the process has been asked to stop.
async fn termination(core: &CoreService, read_controls: bool) {
    let controls = async {
        if read_controls {
            read_control_messages(core).await
        } else {
            std::future::pending().await
        }
    };

    tokio::select! {
        _ = shutdown_signal() => {
            core.handle_control(ControlMessage::Exit);
        }
        _ = controls => {}
    }
}

/// Answer control messages until one asks to terminate.
async fn read_control_messages(core: &CoreService) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read control messages");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ControlMessage>(&line) {
            Ok(message) => {
                if core.handle_control(message) == ControlOutcome::Terminate {
                    return;
                }
            }
            Err(e) => warn!(error = %e, "Ignoring malformed control message"),
        }
    }
    // A closed stdin is not a request to stop.
    std::future::pending::<()>().await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
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
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, terminating"),
        _ = terminate => info!("Received terminate signal, terminating"),
    }
}
