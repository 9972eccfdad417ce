//! `rvdas-manager`: the Logger Manager process (spec.md §6).
//!
//! Loads a `--database {memory|sqlite|django}` store backend, optionally
//! loads a cruise definition and initial mode at startup, optionally embeds
//! a Cached Data Server (`--start_data_server`/`--data_server_websocket`),
//! serves the command/control websocket (`--websocket`), and — unless
//! `--no-console` — runs an interactive REPL on stdin speaking the same
//! command vocabulary as `LoggerManagerWriter` and the websocket clients.

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use rvdas::manager::{
    Command, LoggerManager, ManagerOptions, MemoryBackend, ReconcileConfig, SqliteBackend,
    StatusSink, StoreBackend,
};
use rvdas::cached_data_server::{CachedDataServer, CachedDataServerConfig};
use rvdas::shutdown::ShutdownTrigger;

/// spec.md §6 "CLI: logger manager".
#[derive(Parser, Debug)]
#[command(name = "rvdas-manager", about = "The shipboard logger manager")]
struct Cli {
    /// Store backend: memory, sqlite, or django (spec.md §6 `--database`).
    /// `django` names a third-party web framework's ORM with no meaning
    /// outside that deployment; it is rejected here (see DESIGN.md).
    #[arg(long, default_value = "memory")]
    database: String,

    /// Path to the sqlite database file, when `--database sqlite`.
    #[arg(long, default_value = "rvdas.db")]
    database_path: PathBuf,

    /// A cruise or logger definition to load at startup.
    #[arg(long)]
    config: Option<PathBuf>,

    /// The mode to activate once `--config` loads, if the definition
    /// names it; otherwise the definition's `default_mode` is used.
    #[arg(long)]
    mode: Option<String>,

    /// Suppress the interactive REPL (spec.md §6 `--no-console`).
    #[arg(long = "no-console", default_value_t = false)]
    no_console: bool,

    /// `PATTERN` containing a `{logger}` placeholder: each captured child
    /// stderr line is also appended to the file this resolves to.
    #[arg(long)]
    stderr_file_pattern: Option<String>,

    /// Embed a Cached Data Server's websocket listener at `[HOST]:PORT`
    /// (spec.md §6 `--data_server_websocket`).
    #[arg(long)]
    data_server_websocket: Option<String>,

    /// Start the embedded Cached Data Server even without an explicit
    /// websocket address (UDP ingest only, for the manager's own status
    /// publication).
    #[arg(long, default_value_t = false)]
    start_data_server: bool,

    /// The command/control websocket address (spec.md §6 `--websocket`).
    #[arg(long, default_value = "localhost:8765")]
    websocket: String,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    rvdas::telemetry::init();
    let cli = Cli::parse();

    if let Some(pattern) = &cli.stderr_file_pattern {
        if !pattern.contains("{logger}") {
            eprintln!("rvdas-manager: --stderr_file_pattern must contain `{{logger}}`");
            return std::process::ExitCode::FAILURE;
        }
    }

    let backend: Arc<dyn StoreBackend> = match cli.database.as_str() {
        "memory" => Arc::new(MemoryBackend::new()),
        "sqlite" => match SqliteBackend::open(cli.database_path.to_string_lossy().as_ref()) {
            Ok(backend) => Arc::new(backend),
            Err(e) => {
                eprintln!("rvdas-manager: failed to open sqlite store: {e}");
                return std::process::ExitCode::FAILURE;
            }
        },
        "django" => {
            eprintln!(
                "rvdas-manager: --database django is a third-party ORM with no standalone \
                 meaning outside that deployment; use memory or sqlite"
            );
            return std::process::ExitCode::FAILURE;
        }
        other => {
            eprintln!("rvdas-manager: unknown --database `{other}` (expected memory|sqlite|django)");
            return std::process::ExitCode::FAILURE;
        }
    };

    let (trigger, signal) = ShutdownTrigger::new();

    let data_server_addr: Option<SocketAddr> = match &cli.data_server_websocket {
        Some(raw) => match parse_host_port(raw, 8766) {
            Ok(addr) => Some(addr),
            Err(e) => {
                eprintln!("rvdas-manager: --data_server_websocket {raw}: {e}");
                return std::process::ExitCode::FAILURE;
            }
        },
        None => None,
    };

    let status_sink = if data_server_addr.is_some() || cli.start_data_server {
        let server_config = CachedDataServerConfig {
            websocket_addr: data_server_addr,
            ..CachedDataServerConfig::default()
        };
        let server = Arc::new(CachedDataServer::new(server_config));
        let run_server = Arc::clone(&server);
        let server_signal = signal.clone();
        tokio::spawn(async move {
            if let Err(e) = run_server.run(server_signal).await {
                tracing::error!(error = %e, "cached data server exited");
            }
        });
        StatusSink::Embedded(server)
    } else {
        StatusSink::None
    };

    let websocket_addr = match parse_host_port(&cli.websocket, 8765) {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("rvdas-manager: --websocket {}: {e}", cli.websocket);
            return std::process::ExitCode::FAILURE;
        }
    };

    let binary_path = match std::env::current_exe() {
        Ok(path) => path.with_file_name("rvdas-run"),
        Err(e) => {
            eprintln!("rvdas-manager: could not resolve own executable path: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let manager = LoggerManager::new(ManagerOptions {
        binary_path,
        reconcile: ReconcileConfig::default(),
        backend,
        status_sink,
        initial_mode: cli.mode.clone(),
        stderr_file_pattern: cli.stderr_file_pattern.clone(),
    });

    if let Err(e) = manager.restore_from_store().await {
        tracing::warn!(error = %e, "failed to restore logger manager store");
    }

    if let Some(config) = &cli.config {
        manager.load_configuration(config.to_string_lossy().into_owned()).await;
    }

    let command_manager = Arc::clone(&manager);
    let command_signal = signal.clone();
    let command_task = tokio::spawn(async move {
        if let Err(e) = command_manager.serve_commands(websocket_addr, command_signal).await {
            tracing::error!(error = %e, "command websocket listener exited");
        }
    });

    let reconcile_manager = Arc::clone(&manager);
    let reconcile_task = tokio::spawn(async move { reconcile_manager.run(signal).await });

    let sigint_manager = Arc::clone(&manager);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("SIGINT received, shutting down logger manager");
            sigint_manager.quit();
        }
    });

    if !cli.no_console {
        run_console(Arc::clone(&manager)).await;
        manager.quit();
    }

    let run_result = reconcile_task
        .await
        .unwrap_or_else(|e| Err(anyhow::anyhow!("reconciliation loop panicked: {e}")));
    trigger.shutdown();
    let _ = command_task.await;

    match run_result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("rvdas-manager: {e}");
            std::process::ExitCode::FAILURE
        }
    }
}

/// The interactive console (spec.md §6, unless `--no-console`): read
/// whitespace-separated commands from stdin, dispatch them to the
/// manager's own control surface, print the ack, and return once `quit`
/// is read or stdin closes. Runs concurrently with the reconciliation
/// loop, so commands take effect on the next tick like any other client.
async fn run_console(manager: Arc<LoggerManager>) {
    use tokio::io::{AsyncBufReadExt, BufReader};

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match Command::parse_text(line) {
                    Some(Command::Quit) => {
                        manager.quit();
                        break;
                    }
                    Some(command) => {
                        let ack = manager.dispatch(command).await;
                        println!("{}", serde_json::to_string(&ack).unwrap_or_default());
                    }
                    None => match parse_query_command(line) {
                        Some(command) => {
                            let ack = manager.dispatch(command).await;
                            println!("{}", serde_json::to_string(&ack).unwrap_or_default());
                        }
                        None => eprintln!("rvdas-manager: unrecognized command `{line}`"),
                    },
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "console stdin read error");
                break;
            }
        }
    }
}

/// The read-only `Get*` console commands that `Command::parse_text`
/// doesn't cover (it's shared with the geofence whitelist, which only
/// ever emits mutating commands).
fn parse_query_command(line: &str) -> Option<Command> {
    let mut parts = line.split_whitespace();
    match parts.next()? {
        "get_modes" => Some(Command::GetModes),
        "get_active_mode" => Some(Command::GetActiveMode),
        "get_loggers" => Some(Command::GetLoggers),
        "get_logger_configs" => Some(Command::GetLoggerConfigs {
            logger: parts.next()?.to_string(),
        }),
        "get_active_logger_config" => Some(Command::GetActiveLoggerConfig {
            logger: parts.next()?.to_string(),
        }),
        "get_status" => Some(Command::GetStatus),
        _ => None,
    }
}

fn parse_host_port(raw: &str, default_port: u16) -> anyhow::Result<SocketAddr> {
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if let Some(port_str) = raw.strip_prefix(':') {
        let port: u16 = port_str.parse()?;
        return Ok(SocketAddr::from(([0, 0, 0, 0], port)));
    }
    if let Some((host, port_str)) = raw.rsplit_once(':') {
        let port: u16 = port_str.parse()?;
        let host = if host.is_empty() { "0.0.0.0" } else { host };
        return (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| anyhow::anyhow!("no addresses resolved for `{host}`"));
    }
    let port: u16 = raw.parse().unwrap_or(default_port);
    Ok(SocketAddr::from(([0, 0, 0, 0], port)))
}
