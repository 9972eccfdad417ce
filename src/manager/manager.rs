//! The Logger Manager (spec.md §4.4): holds the cruise definition and
//! desired mode/overrides, reconciles them against observed child-process
//! state on a tick, and exposes the control surface of §4.4 as async
//! methods. Command handlers are non-blocking with respect to
//! reconciliation: they either mutate desired state directly under the
//! coarse lock (cheap, no I/O) or enqueue an intent the reconcile loop
//! applies (spec.md §4.4, §5 "lock ... held only for map updates, never
//! across I/O").

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use indexmap::IndexMap;
use rvdas_core::{RuntimeError, ShutdownSignal};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::config::{load_cruise_file, CruiseDefinition, LoaderOptions};

use super::command::{Command, CommandAck};
use super::reconcile::{desired_config, BackoffTracker, ReconcileConfig};
use super::status::{self, StatusSink};
use super::store::{LogMessage, LoggerState, LoggerStatus, StoreBackend, StoreSnapshot};
use super::supervisor::{spawn_listener, stop_gracefully, ChildHandle};

#[derive(Clone, Debug, Default)]
struct ManagerState {
    definition: Option<CruiseDefinition>,
    definition_source: Option<String>,
    definition_loaded_at: f64,
    /// The source file's mtime at the moment it was loaded (spec.md §4.4
    /// `status:file_update` "when the source file's modification time
    /// changes since load"). `None` when no definition is loaded, or its
    /// source's mtime couldn't be read.
    definition_file_mtime: Option<f64>,
    desired_mode: String,
    overrides: IndexMap<String, String>,
    logger_states: IndexMap<String, LoggerState>,
}

enum Intent {
    LoadConfiguration(String),
    ReloadConfiguration,
    DeleteConfiguration,
}

/// Everything the reconcile loop needs per logger that isn't part of the
/// externally observable snapshot: the live child handle (if any), its
/// config file path, and restart backoff bookkeeping.
struct RuntimeLogger {
    child: Option<ChildHandle>,
    config_path: Option<PathBuf>,
    active_config: Option<String>,
    backoff: BackoffTracker,
    next_restart_at: Option<Instant>,
    fatal: bool,
    /// Set once the current child's first stderr line arrives (spec.md
    /// §4.4 step 2 "first successful read heartbeat"). Reset on each spawn.
    heartbeat: Arc<AtomicBool>,
}

impl RuntimeLogger {
    fn heartbeat(&self) -> bool {
        self.heartbeat.load(Ordering::Relaxed)
    }
}

impl Default for RuntimeLogger {
    fn default() -> Self {
        Self {
            child: None,
            config_path: None,
            active_config: None,
            backoff: BackoffTracker::default(),
            next_restart_at: None,
            fatal: false,
            heartbeat: Arc::new(AtomicBool::new(false)),
        }
    }
}

pub struct ManagerOptions {
    pub binary_path: PathBuf,
    pub reconcile: ReconcileConfig,
    pub backend: Arc<dyn StoreBackend>,
    pub status_sink: StatusSink,
    /// Initial active mode requested at startup (spec.md §6 `--mode`).
    /// Applied the first time a definition loads, if the definition names
    /// that mode; otherwise the definition's `default_mode` wins.
    pub initial_mode: Option<String>,
    /// `PATTERN` with a `{logger}` placeholder (spec.md §6
    /// `--stderr_file_pattern`): each captured child stderr line is also
    /// appended to the file this resolves to for that logger.
    pub stderr_file_pattern: Option<String>,
}

pub struct LoggerManager {
    state: Mutex<ManagerState>,
    intents_tx: mpsc::UnboundedSender<Intent>,
    intents_rx: Mutex<Option<mpsc::UnboundedReceiver<Intent>>>,
    wake: Notify,
    quit: Notify,
    options: ManagerOptions,
}

impl LoggerManager {
    pub fn new(options: ManagerOptions) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            state: Mutex::new(ManagerState {
                desired_mode: String::new(),
                ..Default::default()
            }),
            intents_tx: tx,
            intents_rx: Mutex::new(Some(rx)),
            wake: Notify::new(),
            quit: Notify::new(),
            options,
        })
    }

    /// Restore desired mode/overrides from the store on startup, so
    /// restarts preserve operator intent (spec.md §5).
    pub async fn restore_from_store(&self) -> anyhow::Result<()> {
        let snapshot = self.options.backend.load()?;
        let mut state = self.state.lock().await;
        state.desired_mode = snapshot.desired_mode;
        state.overrides = snapshot.per_logger_overrides;
        state.definition = snapshot.definition;
        state.definition_loaded_at = snapshot.definition_loaded_at;
        Ok(())
    }

    async fn persist(&self, state: &ManagerState) {
        let snapshot = StoreSnapshot {
            definition: state.definition.clone(),
            definition_loaded_at: state.definition_loaded_at,
            desired_mode: state.desired_mode.clone(),
            per_logger_overrides: state.overrides.clone(),
            last_update: now_seconds(),
            message_log: Vec::new(),
        };
        if let Err(e) = self.options.backend.save(&snapshot) {
            tracing::error!(error = %e, "failed to persist logger manager store");
        }
    }

    async fn log_message(&self, cruise_id: &str, source: &str, message: impl Into<String>) {
        let message = LogMessage {
            timestamp: now_seconds(),
            level: "info".to_string(),
            cruise_id: cruise_id.to_string(),
            source: source.to_string(),
            user: "system".to_string(),
            message: message.into(),
        };
        if let Err(e) = self.options.backend.append_message(&message) {
            tracing::warn!(error = %e, "failed to append manager message log");
        }
    }

    /// Republish one of the manager's own log lines as `stderr:logger_manager`
    /// (spec.md §4.4), the same way a child's captured stderr lines are
    /// republished as `stderr:logger:<name>`.
    async fn publish_manager_stderr(&self, line: impl Into<String>) {
        status::publish_stderr_line(&self.options.status_sink, None, &line.into(), now_seconds())
            .await;
    }

    // ---- Control surface (spec.md §4.4) ----

    pub async fn load_configuration(&self, source: String) {
        let _ = self.intents_tx.send(Intent::LoadConfiguration(source));
        self.wake.notify_one();
    }

    pub async fn reload_configuration(&self) {
        let _ = self.intents_tx.send(Intent::ReloadConfiguration);
        self.wake.notify_one();
    }

    pub async fn delete_configuration(&self) {
        let _ = self.intents_tx.send(Intent::DeleteConfiguration);
        self.wake.notify_one();
    }

    pub async fn get_modes(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .definition
            .as_ref()
            .map(|d| d.modes.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn get_active_mode(&self) -> String {
        self.state.lock().await.desired_mode.clone()
    }

    pub async fn set_active_mode(&self, mode: String) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().await;
        let Some(def) = &state.definition else {
            return Err(RuntimeError::CommandRejected {
                reason: "no cruise definition loaded".to_string(),
            });
        };
        if !def.modes.contains_key(&mode) {
            return Err(RuntimeError::CommandRejected {
                reason: format!("unknown mode `{mode}`"),
            });
        }
        state.desired_mode = mode;
        self.persist(&state).await;
        self.wake.notify_one();
        Ok(())
    }

    pub async fn get_loggers(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .definition
            .as_ref()
            .map(|d| d.loggers.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn get_logger_configs(&self, logger: &str) -> Vec<String> {
        let state = self.state.lock().await;
        state
            .definition
            .as_ref()
            .and_then(|d| d.loggers.get(logger))
            .map(|entry| entry.configs.clone())
            .unwrap_or_default()
    }

    pub async fn get_active_logger_config(&self, logger: &str) -> Option<String> {
        let state = self.state.lock().await;
        let def = state.definition.as_ref()?;
        desired_config(def, &state.desired_mode, &state.overrides, logger).map(str::to_string)
    }

    pub async fn set_active_logger_config(
        &self,
        logger: String,
        config: String,
    ) -> Result<(), RuntimeError> {
        let mut state = self.state.lock().await;
        let Some(def) = &state.definition else {
            return Err(RuntimeError::CommandRejected {
                reason: "no cruise definition loaded".to_string(),
            });
        };
        if !def.loggers.contains_key(&logger) {
            return Err(RuntimeError::CommandRejected {
                reason: format!("unknown logger `{logger}`"),
            });
        }
        if !def.configs.contains_key(&config) {
            return Err(RuntimeError::CommandRejected {
                reason: format!("unknown config `{config}`"),
            });
        }
        state.overrides.insert(logger, config);
        self.persist(&state).await;
        self.wake.notify_one();
        Ok(())
    }

    pub async fn get_status(&self) -> IndexMap<String, LoggerState> {
        self.state.lock().await.logger_states.clone()
    }

    pub fn quit(&self) {
        self.quit.notify_waiters();
    }

    /// Dispatch one `Command` (spec.md §4.4's control surface) to the
    /// matching handler and build its ack/reply.
    pub async fn dispatch(&self, command: Command) -> CommandAck {
        match command {
            Command::LoadConfiguration { source } => {
                self.load_configuration(source).await;
                CommandAck::accepted()
            }
            Command::ReloadConfiguration => {
                self.reload_configuration().await;
                CommandAck::accepted()
            }
            Command::DeleteConfiguration => {
                self.delete_configuration().await;
                CommandAck::accepted()
            }
            Command::GetModes => {
                CommandAck::with_data(serde_json::json!(self.get_modes().await))
            }
            Command::GetActiveMode => {
                CommandAck::with_data(serde_json::json!(self.get_active_mode().await))
            }
            Command::SetActiveMode { mode } => match self.set_active_mode(mode).await {
                Ok(()) => CommandAck::accepted(),
                Err(e) => CommandAck::rejected(e.to_string()),
            },
            Command::GetLoggers => {
                CommandAck::with_data(serde_json::json!(self.get_loggers().await))
            }
            Command::GetLoggerConfigs { logger } => {
                CommandAck::with_data(serde_json::json!(self.get_logger_configs(&logger).await))
            }
            Command::GetActiveLoggerConfig { logger } => {
                CommandAck::with_data(serde_json::json!(self.get_active_logger_config(&logger).await))
            }
            Command::SetActiveLoggerConfig { logger, config } => {
                match self.set_active_logger_config(logger, config).await {
                    Ok(()) => CommandAck::accepted(),
                    Err(e) => CommandAck::rejected(e.to_string()),
                }
            }
            Command::GetStatus => {
                CommandAck::with_data(serde_json::json!(self.get_status().await))
            }
            Command::Quit => {
                self.quit();
                CommandAck::accepted()
            }
            Command::Sleep { .. } => CommandAck::accepted(),
        }
    }

    /// Serve the websocket control surface at `addr` until `shutdown`
    /// fires: one JSON `Command` frame per connection, one `CommandAck`
    /// reply, matching `command::send_command`'s client side.
    pub async fn serve_commands(
        self: Arc<Self>,
        addr: SocketAddr,
        mut shutdown: ShutdownSignal,
    ) -> anyhow::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _) = accepted?;
                    let manager = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = manager.handle_command_connection(stream).await {
                            tracing::debug!(error = %e, "command connection ended");
                        }
                    });
                }
                _ = &mut shutdown => break,
            }
        }
        Ok(())
    }

    async fn handle_command_connection(&self, stream: tokio::net::TcpStream) -> anyhow::Result<()> {
        let ws = tokio_tungstenite::accept_async(stream).await?;
        let (mut sink, mut stream) = ws.split();
        while let Some(msg) = stream.next().await {
            let msg = msg?;
            let WsMessage::Text(text) = msg else { continue };
            let ack = match serde_json::from_str::<Command>(&text) {
                Ok(command) => self.dispatch(command).await,
                Err(e) => CommandAck::rejected(format!("malformed command: {e}")),
            };
            let reply = serde_json::to_string(&ack)?;
            sink.send(WsMessage::Text(reply)).await?;
        }
        Ok(())
    }

    // ---- Reconciliation loop ----

    /// Run the manager until `Quit` or `shutdown` fires: drains intents,
    /// reconciles desired vs. observed on every tick, and publishes
    /// status after each pass (spec.md §4.4).
    pub async fn run(self: Arc<Self>, mut shutdown: ShutdownSignal) -> anyhow::Result<()> {
        let mut intents_rx = self
            .intents_rx
            .lock()
            .await
            .take()
            .expect("run() called more than once");
        let mut runtime: IndexMap<String, RuntimeLogger> = IndexMap::new();

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.options.reconcile.tick_interval) => {}
                _ = self.wake.notified() => {}
                Some(intent) = intents_rx.recv() => {
                    self.apply_intent(intent).await;
                }
                _ = self.quit.notified() => break,
                _ = &mut shutdown => break,
            }

            self.drain_intents(&mut intents_rx).await;
            self.reconcile_tick(&self, &mut runtime).await;
        }

        // Orderly shutdown: stop every running child.
        for (name, logger) in runtime.iter_mut() {
            if logger.child.is_some() {
                self.terminate_logger(name, logger).await;
            }
        }
        Ok(())
    }

    async fn drain_intents(&self, rx: &mut mpsc::UnboundedReceiver<Intent>) {
        while let Ok(intent) = rx.try_recv() {
            self.apply_intent(intent).await;
        }
    }

    async fn apply_intent(&self, intent: Intent) {
        match intent {
            Intent::LoadConfiguration(source) => self.do_load_configuration(&source).await,
            Intent::ReloadConfiguration => {
                let source = self.state.lock().await.definition_source.clone();
                if let Some(source) = source {
                    self.do_load_configuration(&source).await;
                } else {
                    tracing::warn!("ReloadConfiguration with no prior source; ignored");
                }
            }
            Intent::DeleteConfiguration => {
                let mut state = self.state.lock().await;
                state.definition = None;
                state.logger_states.clear();
                state.overrides.clear();
                self.persist(&state).await;
            }
        }
    }

    async fn do_load_configuration(&self, source: &str) {
        let (path, selected_config) = match source.split_once(':') {
            Some((p, c)) => (p, Some(c)),
            None => (source, None),
        };
        match load_cruise_file(path, &LoaderOptions::default()) {
            Ok(mut definition) => {
                if let Some(selected) = selected_config {
                    // Single-config selection from a cruise file (spec.md
                    // §6 `path:config_name`): narrow to just that config,
                    // wired as the only entry of a synthetic "selected"
                    // logger so the manager's reconciliation loop still
                    // applies uniformly.
                    if let Some(config) = definition.configs.get(selected).cloned() {
                        definition.configs = IndexMap::from([(selected.to_string(), config)]);
                    }
                }
                let mut state = self.state.lock().await;
                if state.desired_mode.is_empty() || !definition.modes.contains_key(&state.desired_mode) {
                    let requested = self.options.initial_mode.as_deref().unwrap_or_default();
                    state.desired_mode = if definition.modes.contains_key(requested) {
                        requested.to_string()
                    } else {
                        definition.default_mode.clone()
                    };
                }
                state.definition_source = Some(source.to_string());
                state.definition_loaded_at = now_seconds();
                state.definition_file_mtime = file_mtime(path);
                let cruise_id = definition.cruise.id.clone();
                state.definition = Some(definition);
                self.persist(&state).await;
                self.log_message(&cruise_id, "manager", format!("loaded configuration `{source}`"))
                    .await;
            }
            Err(e) => {
                tracing::error!(error = %e, %source, "failed to load cruise configuration");
                self.publish_manager_stderr(format!("failed to load configuration `{source}`: {e}"))
                    .await;
            }
        }
    }

    async fn reconcile_tick(
        &self,
        manager: &Arc<LoggerManager>,
        runtime: &mut IndexMap<String, RuntimeLogger>,
    ) {
        let (definition, active_mode, overrides, definition_source, loaded_mtime) = {
            let state = self.state.lock().await;
            let Some(def) = state.definition.clone() else {
                return;
            };
            (
                def,
                state.desired_mode.clone(),
                state.overrides.clone(),
                state.definition_source.clone(),
                state.definition_file_mtime,
            )
        };

        // spec.md §4.4 `status:file_update`: notice when the loaded
        // definition's backing file has been modified since it was read, so
        // the UI can offer a reload.
        if let Some(source) = &definition_source {
            let path = source.split_once(':').map(|(p, _)| p).unwrap_or(source);
            if let Some(current_mtime) = file_mtime(path) {
                if Some(current_mtime) != loaded_mtime {
                    status::publish_file_update(&self.options.status_sink, current_mtime, now_seconds())
                        .await;
                }
            }
        }

        for logger_name in definition.loggers.keys() {
            let desired = desired_config(&definition, &active_mode, &overrides, logger_name)
                .map(str::to_string);
            let entry = runtime.entry(logger_name.clone()).or_default();
            self.reconcile_one(manager, logger_name, &definition, desired, entry)
                .await;
        }

        // Drop runtime entries for loggers no longer in the definition.
        runtime.retain(|name, _| definition.loggers.contains_key(name));

        let logger_states: IndexMap<String, LoggerState> = runtime
            .iter()
            .map(|(name, logger)| {
                (
                    name.clone(),
                    LoggerState {
                        active_config: logger.active_config.clone().unwrap_or_default(),
                        status: observed_status(logger, self.options.reconcile.min_uptime),
                        pid: logger.child.as_ref().and_then(|h| h.child.id()),
                        last_start: logger
                            .child
                            .as_ref()
                            .map(|h| h.started_at.elapsed().as_secs_f64())
                            .unwrap_or(0.0),
                        failures: logger.backoff.failures(),
                        last_error: None,
                    },
                )
            })
            .collect();

        let active_configs: BTreeMap<String, String> = runtime
            .iter()
            .filter_map(|(name, logger)| logger.active_config.clone().map(|c| (name.clone(), c)))
            .collect();

        {
            let mut state = self.state.lock().await;
            state.logger_states = logger_states.clone();
        }

        self.publish_status(&definition, &active_mode, &active_configs, &logger_states)
            .await;
    }

    async fn reconcile_one(
        &self,
        manager: &Arc<LoggerManager>,
        name: &str,
        definition: &CruiseDefinition,
        desired_config_name: Option<String>,
        runtime: &mut RuntimeLogger,
    ) {
        let is_off = desired_config_name.is_none();
        let currently_running = runtime.child.is_some();

        if is_off {
            if currently_running {
                self.terminate_logger(name, runtime).await;
            }
            return;
        }

        if runtime.fatal {
            return;
        }

        if currently_running {
            if runtime.active_config != desired_config_name {
                // Desired config changed out from under a running logger:
                // stop it now, let the next tick start the new one.
                self.terminate_logger(name, runtime).await;
                return;
            }
            if let Some(handle) = runtime.child.as_mut() {
                if let Ok(Some(status)) = handle.child.try_wait() {
                    runtime.child = None;
                    let clean = status.success();
                    self.on_exit(name, runtime, clean).await;
                }
            }
            return;
        }

        if let Some(next) = runtime.next_restart_at {
            if Instant::now() < next {
                return;
            }
        }

        let Some(config_name) = desired_config_name else {
            return;
        };
        let Some(config) = definition.configs.get(&config_name) else {
            tracing::error!(logger = %name, config = %config_name, "desired config not found");
            self.publish_manager_stderr(format!(
                "logger `{name}` desired config `{config_name}` not found in definition"
            ))
            .await;
            return;
        };

        match spawn_listener(name, config, &self.options.binary_path).await {
            Ok((mut handle, path)) => {
                let heartbeat = Arc::new(AtomicBool::new(false));
                if let Some(stderr_lines) = handle.stderr_lines.take() {
                    spawn_stderr_pump(
                        Arc::clone(manager),
                        name.to_string(),
                        stderr_lines,
                        Arc::clone(&heartbeat),
                    );
                }
                runtime.child = Some(handle);
                runtime.config_path = Some(path);
                runtime.active_config = Some(config_name);
                runtime.next_restart_at = None;
                runtime.heartbeat = heartbeat;
            }
            Err(e) => {
                tracing::error!(logger = %name, error = %e, "failed to spawn listener");
                self.publish_manager_stderr(format!("logger `{name}` failed to spawn: {e}"))
                    .await;
                self.on_exit(name, runtime, false).await;
            }
        }
    }

    async fn on_exit(&self, name: &str, runtime: &mut RuntimeLogger, clean: bool) {
        if clean {
            runtime.backoff.reset();
            return;
        }
        let (failures, fatal) = runtime.backoff.record_failure(Instant::now(), &self.options.reconcile);
        if fatal {
            runtime.fatal = true;
            tracing::error!(logger = %name, failures, "logger marked FATAL after repeated restart failures");
            return;
        }
        let delay = runtime.backoff.next_delay(&self.options.reconcile);
        runtime.next_restart_at = Some(Instant::now() + delay);
        tracing::warn!(logger = %name, failures, delay = ?delay, "restarting logger after backoff");
    }

    async fn terminate_logger(&self, name: &str, runtime: &mut RuntimeLogger) {
        if let Some(mut handle) = runtime.child.take() {
            let clean = stop_gracefully(
                &mut handle,
                self.options.reconcile.stop_grace,
                self.options.reconcile.kill_grace,
            )
            .await
            .unwrap_or(false);
            if let Some(path) = runtime.config_path.take() {
                let _ = tokio::fs::remove_file(path).await;
            }
            tracing::info!(logger = %name, clean, "logger stopped");
        }
        runtime.active_config = None;
        runtime.next_restart_at = None;
    }

    async fn publish_status(
        &self,
        definition: &CruiseDefinition,
        active_mode: &str,
        active_configs: &BTreeMap<String, String>,
        logger_states: &IndexMap<String, LoggerState>,
    ) {
        let now = now_seconds();
        let filename = self.state.lock().await.definition_source.clone();
        let digest = status::digest(definition, active_mode, active_configs, filename.as_deref(), now);
        status::publish_cruise_definition(&self.options.status_sink, &digest, now).await;
        status::publish_cruise_mode(&self.options.status_sink, active_mode, now).await;
        status::publish_logger_status(&self.options.status_sink, logger_states, now).await;
    }
}

/// Drain one child's captured stderr lines and republish each as
/// `stderr:logger:<name>` (spec.md §4.4 "The child's stderr is captured
/// line-wise and republished"). Runs detached for the child's lifetime;
/// ends on its own once the child closes its stderr pipe.
fn spawn_stderr_pump(
    manager: Arc<LoggerManager>,
    logger_name: String,
    mut lines: mpsc::Receiver<String>,
    heartbeat: Arc<AtomicBool>,
) {
    let file_path = manager
        .options
        .stderr_file_pattern
        .as_ref()
        .map(|pattern| PathBuf::from(pattern.replace("{logger}", &logger_name)));

    tokio::spawn(async move {
        let mut file = match &file_path {
            Some(path) => match tokio::fs::OpenOptions::new().create(true).append(true).open(path).await {
                Ok(f) => Some(f),
                Err(e) => {
                    tracing::error!(logger = %logger_name, path = %path.display(), error = %e, "failed to open stderr_file_pattern destination");
                    None
                }
            },
            None => None,
        };

        while let Some(line) = lines.recv().await {
            heartbeat.store(true, Ordering::Relaxed);
            status::publish_stderr_line(
                &manager.options.status_sink,
                Some(&logger_name),
                &line,
                now_seconds(),
            )
            .await;
            if let Some(file) = file.as_mut() {
                if let Err(e) = file.write_all(line.as_bytes()).await {
                    tracing::warn!(logger = %logger_name, error = %e, "failed to write to stderr_file_pattern destination");
                } else {
                    let _ = file.write_all(b"\n").await;
                }
            }
        }
    });
}

/// spec.md §4.4 step 2: a spawned child reports `Starting` until either a
/// heartbeat (its first observed stderr line) arrives or `min_uptime`
/// elapses without crashing, whichever comes first; only then `Running`.
fn observed_status(runtime: &RuntimeLogger, min_uptime: Duration) -> LoggerStatus {
    if runtime.fatal {
        LoggerStatus::Fatal
    } else if let Some(handle) = runtime.child.as_ref() {
        if runtime.heartbeat() || handle.started_at.elapsed() >= min_uptime {
            LoggerStatus::Running
        } else {
            LoggerStatus::Starting
        }
    } else if runtime.next_restart_at.is_some() {
        LoggerStatus::Backoff
    } else {
        LoggerStatus::Stopped
    }
}

fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// A file's modification time as Unix epoch seconds, or `None` if it can't
/// be read (missing, permission error, or a platform without mtime support).
fn file_mtime(path: &str) -> Option<f64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    modified
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs_f64())
}
