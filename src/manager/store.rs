//! The persisted logger-manager store (spec.md §3 "Store snapshot", §5
//! "write-through... a key-value row containing the serialized definition
//! plus a timestamp; a separate message log table appends human-readable
//! events", §6 `--database {memory|sqlite|django}`).

use serde::{Deserialize, Serialize};

use crate::config::CruiseDefinition;

/// One observed logger's state (spec.md §3 "LoggerState").
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggerState {
    pub active_config: String,
    pub status: LoggerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default)]
    pub last_start: f64,
    #[serde(default)]
    pub failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoggerStatus {
    #[default]
    Stopped,
    Starting,
    Running,
    Backoff,
    Exited,
    Fatal,
}

/// `(timestamp, level, cruise_id, source, user, message)` — the
/// append-only human-readable event log (spec.md §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogMessage {
    pub timestamp: f64,
    pub level: String,
    pub cruise_id: String,
    pub source: String,
    pub user: String,
    pub message: String,
}

/// The full persisted/observed state snapshot (spec.md §3 "Store
/// snapshot").
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub definition: Option<CruiseDefinition>,
    pub definition_loaded_at: f64,
    pub desired_mode: String,
    pub per_logger_overrides: indexmap::IndexMap<String, String>,
    pub last_update: f64,
    #[serde(default)]
    pub message_log: Vec<LogMessage>,
}

/// A persisted-state backend (spec.md §6 `--database`). `memory` and
/// `sqlite` are implemented; `django` is a third-party web framework's ORM
/// with no meaning outside that deployment and is intentionally not
/// implemented here (see DESIGN.md).
pub trait StoreBackend: Send + Sync {
    fn load(&self) -> anyhow::Result<StoreSnapshot>;
    fn save(&self, snapshot: &StoreSnapshot) -> anyhow::Result<()>;
    fn append_message(&self, message: &LogMessage) -> anyhow::Result<()>;
}

/// In-process, non-persistent backend — the default, and what the test
/// suite exercises.
pub struct MemoryBackend {
    state: std::sync::Mutex<StoreSnapshot>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: std::sync::Mutex::new(StoreSnapshot::default()),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreBackend for MemoryBackend {
    fn load(&self) -> anyhow::Result<StoreSnapshot> {
        Ok(self.state.lock().unwrap().clone())
    }

    fn save(&self, snapshot: &StoreSnapshot) -> anyhow::Result<()> {
        *self.state.lock().unwrap() = snapshot.clone();
        Ok(())
    }

    fn append_message(&self, message: &LogMessage) -> anyhow::Result<()> {
        self.state.lock().unwrap().message_log.push(message.clone());
        Ok(())
    }
}

/// SQLite-backed store: a single current-definition row plus an
/// append-only message log table (spec.md §6 "Persisted state layout").
pub struct SqliteBackend {
    conn: std::sync::Mutex<rusqlite::Connection>,
}

impl SqliteBackend {
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS current_state (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                snapshot_json TEXT NOT NULL,
                loaded_at REAL NOT NULL
            );
            CREATE TABLE IF NOT EXISTS message_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp REAL NOT NULL,
                level TEXT NOT NULL,
                cruise_id TEXT NOT NULL,
                source TEXT NOT NULL,
                user TEXT NOT NULL,
                message TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: std::sync::Mutex::new(conn),
        })
    }
}

impl StoreBackend for SqliteBackend {
    fn load(&self) -> anyhow::Result<StoreSnapshot> {
        let conn = self.conn.lock().unwrap();
        let mut snapshot: StoreSnapshot = conn
            .query_row(
                "SELECT snapshot_json FROM current_state WHERE id = 0",
                [],
                |row| {
                    let json: String = row.get(0)?;
                    Ok(json)
                },
            )
            .map(|json| serde_json::from_str(&json).unwrap_or_default())
            .unwrap_or_default();

        let mut stmt = conn.prepare(
            "SELECT timestamp, level, cruise_id, source, user, message FROM message_log ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(LogMessage {
                timestamp: row.get(0)?,
                level: row.get(1)?,
                cruise_id: row.get(2)?,
                source: row.get(3)?,
                user: row.get(4)?,
                message: row.get(5)?,
            })
        })?;
        snapshot.message_log = rows.collect::<Result<_, _>>()?;
        Ok(snapshot)
    }

    fn save(&self, snapshot: &StoreSnapshot) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        let json = serde_json::to_string(snapshot)?;
        conn.execute(
            "INSERT INTO current_state (id, snapshot_json, loaded_at) VALUES (0, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET snapshot_json = excluded.snapshot_json, loaded_at = excluded.loaded_at",
            rusqlite::params![json, snapshot.definition_loaded_at],
        )?;
        Ok(())
    }

    fn append_message(&self, message: &LogMessage) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO message_log (timestamp, level, cruise_id, source, user, message) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                message.timestamp,
                message.level,
                message.cruise_id,
                message.source,
                message.user,
                message.message
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_round_trips_snapshot() {
        let backend = MemoryBackend::new();
        let mut snapshot = StoreSnapshot::default();
        snapshot.desired_mode = "underway".to_string();
        backend.save(&snapshot).unwrap();
        let loaded = backend.load().unwrap();
        assert_eq!(loaded.desired_mode, "underway");
    }

    #[test]
    fn sqlite_backend_round_trips_snapshot_and_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let backend = SqliteBackend::open(path.to_str().unwrap()).unwrap();
        let mut snapshot = StoreSnapshot::default();
        snapshot.desired_mode = "port".to_string();
        backend.save(&snapshot).unwrap();
        backend
            .append_message(&LogMessage {
                timestamp: 1.0,
                level: "info".into(),
                cruise_id: "test".into(),
                source: "manager".into(),
                user: "system".into(),
                message: "loaded".into(),
            })
            .unwrap();
        let loaded = backend.load().unwrap();
        assert_eq!(loaded.desired_mode, "port");
        assert_eq!(loaded.message_log.len(), 1);
    }
}
