//! Status publication (spec.md §4.4 "Status publication"): after every
//! reconciliation or observed state change, the manager publishes
//! `status:cruise_definition`, `status:cruise_mode`, `status:logger_status`,
//! `status:file_update`, and `stderr:logger:<name>` / `stderr:logger_manager`
//! fields through the Cached Data Server's field-cache interface.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;
use rvdas_core::record::Scalar;

use crate::cached_data_server::{CachedDataClient, CachedDataServer, PublishData, PublishValue};
use crate::config::CruiseDefinition;

use super::store::LoggerState;

/// Where status fields are published: the embedded Cached Data Server
/// in-process, a remote one over its UDP ingest port, or nowhere (when the
/// manager runs with neither `--start_data_server` nor
/// `--data_server_websocket`).
pub enum StatusSink {
    Embedded(Arc<CachedDataServer>),
    Remote(CachedDataClient),
    None,
}

impl StatusSink {
    async fn publish_scalar(&self, field: &str, value: Scalar, timestamp: f64) {
        let mut fields = IndexMap::new();
        fields.insert(field.to_string(), PublishValue::Scalar(value));
        let data = PublishData {
            timestamp: Some(timestamp),
            fields,
            metadata: None,
        };
        match self {
            StatusSink::Embedded(server) => server.ingest(&data),
            StatusSink::Remote(client) => {
                if let Err(e) = client.publish(&data).await {
                    tracing::warn!(%field, error = %e, "failed to publish status field");
                }
            }
            StatusSink::None => {}
        }
    }
}

/// The digest published as `status:cruise_definition` (spec.md §4.4):
/// id, mode list, logger list, active mode, per-logger active configs,
/// filename, loaded timestamp.
#[derive(Clone, Debug, serde::Serialize)]
pub struct CruiseDefinitionDigest {
    pub cruise_id: String,
    pub modes: Vec<String>,
    pub loggers: Vec<String>,
    pub active_mode: String,
    pub active_configs: BTreeMap<String, String>,
    pub filename: Option<String>,
    pub loaded_at: f64,
}

pub fn digest(
    definition: &CruiseDefinition,
    active_mode: &str,
    active_configs: &BTreeMap<String, String>,
    filename: Option<&str>,
    loaded_at: f64,
) -> CruiseDefinitionDigest {
    CruiseDefinitionDigest {
        cruise_id: definition.cruise.id.clone(),
        modes: definition.modes.keys().cloned().collect(),
        loggers: definition.loggers.keys().cloned().collect(),
        active_mode: active_mode.to_string(),
        active_configs: active_configs.clone(),
        filename: filename.map(str::to_string),
        loaded_at,
    }
}

pub async fn publish_cruise_definition(
    sink: &StatusSink,
    digest: &CruiseDefinitionDigest,
    now: f64,
) {
    let json = serde_json::to_string(digest).unwrap_or_default();
    sink.publish_scalar("status:cruise_definition", Scalar::Str(json), now).await;
}

pub async fn publish_cruise_mode(sink: &StatusSink, active_mode: &str, now: f64) {
    sink.publish_scalar("status:cruise_mode", Scalar::Str(active_mode.to_string()), now)
        .await;
}

pub async fn publish_logger_status(
    sink: &StatusSink,
    states: &IndexMap<String, LoggerState>,
    now: f64,
) {
    let json = serde_json::to_string(states).unwrap_or_default();
    sink.publish_scalar("status:logger_status", Scalar::Str(json), now).await;
}

pub async fn publish_file_update(sink: &StatusSink, mtime: f64, now: f64) {
    sink.publish_scalar("status:file_update", Scalar::Float(mtime), now).await;
}

pub async fn publish_stderr_line(sink: &StatusSink, logger: Option<&str>, line: &str, now: f64) {
    let field = match logger {
        Some(name) => format!("stderr:logger:{name}"),
        None => "stderr:logger_manager".to_string(),
    };
    sink.publish_scalar(&field, Scalar::Str(line.to_string()), now).await;
}
