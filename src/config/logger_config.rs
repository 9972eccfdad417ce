//! `LoggerConfig`: a named pipeline definition (spec.md §3).

use serde::{Deserialize, Serialize};

use super::stage_spec::StageSpec;

/// `{name, readers, transforms, writers, stderr_writers?, interval?,
/// check_format?, host_id?}`. An empty/missing readers+writers pair is the
/// "off" configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggerConfig {
    pub name: String,
    #[serde(default)]
    pub readers: Vec<StageSpec>,
    #[serde(default)]
    pub transforms: Vec<StageSpec>,
    #[serde(default)]
    pub writers: Vec<StageSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stderr_writers: Vec<StageSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_format: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
}

impl LoggerConfig {
    /// Whether this is the "off" configuration: no readers and no writers
    /// (spec.md §3).
    pub fn is_off(&self) -> bool {
        self.readers.is_empty() && self.writers.is_empty()
    }
}
