//! `CruiseDefinition`: the full cruise document (spec.md §3).

use indexmap::IndexMap;
use rvdas_core::registry::{reader_class_known, transform_class_known, writer_class_known};
use serde::{Deserialize, Serialize};

use super::logger_config::LoggerConfig;
use super::stage_spec::StageSpec;

/// `{id, start?, end?}` — descriptive cruise metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CruiseMeta {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

/// A logger's set of selectable config names (spec.md §3:
/// `loggers: map<logger_name, {configs: [config_name]}>`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggerEntry {
    pub configs: Vec<String>,
}

/// The full cruise document: `{cruise, loggers, configs, modes,
/// default_mode}` (spec.md §3).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CruiseDefinition {
    pub cruise: CruiseMeta,
    pub loggers: IndexMap<String, LoggerEntry>,
    pub configs: IndexMap<String, LoggerConfig>,
    pub modes: IndexMap<String, IndexMap<String, String>>,
    pub default_mode: String,
}

impl CruiseDefinition {
    /// Validate the invariants of spec.md §3:
    /// - every `config_name` referenced by a logger or mode exists in `configs`
    /// - every logger in a mode appears in `loggers`
    /// - every logger has at least its per-logger "off" config
    /// - `default_mode` exists
    pub fn validate(&self) -> Result<(), String> {
        if !self.modes.contains_key(&self.default_mode) {
            return Err(format!(
                "default_mode `{}` is not a defined mode",
                self.default_mode
            ));
        }

        for (logger_name, entry) in &self.loggers {
            if entry.configs.is_empty() {
                return Err(format!(
                    "logger `{logger_name}` has no configs (every logger needs at least its off config)"
                ));
            }
            for config_name in &entry.configs {
                if !self.configs.contains_key(config_name) {
                    return Err(format!(
                        "logger `{logger_name}` references unknown config `{config_name}`"
                    ));
                }
            }
        }

        for (mode_name, assignment) in &self.modes {
            for (logger_name, config_name) in assignment {
                if !self.loggers.contains_key(logger_name) {
                    return Err(format!(
                        "mode `{mode_name}` references logger `{logger_name}` not present in `loggers`"
                    ));
                }
                if !self.configs.contains_key(config_name) {
                    return Err(format!(
                        "mode `{mode_name}` assigns logger `{logger_name}` to unknown config `{config_name}`"
                    ));
                }
            }
        }

        for (config_name, config) in &self.configs {
            if !config.is_off() && (config.readers.is_empty() || config.writers.is_empty()) {
                return Err(format!(
                    "config `{config_name}` is not off but is missing a reader or writer"
                ));
            }
            for stage in &config.readers {
                check_class("reader", config_name, stage, reader_class_known)?;
            }
            for stage in &config.transforms {
                check_class("transform", config_name, stage, transform_class_known)?;
            }
            for stage in config.writers.iter().chain(config.stderr_writers.iter()) {
                check_class("writer", config_name, stage, writer_class_known)?;
            }
        }

        Ok(())
    }

    /// The config name a logger should run in `mode`, or `None` if the mode
    /// doesn't assign that logger (reconciliation treats this as "off").
    pub fn config_for(&self, mode: &str, logger: &str) -> Option<&str> {
        self.modes
            .get(mode)
            .and_then(|assignment| assignment.get(logger))
            .map(String::as_str)
    }
}

/// Reject an unregistered stage class at load time rather than at Listener
/// spawn time, where the Logger Manager would otherwise mistake it for a
/// transient failure and back off/retry it (spec.md §7: a bad config is
/// "never auto-retried").
fn check_class(
    kind: &str,
    config_name: &str,
    stage: &StageSpec,
    known: fn(&str, Option<&str>) -> bool,
) -> Result<(), String> {
    if known(&stage.class, stage.module.as_deref()) {
        Ok(())
    } else {
        Err(format!(
            "config `{config_name}` references unknown {kind} class `{}`{}",
            stage.class,
            stage
                .module
                .as_deref()
                .map(|m| format!(" in module `{m}`"))
                .unwrap_or_default(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageSpec;

    fn sample() -> CruiseDefinition {
        let mut configs = IndexMap::new();
        configs.insert(
            "off".to_string(),
            LoggerConfig {
                name: "gyr1->off".into(),
                ..Default::default()
            },
        );
        configs.insert(
            "net".to_string(),
            LoggerConfig {
                name: "gyr1->net".into(),
                readers: vec![StageSpec::new("SerialReader")],
                writers: vec![StageSpec::new("UDPWriter")],
                ..Default::default()
            },
        );
        let mut loggers = IndexMap::new();
        loggers.insert(
            "gyr1".to_string(),
            LoggerEntry {
                configs: vec!["off".into(), "net".into()],
            },
        );
        let mut underway = IndexMap::new();
        underway.insert("gyr1".to_string(), "net".to_string());
        let mut modes = IndexMap::new();
        modes.insert("off".to_string(), IndexMap::new());
        modes.insert("underway".to_string(), underway);

        CruiseDefinition {
            cruise: CruiseMeta {
                id: "test".into(),
                ..Default::default()
            },
            loggers,
            configs,
            modes,
            default_mode: "off".into(),
        }
    }

    #[test]
    fn valid_definition_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn unknown_default_mode_rejected() {
        let mut def = sample();
        def.default_mode = "bogus".into();
        assert!(def.validate().is_err());
    }

    #[test]
    fn mode_referencing_unknown_config_rejected() {
        let mut def = sample();
        def.modes
            .get_mut("underway")
            .unwrap()
            .insert("gyr1".into(), "nonexistent".into());
        assert!(def.validate().is_err());
    }

    #[test]
    fn unknown_reader_class_rejected() {
        let mut def = sample();
        def.configs.get_mut("net").unwrap().readers = vec![StageSpec::new("NoSuchReader")];
        let err = def.validate().unwrap_err();
        assert!(err.contains("NoSuchReader"), "unexpected error: {err}");
    }

    #[test]
    fn unknown_writer_class_rejected() {
        let mut def = sample();
        def.configs.get_mut("net").unwrap().writers = vec![StageSpec::new("NoSuchWriter")];
        assert!(def.validate().is_err());
    }

    #[test]
    fn config_for_resolves_mode_assignment() {
        let def = sample();
        assert_eq!(def.config_for("underway", "gyr1"), Some("net"));
        assert_eq!(def.config_for("off", "gyr1"), None);
    }
}
