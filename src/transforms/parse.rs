//! `ParseTransform`: turns a raw text record into a structured one via the
//! `record_format` mini-language, then (when a device definitions file is
//! configured) a second pass that renames fields per Device/DeviceType
//! (spec.md §4.5).

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;
use rvdas_core::record::{FieldValue, Metadata, Record, RecordKind, StructuredRecord};
use rvdas_core::registry::TransformDescription;
use rvdas_core::stage::{Transform, TransformConfig};
use serde::{Deserialize, Serialize};

use crate::parser::{DeviceDefinitions, RecordFormat};

/// Splits a raw text record into `data_id`, an ISO-8601 `timestamp`, and
/// the remainder (`field_string`) handed to the device/device-type pass —
/// exactly the shape spec.md §8 scenario 5 parses (`"seap
/// 2014-08-01T00:00:00.814000Z $GPVTG,..."`).
fn default_record_format() -> String {
    "{data_id:w} {timestamp:ts} {field_string:nc}".to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParseTransformConfig {
    #[serde(default = "default_record_format")]
    pub record_format: String,
    /// Path to a YAML file of `{device_types: {...}, devices: {...}}`
    /// (spec.md §4.5). Without it, records are split into
    /// `data_id`/`timestamp` only — no field renaming is possible because
    /// there is no DeviceType to supply candidate formats for
    /// `field_string`.
    #[serde(default)]
    pub definition_path: Option<String>,
    /// Seconds between metadata attachments per `data_id`; `None` never
    /// attaches metadata (spec.md §4.5).
    #[serde(default)]
    pub metadata_interval: Option<f64>,
}

inventory::submit! {
    TransformDescription::new::<ParseTransformConfig>("ParseTransform")
}

impl TransformConfig for ParseTransformConfig {
    fn build(&self) -> anyhow::Result<Box<dyn Transform>> {
        let top_format = RecordFormat::compile(&self.record_format)?;
        let definitions = match &self.definition_path {
            Some(path) => Some(DeviceDefinitions::load_file(path)?),
            None => None,
        };
        Ok(Box::new(ParseTransformImpl {
            top_format,
            definitions,
            metadata_interval: self.metadata_interval,
            last_metadata_at: HashMap::new(),
        }))
    }

    fn accepts(&self) -> Option<RecordKind> {
        Some(RecordKind::Text)
    }
    fn produces(&self) -> Option<RecordKind> {
        Some(RecordKind::Structured)
    }
}

struct ParseTransformImpl {
    top_format: RecordFormat,
    definitions: Option<DeviceDefinitions>,
    metadata_interval: Option<f64>,
    last_metadata_at: HashMap<String, f64>,
}

impl ParseTransformImpl {
    /// Whether a metadata block should be attached to this record, per
    /// `data_id` and the record's own timestamp — driven by record data
    /// rather than wall-clock time, so a Transform stays pure with respect
    /// to its inputs (spec.md §4.1).
    fn should_attach_metadata(&mut self, data_id: &str, timestamp: Option<f64>) -> bool {
        let interval = match self.metadata_interval {
            Some(i) if i > 0.0 => i,
            _ => return false,
        };
        let Some(now) = timestamp else {
            return false;
        };
        match self.last_metadata_at.get(data_id) {
            Some(&last) if now - last < interval => false,
            _ => {
                self.last_metadata_at.insert(data_id.to_string(), now);
                true
            }
        }
    }
}

impl Transform for ParseTransformImpl {
    fn transform(&mut self, record: Record) -> Vec<Record> {
        let Some(text) = record.as_text() else {
            return vec![record];
        };

        let top_fields = match self.top_format.parse(&text) {
            Ok(fields) => fields,
            Err(e) => {
                tracing::debug!(error = %e, "parse: record_format did not match");
                metrics::counter!("rvdas_parse_errors_total").increment(1);
                return Vec::new();
            }
        };

        let data_id = top_fields
            .get("data_id")
            .map(|v| v.to_string())
            .unwrap_or_default();
        let timestamp = top_fields.get("timestamp").and_then(|v| match v {
            rvdas_core::record::Scalar::Float(f) => Some(*f),
            _ => None,
        });
        let field_string = top_fields
            .get("field_string")
            .map(|v| v.to_string())
            .unwrap_or_default();

        let mut structured = StructuredRecord {
            data_id: Some(data_id.clone()),
            timestamp,
            fields: IndexMap::new(),
            metadata: None,
        };

        if let Some(defs) = &self.definitions {
            match defs.resolve(&data_id, &field_string) {
                Ok(resolution) => {
                    for (name, value) in resolution.fields {
                        structured.fields.insert(name, FieldValue::Scalar(value));
                    }
                    if self.should_attach_metadata(&data_id, timestamp) {
                        structured.metadata = Some(Metadata {
                            fields: resolution.metadata,
                            extra: BTreeMap::new(),
                        });
                    }
                }
                Err(e) => {
                    tracing::debug!(data_id = %data_id, error = %e, "parse: device definition resolution failed");
                    metrics::counter!("rvdas_parse_errors_total").increment(1);
                    return Vec::new();
                }
            }
        }

        vec![Record::structured(structured)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFS: &str = r#"
device_types:
  Seapath330:
    fields:
      CourseTrue: {units: degrees}
      SpeedKt: {units: knots}
      Mode: {}
    formats:
      - message_type: GPVTG
        format: "$GPVTG,{CourseTrue:of},T,,M,{SpeedKt:of},N,,K,{Mode:w}*"
devices:
  seap:
    device_type: Seapath330
    fields:
      CourseTrue: SeapCourseTrue
      SpeedKt: SeapSpeedKt
      Mode: SeapMode
"#;

    #[test]
    fn parses_and_renames_without_metadata() {
        let cfg = ParseTransformConfig {
            record_format: default_record_format(),
            definition_path: None,
            metadata_interval: None,
        };
        let mut transform = ParseTransformImpl {
            top_format: RecordFormat::compile(&cfg.record_format).unwrap(),
            definitions: Some(DeviceDefinitions::load_str(DEFS).unwrap()),
            metadata_interval: None,
            last_metadata_at: HashMap::new(),
        };
        let input = Record::text(
            "seap 2014-08-01T00:00:00.814000Z $GPVTG,213.66,T,,M,9.4,N,,K,A*1E",
        );
        let out = transform.transform(input);
        assert_eq!(out.len(), 1);
        let structured = out[0].as_structured().unwrap();
        assert_eq!(structured.data_id.as_deref(), Some("seap"));
        assert_eq!(structured.timestamp, Some(1406851200.814));
        assert_eq!(structured.fields.len(), 3);
        assert!(structured.metadata.is_none());
    }

    #[test]
    fn metadata_attached_on_first_record_then_suppressed() {
        let mut transform = ParseTransformImpl {
            top_format: RecordFormat::compile(&default_record_format()).unwrap(),
            definitions: Some(DeviceDefinitions::load_str(DEFS).unwrap()),
            metadata_interval: Some(60.0),
            last_metadata_at: HashMap::new(),
        };
        let first = transform.transform(Record::text(
            "seap 2014-08-01T00:00:00.000000Z $GPVTG,213.66,T,,M,9.4,N,,K,A*1E",
        ));
        assert!(first[0].as_structured().unwrap().metadata.is_some());

        let second = transform.transform(Record::text(
            "seap 2014-08-01T00:00:10.000000Z $GPVTG,213.66,T,,M,9.4,N,,K,A*1E",
        ));
        assert!(second[0].as_structured().unwrap().metadata.is_none());
    }

    #[test]
    fn unparseable_top_level_record_is_dropped() {
        let mut transform = ParseTransformImpl {
            top_format: RecordFormat::compile(&default_record_format()).unwrap(),
            definitions: None,
            metadata_interval: None,
            last_metadata_at: HashMap::new(),
        };
        assert!(transform.transform(Record::text("not a valid record")).is_empty());
    }
}
