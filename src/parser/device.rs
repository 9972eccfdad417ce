//! Device / DeviceType definitions (spec.md §4.5): the two-pass resolution
//! that takes a `ParseTransform`'s raw `{generic_field: value}` output and
//! renames it to a specific instrument's field names, via a `DeviceType`'s
//! ordered candidate `record_format` patterns and a `Device`'s rename map.
//!
//! Loaded from a YAML document shaped `{device_types: {...}, devices:
//! {...}}` — the same two top-level keys the config loader's `includes`
//! directive deep-merges in (spec.md §4.3).

use std::collections::BTreeMap;
use std::path::Path;

use indexmap::IndexMap;
use rvdas_core::error::ParseError;
use rvdas_core::record::{FieldMetadata, Scalar};
use rvdas_core::ConfigError;
use serde::Deserialize;

use super::record_format::RecordFormat;

#[derive(Clone, Debug, Deserialize)]
struct FieldInfoDoc {
    #[serde(default)]
    units: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
struct FormatEntryDoc {
    #[serde(default)]
    message_type: Option<String>,
    format: String,
}

#[derive(Clone, Debug, Deserialize)]
struct DeviceTypeDoc {
    #[serde(default)]
    fields: BTreeMap<String, FieldInfoDoc>,
    #[serde(default)]
    formats: Vec<FormatEntryDoc>,
}

#[derive(Clone, Debug, Deserialize)]
struct DeviceDoc {
    device_type: String,
    #[serde(default)]
    fields: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
struct DeviceDefinitionsDoc {
    #[serde(default)]
    device_types: IndexMap<String, DeviceTypeDoc>,
    #[serde(default)]
    devices: IndexMap<String, DeviceDoc>,
}

/// A compiled instrument model: candidate `record_format` patterns tried
/// in declaration order (first match wins), plus per-generic-field
/// descriptive metadata (spec.md §4.5).
#[derive(Clone, Debug)]
pub struct DeviceType {
    pub name: String,
    pub field_info: BTreeMap<String, (Option<String>, Option<String>)>,
    formats: Vec<(Option<String>, RecordFormat)>,
}

/// A physical instrument: names a `DeviceType` and renames that type's
/// generic field names to instrument-specific ones (spec.md §4.5, e.g.
/// `Latitude` -> `S330Latitude`). A generic field the device doesn't
/// mention is dropped from the resolved output.
#[derive(Clone, Debug)]
pub struct Device {
    pub name: String,
    pub device_type: String,
    pub field_renames: BTreeMap<String, String>,
}

/// The result of resolving one `(data_id, field_string)` pair against a
/// device's `DeviceType` (spec.md §4.5 scenario: `seap ... $GPVTG,...` ->
/// `{SeapCourseTrue, SeapMode, SeapSpeedKt}`).
#[derive(Clone, Debug, Default)]
pub struct DeviceResolution {
    pub fields: IndexMap<String, Scalar>,
    pub metadata: BTreeMap<String, FieldMetadata>,
}

/// The full set of device/device-type definitions available to a
/// `ParseTransform` (spec.md §4.5).
#[derive(Clone, Debug, Default)]
pub struct DeviceDefinitions {
    pub device_types: IndexMap<String, DeviceType>,
    pub devices: IndexMap<String, Device>,
}

impl DeviceDefinitions {
    pub fn load_str(yaml: &str) -> Result<Self, ConfigError> {
        let doc: DeviceDefinitionsDoc =
            serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
                path: "<device-definitions>".to_string(),
                source: e,
            })?;
        Self::compile(doc)
    }

    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Other {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::load_str(&text)
    }

    fn compile(doc: DeviceDefinitionsDoc) -> Result<Self, ConfigError> {
        let mut device_types = IndexMap::new();
        for (name, raw) in doc.device_types {
            let mut formats = Vec::with_capacity(raw.formats.len());
            for entry in raw.formats {
                let compiled = RecordFormat::compile(&entry.format).map_err(|e| ConfigError::Other {
                    reason: format!("device type `{name}` format `{}`: {e}", entry.format),
                })?;
                formats.push((entry.message_type, compiled));
            }
            let field_info = raw
                .fields
                .into_iter()
                .map(|(field, info)| (field, (info.units, info.description)))
                .collect();
            device_types.insert(
                name.clone(),
                DeviceType {
                    name,
                    field_info,
                    formats,
                },
            );
        }

        let devices = doc
            .devices
            .into_iter()
            .map(|(name, raw)| {
                (
                    name.clone(),
                    Device {
                        name,
                        device_type: raw.device_type,
                        field_renames: raw.fields,
                    },
                )
            })
            .collect();

        Ok(Self {
            device_types,
            devices,
        })
    }

    /// Resolve `field_string` against `data_id`'s device (spec.md §4.5):
    /// find the Device, find its DeviceType, try each candidate pattern in
    /// declaration order until one matches, then rename matched fields per
    /// the Device's map — fields the Device doesn't rename are dropped.
    pub fn resolve(&self, data_id: &str, field_string: &str) -> Result<DeviceResolution, ParseError> {
        let device = self
            .devices
            .get(data_id)
            .ok_or_else(|| ParseError::UnknownDataId {
                data_id: data_id.to_string(),
            })?;
        let device_type = self
            .device_types
            .get(&device.device_type)
            .ok_or_else(|| ParseError::UnknownDataId {
                data_id: data_id.to_string(),
            })?;

        let mut last_err = None;
        for (_message_type, format) in &device_type.formats {
            match format.parse(field_string) {
                Ok(raw_fields) => {
                    let mut resolution = DeviceResolution::default();
                    for (generic_name, value) in raw_fields {
                        let Some(renamed) = device.field_renames.get(&generic_name) else {
                            continue;
                        };
                        if let Some((units, description)) = device_type.field_info.get(&generic_name) {
                            resolution.metadata.insert(
                                renamed.clone(),
                                FieldMetadata {
                                    units: units.clone(),
                                    description: description.clone(),
                                    device: Some(device.name.clone()),
                                    device_type: Some(device.device_type.clone()),
                                },
                            );
                        }
                        resolution.fields.insert(renamed.clone(), value);
                    }
                    return Ok(resolution);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or(ParseError::NoPatternMatched {
            device_type: device.device_type.clone(),
            field_string: field_string.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFS: &str = r#"
device_types:
  Seapath330:
    fields:
      CourseTrue: {units: degrees, description: "true course over ground"}
      SpeedKt: {units: knots, description: "speed over ground"}
      Mode: {description: "fix mode"}
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
    fn resolves_and_renames_seapath_fields() {
        let defs = DeviceDefinitions::load_str(DEFS).unwrap();
        let resolution = defs
            .resolve("seap", "$GPVTG,213.66,T,,M,9.4,N,,K,A*1E")
            .unwrap();
        assert_eq!(resolution.fields["SeapCourseTrue"], Scalar::Float(213.66));
        assert_eq!(resolution.fields["SeapSpeedKt"], Scalar::Float(9.4));
        assert_eq!(resolution.fields["SeapMode"], Scalar::Str("A".to_string()));
        assert_eq!(resolution.fields.len(), 3);
        assert_eq!(
            resolution.metadata["SeapCourseTrue"].units.as_deref(),
            Some("degrees")
        );
    }

    #[test]
    fn unknown_data_id_is_an_error() {
        let defs = DeviceDefinitions::load_str(DEFS).unwrap();
        assert!(defs.resolve("nope", "$GPVTG,1,T,,M,2,N,,K,A*1E").is_err());
    }

    #[test]
    fn no_pattern_matches_is_an_error() {
        let defs = DeviceDefinitions::load_str(DEFS).unwrap();
        assert!(defs.resolve("seap", "$GPGGA,not,a,vtg,sentence").is_err());
    }
}
