//! The `record_format` mini-language (spec.md §4.5): a literal-text pattern
//! interleaved with typed `{name:type}` placeholders, compiled once to a
//! `Regex` and then applied per record.
//!
//! Supported placeholder types:
//! - `d` — integer
//! - `f` — float (required)
//! - `of` — optional float; an empty capture (two adjacent delimiters)
//!   yields no field rather than an error
//! - `w` — word: one or more characters excluding `,` and `*` (NMEA field
//!   and checksum delimiters)
//! - `ts` — ISO-8601 UTC timestamp, converted to float Unix seconds
//! - `lat` / `lon` — NMEA degrees-minutes-and-hemisphere pair
//!   (`ddmm.mmmm,N/S` or `dddmm.mmmm,E/W`); the placeholder's own capture
//!   spans the embedded comma, so the pattern string must not place a
//!   literal comma immediately after it
//! - `nc` ("no-convert") — the remainder of the record, consumed greedily;
//!   useful as a trailing catch-all field
//!
//! The compiled regex anchors only at the start of the text (`^`); trailing
//! characters the pattern doesn't account for (e.g. an NMEA checksum) are
//! ignored rather than rejected, matching the "best-effort" posture spec.md
//! §9 asks for `check_format`-adjacent matching.

use indexmap::IndexMap;
use regex::Regex;

use rvdas_core::error::{FieldTypeSnafu, MalformedSnafu, ParseError};
use rvdas_core::record::Scalar;
use snafu::ResultExt;

/// A placeholder's declared type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Float,
    OptionalFloat,
    Word,
    Iso8601Timestamp,
    NmeaLat,
    NmeaLon,
    Rest,
}

impl FieldType {
    fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "d" => FieldType::Int,
            "f" => FieldType::Float,
            "of" => FieldType::OptionalFloat,
            "w" => FieldType::Word,
            "ts" => FieldType::Iso8601Timestamp,
            "lat" => FieldType::NmeaLat,
            "lon" => FieldType::NmeaLon,
            "nc" => FieldType::Rest,
            _ => return None,
        })
    }

    /// The regex fragment capturing this field type's raw text, assuming
    /// it is named `name` by the caller.
    fn capture_group(self, name: &str) -> String {
        match self {
            FieldType::Int => format!("(?P<{name}>-?[0-9]+)"),
            FieldType::Float => format!("(?P<{name}>-?[0-9]+(?:\\.[0-9]+)?)"),
            FieldType::OptionalFloat => format!("(?P<{name}>-?[0-9]+(?:\\.[0-9]+)?)?"),
            FieldType::Word => format!("(?P<{name}>[^,*]+)"),
            FieldType::Iso8601Timestamp => {
                format!("(?P<{name}>[0-9]{{4}}-[0-9]{{2}}-[0-9]{{2}}T[0-9]{{2}}:[0-9]{{2}}:[0-9]{{2}}(?:\\.[0-9]+)?Z?)")
            }
            FieldType::NmeaLat => format!("(?P<{name}>[0-9]{{2,3}}[0-9]+\\.[0-9]+,[NS])"),
            FieldType::NmeaLon => format!("(?P<{name}>[0-9]{{2,3}}[0-9]+\\.[0-9]+,[EW])"),
            FieldType::Rest => format!("(?s:(?P<{name}>.+))"),
        }
    }
}

/// A compiled `record_format` pattern: the regex plus each placeholder's
/// declared type, in declaration order.
#[derive(Clone, Debug)]
pub struct RecordFormat {
    pattern: String,
    regex: Regex,
    fields: Vec<(String, FieldType)>,
}

impl RecordFormat {
    /// Compile a `record_format` pattern string. `{name:type}` placeholders
    /// are converted to named capture groups; every other character is
    /// regex-escaped literal text.
    pub fn compile(pattern: &str) -> Result<Self, ParseError> {
        let mut regex_src = String::from("^");
        let mut fields = Vec::new();
        let bytes = pattern.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'{' {
                let close = pattern[i..].find('}').map(|off| i + off).ok_or_else(|| {
                    MalformedSnafu {
                        reason: format!("unterminated placeholder in record_format `{pattern}`"),
                    }
                    .build()
                })?;
                let inner = &pattern[i + 1..close];
                let (name, code) = inner.split_once(':').ok_or_else(|| {
                    MalformedSnafu {
                        reason: format!("placeholder `{{{inner}}}` missing `:type`"),
                    }
                    .build()
                })?;
                let field_type = FieldType::from_code(code).ok_or_else(|| {
                    MalformedSnafu {
                        reason: format!("unknown record_format field type `{code}`"),
                    }
                    .build()
                })?;
                regex_src.push_str(&field_type.capture_group(name));
                fields.push((name.to_string(), field_type));
                i = close + 1;
            } else {
                let ch = pattern[i..].chars().next().unwrap();
                regex_src.push_str(&regex::escape(&ch.to_string()));
                i += ch.len_utf8();
            }
        }
        let regex = Regex::new(&regex_src).map_err(|e| {
            MalformedSnafu {
                reason: format!("record_format `{pattern}` compiled to invalid regex: {e}"),
            }
            .build()
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            fields,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Apply this pattern to `text`, producing the matched fields in
    /// declaration order. An absent `of` capture is omitted rather than
    /// erroring; every other unmatched required field is a `ParseError`
    /// (surfaced as the whole match failing, since a required group that
    /// doesn't match means the regex itself didn't match).
    pub fn parse(&self, text: &str) -> Result<IndexMap<String, Scalar>, ParseError> {
        let captures = self.regex.captures(text).ok_or_else(|| {
            ParseError::NoPatternMatched {
                device_type: String::new(),
                field_string: text.to_string(),
            }
        })?;
        let mut out = IndexMap::new();
        for (name, field_type) in &self.fields {
            let Some(raw) = captures.name(name) else {
                continue;
            };
            let raw = raw.as_str();
            if raw.is_empty() && *field_type == FieldType::OptionalFloat {
                continue;
            }
            let scalar = convert(name, *field_type, raw)?;
            out.insert(name.clone(), scalar);
        }
        Ok(out)
    }
}

fn convert(field: &str, field_type: FieldType, raw: &str) -> Result<Scalar, ParseError> {
    match field_type {
        FieldType::Int => raw
            .parse::<i64>()
            .map(Scalar::Int)
            .context(FieldTypeSnafu {
                field: field.to_string(),
                expected: "integer".to_string(),
                value: raw.to_string(),
            }),
        FieldType::Float | FieldType::OptionalFloat => raw
            .parse::<f64>()
            .map(Scalar::Float)
            .context(FieldTypeSnafu {
                field: field.to_string(),
                expected: "float".to_string(),
                value: raw.to_string(),
            }),
        FieldType::Word | FieldType::Rest => Ok(Scalar::Str(raw.to_string())),
        FieldType::Iso8601Timestamp => parse_iso8601(raw)
            .ok_or_else(|| {
                FieldTypeSnafu {
                    field: field.to_string(),
                    expected: "ISO-8601 timestamp".to_string(),
                    value: raw.to_string(),
                }
                .build()
            })
            .map(Scalar::Float),
        FieldType::NmeaLat => parse_nmea_coord(raw, "N", "S").ok_or_else(|| {
            FieldTypeSnafu {
                field: field.to_string(),
                expected: "NMEA latitude".to_string(),
                value: raw.to_string(),
            }
            .build()
        }),
        FieldType::NmeaLon => parse_nmea_coord(raw, "E", "W").ok_or_else(|| {
            FieldTypeSnafu {
                field: field.to_string(),
                expected: "NMEA longitude".to_string(),
                value: raw.to_string(),
            }
            .build()
        }),
    }
}

/// Parse an ISO-8601 UTC timestamp to float Unix seconds (spec.md §4.5
/// "Timestamps are float UTC seconds since Unix epoch").
pub fn parse_iso8601(text: &str) -> Option<Scalar> {
    let dt = chrono::DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .or_else(|| {
            chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| chrono::DateTime::<chrono::Utc>::from_naive_utc_and_offset(naive, chrono::Utc))
        })?;
    let seconds = dt.timestamp() as f64 + dt.timestamp_subsec_nanos() as f64 / 1_000_000_000.0;
    Some(Scalar::Float(seconds))
}

/// `ddmm.mmmm,H` (or `dddmm.mmmm,H` for longitude) to signed decimal
/// degrees (spec.md §4.1 "NMEA lat/lon").
fn parse_nmea_coord(raw: &str, positive: &str, negative: &str) -> Option<Scalar> {
    let (value, hemisphere) = raw.split_once(',')?;
    let value: f64 = value.parse().ok()?;
    let degrees = (value / 100.0).floor();
    let minutes = value - degrees * 100.0;
    let decimal = degrees + minutes / 60.0;
    let signed = if hemisphere == positive {
        decimal
    } else if hemisphere == negative {
        -decimal
    } else {
        return None;
    };
    Some(Scalar::Float(signed))
}

/// Standalone convenience wrapper: compile `pattern` and parse `text` in
/// one call, for callers (tests, `ParseTransform`'s top-level format) that
/// don't need to reuse the compiled pattern.
pub fn parse_fields(pattern: &str, text: &str) -> Result<IndexMap<String, Scalar>, ParseError> {
    RecordFormat::compile(pattern)?.parse(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_data_id_timestamp_and_rest() {
        let fields = parse_fields(
            "{data_id:w} {timestamp:ts} {field_string:nc}",
            "seap 2014-08-01T00:00:00.814000Z $GPVTG,213.66,T,,M,9.4,N,,K,A*1E",
        )
        .unwrap();
        assert_eq!(fields["data_id"], Scalar::Str("seap".to_string()));
        match &fields["timestamp"] {
            Scalar::Float(f) => assert!((*f - 1406851200.814).abs() < 1e-3),
            other => panic!("expected float timestamp, got {other:?}"),
        }
        assert_eq!(
            fields["field_string"],
            Scalar::Str("$GPVTG,213.66,T,,M,9.4,N,,K,A*1E".to_string())
        );
    }

    #[test]
    fn optional_float_omitted_when_blank() {
        let fields = parse_fields("{a:of},{b:w}", ",hello").unwrap();
        assert!(!fields.contains_key("a"));
        assert_eq!(fields["b"], Scalar::Str("hello".to_string()));
    }

    #[test]
    fn optional_float_present_when_populated() {
        let fields = parse_fields("{a:of},{b:w}", "1.5,hello").unwrap();
        assert_eq!(fields["a"], Scalar::Float(1.5));
    }

    #[test]
    fn nmea_latitude_converts_to_signed_decimal_degrees() {
        let fields = parse_fields("{lat:lat}", "3907.0190,S").unwrap();
        match &fields["lat"] {
            Scalar::Float(f) => assert!((*f - -(39.0 + 7.019 / 60.0)).abs() < 1e-6),
            other => panic!("expected float, got {other:?}"),
        }
    }

    #[test]
    fn gpvtg_pattern_extracts_course_speed_and_mode() {
        let format = RecordFormat::compile(
            "$GPVTG,{CourseTrue:of},T,,M,{SpeedKt:of},N,,K,{Mode:w}*",
        )
        .unwrap();
        let fields = format.parse("$GPVTG,213.66,T,,M,9.4,N,,K,A*1E").unwrap();
        assert_eq!(fields["CourseTrue"], Scalar::Float(213.66));
        assert_eq!(fields["SpeedKt"], Scalar::Float(9.4));
        assert_eq!(fields["Mode"], Scalar::Str("A".to_string()));
    }

    #[test]
    fn no_match_is_a_parse_error() {
        let format = RecordFormat::compile("$GPGGA,{a:w}").unwrap();
        assert!(format.parse("$GPVTG,foo").is_err());
    }
}
