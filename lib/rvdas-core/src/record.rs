//! The `Record` value: the unit that flows through every pipeline.
//!
//! A `Record` is immutable once emitted by a stage; downstream stages
//! produce new `Record`s rather than mutating one in place (spec.md §3).

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single scalar value carried by a structured record field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Int(v) => write!(f, "{v}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::Str(v) => write!(f, "{v}"),
        }
    }
}

/// A field's value: either a bare scalar, or a time series of
/// `(timestamp_seconds, scalar)` pairs — the latter is how
/// `CachedDataWriter` and the Cached Data Server's `publish` message
/// represent multiple samples for one field in a single record (spec.md §3,
/// §4.6).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Scalar(Scalar),
    Series(Vec<(f64, Scalar)>),
}

impl FieldValue {
    /// The most recent scalar carried by this value, if any.
    pub fn latest(&self) -> Option<&Scalar> {
        match self {
            FieldValue::Scalar(s) => Some(s),
            FieldValue::Series(series) => series.last().map(|(_, s)| s),
        }
    }
}

/// Per-field descriptive metadata, attached at `metadata_interval` by
/// `ParseTransform` (spec.md §4.5).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMetadata {
    pub units: Option<String>,
    pub description: Option<String>,
    pub device: Option<String>,
    pub device_type: Option<String>,
}

/// Metadata attached to a structured record: either free-form (arbitrary
/// transform-produced data) or the field-description block above.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldMetadata>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A parsed, structured record: the output of `ParseTransform` and the
/// shape expected by the Cached Data Server's `publish` message.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredRecord {
    pub data_id: Option<String>,
    pub timestamp: Option<f64>,
    pub fields: IndexMap<String, FieldValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

/// The unit flowing through every pipeline: a tagged variant over raw
/// bytes, plain text, or a structured record (spec.md §3).
///
/// A `Record` is immutable once created; transforms that "modify" a record
/// return a new one.
#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    Bytes(Bytes),
    Text(String),
    Structured(Box<StructuredRecord>),
}

impl Record {
    pub fn text(s: impl Into<String>) -> Self {
        Record::Text(s.into())
    }

    pub fn structured(s: StructuredRecord) -> Self {
        Record::Structured(Box::new(s))
    }

    /// The record kind, used by `check_format`'s build-time compatibility
    /// check (spec.md §4.2, §9).
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Bytes(_) => RecordKind::Bytes,
            Record::Text(_) => RecordKind::Text,
            Record::Structured(_) => RecordKind::Structured,
        }
    }

    /// Best-effort conversion to a `&str`, for stages (PrefixTransform,
    /// text writers, …) that operate on text regardless of whether the
    /// record arrived as bytes or text.
    pub fn as_text(&self) -> Option<std::borrow::Cow<'_, str>> {
        match self {
            Record::Text(s) => Some(std::borrow::Cow::Borrowed(s)),
            Record::Bytes(b) => Some(String::from_utf8_lossy(b)),
            Record::Structured(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&StructuredRecord> {
        match self {
            Record::Structured(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_structured(self) -> Option<StructuredRecord> {
        match self {
            Record::Structured(s) => Some(*s),
            _ => None,
        }
    }
}

impl From<String> for Record {
    fn from(s: String) -> Self {
        Record::Text(s)
    }
}

impl From<&str> for Record {
    fn from(s: &str) -> Self {
        Record::Text(s.to_owned())
    }
}

impl From<StructuredRecord> for Record {
    fn from(s: StructuredRecord) -> Self {
        Record::Structured(Box::new(s))
    }
}

/// The declared accepted/produced "kind" of a stage's records, checked at
/// build time when `check_format` is set (spec.md §4.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Bytes,
    Text,
    Structured,
}

impl RecordKind {
    /// Whether a record of `self` kind may be fed to a stage declaring
    /// `accepted` as its accepted kind. `Any`-accepting stages are
    /// represented by an empty `accepted` set at the call site, not here.
    pub fn compatible_with(self, accepted: RecordKind) -> bool {
        self == accepted
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordKind::Bytes => "bytes",
            RecordKind::Text => "text",
            RecordKind::Structured => "structured",
        };
        write!(f, "{s}")
    }
}
