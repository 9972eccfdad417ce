//! The Cached Data Server's JSON wire protocol (spec.md §6 "Wire protocol:
//! Cached Data Server"). Shared by the server itself, `CachedDataWriter`
//! (which only ever sends `Publish`), and the status publisher.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use rvdas_core::record::{FieldMetadata, Scalar};

/// Client → server frame.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Fields,
    Describe {
        #[serde(default)]
        fields: Vec<String>,
    },
    Subscribe {
        fields: IndexMap<String, FieldSubscription>,
    },
    Ready,
    Publish {
        data: PublishData,
    },
}

/// One field's interest declaration in a `subscribe` message (spec.md
/// §4.6): `seconds` is `0` (future only), `-1` (one most recent + future),
/// or `>0` (that many seconds of history + future).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldSubscription {
    pub seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back_records: Option<usize>,
}

/// The payload of a `publish` message: what a Reader-side producer (or
/// `CachedDataWriter`) ingests into the cache.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PublishData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(default)]
    pub fields: IndexMap<String, PublishValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PublishMetadata>,
}

/// A published field's value: a bare scalar sharing `data.timestamp`, or
/// its own list of `(timestamp, value)` samples.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PublishValue {
    Scalar(Scalar),
    Series(Vec<(f64, Scalar)>),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PublishMetadata {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldMetadata>,
}

/// Server → client frame: `{"type":..., "status":200, "data":...}` or
/// `{"type":..., "status":!=200, "error":...}` (spec.md §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerMessage {
    pub fn ok(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            status: 200,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(kind: impl Into<String>, status: u16, error: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            status,
            data: None,
            error: Some(error.into()),
        }
    }
}
