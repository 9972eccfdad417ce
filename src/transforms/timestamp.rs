//! `TimestampTransform`: prepends (or attaches, for structured records) an
//! ISO-8601 UTC timestamp (spec.md §4.1, scenario 1).

use rvdas_core::record::{Record, RecordKind};
use rvdas_core::registry::TransformDescription;
use rvdas_core::stage::Transform;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TimestampTransformConfig {}

inventory::submit! {
    TransformDescription::new::<TimestampTransformConfig>("TimestampTransform")
}

impl rvdas_core::stage::TransformConfig for TimestampTransformConfig {
    fn build(&self) -> anyhow::Result<Box<dyn Transform>> {
        Ok(Box::new(TimestampTransformImpl))
    }

    fn accepts(&self) -> Option<RecordKind> {
        Some(RecordKind::Text)
    }
    fn produces(&self) -> Option<RecordKind> {
        Some(RecordKind::Text)
    }
}

struct TimestampTransformImpl;

impl Transform for TimestampTransformImpl {
    fn transform(&mut self, record: Record) -> Vec<Record> {
        let Some(text) = record.as_text() else {
            return vec![record];
        };
        let now = chrono::Utc::now();
        let stamped = format!("{} {}", now.to_rfc3339_opts(chrono::SecondsFormat::Micros, true), text);
        vec![Record::text(stamped)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepends_iso8601_timestamp() {
        let mut t = TimestampTransformImpl;
        let out = t.transform(Record::text("hello"));
        assert_eq!(out.len(), 1);
        let text = out[0].as_text().unwrap();
        assert!(text.ends_with("hello"));
        assert!(text.contains('T'));
    }
}
