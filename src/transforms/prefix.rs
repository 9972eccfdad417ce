//! `PrefixTransform`: prepends a fixed string (spec.md §4.1, scenario 1).

use rvdas_core::record::{Record, RecordKind};
use rvdas_core::registry::TransformDescription;
use rvdas_core::stage::{Transform, TransformConfig};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PrefixTransformConfig {
    pub prefix: String,
}

inventory::submit! {
    TransformDescription::new::<PrefixTransformConfig>("PrefixTransform")
}

impl TransformConfig for PrefixTransformConfig {
    fn build(&self) -> anyhow::Result<Box<dyn Transform>> {
        Ok(Box::new(PrefixTransformImpl {
            prefix: self.prefix.clone(),
        }))
    }

    fn accepts(&self) -> Option<RecordKind> {
        Some(RecordKind::Text)
    }
    fn produces(&self) -> Option<RecordKind> {
        Some(RecordKind::Text)
    }
}

struct PrefixTransformImpl {
    prefix: String,
}

impl Transform for PrefixTransformImpl {
    fn transform(&mut self, record: Record) -> Vec<Record> {
        let Some(text) = record.as_text() else {
            return vec![record];
        };
        vec![Record::text(format!("{}{}", self.prefix, text))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepends_configured_prefix() {
        let mut t = PrefixTransformImpl {
            prefix: "license: ".into(),
        };
        let out = t.transform(Record::text("line one"));
        assert_eq!(out[0].as_text().unwrap(), "license: line one");
    }
}
