//! `RegexFilterTransform`: passes a record through only if it matches (or,
//! with `negate`, does not match) a pattern; otherwise a `FilterDrop`
//! (spec.md §4.1, §7 "FilterDrop — normal control flow; not an error").

use regex::Regex;
use rvdas_core::record::{Record, RecordKind};
use rvdas_core::registry::TransformDescription;
use rvdas_core::stage::{Transform, TransformConfig};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegexFilterTransformConfig {
    pub pattern: String,
    #[serde(default)]
    pub negate: bool,
}

inventory::submit! {
    TransformDescription::new::<RegexFilterTransformConfig>("RegexFilterTransform")
}

impl TransformConfig for RegexFilterTransformConfig {
    fn build(&self) -> anyhow::Result<Box<dyn Transform>> {
        Ok(Box::new(RegexFilterTransformImpl {
            regex: Regex::new(&self.pattern)?,
            negate: self.negate,
        }))
    }

    fn accepts(&self) -> Option<RecordKind> {
        Some(RecordKind::Text)
    }
    fn produces(&self) -> Option<RecordKind> {
        Some(RecordKind::Text)
    }
}

struct RegexFilterTransformImpl {
    regex: Regex,
    negate: bool,
}

impl Transform for RegexFilterTransformImpl {
    fn transform(&mut self, record: Record) -> Vec<Record> {
        let Some(text) = record.as_text() else {
            return vec![record];
        };
        let matched = self.regex.is_match(&text);
        if matched != self.negate {
            vec![record]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_non_matching_records() {
        let mut t = RegexFilterTransformImpl {
            regex: Regex::new(r"^\$GPGGA").unwrap(),
            negate: false,
        };
        assert!(t.transform(Record::text("$GPVTG,foo")).is_empty());
        assert_eq!(t.transform(Record::text("$GPGGA,foo")).len(), 1);
    }

    #[test]
    fn negate_inverts_match() {
        let mut t = RegexFilterTransformImpl {
            regex: Regex::new(r"^\$GPGGA").unwrap(),
            negate: true,
        };
        assert_eq!(t.transform(Record::text("$GPVTG,foo")).len(), 1);
        assert!(t.transform(Record::text("$GPGGA,foo")).is_empty());
    }
}
