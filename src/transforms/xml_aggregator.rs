//! `XMLAggregatorTransform`: assembles a multi-line XML-ish block into a
//! single record, buffering lines between a start and end tag (spec.md
//! §4.1 "XML aggregator (multi-line record assembly)").

use rvdas_core::record::{Record, RecordKind};
use rvdas_core::registry::TransformDescription;
use rvdas_core::stage::{Transform, TransformConfig};
use serde::{Deserialize, Serialize};

fn default_top_tag() -> String {
    "Ins".to_string()
}

/// `{top_level_tag?}`. A record matching `<tag>` opens a buffer; records
/// are accumulated (newline-joined) until a record matching `</tag>` is
/// seen, at which point the full block is emitted as one record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct XmlAggregatorTransformConfig {
    #[serde(default = "default_top_tag")]
    pub top_level_tag: String,
}

inventory::submit! {
    TransformDescription::new::<XmlAggregatorTransformConfig>("XMLAggregatorTransform")
}

impl TransformConfig for XmlAggregatorTransformConfig {
    fn build(&self) -> anyhow::Result<Box<dyn Transform>> {
        Ok(Box::new(XmlAggregatorTransformImpl {
            open_tag: format!("<{}>", self.top_level_tag),
            close_tag: format!("</{}>", self.top_level_tag),
            buffer: None,
        }))
    }

    fn accepts(&self) -> Option<RecordKind> {
        Some(RecordKind::Text)
    }
    fn produces(&self) -> Option<RecordKind> {
        Some(RecordKind::Text)
    }
}

struct XmlAggregatorTransformImpl {
    open_tag: String,
    close_tag: String,
    buffer: Option<Vec<String>>,
}

impl Transform for XmlAggregatorTransformImpl {
    fn transform(&mut self, record: Record) -> Vec<Record> {
        let Some(text) = record.as_text() else {
            return vec![record];
        };
        let trimmed = text.trim();

        if self.buffer.is_none() {
            if trimmed.contains(&self.open_tag) {
                self.buffer = Some(vec![text.into_owned()]);
            }
            return Vec::new();
        }

        let buffer = self.buffer.as_mut().unwrap();
        buffer.push(text.into_owned());
        if trimmed.contains(&self.close_tag) {
            let lines = self.buffer.take().unwrap();
            vec![Record::text(lines.join("\n"))]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_between_open_and_close_tags() {
        let mut t = XmlAggregatorTransformImpl {
            open_tag: "<Ins>".into(),
            close_tag: "</Ins>".into(),
            buffer: None,
        };
        assert!(t.transform(Record::text("noise before")).is_empty());
        assert!(t.transform(Record::text("<Ins>")).is_empty());
        assert!(t.transform(Record::text("  <lat>1.0</lat>")).is_empty());
        let out = t.transform(Record::text("</Ins>"));
        assert_eq!(out.len(), 1);
        let text = out[0].as_text().unwrap();
        assert!(text.starts_with("<Ins>"));
        assert!(text.ends_with("</Ins>"));
    }
}
