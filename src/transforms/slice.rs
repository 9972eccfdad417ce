//! `SliceTransform`: selects a Python-slice-style field range from a
//! whitespace- (or custom-) separated record (spec.md §4.1, scenario 2:
//! `SliceTransform("2:")`).

use rvdas_core::record::{Record, RecordKind};
use rvdas_core::registry::TransformDescription;
use rvdas_core::stage::{Transform, TransformConfig};
use serde::{Deserialize, Serialize};

fn default_separator() -> String {
    " ".to_string()
}

/// `{spec, separator?}`. `spec` is `start:end` Python-slice syntax over
/// `separator`-delimited fields; either half may be omitted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SliceTransformConfig {
    pub spec: String,
    #[serde(default = "default_separator")]
    pub separator: String,
}

inventory::submit! {
    TransformDescription::new::<SliceTransformConfig>("SliceTransform")
}

impl TransformConfig for SliceTransformConfig {
    fn build(&self) -> anyhow::Result<Box<dyn Transform>> {
        let (start, end) = parse_slice(&self.spec)?;
        Ok(Box::new(SliceTransformImpl {
            start,
            end,
            separator: self.separator.clone(),
        }))
    }

    fn accepts(&self) -> Option<RecordKind> {
        Some(RecordKind::Text)
    }
    fn produces(&self) -> Option<RecordKind> {
        Some(RecordKind::Text)
    }
}

fn parse_slice(spec: &str) -> anyhow::Result<(Option<i64>, Option<i64>)> {
    let Some((start, end)) = spec.split_once(':') else {
        anyhow::bail!("slice spec `{spec}` must contain ':'");
    };
    let parse_half = |s: &str| -> anyhow::Result<Option<i64>> {
        if s.is_empty() {
            Ok(None)
        } else {
            Ok(Some(s.parse()?))
        }
    };
    Ok((parse_half(start)?, parse_half(end)?))
}

struct SliceTransformImpl {
    start: Option<i64>,
    end: Option<i64>,
    separator: String,
}

impl Transform for SliceTransformImpl {
    fn transform(&mut self, record: Record) -> Vec<Record> {
        let Some(text) = record.as_text() else {
            return vec![record];
        };
        let fields: Vec<&str> = text.split(self.separator.as_str()).collect();
        let len = fields.len() as i64;
        let resolve = |idx: i64| -> usize {
            let idx = if idx < 0 { (len + idx).max(0) } else { idx.min(len) };
            idx as usize
        };
        let start = self.start.map(resolve).unwrap_or(0);
        let end = self.end.map(resolve).unwrap_or(fields.len());
        let selected = if start < end {
            fields[start..end].join(&self.separator)
        } else {
            String::new()
        };
        vec![Record::text(selected)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_from_2_to_end() {
        let mut t = SliceTransformImpl {
            start: Some(2),
            end: None,
            separator: " ".into(),
        };
        let out = t.transform(Record::text("license: 2024-01-01T00:00:00Z hello world"));
        assert_eq!(out[0].as_text().unwrap(), "hello world");
    }

    #[test]
    fn parses_colon_spec() {
        assert_eq!(parse_slice("2:").unwrap(), (Some(2), None));
        assert_eq!(parse_slice(":3").unwrap(), (None, Some(3)));
        assert_eq!(parse_slice("1:3").unwrap(), (Some(1), Some(3)));
    }
}
