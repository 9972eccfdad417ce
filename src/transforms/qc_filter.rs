//! `QCFilterTransform`: passes a structured record through only if a named
//! field's latest scalar value falls within `[min, max]`; out-of-bounds is
//! a `FilterDrop` (spec.md §4.1 "QC filter with bounds").

use rvdas_core::record::{Record, RecordKind, Scalar};
use rvdas_core::registry::TransformDescription;
use rvdas_core::stage::{Transform, TransformConfig};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QcFilterTransformConfig {
    pub field: String,
    pub min: f64,
    pub max: f64,
}

inventory::submit! {
    TransformDescription::new::<QcFilterTransformConfig>("QCFilterTransform")
}

impl TransformConfig for QcFilterTransformConfig {
    fn build(&self) -> anyhow::Result<Box<dyn Transform>> {
        Ok(Box::new(QcFilterTransformImpl {
            field: self.field.clone(),
            min: self.min,
            max: self.max,
        }))
    }

    fn accepts(&self) -> Option<RecordKind> {
        Some(RecordKind::Structured)
    }
    fn produces(&self) -> Option<RecordKind> {
        Some(RecordKind::Structured)
    }
}

struct QcFilterTransformImpl {
    field: String,
    min: f64,
    max: f64,
}

impl Transform for QcFilterTransformImpl {
    fn transform(&mut self, record: Record) -> Vec<Record> {
        let Some(structured) = record.as_structured() else {
            return vec![record];
        };
        let Some(value) = structured.fields.get(&self.field).and_then(|v| v.latest()) else {
            // Field absent: pass through unfiltered — QC only judges
            // records that actually carry the watched field.
            return vec![record];
        };
        let numeric = match value {
            Scalar::Int(i) => *i as f64,
            Scalar::Float(f) => *f,
            _ => return vec![record],
        };
        if numeric >= self.min && numeric <= self.max {
            vec![record]
        } else {
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use rvdas_core::record::{FieldValue, StructuredRecord};

    fn record_with(field: &str, value: f64) -> Record {
        let mut fields = IndexMap::new();
        fields.insert(field.to_string(), FieldValue::Scalar(Scalar::Float(value)));
        Record::structured(StructuredRecord {
            data_id: None,
            timestamp: None,
            fields,
            metadata: None,
        })
    }

    #[test]
    fn in_bounds_passes() {
        let mut t = QcFilterTransformImpl {
            field: "depth".into(),
            min: 0.0,
            max: 100.0,
        };
        assert_eq!(t.transform(record_with("depth", 50.0)).len(), 1);
    }

    #[test]
    fn out_of_bounds_drops() {
        let mut t = QcFilterTransformImpl {
            field: "depth".into(),
            min: 0.0,
            max: 100.0,
        };
        assert!(t.transform(record_with("depth", 500.0)).is_empty());
    }
}
