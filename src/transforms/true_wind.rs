//! `TrueWindTransform`: a derived-value transform (spec.md §4.1) computing
//! true wind speed/direction from apparent wind plus the vessel's heading,
//! course, and speed over ground — standard vector decomposition (the
//! spec names the derivation but not a formula; this follows the textbook
//! vector-subtraction relationship between true and apparent wind rather
//! than any one shipboard system's exact constants).

use rvdas_core::record::{FieldValue, Record, RecordKind, Scalar, StructuredRecord};
use rvdas_core::registry::TransformDescription;
use rvdas_core::stage::{Transform, TransformConfig};
use serde::{Deserialize, Serialize};

fn default_true_wind_speed_field() -> String {
    "TrueWindSpeed".to_string()
}
fn default_true_wind_dir_field() -> String {
    "TrueWindDir".to_string()
}

/// All inputs are degrees-true / knots unless noted. `wind_dir_field` is
/// the apparent wind direction relative to the bow (0 = dead ahead,
/// clockwise) — the convention a masthead wind vane reports.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrueWindTransformConfig {
    pub heading_field: String,
    pub course_field: String,
    pub speed_field: String,
    pub wind_speed_field: String,
    pub wind_dir_field: String,
    #[serde(default = "default_true_wind_speed_field")]
    pub true_wind_speed_field: String,
    #[serde(default = "default_true_wind_dir_field")]
    pub true_wind_dir_field: String,
}

inventory::submit! {
    TransformDescription::new::<TrueWindTransformConfig>("TrueWindTransform")
}

impl TransformConfig for TrueWindTransformConfig {
    fn build(&self) -> anyhow::Result<Box<dyn Transform>> {
        Ok(Box::new(TrueWindTransformImpl {
            heading_field: self.heading_field.clone(),
            course_field: self.course_field.clone(),
            speed_field: self.speed_field.clone(),
            wind_speed_field: self.wind_speed_field.clone(),
            wind_dir_field: self.wind_dir_field.clone(),
            true_wind_speed_field: self.true_wind_speed_field.clone(),
            true_wind_dir_field: self.true_wind_dir_field.clone(),
        }))
    }

    fn accepts(&self) -> Option<RecordKind> {
        Some(RecordKind::Structured)
    }
    fn produces(&self) -> Option<RecordKind> {
        Some(RecordKind::Structured)
    }
}

struct TrueWindTransformImpl {
    heading_field: String,
    course_field: String,
    speed_field: String,
    wind_speed_field: String,
    wind_dir_field: String,
    true_wind_speed_field: String,
    true_wind_dir_field: String,
}

impl TrueWindTransformImpl {
    fn inputs(&self, record: &StructuredRecord) -> Option<(f64, f64, f64, f64, f64)> {
        Some((
            field_f64(record, &self.heading_field)?,
            field_f64(record, &self.course_field)?,
            field_f64(record, &self.speed_field)?,
            field_f64(record, &self.wind_speed_field)?,
            field_f64(record, &self.wind_dir_field)?,
        ))
    }
}

fn field_f64(record: &StructuredRecord, field: &str) -> Option<f64> {
    match record.fields.get(field)?.latest()? {
        Scalar::Int(i) => Some(*i as f64),
        Scalar::Float(f) => Some(*f),
        _ => None,
    }
}

impl Transform for TrueWindTransformImpl {
    fn transform(&mut self, record: Record) -> Vec<Record> {
        let Some(structured) = record.as_structured() else {
            return vec![record];
        };
        let Some((heading, course, speed, wind_speed, wind_dir_relative)) =
            self.inputs(structured)
        else {
            return vec![record];
        };

        let (true_speed, true_dir) =
            compute_true_wind(heading, course, speed, wind_speed, wind_dir_relative);

        let mut out = structured.clone();
        out.fields.insert(
            self.true_wind_speed_field.clone(),
            FieldValue::Scalar(Scalar::Float(true_speed)),
        );
        out.fields.insert(
            self.true_wind_dir_field.clone(),
            FieldValue::Scalar(Scalar::Float(true_dir)),
        );
        vec![Record::structured(out)]
    }
}

/// north/east vector components of a compass bearing (0 = N, clockwise).
fn bearing_to_vector(bearing_deg: f64, magnitude: f64) -> (f64, f64) {
    let rad = bearing_deg.to_radians();
    (magnitude * rad.cos(), magnitude * rad.sin())
}

fn vector_to_bearing(north: f64, east: f64) -> f64 {
    let deg = east.atan2(north).to_degrees();
    (deg + 360.0) % 360.0
}

/// `wind_dir_relative` is the apparent wind's bow-relative bearing; adding
/// `heading` gives its true ("from") bearing. The apparent wind felt
/// aboard is the true wind vector minus the ship's own velocity vector, so
/// recovering true wind is: apparent "blowing toward" vector + ship
/// velocity vector, then converting the resulting "blowing toward" vector
/// back to a "from" bearing (+180°).
fn compute_true_wind(
    heading: f64,
    course: f64,
    speed: f64,
    wind_speed: f64,
    wind_dir_relative: f64,
) -> (f64, f64) {
    let apparent_from_true = (heading + wind_dir_relative) % 360.0;
    let apparent_toward_true = (apparent_from_true + 180.0) % 360.0;
    let (apparent_n, apparent_e) = bearing_to_vector(apparent_toward_true, wind_speed);
    let (ship_n, ship_e) = bearing_to_vector(course, speed);

    let true_toward_n = apparent_n + ship_n;
    let true_toward_e = apparent_e + ship_e;
    let true_speed = (true_toward_n * true_toward_n + true_toward_e * true_toward_e).sqrt();
    let true_toward_bearing = vector_to_bearing(true_toward_n, true_toward_e);
    let true_from_bearing = (true_toward_bearing + 180.0) % 360.0;

    (true_speed, true_from_bearing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn record_with(fields: &[(&str, f64)]) -> Record {
        let mut map = IndexMap::new();
        for (name, value) in fields {
            map.insert(name.to_string(), FieldValue::Scalar(Scalar::Float(*value)));
        }
        Record::structured(StructuredRecord {
            data_id: None,
            timestamp: Some(0.0),
            fields: map,
            metadata: None,
        })
    }

    #[test]
    fn stationary_ship_true_wind_equals_apparent_wind() {
        let (speed, dir) = compute_true_wind(0.0, 0.0, 0.0, 10.0, 45.0);
        assert!((speed - 10.0).abs() < 1e-9);
        assert!((dir - 45.0).abs() < 1e-9);
    }

    #[test]
    fn sailing_directly_into_apparent_wind_increases_true_wind_from_zero() {
        // Heading/course north at 10kt, apparent wind dead ahead at 10kt:
        // with no true wind at all, sailing north at 10kt alone would
        // create a 10kt apparent headwind, so true wind here must be zero.
        let (speed, _dir) = compute_true_wind(0.0, 0.0, 10.0, 10.0, 0.0);
        assert!(speed < 1e-6);
    }

    #[test]
    fn missing_field_passes_record_through_unchanged() {
        let mut t = TrueWindTransformImpl {
            heading_field: "Hdg".into(),
            course_field: "Crs".into(),
            speed_field: "Spd".into(),
            wind_speed_field: "Aws".into(),
            wind_dir_field: "Awa".into(),
            true_wind_speed_field: "TrueWindSpeed".into(),
            true_wind_dir_field: "TrueWindDir".into(),
        };
        let input = record_with(&[("Hdg", 0.0)]);
        let out = t.transform(input.clone());
        assert_eq!(out, vec![input]);
    }

    #[test]
    fn all_fields_present_adds_true_wind_fields() {
        let mut t = TrueWindTransformImpl {
            heading_field: "Hdg".into(),
            course_field: "Crs".into(),
            speed_field: "Spd".into(),
            wind_speed_field: "Aws".into(),
            wind_dir_field: "Awa".into(),
            true_wind_speed_field: "TrueWindSpeed".into(),
            true_wind_dir_field: "TrueWindDir".into(),
        };
        let input = record_with(&[
            ("Hdg", 0.0),
            ("Crs", 0.0),
            ("Spd", 10.0),
            ("Aws", 10.0),
            ("Awa", 0.0),
        ]);
        let out = t.transform(input);
        assert_eq!(out.len(), 1);
        let structured = out[0].as_structured().unwrap();
        assert!(structured.fields.contains_key("TrueWindSpeed"));
        assert!(structured.fields.contains_key("TrueWindDir"));
    }
}
