//! `GeofenceTransform` (spec.md §4.7): watches a named lat/lon pair against
//! a boundary polygon, or a named scalar against bounds, and emits a
//! textual command record when the watched state crosses — paired
//! downstream with `LoggerManagerWriter`, which validates the command
//! against a whitelist before submitting it to the Logger Manager. This is
//! the data-driven half of spec.md §4.7's control loop; the submission
//! itself stays fire-and-forget so the loop never blocks on reconciliation
//! (spec.md §9).

use rvdas_core::record::{FieldValue, Record, RecordKind, Scalar, StructuredRecord};
use rvdas_core::registry::TransformDescription;
use rvdas_core::stage::{Transform, TransformConfig};
use serde::{Deserialize, Serialize};

fn default_min_seconds_between_checks() -> f64 {
    0.0
}

/// What the transform watches: either a lat/lon pair against a boundary
/// polygon, or a single scalar field against `[min, max]`. Untagged so a
/// config author writes whichever shape fits (spec.md §4.7 "watches a
/// named lat/lon pair (geofence) or a named scalar (QC bound)").
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeofenceWatch {
    Geofence {
        lat_field: String,
        lon_field: String,
        /// A GML coordinate list (`"lon,lat lon,lat ..."`, tags stripped),
        /// closed or open (spec.md §4.7 "boundary polygon (GML)").
        boundary: String,
        /// Signed degrees the boundary is grown (positive) or shrunk
        /// (negative) before testing, applied as a per-vertex outward
        /// displacement from the polygon centroid — an approximation, not
        /// a true geometric buffer (spec.md §4.7 "optional signed offset
        /// (degrees)").
        #[serde(default)]
        offset_degrees: f64,
    },
    QcBound { field: String, min: f64, max: f64 },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeofenceTransformConfig {
    #[serde(flatten)]
    pub watch: GeofenceWatch,
    /// Emitted (as a single text record) when the watched state transitions
    /// into the polygon / into bounds.
    #[serde(default)]
    pub enter_command: Option<String>,
    /// Emitted when the watched state transitions out of the polygon /
    /// out of bounds.
    #[serde(default)]
    pub exit_command: Option<String>,
    #[serde(default = "default_min_seconds_between_checks")]
    pub min_seconds_between_checks: f64,
}

inventory::submit! {
    TransformDescription::new::<GeofenceTransformConfig>("GeofenceTransform")
}

impl TransformConfig for GeofenceTransformConfig {
    fn build(&self) -> anyhow::Result<Box<dyn Transform>> {
        let watch = match &self.watch {
            GeofenceWatch::Geofence {
                lat_field,
                lon_field,
                boundary,
                offset_degrees,
            } => {
                let polygon = apply_offset(parse_gml_boundary(boundary)?, *offset_degrees);
                CompiledWatch::Geofence {
                    lat_field: lat_field.clone(),
                    lon_field: lon_field.clone(),
                    polygon,
                }
            }
            GeofenceWatch::QcBound { field, min, max } => CompiledWatch::QcBound {
                field: field.clone(),
                min: *min,
                max: *max,
            },
        };
        Ok(Box::new(GeofenceTransformImpl {
            watch,
            enter_command: self.enter_command.clone(),
            exit_command: self.exit_command.clone(),
            min_seconds_between_checks: self.min_seconds_between_checks,
            last_check_at: None,
            inside: None,
        }))
    }

    fn accepts(&self) -> Option<RecordKind> {
        Some(RecordKind::Structured)
    }
    fn produces(&self) -> Option<RecordKind> {
        Some(RecordKind::Text)
    }
}

enum CompiledWatch {
    Geofence {
        lat_field: String,
        lon_field: String,
        polygon: Vec<(f64, f64)>,
    },
    QcBound {
        field: String,
        min: f64,
        max: f64,
    },
}

impl CompiledWatch {
    fn evaluate(&self, record: &StructuredRecord) -> Option<bool> {
        match self {
            CompiledWatch::Geofence {
                lat_field,
                lon_field,
                polygon,
            } => {
                let lat = field_f64(record, lat_field)?;
                let lon = field_f64(record, lon_field)?;
                Some(point_in_polygon(lon, lat, polygon))
            }
            CompiledWatch::QcBound { field, min, max } => {
                let value = field_f64(record, field)?;
                Some(value >= *min && value <= *max)
            }
        }
    }
}

fn field_f64(record: &StructuredRecord, field: &str) -> Option<f64> {
    match record.fields.get(field)?.latest()? {
        Scalar::Int(i) => Some(*i as f64),
        Scalar::Float(f) => Some(*f),
        _ => None,
    }
}

struct GeofenceTransformImpl {
    watch: CompiledWatch,
    enter_command: Option<String>,
    exit_command: Option<String>,
    min_seconds_between_checks: f64,
    last_check_at: Option<f64>,
    /// The last observed state; `None` until the first observation, so the
    /// very first record only establishes a baseline rather than firing a
    /// spurious "crossing" (spec.md §8 scenario 6 only expects one command
    /// for one genuine crossing).
    inside: Option<bool>,
}

impl Transform for GeofenceTransformImpl {
    fn transform(&mut self, record: Record) -> Vec<Record> {
        let Some(structured) = record.as_structured() else {
            return Vec::new();
        };

        if let (Some(last), Some(now)) = (self.last_check_at, structured.timestamp) {
            if now - last < self.min_seconds_between_checks {
                return Vec::new();
            }
        }

        let Some(currently_inside) = self.watch.evaluate(structured) else {
            return Vec::new();
        };
        if let Some(now) = structured.timestamp {
            self.last_check_at = Some(now);
        }

        let previous = self.inside.replace(currently_inside);
        match previous {
            Some(prev) if prev != currently_inside => {
                let command = if currently_inside {
                    &self.enter_command
                } else {
                    &self.exit_command
                };
                command.clone().map(Record::text).into_iter().collect()
            }
            _ => Vec::new(),
        }
    }
}

fn parse_gml_boundary(boundary: &str) -> anyhow::Result<Vec<(f64, f64)>> {
    let stripped = strip_tags(boundary);
    let mut points = Vec::new();
    for token in stripped.split_whitespace() {
        let (lon, lat) = token
            .split_once(',')
            .ok_or_else(|| anyhow::anyhow!("malformed GML coordinate `{token}`: expected `lon,lat`"))?;
        points.push((lon.trim().parse()?, lat.trim().parse()?));
    }
    if points.len() < 3 {
        anyhow::bail!("boundary polygon needs at least 3 points, got {}", points.len());
    }
    Ok(points)
}

fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_tag = false;
    for ch in text.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

fn apply_offset(polygon: Vec<(f64, f64)>, offset_degrees: f64) -> Vec<(f64, f64)> {
    if offset_degrees == 0.0 {
        return polygon;
    }
    let n = polygon.len() as f64;
    let (cx, cy) = polygon
        .iter()
        .fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
    let (cx, cy) = (cx / n, cy / n);
    polygon
        .into_iter()
        .map(|(x, y)| {
            let (dx, dy) = (x - cx, y - cy);
            let len = (dx * dx + dy * dy).sqrt();
            if len == 0.0 {
                (x, y)
            } else {
                (x + dx / len * offset_degrees, y + dy / len * offset_degrees)
            }
        })
        .collect()
}

/// Standard ray-casting point-in-polygon test, `(lon, lat)` coordinates.
fn point_in_polygon(x: f64, y: f64, polygon: &[(f64, f64)]) -> bool {
    let mut inside = false;
    let n = polygon.len();
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = polygon[i];
        let (xj, yj) = polygon[j];
        if ((yi > y) != (yj > y)) && (x < (xj - xi) * (y - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }
    inside
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn square_degrees() -> String {
        "0,0 10,0 10,10 0,10".to_string()
    }

    fn record_at(lat: f64, lon: f64, timestamp: f64) -> Record {
        let mut fields = IndexMap::new();
        fields.insert("s330Latitude".to_string(), FieldValue::Scalar(Scalar::Float(lat)));
        fields.insert("s330Longitude".to_string(), FieldValue::Scalar(Scalar::Float(lon)));
        Record::structured(StructuredRecord {
            data_id: Some("seap".to_string()),
            timestamp: Some(timestamp),
            fields,
            metadata: None,
        })
    }

    fn new_transform() -> GeofenceTransformImpl {
        GeofenceTransformImpl {
            watch: CompiledWatch::Geofence {
                lat_field: "s330Latitude".to_string(),
                lon_field: "s330Longitude".to_string(),
                polygon: parse_gml_boundary(&square_degrees()).unwrap(),
            },
            enter_command: Some("set_active_mode eez_mode".to_string()),
            exit_command: Some("set_active_mode underway_mode".to_string()),
            min_seconds_between_checks: 0.0,
            last_check_at: None,
            inside: None,
        }
    }

    #[test]
    fn first_record_only_establishes_baseline() {
        let mut t = new_transform();
        assert!(t.transform(record_at(5.0, 5.0, 0.0)).is_empty());
    }

    #[test]
    fn crossing_into_boundary_emits_enter_command() {
        let mut t = new_transform();
        assert!(t.transform(record_at(-1.0, -1.0, 0.0)).is_empty());
        let out = t.transform(record_at(5.0, 5.0, 10.0));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_text().unwrap(), "set_active_mode eez_mode");
    }

    #[test]
    fn crossing_out_of_boundary_emits_exit_command() {
        let mut t = new_transform();
        t.transform(record_at(5.0, 5.0, 0.0));
        let out = t.transform(record_at(50.0, 50.0, 10.0));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_text().unwrap(), "set_active_mode underway_mode");
    }

    #[test]
    fn staying_inside_emits_nothing() {
        let mut t = new_transform();
        t.transform(record_at(5.0, 5.0, 0.0));
        assert!(t.transform(record_at(6.0, 6.0, 10.0)).is_empty());
    }

    #[test]
    fn point_in_polygon_basic_square() {
        let square = vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)];
        assert!(point_in_polygon(5.0, 5.0, &square));
        assert!(!point_in_polygon(15.0, 5.0, &square));
    }
}
