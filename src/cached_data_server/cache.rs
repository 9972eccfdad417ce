//! The in-memory, time-windowed field cache at the heart of the Cached
//! Data Server (spec.md §4.6): `field_name -> ordered_sequence<(timestamp,
//! value)>`, with per-field retention and periodic cleanup.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use rvdas_core::record::{FieldMetadata, Scalar};

/// Retention policy applied uniformly across fields (spec.md §4.6); the
/// source does not document per-field retention overrides beyond what a
/// subscriber requests at read time, so this is the server-wide default.
#[derive(Clone, Copy, Debug)]
pub struct RetentionPolicy {
    pub back_seconds: f64,
    pub back_records: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            back_seconds: 3600.0,
            back_records: 100,
        }
    }
}

#[derive(Default)]
struct FieldSeries {
    samples: VecDeque<(f64, Scalar)>,
    metadata: Option<FieldMetadata>,
}

/// A single, consistent snapshot of one field, returned by `query`.
#[derive(Clone, Debug, Default)]
pub struct FieldSnapshot {
    pub samples: Vec<(f64, Scalar)>,
    pub metadata: Option<FieldMetadata>,
}

pub struct FieldCache {
    policy: RetentionPolicy,
    fields: Mutex<BTreeMap<String, FieldSeries>>,
}

impl FieldCache {
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            policy,
            fields: Mutex::new(BTreeMap::new()),
        }
    }

    /// Append one `(timestamp, value)` sample to `field`, preserving
    /// timestamp order (spec.md §5 "updates to a single field preserve
    /// timestamp-ordered append").
    pub fn publish(&self, field: &str, timestamp: f64, value: Scalar) {
        let mut fields = self.fields.lock().unwrap();
        let series = fields.entry(field.to_string()).or_default();
        let insert_at = series
            .samples
            .iter()
            .rposition(|(ts, _)| *ts <= timestamp)
            .map(|i| i + 1)
            .unwrap_or(0);
        series.samples.insert(insert_at, (timestamp, value));
        Self::trim(series, &self.policy);
    }

    pub fn set_metadata(&self, field: &str, metadata: FieldMetadata) {
        let mut fields = self.fields.lock().unwrap();
        fields.entry(field.to_string()).or_default().metadata = Some(metadata);
    }

    fn trim(series: &mut FieldSeries, policy: &RetentionPolicy) {
        if series.samples.len() <= policy.back_records {
            return;
        }
        let Some((newest_ts, _)) = series.samples.back().copied() else {
            return;
        };
        let cutoff = newest_ts - policy.back_seconds;
        while series.samples.len() > policy.back_records {
            let Some(&(oldest_ts, _)) = series.samples.front() else {
                break;
            };
            if oldest_ts < cutoff {
                series.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Drop entries older than the retention window across every field,
    /// run on the `cleanup` interval (spec.md §4.6).
    pub fn cleanup(&self) {
        let mut fields = self.fields.lock().unwrap();
        for series in fields.values_mut() {
            Self::trim(series, &self.policy);
        }
    }

    pub fn fields(&self) -> Vec<String> {
        self.fields.lock().unwrap().keys().cloned().collect()
    }

    pub fn describe(&self, field: &str) -> Option<FieldMetadata> {
        self.fields.lock().unwrap().get(field)?.metadata.clone()
    }

    /// A consistent snapshot of `field`'s samples, optionally windowed to
    /// the last `seconds` seconds (spec.md §4.6 subscribe semantics:
    /// `0` = future only, `-1` = most recent + future, `>0` = window).
    pub fn query(&self, field: &str, seconds: f64, back_records: Option<usize>) -> FieldSnapshot {
        let fields = self.fields.lock().unwrap();
        let Some(series) = fields.get(field) else {
            return FieldSnapshot::default();
        };
        let samples: Vec<(f64, Scalar)> = if seconds == 0.0 {
            Vec::new()
        } else if seconds < 0.0 {
            series.samples.back().cloned().into_iter().collect()
        } else {
            let Some((newest_ts, _)) = series.samples.back().copied() else {
                return FieldSnapshot::default();
            };
            let cutoff = newest_ts - seconds;
            series
                .samples
                .iter()
                .filter(|(ts, _)| *ts >= cutoff)
                .cloned()
                .collect()
        };
        let samples = match back_records {
            Some(n) if samples.len() > n => samples[samples.len() - n..].to_vec(),
            _ => samples,
        };
        FieldSnapshot {
            samples,
            metadata: series.metadata.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_then_query_recent_returns_first_value() {
        let cache = FieldCache::new(RetentionPolicy::default());
        cache.publish("depth", 100.0, Scalar::Float(12.5));
        let snap = cache.query("depth", -1.0, None);
        assert_eq!(snap.samples, vec![(100.0, Scalar::Float(12.5))]);
    }

    #[test]
    fn query_zero_seconds_returns_no_history() {
        let cache = FieldCache::new(RetentionPolicy::default());
        cache.publish("depth", 100.0, Scalar::Float(12.5));
        assert!(cache.query("depth", 0.0, None).samples.is_empty());
    }

    #[test]
    fn retains_at_least_back_records_even_outside_window() {
        let policy = RetentionPolicy {
            back_seconds: 1.0,
            back_records: 3,
        };
        let cache = FieldCache::new(policy);
        for i in 0..5 {
            cache.publish("f", i as f64 * 10.0, Scalar::Int(i));
        }
        let snap = cache.query("f", 1000.0, None);
        assert!(snap.samples.len() >= 3);
    }

    #[test]
    fn out_of_order_publish_stays_timestamp_sorted() {
        let cache = FieldCache::new(RetentionPolicy::default());
        cache.publish("f", 10.0, Scalar::Int(1));
        cache.publish("f", 5.0, Scalar::Int(0));
        cache.publish("f", 20.0, Scalar::Int(2));
        let snap = cache.query("f", 1000.0, None);
        let ts: Vec<f64> = snap.samples.iter().map(|(t, _)| *t).collect();
        assert_eq!(ts, vec![5.0, 10.0, 20.0]);
    }
}
