//! `check_format` (spec.md §4.2, §9): a build-time validation that walks
//! reader → transform → ... → transform → writer and rejects a
//! `LoggerConfig` whose declared record kinds don't line up. A stage that
//! declares no kind (`None`/the default `RecordKind::Text` for readers is
//! always declared) is treated as accepting/producing anything.

use rvdas_core::record::RecordKind;
use rvdas_core::stage::{ReaderConfig, TransformConfig, WriterConfig};
use rvdas_core::ConfigError;

/// Validate the declared kinds across one logger's reader/transform/writer
/// chain. Only runs when `LoggerConfig.check_format` is `Some(true)` (the
/// config loader decides whether to call this; see `listener::engine`).
pub fn check_format(
    readers: &[Box<dyn ReaderConfig>],
    transforms: &[Box<dyn TransformConfig>],
    writers: &[Box<dyn WriterConfig>],
) -> Result<(), ConfigError> {
    let mut current: Option<RecordKind> = readers
        .iter()
        .map(|r| r.produces())
        .reduce(|a, b| if a == b { a } else { return_mixed(a, b) })
        .or(Some(RecordKind::Text));

    for (i, transform) in transforms.iter().enumerate() {
        if let (Some(produced), Some(accepted)) = (current, transform.accepts()) {
            if !produced.compatible_with(accepted) {
                return Err(ConfigError::FormatMismatch {
                    producer: format!("reader chain -> transform[{i}]"),
                    produced: produced.to_string(),
                    consumer: format!("transform[{i}]"),
                    accepted: accepted.to_string(),
                });
            }
        }
        current = transform.produces().or(current);
    }

    for (i, writer) in writers.iter().enumerate() {
        if let (Some(produced), Some(accepted)) = (current, writer.accepts()) {
            if !produced.compatible_with(accepted) {
                return Err(ConfigError::FormatMismatch {
                    producer: "transform chain".to_string(),
                    produced: produced.to_string(),
                    consumer: format!("writer[{i}]"),
                    accepted: accepted.to_string(),
                });
            }
        }
    }

    Ok(())
}

/// Readers in a single logger rarely disagree on kind (ComposedReader
/// normalizes its own); when they do, fall back to "unknown" so the check
/// doesn't false-positive on a legitimately heterogeneous composition.
fn return_mixed(_a: RecordKind, _b: RecordKind) -> RecordKind {
    RecordKind::Text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::PrefixTransformConfig;

    #[test]
    fn empty_chain_passes() {
        let readers: Vec<Box<dyn ReaderConfig>> = Vec::new();
        let transforms: Vec<Box<dyn TransformConfig>> = Vec::new();
        let writers: Vec<Box<dyn WriterConfig>> = Vec::new();
        assert!(check_format(&readers, &transforms, &writers).is_ok());
    }

    #[test]
    fn text_transform_after_text_reader_passes() {
        let transforms: Vec<Box<dyn TransformConfig>> = vec![Box::new(PrefixTransformConfig {
            prefix: "x".to_string(),
        })];
        let readers: Vec<Box<dyn ReaderConfig>> = Vec::new();
        let writers: Vec<Box<dyn WriterConfig>> = Vec::new();
        assert!(check_format(&readers, &transforms, &writers).is_ok());
    }
}
