//! The record parser used by `ParseTransform` (spec.md §4.5): a
//! field-pattern mini-language with typed placeholders, plus the
//! Device/DeviceType two-pass field resolution that renames a
//! device-type's generic field names to a specific instrument's names.

mod device;
mod record_format;

pub use device::{Device, DeviceDefinitions, DeviceType};
pub use record_format::{parse_fields, FieldType, RecordFormat};
