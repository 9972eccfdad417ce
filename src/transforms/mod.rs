//! Transform implementations (spec.md §4.1). Each submits a
//! `TransformDescription` to the component registry at load time via
//! `inventory::submit!`; importing this module (transitively, from
//! `lib.rs`) is what makes the `inventory::submit!` calls run.

mod geofence;
mod parse;
mod prefix;
mod qc_filter;
mod regex_filter;
mod slice;
mod timestamp;
mod true_wind;
mod xml_aggregator;

pub use geofence::GeofenceTransformConfig;
pub use parse::ParseTransformConfig;
pub use prefix::PrefixTransformConfig;
pub use qc_filter::QcFilterTransformConfig;
pub use regex_filter::RegexFilterTransformConfig;
pub use slice::SliceTransformConfig;
pub use timestamp::TimestampTransformConfig;
pub use true_wind::TrueWindTransformConfig;
pub use xml_aggregator::XmlAggregatorTransformConfig;
