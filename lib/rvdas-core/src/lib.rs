//! Core types shared by every stage implementation and by the listener
//! engine and logger manager: the `Record` value, the `Reader`/`Transform`/
//! `Writer` traits, the component registry, shutdown signaling, and the
//! shared error vocabulary.

pub mod error;
pub mod record;
pub mod registry;
pub mod shutdown;
pub mod stage;

pub use error::{ConfigError, ParseError, RuntimeError};
pub use record::{FieldMetadata, FieldValue, Metadata, Record, RecordKind, Scalar, StructuredRecord};
pub use registry::{
    build_reader, build_transform, build_writer, ReaderDescription, TransformDescription,
    WriterDescription,
};
pub use shutdown::ShutdownSignal;
pub use stage::{
    BackpressurePolicy, ReadOutcome, Reader, ReaderConfig, StageContext, Transform,
    TransformConfig, Writer, WriterConfig,
};

/// Convenience alias used throughout rvdas for fallible stage operations.
pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;
