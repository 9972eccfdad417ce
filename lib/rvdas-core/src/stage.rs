//! The Reader/Transform/Writer contracts (spec.md §4.1) and their
//! config-side counterparts. A `*Config` is what a `StageSpec` deserializes
//! into via the registry (`registry.rs`); its `build` method produces the
//! live stage that the Listener engine drives.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::record::{Record, RecordKind};
use crate::shutdown::ShutdownSignal;

/// Outcome of one `Reader::read` call.
pub enum ReadOutcome {
    Record(Record),
    /// The underlying source is exhausted; the Listener stops restarting
    /// this reader and, once every reader reports end-of-stream, begins
    /// orderly shutdown.
    EndOfStream,
}

/// A Reader yields records, possibly blocking indefinitely for data.
/// Readers are driven by exactly one caller (the Listener's per-reader
/// task) at a time; composition with other readers is the engine's job,
/// not the reader's (spec.md §4.1).
#[async_trait]
pub trait Reader: Send {
    async fn read(&mut self) -> anyhow::Result<ReadOutcome>;
}

/// A Transform maps one input record to zero, one, or many output
/// records. Implementations must be pure with respect to their own
/// declared internal state: identical inputs with identical internal
/// state produce identical outputs (spec.md §4.1). This is why `transform`
/// is synchronous — pacing and I/O belong to the engine and to Writers,
/// not to a Transform.
pub trait Transform: Send {
    fn transform(&mut self, record: Record) -> Vec<Record>;
}

/// A Writer delivers a record to its destination before returning control.
/// Writers may buffer internally; they must be explicit about failure
/// semantics via their `WriterConfig` (`retry_count`, `backpressure`).
#[async_trait]
pub trait Writer: Send {
    async fn write(&mut self, record: Record) -> anyhow::Result<()>;

    /// Flush any buffered output. Called on orderly shutdown when
    /// `flush_on_stop` is set.
    async fn flush(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Per-writer overload policy (spec.md §4.2, §9 Open Questions — made
/// explicit per writer class rather than left ambiguous).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    #[default]
    Block,
    DropOldest,
}

/// Context handed to a Reader/Transform/Writer `Config::build` call: the
/// stage's configured name (for logging) and its slice of the Listener's
/// shutdown signal.
#[derive(Clone)]
pub struct StageContext {
    pub name: String,
    pub shutdown: ShutdownSignal,
}

impl StageContext {
    pub fn new(name: impl Into<String>, shutdown: ShutdownSignal) -> Self {
        Self {
            name: name.into(),
            shutdown,
        }
    }
}

/// The config-side counterpart of a Reader: what a `StageSpec`'s kwargs
/// deserialize into, registered under a class name in the component
/// registry (spec.md §4.8).
#[async_trait]
pub trait ReaderConfig: std::fmt::Debug + Send + Sync {
    async fn build(&self, cx: StageContext) -> anyhow::Result<Box<dyn Reader>>;

    /// The record kind this reader produces, used by `check_format`.
    fn produces(&self) -> RecordKind {
        RecordKind::Text
    }

    /// Whether the Listener engine restarts this reader on failure
    /// (spec.md §4.2; default true).
    fn restartable(&self) -> bool {
        true
    }
}

pub trait TransformConfig: std::fmt::Debug + Send + Sync {
    fn build(&self) -> anyhow::Result<Box<dyn Transform>>;

    fn accepts(&self) -> Option<RecordKind> {
        None
    }
    fn produces(&self) -> Option<RecordKind> {
        None
    }
}

#[async_trait]
pub trait WriterConfig: std::fmt::Debug + Send + Sync {
    async fn build(&self, cx: StageContext) -> anyhow::Result<Box<dyn Writer>>;

    fn accepts(&self) -> Option<RecordKind> {
        None
    }

    /// Bounded queue depth for this writer's fan-out channel (spec.md
    /// §4.2; default small).
    fn queue_depth(&self) -> usize {
        100
    }

    fn backpressure(&self) -> BackpressurePolicy {
        BackpressurePolicy::Block
    }

    /// Whether the writer drains its queue on stop (`flush_on_stop`) or is
    /// cancelled immediately (spec.md §4.2).
    fn flush_on_stop(&self) -> bool {
        true
    }
}
