//! The Listener pipeline engine (spec.md §4.2): runs the Readers,
//! Transforms, and Writers of a single `LoggerConfig` as one cancellable
//! pipeline. This is what both `rvdas-run` and every child process spawned
//! by the Logger Manager actually execute.

mod engine;
mod format_check;

pub use engine::{run_listener, EngineConfig, EngineOutcome};
pub use format_check::check_format;
