//! The error vocabulary of spec.md §7, realized as distinct `snafu` enums
//! per error kind rather than one grab-bag type, so callers can match on
//! what actually went wrong.

use snafu::Snafu;

/// Malformed YAML/JSON, unknown class, unresolved template/variable, or a
/// `CruiseDefinition`/`LoggerConfig` invariant violation. Surfaced at load
/// time; never auto-retried.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    #[snafu(display("failed to parse {path}: {source}"))]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },

    #[snafu(display("unknown component class `{class}`{}", module.as_deref().map(|m| format!(" in module `{m}`")).unwrap_or_default()))]
    UnknownClass {
        class: String,
        module: Option<String>,
    },

    #[snafu(display("invalid kwargs for `{class}`: {reason}"))]
    InvalidKwargs { class: String, reason: String },

    #[snafu(display("cruise definition invariant violated: {reason}"))]
    InvariantViolation { reason: String },

    #[snafu(display("variable/template expansion cycle detected at `{name}`"))]
    ExpansionCycle { name: String },

    #[snafu(display("template expansion exceeded depth limit ({limit}) at `{name}`"))]
    ExpansionDepthExceeded { name: String, limit: u32 },

    #[snafu(display("check_format: stage `{producer}` emits `{produced}` but `{consumer}` accepts `{accepted}`"))]
    FormatMismatch {
        producer: String,
        produced: String,
        consumer: String,
        accepted: String,
    },

    #[snafu(display("{reason}"))]
    Other { reason: String },
}

/// Transient I/O failure inside a Reader. Logged; restarted with backoff
/// by the Listener engine; escalated to FATAL after threshold.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RuntimeError {
    #[snafu(display("reader `{stage}` failed: {reason}"))]
    Reader { stage: String, reason: String },

    #[snafu(display("writer `{stage}` failed: {reason}"))]
    Writer { stage: String, reason: String },

    #[snafu(display("io error in `{stage}`: {source}"))]
    Io {
        stage: String,
        source: std::io::Error,
    },

    #[snafu(display("child process failure for logger `{logger}`: {reason}"))]
    ChildProcess { logger: String, reason: String },

    #[snafu(display("command rejected: {reason}"))]
    CommandRejected { reason: String },
}

/// Per-record parse failure. Logged at DEBUG, record dropped, counter
/// incremented (spec.md §7). Not escalated.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ParseError {
    #[snafu(display("no record_format pattern in `{device_type}` matched `{field_string}`"))]
    NoPatternMatched {
        device_type: String,
        field_string: String,
    },

    #[snafu(display("unknown data_id `{data_id}`: no device definition"))]
    UnknownDataId { data_id: String },

    #[snafu(display("field `{field}` failed to parse as {expected}: `{value}`"))]
    FieldType {
        field: String,
        expected: String,
        value: String,
    },

    #[snafu(display("malformed record: {reason}"))]
    Malformed { reason: String },
}
