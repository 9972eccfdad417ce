//! The component registry (spec.md §4.8): a process-wide mapping from
//! `class_name` (optionally qualified by `module`) to a constructor that
//! accepts a kwargs map and returns a stage config instance.
//!
//! Components self-register with `inventory::submit!`, mirroring the
//! teacher's `SourceDescription`/`TransformDescription`/`SinkDescription` +
//! `inventory::submit!` pattern (see
//! `src/test_util/mock/sources/basic.rs`). Unlike the teacher, which uses
//! `typetag` for config-side deserialization keyed by an embedded `type`
//! tag, rvdas's `StageSpec` carries `class`/`module`/`kwargs` as separate
//! fields, so the registry itself resolves the class name and then
//! deserializes the kwargs into the matching concrete type — no reflection,
//! no dynamic attribute lookup (spec.md §9).

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::de::DeserializeOwned;
use snafu::OptionExt;

use crate::error::{ConfigError, UnknownClassSnafu};
use crate::stage::{ReaderConfig, TransformConfig, WriterConfig};

/// `module` defaults to this namespace when a `StageSpec` omits it.
pub const CORE_MODULE: &str = "core";

macro_rules! description_kind {
    ($desc:ident, $trait_:ident) => {
        pub struct $desc {
            pub module: &'static str,
            pub class: &'static str,
            construct: fn(serde_json::Value) -> Result<Box<dyn $trait_>, ConfigError>,
        }

        impl $desc {
            /// Register a builtin (module = "core") component.
            pub fn new<T>(class: &'static str) -> Self
            where
                T: $trait_ + DeserializeOwned + 'static,
            {
                Self {
                    module: CORE_MODULE,
                    class,
                    construct: |kwargs| {
                        let cfg: T =
                            serde_json::from_value(kwargs).map_err(|e| ConfigError::InvalidKwargs {
                                class: class.to_string(),
                                reason: e.to_string(),
                            })?;
                        Ok(Box::new(cfg) as Box<dyn $trait_>)
                    },
                }
            }

            /// Register a component under an explicit `module` namespace,
            /// for `local/…`-style extensions (spec.md §4.8).
            pub fn new_in_module<T>(module: &'static str, class: &'static str) -> Self
            where
                T: $trait_ + DeserializeOwned + 'static,
            {
                Self {
                    module,
                    class,
                    construct: |kwargs| {
                        let cfg: T =
                            serde_json::from_value(kwargs).map_err(|e| ConfigError::InvalidKwargs {
                                class: class.to_string(),
                                reason: e.to_string(),
                            })?;
                        Ok(Box::new(cfg) as Box<dyn $trait_>)
                    },
                }
            }
        }

        inventory::collect!($desc);
    };
}

description_kind!(ReaderDescription, ReaderConfig);
description_kind!(TransformDescription, TransformConfig);
description_kind!(WriterDescription, WriterConfig);

fn reader_index() -> &'static HashMap<(&'static str, &'static str), &'static ReaderDescription> {
    static INDEX: OnceLock<HashMap<(&'static str, &'static str), &'static ReaderDescription>> =
        OnceLock::new();
    INDEX.get_or_init(|| {
        inventory::iter::<ReaderDescription>
            .into_iter()
            .map(|d| ((d.module, d.class), d))
            .collect()
    })
}

fn transform_index(
) -> &'static HashMap<(&'static str, &'static str), &'static TransformDescription> {
    static INDEX: OnceLock<HashMap<(&'static str, &'static str), &'static TransformDescription>> =
        OnceLock::new();
    INDEX.get_or_init(|| {
        inventory::iter::<TransformDescription>
            .into_iter()
            .map(|d| ((d.module, d.class), d))
            .collect()
    })
}

fn writer_index() -> &'static HashMap<(&'static str, &'static str), &'static WriterDescription> {
    static INDEX: OnceLock<HashMap<(&'static str, &'static str), &'static WriterDescription>> =
        OnceLock::new();
    INDEX.get_or_init(|| {
        inventory::iter::<WriterDescription>
            .into_iter()
            .map(|d| ((d.module, d.class), d))
            .collect()
    })
}

/// Resolve and construct a Reader config from a `StageSpec`'s
/// `class`/`module`/`kwargs` triple. Unknown class names are a load-time
/// `ConfigError` (spec.md §4.3, §7).
pub fn build_reader(
    class: &str,
    module: Option<&str>,
    kwargs: serde_json::Value,
) -> Result<Box<dyn ReaderConfig>, ConfigError> {
    let module = module.unwrap_or(CORE_MODULE);
    let desc = reader_index()
        .iter()
        .find(|((m, c), _)| *m == module && *c == class)
        .map(|(_, d)| *d)
        .context(UnknownClassSnafu {
            class: class.to_string(),
            module: Some(module.to_string()),
        })?;
    (desc.construct)(kwargs)
}

pub fn build_transform(
    class: &str,
    module: Option<&str>,
    kwargs: serde_json::Value,
) -> Result<Box<dyn TransformConfig>, ConfigError> {
    let module = module.unwrap_or(CORE_MODULE);
    let desc = transform_index()
        .iter()
        .find(|((m, c), _)| *m == module && *c == class)
        .map(|(_, d)| *d)
        .context(UnknownClassSnafu {
            class: class.to_string(),
            module: Some(module.to_string()),
        })?;
    (desc.construct)(kwargs)
}

pub fn build_writer(
    class: &str,
    module: Option<&str>,
    kwargs: serde_json::Value,
) -> Result<Box<dyn WriterConfig>, ConfigError> {
    let module = module.unwrap_or(CORE_MODULE);
    let desc = writer_index()
        .iter()
        .find(|((m, c), _)| *m == module && *c == class)
        .map(|(_, d)| *d)
        .context(UnknownClassSnafu {
            class: class.to_string(),
            module: Some(module.to_string()),
        })?;
    (desc.construct)(kwargs)
}

/// Whether `class` (in `module`, default "core") is registered — used by
/// the config loader to validate a `CruiseDefinition` before any stage is
/// built (spec.md §3 invariant: "every referenced class/module resolvable
/// in the registry").
pub fn reader_class_known(class: &str, module: Option<&str>) -> bool {
    reader_index().contains_key(&(module.unwrap_or(CORE_MODULE), class))
}
pub fn transform_class_known(class: &str, module: Option<&str>) -> bool {
    transform_index().contains_key(&(module.unwrap_or(CORE_MODULE), class))
}
pub fn writer_class_known(class: &str, module: Option<&str>) -> bool {
    writer_index().contains_key(&(module.unwrap_or(CORE_MODULE), class))
}
