use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `{class, module?, kwargs}` (spec.md §3). `kwargs` constraints are
/// component-specific and validated by the registry's constructor, not
/// here.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    pub class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub kwargs: Map<String, Value>,
}

impl StageSpec {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            module: None,
            kwargs: Map::new(),
        }
    }

    pub fn kwargs_value(&self) -> Value {
        Value::Object(self.kwargs.clone())
    }
}
