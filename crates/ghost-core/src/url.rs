//! Think locations and deterministic task ids

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Location of a Think, one of its stages, and the arguments it was called with.
///
/// An empty `stage` addresses the Think's default stage.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Url {
    pub think: String,
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub args: BTreeMap<String, Value>,
}

impl Url {
    pub fn new(think: impl Into<String>) -> Self {
        Self {
            think: think.into(),
            stage: String::new(),
            args: BTreeMap::new(),
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = stage.into();
        self
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn has_stage(&self) -> bool {
        !self.stage.is_empty()
    }

    /// Same Think, different stage.
    pub fn to_stage(&self, stage: impl Into<String>) -> Self {
        Self {
            think: self.think.clone(),
            stage: stage.into(),
            args: self.args.clone(),
        }
    }

    /// Deterministic hex digest used as a task id.
    ///
    /// Only `think`, the `extras`, the `enums` and (when `include_args`) the
    /// args take part; the stage never does. URLs that agree on those inputs
    /// collide on purpose, which is how singleton tasks are addressed.
    pub fn new_id(&self, extras: &[(&str, &str)], enums: &[&str], include_args: bool) -> String {
        let extras: BTreeMap<&str, &str> = extras.iter().copied().collect();
        let mut seed = serde_json::Map::new();
        seed.insert("think".into(), Value::String(self.think.clone()));
        seed.insert(
            "extras".into(),
            serde_json::to_value(&extras).unwrap_or(Value::Null),
        );
        seed.insert(
            "enums".into(),
            Value::Array(enums.iter().map(|e| Value::String((*e).to_string())).collect()),
        );
        if include_args {
            seed.insert(
                "args".into(),
                serde_json::to_value(&self.args).unwrap_or(Value::Null),
            );
        }
        let canonical = Value::Object(seed).to_string();
        hex::encode(Sha256::digest(canonical.as_bytes()))
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.stage.is_empty() {
            write!(f, "{}", self.think)
        } else {
            write!(f, "{}::{}", self.think, self.stage)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_does_not_change_id() {
        let a = Url::new("weather").with_stage("ask");
        let b = Url::new("weather").with_stage("answer");
        assert_eq!(a.new_id(&[], &[], true), b.new_id(&[], &[], true));
    }

    #[test]
    fn extras_order_is_irrelevant() {
        let url = Url::new("weather");
        let a = url.new_id(&[("a", "1"), ("b", "2")], &[], false);
        let b = url.new_id(&[("b", "2"), ("a", "1")], &[], false);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn display_includes_stage() {
        assert_eq!(Url::new("t").to_string(), "t");
        assert_eq!(Url::new("t").with_stage("s").to_string(), "t::s");
    }
}
