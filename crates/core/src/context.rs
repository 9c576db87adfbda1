//! # Run Context
//!
//! The key/value mapping threaded through one pipeline run. Steps read from
//! it and return a delta that the engine merges back in. A step that writes
//! the [`ERROR_KEY`] marker asks the engine to halt the run after it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StepError;

/// Key whose presence in the context halts the run after the current step.
pub const ERROR_KEY: &str = "error";

/// Accumulating mapping of step inputs and outputs for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    entries: Map<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON value; anything that is not an object is rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(entries) => Some(Self { entries }),
            _ => None,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.entries.insert(key.into(), value);
    }

    /// Copy every entry of `other` in, overwriting keys already present.
    pub fn merge(&mut self, other: &Context) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Fetch a key and decode it, failing the step when it is missing
    /// or has an unexpected shape. The caller's location is recorded
    /// on the error.
    #[track_caller]
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T, StepError> {
        let caller = std::panic::Location::caller();
        let fail = |message: String| {
            StepError::with_frame(message, caller.file(), caller.line(), format!("require({key:?})"))
        };

        let value = self
            .entries
            .get(key)
            .ok_or_else(|| fail(format!("missing key {key:?} in context")))?;
        serde_json::from_value(value.clone())
            .map_err(|e| fail(format!("key {key:?} has an unexpected shape: {e}")))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether a step has left the halt marker behind.
    pub fn has_error(&self) -> bool {
        self.entries.contains_key(ERROR_KEY)
    }

    pub fn error_value(&self) -> Option<&Value> {
        self.entries.get(ERROR_KEY)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The context as a plain JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.entries.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.entries)
    }
}

impl From<Map<String, Value>> for Context {
    fn from(entries: Map<String, Value>) -> Self {
        Self { entries }
    }
}
