//! Variable environment.
//!
//! Holds resolved values only. Owned by a single engine and mutated only by
//! assignment statements.

use crate::domain::error::ScriptError;
use crate::domain::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environment {
    variables: BTreeMap<String, Value>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `value`, replacing any previous binding.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Result<&Value, ScriptError> {
        self.variables
            .get(name)
            .ok_or_else(|| ScriptError::UnknownVariable {
                name: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.variables.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// JSON object of name to tagged value.
    pub fn serialize(&self) -> Result<String, ScriptError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn deserialize(blob: &str) -> Result<Self, ScriptError> {
        Ok(serde_json::from_str(blob)?)
    }
}
