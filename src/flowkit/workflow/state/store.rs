// SPDX-License-Identifier: MIT

//! Runtime state map shared by the nodes of one run

use serde_json::{Map, Value};
use std::collections::HashMap;

use super::schema::{ReducerType, StateSchema};

/// Mutable key/value state with per-key reducers
#[derive(Debug, Clone, Default)]
pub struct WorkflowState {
    fields: Map<String, Value>,
    reducers: HashMap<String, ReducerType>,
}

impl WorkflowState {
    /// Seed defaults and reducers from a declared schema
    pub fn new(schema: &StateSchema) -> Self {
        let mut state = Self::default();
        for (name, def) in &schema.fields {
            if let Some(default) = &def.default {
                state.fields.insert(name.clone(), default.clone());
            }
            state.reducers.insert(name.clone(), def.reducer);
        }
        state
    }

    pub fn from_schema(schema: Option<&StateSchema>) -> Self {
        schema.map(Self::new).unwrap_or_default()
    }

    /// Overwrite fields with caller-provided initial values, bypassing reducers
    pub fn seed(&mut self, initial: Map<String, Value>) {
        self.fields.extend(initial);
    }

    pub fn reducer(&self, key: &str) -> ReducerType {
        self.reducers.get(key).copied().unwrap_or_default()
    }

    /// Write `value` to `key` through the key's reducer
    pub fn update(&mut self, key: &str, value: Value) {
        match self.reducer(key) {
            ReducerType::Overwrite => {
                self.fields.insert(key.to_string(), value);
            }
            ReducerType::Append => {
                let slot = self
                    .fields
                    .entry(key.to_string())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if !slot.is_array() {
                    // A scalar default becomes the first element
                    let previous = slot.take();
                    *slot = Value::Array(if previous.is_null() { vec![] } else { vec![previous] });
                }
                if let Value::Array(items) = slot {
                    match value {
                        Value::Array(more) => items.extend(more),
                        other => items.push(other),
                    }
                }
            }
            ReducerType::Max => self.keep_if(key, value, |new, current| new > current),
            ReducerType::Min => self.keep_if(key, value, |new, current| new < current),
            ReducerType::Merge => {
                let slot = self
                    .fields
                    .entry(key.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                match (slot, value) {
                    (Value::Object(current), Value::Object(incoming)) => current.extend(incoming),
                    (slot, other) => *slot = other,
                }
            }
        }
    }

    fn keep_if<F>(&mut self, key: &str, value: Value, better: F)
    where
        F: Fn(f64, f64) -> bool,
    {
        let Some(new) = value.as_f64() else {
            log::warn!("Ignoring non-numeric write to '{}': {}", key, value);
            return;
        };
        let replace = match self.fields.get(key).and_then(Value::as_f64) {
            Some(current) => better(new, current),
            None => true,
        };
        if replace {
            self.fields.insert(key.to_string(), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Nested lookup with dot notation (`order.customer.name`)
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                other => other.get(part)?,
            };
        }
        Some(current)
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
