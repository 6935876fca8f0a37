// SPDX-License-Identifier: MIT

//! State schema declared at the workflow level
//!
//! A graph may declare the fields its `setState` nodes write, with an
//! initial value and a reducer. Undeclared keys are still accepted and
//! always overwrite.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Declared state fields, keyed by name
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct StateSchema {
    #[serde(flatten)]
    pub fields: HashMap<String, StateFieldDef>,
}

/// Declaration of a single state field
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StateFieldDef {
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
    /// How writes combine with the current value
    #[serde(default)]
    pub reducer: ReducerType,
    /// Value present before the first node runs
    #[serde(default)]
    pub default: Option<serde_json::Value>,
}

/// Informational field types; values are not coerced
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Any,
    String,
    Number,
    Boolean,
    Array,
    Object,
}

/// Strategies for combining a write with the current value
#[derive(Debug, Clone, Copy, Deserialize, Serialize, Default, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ReducerType {
    #[default]
    Overwrite,
    /// Push onto an array (arrays are concatenated)
    Append,
    /// Keep the larger number
    Max,
    /// Keep the smaller number
    Min,
    /// Shallow-merge objects
    Merge,
}
