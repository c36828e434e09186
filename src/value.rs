//! Property values and their text encoding.
//!
//! Properties are stored as a JSON object in a single text column. Decoding
//! happens once per fetched row; the query layer only ever sees the tagged
//! [`PropertyValue`] form.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::GraphError;

pub type PropertyMap = BTreeMap<String, PropertyValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<PropertyValue>),
    Map(PropertyMap),
}

impl PropertyValue {
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Integer(v) => Some(*v as f64),
            PropertyValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Integer(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

/// Serializes a property map, dropping null entries.
pub fn encode_properties(properties: &PropertyMap) -> Result<String, GraphError> {
    let retained: BTreeMap<&String, &PropertyValue> = properties
        .iter()
        .filter(|(_, value)| !value.is_null())
        .collect();
    serde_json::to_string(&retained).map_err(|e| GraphError::invalid_input(e.to_string()))
}

/// Parses stored property text. Empty text is treated as an empty map.
pub fn decode_properties(text: &str) -> Result<PropertyMap, GraphError> {
    if text.trim().is_empty() {
        return Ok(PropertyMap::new());
    }
    match serde_json::from_str::<PropertyValue>(text) {
        Ok(PropertyValue::Map(map)) => Ok(map),
        Ok(other) => Err(GraphError::invalid_input(format!(
            "properties must be an object, found {other:?}"
        ))),
        Err(e) => Err(GraphError::invalid_input(e.to_string())),
    }
}
