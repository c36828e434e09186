use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    errors::GraphError,
    value::{PropertyMap, decode_properties},
};

pub type NodeId = i64;
pub type EdgeId = i64;

const LABEL_DELIMITER: char = ':';

/// Discriminator between the two backing relations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Node,
    Edge,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Node => "node",
            EntityKind::Edge => "edge",
        }
    }

    /// Resolves a discriminator value; anything but `node`/`edge` is an invalid filter.
    pub fn from_discriminator(value: &str) -> Result<Self, GraphError> {
        match value {
            "node" => Ok(EntityKind::Node),
            "edge" => Ok(EntityKind::Edge),
            other => Err(GraphError::invalid_filter(format!(
                "unknown entity type '{other}'"
            ))),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered, de-duplicated node labels.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(Vec<String>);

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<T: Into<String>>(&mut self, label: T) {
        let label = label.into();
        if !self.contains(&label) {
            self.0.push(label);
        }
    }

    /// `true` if `label` was present.
    pub fn remove(&mut self, label: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|l| l != label);
        self.0.len() != before
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.iter().any(|l| l == label)
    }

    pub fn contains_all<S: AsRef<str>>(&self, labels: &[S]) -> bool {
        labels.iter().all(|l| self.contains(l.as_ref()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn encode(&self) -> String {
        self.0.join(&LABEL_DELIMITER.to_string())
    }

    pub fn decode(text: &str) -> Self {
        let mut labels = LabelSet::new();
        for label in text.split(LABEL_DELIMITER) {
            let trimmed = label.trim();
            if !trimmed.is_empty() {
                labels.insert(trimmed);
            }
        }
        labels
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        for label in &self.0 {
            if label.trim().is_empty() {
                return Err(GraphError::invalid_input("labels must not be empty"));
            }
            if label.trim() != label {
                return Err(GraphError::invalid_input(format!(
                    "label '{label}' must not start or end with whitespace"
                )));
            }
            if label.contains(LABEL_DELIMITER) {
                return Err(GraphError::invalid_input(format!(
                    "label '{label}' must not contain '{LABEL_DELIMITER}'"
                )));
            }
        }
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<S> for LabelSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut labels = LabelSet::new();
        for label in iter {
            labels.insert(label);
        }
        labels
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub labels: LabelSet,
    pub properties: PropertyMap,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub edge_type: String,
    pub weight: Option<f64>,
    pub properties: PropertyMap,
}

/// Insert payload for an edge; the id is assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeSpec {
    pub source: NodeId,
    pub target: NodeId,
    pub edge_type: String,
    pub weight: Option<f64>,
    pub properties: PropertyMap,
}

impl EdgeSpec {
    pub fn new<T: Into<String>>(source: NodeId, target: NodeId, edge_type: T) -> Self {
        Self {
            source,
            target,
            edge_type: edge_type.into(),
            weight: None,
            properties: PropertyMap::new(),
        }
    }
}

fn decode_column(text: String) -> Result<PropertyMap, rusqlite::Error> {
    decode_properties(&text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            text.len(),
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

pub fn row_to_node(row: &rusqlite::Row<'_>) -> Result<Node, rusqlite::Error> {
    let labels: Option<String> = row.get(1)?;
    let properties: Option<String> = row.get(2)?;
    Ok(Node {
        id: row.get(0)?,
        labels: LabelSet::decode(labels.as_deref().unwrap_or_default()),
        properties: decode_column(properties.unwrap_or_default())?,
    })
}

pub fn row_to_edge(row: &rusqlite::Row<'_>) -> Result<Edge, rusqlite::Error> {
    let edge_type: Option<String> = row.get(3)?;
    let properties: Option<String> = row.get(5)?;
    Ok(Edge {
        id: row.get(0)?,
        source: row.get(1)?,
        target: row.get(2)?,
        edge_type: edge_type.unwrap_or_default(),
        weight: row.get(4)?,
        properties: decode_column(properties.unwrap_or_default())?,
    })
}
