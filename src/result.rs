//! Query result values and the row iteration contract.

use std::{cmp::Ordering, collections::BTreeMap, fmt};

use crate::{
    errors::GraphError,
    graph::{Edge, Node},
    value::{PropertyMap, PropertyValue},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Node(Node),
    Edge(Edge),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Node(_) => "node",
            Value::Edge(_) => "relationship",
        }
    }

    pub fn from_properties(properties: &PropertyMap) -> Self {
        Value::Map(
            properties
                .iter()
                .map(|(key, value)| (key.clone(), Value::from(value)))
                .collect(),
        )
    }

    /// Cypher equality. `None` when either side is null, or a nested comparison is.
    pub fn equals(&self, other: &Value) -> Option<bool> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Integer(a), Value::Integer(b)) => Some(a == b),
            (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
                Some(self.as_f64() == other.as_f64())
            }
            (Value::Bool(a), Value::Bool(b)) => Some(a == b),
            (Value::String(a), Value::String(b)) => Some(a == b),
            (Value::List(a), Value::List(b)) => {
                if a.len() != b.len() {
                    return Some(false);
                }
                all_equal(a.iter().zip(b.iter()))
            }
            (Value::Map(a), Value::Map(b)) => {
                if a.len() != b.len() || a.keys().zip(b.keys()).any(|(x, y)| x != y) {
                    return Some(false);
                }
                all_equal(a.values().zip(b.values()))
            }
            (Value::Node(a), Value::Node(b)) => Some(a.id == b.id),
            (Value::Edge(a), Value::Edge(b)) => Some(a.id == b.id),
            _ => Some(false),
        }
    }

    /// Ordering between comparable values; `None` for null or mixed types.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
                self.as_f64()?.partial_cmp(&other.as_f64()?)
            }
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }
}

fn all_equal<'a>(pairs: impl Iterator<Item = (&'a Value, &'a Value)>) -> Option<bool> {
    let mut unknown = false;
    for (a, b) in pairs {
        match a.equals(b) {
            Some(false) => return Some(false),
            None => unknown = true,
            Some(true) => {}
        }
    }
    if unknown { None } else { Some(true) }
}

impl From<&PropertyValue> for Value {
    fn from(value: &PropertyValue) -> Self {
        match value {
            PropertyValue::Null => Value::Null,
            PropertyValue::Bool(b) => Value::Bool(*b),
            PropertyValue::Integer(v) => Value::Integer(*v),
            PropertyValue::Float(v) => Value::Float(*v),
            PropertyValue::String(s) => Value::String(s.clone()),
            PropertyValue::List(items) => Value::List(items.iter().map(Value::from).collect()),
            PropertyValue::Map(map) => Value::from_properties(map),
        }
    }
}

impl From<Node> for Value {
    fn from(node: Node) -> Self {
        Value::Node(node)
    }
}

impl From<Edge> for Value {
    fn from(edge: Edge) -> Self {
        Value::Edge(edge)
    }
}

fn write_float(f: &mut fmt::Formatter<'_>, v: f64) -> fmt::Result {
    if v.is_nan() {
        f.write_str("NaN")
    } else if v.is_infinite() {
        f.write_str(if v > 0.0 { "Infinity" } else { "-Infinity" })
    } else if v.fract() == 0.0 && v.abs() < 1e16 {
        write!(f, "{v:.1}")
    } else {
        write!(f, "{v}")
    }
}

fn write_string(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("'")?;
    for c in s.chars() {
        match c {
            '\'' => f.write_str("\\'")?,
            '\\' => f.write_str("\\\\")?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("'")
}

fn write_properties(f: &mut fmt::Formatter<'_>, properties: &PropertyMap) -> fmt::Result {
    f.write_str("{")?;
    for (index, (key, value)) in properties.iter().enumerate() {
        if index > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{key}: {}", Value::from(value))?;
    }
    f.write_str("}")
}

/// TCK textual form: `'A'`, `1.5`, `[1, 2]`, `{a: 1}`, `(:Person {name: 'Alice'})`, `[:KNOWS]`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Float(v) => write_float(f, *v),
            Value::String(s) => write_string(f, s),
            Value::List(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(map) => {
                f.write_str("{")?;
                for (index, (key, value)) in map.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
            Value::Node(node) => {
                f.write_str("(")?;
                for label in node.labels.iter() {
                    write!(f, ":{label}")?;
                }
                if !node.properties.is_empty() {
                    if !node.labels.is_empty() {
                        f.write_str(" ")?;
                    }
                    write_properties(f, &node.properties)?;
                }
                f.write_str(")")
            }
            Value::Edge(edge) => {
                write!(f, "[:{}", edge.edge_type)?;
                if !edge.properties.is_empty() {
                    f.write_str(" ")?;
                    write_properties(f, &edge.properties)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// One projected result row, values in RETURN item order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn rendered(&self) -> Vec<String> {
        self.values.iter().map(ToString::to_string).collect()
    }
}

/// Lazy, finite, single-pass stream of result rows.
pub struct QueryResult<'s> {
    columns: Vec<String>,
    rows: Box<dyn Iterator<Item = Result<Row, GraphError>> + 's>,
}

impl<'s> QueryResult<'s> {
    pub fn new<I>(columns: Vec<String>, rows: I) -> Self
    where
        I: Iterator<Item = Result<Row, GraphError>> + 's,
    {
        Self {
            columns,
            rows: Box::new(rows),
        }
    }

    pub fn empty(columns: Vec<String>) -> Self {
        Self::new(columns, std::iter::empty())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Drains the stream, stopping at the first error.
    pub fn collect_rows(self) -> Result<Vec<Row>, GraphError> {
        self.rows.collect()
    }

    pub fn materialize(self) -> Result<ResultSet, GraphError> {
        let columns = self.columns.clone();
        let rows = self.collect_rows()?;
        Ok(ResultSet { columns, rows })
    }
}

impl Iterator for QueryResult<'_> {
    type Item = Result<Row, GraphError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next()
    }
}

impl fmt::Debug for QueryResult<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryResult")
            .field("columns", &self.columns)
            .finish_non_exhaustive()
    }
}

/// A fully drained result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn rendered_rows(&self) -> Vec<Vec<String>> {
        self.rows.iter().map(Row::rendered).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::LabelSet;

    #[test]
    fn test_display_scalars() {
        assert_eq!(Value::String("A".into()).to_string(), "'A'");
        assert_eq!(Value::String("it's".into()).to_string(), r"'it\'s'");
        assert_eq!(Value::Integer(2).to_string(), "2");
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(
            Value::List(vec![Value::Integer(1), Value::Bool(true)]).to_string(),
            "[1, true]"
        );
    }

    #[test]
    fn test_display_entities() {
        let mut properties = PropertyMap::new();
        properties.insert("name".into(), "Alice".into());
        let node = Node {
            id: 1,
            labels: ["Person"].into_iter().collect::<LabelSet>(),
            properties: properties.clone(),
        };
        assert_eq!(Value::Node(node).to_string(), "(:Person {name: 'Alice'})");
        let bare = Node {
            id: 2,
            labels: LabelSet::new(),
            properties: PropertyMap::new(),
        };
        assert_eq!(Value::Node(bare).to_string(), "()");
        let edge = Edge {
            id: 1,
            source: 1,
            target: 2,
            edge_type: "KNOWS".into(),
            weight: None,
            properties: PropertyMap::new(),
        };
        assert_eq!(Value::Edge(edge).to_string(), "[:KNOWS]");
    }

    #[test]
    fn test_equality_is_numeric_and_null_aware() {
        assert_eq!(Value::Integer(1).equals(&Value::Float(1.0)), Some(true));
        assert_eq!(Value::Integer(1).equals(&Value::String("1".into())), Some(false));
        assert_eq!(Value::Null.equals(&Value::Null), None);
        assert_eq!(
            Value::List(vec![Value::Integer(1), Value::Null])
                .equals(&Value::List(vec![Value::Integer(2), Value::Null])),
            Some(false)
        );
        assert_eq!(
            Value::List(vec![Value::Integer(1), Value::Null])
                .equals(&Value::List(vec![Value::Integer(1), Value::Null])),
            None
        );
    }

    #[test]
    fn test_compare_mixed_numbers() {
        assert_eq!(
            Value::Integer(1).compare(&Value::Float(1.5)),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Integer(1).compare(&Value::String("a".into())), None);
    }
}
