//! Lowers a parsed query into executable steps.
//!
//! Every check that can fail happens here, before the executor touches the
//! store, so a statement that does not compile never writes anything.

use ahash::AHashMap;
use tracing::debug;

use crate::{
    errors::GraphError,
    graph::LabelSet,
    result::Value,
    value::{PropertyMap, PropertyValue},
};

use super::ast::{
    Clause, ComparisonOp, CreateClause, Direction, Expression, Literal, MatchClause, NodePattern,
    Pattern, RelationshipPattern, ReturnClause,
};

pub(crate) type Slot = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotKind {
    Node,
    Relationship,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct NodeFilter {
    pub labels: Vec<String>,
    pub properties: PropertyMap,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct RelationshipFilter {
    pub types: Vec<String>,
    pub properties: PropertyMap,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MatchStep {
    /// Binds `slot` to every node passing `filter`.
    ScanNodes { slot: Slot, filter: NodeFilter },
    /// Re-checks a node bound by an earlier step.
    CheckNode { slot: Slot, filter: NodeFilter },
    /// Walks one relationship from the node bound in `from`.
    Expand {
        from: Slot,
        edge_slot: Slot,
        node_slot: Slot,
        node_bound: bool,
        direction: Direction,
        relationship: RelationshipFilter,
        node: NodeFilter,
        /// Edges bound earlier in the same MATCH; a row never repeats one.
        distinct_from: Vec<Slot>,
    },
    Filter(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CreateOp {
    Node {
        slot: Slot,
        labels: LabelSet,
        properties: PropertyMap,
    },
    Edge {
        slot: Slot,
        source: Slot,
        target: Slot,
        edge_type: String,
        properties: PropertyMap,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Function {
    Id,
    Labels,
    Type,
    Properties,
    Keys,
    Size,
    ToString,
    Coalesce,
}

impl Function {
    fn resolve(name: &str) -> Option<Self> {
        let function = match name {
            "id" => Function::Id,
            "labels" => Function::Labels,
            "type" => Function::Type,
            "properties" => Function::Properties,
            "keys" => Function::Keys,
            "size" => Function::Size,
            "tostring" => Function::ToString,
            "coalesce" => Function::Coalesce,
            _ => return None,
        };
        Some(function)
    }

    fn accepts(&self, arguments: usize) -> bool {
        match self {
            Function::Coalesce => arguments >= 1,
            _ => arguments == 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Constant(Value),
    List(Vec<Expr>),
    Map(Vec<(String, Expr)>),
    Slot(Slot),
    Property(Box<Expr>, String),
    HasLabels(Box<Expr>, Vec<String>),
    Call(Function, Vec<Expr>),
    Compare(Box<Expr>, ComparisonOp, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Negate(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ProjectionItem {
    Value(Expr),
    CountStar,
    Count(Expr),
}

impl ProjectionItem {
    pub fn is_aggregate(&self) -> bool {
        !matches!(self, ProjectionItem::Value(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Projection {
    pub items: Vec<ProjectionItem>,
}

impl Projection {
    pub fn is_aggregating(&self) -> bool {
        self.items.iter().any(ProjectionItem::is_aggregate)
    }
}

/// A statement ready for execution.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub(crate) slot_count: usize,
    pub(crate) match_steps: Vec<MatchStep>,
    pub(crate) creates: Vec<CreateOp>,
    pub(crate) projection: Option<Projection>,
    columns: Vec<String>,
}

impl CompiledQuery {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_read_only(&self) -> bool {
        self.creates.is_empty()
    }
}

pub fn compile(query: &super::ast::Query) -> Result<CompiledQuery, GraphError> {
    check_clause_order(&query.clauses)?;
    let mut compiler = Compiler::default();
    let mut match_steps = Vec::new();
    let mut creates = Vec::new();
    let mut projection = None;
    let mut columns = Vec::new();
    for clause in &query.clauses {
        match clause {
            Clause::Match(clause) => compiler.compile_match(clause, &mut match_steps)?,
            Clause::Create(clause) => compiler.compile_create(clause, &mut creates)?,
            Clause::Return(clause) => {
                let (compiled, names) = compiler.compile_return(clause)?;
                projection = Some(compiled);
                columns = names;
            }
        }
    }
    debug!(
        slots = compiler.slot_count,
        match_steps = match_steps.len(),
        creates = creates.len(),
        columns = columns.len(),
        "cypher.compile"
    );
    Ok(CompiledQuery {
        slot_count: compiler.slot_count,
        match_steps,
        creates,
        projection,
        columns,
    })
}

fn check_clause_order(clauses: &[Clause]) -> Result<(), GraphError> {
    fn rank(clause: &Clause) -> u8 {
        match clause {
            Clause::Match(_) => 0,
            Clause::Create(_) => 1,
            Clause::Return(_) => 2,
        }
    }
    for pair in clauses.windows(2) {
        let (previous, next) = (&pair[0], &pair[1]);
        if rank(previous) == 2 {
            return Err(GraphError::compile("RETURN must be the last clause"));
        }
        if rank(next) < rank(previous) {
            return Err(GraphError::compile(format!(
                "{} cannot follow {}",
                next.keyword(),
                previous.keyword()
            )));
        }
    }
    Ok(())
}

#[derive(Default)]
struct Compiler {
    scope: AHashMap<String, (Slot, SlotKind)>,
    slot_count: usize,
}

impl Compiler {
    fn fresh_slot(&mut self) -> Slot {
        self.slot_count += 1;
        self.slot_count - 1
    }

    fn declare(&mut self, variable: Option<&String>, kind: SlotKind) -> Slot {
        let slot = self.fresh_slot();
        if let Some(name) = variable {
            self.scope.insert(name.clone(), (slot, kind));
        }
        slot
    }

    fn lookup(&self, name: &str, kind: SlotKind) -> Result<Option<Slot>, GraphError> {
        match self.scope.get(name) {
            Some(&(slot, bound)) if bound == kind => Ok(Some(slot)),
            Some(_) => Err(GraphError::compile(format!(
                "variable `{name}` is already bound to a {}",
                match kind {
                    SlotKind::Node => "relationship",
                    SlotKind::Relationship => "node",
                }
            ))),
            None => Ok(None),
        }
    }

    fn compile_match(
        &mut self,
        clause: &MatchClause,
        steps: &mut Vec<MatchStep>,
    ) -> Result<(), GraphError> {
        let mut clause_edges = Vec::new();
        for pattern in &clause.patterns {
            self.compile_match_pattern(pattern, &mut clause_edges, steps)?;
        }
        if let Some(predicate) = &clause.where_clause {
            steps.push(MatchStep::Filter(self.compile_expr(predicate)?));
        }
        Ok(())
    }

    fn compile_match_pattern(
        &mut self,
        pattern: &Pattern,
        clause_edges: &mut Vec<Slot>,
        steps: &mut Vec<MatchStep>,
    ) -> Result<(), GraphError> {
        let start = &pattern.start;
        let filter = node_filter(start)?;
        let mut previous = match self.match_node_slot(start)? {
            (slot, true) => {
                steps.push(MatchStep::CheckNode { slot, filter });
                slot
            }
            (slot, false) => {
                steps.push(MatchStep::ScanNodes { slot, filter });
                slot
            }
        };
        for step in &pattern.steps {
            let relationship = &step.relationship;
            if let Some(name) = &relationship.variable {
                if self.scope.contains_key(name) {
                    return Err(GraphError::compile(format!(
                        "relationship variable `{name}` is already bound"
                    )));
                }
            }
            let edge_slot = self.declare(relationship.variable.as_ref(), SlotKind::Relationship);
            let (node_slot, node_bound) = self.match_node_slot(&step.node)?;
            steps.push(MatchStep::Expand {
                from: previous,
                edge_slot,
                node_slot,
                node_bound,
                direction: relationship.direction,
                relationship: relationship_filter(relationship)?,
                node: node_filter(&step.node)?,
                distinct_from: clause_edges.clone(),
            });
            clause_edges.push(edge_slot);
            previous = node_slot;
        }
        Ok(())
    }

    /// Slot for a node pattern in MATCH and whether it was already bound.
    fn match_node_slot(&mut self, node: &NodePattern) -> Result<(Slot, bool), GraphError> {
        if let Some(name) = &node.variable {
            if let Some(slot) = self.lookup(name, SlotKind::Node)? {
                return Ok((slot, true));
            }
        }
        Ok((self.declare(node.variable.as_ref(), SlotKind::Node), false))
    }

    fn compile_create(
        &mut self,
        clause: &CreateClause,
        ops: &mut Vec<CreateOp>,
    ) -> Result<(), GraphError> {
        for pattern in &clause.patterns {
            let standalone = pattern.steps.is_empty();
            let mut previous = self.create_node_ref(&pattern.start, standalone, ops)?;
            for step in &pattern.steps {
                let relationship = &step.relationship;
                let edge_type = create_edge_type(relationship)?;
                if let Some(name) = &relationship.variable {
                    if self.scope.contains_key(name) {
                        return Err(GraphError::compile(format!(
                            "variable `{name}` already declared"
                        )));
                    }
                }
                let edge_slot =
                    self.declare(relationship.variable.as_ref(), SlotKind::Relationship);
                let properties = constant_map(&relationship.properties)?;
                let next = self.create_node_ref(&step.node, false, ops)?;
                let (source, target) = match relationship.direction {
                    Direction::Incoming => (next, previous),
                    _ => (previous, next),
                };
                ops.push(CreateOp::Edge {
                    slot: edge_slot,
                    source,
                    target,
                    edge_type,
                    properties,
                });
                previous = next;
            }
        }
        Ok(())
    }

    /// Resolves a node in a CREATE pattern, emitting a node insert when it introduces one.
    fn create_node_ref(
        &mut self,
        node: &NodePattern,
        standalone: bool,
        ops: &mut Vec<CreateOp>,
    ) -> Result<Slot, GraphError> {
        if let Some(name) = &node.variable {
            if let Some(slot) = self.lookup(name, SlotKind::Node)? {
                if standalone || !node.is_bare() {
                    return Err(GraphError::compile(format!(
                        "variable `{name}` already declared"
                    )));
                }
                return Ok(slot);
            }
            if node.is_bare() && !standalone {
                return Err(GraphError::referential(format!(
                    "relationship endpoint `{name}` is not bound to an existing node"
                )));
            }
        }
        let labels: LabelSet = node.labels.iter().cloned().collect();
        labels.validate()?;
        let properties = constant_map(&node.properties)?;
        let slot = self.declare(node.variable.as_ref(), SlotKind::Node);
        ops.push(CreateOp::Node {
            slot,
            labels,
            properties,
        });
        Ok(slot)
    }

    fn compile_return(
        &mut self,
        clause: &ReturnClause,
    ) -> Result<(Projection, Vec<String>), GraphError> {
        let mut items = Vec::with_capacity(clause.items.len());
        let mut columns: Vec<String> = Vec::with_capacity(clause.items.len());
        if clause.star {
            let mut named: Vec<(&String, Slot)> = self
                .scope
                .iter()
                .map(|(name, &(slot, _))| (name, slot))
                .collect();
            if named.is_empty() {
                return Err(GraphError::compile(
                    "RETURN * is not allowed when there are no variables in scope",
                ));
            }
            // Slots are handed out in declaration order.
            named.sort_by_key(|&(_, slot)| slot);
            for (name, slot) in named {
                items.push(ProjectionItem::Value(Expr::Slot(slot)));
                columns.push(name.clone());
            }
        }
        for item in &clause.items {
            let compiled = match &item.expression {
                Expression::CountStar => ProjectionItem::CountStar,
                Expression::FunctionCall { name, arguments } if name == "count" => {
                    if arguments.len() != 1 {
                        return Err(GraphError::compile("count() takes exactly one argument"));
                    }
                    ProjectionItem::Count(self.compile_expr(&arguments[0])?)
                }
                other => ProjectionItem::Value(self.compile_expr(other)?),
            };
            let column = item.alias.clone().unwrap_or_else(|| item.text.clone());
            if columns.contains(&column) {
                return Err(GraphError::compile(format!(
                    "multiple result columns named `{column}`"
                )));
            }
            items.push(compiled);
            columns.push(column);
        }
        Ok((Projection { items }, columns))
    }

    fn compile_expr(&self, expression: &Expression) -> Result<Expr, GraphError> {
        let compiled = match expression {
            Expression::Literal(literal) => Expr::Constant(literal_value(literal)),
            Expression::List(items) => Expr::List(
                items
                    .iter()
                    .map(|item| self.compile_expr(item))
                    .collect::<Result<_, _>>()?,
            ),
            Expression::Map(entries) => Expr::Map(
                entries
                    .iter()
                    .map(|(key, value)| Ok((key.clone(), self.compile_expr(value)?)))
                    .collect::<Result<_, GraphError>>()?,
            ),
            Expression::Variable(name) => match self.scope.get(name) {
                Some(&(slot, _)) => Expr::Slot(slot),
                None => {
                    return Err(GraphError::compile(format!(
                        "variable `{name}` not defined"
                    )));
                }
            },
            Expression::Property(target, key) => {
                Expr::Property(Box::new(self.compile_expr(target)?), key.clone())
            }
            Expression::HasLabels(target, labels) => {
                Expr::HasLabels(Box::new(self.compile_expr(target)?), labels.clone())
            }
            Expression::CountStar => {
                return Err(GraphError::compile(
                    "count(*) is only allowed as a RETURN item",
                ));
            }
            Expression::FunctionCall { name, arguments } => {
                if name == "count" {
                    return Err(GraphError::compile(
                        "count() is only allowed as a RETURN item",
                    ));
                }
                let function = Function::resolve(name).ok_or_else(|| {
                    GraphError::compile(format!("unknown function `{name}`"))
                })?;
                if !function.accepts(arguments.len()) {
                    return Err(GraphError::compile(format!(
                        "wrong number of arguments to `{name}`"
                    )));
                }
                Expr::Call(
                    function,
                    arguments
                        .iter()
                        .map(|argument| self.compile_expr(argument))
                        .collect::<Result<_, _>>()?,
                )
            }
            Expression::Comparison(left, op, right) => Expr::Compare(
                Box::new(self.compile_expr(left)?),
                *op,
                Box::new(self.compile_expr(right)?),
            ),
            Expression::And(left, right) => Expr::And(
                Box::new(self.compile_expr(left)?),
                Box::new(self.compile_expr(right)?),
            ),
            Expression::Or(left, right) => Expr::Or(
                Box::new(self.compile_expr(left)?),
                Box::new(self.compile_expr(right)?),
            ),
            Expression::Not(inner) => Expr::Not(Box::new(self.compile_expr(inner)?)),
            Expression::Negate(inner) => Expr::Negate(Box::new(self.compile_expr(inner)?)),
        };
        Ok(compiled)
    }
}

fn create_edge_type(relationship: &RelationshipPattern) -> Result<String, GraphError> {
    if relationship.direction == Direction::Undirected {
        return Err(GraphError::compile(
            "relationships in CREATE must have a direction",
        ));
    }
    match relationship.types.as_slice() {
        [edge_type] => Ok(edge_type.clone()),
        _ => Err(GraphError::compile(
            "relationships in CREATE must have exactly one type",
        )),
    }
}

fn node_filter(node: &NodePattern) -> Result<NodeFilter, GraphError> {
    Ok(NodeFilter {
        labels: node.labels.clone(),
        properties: constant_map(&node.properties)?,
    })
}

fn relationship_filter(
    relationship: &RelationshipPattern,
) -> Result<RelationshipFilter, GraphError> {
    Ok(RelationshipFilter {
        types: relationship.types.clone(),
        properties: constant_map(&relationship.properties)?,
    })
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::Null,
        Literal::Boolean(b) => Value::Bool(*b),
        Literal::Integer(v) => Value::Integer(*v),
        Literal::Float(v) => Value::Float(*v),
        Literal::String(s) => Value::String(s.clone()),
    }
}

fn constant_map(entries: &[(String, Expression)]) -> Result<PropertyMap, GraphError> {
    let mut map = PropertyMap::new();
    for (key, expression) in entries {
        map.insert(key.clone(), constant_value(expression)?);
    }
    Ok(map)
}

fn constant_value(expression: &Expression) -> Result<PropertyValue, GraphError> {
    let value = match expression {
        Expression::Literal(Literal::Null) => PropertyValue::Null,
        Expression::Literal(Literal::Boolean(b)) => PropertyValue::Bool(*b),
        Expression::Literal(Literal::Integer(v)) => PropertyValue::Integer(*v),
        Expression::Literal(Literal::Float(v)) => PropertyValue::Float(*v),
        Expression::Literal(Literal::String(s)) => PropertyValue::String(s.clone()),
        Expression::List(items) => PropertyValue::List(
            items
                .iter()
                .map(constant_value)
                .collect::<Result<_, _>>()?,
        ),
        Expression::Map(entries) => PropertyValue::Map(constant_map(entries)?),
        _ => {
            return Err(GraphError::compile(
                "malformed property literal: pattern property values must be constants",
            ));
        }
    };
    Ok(value)
}
