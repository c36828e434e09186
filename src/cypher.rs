//! Cypher subset: `MATCH`, `CREATE` and `RETURN` with `WHERE` filters.

pub mod ast;
pub mod compiler;
pub mod executor;
pub mod lexer;
pub mod parser;

use tracing::debug;

use crate::{errors::GraphError, graph::GraphStore, result::QueryResult};

pub use compiler::{CompiledQuery, compile};
pub use lexer::split_statements;
pub use parser::parse;

/// Parses and compiles one statement without touching the store.
pub fn prepare(text: &str) -> Result<CompiledQuery, GraphError> {
    let query = parse(text)?;
    compile(&query)
}

/// Prepares and runs one statement against `store`.
pub fn run<'s>(store: &'s GraphStore, text: &str) -> Result<QueryResult<'s>, GraphError> {
    let compiled = prepare(text).inspect_err(|err| {
        debug!(error = %err, "cypher.prepare.failed");
    })?;
    executor::execute(store, compiled)
}
