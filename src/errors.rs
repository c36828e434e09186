use std::fmt;

use thiserror::Error;

/// Error type for graph storage, planning and query compilation.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("connection error: {0}")]
    ConnectionError(String),
    #[error("schema error: {0}")]
    SchemaError(String),
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("query error: {0}")]
    QueryError(String),
    #[error("referential error: {0}")]
    ReferentialError(String),
    #[error("compile error: {0}")]
    CompileError(String),
    #[error("invalid filter: {0}")]
    InvalidFilter(String),
    #[error("entity not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Payload-free classification of a [`GraphError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    Schema,
    SchemaMismatch,
    Query,
    Referential,
    Compile,
    InvalidFilter,
    NotFound,
    InvalidInput,
}

impl GraphError {
    pub fn connection<T: Into<String>>(msg: T) -> Self {
        GraphError::ConnectionError(msg.into())
    }

    pub fn schema<T: Into<String>>(msg: T) -> Self {
        GraphError::SchemaError(msg.into())
    }

    pub fn schema_mismatch<T: Into<String>>(msg: T) -> Self {
        GraphError::SchemaMismatch(msg.into())
    }

    pub fn query<T: Into<String>>(msg: T) -> Self {
        GraphError::QueryError(msg.into())
    }

    pub fn referential<T: Into<String>>(msg: T) -> Self {
        GraphError::ReferentialError(msg.into())
    }

    pub fn compile<T: Into<String>>(msg: T) -> Self {
        GraphError::CompileError(msg.into())
    }

    pub fn invalid_filter<T: Into<String>>(msg: T) -> Self {
        GraphError::InvalidFilter(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        GraphError::NotFound(msg.into())
    }

    pub fn invalid_input<T: Into<String>>(msg: T) -> Self {
        GraphError::InvalidInput(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphError::ConnectionError(_) => ErrorKind::Connection,
            GraphError::SchemaError(_) => ErrorKind::Schema,
            GraphError::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            GraphError::QueryError(_) => ErrorKind::Query,
            GraphError::ReferentialError(_) => ErrorKind::Referential,
            GraphError::CompileError(_) => ErrorKind::Compile,
            GraphError::InvalidFilter(_) => ErrorKind::InvalidFilter,
            GraphError::NotFound(_) => ErrorKind::NotFound,
            GraphError::InvalidInput(_) => ErrorKind::InvalidInput,
        }
    }

    /// Maps a statement failure, classifying foreign-key violations as referential errors.
    pub(crate) fn from_statement(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, _) = &err {
            if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY {
                return GraphError::referential(err.to_string());
            }
        }
        GraphError::query(err.to_string())
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Connection => "ConnectionError",
            ErrorKind::Schema => "SchemaError",
            ErrorKind::SchemaMismatch => "SchemaMismatchError",
            ErrorKind::Query => "QueryError",
            ErrorKind::Referential => "ReferentialError",
            ErrorKind::Compile => "CompileError",
            ErrorKind::InvalidFilter => "InvalidFilterError",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::InvalidInput => "InvalidInput",
        };
        f.write_str(name)
    }
}

impl From<GraphError> for rusqlite::Error {
    fn from(err: GraphError) -> Self {
        rusqlite::Error::ModuleError(err.to_string())
    }
}
