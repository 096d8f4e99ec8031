use std::fmt;

/// Custom error type for query-tables operations
#[derive(Debug)]
pub enum Error {
    /// Requested table is not present in the loaded schema
    NotTable(String),
    /// Construction of a table query failed after the table was found
    QueryTable(String, Box<Error>),
    /// Schema discovery against the backend failed
    SchemaLoad(Box<Error>),
    /// A filter or assignment value cannot be rendered as a SQL literal
    ValueConversion(String),
    /// UPDATE/INSERT/DELETE attempted on a query with joins
    JoinExecute(String),
    /// Cache insert row does not match the entry's declared field set
    FieldMismatch(String),
    /// Direct cache access requested while caching is disabled
    CacheDisabled,
    /// Builder misuse: duplicate alias, unknown column, operator arity
    QueryBuild(String),
    /// Error from the underlying database driver
    Backend(String),
    /// Error from the cache store or entry serialization
    Cache(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotTable(name) => write!(f, "No such table: {name}"),
            Error::QueryTable(name, err) => {
                write!(f, "Failed to build query for table {name}: {err}")
            }
            Error::SchemaLoad(err) => write!(f, "Failed to load table structure: {err}"),
            Error::ValueConversion(msg) => write!(f, "Cannot convert value to SQL literal: {msg}"),
            Error::JoinExecute(msg) => {
                write!(f, "Write statements cannot be executed on a joined query: {msg}")
            }
            Error::FieldMismatch(msg) => write!(f, "Row fields do not match cache entry: {msg}"),
            Error::CacheDisabled => write!(f, "Cache is disabled"),
            Error::QueryBuild(msg) => write!(f, "Invalid query: {msg}"),
            Error::Backend(msg) => write!(f, "Database error: {msg}"),
            Error::Cache(msg) => write!(f, "Cache error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::QueryTable(_, err) => Some(err),
            Error::SchemaLoad(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Backend(err.to_string())
    }
}

impl From<postgres::Error> for Error {
    fn from(err: postgres::Error) -> Self {
        Error::Backend(err.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Cache(format!("JSON error: {err}"))
    }
}

/// Result type for query-tables operations
pub type Result<T> = std::result::Result<T, Error>;
