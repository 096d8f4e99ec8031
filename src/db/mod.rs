//! Database backend seam
//!
//! The rest of the crate talks to a backend only through these traits: acquire
//! a cursor, run statements, fetch tuples, drop the cursor to release the
//! connection. Dropping is the scoped release, so every exit path — success or
//! error — gives the connection back. One pair of traits per surface.

mod postgres;
mod sqlite;

pub use self::postgres::{AsyncPostgresQuery, DbConfigPg, PostgresQuery};
pub use self::sqlite::{AsyncSqliteQuery, SqliteQuery};

use crate::error::Result;
use crate::value::Value;
use async_trait::async_trait;

/// Backend dialect tag; drives literal rendering and schema discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    /// Embedded file engine
    Sqlite,
    /// Network server
    Postgres,
}

/// Cursor over one acquired connection (blocking surface)
pub trait DbCursor {
    /// Run one statement; returns the affected-row count for writes
    fn execute(&mut self, sql: &str) -> Result<u64>;

    /// Take the tuples produced by the last row-returning statement
    fn fetchall(&mut self) -> Result<Vec<Vec<Value>>>;
}

/// Backend handle (blocking surface); cheap to share across table queries
pub trait DbQuery: Send + Sync {
    /// Acquire a cursor; dropping it releases the connection
    fn connect(&self) -> Result<Box<dyn DbCursor>>;

    /// Dialect of this backend
    fn get_type(&self) -> DbType;
}

/// Cursor over one acquired connection (cooperative surface)
#[async_trait]
pub trait AsyncDbCursor: Send {
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    async fn fetchall(&mut self) -> Result<Vec<Vec<Value>>>;
}

/// Backend handle (cooperative surface)
#[async_trait]
pub trait AsyncDbQuery: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn AsyncDbCursor>>;

    fn get_type(&self) -> DbType;
}

/// Statements that produce a row set rather than an affected-row count
pub(crate) fn returns_rows(sql: &str) -> bool {
    let head = sql.trim_start();
    ["SELECT", "WITH", "VALUES", "SHOW", "PRAGMA"]
        .iter()
        .any(|kw| {
            head.get(..kw.len())
                .map_or(false, |prefix| prefix.eq_ignore_ascii_case(kw))
        })
}
