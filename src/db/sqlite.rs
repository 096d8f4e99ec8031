//! SQLite backend over rusqlite.
//!
//! The blocking handle opens a fresh connection per scope. The cooperative
//! handle wraps the same connection in `spawn_blocking`, since SQLite itself
//! only offers a synchronous API.

use super::{AsyncDbCursor, AsyncDbQuery, DbCursor, DbQuery, DbType};
use crate::error::{Error, Result};
use crate::value::Value;
use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::path::PathBuf;

/// Blocking SQLite backend handle
pub struct SqliteQuery {
    path: PathBuf,
}

impl SqliteQuery {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SqliteQuery { path: path.into() }
    }
}

impl DbQuery for SqliteQuery {
    fn connect(&self) -> Result<Box<dyn DbCursor>> {
        let conn = Connection::open(&self.path)?;
        Ok(Box::new(SqliteCursor {
            conn,
            rows: Vec::new(),
        }))
    }

    fn get_type(&self) -> DbType {
        DbType::Sqlite
    }
}

struct SqliteCursor {
    conn: Connection,
    rows: Vec<Vec<Value>>,
}

impl DbCursor for SqliteCursor {
    fn execute(&mut self, sql: &str) -> Result<u64> {
        let (rows, affected) = run_statement(&self.conn, sql)?;
        self.rows = rows;
        Ok(affected)
    }

    fn fetchall(&mut self) -> Result<Vec<Vec<Value>>> {
        Ok(std::mem::take(&mut self.rows))
    }
}

/// Run one statement, collecting tuples when it returns rows
fn run_statement(conn: &Connection, sql: &str) -> Result<(Vec<Vec<Value>>, u64)> {
    let mut stmt = conn.prepare(sql)?;
    if stmt.column_count() > 0 {
        let column_count = stmt.column_count();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut tuple = Vec::with_capacity(column_count);
            for i in 0..column_count {
                tuple.push(value_from_sqlite(row.get_ref(i)?));
            }
            out.push(tuple);
        }
        Ok((out, 0))
    } else {
        let affected = stmt.execute([])? as u64;
        Ok((Vec::new(), affected))
    }
}

fn value_from_sqlite(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Integer(n),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

/// Cooperative SQLite backend handle; statements run under `spawn_blocking`
pub struct AsyncSqliteQuery {
    path: PathBuf,
}

impl AsyncSqliteQuery {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        AsyncSqliteQuery { path: path.into() }
    }
}

#[async_trait]
impl AsyncDbQuery for AsyncSqliteQuery {
    async fn connect(&self) -> Result<Box<dyn AsyncDbCursor>> {
        let path = self.path.clone();
        let conn = tokio::task::spawn_blocking(move || Connection::open(path))
            .await
            .map_err(join_error)??;
        Ok(Box::new(AsyncSqliteCursor {
            conn: Some(conn),
            rows: Vec::new(),
        }))
    }

    fn get_type(&self) -> DbType {
        DbType::Sqlite
    }
}

struct AsyncSqliteCursor {
    /// Taken out while a blocking task owns the connection
    conn: Option<Connection>,
    rows: Vec<Vec<Value>>,
}

#[async_trait]
impl AsyncDbCursor for AsyncSqliteCursor {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        let conn = self
            .conn
            .take()
            .ok_or_else(|| Error::Backend("sqlite connection is gone".to_string()))?;
        let sql = sql.to_string();
        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = run_statement(&conn, &sql);
            (conn, result)
        })
        .await
        .map_err(join_error)?;
        self.conn = Some(conn);
        let (rows, affected) = result?;
        self.rows = rows;
        Ok(affected)
    }

    async fn fetchall(&mut self) -> Result<Vec<Vec<Value>>> {
        Ok(std::mem::take(&mut self.rows))
    }
}

fn join_error(err: tokio::task::JoinError) -> Error {
    Error::Backend(format!("blocking task failed: {err}"))
}
