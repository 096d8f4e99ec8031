//! Scalar value model shared by the query builder, the backends and the cache.
//!
//! Every value that can appear in a filter, an assignment or a fetched row is
//! one of these variants. Rendering to a SQL literal is dialect-aware (boolean
//! literals differ between SQLite and PostgreSQL) and total except for byte
//! buffers, which are rejected before any SQL reaches a backend.

use crate::db::DbType;
use crate::error::{Error, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A single scalar value in a row, filter or assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Bool(bool),
    Text(String),
    /// Calendar date, rendered as 'YYYY-MM-DD'
    Date(NaiveDate),
    /// Date and time, rendered as 'YYYY-MM-DD HH:MM:SS'
    DateTime(NaiveDateTime),
    /// Raw byte buffer; carried through rows but never renderable as a literal
    Bytes(Vec<u8>),
}

impl Value {
    /// Render the value as a SQL literal for the given dialect.
    ///
    /// Strings and dates are single-quoted with inner quotes doubled. Byte
    /// buffers fail with a value-conversion error.
    pub fn to_sql_literal(&self, db_type: DbType) -> Result<String> {
        match self {
            Value::Null => Ok("NULL".to_string()),
            Value::Integer(n) => Ok(n.to_string()),
            Value::Real(r) => Ok(r.to_string()),
            Value::Bool(b) => {
                let literal = match (db_type, *b) {
                    (DbType::Sqlite, true) => "1",
                    (DbType::Sqlite, false) => "0",
                    (DbType::Postgres, true) => "TRUE",
                    (DbType::Postgres, false) => "FALSE",
                };
                Ok(literal.to_string())
            }
            Value::Text(s) => Ok(quote_str(s)),
            Value::Date(d) => Ok(quote_str(&d.format("%Y-%m-%d").to_string())),
            Value::DateTime(dt) => Ok(quote_str(&dt.format("%Y-%m-%d %H:%M:%S").to_string())),
            Value::Bytes(b) => Err(Error::ValueConversion(format!(
                "byte buffers are not accepted as literals ({} bytes)",
                b.len()
            ))),
        }
    }

    /// True for NULL
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Single-quote a string, doubling any inner single quotes
fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Integer(n as i64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Integer(n as i64)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(dt: NaiveDateTime) -> Self {
        Value::DateTime(dt)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_rendering() {
        assert_eq!(
            Value::Integer(42).to_sql_literal(DbType::Sqlite).unwrap(),
            "42"
        );
        assert_eq!(
            Value::Real(3.5).to_sql_literal(DbType::Sqlite).unwrap(),
            "3.5"
        );
        assert_eq!(
            Value::Text("Anton".into())
                .to_sql_literal(DbType::Sqlite)
                .unwrap(),
            "'Anton'"
        );
        assert_eq!(
            Value::Null.to_sql_literal(DbType::Sqlite).unwrap(),
            "NULL"
        );
    }

    #[test]
    fn test_bool_literal_per_dialect() {
        assert_eq!(
            Value::Bool(true).to_sql_literal(DbType::Sqlite).unwrap(),
            "1"
        );
        assert_eq!(
            Value::Bool(true).to_sql_literal(DbType::Postgres).unwrap(),
            "TRUE"
        );
        assert_eq!(
            Value::Bool(false).to_sql_literal(DbType::Postgres).unwrap(),
            "FALSE"
        );
    }

    #[test]
    fn test_quote_doubling() {
        let v = Value::Text("1'; DROP TABLE users; --".into());
        assert_eq!(
            v.to_sql_literal(DbType::Sqlite).unwrap(),
            "'1''; DROP TABLE users; --'"
        );
    }

    #[test]
    fn test_date_rendering() {
        let d = NaiveDate::from_ymd_opt(2021, 2, 20).unwrap();
        assert_eq!(
            Value::Date(d).to_sql_literal(DbType::Postgres).unwrap(),
            "'2021-02-20'"
        );
    }

    #[test]
    fn test_bytes_rejected() {
        let v = Value::Bytes(b"27204f52".to_vec());
        assert!(matches!(
            v.to_sql_literal(DbType::Sqlite),
            Err(Error::ValueConversion(_))
        ));
    }
}
