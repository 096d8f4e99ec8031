//! Schema discovery
//!
//! Builds the `{table → [column, …]}` structure the registry anchors field
//! naming on. Three mutually exclusive filters, in descending precedence: an
//! explicit table list, a name prefix, or everything in the logical schema.

use crate::db::{AsyncDbQuery, DbQuery};
use crate::error::{Error, Result};
use crate::value::Value;
use std::collections::HashMap;

/// Loaded table structure: table name to ordered column list
pub type TableStruct = HashMap<String, Vec<String>>;

/// Table filters for schema discovery
#[derive(Debug, Clone, Default)]
pub struct SchemaFilter {
    /// Load only tables whose name starts with this prefix (when non-empty)
    pub prefix: String,
    /// Explicit table list; ignored when a prefix is set
    pub tables: Option<Vec<String>>,
    /// Logical schema name (PostgreSQL only)
    pub table_schema: String,
}

/// One query over information_schema; identifiers cast to text, ordered so
/// column positions are deterministic
fn pg_struct_query(filter: &SchemaFilter) -> String {
    let mut query = String::from(
        "select it.table_name::text, ic.column_name::text \
         from information_schema.tables it \
         join information_schema.columns ic \
           on it.table_name = ic.table_name and it.table_schema = ic.table_schema \
         where 1=1",
    );
    if !filter.table_schema.is_empty() {
        query.push_str(&format!(
            " and it.table_schema = '{}'",
            filter.table_schema
        ));
    }
    if !filter.prefix.is_empty() {
        query.push_str(&format!(" and it.table_name like '{}%'", filter.prefix));
    } else if let Some(tables) = &filter.tables {
        let list: Vec<String> = tables.iter().map(|t| format!("'{t}'")).collect();
        query.push_str(&format!(" and it.table_name in ({})", list.join(", ")));
    }
    query.push_str(" order by it.table_name, ic.ordinal_position");
    query
}

/// True when the table passes the prefix/list filter
fn keep_table(filter: &SchemaFilter, table: &str) -> bool {
    if !filter.prefix.is_empty() {
        table.starts_with(&filter.prefix)
    } else if let Some(tables) = &filter.tables {
        tables.iter().any(|t| t == table)
    } else {
        true
    }
}

fn fold_pg_rows(tuples: Vec<Vec<Value>>) -> Result<TableStruct> {
    let mut tables = TableStruct::new();
    for tuple in tuples {
        match (tuple.first(), tuple.get(1)) {
            (Some(Value::Text(table)), Some(Value::Text(column))) => {
                tables
                    .entry(table.clone())
                    .or_insert_with(Vec::new)
                    .push(column.clone());
            }
            _ => {
                return Err(Error::Backend(
                    "information_schema returned a non-text identifier".to_string(),
                ))
            }
        }
    }
    Ok(tables)
}

fn table_names_from(tuples: Vec<Vec<Value>>) -> Vec<String> {
    let mut names: Vec<String> = tuples
        .into_iter()
        .filter_map(|tuple| match tuple.into_iter().next() {
            Some(Value::Text(name)) => Some(name),
            _ => None,
        })
        .collect();
    names.sort();
    names
}

fn column_from_pragma(tuple: &[Value]) -> Option<String> {
    // PRAGMA table_info rows are (cid, name, type, notnull, dflt_value, pk)
    match tuple.get(1) {
        Some(Value::Text(name)) => Some(name.clone()),
        _ => None,
    }
}

const SQLITE_MASTER_QUERY: &str = "select name from sqlite_master where type='table'";

/// Load the structure from PostgreSQL (blocking)
pub fn load_pg_struct(db: &dyn DbQuery, filter: &SchemaFilter) -> Result<TableStruct> {
    let run = || -> Result<TableStruct> {
        let mut cursor = db.connect()?;
        cursor.execute(&pg_struct_query(filter))?;
        fold_pg_rows(cursor.fetchall()?)
    };
    run().map_err(|err| Error::SchemaLoad(Box::new(err)))
}

/// Load the structure from SQLite (blocking); one connection for the walk
pub fn load_sqlite_struct(db: &dyn DbQuery, filter: &SchemaFilter) -> Result<TableStruct> {
    let run = || -> Result<TableStruct> {
        let mut cursor = db.connect()?;
        cursor.execute(SQLITE_MASTER_QUERY)?;
        let mut tables = TableStruct::new();
        for name in table_names_from(cursor.fetchall()?) {
            if !keep_table(filter, &name) {
                continue;
            }
            cursor.execute(&format!("PRAGMA table_info({name})"))?;
            let columns = cursor
                .fetchall()?
                .iter()
                .filter_map(|tuple| column_from_pragma(tuple))
                .collect();
            tables.insert(name, columns);
        }
        Ok(tables)
    };
    run().map_err(|err| Error::SchemaLoad(Box::new(err)))
}

/// Load the structure from PostgreSQL (cooperative)
pub async fn load_pg_struct_async(
    db: &dyn AsyncDbQuery,
    filter: &SchemaFilter,
) -> Result<TableStruct> {
    let run = async {
        let mut cursor = db.connect().await?;
        cursor.execute(&pg_struct_query(filter)).await?;
        fold_pg_rows(cursor.fetchall().await?)
    };
    run.await.map_err(|err| Error::SchemaLoad(Box::new(err)))
}

/// Load the structure from SQLite (cooperative)
pub async fn load_sqlite_struct_async(
    db: &dyn AsyncDbQuery,
    filter: &SchemaFilter,
) -> Result<TableStruct> {
    let run = async {
        let mut cursor = db.connect().await?;
        cursor.execute(SQLITE_MASTER_QUERY).await?;
        let names = table_names_from(cursor.fetchall().await?);
        let mut tables = TableStruct::new();
        for name in names {
            if !keep_table(filter, &name) {
                continue;
            }
            cursor.execute(&format!("PRAGMA table_info({name})")).await?;
            let columns = cursor
                .fetchall()
                .await?
                .iter()
                .filter_map(|tuple| column_from_pragma(tuple))
                .collect();
            tables.insert(name, columns);
        }
        Ok(tables)
    };
    run.await.map_err(|err| Error::SchemaLoad(Box::new(err)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pg_query_with_prefix() {
        let filter = SchemaFilter {
            prefix: "common".to_string(),
            tables: Some(vec!["ignored".to_string()]),
            table_schema: "public".to_string(),
        };
        let query = pg_struct_query(&filter);
        assert!(query.contains("it.table_schema = 'public'"));
        assert!(query.contains("it.table_name like 'common%'"));
        assert!(!query.contains("ignored"));
        assert!(query.ends_with("order by it.table_name, ic.ordinal_position"));
    }

    #[test]
    fn test_pg_query_with_table_list() {
        let filter = SchemaFilter {
            prefix: String::new(),
            tables: Some(vec!["person".to_string(), "address".to_string()]),
            table_schema: "public".to_string(),
        };
        let query = pg_struct_query(&filter);
        assert!(query.contains("it.table_name in ('person', 'address')"));
    }

    #[test]
    fn test_keep_table_precedence() {
        let filter = SchemaFilter {
            prefix: "app_".to_string(),
            tables: Some(vec!["person".to_string()]),
            table_schema: String::new(),
        };
        assert!(keep_table(&filter, "app_person"));
        assert!(!keep_table(&filter, "person"));
    }
}
