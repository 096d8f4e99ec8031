//! Result cache contract
//!
//! Both cache implementations store entries keyed by the exact emitted SQL
//! string, keep a `table → set<sql-key>` reverse index consistent with the
//! entry store, and hold one distinguished slot for the loaded table
//! structure. The blocking trait is the primary contract; the in-process
//! cache also implements the cooperative trait directly, because none of its
//! operations suspend.

mod memory;
mod redis;

pub use self::memory::{CacheQuery, DEFAULT_CACHE_MAXSIZE};
pub use self::redis::{AsyncRedisCache, RedisCache, RedisConnect};

use crate::error::Result;
use crate::rows::Row;
use crate::schema::TableStruct;
use crate::value::Value;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Where a cache lives; remote caches survive the process and carry the
/// schema slot across boots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Local,
    Remote,
}

/// One stored cache value.
///
/// Mapped entries come from the query façade and carry the declared
/// qualified-field list plus the contributing tables; raw entries come from
/// the ad-hoc SQL path and join no reverse index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CacheEntry {
    Rows {
        rows: Vec<Row>,
        fields: Vec<String>,
        tables: BTreeSet<String>,
    },
    Tuples {
        rows: Vec<Vec<Value>>,
    },
}

/// Cache contract, blocking surface
pub trait Cache: Send + Sync {
    fn kind(&self) -> CacheKind;

    /// False when every read misses and every write is dropped
    fn is_enabled(&self) -> bool;

    /// Rows of the mapped entry for this SQL, if present and alive
    fn get(&self, sql: &str) -> Result<Option<Vec<Row>>>;

    /// Store a mapped entry and record it under each contributing table
    fn set(
        &self,
        sql: &str,
        rows: Vec<Row>,
        fields: Vec<String>,
        tables: BTreeSet<String>,
    ) -> Result<()>;

    /// Drop the entry for this SQL and its reverse-index references
    fn delete(&self, sql: &str) -> Result<()>;

    /// Drop every entry recorded under this table
    fn delete_by_table(&self, table: &str) -> Result<()>;

    /// Purge entries, reverse index and the schema slot
    fn clear(&self) -> Result<()>;

    /// Raw tuples of the ad-hoc entry for this SQL
    fn get_raw(&self, sql: &str) -> Result<Option<Vec<Vec<Value>>>>;

    /// Store an ad-hoc entry; it joins no reverse index
    fn set_raw(&self, sql: &str, rows: Vec<Vec<Value>>) -> Result<()>;

    /// Read the schema slot
    fn struct_tables(&self) -> Result<Option<TableStruct>>;

    /// Write the schema slot
    fn set_struct_tables(&self, tables: &TableStruct) -> Result<()>;

    /// Rows of the entry matching the predicate map (linear scan)
    fn filter_rows(&self, sql: &str, predicate: &Row) -> Result<Vec<Row>>;

    /// Apply assignments to matching rows in place; returns rows touched
    fn update_rows(&self, sql: &str, predicate: &Row, assigns: &Row) -> Result<usize>;

    /// Append a row; it must carry exactly the entry's declared fields
    fn insert_row(&self, sql: &str, row: Row) -> Result<()>;

    /// Remove matching rows; returns rows removed
    fn delete_rows(&self, sql: &str, predicate: &Row) -> Result<usize>;
}

/// Cache contract, cooperative surface
#[async_trait]
pub trait AsyncCache: Send + Sync {
    fn kind(&self) -> CacheKind;

    fn is_enabled(&self) -> bool;

    async fn get(&self, sql: &str) -> Result<Option<Vec<Row>>>;

    async fn set(
        &self,
        sql: &str,
        rows: Vec<Row>,
        fields: Vec<String>,
        tables: BTreeSet<String>,
    ) -> Result<()>;

    async fn delete(&self, sql: &str) -> Result<()>;

    async fn delete_by_table(&self, table: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    async fn get_raw(&self, sql: &str) -> Result<Option<Vec<Vec<Value>>>>;

    async fn set_raw(&self, sql: &str, rows: Vec<Vec<Value>>) -> Result<()>;

    async fn struct_tables(&self) -> Result<Option<TableStruct>>;

    async fn set_struct_tables(&self, tables: &TableStruct) -> Result<()>;

    async fn filter_rows(&self, sql: &str, predicate: &Row) -> Result<Vec<Row>>;

    async fn update_rows(&self, sql: &str, predicate: &Row, assigns: &Row) -> Result<usize>;

    async fn insert_row(&self, sql: &str, row: Row) -> Result<()>;

    async fn delete_rows(&self, sql: &str, predicate: &Row) -> Result<usize>;
}
