//! Table query façade
//!
//! A [`QueryTable`] joins one table's schema fields with the shared backend
//! handle and cache. Builder calls delegate to the inner [`Query`]; terminal
//! calls execute. Reads go through the cache when it is enabled; writes
//! execute first and then drop every cache entry recorded under this table in
//! the reverse index. Instances are transient: the registry creates one per
//! operation chain, and only the registry owns the collaborators.

use crate::cache::{AsyncCache, Cache};
use crate::db::{AsyncDbQuery, DbQuery};
use crate::error::{Error, Result};
use crate::query::{Direction, Join, Predicate, Query};
use crate::rows::{rows_from_tuples, Row};
use crate::value::Value;
use std::sync::Arc;

/// Fluent query over one schema-known table (blocking surface)
pub struct QueryTable {
    db: Arc<dyn DbQuery>,
    cache: Arc<dyn Cache>,
    table: String,
    query: Query,
}

impl QueryTable {
    pub(crate) fn new(
        db: Arc<dyn DbQuery>,
        cache: Arc<dyn Cache>,
        table: &str,
        fields: &[String],
    ) -> Self {
        let query = Query::new(table, fields.to_vec()).dialect(db.get_type());
        QueryTable {
            db,
            cache,
            table: table.to_string(),
            query,
        }
    }

    /// Append AND-conjoined predicates
    pub fn filter<I>(mut self, predicates: I) -> Self
    where
        I: IntoIterator<Item = Predicate>,
    {
        self.query = self.query.filter(predicates);
        self
    }

    /// Replace the projection
    pub fn select<I>(mut self, columns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.query = self.query.select(columns);
        self
    }

    /// Order by a column of this table
    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.query = self.query.order_by(column, direction);
        self
    }

    /// Cap the number of returned rows
    pub fn limit(mut self, n: u64) -> Self {
        self.query = self.query.limit(n);
        self
    }

    /// Attach a joined child query
    pub fn join(mut self, join: Join) -> Self {
        self.query = self.query.join(join);
        self
    }

    /// The query tree built so far
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Ordered qualified column keys a `get` will produce
    pub fn map_fields(&self) -> Vec<String> {
        self.query.map_fields()
    }

    /// Execute the SELECT, serving from the cache when possible.
    ///
    /// A cached entry with zero rows counts as a miss: that is what an
    /// invalidated entry looks like, so the backend is asked again and the
    /// entry repopulated.
    pub fn get(&self) -> Result<Vec<Row>> {
        let sql = self.query.get()?;
        let use_cache = self.cache.is_enabled();
        if use_cache {
            if let Some(rows) = self.cache.get(&sql)? {
                if !rows.is_empty() {
                    log::debug!("cache hit for {}", self.table);
                    return Ok(rows);
                }
            }
        }
        log::debug!("executing: {sql}");
        let tuples = self.fetch(&sql)?;
        let fields = self.query.map_fields();
        let rows = rows_from_tuples(&fields, tuples)?;
        if use_cache {
            self.cache
                .set(&sql, rows.clone(), fields, self.query.tables())?;
        }
        Ok(rows)
    }

    /// Execute a COUNT(*) against the backend
    pub fn count(&self) -> Result<u64> {
        let sql = self.query.count()?;
        let tuples = self.fetch(&sql)?;
        count_from_tuples(tuples)
    }

    /// Execute an UPDATE, then invalidate this table's cache entries
    pub fn update<I>(&self, assigns: I) -> Result<u64>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let sql = self.query.update(assigns)?;
        let affected = self.execute(&sql)?;
        self.cache.delete_by_table(&self.table)?;
        Ok(affected)
    }

    /// Execute a multi-row INSERT, then invalidate this table's cache entries
    pub fn insert(&self, rows: Vec<Vec<(String, Value)>>) -> Result<u64> {
        let sql = self.query.insert(rows)?;
        let affected = self.execute(&sql)?;
        self.cache.delete_by_table(&self.table)?;
        Ok(affected)
    }

    /// Execute a DELETE, then invalidate this table's cache entries
    pub fn delete(&self) -> Result<u64> {
        let sql = self.query.delete()?;
        let affected = self.execute(&sql)?;
        self.cache.delete_by_table(&self.table)?;
        Ok(affected)
    }

    /// Handle over the cache entry this query's SELECT would populate
    pub fn cache(&self) -> Result<CacheQueryHandle> {
        if !self.cache.is_enabled() {
            return Err(Error::CacheDisabled);
        }
        Ok(CacheQueryHandle {
            cache: Arc::clone(&self.cache),
            sql: self.query.get()?,
        })
    }

    /// Drop just this query's cache entry
    pub fn delete_cache_query(&self) -> Result<()> {
        self.cache.delete(&self.query.get()?)
    }

    /// Drop every cache entry recorded under this table
    pub fn delete_cache_table(&self) -> Result<()> {
        self.cache.delete_by_table(&self.table)
    }

    fn fetch(&self, sql: &str) -> Result<Vec<Vec<Value>>> {
        let mut cursor = self.db.connect()?;
        cursor.execute(sql)?;
        cursor.fetchall()
    }

    fn execute(&self, sql: &str) -> Result<u64> {
        let mut cursor = self.db.connect()?;
        cursor.execute(sql)
    }
}

impl From<QueryTable> for Query {
    fn from(table: QueryTable) -> Query {
        table.query
    }
}

fn count_from_tuples(tuples: Vec<Vec<Value>>) -> Result<u64> {
    match tuples.first().and_then(|t| t.first()) {
        Some(Value::Integer(n)) => Ok(*n as u64),
        other => Err(Error::Backend(format!(
            "COUNT returned an unexpected value: {other:?}"
        ))),
    }
}

/// Operations over one cache entry, addressed by its emitted SQL
pub struct CacheQueryHandle {
    cache: Arc<dyn Cache>,
    sql: String,
}

impl CacheQueryHandle {
    /// All rows of the entry; empty when the entry is absent
    pub fn get(&self) -> Result<Vec<Row>> {
        Ok(self.cache.get(&self.sql)?.unwrap_or_default())
    }

    /// Narrow to the rows matching a predicate map
    pub fn filter(&self, predicate: Row) -> CacheFilter {
        CacheFilter {
            cache: Arc::clone(&self.cache),
            sql: self.sql.clone(),
            predicate,
        }
    }

    /// Append a row carrying exactly the entry's declared fields
    pub fn insert(&self, row: Row) -> Result<()> {
        self.cache.insert_row(&self.sql, row)
    }

    /// Drop the whole entry
    pub fn delete_query(&self) -> Result<()> {
        self.cache.delete(&self.sql)
    }
}

/// A predicate-scoped view into one cache entry
pub struct CacheFilter {
    cache: Arc<dyn Cache>,
    sql: String,
    predicate: Row,
}

impl CacheFilter {
    /// Matching rows
    pub fn get(&self) -> Result<Vec<Row>> {
        self.cache.filter_rows(&self.sql, &self.predicate)
    }

    /// Assign values on matching rows; returns rows touched
    pub fn update(&self, assigns: Row) -> Result<usize> {
        self.cache.update_rows(&self.sql, &self.predicate, &assigns)
    }

    /// Remove matching rows; returns rows removed
    pub fn delete(&self) -> Result<usize> {
        self.cache.delete_rows(&self.sql, &self.predicate)
    }
}

/// Fluent query over one schema-known table (cooperative surface)
pub struct AsyncQueryTable {
    db: Arc<dyn AsyncDbQuery>,
    cache: Arc<dyn AsyncCache>,
    table: String,
    query: Query,
}

impl AsyncQueryTable {
    pub(crate) fn new(
        db: Arc<dyn AsyncDbQuery>,
        cache: Arc<dyn AsyncCache>,
        table: &str,
        fields: &[String],
    ) -> Self {
        let query = Query::new(table, fields.to_vec()).dialect(db.get_type());
        AsyncQueryTable {
            db,
            cache,
            table: table.to_string(),
            query,
        }
    }

    pub fn filter<I>(mut self, predicates: I) -> Self
    where
        I: IntoIterator<Item = Predicate>,
    {
        self.query = self.query.filter(predicates);
        self
    }

    pub fn select<I>(mut self, columns: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.query = self.query.select(columns);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.query = self.query.order_by(column, direction);
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.query = self.query.limit(n);
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.query = self.query.join(join);
        self
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn map_fields(&self) -> Vec<String> {
        self.query.map_fields()
    }

    /// Execute the SELECT, serving from the cache when possible
    pub async fn get(&self) -> Result<Vec<Row>> {
        let sql = self.query.get()?;
        let use_cache = self.cache.is_enabled();
        if use_cache {
            if let Some(rows) = self.cache.get(&sql).await? {
                if !rows.is_empty() {
                    log::debug!("cache hit for {}", self.table);
                    return Ok(rows);
                }
            }
        }
        log::debug!("executing: {sql}");
        let tuples = self.fetch(&sql).await?;
        let fields = self.query.map_fields();
        let rows = rows_from_tuples(&fields, tuples)?;
        if use_cache {
            self.cache
                .set(&sql, rows.clone(), fields, self.query.tables())
                .await?;
        }
        Ok(rows)
    }

    pub async fn count(&self) -> Result<u64> {
        let sql = self.query.count()?;
        let tuples = self.fetch(&sql).await?;
        count_from_tuples(tuples)
    }

    pub async fn update<I>(&self, assigns: I) -> Result<u64>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let sql = self.query.update(assigns)?;
        let affected = self.execute(&sql).await?;
        self.cache.delete_by_table(&self.table).await?;
        Ok(affected)
    }

    pub async fn insert(&self, rows: Vec<Vec<(String, Value)>>) -> Result<u64> {
        let sql = self.query.insert(rows)?;
        let affected = self.execute(&sql).await?;
        self.cache.delete_by_table(&self.table).await?;
        Ok(affected)
    }

    pub async fn delete(&self) -> Result<u64> {
        let sql = self.query.delete()?;
        let affected = self.execute(&sql).await?;
        self.cache.delete_by_table(&self.table).await?;
        Ok(affected)
    }

    pub fn cache(&self) -> Result<AsyncCacheQueryHandle> {
        if !self.cache.is_enabled() {
            return Err(Error::CacheDisabled);
        }
        Ok(AsyncCacheQueryHandle {
            cache: Arc::clone(&self.cache),
            sql: self.query.get()?,
        })
    }

    pub async fn delete_cache_query(&self) -> Result<()> {
        self.cache.delete(&self.query.get()?).await
    }

    pub async fn delete_cache_table(&self) -> Result<()> {
        self.cache.delete_by_table(&self.table).await
    }

    async fn fetch(&self, sql: &str) -> Result<Vec<Vec<Value>>> {
        let mut cursor = self.db.connect().await?;
        cursor.execute(sql).await?;
        cursor.fetchall().await
    }

    async fn execute(&self, sql: &str) -> Result<u64> {
        let mut cursor = self.db.connect().await?;
        cursor.execute(sql).await
    }
}

impl From<AsyncQueryTable> for Query {
    fn from(table: AsyncQueryTable) -> Query {
        table.query
    }
}

/// Operations over one cache entry (cooperative surface)
pub struct AsyncCacheQueryHandle {
    cache: Arc<dyn AsyncCache>,
    sql: String,
}

impl AsyncCacheQueryHandle {
    pub async fn get(&self) -> Result<Vec<Row>> {
        Ok(self.cache.get(&self.sql).await?.unwrap_or_default())
    }

    pub fn filter(&self, predicate: Row) -> AsyncCacheFilter {
        AsyncCacheFilter {
            cache: Arc::clone(&self.cache),
            sql: self.sql.clone(),
            predicate,
        }
    }

    pub async fn insert(&self, row: Row) -> Result<()> {
        self.cache.insert_row(&self.sql, row).await
    }

    pub async fn delete_query(&self) -> Result<()> {
        self.cache.delete(&self.sql).await
    }
}

/// A predicate-scoped view into one cache entry (cooperative surface)
pub struct AsyncCacheFilter {
    cache: Arc<dyn AsyncCache>,
    sql: String,
    predicate: Row,
}

impl AsyncCacheFilter {
    pub async fn get(&self) -> Result<Vec<Row>> {
        self.cache.filter_rows(&self.sql, &self.predicate).await
    }

    pub async fn update(&self, assigns: Row) -> Result<usize> {
        self.cache
            .update_rows(&self.sql, &self.predicate, &assigns)
            .await
    }

    pub async fn delete(&self) -> Result<usize> {
        self.cache.delete_rows(&self.sql, &self.predicate).await
    }
}
