//! Tables registry
//!
//! Owns the backend handle, the cache and the loaded table structure, and
//! hands out transient [`QueryTable`] instances per table. Construction runs
//! schema discovery once; with a remote cache the structure is restored from
//! its schema slot instead, and written back after a fresh load.

use crate::cache::{AsyncCache, Cache, CacheKind, CacheQuery, DEFAULT_CACHE_MAXSIZE};
use crate::db::{AsyncDbQuery, DbQuery, DbType};
use crate::error::{Error, Result};
use crate::query_table::{AsyncQueryTable, QueryTable};
use crate::schema::{self, SchemaFilter, TableStruct};
use crate::value::Value;
use std::sync::Arc;

/// Registry options; defaults load every table of the `public` schema with
/// caching disabled
#[derive(Debug, Clone)]
pub struct TablesConfig {
    /// Load only tables whose name starts with this prefix (when non-empty)
    pub prefix_table: String,
    /// Explicit table list; ignored when `prefix_table` is set
    pub tables: Option<Vec<String>>,
    /// Logical schema name
    pub table_schema: String,
    /// Cache TTL in seconds; 0 with `non_expired` off disables caching
    pub cache_ttl: u64,
    /// Keep entries until explicit removal, overriding any TTL
    pub non_expired: bool,
    /// In-process cache capacity
    pub cache_maxsize: usize,
}

impl Default for TablesConfig {
    fn default() -> Self {
        TablesConfig {
            prefix_table: String::new(),
            tables: None,
            table_schema: "public".to_string(),
            cache_ttl: 0,
            non_expired: false,
            cache_maxsize: DEFAULT_CACHE_MAXSIZE,
        }
    }
}

impl TablesConfig {
    fn schema_filter(&self) -> SchemaFilter {
        SchemaFilter {
            prefix: self.prefix_table.clone(),
            tables: self.tables.clone(),
            table_schema: self.table_schema.clone(),
        }
    }
}

/// Options for the ad-hoc SQL path
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    /// Serve from and store into the cache, keyed by the SQL string itself
    pub cache: bool,
    /// Drop any existing entry for this SQL first
    pub delete_cache: bool,
}

/// Table registry, blocking surface
pub struct Tables {
    db: Arc<dyn DbQuery>,
    cache: Arc<dyn Cache>,
    tables_struct: TableStruct,
}

impl Tables {
    /// Registry with default options (cache disabled)
    pub fn new(db: Arc<dyn DbQuery>) -> Result<Self> {
        Self::with_config(db, TablesConfig::default())
    }

    /// Registry backed by the in-process cache configured per `config`
    pub fn with_config(db: Arc<dyn DbQuery>, config: TablesConfig) -> Result<Self> {
        let cache = Arc::new(CacheQuery::new(
            config.cache_ttl,
            config.cache_maxsize,
            config.non_expired,
        ));
        Self::with_cache(db, config, cache)
    }

    /// Registry over a caller-provided cache (e.g. Redis)
    pub fn with_cache(
        db: Arc<dyn DbQuery>,
        config: TablesConfig,
        cache: Arc<dyn Cache>,
    ) -> Result<Self> {
        let remote = cache.kind() == CacheKind::Remote;
        if remote {
            if let Some(tables_struct) = cache.struct_tables()? {
                log::debug!("restored table structure from the remote cache");
                return Ok(Tables {
                    db,
                    cache,
                    tables_struct,
                });
            }
        }
        let filter = config.schema_filter();
        let tables_struct = match db.get_type() {
            DbType::Postgres => schema::load_pg_struct(db.as_ref(), &filter)?,
            DbType::Sqlite => schema::load_sqlite_struct(db.as_ref(), &filter)?,
        };
        log::info!("loaded structure for {} tables", tables_struct.len());
        if remote {
            cache.set_struct_tables(&tables_struct)?;
        }
        Ok(Tables {
            db,
            cache,
            tables_struct,
        })
    }

    /// Fresh [`QueryTable`] over a loaded table
    pub fn table(&self, name: &str) -> Result<QueryTable> {
        let fields = self
            .tables_struct
            .get(name)
            .ok_or_else(|| Error::NotTable(name.to_string()))?;
        if fields.is_empty() {
            return Err(Error::QueryTable(
                name.to_string(),
                Box::new(Error::QueryBuild("table has no columns".to_string())),
            ));
        }
        Ok(QueryTable::new(
            Arc::clone(&self.db),
            Arc::clone(&self.cache),
            name,
            fields,
        ))
    }

    /// Execute an arbitrary SQL string.
    ///
    /// With `cache` on, the SQL string itself is the cache key; contributing
    /// tables are unknown, so such entries outlive table-scoped invalidation
    /// and only TTL, eviction, explicit delete or a global clear remove them.
    pub fn query(&self, sql: &str, options: QueryOptions) -> Result<Vec<Vec<Value>>> {
        if options.delete_cache {
            self.cache.delete(sql)?;
        }
        if options.cache {
            if let Some(rows) = self.cache.get_raw(sql)? {
                if !rows.is_empty() {
                    return Ok(rows);
                }
            }
        }
        let mut cursor = self.db.connect()?;
        cursor.execute(sql)?;
        let rows = cursor.fetchall()?;
        if options.cache {
            self.cache.set_raw(sql, rows.clone())?;
        }
        Ok(rows)
    }

    /// Purge the whole cache
    pub fn clear_cache(&self) -> Result<()> {
        self.cache.clear()
    }

    /// The loaded table structure
    pub fn tables_struct(&self) -> &TableStruct {
        &self.tables_struct
    }
}

/// Table registry, cooperative surface
pub struct TablesAsync {
    db: Arc<dyn AsyncDbQuery>,
    cache: Arc<dyn AsyncCache>,
    tables_struct: TableStruct,
}

impl TablesAsync {
    /// Registry with default options (cache disabled)
    pub async fn new(db: Arc<dyn AsyncDbQuery>) -> Result<Self> {
        Self::with_config(db, TablesConfig::default()).await
    }

    /// Registry backed by the in-process cache configured per `config`
    pub async fn with_config(db: Arc<dyn AsyncDbQuery>, config: TablesConfig) -> Result<Self> {
        let cache = Arc::new(CacheQuery::new(
            config.cache_ttl,
            config.cache_maxsize,
            config.non_expired,
        ));
        Self::with_cache(db, config, cache).await
    }

    /// Registry over a caller-provided cache (e.g. Redis)
    pub async fn with_cache(
        db: Arc<dyn AsyncDbQuery>,
        config: TablesConfig,
        cache: Arc<dyn AsyncCache>,
    ) -> Result<Self> {
        let remote = cache.kind() == CacheKind::Remote;
        if remote {
            if let Some(tables_struct) = cache.struct_tables().await? {
                log::debug!("restored table structure from the remote cache");
                return Ok(TablesAsync {
                    db,
                    cache,
                    tables_struct,
                });
            }
        }
        let filter = config.schema_filter();
        let tables_struct = match db.get_type() {
            DbType::Postgres => schema::load_pg_struct_async(db.as_ref(), &filter).await?,
            DbType::Sqlite => schema::load_sqlite_struct_async(db.as_ref(), &filter).await?,
        };
        log::info!("loaded structure for {} tables", tables_struct.len());
        if remote {
            cache.set_struct_tables(&tables_struct).await?;
        }
        Ok(TablesAsync {
            db,
            cache,
            tables_struct,
        })
    }

    /// Fresh [`AsyncQueryTable`] over a loaded table
    pub fn table(&self, name: &str) -> Result<AsyncQueryTable> {
        let fields = self
            .tables_struct
            .get(name)
            .ok_or_else(|| Error::NotTable(name.to_string()))?;
        if fields.is_empty() {
            return Err(Error::QueryTable(
                name.to_string(),
                Box::new(Error::QueryBuild("table has no columns".to_string())),
            ));
        }
        Ok(AsyncQueryTable::new(
            Arc::clone(&self.db),
            Arc::clone(&self.cache),
            name,
            fields,
        ))
    }

    /// Execute an arbitrary SQL string; see [`Tables::query`]
    pub async fn query(&self, sql: &str, options: QueryOptions) -> Result<Vec<Vec<Value>>> {
        if options.delete_cache {
            self.cache.delete(sql).await?;
        }
        if options.cache {
            if let Some(rows) = self.cache.get_raw(sql).await? {
                if !rows.is_empty() {
                    return Ok(rows);
                }
            }
        }
        let mut cursor = self.db.connect().await?;
        cursor.execute(sql).await?;
        let rows = cursor.fetchall().await?;
        if options.cache {
            self.cache.set_raw(sql, rows.clone()).await?;
        }
        Ok(rows)
    }

    /// Purge the whole cache
    pub async fn clear_cache(&self) -> Result<()> {
        self.cache.clear().await
    }

    /// The loaded table structure
    pub fn tables_struct(&self) -> &TableStruct {
        &self.tables_struct
    }
}
