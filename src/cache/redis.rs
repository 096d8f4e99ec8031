//! Out-of-process result cache over Redis.
//!
//! Key layout: `q:<sha256 of sql>` holds one serialized entry, `t:<table>` is
//! the reverse-index set of entry hashes, and `schema` is the table-structure
//! slot shared across process boots. Entry writes and their reverse-index
//! updates travel in one MULTI/EXEC pipeline.

use super::{AsyncCache, Cache, CacheEntry, CacheKind};
use crate::error::{Error, Result};
use crate::rows::{self, Row};
use crate::schema::TableStruct;
use crate::value::Value;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Commands};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

const QUERY_PREFIX: &str = "q:";
const TABLE_PREFIX: &str = "t:";
const SCHEMA_KEY: &str = "schema";

/// Connection options for the Redis caches
#[derive(Debug, Clone)]
pub struct RedisConnect {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
    pub ssl: bool,
}

impl Default for RedisConnect {
    fn default() -> Self {
        RedisConnect {
            host: "127.0.0.1".to_string(),
            port: 6379,
            db: 0,
            password: None,
            ssl: false,
        }
    }
}

impl RedisConnect {
    pub fn new() -> Self {
        Self::default()
    }

    fn url(&self) -> String {
        let scheme = if self.ssl { "rediss" } else { "redis" };
        match &self.password {
            Some(password) => format!(
                "{scheme}://:{password}@{}:{}/{}",
                self.host, self.port, self.db
            ),
            None => format!("{scheme}://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

fn sql_hash(sql: &str) -> String {
    hex::encode(Sha256::digest(sql.as_bytes()))
}

fn query_key(sql: &str) -> String {
    format!("{QUERY_PREFIX}{}", sql_hash(sql))
}

fn table_key(table: &str) -> String {
    format!("{TABLE_PREFIX}{table}")
}

fn encode(entry: &CacheEntry) -> Result<String> {
    Ok(serde_json::to_string(entry)?)
}

fn decode(payload: &str) -> Result<CacheEntry> {
    Ok(serde_json::from_str(payload)?)
}

/// Blocking Redis cache
pub struct RedisCache {
    client: redis::Client,
    ttl: Option<i64>,
}

impl RedisCache {
    /// Entries persist until invalidation
    pub fn new(connect: RedisConnect) -> Result<Self> {
        let client = redis::Client::open(connect.url().as_str())?;
        Ok(RedisCache { client, ttl: None })
    }

    /// Entries additionally expire after `ttl_secs`
    pub fn with_ttl(connect: RedisConnect, ttl_secs: i64) -> Result<Self> {
        let client = redis::Client::open(connect.url().as_str())?;
        Ok(RedisCache {
            client,
            ttl: Some(ttl_secs),
        })
    }

    fn connection(&self) -> Result<redis::Connection> {
        Ok(self.client.get_connection()?)
    }

    fn fetch_entry(&self, con: &mut redis::Connection, sql: &str) -> Result<Option<CacheEntry>> {
        let payload: Option<String> = con.get(query_key(sql))?;
        payload.as_deref().map(decode).transpose()
    }

    /// SET the entry, refreshing the TTL when one is configured
    fn write_entry(
        &self,
        pipe: &mut redis::Pipeline,
        key: &str,
        entry: &CacheEntry,
    ) -> Result<()> {
        pipe.set(key, encode(entry)?).ignore();
        if let Some(ttl) = self.ttl {
            pipe.expire(key, ttl).ignore();
        }
        Ok(())
    }

    fn store_back(&self, con: &mut redis::Connection, sql: &str, entry: &CacheEntry) -> Result<()> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        self.write_entry(&mut pipe, &query_key(sql), entry)?;
        pipe.query::<()>(con)?;
        Ok(())
    }

    /// Mutate the mapped entry under `sql` and write it back
    fn with_rows_mut<T>(
        &self,
        sql: &str,
        op: impl FnOnce(&mut Vec<Row>, &[String]) -> Result<T>,
    ) -> Result<Option<T>> {
        let mut con = self.connection()?;
        match self.fetch_entry(&mut con, sql)? {
            Some(CacheEntry::Rows {
                mut rows,
                fields,
                tables,
            }) => {
                let out = op(&mut rows, &fields)?;
                self.store_back(
                    &mut con,
                    sql,
                    &CacheEntry::Rows {
                        rows,
                        fields,
                        tables,
                    },
                )?;
                Ok(Some(out))
            }
            _ => Ok(None),
        }
    }
}

fn scan_keys(con: &mut redis::Connection, pattern: &str) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    let mut cursor: u64 = 0;
    loop {
        let (next, chunk): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(200)
            .query(con)?;
        keys.extend(chunk);
        cursor = next;
        if cursor == 0 {
            return Ok(keys);
        }
    }
}

impl Cache for RedisCache {
    fn kind(&self) -> CacheKind {
        CacheKind::Remote
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn get(&self, sql: &str) -> Result<Option<Vec<Row>>> {
        let mut con = self.connection()?;
        match self.fetch_entry(&mut con, sql)? {
            Some(CacheEntry::Rows { rows, .. }) => Ok(Some(rows)),
            _ => Ok(None),
        }
    }

    fn set(
        &self,
        sql: &str,
        rows: Vec<Row>,
        fields: Vec<String>,
        tables: BTreeSet<String>,
    ) -> Result<()> {
        let mut con = self.connection()?;
        let hash = sql_hash(sql);
        let entry = CacheEntry::Rows {
            rows,
            fields,
            tables,
        };
        let mut pipe = redis::pipe();
        pipe.atomic();
        self.write_entry(&mut pipe, &query_key(sql), &entry)?;
        if let CacheEntry::Rows { tables, .. } = &entry {
            for table in tables {
                pipe.sadd(table_key(table), &hash).ignore();
            }
        }
        pipe.query::<()>(&mut con)?;
        Ok(())
    }

    fn delete(&self, sql: &str) -> Result<()> {
        let mut con = self.connection()?;
        let key = query_key(sql);
        let hash = sql_hash(sql);
        let mut pipe = redis::pipe();
        pipe.atomic();
        if let Some(CacheEntry::Rows { tables, .. }) = self.fetch_entry(&mut con, sql)? {
            for table in &tables {
                pipe.srem(table_key(table), &hash).ignore();
            }
        }
        pipe.del(&key).ignore();
        pipe.query::<()>(&mut con)?;
        Ok(())
    }

    fn delete_by_table(&self, table: &str) -> Result<()> {
        let mut con = self.connection()?;
        let tkey = table_key(table);
        let hashes: Vec<String> = con.smembers(&tkey)?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for hash in &hashes {
            let qkey = format!("{QUERY_PREFIX}{hash}");
            let payload: Option<String> = con.get(&qkey)?;
            if let Some(payload) = payload {
                if let Ok(CacheEntry::Rows { tables, .. }) = decode(&payload) {
                    for other in tables.iter().filter(|t| t.as_str() != table) {
                        pipe.srem(table_key(other), hash).ignore();
                    }
                }
            }
            pipe.del(&qkey).ignore();
        }
        pipe.del(&tkey).ignore();
        pipe.query::<()>(&mut con)?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut con = self.connection()?;
        let mut keys = scan_keys(&mut con, &format!("{QUERY_PREFIX}*"))?;
        keys.extend(scan_keys(&mut con, &format!("{TABLE_PREFIX}*"))?);
        keys.push(SCHEMA_KEY.to_string());
        con.del::<_, ()>(keys)?;
        Ok(())
    }

    fn get_raw(&self, sql: &str) -> Result<Option<Vec<Vec<Value>>>> {
        let mut con = self.connection()?;
        match self.fetch_entry(&mut con, sql)? {
            Some(CacheEntry::Tuples { rows }) => Ok(Some(rows)),
            _ => Ok(None),
        }
    }

    fn set_raw(&self, sql: &str, rows: Vec<Vec<Value>>) -> Result<()> {
        let mut con = self.connection()?;
        self.store_back(&mut con, sql, &CacheEntry::Tuples { rows })
    }

    fn struct_tables(&self) -> Result<Option<TableStruct>> {
        let mut con = self.connection()?;
        let payload: Option<String> = con.get(SCHEMA_KEY)?;
        payload
            .as_deref()
            .map(|p| Ok(serde_json::from_str(p)?))
            .transpose()
    }

    fn set_struct_tables(&self, tables: &TableStruct) -> Result<()> {
        let mut con = self.connection()?;
        con.set::<_, _, ()>(SCHEMA_KEY, serde_json::to_string(tables)?)?;
        Ok(())
    }

    fn filter_rows(&self, sql: &str, predicate: &Row) -> Result<Vec<Row>> {
        let mut con = self.connection()?;
        match self.fetch_entry(&mut con, sql)? {
            Some(CacheEntry::Rows { rows, .. }) => Ok(rows::filter_rows(&rows, predicate)),
            _ => Ok(Vec::new()),
        }
    }

    fn update_rows(&self, sql: &str, predicate: &Row, assigns: &Row) -> Result<usize> {
        let touched = self.with_rows_mut(sql, |rows, fields| {
            rows::check_assign_fields(fields, assigns)?;
            Ok(rows::update_rows(rows, predicate, assigns))
        })?;
        Ok(touched.unwrap_or(0))
    }

    fn insert_row(&self, sql: &str, row: Row) -> Result<()> {
        self.with_rows_mut(sql, |rows, fields| {
            rows::check_insert_fields(fields, &row)?;
            rows.push(row);
            Ok(())
        })?
        .ok_or_else(|| Error::Cache(format!("no cache entry for query: {sql}")))
    }

    fn delete_rows(&self, sql: &str, predicate: &Row) -> Result<usize> {
        let removed = self.with_rows_mut(sql, |rows, _| Ok(rows::delete_rows(rows, predicate)))?;
        Ok(removed.unwrap_or(0))
    }
}

/// Cooperative Redis cache over one multiplexed connection
pub struct AsyncRedisCache {
    con: MultiplexedConnection,
    ttl: Option<i64>,
}

impl AsyncRedisCache {
    /// Entries persist until invalidation
    pub async fn new(connect: RedisConnect) -> Result<Self> {
        Self::connect(connect, None).await
    }

    /// Entries additionally expire after `ttl_secs`
    pub async fn with_ttl(connect: RedisConnect, ttl_secs: i64) -> Result<Self> {
        Self::connect(connect, Some(ttl_secs)).await
    }

    async fn connect(connect: RedisConnect, ttl: Option<i64>) -> Result<Self> {
        let client = redis::Client::open(connect.url().as_str())?;
        let con = client.get_multiplexed_async_connection().await?;
        Ok(AsyncRedisCache { con, ttl })
    }

    async fn fetch_entry(
        &self,
        con: &mut MultiplexedConnection,
        sql: &str,
    ) -> Result<Option<CacheEntry>> {
        let payload: Option<String> = con.get(query_key(sql)).await?;
        payload.as_deref().map(decode).transpose()
    }

    fn write_entry(
        &self,
        pipe: &mut redis::Pipeline,
        key: &str,
        entry: &CacheEntry,
    ) -> Result<()> {
        pipe.set(key, encode(entry)?).ignore();
        if let Some(ttl) = self.ttl {
            pipe.expire(key, ttl).ignore();
        }
        Ok(())
    }

    async fn store_back(
        &self,
        con: &mut MultiplexedConnection,
        sql: &str,
        entry: &CacheEntry,
    ) -> Result<()> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        self.write_entry(&mut pipe, &query_key(sql), entry)?;
        pipe.query_async::<()>(con).await?;
        Ok(())
    }
}

async fn scan_keys_async(con: &mut MultiplexedConnection, pattern: &str) -> Result<Vec<String>> {
    let mut keys = Vec::new();
    let mut cursor: u64 = 0;
    loop {
        let (next, chunk): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(200)
            .query_async(con)
            .await?;
        keys.extend(chunk);
        cursor = next;
        if cursor == 0 {
            return Ok(keys);
        }
    }
}

#[async_trait]
impl AsyncCache for AsyncRedisCache {
    fn kind(&self) -> CacheKind {
        CacheKind::Remote
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn get(&self, sql: &str) -> Result<Option<Vec<Row>>> {
        let mut con = self.con.clone();
        match self.fetch_entry(&mut con, sql).await? {
            Some(CacheEntry::Rows { rows, .. }) => Ok(Some(rows)),
            _ => Ok(None),
        }
    }

    async fn set(
        &self,
        sql: &str,
        rows: Vec<Row>,
        fields: Vec<String>,
        tables: BTreeSet<String>,
    ) -> Result<()> {
        let mut con = self.con.clone();
        let hash = sql_hash(sql);
        let mut pipe = redis::pipe();
        pipe.atomic();
        for table in &tables {
            pipe.sadd(table_key(table), &hash).ignore();
        }
        let entry = CacheEntry::Rows {
            rows,
            fields,
            tables,
        };
        self.write_entry(&mut pipe, &query_key(sql), &entry)?;
        pipe.query_async::<()>(&mut con).await?;
        Ok(())
    }

    async fn delete(&self, sql: &str) -> Result<()> {
        let mut con = self.con.clone();
        let key = query_key(sql);
        let hash = sql_hash(sql);
        let mut pipe = redis::pipe();
        pipe.atomic();
        if let Some(CacheEntry::Rows { tables, .. }) = self.fetch_entry(&mut con, sql).await? {
            for table in &tables {
                pipe.srem(table_key(table), &hash).ignore();
            }
        }
        pipe.del(&key).ignore();
        pipe.query_async::<()>(&mut con).await?;
        Ok(())
    }

    async fn delete_by_table(&self, table: &str) -> Result<()> {
        let mut con = self.con.clone();
        let tkey = table_key(table);
        let hashes: Vec<String> = con.smembers(&tkey).await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for hash in &hashes {
            let qkey = format!("{QUERY_PREFIX}{hash}");
            let payload: Option<String> = con.get(&qkey).await?;
            if let Some(payload) = payload {
                if let Ok(CacheEntry::Rows { tables, .. }) = decode(&payload) {
                    for other in tables.iter().filter(|t| t.as_str() != table) {
                        pipe.srem(table_key(other), hash).ignore();
                    }
                }
            }
            pipe.del(&qkey).ignore();
        }
        pipe.del(&tkey).ignore();
        pipe.query_async::<()>(&mut con).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut con = self.con.clone();
        let mut keys = scan_keys_async(&mut con, &format!("{QUERY_PREFIX}*")).await?;
        keys.extend(scan_keys_async(&mut con, &format!("{TABLE_PREFIX}*")).await?);
        keys.push(SCHEMA_KEY.to_string());
        con.del::<_, ()>(keys).await?;
        Ok(())
    }

    async fn get_raw(&self, sql: &str) -> Result<Option<Vec<Vec<Value>>>> {
        let mut con = self.con.clone();
        match self.fetch_entry(&mut con, sql).await? {
            Some(CacheEntry::Tuples { rows }) => Ok(Some(rows)),
            _ => Ok(None),
        }
    }

    async fn set_raw(&self, sql: &str, rows: Vec<Vec<Value>>) -> Result<()> {
        let mut con = self.con.clone();
        self.store_back(&mut con, sql, &CacheEntry::Tuples { rows })
            .await
    }

    async fn struct_tables(&self) -> Result<Option<TableStruct>> {
        let mut con = self.con.clone();
        let payload: Option<String> = con.get(SCHEMA_KEY).await?;
        payload
            .as_deref()
            .map(|p| Ok(serde_json::from_str(p)?))
            .transpose()
    }

    async fn set_struct_tables(&self, tables: &TableStruct) -> Result<()> {
        let mut con = self.con.clone();
        con.set::<_, _, ()>(SCHEMA_KEY, serde_json::to_string(tables)?)
            .await?;
        Ok(())
    }

    async fn filter_rows(&self, sql: &str, predicate: &Row) -> Result<Vec<Row>> {
        let mut con = self.con.clone();
        match self.fetch_entry(&mut con, sql).await? {
            Some(CacheEntry::Rows { rows, .. }) => Ok(rows::filter_rows(&rows, predicate)),
            _ => Ok(Vec::new()),
        }
    }

    async fn update_rows(&self, sql: &str, predicate: &Row, assigns: &Row) -> Result<usize> {
        let mut con = self.con.clone();
        match self.fetch_entry(&mut con, sql).await? {
            Some(CacheEntry::Rows {
                mut rows,
                fields,
                tables,
            }) => {
                rows::check_assign_fields(&fields, assigns)?;
                let touched = rows::update_rows(&mut rows, predicate, assigns);
                self.store_back(
                    &mut con,
                    sql,
                    &CacheEntry::Rows {
                        rows,
                        fields,
                        tables,
                    },
                )
                .await?;
                Ok(touched)
            }
            _ => Ok(0),
        }
    }

    async fn insert_row(&self, sql: &str, row: Row) -> Result<()> {
        let mut con = self.con.clone();
        match self.fetch_entry(&mut con, sql).await? {
            Some(CacheEntry::Rows {
                mut rows,
                fields,
                tables,
            }) => {
                rows::check_insert_fields(&fields, &row)?;
                rows.push(row);
                self.store_back(
                    &mut con,
                    sql,
                    &CacheEntry::Rows {
                        rows,
                        fields,
                        tables,
                    },
                )
                .await
            }
            _ => Err(Error::Cache(format!("no cache entry for query: {sql}"))),
        }
    }

    async fn delete_rows(&self, sql: &str, predicate: &Row) -> Result<usize> {
        let mut con = self.con.clone();
        match self.fetch_entry(&mut con, sql).await? {
            Some(CacheEntry::Rows {
                mut rows,
                fields,
                tables,
            }) => {
                let removed = rows::delete_rows(&mut rows, predicate);
                self.store_back(
                    &mut con,
                    sql,
                    &CacheEntry::Rows {
                        rows,
                        fields,
                        tables,
                    },
                )
                .await?;
                Ok(removed)
            }
            _ => Ok(0),
        }
    }
}
