//! In-process result cache
//!
//! Bounded map of entries plus the reverse index, both behind one `RwLock` so
//! reverse-index maintenance is atomic with entry writes. Readers share the
//! lock; recency is tracked through a per-entry atomic sequence number, so a
//! read never needs the write half. Eviction removes the least-recently-used
//! entry after sweeping out anything already expired.
//!
//! With TTL 0 and the eternal flag off the cache is disabled: reads miss,
//! writes are dropped, deletes succeed as no-ops.

use super::{AsyncCache, Cache, CacheEntry, CacheKind};
use crate::error::{Error, Result};
use crate::rows::{self, Row};
use crate::schema::TableStruct;
use crate::value::Value;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};

/// Default LRU capacity
pub const DEFAULT_CACHE_MAXSIZE: usize = 1024;

struct Stored {
    entry: CacheEntry,
    expires_at: Option<Instant>,
    last_access: AtomicU64,
}

impl Stored {
    fn expired(&self) -> bool {
        matches!(self.expires_at, Some(at) if Instant::now() >= at)
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Stored>,
    by_table: HashMap<String, HashSet<String>>,
    struct_tables: Option<TableStruct>,
}

/// In-process cache with TTL, LRU eviction and an eternal mode
pub struct CacheQuery {
    ttl: Duration,
    eternal: bool,
    maxsize: usize,
    access_seq: AtomicU64,
    inner: RwLock<Inner>,
}

impl CacheQuery {
    /// TTL in seconds; 0 without the eternal flag disables the cache.
    /// The eternal flag overrides any TTL.
    pub fn new(ttl_secs: u64, maxsize: usize, non_expired: bool) -> Self {
        CacheQuery {
            ttl: Duration::from_secs(ttl_secs),
            eternal: non_expired,
            maxsize: maxsize.max(1),
            access_seq: AtomicU64::new(0),
            inner: RwLock::new(Inner::default()),
        }
    }

    /// TTL-bounded cache with the default capacity
    pub fn with_ttl(ttl_secs: u64) -> Self {
        Self::new(ttl_secs, DEFAULT_CACHE_MAXSIZE, false)
    }

    /// Eternal cache: entries live until removal or eviction
    pub fn eternal() -> Self {
        Self::new(0, DEFAULT_CACHE_MAXSIZE, true)
    }

    fn next_seq(&self) -> u64 {
        self.access_seq.fetch_add(1, Ordering::Relaxed)
    }

    fn expires_at(&self) -> Option<Instant> {
        if self.eternal {
            None
        } else {
            Some(Instant::now() + self.ttl)
        }
    }

    /// Remove one entry and its reverse-index references; caller holds write
    fn remove_entry(inner: &mut Inner, sql: &str) {
        if let Some(stored) = inner.entries.remove(sql) {
            if let CacheEntry::Rows { tables, .. } = &stored.entry {
                for table in tables {
                    if let Some(keys) = inner.by_table.get_mut(table) {
                        keys.remove(sql);
                        if keys.is_empty() {
                            inner.by_table.remove(table);
                        }
                    }
                }
            }
        }
    }

    /// Sweep expired entries, then evict by lowest access sequence until the
    /// new key fits; caller holds write
    fn make_room(&self, inner: &mut Inner, incoming: &str) {
        let expired: Vec<String> = inner
            .entries
            .iter()
            .filter(|(_, stored)| stored.expired())
            .map(|(sql, _)| sql.clone())
            .collect();
        for sql in expired {
            Self::remove_entry(inner, &sql);
        }
        while inner.entries.len() >= self.maxsize && !inner.entries.contains_key(incoming) {
            let victim = inner
                .entries
                .iter()
                .min_by_key(|(_, stored)| stored.last_access.load(Ordering::Relaxed))
                .map(|(sql, _)| sql.clone());
            match victim {
                Some(sql) => Self::remove_entry(inner, &sql),
                None => break,
            }
        }
    }

    fn store(&self, sql: &str, entry: CacheEntry) {
        let mut inner = self.inner.write().unwrap();
        self.make_room(&mut inner, sql);
        if let CacheEntry::Rows { tables, .. } = &entry {
            for table in tables {
                inner
                    .by_table
                    .entry(table.clone())
                    .or_default()
                    .insert(sql.to_string());
            }
        }
        inner.entries.insert(
            sql.to_string(),
            Stored {
                entry,
                expires_at: self.expires_at(),
                last_access: AtomicU64::new(self.next_seq()),
            },
        );
    }

    /// Run a closure over the live mapped entry under the write lock
    fn with_rows_mut<T>(
        &self,
        sql: &str,
        op: impl FnOnce(&mut Vec<Row>, &[String]) -> Result<T>,
    ) -> Result<Option<T>> {
        let mut inner = self.inner.write().unwrap();
        let stored = match inner.entries.get_mut(sql) {
            Some(stored) if !stored.expired() => stored,
            _ => return Ok(None),
        };
        if let CacheEntry::Rows { rows, fields, .. } = &mut stored.entry {
            let fields = fields.clone();
            op(rows, &fields).map(Some)
        } else {
            Ok(None)
        }
    }

    fn check_enabled(&self) -> Result<()> {
        if Cache::is_enabled(self) {
            Ok(())
        } else {
            Err(Error::CacheDisabled)
        }
    }
}

impl Cache for CacheQuery {
    fn kind(&self) -> CacheKind {
        CacheKind::Local
    }

    fn is_enabled(&self) -> bool {
        self.eternal || !self.ttl.is_zero()
    }

    fn get(&self, sql: &str) -> Result<Option<Vec<Row>>> {
        if !Cache::is_enabled(self) {
            return Ok(None);
        }
        let inner = self.inner.read().unwrap();
        match inner.entries.get(sql) {
            Some(stored) if !stored.expired() => {
                stored.last_access.store(self.next_seq(), Ordering::Relaxed);
                match &stored.entry {
                    CacheEntry::Rows { rows, .. } => Ok(Some(rows.clone())),
                    CacheEntry::Tuples { .. } => Ok(None),
                }
            }
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
        if !Cache::is_enabled(self) {
            return Ok(());
        }
        self.store(
            sql,
            CacheEntry::Rows {
                rows,
                fields,
                tables,
            },
        );
        Ok(())
    }

    fn delete(&self, sql: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        Self::remove_entry(&mut inner, sql);
        Ok(())
    }

    fn delete_by_table(&self, table: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        if let Some(keys) = inner.by_table.remove(table) {
            for sql in keys {
                Self::remove_entry(&mut inner, &sql);
            }
        }
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner.entries.clear();
        inner.by_table.clear();
        inner.struct_tables = None;
        Ok(())
    }

    fn get_raw(&self, sql: &str) -> Result<Option<Vec<Vec<Value>>>> {
        if !Cache::is_enabled(self) {
            return Ok(None);
        }
        let inner = self.inner.read().unwrap();
        match inner.entries.get(sql) {
            Some(stored) if !stored.expired() => {
                stored.last_access.store(self.next_seq(), Ordering::Relaxed);
                match &stored.entry {
                    CacheEntry::Tuples { rows } => Ok(Some(rows.clone())),
                    CacheEntry::Rows { .. } => Ok(None),
                }
            }
            _ => Ok(None),
        }
    }

    fn set_raw(&self, sql: &str, rows: Vec<Vec<Value>>) -> Result<()> {
        if !Cache::is_enabled(self) {
            return Ok(());
        }
        self.store(sql, CacheEntry::Tuples { rows });
        Ok(())
    }

    fn struct_tables(&self) -> Result<Option<TableStruct>> {
        Ok(self.inner.read().unwrap().struct_tables.clone())
    }

    fn set_struct_tables(&self, tables: &TableStruct) -> Result<()> {
        self.inner.write().unwrap().struct_tables = Some(tables.clone());
        Ok(())
    }

    fn filter_rows(&self, sql: &str, predicate: &Row) -> Result<Vec<Row>> {
        self.check_enabled()?;
        let inner = self.inner.read().unwrap();
        match inner.entries.get(sql) {
            Some(stored) if !stored.expired() => match &stored.entry {
                CacheEntry::Rows { rows, .. } => Ok(rows::filter_rows(rows, predicate)),
                CacheEntry::Tuples { .. } => Ok(Vec::new()),
            },
            _ => Ok(Vec::new()),
        }
    }

    fn update_rows(&self, sql: &str, predicate: &Row, assigns: &Row) -> Result<usize> {
        self.check_enabled()?;
        let touched = self.with_rows_mut(sql, |rows, fields| {
            rows::check_assign_fields(fields, assigns)?;
            Ok(rows::update_rows(rows, predicate, assigns))
        })?;
        Ok(touched.unwrap_or(0))
    }

    fn insert_row(&self, sql: &str, row: Row) -> Result<()> {
        self.check_enabled()?;
        self.with_rows_mut(sql, |rows, fields| {
            rows::check_insert_fields(fields, &row)?;
            rows.push(row);
            Ok(())
        })?
        .ok_or_else(|| Error::Cache(format!("no cache entry for query: {sql}")))
    }

    fn delete_rows(&self, sql: &str, predicate: &Row) -> Result<usize> {
        self.check_enabled()?;
        let removed = self.with_rows_mut(sql, |rows, _| Ok(rows::delete_rows(rows, predicate)))?;
        Ok(removed.unwrap_or(0))
    }
}

/// The in-process cache never suspends, so the cooperative surface reuses the
/// blocking operations unchanged; no lock is held across an await.
#[async_trait]
impl AsyncCache for CacheQuery {
    fn kind(&self) -> CacheKind {
        Cache::kind(self)
    }

    fn is_enabled(&self) -> bool {
        Cache::is_enabled(self)
    }

    async fn get(&self, sql: &str) -> Result<Option<Vec<Row>>> {
        Cache::get(self, sql)
    }

    async fn set(
        &self,
        sql: &str,
        rows: Vec<Row>,
        fields: Vec<String>,
        tables: BTreeSet<String>,
    ) -> Result<()> {
        Cache::set(self, sql, rows, fields, tables)
    }

    async fn delete(&self, sql: &str) -> Result<()> {
        Cache::delete(self, sql)
    }

    async fn delete_by_table(&self, table: &str) -> Result<()> {
        Cache::delete_by_table(self, table)
    }

    async fn clear(&self) -> Result<()> {
        Cache::clear(self)
    }

    async fn get_raw(&self, sql: &str) -> Result<Option<Vec<Vec<Value>>>> {
        Cache::get_raw(self, sql)
    }

    async fn set_raw(&self, sql: &str, rows: Vec<Vec<Value>>) -> Result<()> {
        Cache::set_raw(self, sql, rows)
    }

    async fn struct_tables(&self) -> Result<Option<TableStruct>> {
        Cache::struct_tables(self)
    }

    async fn set_struct_tables(&self, tables: &TableStruct) -> Result<()> {
        Cache::set_struct_tables(self, tables)
    }

    async fn filter_rows(&self, sql: &str, predicate: &Row) -> Result<Vec<Row>> {
        Cache::filter_rows(self, sql, predicate)
    }

    async fn update_rows(&self, sql: &str, predicate: &Row, assigns: &Row) -> Result<usize> {
        Cache::update_rows(self, sql, predicate, assigns)
    }

    async fn insert_row(&self, sql: &str, row: Row) -> Result<()> {
        Cache::insert_row(self, sql, row)
    }

    async fn delete_rows(&self, sql: &str, predicate: &Row) -> Result<usize> {
        Cache::delete_rows(self, sql, predicate)
    }
}
