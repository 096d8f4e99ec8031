//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use query_tables::{
//!     assign, Direction, Join, Predicate, QueryOptions, SqliteQuery, Tables, TablesConfig,
//! };
//!
//! # fn main() -> query_tables::Result<()> {
//!     let db = Arc::new(SqliteQuery::new("/var/lib/app/data.db"));
//!     let tables = Tables::with_config(
//!         db,
//!         TablesConfig {
//!             cache_ttl: 300,
//!             ..Default::default()
//!         },
//!     )?;
//!
//!     // Fluent SELECT with a join; the result is cached under its SQL and
//!     // indexed by the tables it touches.
//!     let rows = tables
//!         .table("person")?
//!         .filter([Predicate::between("age", 25, 31)])
//!         .join(Join::inner(tables.table("address")?, "id", "ref_address"))
//!         .order_by("id", Direction::Asc)
//!         .get()?;
//!     for row in &rows {
//!         println!("{:?} lives on {:?}", row["person.name"], row["address.street"]);
//!     }
//!
//!     // Any write through the façade drops every cached entry that used the
//!     // table, so the next read re-executes.
//!     tables
//!         .table("person")?
//!         .filter([Predicate::eq("id", 4)])
//!         .update([assign("age", 34)])?;
//!
//!     // Ad-hoc SQL with manual cache opt-in.
//!     let data = tables.query(
//!         "select count(*) from person",
//!         QueryOptions { cache: true, ..Default::default() },
//!     )?;
//!     println!("{data:?}");
//!     # Ok(())
//! # }
//! ```

pub mod cache;
pub mod db;
mod error;
mod query;
mod query_table;
mod rows;
mod schema;
mod tables;
mod value;

pub use cache::{AsyncCache, Cache, CacheKind, CacheQuery};
pub use db::{
    AsyncDbCursor, AsyncDbQuery, AsyncPostgresQuery, AsyncSqliteQuery, DbConfigPg, DbCursor,
    DbQuery, DbType, PostgresQuery, SqliteQuery,
};
pub use error::{Error, Result};
pub use query::{assign, Direction, FilterValue, Join, JoinKind, Op, Predicate, Query};
pub use query_table::{
    AsyncCacheFilter, AsyncCacheQueryHandle, AsyncQueryTable, CacheFilter, CacheQueryHandle,
    QueryTable,
};
pub use rows::{row, Row};
pub use schema::TableStruct;
pub use tables::{QueryOptions, Tables, TablesAsync, TablesConfig};
pub use value::Value;
