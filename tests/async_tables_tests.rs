//! Registry and façade over a seeded SQLite database (cooperative surface).

#[allow(clippy::duplicate_mod)]
mod test_helpers {
    include!("common/test_helpers.rs");
}

use query_tables::{
    assign, row, AsyncSqliteQuery, Direction, Error, Join, Predicate, QueryOptions, TablesAsync,
    TablesConfig, Value,
};
use std::path::Path;
use std::sync::Arc;

async fn tables_with(db_path: &Path, config: TablesConfig) -> TablesAsync {
    let db = Arc::new(AsyncSqliteQuery::new(db_path));
    TablesAsync::with_config(db, config).await.unwrap()
}

fn eternal_config() -> TablesConfig {
    TablesConfig {
        non_expired: true,
        ..Default::default()
    }
}

fn text(s: &str) -> Value {
    Value::Text(s.to_string())
}

async fn common_battery(tables: &TablesAsync) {
    let rows = tables
        .table("person")
        .unwrap()
        .filter([Predicate::eq("id", 2)])
        .get()
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["person.name"], text("Anton 2"));

    let rows = tables
        .table("person")
        .unwrap()
        .filter([Predicate::like("name", "%4")])
        .get()
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["person.name"], text("Anton 4"));

    let rows = tables
        .table("person")
        .unwrap()
        .filter([Predicate::between("age", 30, 31)])
        .order_by("id", Direction::Asc)
        .get()
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["person.id"], Value::Integer(1));

    let rows = tables
        .table("person")
        .unwrap()
        .join(Join::inner(
            tables.table("address").unwrap(),
            "id",
            "ref_address",
        ))
        .filter([Predicate::between("age", 25, 31)])
        .get()
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].len(), 8);

    let rows = tables
        .table("person")
        .unwrap()
        .filter([Predicate::eq("id", 4)])
        .join(Join::left(
            tables.table("employees").unwrap(),
            "ref_person",
            "id",
        ))
        .get()
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["employees.id"], Value::Null);
}

#[tokio::test]
async fn test_async_structure_loading() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = test_helpers::seed_db(dir.path(), "test.db");
    let tables = tables_with(&db_path, TablesConfig::default()).await;
    assert_eq!(tables.tables_struct().len(), 4);
    assert_eq!(
        tables.tables_struct()["person"],
        ["id", "login", "name", "ref_address", "age"]
    );
    assert!(matches!(tables.table("nothing"), Err(Error::NotTable(_))));
}

#[tokio::test]
async fn test_async_queries_without_cache() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = test_helpers::seed_db(dir.path(), "test.db");
    let tables = tables_with(&db_path, TablesConfig::default()).await;
    assert!(matches!(
        tables.table("person").unwrap().cache(),
        Err(Error::CacheDisabled)
    ));
    common_battery(&tables).await;
}

#[tokio::test]
async fn test_async_queries_with_cache() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = test_helpers::seed_db(dir.path(), "test.db");
    let tables = tables_with(&db_path, eternal_config()).await;
    common_battery(&tables).await;
    common_battery(&tables).await;
}

#[tokio::test]
async fn test_async_cache_handle_operations() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = test_helpers::seed_db(dir.path(), "test.db");
    let tables = tables_with(&db_path, eternal_config()).await;

    let query = tables
        .table("person")
        .unwrap()
        .join(Join::inner(
            tables.table("address").unwrap(),
            "id",
            "ref_address",
        ))
        .filter([
            Predicate::between("age", 30, 33),
            Predicate::like("name", "Anton%"),
        ])
        .order_by("id", Direction::Desc);
    query.get().await.unwrap();

    let cache = query.cache().unwrap();
    assert_eq!(cache.get().await.unwrap().len(), 2);

    let hit = cache
        .filter(row([assign("person.id", 1)]))
        .get()
        .await
        .unwrap();
    assert_eq!(hit.len(), 1);

    cache
        .filter(row([assign("person.id", 1)]))
        .update(row([assign("person.name", "Tony 1")]))
        .await
        .unwrap();
    let rows = cache.get().await.unwrap();
    assert_eq!(rows.last().unwrap()["person.name"], text("Tony 1"));

    assert!(matches!(
        cache.insert(row([assign("person.id", 7)])).await,
        Err(Error::FieldMismatch(_))
    ));

    cache
        .filter(row([assign("person.id", 1)]))
        .delete()
        .await
        .unwrap();
    assert_eq!(cache.get().await.unwrap().len(), 1);

    cache.delete_query().await.unwrap();
    assert!(cache.get().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_async_invalidation() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = test_helpers::seed_db(dir.path(), "test.db");
    let tables = tables_with(&db_path, eternal_config()).await;

    let query1 = tables
        .table("person")
        .unwrap()
        .join(Join::inner(
            tables.table("address").unwrap(),
            "id",
            "ref_address",
        ))
        .filter([Predicate::between("age", 30, 33)]);
    let query3 = tables
        .table("person")
        .unwrap()
        .filter([Predicate::eq("id", 3)])
        .join(Join::left(
            tables.table("employees").unwrap(),
            "ref_person",
            "id",
        ));

    query1.get().await.unwrap();
    query3.get().await.unwrap();
    assert!(!query1.cache().unwrap().get().await.unwrap().is_empty());
    assert!(!query3.cache().unwrap().get().await.unwrap().is_empty());

    let affected = tables
        .table("address")
        .unwrap()
        .insert(vec![vec![assign("street", "123"), assign("building", 777)]])
        .await
        .unwrap();
    assert_eq!(affected, 1);

    assert!(query1.cache().unwrap().get().await.unwrap().is_empty());
    assert!(!query3.cache().unwrap().get().await.unwrap().is_empty());

    // a re-read repopulates
    assert!(!query1.get().await.unwrap().is_empty());
    assert!(!query1.cache().unwrap().get().await.unwrap().is_empty());

    tables.clear_cache().await.unwrap();
}

#[tokio::test]
async fn test_async_adhoc_query() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = test_helpers::seed_db(dir.path(), "test.db");
    let tables = tables_with(&db_path, eternal_config()).await;

    let sql = "select id, name from person";
    let cached = QueryOptions {
        cache: true,
        ..Default::default()
    };
    assert_eq!(tables.query(sql, cached).await.unwrap().len(), 4);

    tables
        .query("delete from person where id = 4", QueryOptions::default())
        .await
        .unwrap();

    // the ad-hoc entry survives the write, its key is opaque
    assert_eq!(tables.query(sql, cached).await.unwrap().len(), 4);
    let refreshed = tables
        .query(
            sql,
            QueryOptions {
                cache: true,
                delete_cache: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(refreshed.len(), 3);
}
