//! PostgreSQL backend tests.
//!
//! These run only when explicitly enabled against a live server:
//! `QUERY_TABLES_PG_IT=1 cargo test` (connection via `QUERY_TABLES_PG_HOST`,
//! `QUERY_TABLES_PG_DB`, `QUERY_TABLES_PG_USER`, `QUERY_TABLES_PG_PASSWORD`).

use query_tables::{
    assign, AsyncPostgresQuery, DbConfigPg, DbQuery, Direction, Join, Predicate, PostgresQuery,
    QueryOptions, Tables, TablesAsync, TablesConfig, Value,
};
use std::env;
use std::sync::Arc;

fn pg_config() -> Option<DbConfigPg> {
    if env::var("QUERY_TABLES_PG_IT").unwrap_or_default() != "1" {
        return None;
    }
    Some(DbConfigPg {
        host: env::var("QUERY_TABLES_PG_HOST").unwrap_or_else(|_| "localhost".to_string()),
        dbname: env::var("QUERY_TABLES_PG_DB").unwrap_or_else(|_| "query_tables".to_string()),
        user: env::var("QUERY_TABLES_PG_USER").unwrap_or_else(|_| "postgres".to_string()),
        password: env::var("QUERY_TABLES_PG_PASSWORD").unwrap_or_else(|_| "postgres".to_string()),
        ..Default::default()
    })
}

const SETUP_SQL: &[&str] = &[
    "drop table if exists qt_person",
    "drop table if exists qt_address",
    "create table qt_address (
        id serial primary key,
        street varchar(255) not null,
        building integer not null
    )",
    "create table qt_person (
        id serial primary key,
        name varchar(255) not null,
        ref_address integer not null,
        age integer not null,
        registered date not null
    )",
    "insert into qt_address (id, street, building) values
        (1, 'Pushkina', 10), (2, 'Naumova', 33), (3, 'Grinvich', 12)",
    "insert into qt_person (id, name, ref_address, age, registered) values
        (1, 'Anton 1', 1, 31, '2020-01-03'),
        (2, 'Anton 2', 2, 30, '2020-01-05'),
        (3, 'Anton 3', 3, 22, '2021-03-15')",
];

fn setup(db: &dyn DbQuery) {
    let mut cursor = db.connect().unwrap();
    for sql in SETUP_SQL {
        cursor.execute(sql).unwrap();
    }
}

#[test]
fn test_pg_backend_and_registry() {
    let Some(config) = pg_config() else {
        return;
    };
    let db = Arc::new(PostgresQuery::new(config));
    setup(db.as_ref());

    let tables = Tables::with_config(
        Arc::clone(&db) as Arc<dyn DbQuery>,
        TablesConfig {
            prefix_table: "qt_".to_string(),
            non_expired: true,
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(tables.tables_struct().len(), 2);
    assert_eq!(
        tables.tables_struct()["qt_person"],
        ["id", "name", "ref_address", "age", "registered"]
    );

    // typed decoding: integers, text and dates come back as values
    let rows = tables
        .table("qt_person")
        .unwrap()
        .filter([Predicate::eq("id", 2)])
        .get()
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["qt_person.name"], Value::Text("Anton 2".into()));
    assert_eq!(rows[0]["qt_person.age"], Value::Integer(30));
    assert!(matches!(rows[0]["qt_person.registered"], Value::Date(_)));

    let rows = tables
        .table("qt_person")
        .unwrap()
        .join(Join::inner(
            tables.table("qt_address").unwrap(),
            "id",
            "ref_address",
        ))
        .filter([Predicate::between("age", 25, 31)])
        .order_by("id", Direction::Asc)
        .get()
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].len(), 8);

    // write through the façade invalidates the joined entry
    let query = tables
        .table("qt_person")
        .unwrap()
        .join(Join::inner(
            tables.table("qt_address").unwrap(),
            "id",
            "ref_address",
        ))
        .filter([Predicate::eq("id", 1)]);
    query.get().unwrap();
    assert!(!query.cache().unwrap().get().unwrap().is_empty());
    tables
        .table("qt_address")
        .unwrap()
        .filter([Predicate::eq("id", 1)])
        .update([assign("building", 11)])
        .unwrap();
    assert!(query.cache().unwrap().get().unwrap().is_empty());

    let data = tables
        .query("select count(*) from qt_person", QueryOptions::default())
        .unwrap();
    assert_eq!(data[0][0], Value::Integer(3));
}

#[tokio::test]
async fn test_pg_async_backend_and_registry() {
    let Some(config) = pg_config() else {
        return;
    };
    {
        let db = PostgresQuery::new(config.clone());
        setup(&db);
    }
    let db = Arc::new(AsyncPostgresQuery::new(config));

    let tables = TablesAsync::with_config(
        db,
        TablesConfig {
            tables: Some(vec!["qt_person".to_string(), "qt_address".to_string()]),
            non_expired: true,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(tables.tables_struct().len(), 2);

    let rows = tables
        .table("qt_person")
        .unwrap()
        .filter([Predicate::between("registered", "2020-01-01", "2020-01-31")])
        .order_by("id", Direction::Asc)
        .get()
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["qt_person.name"], Value::Text("Anton 1".into()));

    let affected = tables
        .table("qt_person")
        .unwrap()
        .filter([Predicate::eq("id", 3)])
        .delete()
        .await
        .unwrap();
    assert_eq!(affected, 1);
    assert_eq!(tables.table("qt_person").unwrap().count().await.unwrap(), 2);
}
