//! Emitted SQL executed against a real SQLite database.

#[allow(clippy::duplicate_mod)]
mod test_helpers {
    include!("common/test_helpers.rs");
}
use test_helpers::with_seeded_db;

use query_tables::{assign, Direction, Error, Join, Predicate, Query, Value};
use rusqlite::Connection;

fn person() -> Query {
    Query::new("person", ["id", "login", "name", "ref_address", "age"])
}

fn address() -> Query {
    Query::new("address", ["id", "street", "building"])
}

fn company() -> Query {
    Query::new("company", ["id", "name", "ref_address", "registration"])
}

fn employees() -> Query {
    Query::new(
        "employees",
        ["id", "ref_person", "ref_company", "hired", "dismissed"],
    )
}

fn fetch_rows(conn: &Connection, sql: &str) -> Vec<Vec<rusqlite::types::Value>> {
    let mut stmt = conn.prepare(sql).unwrap();
    let column_count = stmt.column_count();
    let rows = stmt
        .query_map([], |row| {
            (0..column_count)
                .map(|i| row.get::<_, rusqlite::types::Value>(i))
                .collect()
        })
        .unwrap();
    rows.map(|r| r.unwrap()).collect()
}

#[test]
fn test_injection_attempts_stay_literals() {
    with_seeded_db("test_injection_attempts_stay_literals", |db_path| {
        let conn = Connection::open(db_path).unwrap();

        // single-quote payload is doubled, so it only matches a weird name
        let sql = person()
            .filter([Predicate::eq("name", "1'; DROP TABLE users; --")])
            .get()
            .unwrap();
        assert_eq!(fetch_rows(&conn, &sql).len(), 0);

        // double quotes are fine inside a single-quoted literal
        let sql = person()
            .filter([Predicate::eq("name", "1\"; DROP TABLE users; --")])
            .get()
            .unwrap();
        assert_eq!(fetch_rows(&conn, &sql).len(), 0);

        // raw byte payloads never reach SQL at all
        let err = person()
            .filter([Predicate::eq("id", Value::Bytes(b"27204f5231".to_vec()))])
            .get()
            .unwrap_err();
        assert!(matches!(err, Error::ValueConversion(_)));

        // the seeded data is untouched
        assert_eq!(fetch_rows(&conn, &person().get().unwrap()).len(), 4);
    });
}

#[test]
fn test_select_filters() {
    with_seeded_db("test_select_filters", |db_path| {
        let conn = Connection::open(db_path).unwrap();

        let sql = person().filter([Predicate::eq("id", 2)]).get().unwrap();
        assert_eq!(fetch_rows(&conn, &sql).len(), 1);

        let sql = person()
            .filter([Predicate::between("age", 25, 31)])
            .get()
            .unwrap();
        assert_eq!(fetch_rows(&conn, &sql).len(), 2);

        let sql = company()
            .filter([Predicate::between("registration", "2021-02-20", "2021-04-20")])
            .get()
            .unwrap();
        assert_eq!(fetch_rows(&conn, &sql).len(), 1);

        let sql = person()
            .filter([Predicate::like("name", "%4")])
            .get()
            .unwrap();
        assert_eq!(fetch_rows(&conn, &sql).len(), 1);
    });
}

#[test]
fn test_join_row_width() {
    with_seeded_db("test_join_row_width", |db_path| {
        let conn = Connection::open(db_path).unwrap();

        let sql = person()
            .filter([Predicate::between("age", 25, 31)])
            .join(Join::inner(address(), "id", "ref_address"))
            .get()
            .unwrap();
        let rows = fetch_rows(&conn, &sql);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 8);
    });
}

#[test]
fn test_nested_joins_with_alias() {
    with_seeded_db("test_nested_joins_with_alias", |db_path| {
        let conn = Connection::open(db_path).unwrap();

        let query = person()
            .filter([Predicate::eq("id", 2)])
            .join(Join::inner(address(), "id", "ref_address"))
            .join(Join::left(
                employees()
                    .select(["id", "ref_person", "ref_company", "hired"])
                    .join(Join::inner(
                        company()
                            .join(
                                Join::inner(address(), "id", "ref_address")
                                    .alias("company_addr"),
                            )
                            .filter([Predicate::between(
                                "registration",
                                "2020-01-02",
                                "2020-01-06",
                            )]),
                        "id",
                        "ref_company",
                    )),
                "ref_person",
                "id",
            ))
            .select(["id", "name", "age"])
            .order_by("age", Direction::Desc);

        let rows = fetch_rows(&conn, &query.get().unwrap());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 17);
        assert_eq!(query.map_fields().len(), 17);
    });
}

#[test]
fn test_left_join_keeps_unmatched_root() {
    with_seeded_db("test_left_join_keeps_unmatched_root", |db_path| {
        let conn = Connection::open(db_path).unwrap();

        // person 4 has no employees row
        let sql = person()
            .filter([Predicate::eq("id", 4)])
            .join(Join::inner(employees(), "ref_person", "id"))
            .get()
            .unwrap();
        assert_eq!(fetch_rows(&conn, &sql).len(), 0);

        let sql = person()
            .filter([Predicate::eq("id", 4)])
            .join(Join::left(employees(), "ref_person", "id"))
            .get()
            .unwrap();
        let rows = fetch_rows(&conn, &sql);
        assert_eq!(rows.len(), 1);
        // LEFT JOIN produces NULLs, not absent columns
        assert_eq!(rows[0].len(), 10);
        assert_eq!(rows[0][5], rusqlite::types::Value::Null);
    });
}

#[test]
fn test_write_statements() {
    with_seeded_db("test_write_statements", |db_path| {
        let conn = Connection::open(db_path).unwrap();

        let sql = person()
            .filter([Predicate::eq("id", 4)])
            .update([assign("age", 34), assign("name", "Tony 4")])
            .unwrap();
        assert_eq!(conn.execute(&sql, []).unwrap(), 1);

        let sql = person()
            .insert(vec![vec![
                assign("login", "fer0"),
                assign("name", "Anton 5"),
                assign("age", 36),
                assign("ref_address", 1),
            ]])
            .unwrap();
        assert_eq!(conn.execute(&sql, []).unwrap(), 1);
        assert_eq!(conn.last_insert_rowid(), 5);

        let sql = person()
            .insert(vec![
                vec![
                    assign("login", "qlr1"),
                    assign("name", "Anton 6"),
                    assign("age", 37),
                    assign("ref_address", 2),
                ],
                vec![
                    assign("login", "qlr2"),
                    assign("name", "Anton 7"),
                    assign("age", 38),
                    assign("ref_address", 3),
                ],
            ])
            .unwrap();
        assert_eq!(conn.execute(&sql, []).unwrap(), 2);

        let sql = person().filter([Predicate::eq("id", 6)]).delete().unwrap();
        assert_eq!(conn.execute(&sql, []).unwrap(), 1);

        let rows = fetch_rows(&conn, &person().get().unwrap());
        assert_eq!(rows.len(), 6);
    });
}
