//! Threaded behavior of the in-process cache: shared readers, exclusive
//! writers, writer-then-reader visibility.

use query_tables::cache::CacheQuery;
use query_tables::{assign, row, Cache, Row};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;

fn person_rows(ids: &[i64]) -> Vec<Row> {
    ids.iter()
        .map(|i| {
            row([
                assign("person.id", *i),
                assign("person.name", format!("Anton {i}")),
            ])
        })
        .collect()
}

fn person_fields() -> Vec<String> {
    vec!["person.id".to_string(), "person.name".to_string()]
}

fn person_tables() -> BTreeSet<String> {
    BTreeSet::from(["person".to_string()])
}

#[test]
fn test_concurrent_readers_and_invalidation() {
    let cache = Arc::new(CacheQuery::with_ttl(300));
    cache
        .set("q1", person_rows(&[1]), person_fields(), person_tables())
        .unwrap();
    cache
        .set("q2", person_rows(&[1, 2]), person_fields(), person_tables())
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let cache = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            for _ in 0..500 {
                // reads either see the full entry or a clean miss, never a
                // half-deleted one
                if let Some(rows) = cache.get("q2").unwrap() {
                    assert_eq!(rows.len(), 2);
                }
            }
        }));
    }
    for _ in 0..2 {
        let cache = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            for _ in 0..100 {
                cache.delete_by_table("person").unwrap();
                cache
                    .set("q2", person_rows(&[1, 2]), person_fields(), person_tables())
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_writer_visible_to_later_reader() {
    let cache = Arc::new(CacheQuery::with_ttl(300));
    let writer = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || {
            cache
                .set("q1", person_rows(&[7]), person_fields(), person_tables())
                .unwrap();
        })
    };
    writer.join().unwrap();

    // the writer returned before this read began, so its effect is visible
    let rows = cache.get("q1").unwrap().unwrap();
    assert_eq!(rows[0]["person.id"], query_tables::Value::Integer(7));
}

#[test]
fn test_last_writer_wins_on_same_key() {
    let cache = Arc::new(CacheQuery::with_ttl(300));
    let mut handles = Vec::new();
    for i in 0..8i64 {
        let cache = Arc::clone(&cache);
        handles.push(thread::spawn(move || {
            cache
                .set("q1", person_rows(&[i]), person_fields(), person_tables())
                .unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    // some writer's complete value is in place
    let rows = cache.get("q1").unwrap().unwrap();
    assert_eq!(rows.len(), 1);
}
