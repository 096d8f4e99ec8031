//! Row representation and the pure in-entry row operations.
//!
//! A row is an ordered map from qualified key (`<alias>.<column>`) to value;
//! key order always equals the owning query's `map_fields` order. The
//! functions here operate on plain row lists and carry no locking or I/O, so
//! both cache implementations (and both surfaces) share them unchanged.

use crate::error::{Error, Result};
use crate::value::Value;
use indexmap::IndexMap;

/// One result row: qualified column key to value, insertion-ordered
pub type Row = IndexMap<String, Value>;

/// Build a row from `(key, value)` pairs, preserving order.
///
/// Pairs come from [`crate::query::assign`]:
/// `row([assign("person.id", 2), assign("person.name", "Anton")])`.
pub fn row<I>(pairs: I) -> Row
where
    I: IntoIterator<Item = (String, Value)>,
{
    pairs.into_iter().collect()
}

/// Zip backend tuples with the qualified field list into rows.
///
/// Every tuple must have exactly one value per field.
pub fn rows_from_tuples(fields: &[String], tuples: Vec<Vec<Value>>) -> Result<Vec<Row>> {
    let mut rows = Vec::with_capacity(tuples.len());
    for tuple in tuples {
        if tuple.len() != fields.len() {
            return Err(Error::Backend(format!(
                "backend returned {} columns, query maps {}",
                tuple.len(),
                fields.len()
            )));
        }
        rows.push(fields.iter().cloned().zip(tuple).collect());
    }
    Ok(rows)
}

/// True when every key of `predicate` is present in `row` with an equal value
pub fn row_matches(row: &Row, predicate: &Row) -> bool {
    predicate
        .iter()
        .all(|(key, value)| row.get(key) == Some(value))
}

/// Linear scan returning clones of the rows matching the predicate map
pub fn filter_rows(rows: &[Row], predicate: &Row) -> Vec<Row> {
    rows.iter()
        .filter(|row| row_matches(row, predicate))
        .cloned()
        .collect()
}

/// Apply assignments to every matching row; returns the number touched
pub fn update_rows(rows: &mut [Row], predicate: &Row, assigns: &Row) -> usize {
    let mut touched = 0;
    for row in rows.iter_mut() {
        if row_matches(row, predicate) {
            for (key, value) in assigns {
                row.insert(key.clone(), value.clone());
            }
            touched += 1;
        }
    }
    touched
}

/// Remove every matching row; returns the number removed
pub fn delete_rows(rows: &mut Vec<Row>, predicate: &Row) -> usize {
    let before = rows.len();
    rows.retain(|row| !row_matches(row, predicate));
    before - rows.len()
}

/// Enforce that `row` carries exactly the declared qualified-field set
pub fn check_insert_fields(declared: &[String], row: &Row) -> Result<()> {
    if row.len() == declared.len() && declared.iter().all(|field| row.contains_key(field)) {
        Ok(())
    } else {
        let got: Vec<&String> = row.keys().collect();
        Err(Error::FieldMismatch(format!(
            "expected fields {declared:?}, got {got:?}"
        )))
    }
}

/// Enforce that every assignment key is one of the declared fields
pub fn check_assign_fields(declared: &[String], assigns: &Row) -> Result<()> {
    for key in assigns.keys() {
        if !declared.iter().any(|field| field == key) {
            return Err(Error::FieldMismatch(format!(
                "assignment key {key} is not among the entry fields"
            )));
        }
    }
    Ok(())
}
