// Test helpers: a seeded temporary SQLite database shared by the
// integration suites.

use std::path::{Path, PathBuf};

/// Tables and rows every suite runs against
const SEED_SQL: &str = "
    CREATE TABLE address (
        id INTEGER PRIMARY KEY,
        street TEXT NOT NULL,
        building INTEGER NOT NULL
    );
    CREATE TABLE person (
        id INTEGER PRIMARY KEY,
        login TEXT NOT NULL,
        name TEXT NOT NULL,
        ref_address INTEGER NOT NULL,
        age INTEGER NOT NULL
    );
    CREATE TABLE company (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        ref_address INTEGER NOT NULL,
        registration TEXT NOT NULL
    );
    CREATE TABLE employees (
        id INTEGER PRIMARY KEY,
        ref_person INTEGER NOT NULL,
        ref_company INTEGER NOT NULL,
        hired TEXT NOT NULL,
        dismissed TEXT
    );

    INSERT INTO address (id, street, building) VALUES
        (1, 'Pushkina', 10),
        (2, 'Naumova', 33),
        (3, 'Grinvich', 12),
        (4, 'Primorskaya', 8),
        (5, 'Baker', 11);
    INSERT INTO person (id, login, name, ref_address, age) VALUES
        (1, 'bdfy', 'Anton 1', 1, 31),
        (2, 'fty4', 'Anton 2', 2, 30),
        (3, 'kjg8', 'Anton 3', 3, 22),
        (4, 'sd3f', 'Anton 4', 4, 35);
    INSERT INTO company (id, name, ref_address, registration) VALUES
        (1, 'SD', 5, '2020-01-03'),
        (2, 'Hex', 4, '2020-01-05'),
        (3, 'Mega', 3, '2021-03-15');
    INSERT INTO employees (id, ref_person, ref_company, hired, dismissed) VALUES
        (1, 1, 1, '2019-11-01', NULL),
        (2, 2, 1, '2020-02-10', NULL),
        (3, 3, 2, '2020-03-01', NULL);
";

/// Create and seed a fresh database under the given directory
#[allow(dead_code)]
pub fn seed_db(dir: &Path, file_name: &str) -> PathBuf {
    let db_path = dir.join(file_name);
    let conn = rusqlite::Connection::open(&db_path).expect("Failed to create test db");
    conn.execute_batch(SEED_SQL).expect("Failed to seed test db");
    db_path
}

/// Run a test function against a freshly seeded temporary database
#[allow(dead_code)]
pub fn with_seeded_db<F>(test_name: &str, test_fn: F)
where
    F: FnOnce(&Path),
{
    println!("Running {test_name}");
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let db_path = seed_db(dir.path(), "test.db");
    test_fn(&db_path);
}
