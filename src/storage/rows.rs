//! Row-oriented persistence primitives
//!
//! [`RowStore`] is the narrow SQL surface the rest of the crate talks to:
//! insert, execute, fetch one row and fetch many rows, parameterized by SQL
//! text and positional arguments. Every column comes back as text and the
//! caller parses numeric values itself.
//!
//! [`SqliteRowStore`] is the production implementation. It also owns the
//! schema of the four tables the engine mirrors.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};

use crate::utils::error::StorageError;

/// One fetched row, keyed by column name
pub type Row = HashMap<String, String>;

/// Positional SQL argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlArg {
    Int(i64),
    Text(String),
}

impl From<i64> for SqlArg {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for SqlArg {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlArg {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl ToSql for SqlArg {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Self::Int(v) => v.to_sql(),
            Self::Text(v) => v.to_sql(),
        }
    }
}

/// Row-oriented CRUD primitives
pub trait RowStore: Send + Sync {
    /// Run an INSERT and return the generated id
    fn insert(&self, sql: &str, args: &[SqlArg]) -> Result<i64, StorageError>;

    /// Run a statement and return the affected-row count
    fn execute(&self, sql: &str, args: &[SqlArg]) -> Result<usize, StorageError>;

    /// Fetch exactly one row; no match is [`StorageError::RowNotFound`]
    fn fetch_one(&self, sql: &str, args: &[SqlArg]) -> Result<Row, StorageError>;

    /// Fetch every matching row
    fn fetch_many(&self, sql: &str, args: &[SqlArg]) -> Result<Vec<Row>, StorageError>;
}

/// Thread-safe shared row store
pub type SharedRowStore = Arc<dyn RowStore>;

// ============================================================================
// SQLite Implementation
// ============================================================================

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS domain_group (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL DEFAULT '',
        status INTEGER NOT NULL DEFAULT 0,
        share_status INTEGER NOT NULL DEFAULT 0,
        ads_status INTEGER NOT NULL DEFAULT 0,
        type INTEGER NOT NULL DEFAULT 0,
        show_group_list TEXT NOT NULL DEFAULT '',
        time TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
    );

    CREATE TABLE IF NOT EXISTS domain (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        group_id INTEGER NOT NULL,
        domain TEXT NOT NULL,
        status INTEGER NOT NULL DEFAULT 0,
        time TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
    );

    CREATE INDEX IF NOT EXISTS idx_domain_group_id ON domain(group_id);
    CREATE INDEX IF NOT EXISTS idx_domain_domain ON domain(domain);

    CREATE TABLE IF NOT EXISTS content_group (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL DEFAULT '',
        json_url TEXT NOT NULL DEFAULT '',
        type INTEGER NOT NULL DEFAULT 0,
        main_content TEXT NOT NULL DEFAULT '',
        time TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
    );

    CREATE TABLE IF NOT EXISTS content (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        group_id INTEGER NOT NULL,
        value TEXT NOT NULL DEFAULT '',
        type INTEGER NOT NULL DEFAULT 0,
        time TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
    );

    CREATE INDEX IF NOT EXISTS idx_content_group_id ON content(group_id);

    CREATE TRIGGER IF NOT EXISTS trg_domain_group_touch
    AFTER UPDATE ON domain_group FOR EACH ROW WHEN NEW.time = OLD.time
    BEGIN
        UPDATE domain_group SET time = strftime('%Y-%m-%d %H:%M:%f', 'now') WHERE id = NEW.id;
    END;

    CREATE TRIGGER IF NOT EXISTS trg_domain_touch
    AFTER UPDATE ON domain FOR EACH ROW WHEN NEW.time = OLD.time
    BEGIN
        UPDATE domain SET time = strftime('%Y-%m-%d %H:%M:%f', 'now') WHERE id = NEW.id;
    END;

    -- json_url is written by the publisher itself and must not look like a change
    CREATE TRIGGER IF NOT EXISTS trg_content_group_touch
    AFTER UPDATE OF name, type, main_content ON content_group
    FOR EACH ROW WHEN NEW.time = OLD.time
    BEGIN
        UPDATE content_group SET time = strftime('%Y-%m-%d %H:%M:%f', 'now') WHERE id = NEW.id;
    END;

    CREATE TRIGGER IF NOT EXISTS trg_content_touch
    AFTER UPDATE ON content FOR EACH ROW WHEN NEW.time = OLD.time
    BEGIN
        UPDATE content SET time = strftime('%Y-%m-%d %H:%M:%f', 'now') WHERE id = NEW.id;
    END;
"#;

/// SQLite-backed [`RowStore`]
pub struct SqliteRowStore {
    conn: Mutex<Connection>,
}

impl SqliteRowStore {
    /// Open (or create) a database file and ensure the schema exists
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Open(format!("{}: {e}", parent.display())))?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "SQLite row store initialized");
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn value_to_text(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(v) => v.to_string(),
        ValueRef::Real(v) => v.to_string(),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

impl RowStore for SqliteRowStore {
    fn insert(&self, sql: &str, args: &[SqlArg]) -> Result<i64, StorageError> {
        let conn = self.conn();
        conn.execute(sql, params_from_iter(args.iter()))?;
        Ok(conn.last_insert_rowid())
    }

    fn execute(&self, sql: &str, args: &[SqlArg]) -> Result<usize, StorageError> {
        Ok(self.conn().execute(sql, params_from_iter(args.iter()))?)
    }

    fn fetch_one(&self, sql: &str, args: &[SqlArg]) -> Result<Row, StorageError> {
        self.fetch_many(sql, args)?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::RowNotFound(sql.trim().to_string()))
    }

    fn fetch_many(&self, sql: &str, args: &[SqlArg]) -> Result<Vec<Row>, StorageError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

        let mut rows = stmt.query(params_from_iter(args.iter()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut fetched = Row::with_capacity(columns.len());
            for (idx, name) in columns.iter().enumerate() {
                fetched.insert(name.clone(), value_to_text(row.get_ref(idx)?));
            }
            out.push(fetched);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_returns_generated_id() {
        let store = SqliteRowStore::in_memory().unwrap();
        let first = store
            .insert(
                "INSERT INTO domain (group_id, domain) VALUES (?1, ?2)",
                &[1i64.into(), "a.example".into()],
            )
            .unwrap();
        let second = store
            .insert(
                "INSERT INTO domain (group_id, domain) VALUES (?1, ?2)",
                &[1i64.into(), "b.example".into()],
            )
            .unwrap();
        assert_eq!(second, first + 1);
    }

    #[test]
    fn test_columns_round_trip_as_text() {
        let store = SqliteRowStore::in_memory().unwrap();
        store
            .insert(
                "INSERT INTO domain (group_id, domain, status) VALUES (?1, ?2, ?3)",
                &[7i64.into(), "c.example".into(), 1i64.into()],
            )
            .unwrap();

        let row = store
            .fetch_one("SELECT group_id, domain, status FROM domain", &[])
            .unwrap();
        assert_eq!(row["group_id"], "7");
        assert_eq!(row["domain"], "c.example");
        assert_eq!(row["status"], "1");
    }

    #[test]
    fn test_fetch_one_missing_row() {
        let store = SqliteRowStore::in_memory().unwrap();
        let err = store
            .fetch_one("SELECT id FROM domain WHERE id = ?1", &[42i64.into()])
            .unwrap_err();
        assert!(matches!(err, StorageError::RowNotFound(_)));
    }

    #[test]
    fn test_execute_counts_rows() {
        let store = SqliteRowStore::in_memory().unwrap();
        for name in ["x.example", "x.example", "y.example"] {
            store
                .insert(
                    "INSERT INTO domain (group_id, domain) VALUES (1, ?1)",
                    &[name.into()],
                )
                .unwrap();
        }
        let changed = store
            .execute(
                "UPDATE domain SET status = ?1 WHERE domain = ?2",
                &[1i64.into(), "x.example".into()],
            )
            .unwrap();
        assert_eq!(changed, 2);
    }

    #[test]
    fn test_json_url_write_keeps_group_time() {
        let store = SqliteRowStore::in_memory().unwrap();
        let id = store
            .insert(
                "INSERT INTO content_group (name, time) VALUES (?1, ?2)",
                &["g".into(), "2024-01-01 00:00:00.000".into()],
            )
            .unwrap();

        store
            .execute(
                "UPDATE content_group SET json_url = ?1 WHERE id = ?2",
                &["http://cdn/g.json".into(), id.into()],
            )
            .unwrap();
        let row = store
            .fetch_one("SELECT time FROM content_group WHERE id = ?1", &[id.into()])
            .unwrap();
        assert_eq!(row["time"], "2024-01-01 00:00:00.000");

        store
            .execute(
                "UPDATE content_group SET main_content = ?1 WHERE id = ?2",
                &["3,1".into(), id.into()],
            )
            .unwrap();
        let row = store
            .fetch_one("SELECT time FROM content_group WHERE id = ?1", &[id.into()])
            .unwrap();
        assert_ne!(row["time"], "2024-01-01 00:00:00.000");
    }

    #[test]
    fn test_file_store_creates_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("rotor.db");
        let store = SqliteRowStore::new(&path).unwrap();
        store
            .insert("INSERT INTO content_group (name) VALUES (?1)", &["a".into()])
            .unwrap();
        assert!(path.exists());
    }
}
