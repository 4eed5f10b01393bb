//! Database backend abstraction for emulator schemas.
//!
//! Emulator back-ends model the same furniture table with different
//! physical schemas: booleans arrive as `TINYINT`, `ENUM('0','1')`, or
//! plain integers, and the column set varies per back-end. The contract
//! here therefore returns *dynamic* rows - column-name to [`SqlValue`]
//! maps - and leaves projection to the adapter, which knows the
//! logical-to-physical column mapping for its server profile.
//!
//! [`SqliteBackend`] is the shipped implementation. The [`SqlDialect`]
//! carried by the trait lets dialect-dependent SQL (schema widening,
//! batch sizing) stay correct for other back-ends added behind the same
//! contract.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

/// A single column value, as loosely typed as the wire it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// Any integer type.
    Integer(i64),
    /// Any floating-point type.
    Real(f64),
    /// Text, including ENUM values surfaced as strings.
    Text(String),
    /// Raw bytes.
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Coerces to an integer. Text parses decimally; anything
    /// unparseable is 0.
    #[must_use]
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Integer(v) => *v,
            #[allow(clippy::cast_possible_truncation)]
            Self::Real(v) => *v as i64,
            Self::Text(s) => s.trim().parse().unwrap_or(0),
            Self::Blob(b) => std::str::from_utf8(b)
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0),
            Self::Null => 0,
        }
    }

    /// Coerces to a string. NULL becomes the empty string.
    #[must_use]
    pub fn as_string(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Integer(v) => v.to_string(),
            Self::Real(v) => v.to_string(),
            Self::Blob(b) => String::from_utf8_lossy(b).into_owned(),
            Self::Null => String::new(),
        }
    }

    /// Coerces to a boolean.
    ///
    /// True is integer 1, string `"1"`, or string `"true"` in any case -
    /// the three physical encodings the supported back-ends use.
    #[must_use]
    pub fn as_bool(&self) -> bool {
        match self {
            Self::Integer(v) => *v == 1,
            #[allow(clippy::float_cmp)]
            Self::Real(v) => *v == 1.0,
            Self::Text(s) => s == "1" || s.eq_ignore_ascii_case("true"),
            Self::Blob(b) => {
                let s = String::from_utf8_lossy(b);
                s == "1" || s.eq_ignore_ascii_case("true")
            }
            Self::Null => false,
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Integer(i64::from(value))
    }
}

/// One result row: physical column name to value.
pub type SqlRow = HashMap<String, SqlValue>;

/// SQL dialect of a backend, for the few statements that differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    /// `SQLite` - used for local installs and tests.
    Sqlite,
    /// `MySQL`/MariaDB - what the hosted emulators run.
    MySql,
}

/// Database backend trait.
///
/// Statements use `?` positional placeholders; implementations translate
/// if their driver differs.
#[async_trait]
pub trait DatabaseBackend: Send + Sync + 'static {
    /// Runs a query and returns all rows as dynamic column maps.
    async fn query(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<SqlRow>>;

    /// Runs a statement and returns the number of affected rows.
    async fn execute(&self, sql: &str, params: Vec<SqlValue>) -> Result<u64>;

    /// The dialect this backend speaks.
    fn dialect(&self) -> SqlDialect;
}

/// `SQLite` implementation of [`DatabaseBackend`].
///
/// The connection is owned behind a mutex and every call hops to the
/// blocking pool; `SQLite` serializes writers anyway, so a single guarded
/// connection loses nothing.
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl std::fmt::Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend").finish_non_exhaustive()
    }
}

impl SqliteBackend {
    /// Opens (or creates) a database file.
    ///
    /// # Errors
    ///
    /// Returns a database error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = rusqlite::Connection::open(path)
            .map_err(|err| Error::database_with_source("failed to open database", err))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens a fresh in-memory database.
    ///
    /// # Errors
    ///
    /// Returns a database error if the connection cannot be created.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()
            .map_err(|err| Error::database_with_source("failed to open in-memory database", err))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|_| Error::Internal {
                message: "connection lock poisoned".into(),
            })?;
            f(&guard).map_err(|err| Error::database_with_source("statement failed", err))
        })
        .await
        .map_err(|err| Error::internal(format!("blocking task failed: {err}")))?
    }
}

fn to_sqlite(value: SqlValue) -> rusqlite::types::Value {
    match value {
        SqlValue::Null => rusqlite::types::Value::Null,
        SqlValue::Integer(v) => rusqlite::types::Value::Integer(v),
        SqlValue::Real(v) => rusqlite::types::Value::Real(v),
        SqlValue::Text(v) => rusqlite::types::Value::Text(v),
        SqlValue::Blob(v) => rusqlite::types::Value::Blob(v),
    }
}

fn from_sqlite(value: rusqlite::types::ValueRef<'_>) -> SqlValue {
    match value {
        rusqlite::types::ValueRef::Null => SqlValue::Null,
        rusqlite::types::ValueRef::Integer(v) => SqlValue::Integer(v),
        rusqlite::types::ValueRef::Real(v) => SqlValue::Real(v),
        rusqlite::types::ValueRef::Text(v) => SqlValue::Text(String::from_utf8_lossy(v).into_owned()),
        rusqlite::types::ValueRef::Blob(v) => SqlValue::Blob(v.to_vec()),
    }
}

#[async_trait]
impl DatabaseBackend for SqliteBackend {
    async fn query(&self, sql: &str, params: Vec<SqlValue>) -> Result<Vec<SqlRow>> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let columns: Vec<String> = stmt.column_names().iter().map(ToString::to_string).collect();

            let sqlite_params: Vec<rusqlite::types::Value> =
                params.into_iter().map(to_sqlite).collect();

            let mut rows = stmt.query(rusqlite::params_from_iter(sqlite_params))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut map = SqlRow::with_capacity(columns.len());
                for (idx, name) in columns.iter().enumerate() {
                    map.insert(name.clone(), from_sqlite(row.get_ref(idx)?));
                }
                out.push(map);
            }
            Ok(out)
        })
        .await
    }

    async fn execute(&self, sql: &str, params: Vec<SqlValue>) -> Result<u64> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let sqlite_params: Vec<rusqlite::types::Value> =
                params.into_iter().map(to_sqlite).collect();
            let affected = conn.execute(&sql, rusqlite::params_from_iter(sqlite_params))?;
            Ok(affected as u64)
        })
        .await
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> SqliteBackend {
        let db = SqliteBackend::open_in_memory().expect("open");
        db.execute(
            "CREATE TABLE items_base (
                id INTEGER PRIMARY KEY,
                sprite_id INTEGER NOT NULL,
                item_name TEXT NOT NULL,
                public_name TEXT NOT NULL,
                allow_sit TEXT NOT NULL DEFAULT '0'
            )",
            vec![],
        )
        .await
        .expect("create");
        db.execute(
            "INSERT INTO items_base (id, sprite_id, item_name, public_name, allow_sit)
             VALUES (1, 100, 'chair', 'Chair', '1')",
            vec![],
        )
        .await
        .expect("insert");
        db
    }

    #[tokio::test]
    async fn test_query_returns_dynamic_rows() {
        let db = seeded().await;
        let rows = db.query("SELECT * FROM items_base", vec![]).await.unwrap();

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row["sprite_id"].as_i64(), 100);
        assert_eq!(row["item_name"].as_string(), "chair");
        // ENUM-style text boolean coerces
        assert!(row["allow_sit"].as_bool());
    }

    #[tokio::test]
    async fn test_query_with_params() {
        let db = seeded().await;
        let rows = db
            .query(
                "SELECT public_name FROM items_base WHERE sprite_id = ?",
                vec![SqlValue::Integer(100)],
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["public_name"].as_string(), "Chair");
    }

    #[tokio::test]
    async fn test_execute_reports_affected_rows() {
        let db = seeded().await;
        let affected = db
            .execute(
                "UPDATE items_base SET public_name = ? WHERE sprite_id = ?",
                vec![SqlValue::from("Throne"), SqlValue::Integer(100)],
            )
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let affected = db
            .execute(
                "UPDATE items_base SET public_name = ? WHERE sprite_id = ?",
                vec![SqlValue::from("Throne"), SqlValue::Integer(999)],
            )
            .await
            .unwrap();
        assert_eq!(affected, 0);
    }

    #[test]
    fn test_value_coercions() {
        assert_eq!(SqlValue::Text(" 42 ".into()).as_i64(), 42);
        assert_eq!(SqlValue::Text("junk".into()).as_i64(), 0);
        assert_eq!(SqlValue::Null.as_i64(), 0);
        assert_eq!(SqlValue::Integer(7).as_string(), "7");
        assert_eq!(SqlValue::Null.as_string(), "");

        assert!(SqlValue::Integer(1).as_bool());
        assert!(!SqlValue::Integer(2).as_bool());
        assert!(SqlValue::Text("1".into()).as_bool());
        assert!(SqlValue::Text("TRUE".into()).as_bool());
        assert!(!SqlValue::Text("0".into()).as_bool());
        assert!(!SqlValue::Null.as_bool());
    }

    #[test]
    fn test_dialect() {
        let db = SqliteBackend::open_in_memory().expect("open");
        assert_eq!(db.dialect(), SqlDialect::Sqlite);
    }
}
