//! SQLite adapter

use std::path::Path;
use rusqlite::{params_from_iter, Connection};
use super::{Backend, BackendKind, DatabaseError, Identity};
use crate::value::{Row, Value};

/// Embedded-file backend over a `rusqlite::Connection`.
///
/// SQLite runs in autocommit mode unless a transaction is open, so the
/// adapter issues `BEGIN` before the first statement of every write and
/// leaves it open for the caller's `commit`/`rollback`.
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::new(Connection::open(path)?))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn begin(&self) -> rusqlite::Result<()> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }
}

impl Backend for SqliteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::EmbeddedFile
    }

    fn identity(&self) -> Identity {
        Identity {
            server: None,
            database: self.conn.path().filter(|p| !p.is_empty()).map(str::to_string),
        }
    }

    fn execute(&mut self, sql: &str) -> Result<(), DatabaseError> {
        self.begin()?;
        self.conn.execute(sql, [])?;
        Ok(())
    }

    fn execute_many(&mut self, sql: &str, rows: &[Row]) -> Result<(), DatabaseError> {
        self.begin()?;
        let mut stmt = self.conn.prepare(sql)?;
        for row in rows {
            stmt.execute(params_from_iter(row.iter()))?;
        }
        Ok(())
    }

    fn fetch_all(&mut self, sql: &str) -> Result<Vec<Row>, DatabaseError> {
        let mut stmt = self.conn.prepare(sql)?;
        let boolean: Vec<bool> = stmt
            .columns()
            .iter()
            .map(|c| c.decl_type().is_some_and(is_boolean_decl))
            .collect();
        let mut rows = stmt.query([])?;

        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let values = boolean
                .iter()
                .enumerate()
                .map(|(i, &is_bool)| -> rusqlite::Result<Value> {
                    let value = row.get::<_, Value>(i)?;
                    Ok(match value {
                        Value::Integer(n @ (0 | 1)) if is_bool => Value::Bool(n == 1),
                        other => other,
                    })
                })
                .collect::<rusqlite::Result<Row>>()?;
            result.push(values);
        }
        Ok(result)
    }

    fn commit(&mut self) -> Result<(), DatabaseError> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), DatabaseError> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), DatabaseError> {
        let SqliteBackend { conn } = *self;
        conn.close().map_err(|(_, err)| DatabaseError::Sqlite(err))
    }

    fn is_missing_table(&self, err: &DatabaseError) -> bool {
        match err {
            DatabaseError::Sqlite(rusqlite::Error::SqliteFailure(_, Some(msg))) => {
                msg.starts_with("no such table")
            }
            _ => false,
        }
    }
}

/// Declared column types SQLite stores as 0/1 integers and reads back as `Bool`.
fn is_boolean_decl(decl: &str) -> bool {
    decl.eq_ignore_ascii_case("BOOLEAN") || decl.eq_ignore_ascii_case("BOOL")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend_with_notes() -> SqliteBackend {
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        backend.execute("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT NOT NULL)").unwrap();
        backend.commit().unwrap();
        backend
    }

    #[test]
    fn test_execute_many_and_fetch() {
        let mut backend = backend_with_notes();
        let rows = vec![
            vec![Value::Integer(1), Value::Text("first".into())],
            vec![Value::Integer(2), Value::Text("second".into())],
        ];
        backend.execute_many("INSERT INTO notes (id, body) VALUES (?1, ?2)", &rows).unwrap();
        backend.commit().unwrap();

        let fetched = backend.fetch_all("SELECT id, body FROM notes ORDER BY id").unwrap();
        assert_eq!(fetched, rows);
    }

    #[test]
    fn test_boolean_columns_read_back_as_bool() {
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        backend.execute("CREATE TABLE flags (id INTEGER, ok BOOLEAN, hits INTEGER)").unwrap();
        let rows = vec![
            vec![Value::Integer(1), Value::Bool(true), Value::Integer(1)],
            vec![Value::Integer(2), Value::Bool(false), Value::Integer(0)],
            vec![Value::Integer(3), Value::Null, Value::Null],
        ];
        backend.execute_many("INSERT INTO flags VALUES (?1, ?2, ?3)", &rows).unwrap();
        backend.commit().unwrap();

        let fetched = backend.fetch_all("SELECT id, ok, hits FROM flags ORDER BY id").unwrap();
        assert_eq!(fetched, rows);

        // expressions carry no declared type
        let fetched = backend.fetch_all("SELECT ok + 0 FROM flags WHERE id = 1").unwrap();
        assert_eq!(fetched, vec![vec![Value::Integer(1)]]);
    }

    #[test]
    fn test_boolean_decl_names() {
        assert!(is_boolean_decl("BOOLEAN"));
        assert!(is_boolean_decl("bool"));
        assert!(!is_boolean_decl("INTEGER"));
        assert!(!is_boolean_decl("BOOLEANISH"));
    }

    #[test]
    fn test_rollback_discards_open_transaction() {
        let mut backend = backend_with_notes();
        backend
            .execute_many("INSERT INTO notes (id, body) VALUES (?1, ?2)", &[vec![Value::from(1), Value::from("x")]])
            .unwrap();
        assert!(!backend.connection().is_autocommit());
        backend.rollback().unwrap();

        assert!(backend.fetch_all("SELECT * FROM notes").unwrap().is_empty());
        assert!(backend.connection().is_autocommit());
    }

    #[test]
    fn test_commit_without_transaction_is_noop() {
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        backend.commit().unwrap();
        backend.rollback().unwrap();
    }

    #[test]
    fn test_no_bulk_insert_mode() {
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        assert!(!backend.enable_bulk_insert());
        assert_eq!(backend.kind(), BackendKind::EmbeddedFile);
    }

    #[test]
    fn test_missing_table_detection() {
        let mut backend = SqliteBackend::open_in_memory().unwrap();
        let err = backend.execute("DROP TABLE nowhere").unwrap_err();
        assert!(backend.is_missing_table(&err));

        let err = backend.execute("CREATE TABLE (").unwrap_err();
        assert!(!backend.is_missing_table(&err));
    }

    #[test]
    fn test_in_memory_identity_is_empty() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        assert_eq!(backend.identity(), Identity::default());
    }
}
