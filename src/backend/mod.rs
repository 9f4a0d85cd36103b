//! Backend layer - the capability interface every store implements
//!
//! Two adapters ship with the crate:
//! - [`SqliteBackend`]: embedded file database via `rusqlite`
//! - `OdbcBackend`: network server via `odbc-api` (behind the `odbc` feature)

pub mod sqlite;
#[cfg(feature = "odbc")]
pub mod odbc;

pub use sqlite::SqliteBackend;
#[cfg(feature = "odbc")]
pub use odbc::OdbcBackend;

use crate::value::Row;
use std::fmt;

/// The family a connection belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    EmbeddedFile,
    NetworkDriver,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::EmbeddedFile => "embedded-file",
            BackendKind::NetworkDriver => "network-driver",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Native error of whichever backend produced it.
///
/// Each variant holds the driver's error as-is so callers keep the full
/// diagnostic detail (SQLite result codes, ODBC SQLSTATE records).
#[derive(Debug)]
pub enum DatabaseError {
    Sqlite(rusqlite::Error),
    #[cfg(feature = "odbc")]
    Odbc(odbc_api::Error),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::Sqlite(err) => fmt::Display::fmt(err, f),
            #[cfg(feature = "odbc")]
            DatabaseError::Odbc(err) => fmt::Display::fmt(err, f),
        }
    }
}

impl std::error::Error for DatabaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DatabaseError::Sqlite(err) => std::error::Error::source(err),
            #[cfg(feature = "odbc")]
            DatabaseError::Odbc(err) => std::error::Error::source(err),
        }
    }
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        DatabaseError::Sqlite(err)
    }
}

#[cfg(feature = "odbc")]
impl From<odbc_api::Error> for DatabaseError {
    fn from(err: odbc_api::Error) -> Self {
        DatabaseError::Odbc(err)
    }
}

/// Where a connection points, when the backend knows
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub server: Option<String>,
    pub database: Option<String>,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let server = self.server.as_deref().unwrap_or("<none>");
        let database = self.database.as_deref().unwrap_or("<none>");
        write!(f, "{}.{}", server, database)
    }
}

/// Result of `DROP TABLE IF EXISTS`
#[derive(Debug)]
pub enum DropOutcome {
    /// Statement ran and was committed.
    Dropped,
    /// The backend reported the table as missing.
    NotFound,
    /// Any other backend failure; the statement was rolled back.
    Failed(DatabaseError),
}

impl DropOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, DropOutcome::Failed(_))
    }
}

/// Operations a connection must expose to sit behind a [`crate::DbConnect`].
///
/// An adapter owns the live connection and issues one statement at a time.
/// Writes run inside a transaction that stays open until `commit` or
/// `rollback`; `fetch_all` must not change transaction state.
pub trait Backend {
    fn kind(&self) -> BackendKind;

    fn identity(&self) -> Identity {
        Identity::default()
    }

    /// Switch on bulk-insert acceleration. Returns false when the backend has no such mode.
    fn enable_bulk_insert(&mut self) -> bool {
        false
    }

    fn execute(&mut self, sql: &str) -> Result<(), DatabaseError>;

    /// Run `sql` once per row, binding the row's values to its placeholders.
    fn execute_many(&mut self, sql: &str, rows: &[Row]) -> Result<(), DatabaseError>;

    fn fetch_all(&mut self, sql: &str) -> Result<Vec<Row>, DatabaseError>;

    fn commit(&mut self) -> Result<(), DatabaseError>;

    fn rollback(&mut self) -> Result<(), DatabaseError>;

    fn close(self: Box<Self>) -> Result<(), DatabaseError>;

    /// Whether `err` means "table does not exist" in this backend's dialect.
    fn is_missing_table(&self, _err: &DatabaseError) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display() {
        let identity = Identity {
            server: Some("db01".into()),
            database: Some("notes".into()),
        };
        assert_eq!(identity.to_string(), "db01.notes");
        assert_eq!(Identity::default().to_string(), "<none>.<none>");
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(BackendKind::EmbeddedFile.to_string(), "embedded-file");
        assert_eq!(BackendKind::NetworkDriver.as_str(), "network-driver");
    }
}
