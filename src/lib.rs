//! # dbconnect - Uniform database connection handle
//!
//! Lets a document-processing pipeline persist and read back records through
//! one interface, whether the store is an embedded SQLite file or a server
//! reached over ODBC.
//!
//! dbconnect provides:
//! - A connection handle with consistent commit/rollback semantics
//! - Backend classification behind a small capability trait
//! - Identifier validation for the table names interpolated into SQL
//! - A TOML config layer and a CLI for ad-hoc use

pub mod backend;
pub mod config;
pub mod connect;
pub mod identifier;
pub mod ui;
pub mod value;

// Re-exports for convenient access
pub use backend::{Backend, BackendKind, DatabaseError, DropOutcome};
pub use connect::{ConnectBuilder, Credentials, DbConnect};
pub use identifier::validate_identifier;
pub use value::{Row, Value};

/// Result type alias for dbconnect operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for dbconnect operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),

    #[error("{reason}")]
    InvalidIdentifier {
        role: String,
        identifier: String,
        reason: String,
    },

    /// The backend's own error, passed through untouched.
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Invalid rows: {0}")]
    InvalidRows(String),

    #[error("Connection is closed")]
    Closed,

    #[error("Network-driver backend unavailable: built without the `odbc` feature")]
    DriverUnavailable,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(DatabaseError::Sqlite(err))
    }
}

#[cfg(feature = "odbc")]
impl From<odbc_api::Error> for Error {
    fn from(err: odbc_api::Error) -> Self {
        Error::Database(DatabaseError::Odbc(err))
    }
}
