//! Connection handle
//!
//! [`DbConnect`] wraps one live backend connection and gives every write the
//! same shape: execute, commit on success, otherwise roll back, close the
//! connection and hand the backend's own error back to the caller.

use std::any::{type_name, Any};
use std::fmt;
use std::path::Path;
use tracing::{debug, error, info, warn, Dispatch};
use crate::backend::{Backend, BackendKind, DatabaseError, DropOutcome, SqliteBackend};
use crate::identifier::validate_identifier;
use crate::value::Row;
use crate::{Error, Result};

/// Everything needed to open a network-driver connection.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub driver: String,
    pub server: String,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl Credentials {
    /// Build from optional parts. `None` unless all five are present and non-empty.
    pub fn from_parts(
        driver: Option<&str>,
        server: Option<&str>,
        database: Option<&str>,
        user: Option<&str>,
        password: Option<&str>,
    ) -> Option<Self> {
        let part = |p: Option<&str>| p.filter(|s| !s.is_empty()).map(str::to_string);
        Some(Self {
            driver: part(driver)?,
            server: part(server)?,
            database: part(database)?,
            user: part(user)?,
            password: part(password)?,
        })
    }

    /// ODBC connection string, e.g. `DRIVER={ODBC Driver 18};SERVER=db01;...`
    pub fn connection_string(&self) -> String {
        format!(
            "DRIVER={};SERVER={};DATABASE={};USER={};PWD={}",
            quote_attribute(&self.driver),
            quote_attribute(&self.server),
            quote_attribute(&self.database),
            quote_attribute(&self.user),
            quote_attribute(&self.password),
        )
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("driver", &self.driver)
            .field("server", &self.server)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Brace-quote a connection string attribute value when it would otherwise
/// break the `KEY=VALUE;` syntax.
fn quote_attribute(value: &str) -> String {
    let needs_quoting = value.contains([';', '{', '}']) || value.trim() != value;
    if needs_quoting {
        format!("{{{}}}", value.replace('}', "}}"))
    } else {
        value.to_string()
    }
}

/// Builder for [`DbConnect`]
///
/// A ready backend wins over a connection object, which wins over credentials.
#[derive(Default)]
pub struct ConnectBuilder {
    driver: Option<String>,
    server: Option<String>,
    database: Option<String>,
    user: Option<String>,
    password: Option<String>,
    connection: Option<(Box<dyn Any>, &'static str)>,
    backend: Option<Box<dyn Backend>>,
    bulk_insert: Option<bool>,
    log_sink: Option<Dispatch>,
}

impl ConnectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.server = Some(server.into());
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn credentials(self, credentials: Credentials) -> Self {
        self.driver(credentials.driver)
            .server(credentials.server)
            .database(credentials.database)
            .user(credentials.user)
            .password(credentials.password)
    }

    /// Adopt an already-open connection. Must be a `rusqlite::Connection` or,
    /// with the `odbc` feature, an `odbc_api::Connection<'static>`.
    pub fn connection<C: Any>(mut self, conn: C) -> Self {
        self.connection = Some((Box::new(conn), type_name::<C>()));
        self
    }

    /// Adopt a custom adapter as-is.
    pub fn backend(mut self, backend: Box<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Turn bulk-insert acceleration on or off (on by default where supported).
    pub fn bulk_insert(mut self, enabled: bool) -> Self {
        self.bulk_insert = Some(enabled);
        self
    }

    /// Where log events go. Defaults to the dispatcher current at `build` time.
    pub fn log_sink(mut self, dispatch: Dispatch) -> Self {
        self.log_sink = Some(dispatch);
        self
    }

    pub fn build(self) -> Result<DbConnect> {
        let dispatch = self
            .log_sink
            .unwrap_or_else(|| tracing::dispatcher::get_default(|current| current.clone()));

        let mut backend = if let Some(backend) = self.backend {
            backend
        } else if let Some((conn, name)) = self.connection {
            classify(conn, name)?
        } else {
            let credentials = Credentials::from_parts(
                self.driver.as_deref(),
                self.server.as_deref(),
                self.database.as_deref(),
                self.user.as_deref(),
                self.password.as_deref(),
            )
            .ok_or_else(|| {
                Error::Config(
                    "If you are not passing in a connection object, you must pass in all other \
                     arguments (driver, server, database, user, password) to create a DB connection."
                        .to_string(),
                )
            })?;
            open_network(&credentials)?
        };

        let bulk_insert = self.bulk_insert.unwrap_or(true) && backend.enable_bulk_insert();
        let kind = backend.kind();
        let identity = backend.identity();

        tracing::dispatcher::with_default(&dispatch, || {
            info!(backend = %kind, bulk_insert, "Opened connection to {}", identity);
        });

        Ok(DbConnect {
            backend: Some(backend),
            kind,
            bulk_insert,
            dispatch,
        })
    }
}

/// Map an adopted connection object onto its adapter.
fn classify(conn: Box<dyn Any>, name: &'static str) -> Result<Box<dyn Backend>> {
    let conn = match conn.downcast::<rusqlite::Connection>() {
        Ok(sqlite) => return Ok(Box::new(SqliteBackend::new(*sqlite))),
        Err(other) => other,
    };

    #[cfg(feature = "odbc")]
    let conn = match conn.downcast::<odbc_api::Connection<'static>>() {
        Ok(odbc) => return Ok(Box::new(crate::backend::OdbcBackend::new(*odbc)?)),
        Err(other) => other,
    };

    drop(conn);
    Err(Error::UnsupportedBackend(format!(
        "conn must be either a SQLite or ODBC connection, not {}",
        name
    )))
}

#[cfg(feature = "odbc")]
fn open_network(credentials: &Credentials) -> Result<Box<dyn Backend>> {
    Ok(Box::new(crate::backend::OdbcBackend::connect(credentials)?))
}

#[cfg(not(feature = "odbc"))]
fn open_network(_credentials: &Credentials) -> Result<Box<dyn Backend>> {
    Err(Error::DriverUnavailable)
}

/// A single database connection with commit/rollback handled per call.
///
/// Not meant to be shared: every operation takes `&mut self` and runs one
/// statement at a time. Once a write fails the connection is closed and all
/// further calls return [`Error::Closed`].
pub struct DbConnect {
    backend: Option<Box<dyn Backend>>,
    kind: BackendKind,
    bulk_insert: bool,
    dispatch: Dispatch,
}

impl DbConnect {
    pub fn builder() -> ConnectBuilder {
        ConnectBuilder::new()
    }

    /// Adopt an open connection object.
    pub fn from_connection<C: Any>(conn: C) -> Result<Self> {
        Self::builder().connection(conn).build()
    }

    /// Open (or create) a SQLite database file.
    pub fn open_sqlite(path: &Path) -> Result<Self> {
        Self::from_connection(rusqlite::Connection::open(path)?)
    }

    /// Open an in-memory SQLite database.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(rusqlite::Connection::open_in_memory()?)
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn bulk_insert_enabled(&self) -> bool {
        self.bulk_insert
    }

    pub fn is_closed(&self) -> bool {
        self.backend.is_none()
    }

    /// Drop `table_name` if it exists, committing on success.
    ///
    /// Failures are reported in the outcome rather than as an error; the
    /// handle stays open either way.
    pub fn drop_table(&mut self, table_name: &str) -> Result<DropOutcome> {
        validate_identifier(table_name, "table name")?;
        let backend = self.backend.as_deref_mut().ok_or(Error::Closed)?;

        let sql = format!("DROP TABLE IF EXISTS {}", table_name);
        let outcome = match backend.execute(&sql).and_then(|()| backend.commit()) {
            Ok(()) => DropOutcome::Dropped,
            Err(err) => {
                let missing = backend.is_missing_table(&err);
                if let Err(rollback_err) = backend.rollback() {
                    tracing::dispatcher::with_default(&self.dispatch, || {
                        debug!("Rollback after failed drop of {} failed: {}", table_name, rollback_err);
                    });
                }
                if missing { DropOutcome::NotFound } else { DropOutcome::Failed(err) }
            }
        };
        Ok(outcome)
    }

    /// Create a table from `ddl`, optionally dropping an existing one first.
    ///
    /// Only `table_name` is validated; `ddl` runs verbatim.
    pub fn create_table(&mut self, ddl: &str, table_name: &str, drop_existing: bool) -> Result<()> {
        validate_identifier(table_name, "table name")?;

        if drop_existing {
            if let DropOutcome::Failed(err) = self.drop_table(table_name)? {
                self.log(|| warn!("Ignoring failure to drop table {}: {}", table_name, err));
            }
        }

        self.run(|backend| {
            backend.execute(ddl)?;
            backend.commit()
        })?;

        self.log(|| info!("Created table {} with query: {}", table_name, ddl));
        Ok(())
    }

    /// Execute `query` once per row and commit the whole batch.
    pub fn write(&mut self, query: &str, rows: &[Row]) -> Result<()> {
        self.run(|backend| {
            backend.execute_many(query, rows)?;
            backend.commit()
        })?;

        self.log(|| debug!("Wrote {} rows with query: {}", rows.len(), query));
        Ok(())
    }

    /// Run `query` and return every result row. Leaves the transaction alone.
    pub fn read(&mut self, query: &str) -> Result<Vec<Row>> {
        let backend = self.backend.as_deref_mut().ok_or(Error::Closed)?;
        let rows = backend.fetch_all(query)?;

        self.log(|| debug!("Read {} rows with query: {}", rows.len(), query));
        Ok(rows)
    }

    /// Commit outstanding work and release the connection.
    pub fn close(mut self) -> Result<()> {
        let mut backend = self.backend.take().ok_or(Error::Closed)?;
        let committed = backend.commit();
        let closed = backend.close();

        if let Err(err) = &committed {
            self.log(|| error!("Commit on close failed, connection released anyway: {}", err));
        }
        committed?;
        closed?;

        self.log(|| info!("Connection closed."));
        Ok(())
    }

    /// Run a write-path operation; on failure roll back and close.
    fn run<T>(&mut self, op: impl FnOnce(&mut dyn Backend) -> std::result::Result<T, DatabaseError>) -> Result<T> {
        let backend = self.backend.as_deref_mut().ok_or(Error::Closed)?;
        match op(backend) {
            Ok(value) => Ok(value),
            Err(err) => Err(self.abort(err)),
        }
    }

    fn abort(&mut self, err: DatabaseError) -> Error {
        if let Some(mut backend) = self.backend.take() {
            let rollback = backend.rollback();
            let close = backend.close();
            self.log(|| {
                if let Err(e) = &rollback {
                    warn!("Rollback failed: {}", e);
                }
                if let Err(e) = &close {
                    warn!("Close failed: {}", e);
                }
                error!("Statement failed, connection closed: {}", err);
            });
        }
        Error::Database(err)
    }

    fn log(&self, event: impl FnOnce()) {
        tracing::dispatcher::with_default(&self.dispatch, event);
    }
}

impl fmt::Debug for DbConnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbConnect")
            .field("kind", &self.kind)
            .field("bulk_insert", &self.bulk_insert)
            .field("closed", &self.is_closed())
            .finish()
    }
}
