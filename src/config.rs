use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::Dispatch;
use crate::connect::{ConnectBuilder, DbConnect};
use crate::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DbConnectConfig {
    pub bulk_insert: Option<bool>,
    pub sqlite: Option<SqliteSection>,
    pub odbc: Option<OdbcSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SqliteSection {
    pub path: PathBuf,
}

/// Credential parts as written in the file; completeness is checked on connect.
#[derive(Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct OdbcSection {
    pub driver: Option<String>,
    pub server: Option<String>,
    pub database: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl std::fmt::Debug for OdbcSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OdbcSection")
            .field("driver", &self.driver)
            .field("server", &self.server)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl DbConnectConfig {
    /// Open a handle for this configuration. SQLite wins when both sections are set.
    pub fn connect(&self, log_sink: Option<Dispatch>) -> Result<DbConnect> {
        let mut builder = ConnectBuilder::new();
        if let Some(sink) = log_sink {
            builder = builder.log_sink(sink);
        }
        if let Some(bulk) = self.bulk_insert {
            builder = builder.bulk_insert(bulk);
        }

        if let Some(sqlite) = &self.sqlite {
            ensure_db_dir(&sqlite.path)?;
            let conn = rusqlite::Connection::open(&sqlite.path)?;
            return builder.connection(conn).build();
        }

        let Some(odbc) = &self.odbc else {
            return Err(Error::Config(
                "no [sqlite] or [odbc] section configured".to_string(),
            ));
        };
        if let Some(v) = &odbc.driver {
            builder = builder.driver(v);
        }
        if let Some(v) = &odbc.server {
            builder = builder.server(v);
        }
        if let Some(v) = &odbc.database {
            builder = builder.database(v);
        }
        if let Some(v) = &odbc.user {
            builder = builder.user(v);
        }
        if let Some(v) = &odbc.password {
            builder = builder.password(v);
        }
        builder.build()
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("dbconnect.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".dbconnect").join("records.db")
}

pub fn load_config(path: Option<&Path>) -> Result<Option<DbConnectConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: DbConnectConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &DbConnectConfig, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(Error::Config(format!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        )));
    }

    let contents = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("cannot serialize config: {}", e)))?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BackendKind;

    #[test]
    fn test_load_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("nope.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dbconnect.toml");
        let config = DbConnectConfig {
            bulk_insert: Some(false),
            sqlite: Some(SqliteSection { path: default_database_path_in(dir.path()) }),
            odbc: None,
        };

        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());
        write_config(&path, &config, true).unwrap();

        assert_eq!(load_config(Some(&path)).unwrap(), Some(config));
    }

    #[test]
    fn test_parse_odbc_section() {
        let config: DbConnectConfig = toml::from_str(
            r#"
            [odbc]
            driver = "ODBC Driver 18 for SQL Server"
            server = "db01"
            database = "notes"
            user = "pipeline"
            "#,
        )
        .unwrap();
        let odbc = config.odbc.clone().unwrap();
        assert_eq!(odbc.server.as_deref(), Some("db01"));
        assert!(odbc.password.is_none());

        // password missing
        assert!(matches!(config.connect(None), Err(Error::Config(_))));
    }

    #[test]
    fn test_connect_sqlite_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = default_database_path_in(dir.path());
        let config = DbConnectConfig {
            sqlite: Some(SqliteSection { path: db_path.clone() }),
            ..Default::default()
        };

        let db = config.connect(None).unwrap();
        assert_eq!(db.kind(), BackendKind::EmbeddedFile);
        assert!(db_path.exists());
        db.close().unwrap();
    }

    #[test]
    fn test_empty_config_is_rejected() {
        assert!(matches!(DbConnectConfig::default().connect(None), Err(Error::Config(_))));
    }

    #[test]
    fn test_debug_hides_password() {
        let section = OdbcSection {
            password: Some("hunter2".into()),
            ..Default::default()
        };
        assert!(!format!("{:?}", section).contains("hunter2"));
    }
}
