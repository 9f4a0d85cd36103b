//! dbconnect CLI - create tables, load rows and run queries through one connection handle

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use dbconnect::config::{self, DbConnectConfig, SqliteSection};
use dbconnect::ui::{self, Icons};
use dbconnect::value::load_rows;
use dbconnect::DbConnect;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "dbconnect")]
#[command(version)]
#[command(about = "Create tables, bulk-write rows and query SQLite or ODBC databases")]
#[command(long_about = r#"
dbconnect wraps a SQLite file or an ODBC server behind one connection handle.
Every write commits on success; a failed write is rolled back as a whole.

Example usage:
  dbconnect init --database notes.db
  dbconnect create-table --table notes --ddl "CREATE TABLE notes (id INTEGER, body TEXT)" --drop-existing
  dbconnect write --query "INSERT INTO notes VALUES (?, ?)" --rows rows.json
  dbconnect read --query "SELECT * FROM notes"
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print machine-readable JSON instead of styled text
    #[arg(long, global = true)]
    json: bool,

    /// Path to the config file (defaults to ./dbconnect.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database file; overrides the config file
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file pointing at a SQLite database
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Create a table, optionally dropping an existing one first
    CreateTable {
        /// Table name (letters, digits, underscores, optional schema prefix)
        #[arg(short, long)]
        table: String,

        /// CREATE TABLE statement, run verbatim
        #[arg(long)]
        ddl: String,

        /// Drop the table first if it exists
        #[arg(long)]
        drop_existing: bool,
    },

    /// Execute a parameterized statement once per row, as one transaction
    Write {
        /// Statement with one placeholder per column
        #[arg(short, long)]
        query: String,

        /// JSON file holding an array of rows (arrays of scalars); "-" reads stdin
        #[arg(short, long)]
        rows: PathBuf,
    },

    /// Run a query and print every row
    Read {
        /// Query to run
        #[arg(short, long)]
        query: String,

        /// Column headers for the table output, comma separated
        #[arg(long, value_delimiter = ',')]
        headers: Option<Vec<String>>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(err) = run(&cli) {
        if cli.json {
            emit(serde_json::json!({ "error": format!("{:#}", err) }));
        } else {
            ui::failure(&format!("{:#}", err));
        }
        std::process::exit(1);
    }
    Ok(())
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Init { force } => {
            let path = cli.config.clone().unwrap_or_else(config::default_config_path);
            let database = cli
                .database
                .clone()
                .unwrap_or_else(|| config::default_database_path_in(Path::new(".")));
            let cfg = DbConnectConfig {
                bulk_insert: Some(true),
                sqlite: Some(SqliteSection { path: database.clone() }),
                odbc: None,
            };
            config::write_config(&path, &cfg, *force)?;

            if cli.json {
                emit(serde_json::json!({ "config": path, "database": database }));
            } else {
                ui::done(&format!("Wrote {}", path.display()));
                ui::detail("database:", &database.display().to_string());
            }
        }

        Commands::CreateTable { table, ddl, drop_existing } => {
            let mut db = open(cli)?;
            db.create_table(ddl, table, *drop_existing)?;
            db.close()?;

            if cli.json {
                emit(serde_json::json!({ "created": table }));
            } else {
                ui::done(&format!("Created table {}", table));
            }
        }

        Commands::Write { query, rows } => {
            let rows = load_rows(rows, std::io::stdin())
                .with_context(|| format!("cannot load rows from {}", rows.display()))?;
            let mut db = open(cli)?;
            db.write(query, &rows)?;
            db.close()?;

            if cli.json {
                emit(serde_json::json!({ "written": rows.len() }));
            } else {
                println!("{} Wrote {} rows", Icons::WRITE, rows.len());
            }
        }

        Commands::Read { query, headers } => {
            let mut db = open(cli)?;
            let rows = db.read(query)?;
            db.close()?;

            if cli.json {
                emit(serde_json::json!(rows));
            } else {
                if !rows.is_empty() {
                    println!("{}", ui::rows_table(&rows, headers.as_deref(), ui::palette()));
                }
                ui::detail("rows:", &rows.len().to_string());
            }
        }
    }
    Ok(())
}

/// Config file, with `--database` taking precedence over any configured backend.
fn open(cli: &Cli) -> anyhow::Result<DbConnect> {
    let mut cfg = config::load_config(cli.config.as_deref())?.unwrap_or_default();
    if let Some(database) = &cli.database {
        cfg.sqlite = Some(SqliteSection { path: database.clone() });
    }
    if cfg.sqlite.is_none() && cfg.odbc.is_none() {
        anyhow::bail!("no database configured (pass --database or run `dbconnect init`)");
    }

    let target = match &cfg.sqlite {
        Some(sqlite) => sqlite.path.display().to_string(),
        None => cfg
            .odbc
            .as_ref()
            .map(|odbc| {
                let server = odbc.server.as_deref().unwrap_or("<none>");
                let database = odbc.database.as_deref().unwrap_or("<none>");
                format!("{}.{}", server, database)
            })
            .unwrap_or_default(),
    };
    let db = cfg.connect(None)?;
    if !cli.json {
        ui::connected(db.kind(), &target);
    }
    Ok(db)
}

fn emit(data: serde_json::Value) {
    println!("{}", data);
}
