//! Terminal output for the CLI: connection banner, status lines, result tables

use owo_colors::{OwoColorize, Style};
use std::sync::OnceLock;
use tabled::{builder::Builder, settings::Style as TableStyle};
use crate::backend::BackendKind;
use crate::value::{Row, Value};

pub struct Icons;

impl Icons {
    pub const CHECK: &str = "✅";
    pub const CROSS: &str = "❌";
    pub const DATABASE: &str = "🗄️";
    pub const WRITE: &str = "📝";
}

static PALETTE: OnceLock<Palette> = OnceLock::new();

/// Styles used by the CLI; every style is a no-op when stdout is not a terminal.
#[derive(Debug, Clone)]
pub struct Palette {
    pub embedded: Style,
    pub network: Style,
    pub target: Style,
    pub ok: Style,
    pub failure: Style,
    pub label: Style,
    pub null_cell: Style,
}

impl Palette {
    pub fn detect() -> Self {
        if console::Term::stdout().is_term() {
            Self::colored()
        } else {
            Self::plain()
        }
    }

    pub fn colored() -> Self {
        Self {
            embedded: Style::new().cyan().bold(),
            network: Style::new().magenta().bold(),
            target: Style::new().bold(),
            ok: Style::new().green().bold(),
            failure: Style::new().red().bold(),
            label: Style::new().white().dimmed(),
            null_cell: Style::new().bright_black().italic(),
        }
    }

    pub fn plain() -> Self {
        Self {
            embedded: Style::new(),
            network: Style::new(),
            target: Style::new(),
            ok: Style::new(),
            failure: Style::new(),
            label: Style::new(),
            null_cell: Style::new(),
        }
    }

    pub fn backend(&self, kind: BackendKind) -> Style {
        match kind {
            BackendKind::EmbeddedFile => self.embedded.clone(),
            BackendKind::NetworkDriver => self.network.clone(),
        }
    }
}

pub fn palette() -> &'static Palette {
    PALETTE.get_or_init(Palette::detect)
}

pub fn connected_line(kind: BackendKind, target: &str, palette: &Palette) -> String {
    format!(
        "{} {} {}",
        Icons::DATABASE,
        kind.as_str().style(palette.backend(kind)),
        target.style(palette.target.clone())
    )
}

/// Banner printed once a handle is open.
pub fn connected(kind: BackendKind, target: &str) {
    println!("{}", connected_line(kind, target, palette()));
}

pub fn done(message: &str) {
    println!("{} {}", Icons::CHECK, message.style(palette().ok.clone()));
}

pub fn failure(message: &str) {
    eprintln!("{} {}", Icons::CROSS, message.style(palette().failure.clone()));
}

pub fn detail(label: &str, value: &str) {
    println!("  {} {}", label.style(palette().label.clone()), value);
}

fn cell(value: &Value, palette: &Palette) -> String {
    match value {
        Value::Null => "NULL".style(palette.null_cell.clone()).to_string(),
        other => other.to_string(),
    }
}

/// Render result rows as a rounded table. Columns are numbered unless
/// `headers` is given; short rows are padded with empty cells.
pub fn rows_table(rows: &[Row], headers: Option<&[String]>, palette: &Palette) -> String {
    let width = rows
        .iter()
        .map(Vec::len)
        .chain(headers.map(<[String]>::len))
        .max()
        .unwrap_or(0);
    if width == 0 {
        return String::new();
    }

    let mut builder = Builder::default();
    match headers {
        Some(names) => {
            builder.push_record(names.iter().cloned());
        }
        None => {
            builder.push_record((1..=width).map(|i| format!("#{}", i)));
        }
    }
    for row in rows {
        let mut cells: Vec<String> = row.iter().map(|v| cell(v, palette)).collect();
        cells.resize(width, String::new());
        builder.push_record(cells);
    }

    builder.build().with(TableStyle::rounded()).to_string()
}
