//! Row values shared by both backends

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::Serialize;
use std::fmt;
use std::io::Read;
use std::path::Path;
use crate::{Error, Result};

/// One row: values in placeholder (for writes) or column (for reads) order.
pub type Row = Vec<Value>;

/// A single bindable or fetched value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Bool(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "{}", s),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = String;

    fn try_from(json: serde_json::Value) -> std::result::Result<Self, Self::Error> {
        match json {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(Value::Integer(i))
                } else {
                    n.as_f64()
                        .map(Value::Real)
                        .ok_or_else(|| format!("number out of range: {}", n))
                }
            }
            serde_json::Value::String(s) => Ok(Value::Text(s)),
            other => Err(format!("expected a scalar, got {}", other)),
        }
    }
}

/// Parse a JSON array of rows, each an array of scalars.
pub fn parse_rows(json: &str) -> Result<Vec<Row>> {
    let raw: Vec<Vec<serde_json::Value>> = serde_json::from_str(json)
        .map_err(|e| Error::InvalidRows(format!("expected a JSON array of arrays: {}", e)))?;
    raw.into_iter()
        .enumerate()
        .map(|(i, row)| {
            row.into_iter()
                .map(Value::try_from)
                .collect::<std::result::Result<Row, String>>()
                .map_err(|e| Error::InvalidRows(format!("row {}: {}", i, e)))
        })
        .collect()
}

/// Read rows from `path`, or from `stdin` when the path is `-`.
pub fn load_rows(path: &Path, mut stdin: impl Read) -> Result<Vec<Row>> {
    let contents = if path == Path::new("-") {
        let mut buf = String::new();
        stdin.read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };
    parse_rows(&contents)
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let out = match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(r) => ToSqlOutput::Borrowed(ValueRef::Real(*r)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            // SQLite has no boolean storage class
            Value::Bool(b) => ToSqlOutput::Borrowed(ValueRef::Integer(*b as i64)),
        };
        Ok(out)
    }
}

impl FromSql for Value {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(r) => Value::Real(r),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_scalars() {
        let row: Vec<Value> = serde_json::json!([1, 2.5, "note", true, null])
            .as_array()
            .unwrap()
            .iter()
            .cloned()
            .map(|v| Value::try_from(v).unwrap())
            .collect();
        assert_eq!(
            row,
            vec![
                Value::Integer(1),
                Value::Real(2.5),
                Value::Text("note".into()),
                Value::Bool(true),
                Value::Null,
            ]
        );
    }

    #[test]
    fn test_from_json_rejects_nested() {
        assert!(Value::try_from(serde_json::json!([1])).is_err());
        assert!(Value::try_from(serde_json::json!({"a": 1})).is_err());
    }

    #[test]
    fn test_parse_rows() {
        let rows = parse_rows(r#"[[1, "first", null], [2, "second", false]]"#).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec![Value::Integer(1), Value::from("first"), Value::Null]);
        assert_eq!(rows[1][2], Value::Bool(false));
        assert!(parse_rows("[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rows_names_bad_row() {
        let err = parse_rows(r#"[[1, "ok"], [2, {"nested": true}]]"#).unwrap_err();
        assert!(matches!(err, Error::InvalidRows(_)));
        assert!(err.to_string().contains("row 1: expected a scalar"));

        // not an array of arrays
        assert!(matches!(parse_rows(r#"{"id": 1}"#), Err(Error::InvalidRows(_))));
        assert!(matches!(parse_rows("[1, 2]"), Err(Error::InvalidRows(_))));
    }

    #[test]
    fn test_load_rows_from_stdin_and_file() {
        let rows = load_rows(Path::new("-"), &b"[[7, \"from stdin\"]]"[..]).unwrap();
        assert_eq!(rows, vec![vec![Value::Integer(7), Value::from("from stdin")]]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.json");
        std::fs::write(&path, "[[1.5], [null]]").unwrap();
        let rows = load_rows(&path, std::io::empty()).unwrap();
        assert_eq!(rows, vec![vec![Value::Real(1.5)], vec![Value::Null]]);

        assert!(matches!(
            load_rows(&dir.path().join("missing.json"), std::io::empty()),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_serialize_untagged() {
        let row = vec![Value::Integer(3), Value::Text("x".into()), Value::Null];
        assert_eq!(serde_json::to_string(&row).unwrap(), r#"[3,"x",null]"#);
    }

    #[test]
    fn test_display_and_option() {
        assert_eq!(Value::from(None::<i64>).to_string(), "NULL");
        assert_eq!(Value::from(Some("a")).to_string(), "a");
        assert_eq!(Value::Blob(vec![0, 1, 2]).to_string(), "<3 bytes>");
        assert_eq!(Value::Bool(true).as_i64(), Some(1));
    }
}
