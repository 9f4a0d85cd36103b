//! SQL identifier validation
//!
//! Table and column names cannot be bound as parameters, so any name that is
//! formatted into statement text must pass [`validate_identifier`] first.

use regex::Regex;
use std::sync::OnceLock;
use crate::{Error, Result};

/// A name, optionally prefixed by a single `schema.` part (e.g. `dbo.notes`).
const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$";

static IDENTIFIER: OnceLock<Regex> = OnceLock::new();

fn identifier_regex() -> &'static Regex {
    IDENTIFIER.get_or_init(|| Regex::new(IDENTIFIER_PATTERN).expect("identifier pattern is valid"))
}

/// Check that `identifier` is safe to interpolate into SQL.
///
/// `role` names the identifier in error messages ("table name", "column name").
/// Returns the input unchanged; nothing is quoted or rewritten.
pub fn validate_identifier<'a>(identifier: &'a str, role: &str) -> Result<&'a str> {
    if identifier.is_empty() {
        return Err(Error::InvalidIdentifier {
            role: role.to_string(),
            identifier: String::new(),
            reason: format!("SQL {} cannot be empty", role),
        });
    }

    if !identifier_regex().is_match(identifier) {
        return Err(Error::InvalidIdentifier {
            role: role.to_string(),
            identifier: identifier.to_string(),
            reason: format!(
                "Invalid SQL {}: '{}'. Identifiers must start with a letter or underscore and contain only \
                 alphanumeric characters, underscores, and optionally a schema prefix (e.g., 'dbo.tablename').",
                role, identifier
            ),
        });
    }

    Ok(identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers_pass_unchanged() {
        for name in ["patients", "dbo.notes", "_tmp1", "Notes_2024", "_._"] {
            assert_eq!(validate_identifier(name, "table name").unwrap(), name);
        }
    }

    #[test]
    fn test_empty_identifier() {
        let err = validate_identifier("", "table name").unwrap_err();
        assert_eq!(err.to_string(), "SQL table name cannot be empty");
    }

    #[test]
    fn test_rejects_injection_and_malformed_names() {
        let bad = [
            "1table",
            "notes; DROP TABLE x",
            "notes--",
            "a.b.c",
            ".notes",
            "notes.",
            "no tes",
            "notes*",
            "'notes'",
            "\"notes\"",
            "notes\n",
            "dbo..notes",
        ];
        for name in bad {
            assert!(validate_identifier(name, "table name").is_err(), "accepted {:?}", name);
        }
    }

    #[test]
    fn test_error_carries_role_and_identifier() {
        match validate_identifier("1table", "column name") {
            Err(Error::InvalidIdentifier { role, identifier, reason }) => {
                assert_eq!(role, "column name");
                assert_eq!(identifier, "1table");
                assert!(reason.starts_with("Invalid SQL column name: '1table'."));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_non_ascii_letters() {
        assert!(validate_identifier("notés", "table name").is_err());
    }
}
