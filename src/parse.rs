use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::task::types::{DiscoveredRepo, OperationReport};

/// How much of the offending output a `ParseError` keeps for diagnostics.
const RAW_SNIPPET_LEN: usize = 200;

/// Parse failure carrying the raw output that could not be decoded.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}; raw output: {raw:?}")]
pub struct ParseError {
    pub message: String,
    pub raw: String,
}

impl ParseError {
    fn new(message: impl Into<String>, raw: &str) -> Self {
        let raw = if raw.len() > RAW_SNIPPET_LEN {
            let mut end = RAW_SNIPPET_LEN;
            while !raw.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &raw[..end])
        } else {
            raw.to_string()
        };
        Self {
            message: message.into(),
            raw,
        }
    }
}

/// Parse output expected to be a JSON array of records.
///
/// Empty output means "nothing qualified" and parses to an empty list.
/// A bare object is promoted to a one-element list: the tooling omits the
/// wrapping array when there is exactly one result.
pub fn parse_records<T: DeserializeOwned>(raw: &str) -> Result<Vec<T>, ParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| ParseError::new(e.to_string(), trimmed))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(_) => vec![value],
        _ => {
            return Err(ParseError::new(
                "expected a JSON array or object",
                trimmed,
            ))
        }
    };

    items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item).map_err(|e| ParseError::new(e.to_string(), trimmed))
        })
        .collect()
}

/// Parse discovery output into the repositories it found.
pub fn parse_discovery(raw: &str) -> Result<Vec<DiscoveredRepo>, ParseError> {
    parse_records(raw)
}

/// Parse one operation report.
///
/// Unlike discovery, an operation that printed nothing is a failure: the
/// operation scripts always report a status object.
pub fn parse_operation(raw: &str) -> Result<OperationReport, ParseError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ParseError::new("no output from command", trimmed));
    }
    serde_json::from_str(trimmed).map_err(|e| ParseError::new(e.to_string(), trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::types::OperationStatus;

    #[test]
    fn test_empty_output_is_an_empty_list() {
        assert_eq!(parse_discovery("").unwrap(), vec![]);
        assert_eq!(parse_discovery("   \n").unwrap(), vec![]);
        assert_eq!(parse_discovery("[]").unwrap(), vec![]);
    }

    #[test]
    fn test_single_object_promoted_to_one_element_list() {
        let repos = parse_discovery(r#"{"name":"repoA"}"#).unwrap();
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].name, "repoA");
        assert_eq!(repos[0].pending, 0);
    }

    #[test]
    fn test_array_of_records() {
        let raw = r#"[{"name":"a","path":"/tmp/a","pending":3},{"name":"b","path":"/tmp/b","pending":1}]"#;
        let repos = parse_discovery(raw).unwrap();
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0].pending, 3);
        assert_eq!(repos[1].name, "b");
    }

    #[test]
    fn test_malformed_output_carries_the_raw_text() {
        let err = parse_discovery("not-json{{").unwrap_err();
        assert!(err.raw.contains("not-json"));
    }

    #[test]
    fn test_scalar_output_is_rejected() {
        assert!(parse_discovery("42").is_err());
        assert!(parse_discovery("\"str\"").is_err());
    }

    #[test]
    fn test_parsing_is_pure() {
        let raw = r#"[{"name":"a","path":"/tmp/a","pending":3}]"#;
        assert_eq!(parse_discovery(raw).unwrap(), parse_discovery(raw).unwrap());
    }

    #[test]
    fn test_operation_report() {
        let report =
            parse_operation(r#"{"status":"SUCCESS","repo":"dotfiles","detail":""}"#).unwrap();
        assert_eq!(report.status, OperationStatus::Success);
        assert_eq!(report.repo, "dotfiles");
    }

    #[test]
    fn test_operation_conflict_files() {
        let report = parse_operation(
            r#"{"status":"CONFLICT","repo":"x","detail":"merge conflicts","conflict_files":["a.txt","b.txt"]}"#,
        )
        .unwrap();
        assert_eq!(report.status, OperationStatus::Conflict);
        assert_eq!(report.conflict_files, vec!["a.txt", "b.txt"]);
    }

    #[test]
    fn test_empty_operation_output_is_an_error() {
        let err = parse_operation("").unwrap_err();
        assert!(err.message.contains("no output"));
    }

    #[test]
    fn test_long_raw_output_is_truncated() {
        let raw = "x".repeat(1000);
        let err = parse_discovery(&raw).unwrap_err();
        assert!(err.raw.len() < 250);
        assert!(err.raw.ends_with("..."));
    }
}
