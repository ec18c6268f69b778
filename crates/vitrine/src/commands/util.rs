//! Shared helpers for command handlers.

use serde_json::{Map, Value};

use crate::cli::DataArgs;
use crate::error::CliError;

/// Parse an inline JSON argument.
pub fn parse_json(field: &str, raw: &str) -> Result<Value, CliError> {
    serde_json::from_str(raw).map_err(|e| CliError::Validation {
        field: field.into(),
        reason: format!("invalid JSON: {e}"),
    })
}

/// Read the `--data` / `--from-file` body.
pub fn read_body(args: &DataArgs) -> Result<Value, CliError> {
    match (&args.data, &args.from_file) {
        (Some(raw), _) => parse_json("data", raw),
        (None, Some(path)) => {
            let contents = std::fs::read_to_string(path)?;
            parse_json("from-file", &contents)
        }
        (None, None) => Err(CliError::Validation {
            field: "data".into(),
            reason: "a JSON document is required".into(),
        }),
    }
}

/// Read a body that must be a JSON object.
pub fn read_object(args: &DataArgs) -> Result<Map<String, Value>, CliError> {
    match read_body(args)? {
        Value::Object(map) => Ok(map),
        other => Err(CliError::Validation {
            field: "data".into(),
            reason: format!("expected a JSON object, got {other}"),
        }),
    }
}
