//! JSON Schema validation for the schema and profile documents.
//!
//! Both documents are validated against embedded JSON Schemas before they
//! are written, and again when a saved document is read back. A second pass
//! rejects any string value that looks like a connection URL with embedded
//! credentials.
//!
//! # Example
//! ```rust
//! use dbprofiler_core::validation::validate_schema_document;
//! use serde_json::json;
//!
//! let document = json!({
//!     "schema": [{
//!         "table_name": "orders",
//!         "columns": [{"name": "id", "type": "integer", "nullable": false, "default": "None"}],
//!         "primary_keys": ["id"],
//!         "foreign_keys": []
//!     }]
//! });
//! assert!(validate_schema_document(&document).is_ok());
//! ```

use crate::models::{ProfileDocument, SchemaDocument};
use jsonschema::Validator;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

/// JSON Schema validation errors with field-level reporting
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Embedded schema or pattern failed to compile
    #[error("JSON Schema compilation failed: {message}")]
    SchemaCompilation { message: String },

    /// Document does not match its JSON Schema
    #[error("{document} document validation failed with {error_count} errors: {errors:?}")]
    ValidationFailed {
        document: &'static str,
        error_count: usize,
        errors: Vec<String>,
    },

    /// A value looks like a credential-bearing connection string
    #[error("Security validation failed: {reason}")]
    SecurityViolation { reason: String },

    /// JSON parsing error
    #[error("JSON parsing failed: {source}")]
    JsonParsing {
        #[from]
        source: serde_json::Error,
    },
}

const SCHEMA_DOCUMENT_SCHEMA: &str = r##"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "title": "dbprofiler schema document",
  "type": "object",
  "required": ["schema"],
  "additionalProperties": false,
  "properties": {
    "schema": { "type": "array", "items": { "$ref": "#/$defs/table" } }
  },
  "$defs": {
    "table": {
      "type": "object",
      "required": ["table_name", "columns", "primary_keys", "foreign_keys"],
      "properties": {
        "table_name": { "type": "string", "minLength": 1 },
        "columns": { "type": "array", "items": { "$ref": "#/$defs/column" } },
        "primary_keys": { "type": "array", "items": { "type": "string" } },
        "foreign_keys": { "type": "array", "items": { "$ref": "#/$defs/foreign_key" } }
      }
    },
    "column": {
      "type": "object",
      "required": ["name", "type", "nullable", "default"],
      "properties": {
        "name": { "type": "string", "minLength": 1 },
        "type": { "type": "string" },
        "nullable": { "type": "boolean" },
        "default": { "type": "string" }
      }
    },
    "foreign_key": {
      "type": "object",
      "required": ["column", "referred_table", "referred_columns"],
      "properties": {
        "column": { "type": "array", "items": { "type": "string" } },
        "referred_table": { "type": "string" },
        "referred_columns": { "type": "array", "items": { "type": "string" } },
        "referred_schema": { "type": "string" }
      }
    }
  }
}"##;

const PROFILE_DOCUMENT_SCHEMA: &str = r##"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "title": "dbprofiler profile document",
  "type": "object",
  "required": ["profile"],
  "additionalProperties": false,
  "properties": {
    "profile": { "type": "array", "items": { "$ref": "#/$defs/table_profile" } }
  },
  "$defs": {
    "count": { "type": "integer", "minimum": 0 },
    "optional_count": { "type": ["integer", "null"], "minimum": 0 },
    "optional_pct": { "type": ["number", "null"], "minimum": 0, "maximum": 100 },
    "strings": { "type": "array", "items": { "type": "string" } },
    "table_profile": {
      "type": "object",
      "required": ["table_name", "completeness", "freshness", "key_health"],
      "properties": {
        "table_name": { "type": "string", "minLength": 1 },
        "completeness": { "$ref": "#/$defs/completeness" },
        "freshness": { "$ref": "#/$defs/freshness" },
        "key_health": { "$ref": "#/$defs/key_health" }
      }
    },
    "completeness": {
      "type": "object",
      "required": ["row_count", "column_count", "non_null_cells", "null_cells", "table_completeness_pct", "columns"],
      "properties": {
        "row_count": { "$ref": "#/$defs/count" },
        "column_count": { "$ref": "#/$defs/count" },
        "non_null_cells": { "$ref": "#/$defs/count" },
        "null_cells": { "$ref": "#/$defs/count" },
        "table_completeness_pct": { "$ref": "#/$defs/optional_pct" },
        "columns": {
          "type": "array",
          "items": {
            "type": "object",
            "required": ["column", "non_null_count", "null_count", "completeness_pct"],
            "properties": {
              "column": { "type": "string" },
              "non_null_count": { "$ref": "#/$defs/count" },
              "null_count": { "$ref": "#/$defs/count" },
              "completeness_pct": { "$ref": "#/$defs/optional_pct" }
            }
          }
        }
      }
    },
    "freshness": {
      "type": "object",
      "required": ["temporal_columns_checked", "latest_column", "latest_timestamp", "staleness_days", "columns"],
      "properties": {
        "temporal_columns_checked": { "$ref": "#/$defs/count" },
        "latest_column": { "type": ["string", "null"] },
        "latest_timestamp": { "type": ["string", "null"] },
        "staleness_days": { "type": ["number", "null"] },
        "columns": {
          "type": "array",
          "items": {
            "type": "object",
            "required": ["column", "latest_value"],
            "properties": {
              "column": { "type": "string" },
              "latest_value": { "type": ["string", "null"] }
            }
          }
        }
      }
    },
    "key_health": {
      "type": "object",
      "required": ["status", "primary_key", "foreign_keys"],
      "properties": {
        "status": { "enum": ["healthy", "issues_found", "missing_primary_key"] },
        "primary_key": {
          "type": "object",
          "required": ["columns", "null_rows", "duplicate_groups", "duplicate_rows"],
          "properties": {
            "columns": { "$ref": "#/$defs/strings" },
            "null_rows": { "$ref": "#/$defs/optional_count" },
            "duplicate_groups": { "$ref": "#/$defs/optional_count" },
            "duplicate_rows": { "$ref": "#/$defs/optional_count" }
          }
        },
        "foreign_keys": {
          "type": "object",
          "required": ["relationships_checked", "orphan_rows", "details"],
          "properties": {
            "relationships_checked": { "$ref": "#/$defs/count" },
            "orphan_rows": { "$ref": "#/$defs/count" },
            "details": {
              "type": "array",
              "items": {
                "type": "object",
                "required": ["local_columns", "referred_table", "referred_columns", "orphan_rows"],
                "properties": {
                  "local_columns": { "$ref": "#/$defs/strings" },
                  "referred_table": { "type": "string" },
                  "referred_columns": { "$ref": "#/$defs/strings" },
                  "orphan_rows": { "$ref": "#/$defs/count" }
                }
              }
            },
            "skipped": {
              "type": "array",
              "items": {
                "type": "object",
                "required": ["local_columns", "referred_table", "referred_columns", "reason"]
              }
            }
          }
        }
      }
    }
  }
}"##;

/// Credential-bearing database URL (`scheme://user:password@`).
const CONNECTION_STRING_PATTERN: &str =
    r"(?i)\b(postgres(ql)?|mysql|mariadb|mssql|sqlserver)://[^\s/@:]+:[^\s@]+@";

/// Compiled validators; compilation errors are kept so every caller sees them.
static SCHEMA_VALIDATOR: OnceLock<Result<Validator, String>> = OnceLock::new();
static PROFILE_VALIDATOR: OnceLock<Result<Validator, String>> = OnceLock::new();
static CONNECTION_STRING: OnceLock<Result<Regex, String>> = OnceLock::new();

fn compile(source: &str) -> Result<Validator, String> {
    let schema: Value = serde_json::from_str(source)
        .map_err(|e| format!("Failed to parse embedded schema: {}", e))?;
    jsonschema::validator_for(&schema).map_err(|e| format!("Schema compilation error: {}", e))
}

fn cached<T>(
    cell: &'static OnceLock<Result<T, String>>,
    init: impl FnOnce() -> Result<T, String>,
) -> Result<&'static T, ValidationError> {
    cell.get_or_init(init)
        .as_ref()
        .map_err(|message| ValidationError::SchemaCompilation {
            message: message.clone(),
        })
}

/// Compiles the embedded schemas and patterns up front.
///
/// Calling this is optional; validators compile lazily on first use.
///
/// # Errors
/// Returns `SchemaCompilation` if an embedded schema is invalid.
pub fn initialize_validators() -> Result<(), ValidationError> {
    cached(&SCHEMA_VALIDATOR, || compile(SCHEMA_DOCUMENT_SCHEMA))?;
    cached(&PROFILE_VALIDATOR, || compile(PROFILE_DOCUMENT_SCHEMA))?;
    connection_string_pattern()?;
    Ok(())
}

fn connection_string_pattern() -> Result<&'static Regex, ValidationError> {
    cached(&CONNECTION_STRING, || {
        Regex::new(CONNECTION_STRING_PATTERN).map_err(|e| e.to_string())
    })
}

/// Validates a `{"schema": [...]}` document.
///
/// # Errors
/// Returns `ValidationFailed` with every schema violation, or
/// `SecurityViolation` if a value embeds connection credentials.
pub fn validate_schema_document(json_value: &Value) -> Result<(), ValidationError> {
    let validator = cached(&SCHEMA_VALIDATOR, || compile(SCHEMA_DOCUMENT_SCHEMA))?;
    validate_with(validator, "schema", json_value)
}

/// Validates a `{"profile": [...]}` document.
///
/// # Errors
/// Returns `ValidationFailed` with every schema violation, or
/// `SecurityViolation` if a value embeds connection credentials.
pub fn validate_profile_document(json_value: &Value) -> Result<(), ValidationError> {
    let validator = cached(&PROFILE_VALIDATOR, || compile(PROFILE_DOCUMENT_SCHEMA))?;
    validate_with(validator, "profile", json_value)
}

fn validate_with(
    validator: &Validator,
    document: &'static str,
    json_value: &Value,
) -> Result<(), ValidationError> {
    let errors: Vec<String> = validator
        .iter_errors(json_value)
        .map(|error| error.to_string())
        .collect();
    if !errors.is_empty() {
        return Err(ValidationError::ValidationFailed {
            document,
            error_count: errors.len(),
            errors,
        });
    }

    validate_no_connection_strings(json_value, "", connection_string_pattern()?)
}

/// Recursively check string values for credential-bearing connection URLs
fn validate_no_connection_strings(
    value: &Value,
    path: &str,
    pattern: &Regex,
) -> Result<(), ValidationError> {
    match value {
        Value::String(s) if pattern.is_match(s) => Err(ValidationError::SecurityViolation {
            reason: format!("Connection string with credentials found at path '{}'", path),
        }),
        Value::Object(obj) => {
            for (key, val) in obj {
                let new_path = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                validate_no_connection_strings(val, &new_path, pattern)?;
            }
            Ok(())
        }
        Value::Array(arr) => {
            for (index, item) in arr.iter().enumerate() {
                validate_no_connection_strings(item, &format!("{}[{}]", path, index), pattern)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Parses and validates a saved schema document.
///
/// # Errors
/// Returns `JsonParsing` for malformed JSON, otherwise as
/// [`validate_schema_document`].
pub fn validate_and_parse_schema(json_str: &str) -> Result<SchemaDocument, ValidationError> {
    let json_value: Value = serde_json::from_str(json_str)?;
    validate_schema_document(&json_value)?;
    Ok(serde_json::from_value(json_value)?)
}

/// Parses and validates a saved profile document.
///
/// # Errors
/// Returns `JsonParsing` for malformed JSON, otherwise as
/// [`validate_profile_document`].
pub fn validate_and_parse_profile(json_str: &str) -> Result<ProfileDocument, ValidationError> {
    let json_value: Value = serde_json::from_str(json_str)?;
    validate_profile_document(&json_value)?;
    Ok(serde_json::from_value(json_value)?)
}

#[cfg(test)]
mod tests;
