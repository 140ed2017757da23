//! Document rendering and output.
//!
//! Every document is checked against its JSON Schema before it leaves the
//! process, whether it goes to a file or to stdout.

use dbprofiler_core::error::DbProfilerError;
use dbprofiler_core::models::{ProfileDocument, SchemaDocument};
use dbprofiler_core::validation::{
    ValidationError, validate_profile_document, validate_schema_document,
};
use dbprofiler_core::Result;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Serializes and validates a schema document.
pub fn render_schema(document: &SchemaDocument) -> Result<String> {
    render(document, "schema", validate_schema_document)
}

/// Serializes and validates a profile document.
pub fn render_profile(document: &ProfileDocument) -> Result<String> {
    render(document, "profile", validate_profile_document)
}

/// Serializes any other JSON payload, such as query results.
pub fn render_json<T: Serialize>(value: &T, kind: &str) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(|e| DbProfilerError::Serialization {
        context: format!("{} output", kind),
        source: e,
    })
}

fn render<T: Serialize>(
    document: &T,
    kind: &str,
    validate: fn(&serde_json::Value) -> std::result::Result<(), ValidationError>,
) -> Result<String> {
    let json_data = render_json(document, kind)?;

    let json_value = serde_json::to_value(document).map_err(|e| DbProfilerError::Serialization {
        context: format!("{} document for validation", kind),
        source: e,
    })?;
    validate(&json_value)?;

    info!("✓ Output validation passed");
    Ok(json_data)
}

/// Writes rendered JSON to `path`, or to stdout when no path is given.
pub async fn emit(json_data: &str, path: Option<&Path>) -> Result<()> {
    match path {
        Some(path) => {
            tokio::fs::write(path, json_data)
                .await
                .map_err(|e| DbProfilerError::Io {
                    context: format!("Failed to write to {}", path.display()),
                    source: e,
                })?;
            info!("✓ Output saved to {}", path.display());
        }
        None => println!("{}", json_data),
    }
    Ok(())
}
