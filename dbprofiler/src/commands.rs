//! Subcommand handlers.

use crate::cli::{Command, ListArgs, ProfileArgs, QueryArgs, SchemaArgs, TestArgs};
use crate::output;
use dbprofiler_core::connection::{profile_database, run_with_session, test_connection};
use dbprofiler_core::error::DbProfilerError;
use dbprofiler_core::models::{ProfileDocument, SchemaDocument};
use dbprofiler_core::validation::{validate_and_parse_profile, validate_and_parse_schema};
use dbprofiler_core::Result;
use tracing::{error, info, warn};

/// Dispatches a parsed command.
pub async fn run(command: &Command) -> Result<()> {
    match command {
        Command::Test(args) => check_connection(args).await,
        Command::Schema(args) => schema(args).await,
        Command::Profile(args) => profile(args).await,
        Command::Query(args) => query(args).await,
        Command::List(args) => list(args).await,
    }
}

/// Tests database connection without extracting anything
async fn check_connection(args: &TestArgs) -> Result<()> {
    let spec = args.target.spec()?;
    let config = args.target.config()?;
    info!(
        "Testing {} connection to {}:{}...",
        spec.dialect, spec.host, spec.port
    );

    let outcome = test_connection(&spec, &config).await;
    if !outcome.ok {
        error!("Connection test failed: {}", outcome.message);
        return Err(DbProfilerError::connectivity(
            format!("connection test against '{}' failed", spec.database),
            outcome.message,
        ));
    }

    info!("✓ Connection test successful");
    println!(
        "Connection to {} database '{}' successful",
        spec.dialect, spec.database
    );
    Ok(())
}

async fn schema(args: &SchemaArgs) -> Result<()> {
    let spec = args.target.spec()?;
    let config = args.target.config()?;
    info!("Starting schema extraction on '{}'...", spec.database);

    let tables = run_with_session(&spec, &config, async |session| {
        session.extract_schema().await
    })
    .await
    .map_err(|e| {
        error!("Schema extraction failed: {}", e);
        e
    })?;

    info!("✓ Schema extraction completed");
    info!("Found {} tables", tables.len());

    let document = SchemaDocument { schema: tables };
    let json_data = output::render_schema(&document)?;
    output::emit(&json_data, args.output.output.as_deref()).await
}

async fn profile(args: &ProfileArgs) -> Result<()> {
    let spec = args.target.spec()?;
    let config = args.target.config()?;
    info!("Starting profiling run on '{}'...", spec.database);

    let (tables, run) = profile_database(&spec, &config).await.map_err(|e| {
        error!("Profiling failed: {}", e);
        e
    })?;

    for failure in &run.failures {
        warn!(
            "Table '{}' skipped ({} stage): {}",
            failure.table_name, failure.stage, failure.message
        );
    }
    if run.is_complete() {
        info!("✓ Profiled {} tables", run.profiles.len());
    } else {
        warn!(
            "Profiled {} of {} tables; {} failed",
            run.profiles.len(),
            tables.len(),
            run.failures.len()
        );
    }

    if let Some(path) = &args.schema_output {
        let json_data = output::render_schema(&SchemaDocument { schema: tables })?;
        output::emit(&json_data, Some(path)).await?;
    }

    let json_data = output::render_profile(&run.into_document())?;
    output::emit(&json_data, args.output.output.as_deref()).await
}

async fn query(args: &QueryArgs) -> Result<()> {
    let spec = args.target.spec()?;
    let config = args.target.config()?;

    let result = run_with_session(&spec, &config, async |session| {
        session
            .query_session()
            .execute(&args.sql, args.limit)
            .await
    })
    .await
    .map_err(|e| {
        error!("Query failed: {}", e);
        e
    })?;

    let json_data = output::render_json(&result, "query")?;
    output::emit(&json_data, args.output.output.as_deref()).await
}

async fn list(args: &ListArgs) -> Result<()> {
    let json_str = tokio::fs::read_to_string(&args.file)
        .await
        .map_err(|e| DbProfilerError::Io {
            context: format!("Failed to read {}", args.file.display()),
            source: e,
        })?;

    let lines = summarize_document(&json_str, args.table.as_deref())?;
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

/// Validates a saved document and renders one line per table.
///
/// The document kind is taken from its top-level key.
///
/// # Errors
/// - `Serialization` if the file is not JSON
/// - `Validation` if the document fails its JSON Schema
/// - `Configuration` if the kind is unknown or `table` is not in the document
pub fn summarize_document(json_str: &str, table: Option<&str>) -> Result<Vec<String>> {
    let value: serde_json::Value =
        serde_json::from_str(json_str).map_err(|e| DbProfilerError::Serialization {
            context: "saved document".to_string(),
            source: e,
        })?;

    let lines = if value.get("schema").is_some() {
        summarize_schema(&validate_and_parse_schema(json_str)?, table)
    } else if value.get("profile").is_some() {
        summarize_profile(&validate_and_parse_profile(json_str)?, table)
    } else {
        return Err(DbProfilerError::configuration(
            "document has neither a 'schema' nor a 'profile' key",
        ));
    };

    match table {
        Some(name) if lines.is_empty() => Err(DbProfilerError::configuration(format!(
            "table '{}' not found in document",
            name
        ))),
        _ => Ok(lines),
    }
}

fn summarize_schema(document: &SchemaDocument, table: Option<&str>) -> Vec<String> {
    document
        .schema
        .iter()
        .filter(|t| table.is_none_or(|name| t.table_name == name))
        .map(|t| {
            format!(
                "{}: {} columns, primary key [{}], {} foreign keys",
                t.table_name,
                t.columns.len(),
                t.primary_key.join(", "),
                t.foreign_keys.len()
            )
        })
        .collect()
}

fn summarize_profile(document: &ProfileDocument, table: Option<&str>) -> Vec<String> {
    document
        .profile
        .iter()
        .filter(|p| table.is_none_or(|name| p.table_name == name))
        .map(|p| {
            format!(
                "{}: {} rows, completeness {}, staleness {}, keys {}",
                p.table_name,
                p.completeness.row_count,
                p.completeness
                    .table_completeness_pct
                    .map_or_else(|| "n/a".to_string(), |pct| format!("{:.2}%", pct)),
                p.freshness
                    .staleness_days
                    .map_or_else(|| "n/a".to_string(), |days| format!("{:.2} days", days)),
                p.key_health.status.as_str()
            )
        })
        .collect()
}
