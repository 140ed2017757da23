//! Relational schema extraction and data-quality profiling.
//!
//! Connects to a MySQL, PostgreSQL or SQL Server database, reads the
//! structure of every base table in the current schema and measures, per
//! table, completeness (non-null ratios), freshness (newest temporal value)
//! and key health (primary key nulls and duplicates, foreign key orphans).
//!
//! # Security Guarantees
//! - All database operations are read-only; sessions are opened read-only
//!   where the engine supports it
//! - Identifiers are quoted per dialect; no other database text reaches SQL
//! - No credentials in logs, errors or output documents
//! - Every query runs under a wall-clock timeout
//!
//! # Example
//! ```rust,no_run
//! use dbprofiler_core::connection::{ConnectionSpec, profile_database};
//! use dbprofiler_core::{Dialect, ProfilerConfig};
//!
//! # async fn example() -> dbprofiler_core::Result<()> {
//! let spec = ConnectionSpec::new(Dialect::MySql, "localhost", "shop", "reader", "secret");
//! let (schema, run) = profile_database(&spec, &ProfilerConfig::default()).await?;
//! println!("{} tables, {} profiled", schema.len(), run.profiles.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod dialect;
pub mod error;
pub mod logging;
pub mod models;
pub mod profiler;
pub mod readonly;
pub mod schema;
pub mod sql;
pub mod validation;

// Re-export commonly used types
pub use config::{ProfilerConfig, TransportPolicy};
pub use connection::{ConnectionSpec, QueryExecutor, Session};
pub use dialect::Dialect;
pub use error::{DbProfilerError, ErrorStage, Result};
pub use logging::init_logging;
pub use models::{
    ColumnDescriptor, ForeignKeyRef, KeyStatus, ProfileDocument, ProfileRun, SchemaDocument,
    TableProfile, TableSchema,
};
pub use profiler::extract_profile;
pub use schema::extract_schema;

pub use validation::{
    ValidationError, initialize_validators, validate_profile_document, validate_schema_document,
};
