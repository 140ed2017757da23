//! Connection building, query execution and session lifecycle.
//!
//! All generated SQL flows through the object-safe [`QueryExecutor`] trait.
//! One implementation exists per driver:
//! - `PostgresExecutor`: typed sqlx `PgPool` (feature `postgresql`)
//! - `MySqlExecutor`: typed sqlx `MySqlPool` (feature `mysql`)
//! - `SqlServerExecutor`: native TDS client for SQL Server (feature `mssql`)
//!
//! Executors decode cells by the column's engine type so that decimals,
//! temporal values, UUIDs and JSON reach callers as JSON-safe values.
//!
//! # Security
//! - Sessions are opened read-only where the engine supports it
//! - Connection URLs are redacted before they reach logs or errors

use crate::config::ProfilerConfig;
use crate::dialect::Dialect;
use crate::error::{DbProfilerError, DriverError, Result, redact_database_url};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::time::Duration;

#[cfg(feature = "mssql")]
mod mssql;
#[cfg(feature = "mysql")]
mod mysql;
#[cfg(feature = "postgresql")]
mod postgres;
mod session;
mod url;

#[cfg(feature = "mssql")]
pub use mssql::SqlServerExecutor;
#[cfg(feature = "mysql")]
pub use mysql::MySqlExecutor;
#[cfg(feature = "postgresql")]
pub use postgres::PostgresExecutor;
pub use session::{ProbeOutcome, Session, profile_database, run_with_session, test_connection};
pub use url::{ConnectionSpec, build_connection_url};

/// A single decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer view of the value. Integral floats and numeric text are accepted
    /// because some engines hand back aggregates as `DECIMAL`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Textual view of the value. Bytes are accepted when valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Exact decimal text as a number: integral values become `Int`, others
    /// `Float`. Integral values beyond `i64` stay text to keep every digit.
    pub fn from_decimal_text(text: &str) -> Self {
        let trimmed = text.trim();
        if let Ok(v) = trimmed.parse::<i64>() {
            return Self::Int(v);
        }
        if let Some((whole, fraction)) = trimmed.split_once('.')
            && fraction.bytes().all(|b| b == b'0')
        {
            return whole
                .parse::<i64>()
                .map_or_else(|_| Self::Text(whole.to_string()), Self::Int);
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() => Self::Float(v),
            _ => Self::Text(trimmed.to_string()),
        }
    }

    /// ISO-8601 text without offset, e.g. `2024-01-01T08:00:00`.
    pub fn from_naive_datetime(value: NaiveDateTime) -> Self {
        Self::Text(value.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
    }

    /// ISO-8601 text with a `+00:00` offset.
    pub fn from_utc(value: DateTime<Utc>) -> Self {
        Self::Text(value.to_rfc3339())
    }

    /// Raw wire bytes of a value whose type has no dedicated decoder.
    /// Valid UTF-8 is kept as text.
    pub fn from_raw_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Self::Text(text),
            Err(e) => Self::Bytes(e.into_bytes()),
        }
    }

    /// Converts to a JSON value. Bytes become lowercase hex.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(v) => serde_json::Value::Bool(*v),
            Self::Int(v) => serde_json::Value::from(*v),
            Self::Float(v) => serde_json::Number::from_f64(*v)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Bytes(b) => {
                serde_json::Value::String(b.iter().map(|byte| format!("{:02x}", byte)).collect())
            }
        }
    }
}

/// Column names and decoded rows of one result set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl QueryResult {
    /// First cell of the first row, if any.
    pub fn scalar(&self) -> Option<&SqlValue> {
        self.rows.first().and_then(|row| row.first())
    }

    /// First row, or an empty slice.
    pub fn first_row(&self) -> &[SqlValue] {
        self.rows.first().map_or(&[], Vec::as_slice)
    }
}

/// Read-only SQL execution against one database.
///
/// Implementations own their connection (or pool) and must be safe to share
/// between concurrently profiled tables.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Dialect of the connected engine.
    fn dialect(&self) -> Dialect;

    /// Runs `sql` and returns at most `max_rows` rows (all rows when `None`).
    async fn fetch(
        &self,
        sql: &str,
        max_rows: Option<usize>,
    ) -> std::result::Result<QueryResult, DriverError>;

    /// Releases all connections. Further calls to `fetch` fail.
    async fn close(&self);
}

/// Runs `fetch` under a wall-clock budget.
///
/// A timeout is reported as a boxed `QueryTimeout` so callers can wrap it in
/// their own stage error like any driver failure.
pub(crate) async fn fetch_with_timeout(
    executor: &dyn QueryExecutor,
    sql: &str,
    max_rows: Option<usize>,
    timeout: Duration,
    context: &str,
) -> std::result::Result<QueryResult, DriverError> {
    match tokio::time::timeout(timeout, executor.fetch(sql, max_rows)).await {
        Ok(result) => result,
        Err(_) => Err(Box::new(DbProfilerError::QueryTimeout {
            context: context.to_string(),
            timeout_secs: timeout.as_secs(),
        })),
    }
}

/// Opens an executor for the connection spec.
///
/// # Errors
/// - `UnsupportedFeature` if the dialect's driver is not compiled in
/// - `Connectivity` if the connection cannot be established
pub async fn create_executor(
    spec: &ConnectionSpec,
    config: &ProfilerConfig,
) -> Result<Box<dyn QueryExecutor>> {
    config.validate()?;
    let url = build_connection_url(spec, &config.transport)?;
    tracing::debug!(
        "Opening {} connection to {}",
        spec.dialect,
        redact_database_url(&url)
    );

    match spec.dialect {
        #[cfg(feature = "postgresql")]
        Dialect::PostgreSql => {
            let executor = PostgresExecutor::connect(&url, config).await?;
            Ok(Box::new(executor))
        }
        #[cfg(not(feature = "postgresql"))]
        Dialect::PostgreSql => Err(DbProfilerError::unsupported_feature(
            "PostgreSQL driver (build with --features postgresql)",
            spec.dialect.as_str(),
        )),
        #[cfg(feature = "mysql")]
        Dialect::MySql => {
            let executor = MySqlExecutor::connect(&url, config).await?;
            Ok(Box::new(executor))
        }
        #[cfg(not(feature = "mysql"))]
        Dialect::MySql => Err(DbProfilerError::unsupported_feature(
            "MySQL driver (build with --features mysql)",
            spec.dialect.as_str(),
        )),
        #[cfg(feature = "mssql")]
        Dialect::SqlServer => {
            let executor = SqlServerExecutor::connect(&url, config).await?;
            Ok(Box::new(executor))
        }
        #[cfg(not(feature = "mssql"))]
        Dialect::SqlServer => Err(DbProfilerError::unsupported_feature(
            "SQL Server driver (build with --features mssql)",
            spec.dialect.as_str(),
        )),
    }
}
