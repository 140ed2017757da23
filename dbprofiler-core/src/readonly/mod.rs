//! Read-only ad hoc query execution.
//!
//! Every statement passes [`validate_read_only_sql`] before it reaches the
//! driver, runs under a hard timeout and returns at most
//! [`MAX_ROW_LIMIT`] rows. PostgreSQL and MySQL sessions are additionally
//! opened in read-only transaction mode.
//!
//! Decimal, temporal, UUID and JSON columns come back as JSON-safe numbers or
//! ISO-8601 text; see [`SqlValue`](crate::connection::SqlValue).

mod guard;

pub use guard::{BLOCKED_KEYWORDS, validate_read_only_sql};

use crate::connection::QueryExecutor;
use crate::error::{DbProfilerError, Result};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Upper bound on returned rows.
pub const MAX_ROW_LIMIT: usize = 200;

/// Hard wall-clock budget for one ad hoc query.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Rows and metadata of a successful read-only query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadOnlyQueryResult {
    pub columns: Vec<String>,
    /// One JSON object per row, keyed by column name
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub row_count: usize,
    /// More rows were available than `row_limit_applied`
    pub truncated: bool,
    pub row_limit_applied: usize,
    pub execution_ms: u64,
    pub query: String,
    pub database: String,
}

/// Clamps a requested row limit into `1..=MAX_ROW_LIMIT`.
pub fn normalize_row_limit(requested: Option<usize>) -> usize {
    requested.unwrap_or(MAX_ROW_LIMIT).clamp(1, MAX_ROW_LIMIT)
}

/// Explicit connection context for ad hoc queries against one database.
pub struct QuerySession<'a> {
    executor: &'a dyn QueryExecutor,
    database: String,
    timeout: Duration,
}

impl<'a> QuerySession<'a> {
    pub fn new(executor: &'a dyn QueryExecutor, database: impl Into<String>) -> Self {
        Self {
            executor,
            database: database.into(),
            timeout: QUERY_TIMEOUT,
        }
    }

    /// Overrides the hard timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Validates and runs one read-only statement.
    ///
    /// `row_limit` defaults to and is capped at [`MAX_ROW_LIMIT`]; one extra
    /// row is fetched to detect truncation.
    ///
    /// # Errors
    /// - `UnsafeSql` if the statement fails the allow-list
    /// - `QueryTimeout` if the query exceeds the hard timeout
    /// - `QueryExecution` if the driver rejects the query
    pub async fn execute(&self, sql: &str, row_limit: Option<usize>) -> Result<ReadOnlyQueryResult> {
        if let Err(e) = validate_read_only_sql(sql, self.executor.dialect()) {
            tracing::warn!("Rejected ad hoc query on '{}': {}", self.database, e);
            return Err(e);
        }

        let query = sql.trim();
        let statement = query.trim_end_matches(|c: char| c == ';' || c.is_whitespace());
        let limit = normalize_row_limit(row_limit);
        let started = Instant::now();

        let result = tokio::time::timeout(self.timeout, self.executor.fetch(statement, Some(limit + 1)))
            .await
            .map_err(|_| DbProfilerError::QueryTimeout {
                context: format!("read-only query on '{}'", self.database),
                timeout_secs: self.timeout.as_secs(),
            })?
            .map_err(|e| DbProfilerError::QueryExecution {
                context: format!("read-only query on '{}'", self.database),
                source: e,
            })?;

        let truncated = result.rows.len() > limit;
        let rows: Vec<_> = result
            .rows
            .iter()
            .take(limit)
            .map(|row| {
                result
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().map(|value| value.to_json()))
                    .collect::<serde_json::Map<_, _>>()
            })
            .collect();
        let execution_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        tracing::info!(
            "Read-only query on '{}' returned {} rows{} in {}ms",
            self.database,
            rows.len(),
            if truncated { " (truncated)" } else { "" },
            execution_ms
        );

        Ok(ReadOnlyQueryResult {
            columns: result.columns,
            row_count: rows.len(),
            rows,
            truncated,
            row_limit_applied: limit,
            execution_ms,
            query: query.to_string(),
            database: self.database.clone(),
        })
    }
}
