//! Data-quality profiling engine.
//!
//! For each table, in order: row count, batched non-null counts, freshness
//! of temporal columns, primary key health and foreign key orphan counts.
//! Every statement is generated by [`crate::sql::TableQueries`] and runs
//! under the configured per-query timeout.
//!
//! # Failure policy
//! By default the first failing query aborts the whole run (fail fast).
//! With `continue_on_error`, a failing table is recorded in
//! [`ProfileRun::failures`] and the remaining tables are still profiled.

mod completeness;
mod freshness;
mod key_health;

pub use freshness::parse_timestamp;

use crate::config::ProfilerConfig;
use crate::connection::{QueryExecutor, SqlValue, fetch_with_timeout};
use crate::dialect::Dialect;
use crate::error::{DbProfilerError, Result};
use crate::models::{ProfileRun, TableFailure, TableProfile, TableSchema};
use crate::sql::TableQueries;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use std::time::{Duration, Instant};

/// Profiles every table of `schema`, failing fast on the first error.
///
/// Output order matches `schema` order regardless of concurrency.
///
/// # Errors
/// Returns the first `ProfilingQuery` (or `UnsafeIdentifier`) error. With
/// `continue_on_error` set, failed tables are dropped from the output
/// instead; use [`profile_tables`] to see them.
pub async fn extract_profile(
    executor: &dyn QueryExecutor,
    schema: &[TableSchema],
    config: &ProfilerConfig,
) -> Result<Vec<TableProfile>> {
    Ok(profile_tables(executor, schema, config).await?.profiles)
}

/// Profiles every table of `schema` and reports per-table failures.
///
/// # Errors
/// Returns `Configuration` for an invalid config. Without
/// `continue_on_error`, returns the first table error.
pub async fn profile_tables(
    executor: &dyn QueryExecutor,
    schema: &[TableSchema],
    config: &ProfilerConfig,
) -> Result<ProfileRun> {
    profile_tables_at(executor, schema, config, Utc::now()).await
}

/// Same as [`profile_tables`] with staleness measured against `now`.
pub async fn profile_tables_at(
    executor: &dyn QueryExecutor,
    schema: &[TableSchema],
    config: &ProfilerConfig,
    now: DateTime<Utc>,
) -> Result<ProfileRun> {
    config.validate()?;
    let started = Instant::now();
    tracing::info!(
        "Profiling {} tables ({} at a time)",
        schema.len(),
        config.max_concurrent_tables
    );

    let profiles = futures::stream::iter(
        schema
            .iter()
            .map(|table| profile_table(executor, table, config, now)),
    )
    .buffered(config.max_concurrent_tables);

    let run = if config.continue_on_error {
        let results: Vec<Result<TableProfile>> = profiles.collect().await;
        let mut run = ProfileRun::default();
        for (table, result) in schema.iter().zip(results) {
            match result {
                Ok(profile) => run.profiles.push(profile),
                Err(e) => {
                    tracing::warn!("Skipping table '{}': {}", table.table_name, e);
                    run.failures.push(TableFailure {
                        table_name: table.table_name.clone(),
                        stage: e.stage(),
                        message: e.detailed_message(),
                    });
                }
            }
        }
        run
    } else {
        ProfileRun {
            profiles: profiles.try_collect().await?,
            failures: Vec::new(),
        }
    };

    tracing::info!(
        "Profiled {} tables ({} failed) in {:?}",
        run.profiles.len(),
        run.failures.len(),
        started.elapsed()
    );
    Ok(run)
}

/// Profiles one table.
///
/// # Errors
/// - `Configuration` if `config` fails validation
/// - `ProfilingQuery` naming the table (and column where relevant) if any
///   query fails or times out
pub async fn profile_table(
    executor: &dyn QueryExecutor,
    table: &TableSchema,
    config: &ProfilerConfig,
    now: DateTime<Utc>,
) -> Result<TableProfile> {
    config.validate()?;
    let started = Instant::now();
    let ctx = TableContext::new(executor, table, config)?;

    let completeness = completeness::measure(&ctx).await?;
    let freshness = freshness::measure(&ctx, now).await?;
    let key_health = key_health::measure(&ctx).await?;

    tracing::debug!(
        "Profiled table '{}' ({} rows, {} columns) in {:?}",
        table.table_name,
        completeness.row_count,
        completeness.column_count,
        started.elapsed()
    );

    Ok(TableProfile {
        table_name: table.table_name.clone(),
        completeness,
        freshness,
        key_health,
    })
}

/// Percentage of `part` in `total`, rounded to 2 dp; `None` when `total` is 0.
pub(crate) fn percentage(part: u64, total: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some(round2(part as f64 / total as f64 * 100.0))
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Per-table query context shared by the measurement steps.
struct TableContext<'a> {
    executor: &'a dyn QueryExecutor,
    table: &'a TableSchema,
    queries: TableQueries,
    timeout: Duration,
    count_batch_size: usize,
}

impl<'a> TableContext<'a> {
    fn new(
        executor: &'a dyn QueryExecutor,
        table: &'a TableSchema,
        config: &ProfilerConfig,
    ) -> Result<Self> {
        Ok(Self {
            executor,
            table,
            queries: TableQueries::new(executor.dialect(), &table.table_name)?,
            timeout: config.query_timeout,
            count_batch_size: config.count_batch_size,
        })
    }

    fn dialect(&self) -> Dialect {
        self.executor.dialect()
    }

    fn error(
        &self,
        column: Option<&str>,
        what: &str,
        source: impl Into<crate::error::DriverError>,
    ) -> DbProfilerError {
        DbProfilerError::profiling(&self.table.table_name, column, what, source)
    }

    /// Runs an aggregate query and returns its single row.
    async fn first_row(&self, column: Option<&str>, what: &str, sql: &str) -> Result<Vec<SqlValue>> {
        tracing::trace!("{} on '{}': {}", what, self.table.table_name, sql);
        let result = fetch_with_timeout(self.executor, sql, Some(1), self.timeout, what)
            .await
            .map_err(|e| self.error(column, what, e))?;
        result
            .rows
            .into_iter()
            .next()
            .ok_or_else(|| self.error(column, what, "aggregate query returned no rows"))
    }

    /// Runs a single-count query.
    async fn count(&self, column: Option<&str>, what: &str, sql: &str) -> Result<u64> {
        let row = self.first_row(column, what, sql).await?;
        self.count_at(&row, 0, column, what)
    }

    /// Reads a non-negative count from a result row.
    fn count_at(
        &self,
        row: &[SqlValue],
        index: usize,
        column: Option<&str>,
        what: &str,
    ) -> Result<u64> {
        row.get(index)
            .and_then(SqlValue::as_i64)
            .and_then(|v| u64::try_from(v).ok())
            .ok_or_else(|| {
                self.error(
                    column,
                    what,
                    format!("expected a non-negative count, got {:?}", row.get(index)),
                )
            })
    }
}
