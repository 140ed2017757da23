//! MySQL and MariaDB executor over a typed sqlx pool.

use super::{QueryExecutor, QueryResult, SqlValue};
use crate::config::ProfilerConfig;
use crate::dialect::{Dialect, ServerFlavor};
use crate::error::{DbProfilerError, DriverError, Result, redact_database_url};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::types::{BigDecimal, JsonValue};
use sqlx::{Column, Executor, Row, TypeInfo, ValueRef};

/// Pooled MySQL executor.
///
/// Each new connection reads `VERSION()` to pick the statement limit its
/// server family understands, then applies the dialect's session setup.
#[derive(Debug, Clone)]
pub struct MySqlExecutor {
    pool: MySqlPool,
}

impl MySqlExecutor {
    /// Connects a pool and verifies that one connection can be established.
    ///
    /// # Errors
    /// Returns `Connectivity` with a redacted URL if the pool cannot connect
    /// or the session setup is refused.
    pub async fn connect(url: &str, config: &ProfilerConfig) -> Result<Self> {
        let statement_timeout = config.query_timeout;
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections.min(100))
            .acquire_timeout(config.connect_timeout)
            .test_before_acquire(true)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    let version: String = sqlx::query_scalar("SELECT VERSION()")
                        .fetch_one(&mut *conn)
                        .await?;
                    let flavor = ServerFlavor::from_version(&version);
                    tracing::debug!("Connected to {} ({:?})", version, flavor);
                    for statement in Dialect::MySql.session_setup(statement_timeout, flavor) {
                        conn.execute(statement.as_str()).await?;
                    }
                    Ok(())
                })
            })
            .connect(url)
            .await
            .map_err(|e| {
                DbProfilerError::connectivity(
                    format!("Failed to connect to {}", redact_database_url(url)),
                    e,
                )
            })?;

        Ok(Self { pool })
    }
}

/// Decodes one cell by its MySQL type name.
fn decode_value(row: &MySqlRow, index: usize) -> std::result::Result<SqlValue, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(SqlValue::Null);
    }
    let type_name = row.column(index).type_info().name();
    let value = match type_name {
        "BOOLEAN" => SqlValue::Bool(row.try_get(index)?),
        name if name.ends_with("UNSIGNED") => {
            let value: u64 = row.try_get(index)?;
            i64::try_from(value).map_or_else(|_| SqlValue::Text(value.to_string()), SqlValue::Int)
        }
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => SqlValue::Int(row.try_get(index)?),
        "FLOAT" => SqlValue::Float(f64::from(row.try_get::<f32, _>(index)?)),
        "DOUBLE" => SqlValue::Float(row.try_get(index)?),
        "DECIMAL" => {
            SqlValue::from_decimal_text(&row.try_get::<BigDecimal, _>(index)?.to_string())
        }
        // Zero dates and out-of-range TIME values have no chrono form
        "DATE" => match row.try_get::<chrono::NaiveDate, _>(index) {
            Ok(value) => SqlValue::Text(value.to_string()),
            Err(_) => fallback(row, index)?,
        },
        "TIME" => match row.try_get::<chrono::NaiveTime, _>(index) {
            Ok(value) => SqlValue::Text(value.to_string()),
            Err(_) => fallback(row, index)?,
        },
        "DATETIME" => match row.try_get::<chrono::NaiveDateTime, _>(index) {
            Ok(value) => SqlValue::from_naive_datetime(value),
            Err(_) => fallback(row, index)?,
        },
        "TIMESTAMP" => match row.try_get::<chrono::DateTime<chrono::Utc>, _>(index) {
            Ok(value) => SqlValue::from_utc(value),
            Err(_) => fallback(row, index)?,
        },
        "JSON" => SqlValue::Text(row.try_get::<JsonValue, _>(index)?.to_string()),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            SqlValue::Bytes(row.try_get(index)?)
        }
        _ => fallback(row, index)?,
    };
    Ok(value)
}

/// Text when the type decodes as a string, raw wire bytes otherwise.
fn fallback(row: &MySqlRow, index: usize) -> std::result::Result<SqlValue, sqlx::Error> {
    if let Ok(text) = row.try_get::<String, _>(index) {
        return Ok(SqlValue::Text(text));
    }
    Ok(SqlValue::from_raw_bytes(
        row.try_get_unchecked::<Vec<u8>, _>(index)?,
    ))
}

fn decode_row(row: &MySqlRow) -> std::result::Result<Vec<SqlValue>, sqlx::Error> {
    (0..row.len()).map(|i| decode_value(row, i)).collect()
}

#[async_trait]
impl QueryExecutor for MySqlExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::MySql
    }

    async fn fetch(
        &self,
        sql: &str,
        max_rows: Option<usize>,
    ) -> std::result::Result<QueryResult, DriverError> {
        let stream = sqlx::query(sql).fetch(&self.pool);
        let rows: Vec<MySqlRow> = match max_rows {
            Some(limit) => stream.take(limit).try_collect().await?,
            None => stream.try_collect().await?,
        };

        let columns = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            None => match (&self.pool).describe(sql).await {
                Ok(describe) => describe
                    .columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect(),
                Err(e) => {
                    tracing::debug!("Could not describe empty result set: {}", e);
                    Vec::new()
                }
            },
        };

        let rows = rows
            .iter()
            .map(decode_row)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(QueryResult { columns, rows })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
