//! PostgreSQL executor over a typed sqlx pool.

use super::{QueryExecutor, QueryResult, SqlValue};
use crate::config::ProfilerConfig;
use crate::dialect::{Dialect, ServerFlavor};
use crate::error::{DbProfilerError, DriverError, Result, redact_database_url};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::{BigDecimal, JsonValue, Uuid};
use sqlx::{Column, Executor, Row, TypeInfo, ValueRef};

/// Pooled PostgreSQL executor.
///
/// Every pooled connection is switched to read-only transactions, a
/// server-side `statement_timeout` and UTC before first use.
#[derive(Debug, Clone)]
pub struct PostgresExecutor {
    pool: PgPool,
}

impl PostgresExecutor {
    /// Connects a pool and verifies that one connection can be established.
    ///
    /// # Errors
    /// Returns `Connectivity` with a redacted URL if the pool cannot connect.
    pub async fn connect(url: &str, config: &ProfilerConfig) -> Result<Self> {
        let setup = Dialect::PostgreSql.session_setup(config.query_timeout, ServerFlavor::Standard);
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections.min(100))
            .acquire_timeout(config.connect_timeout)
            .test_before_acquire(true)
            .after_connect(move |conn, _meta| {
                let setup = setup.clone();
                Box::pin(async move {
                    for statement in &setup {
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

/// Decodes one cell by its PostgreSQL type name.
fn decode_value(row: &PgRow, index: usize) -> std::result::Result<SqlValue, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(SqlValue::Null);
    }
    let value = match row.column(index).type_info().name() {
        "BOOL" => SqlValue::Bool(row.try_get(index)?),
        "INT2" => SqlValue::Int(i64::from(row.try_get::<i16, _>(index)?)),
        "INT4" => SqlValue::Int(i64::from(row.try_get::<i32, _>(index)?)),
        "INT8" => SqlValue::Int(row.try_get(index)?),
        "OID" => SqlValue::Int(i64::from(
            row.try_get::<sqlx::postgres::types::Oid, _>(index)?.0,
        )),
        "FLOAT4" => SqlValue::Float(f64::from(row.try_get::<f32, _>(index)?)),
        "FLOAT8" => SqlValue::Float(row.try_get(index)?),
        "NUMERIC" => match row.try_get::<BigDecimal, _>(index) {
            Ok(decimal) => SqlValue::from_decimal_text(&decimal.to_string()),
            Err(_) => special_numeric(&row.try_get_unchecked::<Vec<u8>, _>(index)?),
        },
        "DATE" => SqlValue::Text(row.try_get::<chrono::NaiveDate, _>(index)?.to_string()),
        "TIME" => SqlValue::Text(row.try_get::<chrono::NaiveTime, _>(index)?.to_string()),
        "TIMESTAMP" => match row.try_get::<chrono::NaiveDateTime, _>(index) {
            Ok(value) => SqlValue::from_naive_datetime(value),
            Err(_) => fallback(row, index)?,
        },
        "TIMESTAMPTZ" => match row.try_get::<chrono::DateTime<chrono::Utc>, _>(index) {
            Ok(value) => SqlValue::from_utc(value),
            Err(_) => fallback(row, index)?,
        },
        "UUID" => SqlValue::Text(row.try_get::<Uuid, _>(index)?.to_string()),
        "JSON" | "JSONB" => SqlValue::Text(row.try_get::<JsonValue, _>(index)?.to_string()),
        "BYTEA" => SqlValue::Bytes(row.try_get(index)?),
        _ => fallback(row, index)?,
    };
    Ok(value)
}

/// Names the non-finite `numeric` values, which have no `BigDecimal` form.
///
/// The binary header is ndigits, weight, sign and dscale as 16-bit words.
fn special_numeric(raw: &[u8]) -> SqlValue {
    let label = match raw.get(4..6) {
        Some([0xD0, 0x00]) => "Infinity",
        Some([0xF0, 0x00]) => "-Infinity",
        _ => "NaN",
    };
    SqlValue::Text(label.to_string())
}

/// Text when the type decodes as a string, raw wire bytes otherwise.
fn fallback(row: &PgRow, index: usize) -> std::result::Result<SqlValue, sqlx::Error> {
    if let Ok(text) = row.try_get::<String, _>(index) {
        return Ok(SqlValue::Text(text));
    }
    Ok(SqlValue::from_raw_bytes(
        row.try_get_unchecked::<Vec<u8>, _>(index)?,
    ))
}

fn decode_row(row: &PgRow) -> std::result::Result<Vec<SqlValue>, sqlx::Error> {
    (0..row.len()).map(|i| decode_value(row, i)).collect()
}

#[async_trait]
impl QueryExecutor for PostgresExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::PostgreSql
    }

    async fn fetch(
        &self,
        sql: &str,
        max_rows: Option<usize>,
    ) -> std::result::Result<QueryResult, DriverError> {
        let stream = sqlx::query(sql).fetch(&self.pool);
        let rows: Vec<PgRow> = match max_rows {
            Some(limit) => stream.take(limit).try_collect().await?,
            None => stream.try_collect().await?,
        };

        let columns = match rows.first() {
            Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
            // No row to read names from; ask the server to describe the statement
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_special_numeric_labels() {
        let header = |sign: [u8; 2]| [0, 0, 0, 0, sign[0], sign[1], 0, 0];
        assert_eq!(
            special_numeric(&header([0xC0, 0x00])),
            SqlValue::Text("NaN".to_string())
        );
        assert_eq!(
            special_numeric(&header([0xD0, 0x00])),
            SqlValue::Text("Infinity".to_string())
        );
        assert_eq!(
            special_numeric(&header([0xF0, 0x00])),
            SqlValue::Text("-Infinity".to_string())
        );
    }
}
