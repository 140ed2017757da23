//! End-to-end profiling against a real SQL engine.
//!
//! An in-memory SQLite database stands in for the server. SQLite accepts the
//! double-quoted identifiers and `CAST(... AS BIGINT/TEXT)` the PostgreSQL
//! dialect generates, so the executor is tagged as PostgreSQL and table
//! schemas are written by hand (catalog queries are engine specific).

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use dbprofiler_core::connection::{QueryExecutor, QueryResult, SqlValue};
use dbprofiler_core::error::DriverError;
use dbprofiler_core::models::{ColumnDescriptor, ForeignKeyRef, KeyStatus, TableSchema};
use dbprofiler_core::profiler::{profile_table, profile_tables_at};
use dbprofiler_core::readonly::QuerySession;
use dbprofiler_core::{DbProfilerError, Dialect, ErrorStage, ProfilerConfig, extract_profile};
use futures::{StreamExt, TryStreamExt};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, ValueRef};

/// Runs generated SQL on SQLite, decoding by the stored value's class.
struct SqliteExecutor {
    pool: SqlitePool,
}

fn decode_value(row: &SqliteRow, index: usize) -> Result<SqlValue, sqlx::Error> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(SqlValue::Null);
    }
    if let Ok(value) = row.try_get::<i64, _>(index) {
        return Ok(SqlValue::Int(value));
    }
    if let Ok(value) = row.try_get::<f64, _>(index) {
        return Ok(SqlValue::Float(value));
    }
    if let Ok(value) = row.try_get::<String, _>(index) {
        return Ok(SqlValue::Text(value));
    }
    Ok(SqlValue::Bytes(row.try_get::<Vec<u8>, _>(index)?))
}

#[async_trait]
impl QueryExecutor for SqliteExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::PostgreSql
    }

    async fn fetch(&self, sql: &str, max_rows: Option<usize>) -> Result<QueryResult, DriverError> {
        let stream = sqlx::query(sql).fetch(&self.pool);
        let rows: Vec<SqliteRow> = match max_rows {
            Some(limit) => stream.take(limit).try_collect().await?,
            None => stream.try_collect().await?,
        };

        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let rows = rows
            .iter()
            .map(|row| (0..row.len()).map(|i| decode_value(row, i)).collect())
            .collect::<Result<Vec<Vec<SqlValue>>, sqlx::Error>>()?;

        Ok(QueryResult { columns, rows })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Single-connection pool so every statement sees the same in-memory database.
async fn sqlite_executor(statements: &[&str]) -> SqliteExecutor {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory SQLite should open");

    for statement in statements {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .unwrap_or_else(|e| panic!("setup statement failed: {statement}: {e}"));
    }
    SqliteExecutor { pool }
}

const SHOP: &[&str] = &[
    "CREATE TABLE customers (id INTEGER NOT NULL, email TEXT)",
    "INSERT INTO customers VALUES (1, 'a@example.com'), (2, NULL)",
    "CREATE TABLE orders (id INTEGER NOT NULL, customer_id INTEGER, note TEXT, created_at TIMESTAMP)",
    "INSERT INTO orders VALUES \
     (1, 1, 'first', '2024-01-01 00:00:00'), \
     (2, 1, NULL, '2024-01-02 12:00:00'), \
     (3, 99, NULL, NULL)",
];

fn column(name: &str, declared_type: &str) -> ColumnDescriptor {
    ColumnDescriptor::new(name, declared_type)
}

fn customers() -> TableSchema {
    let mut table = TableSchema::new("customers");
    table.columns = vec![column("id", "integer"), column("email", "text")];
    table.primary_key = vec!["id".to_string()];
    table
}

fn orders() -> TableSchema {
    let mut table = TableSchema::new("orders");
    table.columns = vec![
        column("id", "integer"),
        column("customer_id", "integer"),
        column("note", "text"),
        column("created_at", "timestamp without time zone"),
    ];
    table.primary_key = vec!["id".to_string()];
    table.foreign_keys = vec![ForeignKeyRef {
        local_columns: vec!["customer_id".to_string()],
        referred_table: "customers".to_string(),
        referred_columns: vec!["id".to_string()],
        referred_schema: None,
    }];
    table
}

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap()
}

#[tokio::test]
async fn test_profile_orders() {
    let executor = sqlite_executor(SHOP).await;
    let profile = profile_table(&executor, &orders(), &ProfilerConfig::default(), now())
        .await
        .unwrap();

    let completeness = &profile.completeness;
    assert_eq!(completeness.row_count, 3);
    assert_eq!(completeness.column_count, 4);
    assert_eq!(completeness.non_null_cells, 9);
    assert_eq!(completeness.null_cells, 3);
    assert_eq!(completeness.table_completeness_pct, Some(75.0));
    let note = &completeness.columns[2];
    assert_eq!(note.column, "note");
    assert_eq!(note.completeness_pct, Some(33.33));

    let freshness = &profile.freshness;
    assert_eq!(freshness.temporal_columns_checked, 1);
    assert_eq!(freshness.latest_column.as_deref(), Some("created_at"));
    assert_eq!(
        freshness.latest_timestamp,
        Some(Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap())
    );
    assert_eq!(freshness.staleness_days, Some(0.5));

    let keys = &profile.key_health;
    assert_eq!(keys.primary_key.null_rows, Some(0));
    assert_eq!(keys.primary_key.duplicate_groups, Some(0));
    assert_eq!(keys.primary_key.duplicate_rows, Some(0));
    assert_eq!(keys.foreign_keys.relationships_checked, 1);
    assert_eq!(keys.foreign_keys.orphan_rows, 1);
    assert_eq!(keys.status, KeyStatus::IssuesFound);
}

#[tokio::test]
async fn test_table_without_temporal_columns_is_healthy() {
    let executor = sqlite_executor(SHOP).await;
    let profile = profile_table(&executor, &customers(), &ProfilerConfig::default(), now())
        .await
        .unwrap();

    assert_eq!(profile.completeness.table_completeness_pct, Some(75.0));
    assert_eq!(profile.freshness.temporal_columns_checked, 0);
    assert_eq!(profile.freshness.latest_timestamp, None);
    assert_eq!(profile.freshness.staleness_days, None);
    assert_eq!(profile.key_health.status, KeyStatus::Healthy);
}

#[tokio::test]
async fn test_duplicate_and_null_primary_keys() {
    let executor = sqlite_executor(&[
        "CREATE TABLE events (id INTEGER, kind TEXT)",
        "INSERT INTO events VALUES (1, 'a'), (1, 'b'), (1, 'c'), (2, 'd'), (NULL, 'e')",
    ])
    .await;
    let mut events = TableSchema::new("events");
    events.columns = vec![column("id", "integer"), column("kind", "text")];
    events.primary_key = vec!["id".to_string()];

    let profile = profile_table(&executor, &events, &ProfilerConfig::default(), now())
        .await
        .unwrap();

    let pk = &profile.key_health.primary_key;
    assert_eq!(pk.null_rows, Some(1));
    assert_eq!(pk.duplicate_groups, Some(1));
    assert_eq!(pk.duplicate_rows, Some(2));
    assert_eq!(profile.key_health.status, KeyStatus::IssuesFound);
}

#[tokio::test]
async fn test_empty_table_reports_null_percentages() {
    let executor =
        sqlite_executor(&["CREATE TABLE audit (id INTEGER, logged_at DATETIME)"]).await;
    let mut audit = TableSchema::new("audit");
    audit.columns = vec![column("id", "integer"), column("logged_at", "datetime")];
    audit.primary_key = vec!["id".to_string()];

    let profile = profile_table(&executor, &audit, &ProfilerConfig::default(), now())
        .await
        .unwrap();

    assert_eq!(profile.completeness.row_count, 0);
    assert_eq!(profile.completeness.table_completeness_pct, None);
    assert!(
        profile
            .completeness
            .columns
            .iter()
            .all(|c| c.completeness_pct.is_none())
    );
    assert_eq!(profile.freshness.temporal_columns_checked, 1);
    assert_eq!(profile.freshness.latest_column, None);
    assert_eq!(profile.freshness.staleness_days, None);
    assert_eq!(profile.key_health.primary_key.duplicate_rows, Some(0));
    assert_eq!(profile.key_health.status, KeyStatus::Healthy);
}

#[tokio::test]
async fn test_reserved_words_and_spaces_in_identifiers() {
    let executor = sqlite_executor(&[
        "CREATE TABLE \"order items\" (\"select\" INTEGER, \"ship date\" TEXT, \"quote\"\"d\" TEXT)",
        "INSERT INTO \"order items\" VALUES (1, '2024-01-01', 'x'), (2, NULL, NULL)",
    ])
    .await;
    let mut items = TableSchema::new("order items");
    items.columns = vec![
        column("select", "integer"),
        column("ship date", "date"),
        column("quote\"d", "text"),
    ];
    items.primary_key = vec!["select".to_string()];

    let profile = profile_table(&executor, &items, &ProfilerConfig::default(), now())
        .await
        .unwrap();

    assert_eq!(profile.table_name, "order items");
    assert_eq!(profile.completeness.non_null_cells, 4);
    assert_eq!(profile.freshness.latest_column.as_deref(), Some("ship date"));
    assert_eq!(profile.freshness.staleness_days, Some(2.0));
    assert_eq!(profile.key_health.status, KeyStatus::Healthy);
}

#[tokio::test]
async fn test_missing_primary_key() {
    let executor = sqlite_executor(&[
        "CREATE TABLE staging (payload TEXT)",
        "INSERT INTO staging VALUES ('a'), ('a')",
    ])
    .await;
    let mut staging = TableSchema::new("staging");
    staging.columns = vec![column("payload", "text")];

    let profile = profile_table(&executor, &staging, &ProfilerConfig::default(), now())
        .await
        .unwrap();

    let keys = &profile.key_health;
    assert_eq!(keys.status, KeyStatus::MissingPrimaryKey);
    assert_eq!(keys.primary_key.null_rows, None);
    assert_eq!(keys.primary_key.duplicate_groups, None);
}

#[tokio::test]
async fn test_small_batches_match_single_statement() {
    let executor = sqlite_executor(SHOP).await;
    let batched = profile_table(
        &executor,
        &orders(),
        &ProfilerConfig::default().with_count_batch_size(1),
        now(),
    )
    .await
    .unwrap();
    let single = profile_table(&executor, &orders(), &ProfilerConfig::default(), now())
        .await
        .unwrap();

    assert_eq!(batched, single);
}

#[tokio::test]
async fn test_extract_profile_keeps_schema_order() {
    let executor = sqlite_executor(SHOP).await;
    let config = ProfilerConfig::default()
        .with_max_concurrent_tables(2)
        .unwrap();

    let profiles = extract_profile(&executor, &[orders(), customers()], &config)
        .await
        .unwrap();
    let names: Vec<_> = profiles.iter().map(|p| p.table_name.as_str()).collect();
    assert_eq!(names, vec!["orders", "customers"]);
}

#[tokio::test]
async fn test_missing_table_fails_fast() {
    let executor = sqlite_executor(SHOP).await;
    let schema = [customers(), TableSchema::new("ghost")];

    let err = profile_tables_at(&executor, &schema, &ProfilerConfig::default(), now())
        .await
        .unwrap_err();
    assert_eq!(err.stage(), ErrorStage::Profiling);
    assert_eq!(err.table(), Some("ghost"));
}

#[tokio::test]
async fn test_missing_table_recorded_with_continue_on_error() {
    let executor = sqlite_executor(SHOP).await;
    let schema = [TableSchema::new("ghost"), customers()];
    let config = ProfilerConfig::default().with_continue_on_error(true);

    let run = profile_tables_at(&executor, &schema, &config, now())
        .await
        .unwrap();
    assert_eq!(run.profiles.len(), 1);
    assert_eq!(run.profiles[0].table_name, "customers");
    assert_eq!(run.failures.len(), 1);
    assert_eq!(run.failures[0].table_name, "ghost");
    assert_eq!(run.failures[0].stage, ErrorStage::Profiling);
    assert!(!run.is_complete());
}

#[tokio::test]
async fn test_read_only_query() {
    let executor = sqlite_executor(SHOP).await;
    let session = QuerySession::new(&executor, "shop");

    let result = session
        .execute("SELECT id, email FROM customers ORDER BY id;", Some(1))
        .await
        .unwrap();
    assert_eq!(result.columns, vec!["id", "email"]);
    assert_eq!(result.row_count, 1);
    assert!(result.truncated);
    assert_eq!(result.rows[0]["email"], serde_json::json!("a@example.com"));

    let result = session
        .execute("SELECT email FROM customers WHERE id = 2", None)
        .await
        .unwrap();
    assert_eq!(result.rows[0]["email"], serde_json::Value::Null);
    assert!(!result.truncated);
}

#[tokio::test]
async fn test_read_only_query_rejects_writes() {
    let executor = sqlite_executor(SHOP).await;
    let session = QuerySession::new(&executor, "shop");

    let err = session
        .execute("DELETE FROM customers", None)
        .await
        .unwrap_err();
    assert!(matches!(err, DbProfilerError::UnsafeSql { .. }));

    let err = session
        .execute("SELECT 1; DROP TABLE customers", None)
        .await
        .unwrap_err();
    assert!(matches!(err, DbProfilerError::UnsafeSql { .. }));

    let count = session
        .execute("SELECT COUNT(*) AS n FROM customers", None)
        .await
        .unwrap();
    assert_eq!(count.rows[0]["n"], serde_json::json!(2));
}

#[tokio::test]
async fn test_read_only_query_driver_error() {
    let executor = sqlite_executor(SHOP).await;
    let session = QuerySession::new(&executor, "shop");

    let err = session
        .execute("SELECT * FROM ghost", None)
        .await
        .unwrap_err();
    assert!(matches!(err, DbProfilerError::QueryExecution { .. }));
    assert_eq!(err.stage(), ErrorStage::Query);
}

#[test]
fn test_unsupported_dialect() {
    let err = "oracle".parse::<Dialect>().unwrap_err();
    assert!(matches!(err, DbProfilerError::UnsupportedDialect { .. }));
    assert_eq!(err.stage(), ErrorStage::Configuration);
}
