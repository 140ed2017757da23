//! Structural metadata extraction.
//!
//! Reads tables, columns, primary keys and foreign keys of the current
//! schema from the engine's own constraint catalog. Any catalog failure
//! fails the whole extraction; no partial schema is returned.

mod catalog;

use crate::connection::{QueryExecutor, QueryResult, SqlValue, fetch_with_timeout};
use crate::dialect::Dialect;
use crate::error::{DbProfilerError, Result};
use crate::models::{ColumnDescriptor, ForeignKeyRef, TableSchema};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Catalog query budget used by [`extract_schema`].
pub const DEFAULT_INTROSPECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Extracts the structure of every base table in the current schema.
///
/// Tables are sorted by name; columns keep ordinal order.
///
/// # Errors
/// Returns `Introspection` if any catalog query fails or times out.
pub async fn extract_schema(executor: &dyn QueryExecutor) -> Result<Vec<TableSchema>> {
    extract_schema_with_timeout(executor, DEFAULT_INTROSPECTION_TIMEOUT).await
}

/// Same as [`extract_schema`] with an explicit per-query budget.
pub async fn extract_schema_with_timeout(
    executor: &dyn QueryExecutor,
    timeout: Duration,
) -> Result<Vec<TableSchema>> {
    let started = Instant::now();
    let dialect = executor.dialect();
    let catalog = Catalog {
        executor,
        timeout,
    };

    let current_schema = catalog
        .query("current schema", &catalog::current_schema(dialect))
        .await?
        .scalar()
        .and_then(SqlValue::as_text)
        .map(str::to_string)
        .ok_or_else(|| {
            DbProfilerError::introspection(
                "current schema",
                "no current schema is selected for this session",
            )
        })?;
    tracing::debug!("Introspecting schema '{}'", current_schema);

    let mut tables: BTreeMap<String, TableSchema> = BTreeMap::new();
    for row in catalog.query("tables", &catalog::tables(dialect)).await?.rows {
        let name = required_text(&row, 0, "tables")?;
        tables.insert(name.clone(), TableSchema::new(name));
    }

    let columns = catalog.query("columns", &catalog::columns(dialect)).await?;
    for row in &columns.rows {
        let table_name = required_text(row, 0, "columns")?;
        // Views and other non-base relations also appear in COLUMNS
        let Some(table) = tables.get_mut(&table_name) else {
            continue;
        };
        table.columns.push(column_from_row(dialect, row)?);
    }

    let primary_keys = catalog
        .query("primary keys", &catalog::primary_keys(dialect))
        .await?;
    for row in &primary_keys.rows {
        let table_name = required_text(row, 0, "primary keys")?;
        if let Some(table) = tables.get_mut(&table_name) {
            table.primary_key.push(required_text(row, 1, "primary keys")?);
        }
    }

    let foreign_keys = catalog
        .query("foreign keys", &catalog::foreign_keys(dialect))
        .await?;
    for (table_name, fk) in group_foreign_keys(&foreign_keys, &current_schema)? {
        if let Some(table) = tables.get_mut(&table_name) {
            table.foreign_keys.push(fk);
        }
    }

    let tables: Vec<TableSchema> = tables.into_values().collect();
    for table in &tables {
        let dangling = table.dangling_primary_key_columns();
        if !dangling.is_empty() {
            tracing::warn!(
                "Table '{}' reports primary key columns not in its column list: {:?}",
                table.table_name,
                dangling
            );
        }
    }

    tracing::info!(
        "Extracted {} tables from schema '{}' in {:?}",
        tables.len(),
        current_schema,
        started.elapsed()
    );
    Ok(tables)
}

struct Catalog<'a> {
    executor: &'a dyn QueryExecutor,
    timeout: Duration,
}

impl Catalog<'_> {
    async fn query(&self, what: &str, sql: &str) -> Result<QueryResult> {
        tracing::trace!("Catalog query ({}): {}", what, sql);
        fetch_with_timeout(self.executor, sql, None, self.timeout, what)
            .await
            .map_err(|e| DbProfilerError::introspection(format!("failed to read {}", what), e))
    }
}

fn optional_text(row: &[SqlValue], index: usize) -> Option<String> {
    row.get(index).and_then(SqlValue::as_text).map(str::to_string)
}

fn required_text(row: &[SqlValue], index: usize, what: &str) -> Result<String> {
    optional_text(row, index).ok_or_else(|| {
        DbProfilerError::introspection(
            format!("failed to read {}", what),
            format!("catalog returned no text in column {}", index + 1),
        )
    })
}

fn optional_int(row: &[SqlValue], index: usize) -> Option<i64> {
    row.get(index).and_then(SqlValue::as_i64)
}

/// Builds a column descriptor from a row of [`catalog::columns`].
fn column_from_row(dialect: Dialect, row: &[SqlValue]) -> Result<ColumnDescriptor> {
    let data_type = required_text(row, 2, "columns")?;
    let declared_type = declared_type(
        dialect,
        &data_type,
        optional_int(row, 5),
        optional_int(row, 6),
        optional_int(row, 7),
    );

    Ok(ColumnDescriptor {
        name: required_text(row, 1, "columns")?,
        declared_type,
        nullable: optional_text(row, 3).is_some_and(|v| v.eq_ignore_ascii_case("YES")),
        default: optional_text(row, 4),
    })
}

/// Appends reported length or precision to the catalog type name.
///
/// MySQL's `COLUMN_TYPE` already carries them.
fn declared_type(
    dialect: Dialect,
    data_type: &str,
    char_length: Option<i64>,
    precision: Option<i64>,
    scale: Option<i64>,
) -> String {
    if dialect == Dialect::MySql {
        return data_type.to_string();
    }
    match (char_length, precision) {
        (Some(-1), _) => format!("{}(max)", data_type),
        (Some(len), _) if len > 0 => format!("{}({})", data_type, len),
        (None, Some(p)) if matches!(data_type.to_ascii_lowercase().as_str(), "numeric" | "decimal") => {
            format!("{}({},{})", data_type, p, scale.unwrap_or(0))
        }
        _ => data_type.to_string(),
    }
}

/// Groups foreign key column pairs into relationships keyed by local table.
fn group_foreign_keys(
    result: &QueryResult,
    current_schema: &str,
) -> Result<Vec<(String, ForeignKeyRef)>> {
    let mut grouped: Vec<((String, String), ForeignKeyRef)> = Vec::new();

    for row in &result.rows {
        let table = required_text(row, 0, "foreign keys")?;
        let constraint = required_text(row, 1, "foreign keys")?;
        let local_column = required_text(row, 2, "foreign keys")?;
        let referred_schema = optional_text(row, 3);
        let referred_table = optional_text(row, 4).unwrap_or_default();
        let referred_column = optional_text(row, 5);

        let key = (table, constraint);
        if grouped.last().is_none_or(|(last_key, _)| *last_key != key) {
            grouped.push((
                key,
                ForeignKeyRef {
                    local_columns: Vec::new(),
                    referred_table,
                    referred_columns: Vec::new(),
                    referred_schema: referred_schema
                        .filter(|schema| schema.as_str() != current_schema),
                },
            ));
        }
        let Some((_, fk)) = grouped.last_mut() else {
            continue;
        };

        fk.local_columns.push(local_column);
        if let Some(referred_column) = referred_column {
            fk.referred_columns.push(referred_column);
        }
    }

    Ok(grouped
        .into_iter()
        .map(|((table, _), fk)| (table, fk))
        .collect())
}
