//! Generated profiling SQL.
//!
//! Every identifier passes through [`Dialect::quote_identifier`]; no other
//! text from the database or the caller is interpolated into statements.
//! Integer aggregates are cast to a 64-bit type so every engine returns them
//! in a shape the executors decode as `Int`.

use crate::dialect::Dialect;
use crate::error::Result;
use crate::models::ForeignKeyRef;

/// Aggregate queries over one table.
///
/// # Example
/// ```rust
/// use dbprofiler_core::Dialect;
/// use dbprofiler_core::sql::TableQueries;
///
/// let queries = TableQueries::new(Dialect::MySql, "order items").unwrap();
/// assert_eq!(queries.row_count(), "SELECT COUNT(*) FROM `order items`");
/// ```
#[derive(Debug, Clone)]
pub struct TableQueries {
    dialect: Dialect,
    table: String,
}

impl TableQueries {
    /// Quotes `table_name` for `dialect`.
    ///
    /// # Errors
    /// Returns `UnsafeIdentifier` if the name cannot be quoted.
    pub fn new(dialect: Dialect, table_name: &str) -> Result<Self> {
        Ok(Self {
            dialect,
            table: dialect.quote_identifier(table_name)?,
        })
    }

    /// Quoted table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    fn quote(&self, column: &str) -> Result<String> {
        self.dialect.quote_identifier(column)
    }

    fn count_all(&self) -> String {
        format!("{}(*)", self.dialect.count_fn())
    }

    /// `SELECT COUNT(*) FROM t`
    pub fn row_count(&self) -> String {
        format!("SELECT {} FROM {}", self.count_all(), self.table)
    }

    /// One statement counting non-null values of every given column.
    ///
    /// Result columns are in the same order as `columns`.
    pub fn non_null_counts(&self, columns: &[&str]) -> Result<String> {
        let counts = columns
            .iter()
            .map(|c| Ok(format!("{}({})", self.dialect.count_fn(), self.quote(c)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(format!("SELECT {} FROM {}", counts.join(", "), self.table))
    }

    /// Latest value of a temporal column, rendered as text.
    pub fn latest_value(&self, column: &str) -> Result<String> {
        let max = format!("MAX({})", self.quote(column)?);
        Ok(format!(
            "SELECT {} FROM {}",
            self.dialect.temporal_text_cast(&max),
            self.table
        ))
    }

    /// Rows where any primary key column is null.
    pub fn primary_key_nulls(&self, primary_key: &[String]) -> Result<String> {
        let condition = primary_key
            .iter()
            .map(|c| Ok(format!("{} IS NULL", self.quote(c)?)))
            .collect::<Result<Vec<_>>>()?
            .join(" OR ");
        Ok(format!(
            "SELECT {} FROM {} WHERE {}",
            self.count_all(),
            self.table,
            condition
        ))
    }

    /// Duplicate groups and duplicate rows (Σ(count − 1)) in one statement.
    pub fn primary_key_duplicates(&self, primary_key: &[String]) -> Result<String> {
        let group_by = primary_key
            .iter()
            .map(|c| self.quote(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");
        let count_all = self.count_all();
        let duplicate_rows = self
            .dialect
            .bigint_cast("COALESCE(SUM(d.dup_count - 1), 0)");

        Ok(format!(
            "SELECT {count_all}, {duplicate_rows} FROM (\
             SELECT {count_all} AS dup_count FROM {table} \
             GROUP BY {group_by} HAVING {count_all} > 1\
             ) AS d",
            table = self.table,
        ))
    }

    /// Local rows with a non-null key and no matching parent row.
    ///
    /// The caller must have checked the relationship is usable.
    pub fn orphan_rows(&self, foreign_key: &ForeignKeyRef) -> Result<String> {
        let parent = self.dialect.quote_qualified(
            foreign_key.referred_schema.as_deref(),
            &foreign_key.referred_table,
        )?;

        let mut join = Vec::with_capacity(foreign_key.local_columns.len());
        let mut local_has_value = Vec::with_capacity(foreign_key.local_columns.len());
        let mut parent_missing = Vec::with_capacity(foreign_key.referred_columns.len());
        for (local, referred) in foreign_key
            .local_columns
            .iter()
            .zip(&foreign_key.referred_columns)
        {
            let local = self.quote(local)?;
            let referred = self.quote(referred)?;
            join.push(format!("l.{} = p.{}", local, referred));
            local_has_value.push(format!("l.{} IS NOT NULL", local));
            parent_missing.push(format!("p.{} IS NULL", referred));
        }

        Ok(format!(
            "SELECT {} FROM {} AS l LEFT JOIN {} AS p ON {} WHERE ({}) AND ({})",
            self.count_all(),
            self.table,
            parent,
            join.join(" AND "),
            local_has_value.join(" OR "),
            parent_missing.join(" AND ")
        ))
    }
}
