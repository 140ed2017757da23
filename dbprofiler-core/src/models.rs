//! Data models for the `schema` and `profile` documents.
//!
//! Field names follow the JSON documents consumed downstream and must not
//! change: `{"schema": [TableSchema, ...]}` and `{"profile": [TableProfile, ...]}`.
//! Absence is always `null`, never `0`, so "not applicable" stays distinct
//! from "measured as zero".

use crate::dialect::Dialect;
use crate::error::ErrorStage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Literal written for a column without a default expression.
pub const NO_DEFAULT_MARKER: &str = "None";

/// Column metadata as reported by the engine's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Engine type name, e.g. `character varying(255)` or `datetime2`
    #[serde(rename = "type")]
    pub declared_type: String,
    pub nullable: bool,
    /// Default expression; serialized as `"None"` when absent
    #[serde(with = "default_marker")]
    pub default: Option<String>,
}

impl ColumnDescriptor {
    /// Creates a nullable column without a default.
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            nullable: true,
            default: None,
        }
    }

    /// Returns `true` if the declared type carries date/time values.
    pub fn is_temporal(&self, dialect: Dialect) -> bool {
        dialect.is_temporal_type(&self.declared_type)
    }
}

/// Foreign key relationship from the constraint catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    #[serde(rename = "column", alias = "local_columns")]
    pub local_columns: Vec<String>,
    #[serde(default)]
    pub referred_table: String,
    #[serde(default)]
    pub referred_columns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referred_schema: Option<String>,
}

impl ForeignKeyRef {
    /// Why this relationship cannot be checked for orphans, if it can't.
    pub fn unusable_reason(&self) -> Option<&'static str> {
        if self.local_columns.is_empty() {
            Some("no local columns")
        } else if self.referred_table.is_empty() {
            Some("no referred table")
        } else if self.referred_columns.is_empty() {
            Some("no referred columns")
        } else if self.local_columns.len() != self.referred_columns.len() {
            Some("local and referred column counts differ")
        } else {
            None
        }
    }
}

/// Structural description of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnDescriptor>,
    /// Primary key columns in key order
    #[serde(rename = "primary_keys")]
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKeyRef>,
}

impl TableSchema {
    /// Creates a table with no columns or keys.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Column names in ordinal order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn has_primary_key(&self) -> bool {
        !self.primary_key.is_empty()
    }

    /// Primary key columns that are not columns of this table.
    pub fn dangling_primary_key_columns(&self) -> Vec<&str> {
        self.primary_key
            .iter()
            .filter(|pk| !self.columns.iter().any(|c| &c.name == *pk))
            .map(String::as_str)
            .collect()
    }
}

/// Top-level schema document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDocument {
    pub schema: Vec<TableSchema>,
}

/// Non-null statistics for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnCompleteness {
    pub column: String,
    pub non_null_count: u64,
    pub null_count: u64,
    pub completeness_pct: Option<f64>,
}

/// Fraction of non-null cells in a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletenessStats {
    pub row_count: u64,
    pub column_count: u64,
    pub non_null_cells: u64,
    pub null_cells: u64,
    pub table_completeness_pct: Option<f64>,
    pub columns: Vec<ColumnCompleteness>,
}

/// Latest value of one temporal column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFreshness {
    pub column: String,
    #[serde(with = "utc_timestamp")]
    pub latest_value: Option<DateTime<Utc>>,
}

/// Recency of the newest temporal value in a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreshnessStats {
    pub temporal_columns_checked: u64,
    pub latest_column: Option<String>,
    #[serde(with = "utc_timestamp")]
    pub latest_timestamp: Option<DateTime<Utc>>,
    pub staleness_days: Option<f64>,
    pub columns: Vec<ColumnFreshness>,
}

/// Overall key integrity verdict for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStatus {
    Healthy,
    IssuesFound,
    MissingPrimaryKey,
}

impl KeyStatus {
    /// Name as written in the profile document.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::IssuesFound => "issues_found",
            Self::MissingPrimaryKey => "missing_primary_key",
        }
    }

    /// Derives the verdict from primary key health and the orphan total.
    ///
    /// A table without a primary key is `MissingPrimaryKey` regardless of
    /// foreign key findings.
    pub fn derive(primary_key: &PrimaryKeyHealth, orphan_rows: u64) -> Self {
        if primary_key.columns.is_empty() {
            return Self::MissingPrimaryKey;
        }
        let clean = primary_key.null_rows == Some(0)
            && primary_key.duplicate_rows == Some(0)
            && orphan_rows == 0;
        if clean {
            Self::Healthy
        } else {
            Self::IssuesFound
        }
    }
}

/// Primary key null and duplicate counts; all counts are null without a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKeyHealth {
    pub columns: Vec<String>,
    pub null_rows: Option<u64>,
    pub duplicate_groups: Option<u64>,
    pub duplicate_rows: Option<u64>,
}

impl PrimaryKeyHealth {
    /// Health record for a table without a primary key.
    pub fn not_applicable() -> Self {
        Self {
            columns: Vec::new(),
            null_rows: None,
            duplicate_groups: None,
            duplicate_rows: None,
        }
    }
}

/// Orphan count for one checked relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKeyOrphans {
    pub local_columns: Vec<String>,
    pub referred_table: String,
    pub referred_columns: Vec<String>,
    pub orphan_rows: u64,
}

/// A relationship that could not be checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedForeignKey {
    pub local_columns: Vec<String>,
    pub referred_table: String,
    pub referred_columns: Vec<String>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ForeignKeyHealth {
    pub relationships_checked: u64,
    /// Sum of orphan rows across all checked relationships
    pub orphan_rows: u64,
    pub details: Vec<ForeignKeyOrphans>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedForeignKey>,
}

/// Primary and foreign key integrity of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyHealthStats {
    pub status: KeyStatus,
    pub primary_key: PrimaryKeyHealth,
    pub foreign_keys: ForeignKeyHealth,
}

/// Data-quality profile of one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableProfile {
    pub table_name: String,
    pub completeness: CompletenessStats,
    pub freshness: FreshnessStats,
    pub key_health: KeyHealthStats,
}

/// Top-level profile document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileDocument {
    pub profile: Vec<TableProfile>,
}

/// A table whose profiling failed under `continue_on_error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableFailure {
    pub table_name: String,
    pub stage: ErrorStage,
    pub message: String,
}

/// Result of a profiling pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProfileRun {
    pub profiles: Vec<TableProfile>,
    pub failures: Vec<TableFailure>,
}

impl ProfileRun {
    /// Returns `true` if every table was profiled.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Consumes the run into the document written for downstream consumers.
    pub fn into_document(self) -> ProfileDocument {
        ProfileDocument {
            profile: self.profiles,
        }
    }
}

/// Serializes an absent default as the literal `"None"` and reads it back as absent.
mod default_marker {
    use super::NO_DEFAULT_MARKER;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value.as_deref().unwrap_or(NO_DEFAULT_MARKER))
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(value.filter(|v| v != NO_DEFAULT_MARKER))
    }
}

/// ISO-8601 UTC timestamps rendered with an explicit `+00:00` offset.
mod utc_timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, false)),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => DateTime::parse_from_rfc3339(&raw)
                .map(|ts| Some(ts.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}
