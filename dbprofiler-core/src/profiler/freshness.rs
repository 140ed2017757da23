//! Latest value of every temporal column and table staleness.
//!
//! `MAX()` is read back as text so the same code path handles every engine.
//! Offset-bearing values are converted to UTC; naive values are taken as UTC
//! and date-only values as midnight UTC. Anything else (times of day,
//! `infinity`, out-of-range years) is treated as absent.

use super::{TableContext, round2};
use crate::error::Result;
use crate::models::{ColumnFreshness, FreshnessStats};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%.f %:z"];
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

const MILLIS_PER_DAY: f64 = 86_400_000.0;

pub(super) async fn measure(ctx: &TableContext<'_>, now: DateTime<Utc>) -> Result<FreshnessStats> {
    let dialect = ctx.dialect();
    let mut latest_values = Vec::new();

    for column in ctx.table.columns.iter().filter(|c| c.is_temporal(dialect)) {
        let sql = ctx.queries.latest_value(&column.name)?;
        let row = ctx.first_row(Some(&column.name), "latest value", &sql).await?;
        let latest = row
            .first()
            .and_then(|value| value.as_text())
            .and_then(parse_timestamp);
        if latest.is_none() && row.first().is_some_and(|value| !value.is_null()) {
            tracing::debug!(
                "Ignoring non-timestamp maximum of '{}.{}': {:?}",
                ctx.table.table_name,
                column.name,
                row.first()
            );
        }
        latest_values.push((column.name.clone(), latest));
    }

    Ok(summarize(latest_values, now))
}

/// Parses a textual timestamp into UTC.
///
/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]` with or without an offset,
/// the same with a `T` separator, and a bare `YYYY-MM-DD`.
///
/// # Example
/// ```rust
/// use dbprofiler_core::profiler::parse_timestamp;
///
/// let ts = parse_timestamp("2024-03-01 12:00:00+02").unwrap();
/// assert_eq!(ts.to_rfc3339(), "2024-03-01T10:00:00+00:00");
/// assert!(parse_timestamp("12:00:00").is_none());
/// ```
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(raw, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}

/// Picks the newest value across columns; the first column wins ties.
pub(super) fn summarize(
    latest_values: Vec<(String, Option<DateTime<Utc>>)>,
    now: DateTime<Utc>,
) -> FreshnessStats {
    let mut newest: Option<(&str, DateTime<Utc>)> = None;
    for (column, value) in &latest_values {
        if let Some(value) = value
            && newest.is_none_or(|(_, current)| *value > current)
        {
            newest = Some((column.as_str(), *value));
        }
    }

    let staleness_days = newest.map(|(_, latest)| {
        round2((now - latest).num_milliseconds() as f64 / MILLIS_PER_DAY)
    });
    let latest_column = newest.map(|(column, _)| column.to_string());
    let latest_timestamp = newest.map(|(_, latest)| latest);

    FreshnessStats {
        temporal_columns_checked: latest_values.len() as u64,
        latest_column,
        latest_timestamp,
        staleness_days,
        columns: latest_values
            .into_iter()
            .map(|(column, latest_value)| ColumnFreshness {
                column,
                latest_value,
            })
            .collect(),
    }
}
