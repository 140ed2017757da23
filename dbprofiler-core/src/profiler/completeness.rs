//! Row count and per-column non-null counts.

use super::{TableContext, percentage};
use crate::error::Result;
use crate::models::{ColumnCompleteness, CompletenessStats};

pub(super) async fn measure(ctx: &TableContext<'_>) -> Result<CompletenessStats> {
    let row_count = ctx.count(None, "row count", &ctx.queries.row_count()).await?;

    let names: Vec<&str> = ctx.table.column_names().collect();
    let mut non_null_counts = Vec::with_capacity(names.len());
    for batch in names.chunks(ctx.count_batch_size) {
        let sql = ctx.queries.non_null_counts(batch)?;
        let column = (batch.len() == 1).then(|| batch[0]);
        let row = ctx.first_row(column, "non-null counts", &sql).await?;
        for (index, name) in batch.iter().enumerate() {
            let count = ctx.count_at(&row, index, Some(name), "non-null count")?;
            non_null_counts.push((name.to_string(), count));
        }
    }

    Ok(summarize(row_count, non_null_counts))
}

/// Builds the completeness record from raw counts.
///
/// Each column contributes `row_count` cells; a non-null count above the row
/// count (possible when rows are inserted between the two queries) is
/// clamped so nulls never go negative.
pub(super) fn summarize(row_count: u64, non_null_counts: Vec<(String, u64)>) -> CompletenessStats {
    let column_count = non_null_counts.len() as u64;
    let mut non_null_cells = 0u64;
    let mut null_cells = 0u64;

    let columns: Vec<ColumnCompleteness> = non_null_counts
        .into_iter()
        .map(|(column, non_null)| {
            let non_null_count = non_null.min(row_count);
            let null_count = row_count - non_null_count;
            non_null_cells += non_null_count;
            null_cells += null_count;
            ColumnCompleteness {
                column,
                non_null_count,
                null_count,
                completeness_pct: percentage(non_null_count, row_count),
            }
        })
        .collect();

    CompletenessStats {
        row_count,
        column_count,
        non_null_cells,
        null_cells,
        table_completeness_pct: percentage(non_null_cells, non_null_cells + null_cells),
        columns,
    }
}
