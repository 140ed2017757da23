//! Primary key nulls and duplicates, foreign key orphans.

use super::TableContext;
use crate::error::Result;
use crate::models::{
    ForeignKeyHealth, ForeignKeyOrphans, KeyHealthStats, KeyStatus, PrimaryKeyHealth,
    SkippedForeignKey,
};

pub(super) async fn measure(ctx: &TableContext<'_>) -> Result<KeyHealthStats> {
    let primary_key = primary_key_health(ctx).await?;
    let foreign_keys = foreign_key_health(ctx).await?;

    Ok(KeyHealthStats {
        status: KeyStatus::derive(&primary_key, foreign_keys.orphan_rows),
        primary_key,
        foreign_keys,
    })
}

async fn primary_key_health(ctx: &TableContext<'_>) -> Result<PrimaryKeyHealth> {
    if !ctx.table.has_primary_key() {
        return Ok(PrimaryKeyHealth::not_applicable());
    }
    let columns = &ctx.table.primary_key;
    let column = (columns.len() == 1).then(|| columns[0].as_str());

    let null_rows = ctx
        .count(
            column,
            "primary key nulls",
            &ctx.queries.primary_key_nulls(columns)?,
        )
        .await?;

    let what = "primary key duplicates";
    let row = ctx
        .first_row(column, what, &ctx.queries.primary_key_duplicates(columns)?)
        .await?;
    let duplicate_groups = ctx.count_at(&row, 0, column, what)?;
    let duplicate_rows = ctx.count_at(&row, 1, column, what)?;

    Ok(PrimaryKeyHealth {
        columns: columns.clone(),
        null_rows: Some(null_rows),
        duplicate_groups: Some(duplicate_groups),
        duplicate_rows: Some(duplicate_rows),
    })
}

async fn foreign_key_health(ctx: &TableContext<'_>) -> Result<ForeignKeyHealth> {
    let mut health = ForeignKeyHealth::default();

    for fk in &ctx.table.foreign_keys {
        if let Some(reason) = fk.unusable_reason() {
            tracing::warn!(
                "Skipping foreign key {:?} -> '{}' on table '{}': {}",
                fk.local_columns,
                fk.referred_table,
                ctx.table.table_name,
                reason
            );
            health.skipped.push(SkippedForeignKey {
                local_columns: fk.local_columns.clone(),
                referred_table: fk.referred_table.clone(),
                referred_columns: fk.referred_columns.clone(),
                reason: reason.to_string(),
            });
            continue;
        }

        let local = fk.local_columns.join(", ");
        let orphan_rows = ctx
            .count(Some(&local), "foreign key orphans", &ctx.queries.orphan_rows(fk)?)
            .await?;
        if orphan_rows > 0 {
            tracing::debug!(
                "Table '{}' has {} orphan rows for {:?} -> '{}'",
                ctx.table.table_name,
                orphan_rows,
                fk.local_columns,
                fk.referred_table
            );
        }

        health.relationships_checked += 1;
        health.orphan_rows += orphan_rows;
        health.details.push(ForeignKeyOrphans {
            local_columns: fk.local_columns.clone(),
            referred_table: fk.referred_table.clone(),
            referred_columns: fk.referred_columns.clone(),
            orphan_rows,
        });
    }

    Ok(health)
}
