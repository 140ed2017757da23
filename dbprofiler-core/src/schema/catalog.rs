//! Catalog queries against `INFORMATION_SCHEMA` and, for PostgreSQL keys,
//! `pg_catalog`.
//!
//! Catalog columns use engine-specific domain types (PostgreSQL's
//! `sql_identifier`, `cardinal_number`, ...), so every selected column is cast
//! to plain text or a 64-bit integer.
//!
//! PostgreSQL hides constraints in `INFORMATION_SCHEMA.TABLE_CONSTRAINTS` from
//! roles that do not own the table, and its constraint names are only unique
//! per table. Its keys are therefore read from `pg_constraint`, which every
//! role can read, and foreign keys are grouped by constraint OID.

use crate::dialect::Dialect;

fn text(dialect: Dialect, column: &str) -> String {
    dialect.text_cast(column)
}

fn int(dialect: Dialect, column: &str) -> String {
    dialect.bigint_cast(column)
}

/// Name of the schema being introspected.
pub(super) fn current_schema(dialect: Dialect) -> String {
    format!("SELECT {}", text(dialect, dialect.current_schema_expr()))
}

/// Base tables in the current schema.
pub(super) fn tables(dialect: Dialect) -> String {
    format!(
        "SELECT {} FROM INFORMATION_SCHEMA.TABLES \
         WHERE TABLE_SCHEMA = {} AND TABLE_TYPE = 'BASE TABLE' \
         ORDER BY TABLE_NAME",
        text(dialect, "TABLE_NAME"),
        dialect.current_schema_expr()
    )
}

/// Columns of every table in the current schema, in ordinal order.
///
/// Result: table, column, type, is_nullable, default, char length,
/// numeric precision, numeric scale.
pub(super) fn columns(dialect: Dialect) -> String {
    // MySQL reports the full declared type (`varchar(255)`, `int unsigned`)
    let declared_type = match dialect {
        Dialect::MySql => "COLUMN_TYPE",
        Dialect::PostgreSql | Dialect::SqlServer => "DATA_TYPE",
    };
    format!(
        "SELECT {}, {}, {}, {}, {}, {}, {}, {} FROM INFORMATION_SCHEMA.COLUMNS \
         WHERE TABLE_SCHEMA = {} \
         ORDER BY TABLE_NAME, ORDINAL_POSITION",
        text(dialect, "TABLE_NAME"),
        text(dialect, "COLUMN_NAME"),
        text(dialect, declared_type),
        text(dialect, "IS_NULLABLE"),
        text(dialect, "COLUMN_DEFAULT"),
        int(dialect, "CHARACTER_MAXIMUM_LENGTH"),
        int(dialect, "NUMERIC_PRECISION"),
        int(dialect, "NUMERIC_SCALE"),
        dialect.current_schema_expr()
    )
}

/// Primary key columns of every table, in key order.
///
/// Result: table, column.
pub(super) fn primary_keys(dialect: Dialect) -> String {
    if dialect == Dialect::PostgreSql {
        return format!(
            "SELECT {}, {} FROM pg_catalog.pg_constraint con \
             JOIN pg_catalog.pg_class c ON c.oid = con.conrelid \
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
             CROSS JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS k(attnum, position) \
             JOIN pg_catalog.pg_attribute a \
             ON a.attrelid = con.conrelid AND a.attnum = k.attnum \
             WHERE con.contype = 'p' AND n.nspname = {} \
             ORDER BY c.relname, k.position",
            text(dialect, "c.relname"),
            text(dialect, "a.attname"),
            dialect.current_schema_expr()
        );
    }
    format!(
        "SELECT {}, {} FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc \
         JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu \
         ON kcu.CONSTRAINT_SCHEMA = tc.CONSTRAINT_SCHEMA \
         AND kcu.CONSTRAINT_NAME = tc.CONSTRAINT_NAME \
         AND kcu.TABLE_SCHEMA = tc.TABLE_SCHEMA \
         AND kcu.TABLE_NAME = tc.TABLE_NAME \
         WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY' AND tc.TABLE_SCHEMA = {} \
         ORDER BY kcu.TABLE_NAME, kcu.ORDINAL_POSITION",
        text(dialect, "kcu.TABLE_NAME"),
        text(dialect, "kcu.COLUMN_NAME"),
        dialect.current_schema_expr()
    )
}

/// Foreign key column pairs of every table.
///
/// Result: table, constraint key, local column, referred schema, referred
/// table, referred column; ordered by table, constraint and key position.
/// The constraint key is the name, or the OID on PostgreSQL.
pub(super) fn foreign_keys(dialect: Dialect) -> String {
    let columns = [
        text(dialect, "kcu.TABLE_NAME"),
        text(dialect, "kcu.CONSTRAINT_NAME"),
        text(dialect, "kcu.COLUMN_NAME"),
    ];
    match dialect {
        Dialect::MySql => format!(
            "SELECT {}, {}, {}, {}, {}, {} FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu \
             WHERE kcu.TABLE_SCHEMA = {} AND kcu.REFERENCED_TABLE_NAME IS NOT NULL \
             ORDER BY kcu.TABLE_NAME, kcu.CONSTRAINT_NAME, kcu.ORDINAL_POSITION",
            columns[0],
            columns[1],
            columns[2],
            text(dialect, "kcu.REFERENCED_TABLE_SCHEMA"),
            text(dialect, "kcu.REFERENCED_TABLE_NAME"),
            text(dialect, "kcu.REFERENCED_COLUMN_NAME"),
            dialect.current_schema_expr()
        ),
        Dialect::PostgreSql => format!(
            "SELECT {}, {}, {}, {}, {}, {} FROM pg_catalog.pg_constraint con \
             JOIN pg_catalog.pg_class c ON c.oid = con.conrelid \
             JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
             JOIN pg_catalog.pg_class rc ON rc.oid = con.confrelid \
             JOIN pg_catalog.pg_namespace rn ON rn.oid = rc.relnamespace \
             CROSS JOIN LATERAL unnest(con.conkey, con.confkey) \
             WITH ORDINALITY AS k(attnum, refattnum, position) \
             JOIN pg_catalog.pg_attribute a \
             ON a.attrelid = con.conrelid AND a.attnum = k.attnum \
             JOIN pg_catalog.pg_attribute ra \
             ON ra.attrelid = con.confrelid AND ra.attnum = k.refattnum \
             WHERE con.contype = 'f' AND n.nspname = {} \
             ORDER BY c.relname, con.conname, con.oid, k.position",
            text(dialect, "c.relname"),
            text(dialect, "con.oid"),
            text(dialect, "a.attname"),
            text(dialect, "rn.nspname"),
            text(dialect, "rc.relname"),
            text(dialect, "ra.attname"),
            dialect.current_schema_expr()
        ),
        Dialect::SqlServer => format!(
            "SELECT {}, {}, {}, {}, {}, {} \
             FROM INFORMATION_SCHEMA.REFERENTIAL_CONSTRAINTS rc \
             JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu \
             ON kcu.CONSTRAINT_SCHEMA = rc.CONSTRAINT_SCHEMA \
             AND kcu.CONSTRAINT_NAME = rc.CONSTRAINT_NAME \
             JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE rk \
             ON rk.CONSTRAINT_SCHEMA = rc.UNIQUE_CONSTRAINT_SCHEMA \
             AND rk.CONSTRAINT_NAME = rc.UNIQUE_CONSTRAINT_NAME \
             AND rk.ORDINAL_POSITION = kcu.ORDINAL_POSITION \
             WHERE kcu.TABLE_SCHEMA = {} \
             ORDER BY kcu.TABLE_NAME, kcu.CONSTRAINT_NAME, kcu.ORDINAL_POSITION",
            columns[0],
            columns[1],
            columns[2],
            text(dialect, "rk.TABLE_SCHEMA"),
            text(dialect, "rk.TABLE_NAME"),
            text(dialect, "rk.COLUMN_NAME"),
            dialect.current_schema_expr()
        ),
    }
}
