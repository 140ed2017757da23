//! SQL dialects supported by the profiler.
//!
//! `Dialect` is a closed enum; every dialect-dependent decision (identifier
//! quoting, casts, catalog scoping, type heuristics) is an
//! exhaustive `match` in this module so that adding a dialect is a compile
//! error everywhere it matters.

use crate::error::{DbProfilerError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Relational database dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// MySQL / MariaDB
    MySql,
    /// PostgreSQL
    PostgreSql,
    /// Microsoft SQL Server
    SqlServer,
}

/// Server family behind a dialect, read from `SELECT VERSION()`.
///
/// MariaDB speaks the MySQL protocol but names its statement limit
/// differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServerFlavor {
    #[default]
    Standard,
    MariaDb,
}

impl ServerFlavor {
    pub fn from_version(version: &str) -> Self {
        if version.to_ascii_lowercase().contains("mariadb") {
            Self::MariaDb
        } else {
            Self::Standard
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = DbProfilerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(Self::MySql),
            "postgresql" => Ok(Self::PostgreSql),
            "sqlserver" => Ok(Self::SqlServer),
            _ => Err(DbProfilerError::UnsupportedDialect {
                dialect: s.to_string(),
            }),
        }
    }
}

impl Dialect {
    /// All supported dialects.
    pub const ALL: [Self; 3] = [Self::MySql, Self::PostgreSql, Self::SqlServer];

    /// Canonical lowercase name, as accepted by `FromStr`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::PostgreSql => "postgresql",
            Self::SqlServer => "sqlserver",
        }
    }

    /// Default server port.
    pub fn default_port(self) -> u16 {
        match self {
            Self::MySql => 3306,
            Self::PostgreSql => 5432,
            Self::SqlServer => 1433,
        }
    }

    /// URL scheme used by [`crate::connection::build_connection_url`].
    pub fn url_scheme(self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::PostgreSql => "postgres",
            Self::SqlServer => "mssql",
        }
    }

    /// Longest identifier the engine accepts.
    ///
    /// PostgreSQL counts bytes (NAMEDATALEN - 1), the others count characters.
    fn max_identifier_len(self, identifier: &str) -> (usize, usize) {
        match self {
            Self::PostgreSql => (identifier.len(), 63),
            Self::MySql => (identifier.chars().count(), 64),
            Self::SqlServer => (identifier.chars().count(), 128),
        }
    }

    /// Quotes a single identifier (table, column or schema name).
    ///
    /// The dialect's closing delimiter is doubled inside the name, so any
    /// string, including reserved words and names with spaces or quotes,
    /// becomes exactly one identifier token.
    ///
    /// # Errors
    /// Returns `UnsafeIdentifier` for empty names, names containing NUL, or
    /// names longer than the engine allows.
    ///
    /// # Example
    /// ```rust
    /// use dbprofiler_core::Dialect;
    ///
    /// assert_eq!(Dialect::PostgreSql.quote_identifier("order").unwrap(), "\"order\"");
    /// assert_eq!(Dialect::MySql.quote_identifier("my`col").unwrap(), "`my``col`");
    /// assert_eq!(Dialect::SqlServer.quote_identifier("a]b").unwrap(), "[a]]b]");
    /// ```
    pub fn quote_identifier(self, identifier: &str) -> Result<String> {
        if identifier.is_empty() {
            return Err(DbProfilerError::unsafe_identifier(
                identifier,
                "identifier cannot be empty",
            ));
        }
        if identifier.contains('\0') {
            return Err(DbProfilerError::unsafe_identifier(
                identifier,
                "identifier contains a NUL character",
            ));
        }
        let (len, max) = self.max_identifier_len(identifier);
        if len > max {
            return Err(DbProfilerError::unsafe_identifier(
                identifier,
                format!("identifier exceeds {} limit of {}", self, max),
            ));
        }

        let quoted = match self {
            Self::PostgreSql => format!("\"{}\"", identifier.replace('"', "\"\"")),
            Self::MySql => format!("`{}`", identifier.replace('`', "``")),
            Self::SqlServer => format!("[{}]", identifier.replace(']', "]]")),
        };
        Ok(quoted)
    }

    /// Quotes an optionally schema-qualified name, each part independently.
    pub fn quote_qualified(self, schema: Option<&str>, name: &str) -> Result<String> {
        let name = self.quote_identifier(name)?;
        match schema {
            Some(schema) => Ok(format!("{}.{}", self.quote_identifier(schema)?, name)),
            None => Ok(name),
        }
    }

    /// Row-counting aggregate. SQL Server's `COUNT` is a 32-bit `int`.
    pub fn count_fn(self) -> &'static str {
        match self {
            Self::MySql | Self::PostgreSql => "COUNT",
            Self::SqlServer => "COUNT_BIG",
        }
    }

    /// Casts an expression to a 64-bit integer.
    pub fn bigint_cast(self, expr: &str) -> String {
        match self {
            Self::MySql => format!("CAST({} AS SIGNED)", expr),
            Self::PostgreSql | Self::SqlServer => format!("CAST({} AS BIGINT)", expr),
        }
    }

    /// Casts an expression to text.
    pub fn text_cast(self, expr: &str) -> String {
        match self {
            Self::MySql => format!("CAST({} AS CHAR)", expr),
            Self::PostgreSql => format!("CAST({} AS TEXT)", expr),
            Self::SqlServer => format!("CAST({} AS NVARCHAR(4000))", expr),
        }
    }

    /// Renders a temporal expression as ISO-8601-like text.
    ///
    /// SQL Server's default `CAST` of `datetime` to text is locale formatted,
    /// so it goes through `CONVERT` style 127 instead.
    pub fn temporal_text_cast(self, expr: &str) -> String {
        match self {
            Self::MySql | Self::PostgreSql => self.text_cast(expr),
            Self::SqlServer => format!("CONVERT(NVARCHAR(40), {}, 127)", expr),
        }
    }

    /// Expression naming the schema whose tables are profiled.
    pub fn current_schema_expr(self) -> &'static str {
        match self {
            Self::MySql => "DATABASE()",
            Self::PostgreSql => "current_schema()",
            Self::SqlServer => "SCHEMA_NAME()",
        }
    }

    /// Returns `true` when a declared column type carries date/time values.
    ///
    /// The heuristic is a case-insensitive `date`/`time` substring match.
    /// SQL Server `timestamp` is a synonym for `rowversion` (binary), so it is
    /// excluded there.
    pub fn is_temporal_type(self, declared_type: &str) -> bool {
        let normalized = declared_type.to_ascii_lowercase();
        let looks_temporal = normalized.contains("date") || normalized.contains("time");
        match self {
            Self::MySql | Self::PostgreSql => looks_temporal,
            Self::SqlServer => {
                let base = normalized.split('(').next().unwrap_or("").trim();
                looks_temporal && base != "timestamp" && base != "rowversion"
            }
        }
    }

    /// Session statements applied to every new connection.
    ///
    /// These enforce read-only sessions, UTC rendering of temporal values and
    /// a server-side statement limit where the engine supports one. SQL
    /// Server has no per-session statement timeout; the client-side timeout
    /// applies alone there.
    pub fn session_setup(self, statement_timeout: Duration, flavor: ServerFlavor) -> Vec<String> {
        let millis = statement_timeout.as_millis();
        match self {
            Self::PostgreSql => vec![
                "SET SESSION CHARACTERISTICS AS TRANSACTION READ ONLY".to_string(),
                format!("SET statement_timeout = {}", millis),
                "SET TIME ZONE 'UTC'".to_string(),
            ],
            Self::MySql => {
                let limit = match flavor {
                    ServerFlavor::Standard => {
                        format!("SET SESSION max_execution_time = {}", millis)
                    }
                    // Seconds, fractional
                    ServerFlavor::MariaDb => format!(
                        "SET SESSION max_statement_time = {:.3}",
                        statement_timeout.as_secs_f64()
                    ),
                };
                vec![
                    "SET SESSION TRANSACTION READ ONLY".to_string(),
                    limit,
                    "SET time_zone = '+00:00'".to_string(),
                ]
            }
            Self::SqlServer => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dialects() {
        assert_eq!("mysql".parse::<Dialect>().unwrap(), Dialect::MySql);
        assert_eq!("PostgreSQL".parse::<Dialect>().unwrap(), Dialect::PostgreSql);
        assert_eq!(" sqlserver ".parse::<Dialect>().unwrap(), Dialect::SqlServer);
    }

    #[test]
    fn test_unsupported_dialect_names_value() {
        let err = "oracle".parse::<Dialect>().unwrap_err();
        match err {
            DbProfilerError::UnsupportedDialect { dialect } => assert_eq!(dialect, "oracle"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_display_round_trips() {
        for dialect in Dialect::ALL {
            assert_eq!(dialect.to_string().parse::<Dialect>().unwrap(), dialect);
        }
    }

    #[test]
    fn test_quote_reserved_words_and_spaces() {
        assert_eq!(
            Dialect::PostgreSql.quote_identifier("select").unwrap(),
            "\"select\""
        );
        assert_eq!(
            Dialect::MySql.quote_identifier("order date").unwrap(),
            "`order date`"
        );
        assert_eq!(
            Dialect::SqlServer.quote_identifier("group").unwrap(),
            "[group]"
        );
    }

    #[test]
    fn test_quote_escapes_injection_attempts() {
        let hostile = "x\"; DROP TABLE users; --";
        let quoted = Dialect::PostgreSql.quote_identifier(hostile).unwrap();
        assert_eq!(quoted, "\"x\"\"; DROP TABLE users; --\"");

        let hostile = "x`; DROP TABLE users; --";
        let quoted = Dialect::MySql.quote_identifier(hostile).unwrap();
        assert_eq!(quoted, "`x``; DROP TABLE users; --`");

        let hostile = "x]; DROP TABLE users; --";
        let quoted = Dialect::SqlServer.quote_identifier(hostile).unwrap();
        assert_eq!(quoted, "[x]]; DROP TABLE users; --]");
    }

    #[test]
    fn test_quote_rejects_unsafe_identifiers() {
        for dialect in Dialect::ALL {
            assert!(dialect.quote_identifier("").is_err());
            assert!(dialect.quote_identifier("a\0b").is_err());
            assert!(dialect.quote_identifier(&"a".repeat(200)).is_err());
        }
        // PostgreSQL limit is in bytes
        assert!(Dialect::PostgreSql.quote_identifier(&"é".repeat(40)).is_err());
        assert!(Dialect::MySql.quote_identifier(&"é".repeat(40)).is_ok());
    }

    #[test]
    fn test_quote_qualified() {
        assert_eq!(
            Dialect::PostgreSql
                .quote_qualified(Some("sales"), "orders")
                .unwrap(),
            "\"sales\".\"orders\""
        );
        assert_eq!(
            Dialect::SqlServer.quote_qualified(None, "orders").unwrap(),
            "[orders]"
        );
        assert_eq!(
            Dialect::MySql.quote_qualified(Some("a.b"), "c").unwrap(),
            "`a.b`.`c`"
        );
    }

    #[test]
    fn test_temporal_heuristic() {
        let pg = Dialect::PostgreSql;
        assert!(pg.is_temporal_type("timestamp without time zone"));
        assert!(pg.is_temporal_type("DATE"));
        assert!(!pg.is_temporal_type("integer"));
        assert!(!pg.is_temporal_type("character varying(255)"));

        assert!(Dialect::MySql.is_temporal_type("DATETIME"));
        assert!(Dialect::MySql.is_temporal_type("timestamp"));

        let mssql = Dialect::SqlServer;
        assert!(mssql.is_temporal_type("datetime2"));
        assert!(mssql.is_temporal_type("datetimeoffset"));
        assert!(!mssql.is_temporal_type("timestamp"));
        assert!(!mssql.is_temporal_type("rowversion"));
    }

    #[test]
    fn test_casts() {
        assert_eq!(Dialect::MySql.bigint_cast("x"), "CAST(x AS SIGNED)");
        assert_eq!(Dialect::PostgreSql.bigint_cast("x"), "CAST(x AS BIGINT)");
        assert_eq!(Dialect::PostgreSql.text_cast("x"), "CAST(x AS TEXT)");
        assert_eq!(
            Dialect::SqlServer.temporal_text_cast("MAX(x)"),
            "CONVERT(NVARCHAR(40), MAX(x), 127)"
        );
    }

    #[test]
    fn test_session_setup_is_read_only() {
        let timeout = Duration::from_secs(30);
        let pg = Dialect::PostgreSql.session_setup(timeout, ServerFlavor::Standard);
        assert!(pg.iter().any(|s| s.contains("READ ONLY")));
        assert!(pg.iter().any(|s| s.contains("30000")));

        let mysql = Dialect::MySql.session_setup(timeout, ServerFlavor::Standard);
        assert!(mysql.iter().any(|s| s.contains("READ ONLY")));
        assert!(mysql.iter().any(|s| s.contains("max_execution_time = 30000")));

        assert!(
            Dialect::SqlServer
                .session_setup(timeout, ServerFlavor::Standard)
                .is_empty()
        );
    }

    #[test]
    fn test_mariadb_uses_max_statement_time() {
        let flavor = ServerFlavor::from_version("10.11.6-MariaDB-1:10.11.6+maria~ubu2204");
        assert_eq!(flavor, ServerFlavor::MariaDb);
        assert_eq!(ServerFlavor::from_version("8.0.36"), ServerFlavor::Standard);

        let setup = Dialect::MySql.session_setup(Duration::from_millis(2500), flavor);
        assert!(setup.contains(&"SET SESSION max_statement_time = 2.500".to_string()));
        assert!(!setup.iter().any(|s| s.contains("max_execution_time")));
        assert!(setup.iter().any(|s| s.contains("READ ONLY")));
    }
}
