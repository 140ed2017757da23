//! Allow-list check for ad hoc SQL.
//!
//! The text is tokenized and parsed with the session engine's own SQL
//! dialect, so string literals, quoted identifiers and comments follow that
//! engine's rules (MySQL backslash escapes and `#` comments, PostgreSQL
//! dollar quoting, SQL Server brackets). Keywords that only appear inside
//! them do not count.

use crate::dialect::Dialect;
use crate::error::{DbProfilerError, Result};
use sqlparser::ast::Statement;
use sqlparser::dialect::{Dialect as SqlDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};
use std::collections::BTreeSet;

/// Keywords that can change data, schema, session state or privileges.
pub const BLOCKED_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "TRUNCATE", "CREATE", "REPLACE", "MERGE",
    "CALL", "EXEC", "GRANT", "REVOKE", "COMMIT", "ROLLBACK", "SAVEPOINT", "SET", "USE", "ATTACH",
    "DETACH", "VACUUM", "ANALYZE", "REFRESH", "COPY", "LOAD", "UNLOAD", "INTO",
];

fn sql_dialect(dialect: Dialect) -> Box<dyn SqlDialect> {
    match dialect {
        Dialect::PostgreSql => Box::new(PostgreSqlDialect {}),
        Dialect::MySql => Box::new(MySqlDialect {}),
        Dialect::SqlServer => Box::new(MsSqlDialect {}),
    }
}

/// Accepts exactly one `SELECT` or `WITH` statement free of blocked keywords.
///
/// A trailing `;` is allowed. The statement must also parse as a query in
/// `dialect`.
///
/// # Errors
/// Returns `UnsafeSql` naming the reason; for blocked keywords the sorted,
/// de-duplicated list is carried in `blocked_keywords`.
///
/// # Example
/// ```rust
/// use dbprofiler_core::Dialect;
/// use dbprofiler_core::readonly::validate_read_only_sql;
///
/// assert!(validate_read_only_sql("SELECT 'drop table' AS note;", Dialect::PostgreSql).is_ok());
/// assert!(validate_read_only_sql("SELECT 1; DROP TABLE users", Dialect::MySql).is_err());
/// ```
pub fn validate_read_only_sql(sql: &str, dialect: Dialect) -> Result<()> {
    if sql.trim().is_empty() {
        return Err(unsafe_sql("query is empty; provide a SELECT query"));
    }

    let sql_dialect = sql_dialect(dialect);
    let tokens = Tokenizer::new(&*sql_dialect, sql)
        .tokenize()
        .map_err(|e| unsafe_sql(&format!("could not tokenize query: {}", e)))?;

    let significant: Vec<&Token> = tokens
        .iter()
        .filter(|token| !matches!(token, Token::Whitespace(_) | Token::EOF))
        .collect();
    let statements: Vec<&[&Token]> = significant
        .split(|token| matches!(token, Token::SemiColon))
        .filter(|statement| !statement.is_empty())
        .collect();
    let statement = match statements.as_slice() {
        [statement] => *statement,
        [] => return Err(unsafe_sql("only read-only SELECT/CTE queries are allowed")),
        _ => return Err(unsafe_sql("only a single read-only SQL statement is allowed")),
    };

    let mut words = statement.iter().filter_map(|token| match token {
        Token::Word(word) if word.quote_style.is_none() => Some(word.value.to_uppercase()),
        _ => None,
    });
    if !matches!(words.next().as_deref(), Some("SELECT" | "WITH")) {
        return Err(unsafe_sql("only read-only SELECT/CTE queries are allowed"));
    }

    let blocked: BTreeSet<&str> = statement
        .iter()
        .filter_map(|token| match token {
            Token::Word(word) if word.quote_style.is_none() => BLOCKED_KEYWORDS
                .iter()
                .copied()
                .find(|k| k.eq_ignore_ascii_case(&word.value)),
            _ => None,
        })
        .collect();
    if !blocked.is_empty() {
        let blocked: Vec<String> = blocked.into_iter().map(str::to_string).collect();
        return Err(DbProfilerError::UnsafeSql {
            reason: format!(
                "query contains forbidden keywords: {}",
                blocked.join(", ")
            ),
            blocked_keywords: blocked,
        });
    }

    let parsed = Parser::parse_sql(&*sql_dialect, sql)
        .map_err(|e| unsafe_sql(&format!("could not parse query: {}", e)))?;
    match parsed.as_slice() {
        [Statement::Query(_)] => Ok(()),
        _ => Err(unsafe_sql("only read-only SELECT/CTE queries are allowed")),
    }
}

fn unsafe_sql(reason: &str) -> DbProfilerError {
    DbProfilerError::UnsafeSql {
        reason: reason.to_string(),
        blocked_keywords: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PG: Dialect = Dialect::PostgreSql;
    const MYSQL: Dialect = Dialect::MySql;
    const MSSQL: Dialect = Dialect::SqlServer;

    fn blocked(sql: &str) -> Vec<String> {
        match validate_read_only_sql(sql, PG) {
            Err(DbProfilerError::UnsafeSql {
                blocked_keywords, ..
            }) => blocked_keywords,
            other => panic!("expected UnsafeSql, got {:?}", other),
        }
    }

    fn reason(sql: &str, dialect: Dialect) -> String {
        match validate_read_only_sql(sql, dialect) {
            Err(DbProfilerError::UnsafeSql { reason, .. }) => reason,
            other => panic!("expected UnsafeSql, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_selects_pass() {
        for dialect in Dialect::ALL {
            assert!(validate_read_only_sql("SELECT * FROM orders", dialect).is_ok());
            assert!(
                validate_read_only_sql("  select id from orders where id > 3;  ", dialect).is_ok()
            );
            assert!(
                validate_read_only_sql(
                    "WITH recent AS (SELECT * FROM orders) SELECT COUNT(*) FROM recent",
                    dialect
                )
                .is_ok()
            );
        }
    }

    #[test]
    fn test_keywords_inside_literals_are_ignored() {
        assert!(validate_read_only_sql("SELECT 'DROP TABLE users; --' AS note", PG).is_ok());
        assert!(validate_read_only_sql("SELECT \"update\" FROM \"insert\"", PG).is_ok());
        assert!(validate_read_only_sql("SELECT 'it''s; fine'", MYSQL).is_ok());
        assert!(validate_read_only_sql("SELECT 'C:\\temp' AS path", PG).is_ok());
        assert!(validate_read_only_sql("SELECT $$hello world$$", PG).is_ok());
    }

    #[test]
    fn test_identifier_quoting_follows_dialect() {
        assert!(validate_read_only_sql("SELECT `set` FROM t", MYSQL).is_ok());
        assert!(validate_read_only_sql("SELECT `set` FROM t", PG).is_err());
        assert!(validate_read_only_sql("SELECT [delete] FROM t", MSSQL).is_ok());
        assert!(validate_read_only_sql("SELECT [delete] FROM t", PG).is_err());
    }

    #[test]
    fn test_comments_are_ignored() {
        for dialect in Dialect::ALL {
            assert!(validate_read_only_sql("SELECT 1 -- DROP TABLE users", dialect).is_ok());
            assert!(validate_read_only_sql("/* DELETE */ SELECT 1", dialect).is_ok());
            assert!(validate_read_only_sql("SELECT 1 /* ; UPDATE t SET x = 1 */", dialect).is_ok());
        }
    }

    #[test]
    fn test_empty_query_rejected() {
        assert!(reason("   ", PG).contains("empty"));
    }

    #[test]
    fn test_multiple_statements_rejected() {
        assert!(reason("SELECT 1; SELECT 2", PG).contains("single"));
        assert!(reason("SELECT 1; DROP TABLE users", MYSQL).contains("single"));
        assert!(validate_read_only_sql("SELECT 1;;", PG).is_ok());
    }

    #[test]
    fn test_non_select_rejected() {
        assert!(reason("UPDATE t SET x = 1", PG).contains("SELECT/CTE"));
        assert!(reason("EXPLAIN SELECT 1", PG).contains("SELECT/CTE"));
        assert!(reason("-- comment only", PG).contains("SELECT/CTE"));
    }

    #[test]
    fn test_blocked_keywords_sorted_and_unique() {
        assert_eq!(blocked("SELECT * INTO backup FROM users"), vec!["INTO"]);
        assert_eq!(
            blocked("WITH d AS (DELETE FROM t RETURNING *) SELECT * FROM d; "),
            vec!["DELETE"]
        );
        assert_eq!(
            blocked("with x as (update t set a = 1 returning a) select * from x into y"),
            vec!["INTO", "SET", "UPDATE"]
        );
    }

    #[test]
    fn test_string_escapes_follow_dialect() {
        // A backslash before the quote ends the string in PostgreSQL
        let escaped = "SELECT '\\'; DROP TABLE t; --'";
        assert!(validate_read_only_sql(escaped, PG).is_err());
        assert!(validate_read_only_sql(escaped, MYSQL).is_ok());
    }

    #[test]
    fn test_hash_comment_is_mysql_only() {
        let hashed = "SELECT 1 # 2; DROP TABLE t";
        assert!(validate_read_only_sql(hashed, MYSQL).is_ok());
        assert!(validate_read_only_sql(hashed, PG).is_err());
    }

    #[test]
    fn test_dollar_quoted_body_is_literal() {
        assert!(validate_read_only_sql("SELECT $b$ x; DELETE FROM t; $b$", PG).is_ok());
    }

    #[test]
    fn test_unterminated_text_rejected() {
        assert!(reason("SELECT 'open", PG).contains("tokenize"));
        assert!(reason("SELECT 1 /* open", MYSQL).contains("tokenize"));
    }

    #[test]
    fn test_unparseable_select_rejected() {
        assert!(reason("SELECT * FROM", PG).contains("parse"));
    }

    #[test]
    fn test_identifiers_containing_keywords_pass() {
        assert!(validate_read_only_sql("SELECT updated_at, created_by FROM settings", PG).is_ok());
    }
}
