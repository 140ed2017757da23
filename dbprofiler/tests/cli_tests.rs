//! Command-line parsing and handler tests.
//!
//! Every test that parses connection flags runs under `temp_env` so the
//! `DBPROFILER_*` variables of the surrounding shell cannot leak in.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::uninlined_format_args)]

use clap::Parser;
use dbprofiler::cli::{Cli, Command, PASSWORD_ENV};
use dbprofiler::commands;
use dbprofiler_core::config::{MySqlSslMode, PostgresSslMode, TransportPolicy};
use dbprofiler_core::{DbProfilerError, Dialect, ErrorStage};
use std::time::Duration;

const ENV_VARS: [&str; 6] = [
    "DBPROFILER_DIALECT",
    "DBPROFILER_HOST",
    "DBPROFILER_PORT",
    "DBPROFILER_DATABASE",
    "DBPROFILER_USER",
    PASSWORD_ENV,
];

/// Runs `f` with every `DBPROFILER_*` variable unset except `overrides`.
fn with_env<R>(overrides: &[(&str, &str)], f: impl FnOnce() -> R) -> R {
    let vars: Vec<(&str, Option<&str>)> = ENV_VARS
        .iter()
        .map(|name| {
            let value = overrides
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| *value);
            (*name, value)
        })
        .collect();
    temp_env::with_vars(vars, f)
}

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).expect("arguments should parse")
}

#[test]
fn test_profile_flags() {
    with_env(&[], || {
        let cli = parse(&[
            "dbprofiler",
            "profile",
            "--dialect",
            "postgresql",
            "--host",
            "db.internal",
            "-d",
            "shop",
            "-U",
            "reader",
            "--concurrency",
            "4",
            "--continue-on-error",
            "-o",
            "profile.json",
        ]);

        let Command::Profile(args) = cli.command else {
            panic!("expected profile command");
        };
        assert_eq!(args.target.connection.dialect, Dialect::PostgreSql);
        assert_eq!(args.target.connection.host, "db.internal");
        assert_eq!(args.target.connection.port, None);
        assert_eq!(args.output.output.unwrap().to_str(), Some("profile.json"));

        let config = args.target.config().unwrap();
        assert_eq!(config.max_concurrent_tables, 4);
        assert!(config.max_connections >= 4);
        assert!(config.continue_on_error);
        assert_eq!(config.query_timeout, Duration::from_secs(30));
        assert_eq!(config.transport, TransportPolicy::default());
    });
}

#[test]
fn test_connection_settings_from_environment() {
    with_env(
        &[
            ("DBPROFILER_DIALECT", "mysql"),
            ("DBPROFILER_PORT", "3307"),
            ("DBPROFILER_DATABASE", "shop"),
            ("DBPROFILER_USER", "reader"),
            (PASSWORD_ENV, "p@ss:word"),
        ],
        || {
            let cli = parse(&["dbprofiler", "schema"]);
            let Command::Schema(args) = cli.command else {
                panic!("expected schema command");
            };

            let spec = args.target.spec().unwrap();
            assert_eq!(spec.dialect, Dialect::MySql);
            assert_eq!(spec.host, "localhost");
            assert_eq!(spec.port, 3307);
            assert_eq!(spec.database, "shop");

            // The password is only reachable through the connection URL
            let debug = format!("{:?}", spec);
            assert!(!debug.contains("p@ss:word"));
            let url = dbprofiler_core::connection::build_connection_url(
                &spec,
                &args.target.config().unwrap().transport,
            )
            .unwrap();
            assert!(url.contains("reader:p%40ss%3Aword@localhost:3307/shop"));
        },
    );
}

#[test]
fn test_flags_override_environment() {
    with_env(
        &[("DBPROFILER_DIALECT", "mysql"), ("DBPROFILER_USER", "reader")],
        || {
            let cli = parse(&["dbprofiler", "test", "--dialect", "postgresql", "-d", "shop"]);
            let Command::Test(args) = cli.command else {
                panic!("expected test command");
            };
            assert_eq!(args.target.connection.dialect, Dialect::PostgreSql);
            assert_eq!(args.target.connection.username, "reader");
        },
    );
}

#[test]
fn test_unknown_dialect_is_rejected() {
    with_env(&[], || {
        let err = Cli::try_parse_from([
            "dbprofiler", "schema", "--dialect", "oracle", "-d", "shop", "-U", "reader",
        ])
        .unwrap_err();
        assert!(err.to_string().contains("oracle"));
    });
}

#[test]
fn test_missing_database_is_rejected() {
    with_env(&[], || {
        assert!(
            Cli::try_parse_from(["dbprofiler", "schema", "--dialect", "mysql", "-U", "reader"])
                .is_err()
        );
    });
}

#[test]
fn test_transport_flags() {
    with_env(&[], || {
        let cli = parse(&[
            "dbprofiler",
            "test",
            "--dialect",
            "postgresql",
            "-d",
            "shop",
            "-U",
            "reader",
            "--pg-sslmode",
            "verify-full",
        ]);
        let Command::Test(args) = cli.command else {
            panic!("expected test command");
        };
        let policy = args.target.transport.policy();
        assert_eq!(policy.postgres_ssl_mode, PostgresSslMode::VerifyFull);
        assert_eq!(policy.mysql_ssl_mode, MySqlSslMode::Required);
        assert!(policy.mssql_encrypt);

        let cli = parse(&[
            "dbprofiler", "test", "--dialect", "postgresql", "-d", "shop", "-U", "reader",
            "--insecure",
        ]);
        let Command::Test(args) = cli.command else {
            panic!("expected test command");
        };
        assert_eq!(args.target.transport.policy(), TransportPolicy::insecure());
    });
}

#[test]
fn test_insecure_conflicts_with_ssl_mode() {
    with_env(&[], || {
        assert!(
            Cli::try_parse_from([
                "dbprofiler",
                "test",
                "--dialect",
                "postgresql",
                "-d",
                "shop",
                "-U",
                "reader",
                "--insecure",
                "--pg-sslmode",
                "require",
            ])
            .is_err()
        );
    });
}

#[test]
fn test_invalid_tuning_is_a_configuration_error() {
    with_env(&[], || {
        let cli = parse(&[
            "dbprofiler", "profile", "--dialect", "mysql", "-d", "shop", "-U", "reader",
            "--concurrency", "0",
        ]);
        let Command::Profile(args) = cli.command else {
            panic!("expected profile command");
        };
        let err = args.target.config().unwrap_err();
        assert_eq!(err.stage(), ErrorStage::Configuration);

        let cli = parse(&[
            "dbprofiler", "profile", "--dialect", "mysql", "-d", "shop", "-U", "reader",
            "--query-timeout", "0",
        ]);
        let Command::Profile(args) = cli.command else {
            panic!("expected profile command");
        };
        assert!(args.target.config().is_err());
    });
}

#[test]
fn test_query_arguments() {
    with_env(&[], || {
        let cli = parse(&[
            "dbprofiler",
            "-v",
            "query",
            "--dialect",
            "postgresql",
            "-d",
            "shop",
            "-U",
            "reader",
            "--limit",
            "25",
            "SELECT id FROM orders",
            "-q",
        ]);
        assert_eq!(cli.global.verbose, 1);
        assert!(cli.global.quiet);
        let Command::Query(args) = cli.command else {
            panic!("expected query command");
        };
        assert_eq!(args.sql, "SELECT id FROM orders");
        assert_eq!(args.limit, Some(25));
    });
}

#[tokio::test]
async fn test_list_saved_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema.json");
    let document = serde_json::json!({
        "schema": [{
            "table_name": "orders",
            "columns": [{"name": "id", "type": "integer", "nullable": false, "default": "None"}],
            "primary_keys": ["id"],
            "foreign_keys": []
        }]
    });
    std::fs::write(&path, document.to_string()).unwrap();

    let path_arg = path.to_str().unwrap();
    let cli = parse(&["dbprofiler", "list", path_arg, "--table", "orders"]);
    assert!(commands::run(&cli.command).await.is_ok());

    let cli = parse(&["dbprofiler", "list", path_arg, "--table", "invoices"]);
    let err = commands::run(&cli.command).await.unwrap_err();
    assert!(matches!(err, DbProfilerError::Configuration { .. }));
}

#[tokio::test]
async fn test_list_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let cli = parse(&["dbprofiler", "list", path.to_str().unwrap()]);

    let err = commands::run(&cli.command).await.unwrap_err();
    assert!(matches!(err, DbProfilerError::Io { .. }));
}

#[cfg(feature = "postgresql")]
#[test]
fn test_failed_connection_does_not_leak_password() {
    const SENSITIVE_PASSWORD: &str = "super_secret_password_123";

    with_env(&[(PASSWORD_ENV, SENSITIVE_PASSWORD)], || {
        let cli = parse(&[
            "dbprofiler",
            "test",
            "--dialect",
            "postgresql",
            "--host",
            "127.0.0.1",
            "--port",
            "1",
            "-d",
            "shop",
            "-U",
            "reader",
            "--insecure",
            "--connect-timeout",
            "2",
        ]);

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let err = runtime
            .block_on(commands::run(&cli.command))
            .expect_err("nothing listens on port 1");

        assert_eq!(err.stage(), ErrorStage::Connectivity);
        let message = err.detailed_message();
        assert!(
            !message.contains(SENSITIVE_PASSWORD),
            "Password leaked in error message: {}",
            message
        );
    });
}

#[cfg(not(feature = "mssql"))]
#[test]
fn test_sqlserver_requires_feature() {
    with_env(&[(PASSWORD_ENV, "secret")], || {
        let cli = parse(&[
            "dbprofiler", "test", "--dialect", "sqlserver", "-d", "master", "-U", "sa",
        ]);

        let runtime = tokio::runtime::Runtime::new().unwrap();
        let err = runtime.block_on(commands::run(&cli.command)).unwrap_err();
        assert!(err.detailed_message().contains("--features mssql"));
    });
}
