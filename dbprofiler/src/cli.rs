//! Command-line arguments.
//!
//! Connection settings come from flags or `DBPROFILER_*` environment
//! variables. The password is never accepted as a flag: it is read from
//! `DBPROFILER_PASSWORD` or prompted for without echo.

use clap::{Args, Parser, Subcommand};
use dbprofiler_core::config::{MySqlSslMode, PostgresSslMode, TransportPolicy};
use dbprofiler_core::{ConnectionSpec, DbProfilerError, Dialect, ProfilerConfig, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use zeroize::Zeroizing;

/// Environment variable holding the database password.
pub const PASSWORD_ENV: &str = "DBPROFILER_PASSWORD";

#[derive(Debug, Parser)]
#[command(name = "dbprofiler")]
#[command(about = "Relational schema extraction and data-quality profiling")]
#[command(version)]
#[command(long_about = "
dbprofiler - Schema extraction and data-quality profiling

Connects to a relational database and produces two JSON documents:
- schema:  tables, columns, primary keys and foreign keys
- profile: per-table completeness, freshness and key health

SECURITY FEATURES:
- Read-only operations only
- Password read from DBPROFILER_PASSWORD or prompted, never a flag
- TLS required by default (use --insecure for local development)
- Output documents are validated before they are written

SUPPORTED DATABASES:
- PostgreSQL (--dialect postgresql)
- MySQL / MariaDB (--dialect mysql)
- SQL Server (--dialect sqlserver) [if compiled with --features mssql]

EXAMPLES:
  dbprofiler test --dialect postgresql --database shop -U reader
  dbprofiler profile --dialect mysql --database shop -U reader -o profile.json
  dbprofiler query --dialect postgresql --database shop -U reader 'SELECT count(*) FROM orders'
  dbprofiler list profile.json --table orders
")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Test database connection with a liveness probe
    Test(TestArgs),
    /// Extract table structure into a schema document
    Schema(SchemaArgs),
    /// Profile completeness, freshness and key health of every table
    Profile(ProfileArgs),
    /// Run one read-only query and print the rows as JSON
    Query(QueryArgs),
    /// Summarize a saved schema or profile document
    List(ListArgs),
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all logs except errors")]
    pub quiet: bool,
}

#[derive(Debug, Args)]
pub struct TestArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Debug, Args)]
pub struct SchemaArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(Debug, Args)]
pub struct ProfileArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    /// Also write the schema document used for profiling
    #[arg(long, value_name = "FILE")]
    pub schema_output: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub output: OutputArgs,

    /// A single SELECT or WITH statement
    #[arg(value_name = "SQL")]
    pub sql: String,

    /// Maximum rows to return (1-200)
    #[arg(long, value_name = "ROWS")]
    pub limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Saved schema or profile document
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Only show this table
    #[arg(long, value_name = "NAME")]
    pub table: Option<String>,
}

#[derive(Debug, Args)]
pub struct OutputArgs {
    /// Output file path (stdout when omitted)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Everything needed to reach and profile one database.
#[derive(Debug, Args)]
pub struct TargetArgs {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub transport: TransportArgs,

    #[command(flatten)]
    pub tuning: TuningArgs,
}

impl TargetArgs {
    /// Builds the connection spec, reading the password from the
    /// environment or prompting for it.
    pub fn spec(&self) -> Result<ConnectionSpec> {
        let password = resolve_password(&self.connection.username)?;
        Ok(self.connection.spec_with_password(&password))
    }

    /// Builds and validates the run configuration.
    pub fn config(&self) -> Result<ProfilerConfig> {
        self.tuning.config(self.transport.policy())
    }
}

#[derive(Debug, Args)]
pub struct ConnectionArgs {
    /// Database dialect: mysql, postgresql or sqlserver
    #[arg(long, env = "DBPROFILER_DIALECT", value_parser = parse_with::<Dialect>)]
    pub dialect: Dialect,

    /// Database server host
    #[arg(long, env = "DBPROFILER_HOST", default_value = "localhost")]
    pub host: String,

    /// Server port (defaults to the dialect's standard port)
    #[arg(long, env = "DBPROFILER_PORT")]
    pub port: Option<u16>,

    /// Database to connect to
    #[arg(short, long, env = "DBPROFILER_DATABASE")]
    pub database: String,

    /// Login name
    #[arg(short = 'U', long, env = "DBPROFILER_USER")]
    pub username: String,
}

impl ConnectionArgs {
    pub fn spec_with_password(&self, password: &str) -> ConnectionSpec {
        let spec = ConnectionSpec::new(
            self.dialect,
            &self.host,
            &self.database,
            &self.username,
            password,
        );
        match self.port {
            Some(port) => spec.with_port(port),
            None => spec,
        }
    }
}

#[derive(Debug, Args)]
pub struct TransportArgs {
    /// PostgreSQL sslmode (disable, prefer, require, verify-ca, verify-full)
    #[arg(long, value_name = "MODE", value_parser = parse_with::<PostgresSslMode>)]
    pub pg_sslmode: Option<PostgresSslMode>,

    /// MySQL ssl-mode (disabled, preferred, required, verify_ca, verify_identity)
    #[arg(long, value_name = "MODE", value_parser = parse_with::<MySqlSslMode>)]
    pub mysql_ssl_mode: Option<MySqlSslMode>,

    /// Accept any SQL Server certificate (development servers only)
    #[arg(long)]
    pub trust_server_certificate: bool,

    /// Disable TLS for every dialect (local development only)
    #[arg(long, conflicts_with_all = ["pg_sslmode", "mysql_ssl_mode"])]
    pub insecure: bool,
}

impl TransportArgs {
    pub fn policy(&self) -> TransportPolicy {
        if self.insecure {
            return TransportPolicy::insecure();
        }
        let mut policy = TransportPolicy::default();
        if let Some(mode) = self.pg_sslmode {
            policy.postgres_ssl_mode = mode;
        }
        if let Some(mode) = self.mysql_ssl_mode {
            policy.mysql_ssl_mode = mode;
        }
        policy.mssql_trust_server_certificate = self.trust_server_certificate;
        policy
    }
}

#[derive(Debug, Args)]
pub struct TuningArgs {
    /// Connection establishment timeout
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub connect_timeout: u64,

    /// Timeout for each generated query
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    pub query_timeout: u64,

    /// Maximum pooled connections
    #[arg(long, default_value_t = 5)]
    pub max_connections: u32,

    /// Columns counted per batched query
    #[arg(long, default_value_t = 64)]
    pub count_batch_size: usize,

    /// Tables profiled at the same time (1-32)
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,

    /// Record failing tables and keep profiling the rest
    #[arg(long)]
    pub continue_on_error: bool,
}

impl TuningArgs {
    pub fn config(&self, transport: TransportPolicy) -> Result<ProfilerConfig> {
        let config = ProfilerConfig::new()
            .with_connect_timeout(Duration::from_secs(self.connect_timeout))
            .with_query_timeout(Duration::from_secs(self.query_timeout))
            .with_max_connections(self.max_connections)
            .with_count_batch_size(self.count_batch_size)
            .with_max_concurrent_tables(self.concurrency)?
            .with_continue_on_error(self.continue_on_error)
            .with_transport(transport);
        config.validate()?;
        Ok(config)
    }
}

/// Reads the password from `DBPROFILER_PASSWORD`, falling back to an
/// interactive prompt.
pub fn resolve_password(username: &str) -> Result<Zeroizing<String>> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(Zeroizing::new(password));
    }

    rpassword::prompt_password(format!("Password for {}: ", username))
        .map(Zeroizing::new)
        .map_err(|e| DbProfilerError::Io {
            context: "Failed to read password".to_string(),
            source: e,
        })
}

fn parse_with<T>(value: &str) -> std::result::Result<T, String>
where
    T: FromStr<Err = DbProfilerError>,
{
    value.parse().map_err(|e: DbProfilerError| e.to_string())
}
