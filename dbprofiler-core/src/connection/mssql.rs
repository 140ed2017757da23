//! SQL Server executor over a native TDS connection.

use super::{QueryExecutor, QueryResult, SqlValue};
use crate::config::ProfilerConfig;
use crate::dialect::Dialect;
use crate::error::{DbProfilerError, DriverError, Result, redact_database_url};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use std::time::Duration;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

type TdsClient = Client<Compat<TcpStream>>;

/// Single-connection SQL Server executor.
///
/// Queries are serialized through one client; concurrent table profiling
/// against SQL Server therefore degrades to sequential execution. A query
/// abandoned by a caller-side timeout leaves the TDS stream mid-response, so
/// the next query runs on a fresh connection.
pub struct SqlServerExecutor {
    tds: Config,
    connect_timeout: Duration,
    target: String,
    connection: Guarded<TdsClient>,
}

/// One connection whose in-flight query may be dropped before it completes.
struct Guarded<C> {
    slot: Mutex<Option<Tracked<C>>>,
}

struct Tracked<C> {
    conn: C,
    /// Set while a lease is out; still set if the lease was dropped unfinished
    interrupted: bool,
}

/// Exclusive use of the connection.
///
/// Dropping it without [`Lease::finish`] marks the connection interrupted.
struct Lease<'a, C> {
    guard: MutexGuard<'a, Option<Tracked<C>>>,
}

impl<C> Guarded<C> {
    fn new(conn: C) -> Self {
        Self {
            slot: Mutex::new(Some(Tracked {
                conn,
                interrupted: false,
            })),
        }
    }

    /// Locks the connection, replacing it with `reconnect` first if the
    /// previous lease never finished.
    async fn lease(
        &self,
        reconnect: impl Future<Output = std::result::Result<C, DriverError>>,
    ) -> std::result::Result<Lease<'_, C>, DriverError> {
        let mut guard = self.slot.lock().await;
        let Some(tracked) = guard.as_mut() else {
            return Err("SQL Server connection is closed".into());
        };

        if tracked.interrupted {
            tracing::warn!("Previous SQL Server query was abandoned mid-response; reconnecting");
            tracked.conn = reconnect.await?;
        }
        tracked.interrupted = true;

        Ok(Lease { guard })
    }

    /// Removes the connection; later leases fail.
    async fn take(&self) -> Option<C> {
        self.slot.lock().await.take().map(|tracked| tracked.conn)
    }
}

impl<C> Lease<'_, C> {
    fn conn(&mut self) -> Option<&mut C> {
        self.guard.as_mut().map(|tracked| &mut tracked.conn)
    }

    fn finish(mut self) {
        if let Some(tracked) = self.guard.as_mut() {
            tracked.interrupted = false;
        }
    }
}

impl std::fmt::Debug for SqlServerExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlServerExecutor").finish_non_exhaustive()
    }
}

/// Builds a tiberius config from an `mssql://` URL.
fn tds_config(url: &str) -> Result<Config> {
    let parsed = ::url::Url::parse(url).map_err(|e| {
        DbProfilerError::configuration(format!("Invalid SQL Server connection URL: {}", e))
    })?;

    if parsed.scheme() != Dialect::SqlServer.url_scheme() {
        return Err(DbProfilerError::configuration(
            "SQL Server connection URL must use the mssql:// scheme",
        ));
    }

    let decode = |raw: &str| {
        urlencoding::decode(raw)
            .map(|s| s.into_owned())
            .map_err(|_| DbProfilerError::configuration("SQL Server credentials are not valid UTF-8"))
    };
    let username = decode(parsed.username())?;
    let password = decode(parsed.password().unwrap_or(""))?;
    let database = decode(parsed.path().trim_start_matches('/'))?;

    let mut encrypt = true;
    let mut trust_server_certificate = false;
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "encrypt" => encrypt = value == "true",
            "trust_server_certificate" => trust_server_certificate = value == "true",
            _ => {}
        }
    }

    let mut config = Config::new();
    config.host(parsed.host_str().unwrap_or("localhost"));
    config.port(parsed.port().unwrap_or(Dialect::SqlServer.default_port()));
    config.database(database);
    config.authentication(AuthMethod::sql_server(username, password));
    config.application_name(concat!("dbprofiler-", env!("CARGO_PKG_VERSION")));
    config.encryption(if encrypt {
        EncryptionLevel::Required
    } else {
        EncryptionLevel::Off
    });
    if trust_server_certificate {
        config.trust_cert();
    }

    Ok(config)
}

/// Decodes one cell, trying typed columns before raw bytes so `BIT` does
/// not come back as bytes.
fn decode_value(row: &tiberius::Row, index: usize) -> SqlValue {
    if let Ok(Some(v)) = row.try_get::<bool, _>(index) {
        return SqlValue::Bool(v);
    }
    if let Ok(Some(v)) = row.try_get::<u8, _>(index) {
        return SqlValue::Int(i64::from(v));
    }
    if let Ok(Some(v)) = row.try_get::<i16, _>(index) {
        return SqlValue::Int(i64::from(v));
    }
    if let Ok(Some(v)) = row.try_get::<i32, _>(index) {
        return SqlValue::Int(i64::from(v));
    }
    if let Ok(Some(v)) = row.try_get::<i64, _>(index) {
        return SqlValue::Int(v);
    }
    if let Ok(Some(v)) = row.try_get::<f32, _>(index) {
        return SqlValue::Float(f64::from(v));
    }
    if let Ok(Some(v)) = row.try_get::<f64, _>(index) {
        return SqlValue::Float(v);
    }
    if let Ok(Some(v)) = row.try_get::<tiberius::numeric::Numeric, _>(index) {
        return SqlValue::Text(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<&str, _>(index) {
        return SqlValue::Text(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<chrono::NaiveDateTime, _>(index) {
        return SqlValue::Text(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(v)) = row.try_get::<chrono::DateTime<chrono::FixedOffset>, _>(index) {
        return SqlValue::Text(v.to_rfc3339());
    }
    if let Ok(Some(v)) = row.try_get::<chrono::NaiveDate, _>(index) {
        return SqlValue::Text(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<chrono::NaiveTime, _>(index) {
        return SqlValue::Text(v.to_string());
    }
    if let Ok(Some(v)) = row.try_get::<tiberius::Uuid, _>(index) {
        return SqlValue::Text(v.to_string());
    }
    if let Ok(Some(bytes)) = row.try_get::<&[u8], _>(index) {
        return SqlValue::Bytes(bytes.to_vec());
    }

    SqlValue::Null
}

/// Opens and authenticates one TDS session.
async fn open_client(tds: Config, connect_timeout: Duration, target: &str) -> Result<TdsClient> {
    let tcp = tokio::time::timeout(connect_timeout, TcpStream::connect(tds.get_addr()))
        .await
        .map_err(|_| {
            DbProfilerError::connectivity(
                format!("Failed to connect to {}", target),
                format!("connection timed out after {}s", connect_timeout.as_secs()),
            )
        })?
        .map_err(|e| DbProfilerError::connectivity(format!("Failed to connect to {}", target), e))?;
    tcp.set_nodelay(true).ok();

    Client::connect(tds, tcp.compat_write())
        .await
        .map_err(|e| DbProfilerError::connectivity(format!("Failed to authenticate to {}", target), e))
}

async fn run_query(
    client: &mut TdsClient,
    sql: &str,
    max_rows: Option<usize>,
) -> std::result::Result<QueryResult, DriverError> {
    let mut stream = client.simple_query(sql).await?;
    let columns = stream
        .columns()
        .await?
        .map(|cols| cols.iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    let rows = stream.into_row_stream();
    let rows: Vec<tiberius::Row> = match max_rows {
        Some(limit) => rows.take(limit).try_collect().await?,
        None => rows.try_collect().await?,
    };

    let rows = rows
        .iter()
        .map(|row| (0..row.len()).map(|i| decode_value(row, i)).collect())
        .collect();

    Ok(QueryResult { columns, rows })
}

impl SqlServerExecutor {
    /// Connects and authenticates one TDS session.
    ///
    /// # Errors
    /// Returns `Connectivity` with a redacted URL on TCP, TLS or login failure.
    pub async fn connect(url: &str, config: &ProfilerConfig) -> Result<Self> {
        let tds = tds_config(url)?;
        let target = redact_database_url(url);
        let client = open_client(tds.clone(), config.connect_timeout, &target).await?;

        Ok(Self {
            tds,
            connect_timeout: config.connect_timeout,
            target,
            connection: Guarded::new(client),
        })
    }
}

#[async_trait]
impl QueryExecutor for SqlServerExecutor {
    fn dialect(&self) -> Dialect {
        Dialect::SqlServer
    }

    async fn fetch(
        &self,
        sql: &str,
        max_rows: Option<usize>,
    ) -> std::result::Result<QueryResult, DriverError> {
        let reconnect = async {
            Ok::<_, DriverError>(
                open_client(self.tds.clone(), self.connect_timeout, &self.target).await?,
            )
        };
        let mut lease = self.connection.lease(reconnect).await?;
        let client = lease.conn().ok_or("SQL Server connection is closed")?;
        let result = run_query(client, sql, max_rows).await;
        lease.finish();
        result
    }

    async fn close(&self) {
        if let Some(client) = self.connection.take().await
            && let Err(e) = client.close().await
        {
            tracing::debug!("Error while closing SQL Server connection: {}", e);
        }
    }
}
