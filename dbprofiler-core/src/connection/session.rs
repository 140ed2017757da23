//! Connection lifecycle: open, probe, use, close.

use super::{ConnectionSpec, QueryExecutor, create_executor, fetch_with_timeout};
use crate::config::ProfilerConfig;
use crate::dialect::Dialect;
use crate::error::{DbProfilerError, Result};
use crate::models::{ProfileRun, TableSchema};
use crate::readonly::QuerySession;
use crate::{profiler, schema};

const PROBE_SQL: &str = "SELECT 1";

/// Result of a liveness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub ok: bool,
    pub message: String,
}

impl ProbeOutcome {
    fn success() -> Self {
        Self {
            ok: true,
            message: "Connection successful".to_string(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// An open, probed connection to one database.
///
/// Call [`Session::close`] when done, or use [`run_with_session`] which
/// closes on every exit path.
pub struct Session {
    executor: Box<dyn QueryExecutor>,
    database: String,
    config: ProfilerConfig,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("dialect", &self.executor.dialect())
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Connects and verifies the database answers `SELECT 1`.
    ///
    /// # Errors
    /// - `Configuration` for an invalid spec or config
    /// - `UnsupportedFeature` if the dialect's driver is not compiled in
    /// - `Connectivity` if the connection or the probe fails
    pub async fn open(spec: &ConnectionSpec, config: &ProfilerConfig) -> Result<Self> {
        spec.validate()?;
        let executor = create_executor(spec, config).await?;
        let session = Self::from_executor(executor, spec.database.clone(), config.clone());

        let outcome = session.probe().await;
        if !outcome.ok {
            session.close().await;
            return Err(DbProfilerError::connectivity(
                format!("liveness probe against '{}' failed", spec.database),
                outcome.message,
            ));
        }

        tracing::info!(
            "Connected to {} database '{}' on {}:{}",
            spec.dialect,
            spec.database,
            spec.host,
            spec.port
        );
        Ok(session)
    }

    /// Wraps an already connected executor without probing it.
    pub fn from_executor(
        executor: Box<dyn QueryExecutor>,
        database: impl Into<String>,
        config: ProfilerConfig,
    ) -> Self {
        Self {
            executor,
            database: database.into(),
            config,
        }
    }

    /// Runs the liveness probe. Never fails; the outcome carries the reason.
    pub async fn probe(&self) -> ProbeOutcome {
        let result = fetch_with_timeout(
            self.executor.as_ref(),
            PROBE_SQL,
            Some(1),
            self.config.connect_timeout,
            "liveness probe",
        )
        .await;

        match result {
            Ok(result) if result.scalar().and_then(|v| v.as_i64()) == Some(1) => {
                ProbeOutcome::success()
            }
            Ok(result) => ProbeOutcome::failure(format!(
                "unexpected probe result: {:?}",
                result.scalar()
            )),
            Err(e) => ProbeOutcome::failure(e.to_string()),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.executor.dialect()
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn executor(&self) -> &dyn QueryExecutor {
        self.executor.as_ref()
    }

    /// Extracts the current schema's structure.
    pub async fn extract_schema(&self) -> Result<Vec<TableSchema>> {
        schema::extract_schema_with_timeout(self.executor(), self.config.query_timeout).await
    }

    /// Profiles the given tables with this session's config.
    pub async fn profile(&self, tables: &[TableSchema]) -> Result<ProfileRun> {
        profiler::profile_tables(self.executor(), tables, &self.config).await
    }

    /// Read-only ad hoc query context bound to this session.
    pub fn query_session(&self) -> QuerySession<'_> {
        QuerySession::new(self.executor(), &self.database)
    }

    /// Releases every connection.
    pub async fn close(self) {
        self.executor.close().await;
        tracing::debug!("Closed connection to '{}'", self.database);
    }
}

/// Opens a session, runs `f` and closes the session whatever `f` returns.
///
/// # Example
/// ```rust,no_run
/// use dbprofiler_core::connection::{ConnectionSpec, run_with_session};
/// use dbprofiler_core::{Dialect, ProfilerConfig};
///
/// # async fn example() -> dbprofiler_core::Result<()> {
/// let spec = ConnectionSpec::new(Dialect::PostgreSql, "localhost", "shop", "reader", "secret");
/// let tables = run_with_session(&spec, &ProfilerConfig::default(), async |session| {
///     session.extract_schema().await
/// })
/// .await?;
/// println!("{} tables", tables.len());
/// # Ok(())
/// # }
/// ```
pub async fn run_with_session<T, F>(
    spec: &ConnectionSpec,
    config: &ProfilerConfig,
    f: F,
) -> Result<T>
where
    F: AsyncFnOnce(&Session) -> Result<T>,
{
    let session = Session::open(spec, config).await?;
    let result = f(&session).await;
    session.close().await;
    result
}

/// Connects, probes and reports the outcome without returning an error.
pub async fn test_connection(spec: &ConnectionSpec, config: &ProfilerConfig) -> ProbeOutcome {
    match Session::open(spec, config).await {
        Ok(session) => {
            session.close().await;
            ProbeOutcome::success()
        }
        Err(e) => {
            tracing::debug!("Connection test failed: {}", e);
            ProbeOutcome::failure(e.detailed_message())
        }
    }
}

/// Extracts the schema and profiles every table over one session.
///
/// # Errors
/// Returns the first connectivity, introspection or profiling error.
pub async fn profile_database(
    spec: &ConnectionSpec,
    config: &ProfilerConfig,
) -> Result<(Vec<TableSchema>, ProfileRun)> {
    run_with_session(spec, config, async |session| {
        let tables = session.extract_schema().await?;
        let run = session.profile(&tables).await?;
        Ok((tables, run))
    })
    .await
}
