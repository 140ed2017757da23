//! Profiling run configuration.

use super::TransportPolicy;
use crate::error::DbProfilerError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for connection, introspection and profiling.
///
/// # Security
/// - Connection credentials are handled separately and never stored here
/// - Sessions are opened read-only where the engine supports it
/// - Every query runs under `query_timeout`
///
/// # Example
/// ```rust
/// use dbprofiler_core::ProfilerConfig;
/// use std::time::Duration;
///
/// let config = ProfilerConfig::new()
///     .with_query_timeout(Duration::from_secs(60))
///     .with_max_concurrent_tables(4)
///     .unwrap();
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilerConfig {
    /// Connection establishment timeout
    pub connect_timeout: Duration,
    /// Wall-clock budget for each generated query
    pub query_timeout: Duration,
    /// Maximum number of pooled connections (1-100)
    pub max_connections: u32,
    /// Columns per batched `COUNT(col)` statement
    pub count_batch_size: usize,
    /// Tables profiled at the same time (1-32)
    pub max_concurrent_tables: usize,
    /// Record per-table failures instead of aborting the run
    pub continue_on_error: bool,
    /// TLS policy used when building connection URLs
    pub transport: TransportPolicy,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            query_timeout: Duration::from_secs(30),
            max_connections: 5,
            count_batch_size: 64,
            max_concurrent_tables: 1,
            continue_on_error: false,
            transport: TransportPolicy::default(),
        }
    }
}

impl ProfilerConfig {
    /// Creates a config with safe defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns error if configuration values are invalid or unsafe
    pub fn validate(&self) -> crate::Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(DbProfilerError::configuration(
                "connect_timeout must be greater than 0",
            ));
        }

        if self.query_timeout.is_zero() {
            return Err(DbProfilerError::configuration(
                "query_timeout must be greater than 0",
            ));
        }

        if self.max_connections == 0 || self.max_connections > 100 {
            return Err(DbProfilerError::configuration(
                "max_connections must be between 1 and 100",
            ));
        }

        if self.count_batch_size == 0 {
            return Err(DbProfilerError::configuration(
                "count_batch_size must be greater than 0",
            ));
        }

        if self.max_concurrent_tables == 0 || self.max_concurrent_tables > 32 {
            return Err(DbProfilerError::configuration(
                "max_concurrent_tables must be between 1 and 32",
            ));
        }

        Ok(())
    }

    /// Builder method to set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder method to set the per-query timeout.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Builder method to set the pool size.
    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Builder method to set the `COUNT(col)` batch width.
    pub fn with_count_batch_size(mut self, size: usize) -> Self {
        self.count_batch_size = size;
        self
    }

    /// Builder method to set table fan-out with validation.
    ///
    /// The pool is grown to at least `max` connections so concurrent tables
    /// never wait on each other for a connection.
    pub fn with_max_concurrent_tables(mut self, max: usize) -> crate::Result<Self> {
        if max == 0 || max > 32 {
            return Err(DbProfilerError::configuration(
                "max_concurrent_tables must be between 1 and 32",
            ));
        }
        self.max_concurrent_tables = max;
        self.max_connections = self.max_connections.max(max as u32);
        Ok(self)
    }

    /// Builder method to enable or disable `continue_on_error`.
    pub fn with_continue_on_error(mut self, enabled: bool) -> Self {
        self.continue_on_error = enabled;
        self
    }

    /// Builder method to set the transport policy.
    pub fn with_transport(mut self, transport: TransportPolicy) -> Self {
        self.transport = transport;
        self
    }
}
