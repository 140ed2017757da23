//! Configuration types for profiling runs.
//!
//! - `ProfilerConfig`: timeouts, pool size, batching and failure policy
//! - `TransportPolicy`: TLS settings applied when building connection URLs
//!
//! # Security
//! These structs never hold credentials. Passwords live only in
//! [`crate::connection::ConnectionSpec`].

mod profiler;
mod transport;

pub use profiler::ProfilerConfig;
pub use transport::{MySqlSslMode, PostgresSslMode, TransportPolicy};
