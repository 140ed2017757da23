//! Transport security policy.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// PostgreSQL `sslmode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PostgresSslMode {
    Disable,
    Prefer,
    #[default]
    Require,
    VerifyCa,
    VerifyFull,
}

impl PostgresSslMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disable => "disable",
            Self::Prefer => "prefer",
            Self::Require => "require",
            Self::VerifyCa => "verify-ca",
            Self::VerifyFull => "verify-full",
        }
    }
}

impl FromStr for PostgresSslMode {
    type Err = crate::DbProfilerError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "disable" => Ok(Self::Disable),
            "prefer" => Ok(Self::Prefer),
            "require" => Ok(Self::Require),
            "verify-ca" => Ok(Self::VerifyCa),
            "verify-full" => Ok(Self::VerifyFull),
            other => Err(crate::DbProfilerError::configuration(format!(
                "unknown PostgreSQL sslmode '{}'",
                other
            ))),
        }
    }
}

/// MySQL `ssl-mode` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MySqlSslMode {
    Disabled,
    /// Falls back to plaintext when the server offers no TLS
    Preferred,
    #[default]
    Required,
    VerifyCa,
    VerifyIdentity,
}

impl MySqlSslMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Preferred => "preferred",
            Self::Required => "required",
            Self::VerifyCa => "verify_ca",
            Self::VerifyIdentity => "verify_identity",
        }
    }
}

impl FromStr for MySqlSslMode {
    type Err = crate::DbProfilerError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "disabled" => Ok(Self::Disabled),
            "preferred" => Ok(Self::Preferred),
            "required" => Ok(Self::Required),
            "verify_ca" => Ok(Self::VerifyCa),
            "verify_identity" => Ok(Self::VerifyIdentity),
            other => Err(crate::DbProfilerError::configuration(format!(
                "unknown MySQL ssl-mode '{}'",
                other
            ))),
        }
    }
}

/// TLS policy applied to every connection URL.
///
/// Defaults to encrypted transport: PostgreSQL `require`, MySQL `required`,
/// and SQL Server `encrypt=true` with certificate validation.
///
/// # Example
/// ```rust
/// use dbprofiler_core::config::{PostgresSslMode, TransportPolicy};
///
/// let policy = TransportPolicy::default();
/// assert_eq!(policy.postgres_ssl_mode, PostgresSslMode::Require);
/// assert!(!policy.allows_plaintext());
/// assert!(policy.mssql_encrypt);
/// assert!(!policy.mssql_trust_server_certificate);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportPolicy {
    pub postgres_ssl_mode: PostgresSslMode,
    pub mysql_ssl_mode: MySqlSslMode,
    /// Negotiate TLS with SQL Server
    pub mssql_encrypt: bool,
    /// Accept any server certificate (development servers only)
    pub mssql_trust_server_certificate: bool,
}

impl Default for TransportPolicy {
    fn default() -> Self {
        Self {
            postgres_ssl_mode: PostgresSslMode::default(),
            mysql_ssl_mode: MySqlSslMode::default(),
            mssql_encrypt: true,
            mssql_trust_server_certificate: false,
        }
    }
}

impl TransportPolicy {
    /// Plaintext transport for every dialect. Local development only.
    pub fn insecure() -> Self {
        Self {
            postgres_ssl_mode: PostgresSslMode::Disable,
            mysql_ssl_mode: MySqlSslMode::Disabled,
            mssql_encrypt: false,
            mssql_trust_server_certificate: true,
        }
    }

    /// Returns `true` if any dialect may fall back to plaintext.
    pub fn allows_plaintext(&self) -> bool {
        matches!(
            self.postgres_ssl_mode,
            PostgresSslMode::Disable | PostgresSslMode::Prefer
        ) || matches!(
            self.mysql_ssl_mode,
            MySqlSslMode::Disabled | MySqlSslMode::Preferred
        ) || !self.mssql_encrypt
    }
}
