use crate::error::ConfigError;
use chrono::Duration;
use fedwallet_sync::{BackendResult, HttpBackend};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

/// Wallet configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Wallet backend connection
    #[serde(default)]
    pub backend: BackendConfig,
    /// Membership behaviour
    #[serde(default)]
    pub membership: MembershipConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Wallet backend connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the wallet daemon
    #[serde(default = "default_backend_url")]
    pub url: String,
    /// HTTP request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Upper bound on time spent retrying a read; 0 disables retries
    #[serde(default = "default_read_retry")]
    pub read_retry_max_elapsed_seconds: u64,
    /// Bearer token for the daemon API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

/// Membership behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipConfig {
    /// Warn this many days before a federation shuts down
    #[serde(default = "default_expiry_warning_days")]
    pub expiry_warning_days: u32,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_backend_url() -> String {
    "http://127.0.0.1:8585".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_read_retry() -> u64 {
    10
}

fn default_expiry_warning_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            request_timeout_seconds: default_request_timeout(),
            read_retry_max_elapsed_seconds: default_read_retry(),
            auth_token: None,
        }
    }
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            expiry_warning_days: default_expiry_warning_days(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl BackendConfig {
    /// Build an HTTP backend from this configuration
    pub fn build_http_backend(&self) -> BackendResult<HttpBackend> {
        let mut backend = HttpBackend::new(&self.url)?
            .with_timeout(std::time::Duration::from_secs(self.request_timeout_seconds))?
            .with_read_retry(std::time::Duration::from_secs(self.read_retry_max_elapsed_seconds));
        if let Some(token) = &self.auth_token {
            backend = backend.with_auth_token(token.clone());
        }
        Ok(backend)
    }
}

impl MembershipConfig {
    pub fn expiry_warning_window(&self) -> Duration {
        Duration::days(i64::from(self.expiry_warning_days))
    }
}

impl WalletConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ConfigError::NotFound(path.display().to_string())
            } else {
                ConfigError::Io(e)
            }
        })?;

        Ok(toml::from_str(&content)?)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(path, content)?;
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::load(&path) {
            Ok(config) => Ok(config),
            Err(ConfigError::NotFound(_)) => {
                let config = Self::default();
                config.save(&path)?;
                Ok(config)
            }
            Err(e) => Err(e),
        }
    }
}
