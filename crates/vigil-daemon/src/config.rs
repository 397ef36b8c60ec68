//! Configuration for vigil-daemon

use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vigil_health::{Metadata, MonitorConfig};

use crate::error::{DaemonError, DaemonResult};

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Health monitor tuning
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// HTTP checks to run
    #[serde(default)]
    pub checks: Vec<HttpCheckConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Keep-alive interval for the event stream, in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            enable_cors: true,
            keep_alive_secs: default_keep_alive(),
        }
    }
}

impl ServerConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(1))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// A periodic check that probes an HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpCheckConfig {
    /// Unique check name
    pub name: String,

    /// URL requested on every attempt
    pub url: String,

    /// Link to remediation docs
    #[serde(default)]
    pub runbook: Option<String>,

    /// Contribution to the system score
    #[serde(default = "default_weight")]
    pub weight: u32,

    /// Seconds between attempts
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Per-attempt timeout in milliseconds, 0 disables it
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl HttpCheckConfig {
    pub fn metadata(&self) -> Metadata {
        let metadata = Metadata::new(self.name.clone(), self.weight);
        match &self.runbook {
            Some(runbook) => metadata.with_runbook(runbook.clone()),
            None => metadata,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9973))
}

fn default_keep_alive() -> u64 {
    15
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_weight() -> u32 {
    1
}

fn default_interval() -> u64 {
    5
}

fn default_timeout_ms() -> u64 {
    1000
}

impl DaemonConfig {
    /// Load configuration from defaults, an optional file and `VIGIL__`
    /// prefixed environment variables, in that order.
    pub fn load(path: Option<&str>) -> DaemonResult<Self> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Double underscore separates sections, e.g. VIGIL__SERVER__LISTEN_ADDR
        builder = builder.add_source(
            config::Environment::with_prefix("VIGIL")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: DaemonConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject check lists the monitor cannot report on unambiguously.
    pub fn validate(&self) -> DaemonResult<()> {
        let mut names = HashSet::new();
        for check in &self.checks {
            if check.name.trim().is_empty() {
                return Err(DaemonError::Config("check name must not be empty".into()));
            }
            if !names.insert(check.name.as_str()) {
                return Err(DaemonError::Config(format!(
                    "duplicate check name: {}",
                    check.name
                )));
            }
            if check.url.trim().is_empty() {
                return Err(DaemonError::Config(format!(
                    "check {} has no url",
                    check.name
                )));
            }
            if check.interval_secs == 0 {
                return Err(DaemonError::Config(format!(
                    "check {} must have a non-zero interval",
                    check.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_check(name: &str) -> HttpCheckConfig {
        HttpCheckConfig {
            name: name.to_string(),
            url: "http://127.0.0.1:1/health".to_string(),
            runbook: None,
            weight: default_weight(),
            interval_secs: default_interval(),
            timeout_ms: default_timeout_ms(),
        }
    }

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.server.listen_addr.port(), 9973);
        assert!(config.server.enable_cors);
        assert!(!config.logging.json);
        assert!(config.checks.is_empty());
        assert_eq!(config.monitor, MonitorConfig::default());
    }

    #[test]
    fn test_check_defaults_from_json() {
        let check: HttpCheckConfig =
            serde_json::from_str(r#"{"name":"api","url":"http://localhost/healthz"}"#).unwrap();
        assert_eq!(check.weight, 1);
        assert_eq!(check.interval(), Duration::from_secs(5));
        assert_eq!(check.timeout(), Duration::from_secs(1));
        assert_eq!(check.metadata().runbook, None);
    }

    #[test]
    fn test_check_metadata_carries_runbook() {
        let mut check = http_check("api");
        check.runbook = Some("https://runbooks/api".into());
        check.weight = 10;

        let metadata = check.metadata();
        assert_eq!(metadata.name, "api");
        assert_eq!(metadata.weight, 10);
        assert_eq!(metadata.runbook.as_deref(), Some("https://runbooks/api"));
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let config = DaemonConfig {
            checks: vec![http_check("api"), http_check("api")],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(DaemonError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut check = http_check("api");
        check.interval_secs = 0;
        let config = DaemonConfig {
            checks: vec![check],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = DaemonConfig::load(None).unwrap();
        assert_eq!(config.server.keep_alive(), Duration::from_secs(15));
        assert_eq!(config.logging.level, "info");
    }
}
