//! Server configuration loading.
//!
//! Values are layered: built-in defaults, then an optional YAML file, then
//! command line flags and environment variables.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Resolved server configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Maximum number of runs waiting behind the active one.
    pub max_queue: usize,
    /// Maximum outstanding outbound requests across all runs.
    pub max_in_flight: usize,
    /// Timeout applied to every outbound request.
    #[serde(with = "duration_string")]
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            max_queue: 5,
            max_in_flight: 256,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Shape of the optional YAML config file. Every key may be omitted.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "snake_case")]
pub struct FileConfig {
    pub port: Option<u16>,
    pub max_queue: Option<usize>,
    pub max_in_flight: Option<usize>,
    /// Human readable, e.g. `"10s"` or `"1m 30s"`.
    pub request_timeout: Option<String>,
}

/// Values supplied on the command line or through the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub max_queue: Option<usize>,
    pub max_in_flight: Option<usize>,
    pub request_timeout: Option<Duration>,
}

impl ServerConfig {
    /// Build the configuration from an optional file plus overrides.
    pub fn load(path: Option<&Path>, overrides: ConfigOverrides) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            config = config
                .apply_yaml(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?;
            info!(path = %path.display(), "Loaded config file");
        }

        let config = config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Apply the keys present in a YAML document.
    pub fn apply_yaml(self, content: &str) -> Result<Self> {
        let file: FileConfig = serde_yaml::from_str(content)?;
        self.apply_file(file)
    }

    pub fn apply_file(mut self, file: FileConfig) -> Result<Self> {
        if let Some(port) = file.port {
            self.port = port;
        }
        if let Some(max_queue) = file.max_queue {
            self.max_queue = max_queue;
        }
        if let Some(max_in_flight) = file.max_in_flight {
            self.max_in_flight = max_in_flight;
        }
        if let Some(timeout) = file.request_timeout {
            self.request_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid request_timeout '{}'", timeout))?;
        }
        Ok(self)
    }

    pub fn apply_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(max_queue) = overrides.max_queue {
            self.max_queue = max_queue;
        }
        if let Some(max_in_flight) = overrides.max_in_flight {
            self.max_in_flight = max_in_flight;
        }
        if let Some(timeout) = overrides.request_timeout {
            self.request_timeout = timeout;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 {
            bail!("max_in_flight must be greater than zero");
        }
        if self.request_timeout.is_zero() {
            bail!("request_timeout must be greater than zero");
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

mod duration_string {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_queue, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_then_overrides() {
        let config = ServerConfig::default()
            .apply_yaml("port: 9000\nmax_queue: 2\nrequest_timeout: 2s\n")
            .unwrap()
            .apply_overrides(ConfigOverrides {
                max_queue: Some(7),
                ..Default::default()
            });

        assert_eq!(config.port, 9000);
        assert_eq!(config.max_queue, 7);
        assert_eq!(config.max_in_flight, 256);
        assert_eq!(config.request_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_rejects_unknown_keys_and_bad_durations() {
        assert!(ServerConfig::default().apply_yaml("prot: 1\n").is_err());
        assert!(ServerConfig::default()
            .apply_yaml("request_timeout: soon\n")
            .is_err());
    }

    #[test]
    fn test_validate_limits() {
        let config = ServerConfig {
            max_in_flight: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            max_queue: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_in_flight: 32").unwrap();

        let config = ServerConfig::load(
            Some(file.path()),
            ConfigOverrides {
                port: Some(1234),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(config.max_in_flight, 32);
        assert_eq!(config.port, 1234);
        assert_eq!(config.listen_addr().port(), 1234);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ServerConfig::load(
            Some(Path::new("/nonexistent/ddosy.yaml")),
            ConfigOverrides::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
