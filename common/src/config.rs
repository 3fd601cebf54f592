// Configuration management with layered configuration (file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub distribution: DistributionConfig,
    #[serde(default)]
    pub artifacts: ArtifactConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_hours: u64,
}

/// SSH session parameters shared by executions, distributions and probes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

/// File distribution fan-out parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Simultaneous per-host transfers admitted by the worker pool
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_transfers: usize,
    /// Transfer attempts per host before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base unit of the linear backoff between attempts
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_seconds: u64,
}

fn default_max_concurrent() -> usize {
    3
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff() -> u64 {
    1
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_transfers: default_max_concurrent(),
            max_attempts: default_max_attempts(),
            retry_backoff_seconds: default_retry_backoff(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,
}

fn default_upload_dir() -> String {
    "uploads".to_string()
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
        }
    }
}

/// Periodic host reachability checker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "default_poller_enabled")]
    pub enabled: bool,
    #[serde(default = "default_poller_interval")]
    pub interval_seconds: u64,
}

fn default_poller_enabled() -> bool {
    true
}

fn default_poller_interval() -> u64 {
    300
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: default_poller_enabled(),
            interval_seconds: default_poller_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub json_logs: bool,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            metrics_port: default_metrics_port(),
        }
    }
}

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port must be greater than 0".to_string());
        }

        if self.database.url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }

        if self.auth.jwt_secret.is_empty() {
            return Err("JWT secret cannot be empty".to_string());
        }

        if self.ssh.connect_timeout_seconds == 0 {
            return Err("SSH connect timeout must be greater than 0".to_string());
        }

        if self.distribution.max_concurrent_transfers == 0 {
            return Err("Distribution concurrency must be greater than 0".to_string());
        }
        if self.distribution.max_attempts == 0 {
            return Err("Distribution max_attempts must be greater than 0".to_string());
        }

        if self.artifacts.upload_dir.is_empty() {
            return Err("Artifact upload directory cannot be empty".to_string());
        }

        Ok(())
    }

    /// Effective poller interval, clamped to a one minute floor so a
    /// misconfigured value cannot hammer the fleet.
    pub fn poller_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.poller.interval_seconds.max(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_settings() -> Settings {
        Settings {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                url: "postgresql://localhost/fleetops".to_string(),
                max_connections: 10,
                min_connections: 2,
                connect_timeout_seconds: 30,
            },
            auth: AuthConfig {
                jwt_secret: "test-secret".to_string(),
                jwt_expiration_hours: 24,
            },
            ssh: SshConfig::default(),
            distribution: DistributionConfig::default(),
            artifacts: ArtifactConfig::default(),
            poller: PollerConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }

    #[test]
    fn test_valid_settings_pass_validation() {
        assert!(test_settings().validate().is_ok());
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut settings = test_settings();
        settings.server.port = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_empty_jwt_secret_rejected() {
        let mut settings = test_settings();
        settings.auth.jwt_secret = String::new();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_distribution_defaults() {
        let config = DistributionConfig::default();
        assert_eq!(config.max_concurrent_transfers, 3);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_backoff_seconds, 1);
    }

    #[test]
    fn test_poller_interval_floor() {
        let mut settings = test_settings();
        settings.poller.interval_seconds = 5;
        assert_eq!(settings.poller_interval().as_secs(), 60);

        settings.poller.interval_seconds = 600;
        assert_eq!(settings.poller_interval().as_secs(), 600);
    }
}
