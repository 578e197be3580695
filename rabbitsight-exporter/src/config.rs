//! Configuration for the RabbitMQ exporter.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use rabbitsight_common::LoggingConfig;

use crate::filter::{EntityFilter, FilterCompileError};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] rabbitsight_common::Error),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Filter(#[from] FilterCompileError),
    #[error("Failed to build management client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Complete exporter configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Management API connection settings.
    #[serde(default)]
    pub rabbit: RabbitConfig,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,

    /// Queue collection settings.
    #[serde(default)]
    pub queues: QueueConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the exporter reaches the broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    /// Talking to one node; entities on that node are labelled `self="1"`.
    #[default]
    Direct,
    /// Behind a load balancer; every entity is labelled `self="lb"`.
    LoadBalancer,
}

impl ConnectionMode {
    /// Value of the `self` label.
    pub fn self_label(&self, is_self: bool) -> &'static str {
        match self {
            ConnectionMode::LoadBalancer => "lb",
            ConnectionMode::Direct if is_self => "1",
            ConnectionMode::Direct => "0",
        }
    }
}

/// Management API connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RabbitConfig {
    /// Base URL of the management API (default: "http://127.0.0.1:15672").
    #[serde(default = "default_url")]
    pub url: String,

    /// Username for basic authentication.
    #[serde(default = "default_credential")]
    pub username: String,

    /// Password for basic authentication.
    #[serde(default = "default_credential", skip_serializing)]
    pub password: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Direct node connection or load balancer.
    #[serde(default)]
    pub connection: ConnectionMode,

    /// PEM file with an additional trusted CA.
    #[serde(default)]
    pub ca_file: Option<PathBuf>,

    /// PEM client certificate for mutual TLS (requires `key_file`).
    #[serde(default)]
    pub cert_file: Option<PathBuf>,

    /// PEM private key of `cert_file`.
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// Skip TLS certificate verification.
    #[serde(default)]
    pub insecure_skip_verify: bool,
}

fn default_url() -> String {
    "http://127.0.0.1:15672".to_string()
}

fn default_credential() -> String {
    "guest".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for RabbitConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            username: default_credential(),
            password: default_credential(),
            timeout_secs: default_timeout(),
            connection: ConnectionMode::default(),
            ca_file: None,
            cert_file: None,
            key_file: None,
            insecure_skip_verify: false,
        }
    }
}

/// Prometheus HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    /// Address to listen on (default: "0.0.0.0:9419").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub path: String,

    /// Metric name prefix (default: "rabbitmq").
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_listen() -> String {
    "0.0.0.0:9419".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

fn default_prefix() -> String {
    "rabbitmq".to_string()
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_path(),
            prefix: default_prefix(),
        }
    }
}

/// Queue collection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Only vhosts matching this regex are collected.
    #[serde(default = "default_include")]
    pub include_vhost: String,

    /// Vhosts matching this regex are skipped (unset = none).
    #[serde(default)]
    pub skip_vhost: Option<String>,

    /// Only queues matching this regex are collected.
    #[serde(default = "default_include")]
    pub include_queues: String,

    /// Queues matching this regex are skipped (unset = none).
    #[serde(default)]
    pub skip_queues: Option<String>,

    /// Skip the whole queue collection above this many queues (<= 0 disables).
    #[serde(default)]
    pub max_queues: i64,

    /// Metrics removed from the exporter, by field path or exported name.
    #[serde(default)]
    pub exclude_metrics: Vec<String>,
}

fn default_include() -> String {
    ".*".to_string()
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            include_vhost: default_include(),
            skip_vhost: None,
            include_queues: default_include(),
            skip_queues: None,
            max_queues: 0,
            exclude_metrics: Vec::new(),
        }
    }
}

impl QueueConfig {
    /// Compile the vhost and queue name patterns.
    pub fn filter(&self) -> Result<EntityFilter, FilterCompileError> {
        EntityFilter::compile(
            &self.include_vhost,
            self.skip_vhost.as_deref(),
            &self.include_queues,
            self.skip_queues.as_deref(),
        )
    }
}

/// Settings given on the command line or in the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub listen: Option<String>,
    pub rabbit_url: Option<String>,
    pub rabbit_user: Option<String>,
    pub rabbit_password: Option<String>,
    pub log_level: Option<String>,
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    ///
    /// The result is not validated; call [`ExporterConfig::validate`] once
    /// overrides have been applied.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Ok(rabbitsight_common::load_config(path)?)
    }

    /// Replace file settings with the ones that were given explicitly.
    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(listen) = overrides.listen {
            self.prometheus.listen = listen;
        }
        if let Some(url) = overrides.rabbit_url {
            self.rabbit.url = url;
        }
        if let Some(user) = overrides.rabbit_user {
            self.rabbit.username = user;
        }
        if let Some(password) = overrides.rabbit_password {
            self.rabbit.password = password;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = rabbitsight_common::parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rabbit.url.is_empty() {
            return Err(ConfigError::Validation("rabbit.url must be set".to_string()));
        }

        if self.rabbit.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "timeout_secs must be > 0".to_string(),
            ));
        }

        // Validate listen address format
        if self
            .prometheus
            .listen
            .parse::<std::net::SocketAddr>()
            .is_err()
        {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.prometheus.listen
            )));
        }

        // Validate path starts with /
        if !self.prometheus.path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if matches!(self.prometheus.path.as_str(), "/" | "/health") {
            return Err(ConfigError::Validation(format!(
                "Metrics path {} is reserved",
                self.prometheus.path
            )));
        }

        if self.rabbit.cert_file.is_some() != self.rabbit.key_file.is_some() {
            return Err(ConfigError::Validation(
                "cert_file and key_file must be set together".to_string(),
            ));
        }

        self.queues.filter()?;

        Ok(())
    }
}
