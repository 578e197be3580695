//! RabbitMQ management API client.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

use crate::config::{ConfigError, RabbitConfig};
use crate::error::FetchError;

/// Source of raw entity statistics.
pub trait StatsSource: Send + Sync {
    /// Cluster-wide overview, fetched once per scrape.
    fn overview(&self) -> impl Future<Output = Result<Overview, FetchError>> + Send;

    /// Raw JSON objects of every entity of `kind` (e.g. `queues`).
    fn fetch_entities(
        &self,
        kind: &str,
    ) -> impl Future<Output = Result<Vec<Value>, FetchError>> + Send;
}

/// The subset of `/api/overview` the exporter uses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Overview {
    #[serde(default)]
    pub cluster_name: String,
    /// Node answering the request.
    #[serde(default)]
    pub node: String,
    #[serde(default)]
    pub object_totals: ObjectTotals,
}

/// Entity counts reported by the overview.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectTotals {
    #[serde(default)]
    pub queues: Option<usize>,
}

impl Overview {
    /// Context of a queue collection cycle.
    pub fn queue_context(&self) -> ScrapeContext {
        ScrapeContext {
            total_count: self.object_totals.queues,
            self_node: self.node.clone(),
            cluster: self.cluster_name.clone(),
        }
    }
}

/// Values supplied to a collection cycle from outside the entity list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeContext {
    /// Total number of entities on the broker, when known.
    pub total_count: Option<usize>,
    /// Name of the node the exporter talks to.
    pub self_node: String,
    /// Name of the cluster.
    pub cluster: String,
}

/// HTTP client for the management API.
#[derive(Debug, Clone)]
pub struct ManagementClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl ManagementClient {
    /// Build a client from the connection settings.
    pub fn new(config: &RabbitConfig) -> Result<Self, ConfigError> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .danger_accept_invalid_certs(config.insecure_skip_verify);

        if let Some(path) = &config.ca_file {
            let pem = read_pem(path)?;
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(&pem)?);
        }

        if let (Some(cert), Some(key)) = (&config.cert_file, &config.key_file) {
            // rustls takes certificate chain and key from a single PEM buffer.
            let mut pem = read_pem(cert)?;
            pem.push(b'\n');
            pem.extend(read_pem(key)?);
            builder = builder.identity(reqwest::Identity::from_pem(&pem)?);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Base URL of the management API.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, FetchError> {
        let url = format!("{}/api/{}", self.base_url, endpoint);
        trace!(url = %url, "Requesting management API");

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status, url });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|source| FetchError::Decode { url, source })
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, ConfigError> {
    std::fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl StatsSource for ManagementClient {
    async fn overview(&self) -> Result<Overview, FetchError> {
        self.get_json("overview").await
    }

    async fn fetch_entities(&self, kind: &str) -> Result<Vec<Value>, FetchError> {
        self.get_json(kind).await
    }
}
