//! Health probes and health derivation.
//!
//! The control-endpoint probe is an HTTP(S) GET through a pooled hyper
//! client with a rustls connector. Database and storage reachability come
//! from a [`DependencyProbe`] collaborator.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Empty;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use tracing::debug;

use fedplane_state::{Shard, ShardHealth};

use crate::error::{HealthError, HealthResult};

/// Result of a single control-endpoint probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeResult {
    /// The endpoint returned 2xx.
    Healthy,
    /// The endpoint answered with a non-2xx status.
    Unhealthy,
    /// The request could not be made (bad URL, connection refused, reset).
    Failed,
    /// No response within the probe timeout.
    TimedOut,
}

/// Outcome of probing a control endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EndpointCheck {
    pub result: ProbeResult,
    pub response_time_ms: f64,
}

impl EndpointCheck {
    pub fn is_healthy(&self) -> bool {
        self.result == ProbeResult::Healthy
    }
}

/// Combine sub-check results into a shard health.
pub fn derive_health(endpoint: bool, database: bool, storage: bool) -> ShardHealth {
    match (endpoint, database, storage) {
        (true, true, true) => ShardHealth::Healthy,
        (true, _, _) => ShardHealth::Degraded,
        (false, _, _) => ShardHealth::Unhealthy,
    }
}

/// rustls client configuration trusting the Mozilla root store.
pub fn webpki_tls_config() -> HealthResult<rustls::ClientConfig> {
    let mut roots = rustls::RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let config = rustls::ClientConfig::builder_with_provider(
        rustls::crypto::ring::default_provider().into(),
    )
    .with_safe_default_protocol_versions()
    .map_err(|e| HealthError::Tls(e.to_string()))?
    .with_root_certificates(roots)
    .with_no_client_auth();
    Ok(config)
}

/// HTTP(S) prober for shard control endpoints.
#[derive(Clone)]
pub struct HttpProbe {
    client: Client<HttpsConnector<HttpConnector>, Empty<Bytes>>,
    path: String,
    timeout: Duration,
}

impl HttpProbe {
    /// Prober that verifies `https` endpoints against the webpki roots.
    pub fn new(path: &str, timeout: Duration) -> HealthResult<Self> {
        Ok(Self::with_tls_config(path, timeout, webpki_tls_config()?))
    }

    /// Prober using a caller-supplied TLS configuration. Plain `http`
    /// endpoints are still accepted.
    pub fn with_tls_config(
        path: &str,
        timeout: Duration,
        tls: rustls::ClientConfig,
    ) -> Self {
        let connector = HttpsConnectorBuilder::new()
            .with_tls_config(tls)
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .build(connector);
        Self {
            client,
            path: path.to_string(),
            timeout,
        }
    }

    /// GET `<base_url><path>` and classify the response.
    pub async fn check(&self, base_url: &str) -> EndpointCheck {
        let url = format!("{}{}", base_url.trim_end_matches('/'), self.path);
        let started = Instant::now();
        let result = self.probe(&url).await;
        let response_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        EndpointCheck {
            result,
            response_time_ms,
        }
    }

    async fn probe(&self, url: &str) -> ProbeResult {
        let request = match http::Request::get(url)
            .header("user-agent", "fedplane-health/0.1")
            .body(Empty::<Bytes>::new())
        {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, %url, "invalid health probe url");
                return ProbeResult::Failed;
            }
        };

        match tokio::time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(resp)) if resp.status().is_success() => ProbeResult::Healthy,
            Ok(Ok(resp)) => {
                debug!(status = %resp.status(), %url, "health probe non-2xx");
                ProbeResult::Unhealthy
            }
            Ok(Err(e)) => {
                debug!(error = %e, %url, "health probe request failed");
                ProbeResult::Failed
            }
            Err(_) => {
                debug!(%url, "health probe timed out");
                ProbeResult::TimedOut
            }
        }
    }
}

/// Reachability of a shard's database and storage.
#[async_trait]
pub trait DependencyProbe: Send + Sync {
    async fn database_healthy(&self, shard: &Shard) -> anyhow::Result<bool>;
    async fn storage_healthy(&self, shard: &Shard) -> anyhow::Result<bool>;
}

/// Dependency probe with fixed answers. Healthy by default.
#[derive(Debug, Clone, Copy)]
pub struct StaticProbe {
    database: bool,
    storage: bool,
}

impl StaticProbe {
    pub fn new(database: bool, storage: bool) -> Self {
        Self { database, storage }
    }
}

impl Default for StaticProbe {
    fn default() -> Self {
        Self::new(true, true)
    }
}

#[async_trait]
impl DependencyProbe for StaticProbe {
    async fn database_healthy(&self, _shard: &Shard) -> anyhow::Result<bool> {
        Ok(self.database)
    }

    async fn storage_healthy(&self, _shard: &Shard) -> anyhow::Result<bool> {
        Ok(self.storage)
    }
}

/// Result of one `check_shard_health` call.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub shard_id: String,
    pub health: ShardHealth,
    pub control_plane_healthy: bool,
    pub database_healthy: bool,
    pub storage_healthy: bool,
    pub probe: Option<ProbeResult>,
    pub response_time_ms: Option<f64>,
    pub consecutive_errors: u32,
    pub timestamp: u64,
    /// Set when the check itself failed.
    pub error: Option<String>,
}
