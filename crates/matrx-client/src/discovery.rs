use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use matrx_observability::{emit_event, ObservabilityEvent, ProcessKind};
use reqwest::Client;
use tracing::Level;

use crate::config::ClientConfig;
use crate::endpoint::EngineEndpoint;

/// Answers "is an engine listening here?" for one candidate endpoint.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, endpoint: &EngineEndpoint) -> bool;
}

/// `GET /tools/list` with a short per-request timeout. Any non-2xx response,
/// transport error or timeout counts as "not this port".
pub struct HttpProber {
    client: Client,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Falling back to default probe client: {}", e);
                Client::new()
            });
        Self { client, timeout }
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, endpoint: &EngineEndpoint) -> bool {
        let url = endpoint.url("/tools/list");
        // The deadline is enforced here as well so a fallback client stays bounded.
        match tokio::time::timeout(self.timeout, self.client.get(&url).send()).await {
            Ok(Ok(response)) => response.status().is_success(),
            Ok(Err(e)) => {
                tracing::trace!("Probe {} failed: {}", url, e);
                false
            }
            Err(_) => {
                tracing::trace!("Probe {} timed out after {:?}", url, self.timeout);
                false
            }
        }
    }
}

pub struct PortDiscovery {
    host: String,
    ports: Vec<u16>,
    prober: Arc<dyn Prober>,
    process: ProcessKind,
}

impl PortDiscovery {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_prober(config, Arc::new(HttpProber::new(config.probe_timeout())))
    }

    pub fn with_prober(config: &ClientConfig, prober: Arc<dyn Prober>) -> Self {
        Self {
            host: config.host.clone(),
            ports: config.candidate_ports(),
            prober,
            process: config.process,
        }
    }

    pub fn ports(&self) -> &[u16] {
        &self.ports
    }

    /// Probes ports one at a time in order and stops at the first responder.
    /// `None` means nothing answered; callers treat that as "engine not running".
    pub async fn discover(&self) -> Option<EngineEndpoint> {
        for &port in &self.ports {
            let endpoint = EngineEndpoint::new(&self.host, port);
            if self.prober.probe(&endpoint).await {
                let port_text = port.to_string();
                emit_event(
                    Level::INFO,
                    self.process,
                    ObservabilityEvent::new("engine.discovered", "discovery")
                        .endpoint(&endpoint.base_url)
                        .status("found")
                        .detail(&port_text),
                );
                return Some(endpoint);
            }
        }

        emit_event(
            Level::WARN,
            self.process,
            ObservabilityEvent::new("engine.discovery_failed", "discovery")
                .status("not_found")
                .error_code("no_responder"),
        );
        None
    }
}
