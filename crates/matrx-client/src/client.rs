use std::sync::Arc;

use futures::Stream;
use matrx_types::{ToolInput, ToolInvocationResult};
use parking_lot::RwLock;

use crate::auth::{StaticToken, TokenProvider};
use crate::config::ClientConfig;
use crate::discovery::{PortDiscovery, Prober};
use crate::endpoint::EngineEndpoint;
use crate::error::{ClientError, Result};
use crate::rest::RestInvoker;
use crate::sse::{self, SseEvent, SseHandle, SseHandler, SseRequest};
use crate::ws::{TungsteniteConnector, WsConnector, WsSession};

#[derive(Clone)]
struct Attached {
    endpoint: EngineEndpoint,
    rest: RestInvoker,
    ws: WsSession,
}

/// Entry point for everything that talks to the engine. Construct one per
/// application and pass it where needed; nothing here is global.
pub struct EngineClient {
    config: ClientConfig,
    discovery: PortDiscovery,
    auth: Option<Arc<dyn TokenProvider>>,
    connector: Arc<dyn WsConnector>,
    attached: RwLock<Option<Attached>>,
    discover_lock: tokio::sync::Mutex<()>,
}

impl EngineClient {
    pub fn new(config: ClientConfig) -> Self {
        let auth = config
            .api_token
            .clone()
            .map(|token| Arc::new(StaticToken::new(token)) as Arc<dyn TokenProvider>);
        Self {
            discovery: PortDiscovery::new(&config),
            auth,
            connector: Arc::new(TungsteniteConnector),
            attached: RwLock::new(None),
            discover_lock: tokio::sync::Mutex::new(()),
            config,
        }
    }

    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.auth = Some(provider);
        self
    }

    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.discovery = PortDiscovery::with_prober(&self.config, prober);
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn WsConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Uses a known endpoint without probing.
    pub fn attach(&self, endpoint: EngineEndpoint) -> Result<()> {
        let rest = RestInvoker::new(
            endpoint.clone(),
            self.config.request_timeout(),
            self.auth.clone(),
            self.config.user_id.clone(),
        )?;
        let ws = WsSession::new(endpoint.ws_url.clone(), &self.config, Arc::clone(&self.connector));
        let previous = self.attached.write().replace(Attached { endpoint, rest, ws });
        if let Some(previous) = previous {
            previous.ws.shutdown();
        }
        Ok(())
    }

    /// Returns the current endpoint, probing only if none is known yet.
    pub async fn discover(&self) -> Result<Option<EngineEndpoint>> {
        let _serialized = self.discover_lock.lock().await;
        if let Some(endpoint) = self.endpoint() {
            return Ok(Some(endpoint));
        }
        self.probe_and_attach().await
    }

    /// Forgets the current endpoint (closing its WebSocket) and probes again.
    pub async fn rediscover(&self) -> Result<Option<EngineEndpoint>> {
        let _serialized = self.discover_lock.lock().await;
        self.detach();
        self.probe_and_attach().await
    }

    async fn probe_and_attach(&self) -> Result<Option<EngineEndpoint>> {
        match self.discovery.discover().await {
            Some(endpoint) => {
                self.attach(endpoint.clone())?;
                Ok(Some(endpoint))
            }
            None => Ok(None),
        }
    }

    fn detach(&self) {
        let previous = self.attached.write().take();
        if let Some(previous) = previous {
            previous.ws.shutdown();
        }
    }

    fn attached(&self) -> Result<Attached> {
        self.attached
            .read()
            .clone()
            .ok_or(ClientError::EngineUnavailable)
    }

    pub fn endpoint(&self) -> Option<EngineEndpoint> {
        self.attached.read().as_ref().map(|a| a.endpoint.clone())
    }

    pub fn rest(&self) -> Result<RestInvoker> {
        Ok(self.attached()?.rest)
    }

    pub fn ws(&self) -> Result<WsSession> {
        Ok(self.attached()?.ws)
    }

    pub async fn invoke_tool(&self, tool: &str, input: ToolInput) -> Result<ToolInvocationResult> {
        self.rest()?.invoke_tool(tool, input).await
    }

    pub async fn connect_ws(&self) -> Result<()> {
        self.ws()?.connect().await
    }

    pub async fn invoke_tool_ws(&self, tool: &str, input: ToolInput) -> Result<ToolInvocationResult> {
        self.ws()?.invoke_tool(tool, input).await
    }

    pub fn stream_sse<H: SseHandler>(&self, request: SseRequest, handler: H) -> Result<SseHandle> {
        Ok(sse::stream_sse(self.rest()?, request, handler))
    }

    pub async fn open_sse(&self, request: &SseRequest) -> Result<impl Stream<Item = Result<SseEvent>>> {
        let rest = self.rest()?;
        sse::open_sse(&rest, request).await
    }

    pub fn shutdown(&self) {
        if let Some(attached) = self.attached.read().as_ref() {
            attached.ws.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProber {
        live_port: Option<u16>,
        probes: AtomicUsize,
    }

    #[async_trait]
    impl Prober for CountingProber {
        async fn probe(&self, endpoint: &EngineEndpoint) -> bool {
            self.probes.fetch_add(1, Ordering::SeqCst);
            Some(endpoint.port) == self.live_port
        }
    }

    fn client(live_port: Option<u16>) -> (EngineClient, Arc<CountingProber>) {
        let prober = Arc::new(CountingProber {
            live_port,
            probes: AtomicUsize::new(0),
        });
        let client = EngineClient::new(ClientConfig::default()).with_prober(prober.clone());
        (client, prober)
    }

    #[tokio::test]
    async fn calls_before_discovery_report_engine_unavailable() {
        let (client, _) = client(None);
        assert!(matches!(client.rest(), Err(ClientError::EngineUnavailable)));
        assert!(matches!(
            client.invoke_tool("Bash", ToolInput::new()).await,
            Err(ClientError::EngineUnavailable)
        ));
        assert!(client.discover().await.unwrap().is_none());
        assert!(client.endpoint().is_none());
    }

    #[tokio::test]
    async fn discover_is_cached_until_rediscover() {
        let (client, prober) = client(Some(22142));
        let endpoint = client.discover().await.unwrap().unwrap();
        assert_eq!(endpoint.port, 22142);
        assert_eq!(prober.probes.load(Ordering::SeqCst), 3);

        client.discover().await.unwrap();
        assert_eq!(prober.probes.load(Ordering::SeqCst), 3);

        client.rediscover().await.unwrap();
        assert_eq!(prober.probes.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn rediscover_shuts_down_previous_session() {
        let (client, _) = client(Some(22140));
        client.discover().await.unwrap();
        let old_ws = client.ws().unwrap();
        client.rediscover().await.unwrap();
        assert!(matches!(old_ws.connect().await, Err(ClientError::Closed)));
    }
}
