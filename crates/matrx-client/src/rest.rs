use std::sync::Arc;
use std::time::Duration;

use matrx_types::{
    EngineInfo, EngineSettings, ProxyStatus, ToolInput, ToolInvocationResult, ToolInvokeBody,
    ToolList, ToolSchemaCatalog,
};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::{apply_auth, TokenProvider};
use crate::endpoint::EngineEndpoint;
use crate::error::{ClientError, Result};

fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ClientError::Transport(format!("Failed to create HTTP client: {}", e)))
}

fn build_stream_client() -> Result<Client> {
    // No overall timeout: streams stay open for as long as the engine writes.
    Client::builder()
        .build()
        .map_err(|e| ClientError::Transport(format!("Failed to create stream client: {}", e)))
}

/// Stateless request/response transport. Every call carries the current
/// bearer token and the configured user id; non-2xx becomes
/// [`ClientError::Http`]. Nothing is retried here.
#[derive(Clone)]
pub struct RestInvoker {
    http_client: Client,
    stream_client: Client,
    endpoint: EngineEndpoint,
    auth: Option<Arc<dyn TokenProvider>>,
    user_id: Option<String>,
}

impl RestInvoker {
    pub fn new(
        endpoint: EngineEndpoint,
        request_timeout: Duration,
        auth: Option<Arc<dyn TokenProvider>>,
        user_id: Option<String>,
    ) -> Result<Self> {
        Ok(Self {
            http_client: build_http_client(request_timeout)?,
            stream_client: build_stream_client()?,
            endpoint,
            auth,
            user_id,
        })
    }

    pub fn endpoint(&self) -> &EngineEndpoint {
        &self.endpoint
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub(crate) async fn current_token(&self) -> Option<String> {
        match &self.auth {
            Some(provider) => provider.token().await,
            None => None,
        }
    }

    pub(crate) fn require_user(&self) -> Result<&str> {
        self.user_id.as_deref().ok_or(ClientError::MissingUserId)
    }

    pub(crate) async fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let token = self.current_token().await;
        let builder = self.http_client.request(method, self.endpoint.url(path));
        apply_auth(builder, token.as_deref(), self.user_id.as_deref())
    }

    pub(crate) async fn stream_request(&self, method: Method, path: &str) -> RequestBuilder {
        let token = self.current_token().await;
        let builder = self
            .stream_client
            .request(method, self.endpoint.url(path))
            .header("Accept", "text/event-stream");
        apply_auth(builder, token.as_deref(), self.user_id.as_deref())
    }

    pub(crate) async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = builder.send().await?;
        handle_response(response).await
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let builder = self.request(Method::GET, path).await;
        self.send(builder).await
    }

    pub(crate) async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let builder = self.request(Method::POST, path).await.json(body);
        self.send(builder).await
    }

    pub(crate) async fn put_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let builder = self.request(Method::PUT, path).await.json(body);
        self.send(builder).await
    }

    pub(crate) async fn delete_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let builder = self.request(Method::DELETE, path).await;
        self.send(builder).await
    }

    pub async fn engine_info(&self) -> Result<EngineInfo> {
        self.get_json("/").await
    }

    pub async fn list_tools(&self) -> Result<Vec<String>> {
        let list: ToolList = self.get_json("/tools/list").await?;
        Ok(list.tools)
    }

    /// `POST /tools/invoke`. A tool that ran but failed still comes back as
    /// `Ok` with an error-kind result; only transport and status failures are `Err`.
    pub async fn invoke_tool(&self, tool: &str, input: ToolInput) -> Result<ToolInvocationResult> {
        tracing::debug!("Invoking tool over REST: {}", tool);
        let body = ToolInvokeBody {
            tool: tool.to_string(),
            input,
        };
        self.post_json("/tools/invoke", &body).await
    }

    pub async fn settings(&self) -> Result<EngineSettings> {
        self.get_json("/settings").await
    }

    pub async fn update_settings(&self, settings: &EngineSettings) -> Result<EngineSettings> {
        self.put_json("/settings", settings).await
    }

    pub async fn chat_tools(&self) -> Result<ToolSchemaCatalog> {
        self.get_json("/chat/tools").await
    }

    pub async fn proxy_status(&self) -> Result<ProxyStatus> {
        self.get_json("/proxy/status").await
    }
}

pub(crate) async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let url = response.url().to_string();

    if status.is_success() {
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(format!("Failed to read response body: {}", e)))?;

        tracing::debug!("Response from {}: {}", url, truncate(&body, 500));

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse response from {}: {}", url, e);
            ClientError::Decode(format!("{}. Body: {}", e, truncate(&body, 200)))
        })
    } else {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!("Request to {} failed ({}): {}", url, status, truncate(&body, 500));
        Err(ClientError::Http {
            status: status.as_u16(),
            body,
        })
    }
}

pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Http {
        status: status.as_u16(),
        body,
    })
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
