use async_trait::async_trait;
use matrx_client::{EngineClient, RestInvoker, WsSession};
use matrx_types::{ToolInput, ToolInvocationResult};

/// Either transport, seen from the application layer.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, tool: &str, input: ToolInput) -> matrx_client::Result<ToolInvocationResult>;
}

#[async_trait]
impl ToolInvoker for RestInvoker {
    async fn invoke(&self, tool: &str, input: ToolInput) -> matrx_client::Result<ToolInvocationResult> {
        self.invoke_tool(tool, input).await
    }
}

#[async_trait]
impl ToolInvoker for WsSession {
    async fn invoke(&self, tool: &str, input: ToolInput) -> matrx_client::Result<ToolInvocationResult> {
        self.invoke_tool(tool, input).await
    }
}

/// Uses REST against whatever endpoint the client is attached to.
#[async_trait]
impl ToolInvoker for EngineClient {
    async fn invoke(&self, tool: &str, input: ToolInput) -> matrx_client::Result<ToolInvocationResult> {
        self.invoke_tool(tool, input).await
    }
}
