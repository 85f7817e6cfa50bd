use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use matrx_client::{best_effort_default, ClientError, RestInvoker};
use matrx_types::ToolInput;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::conversations::{ConversationRecord, ConversationStore};
use crate::error::{AppError, Result};
use crate::invoker::ToolInvoker;

pub const MAX_TOOL_ROUNDS: usize = 8;
const TITLE_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: ToolInput,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ChatToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            is_error: false,
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ChatToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(ChatRole::Assistant, content)
        }
    }

    pub fn tool_result(call_id: impl Into<String>, output: impl Into<String>, is_error: bool) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            is_error,
            ..Self::new(ChatRole::Tool, output)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatStreamEvent {
    TextDelta(String),
    ToolCall(ChatToolCall),
    Done,
    Error(String),
}

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatStreamEvent>> + Send>>;

/// The model side of a chat. The engine only serves tool schemas; the
/// completion itself comes from whichever provider the embedder wires in.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn stream(
        &self,
        messages: &[ChatMessage],
        tools: &[Value],
        cancel: CancellationToken,
    ) -> Result<ChatStream>;
}

/// One conversation: transcript, tool schemas and the last send failure.
pub struct ChatSession {
    id: String,
    title: String,
    messages: Vec<ChatMessage>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_error: Option<String>,
    tools: Vec<Value>,
    backend: Arc<dyn ChatBackend>,
    invoker: Arc<dyn ToolInvoker>,
    store: Option<Arc<ConversationStore>>,
    cancel: CancellationToken,
}

impl ChatSession {
    pub fn new(backend: Arc<dyn ChatBackend>, invoker: Arc<dyn ToolInvoker>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: String::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            last_error: None,
            tools: Vec::new(),
            backend,
            invoker,
            store: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn resume(
        record: ConversationRecord,
        backend: Arc<dyn ChatBackend>,
        invoker: Arc<dyn ToolInvoker>,
    ) -> Self {
        Self {
            id: record.id,
            title: record.title,
            messages: record.messages,
            created_at: record.created_at,
            updated_at: record.updated_at,
            ..Self::new(backend, invoker)
        }
    }

    pub fn with_store(mut self, store: Arc<ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn tools(&self) -> &[Value] {
        &self.tools
    }

    pub fn set_tools(&mut self, tools: Vec<Value>) {
        self.tools = tools;
    }

    /// Loads tool schemas from `GET /chat/tools`. An unreachable engine
    /// leaves the session without tools.
    pub async fn load_tools(&mut self, rest: &RestInvoker) -> usize {
        let catalog = best_effort_default("chat tools", rest.chat_tools()).await;
        self.tools = catalog.tools;
        self.tools.len()
    }

    /// Token that aborts the send in progress when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn record(&self) -> ConversationRecord {
        ConversationRecord {
            id: self.id.clone(),
            title: self.title.clone(),
            messages: self.messages.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Sends a user turn and runs the reply to completion, including any
    /// tool rounds. `on_event` sees every stream event as it arrives.
    ///
    /// On failure the user turn and completed rounds stay in the transcript
    /// and the error is kept in [`ChatSession::last_error`].
    pub async fn send<F>(&mut self, text: &str, mut on_event: F) -> Result<()>
    where
        F: FnMut(&ChatStreamEvent) + Send,
    {
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }
        if self.title.is_empty() {
            self.title = derive_title(text);
        }
        self.messages.push(ChatMessage::user(text));
        self.last_error = None;

        let outcome = self.run_rounds(&mut on_event).await;
        if let Err(e) = &outcome {
            tracing::warn!("Chat send failed: {}", e);
            self.last_error = Some(e.to_string());
        }

        self.updated_at = Utc::now();
        if let Some(store) = &self.store {
            store.save(self.record()).await;
        }
        outcome
    }

    async fn run_rounds<F>(&mut self, on_event: &mut F) -> Result<()>
    where
        F: FnMut(&ChatStreamEvent) + Send,
    {
        for _ in 0..MAX_TOOL_ROUNDS {
            let cancel = self.cancel.child_token();
            let mut stream = self
                .backend
                .stream(&self.messages, &self.tools, cancel.clone())
                .await?;

            let mut text = String::new();
            let mut calls = Vec::new();
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(ClientError::Aborted.into()),
                    next = stream.next() => next,
                };
                let Some(event) = next else {
                    break;
                };
                let event = event?;
                on_event(&event);
                match event {
                    ChatStreamEvent::TextDelta(delta) => text.push_str(&delta),
                    ChatStreamEvent::ToolCall(call) => calls.push(call),
                    ChatStreamEvent::Done => break,
                    ChatStreamEvent::Error(message) => return Err(AppError::Chat(message)),
                }
            }

            self.messages.push(ChatMessage::assistant(text, calls.clone()));
            if calls.is_empty() {
                return Ok(());
            }

            for call in calls {
                let reply = match self.invoker.invoke(&call.name, call.input.clone()).await {
                    Ok(result) => ChatMessage::tool_result(&call.id, result.output.clone(), result.is_error()),
                    Err(e) => ChatMessage::tool_result(&call.id, e.to_string(), true),
                };
                self.messages.push(reply);
            }
        }
        tracing::warn!("Chat stopped after {} tool rounds", MAX_TOOL_ROUNDS);
        Ok(())
    }
}

fn derive_title(text: &str) -> String {
    let line = text.lines().next().unwrap_or("").trim();
    let mut title: String = line.chars().take(TITLE_CHARS).collect();
    if line.chars().count() > TITLE_CHARS {
        title.push_str("...");
    }
    if title.is_empty() {
        "New chat".to_string()
    } else {
        title
    }
}
