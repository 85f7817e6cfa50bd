use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type ToolInput = Map<String, Value>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ToolResultKind {
    #[default]
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageData {
    pub media_type: String,
    pub base64_data: String,
}

/// Outcome of a tool call. `kind` is the only success/failure signal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInvocationResult {
    #[serde(rename = "type", default)]
    pub kind: ToolResultKind,
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageData>,
}

impl ToolInvocationResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            kind: ToolResultKind::Success,
            output: output.into(),
            metadata: None,
            image: None,
        }
    }

    pub fn error(output: impl Into<String>) -> Self {
        Self {
            kind: ToolResultKind::Error,
            output: output.into(),
            metadata: None,
            image: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == ToolResultKind::Error
    }
}

/// Body of `POST /tools/invoke`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvokeBody {
    pub tool: String,
    #[serde(default)]
    pub input: ToolInput,
}

/// Outbound WebSocket frame for a tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    pub id: String,
    pub tool: String,
    #[serde(default)]
    pub input: ToolInput,
}

impl ToolInvocationRequest {
    pub fn new(tool: impl Into<String>, input: ToolInput) -> Self {
        Self {
            id: new_correlation_id(),
            tool: tool.into(),
            input,
        }
    }
}

/// Random ids stay unique across every client instance in the process.
pub fn new_correlation_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().simple())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    Ping,
    Cancel,
    CancelAll,
}

/// Outbound WebSocket control frame (`ping`, `cancel`, `cancel_all`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub action: ControlAction,
}

/// Inbound WebSocket frame. Only `id` and `type` drive correlation; the rest
/// is carried through for observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundFrame {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Usually a string; broadcasts may carry structured output.
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default)]
    pub image: Option<ImageData>,
}

impl InboundFrame {
    pub fn is_error(&self) -> bool {
        self.kind.as_deref() == Some("error")
    }

    pub fn output_text(&self) -> String {
        match &self.output {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        }
    }

    pub fn into_result(self) -> ToolInvocationResult {
        ToolInvocationResult {
            kind: if self.is_error() {
                ToolResultKind::Error
            } else {
                ToolResultKind::Success
            },
            output: self.output_text(),
            metadata: self.metadata,
            image: self.image,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolList {
    #[serde(default)]
    pub tools: Vec<String>,
}

/// `GET /chat/tools`: schemas for the chat UI, kept loosely typed.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolSchemaCatalog {
    #[serde(default)]
    pub tools: Vec<Value>,
    #[serde(default)]
    pub total: usize,
}
