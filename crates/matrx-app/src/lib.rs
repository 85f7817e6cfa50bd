//! Application state layered on the engine client: debounced note
//! autosave, tool execution history and chat sessions with locally
//! persisted conversations.

pub mod autosave;
pub mod chat;
pub mod conversations;
pub mod error;
pub mod history;
pub mod invoker;

pub use autosave::{EditorSnapshot, NoteEditor, NoteStore, DEFAULT_DEBOUNCE};
pub use chat::{ChatBackend, ChatMessage, ChatRole, ChatSession, ChatStream, ChatStreamEvent, ChatToolCall};
pub use conversations::{ConversationRecord, ConversationStore};
pub use error::{AppError, Result};
pub use history::{ExecutionHistoryEntry, ExecutionSnapshot, ExecutionStatus, ExecutionTracker};
pub use invoker::ToolInvoker;
