pub mod auth;
pub mod best_effort;
pub mod client;
pub mod config;
pub mod correlator;
pub mod discovery;
pub mod documents;
pub mod endpoint;
pub mod error;
pub mod event_bus;
pub mod logs;
pub mod reconnect;
pub mod rest;
pub mod scraper;
pub mod session_state;
pub mod sse;
pub mod ws;

pub use auth::{StaticToken, TokenProvider};
pub use best_effort::{best_effort, best_effort_default};
pub use client::EngineClient;
pub use config::ClientConfig;
pub use correlator::{PendingGuard, PendingRequests};
pub use discovery::{HttpProber, PortDiscovery, Prober};
pub use documents::NoteFilter;
pub use endpoint::EngineEndpoint;
pub use error::{ClientError, Result};
pub use event_bus::{EventBus, EventKind, SessionEvent, Subscription};
pub use reconnect::{ReconnectController, ReconnectPolicy};
pub use rest::RestInvoker;
pub use session_state::{SessionSignal, SessionState};
pub use sse::{SseCallbacks, SseDecoder, SseEvent, SseHandle, SseHandler, SseRequest};
pub use ws::{LinkEvent, TungsteniteConnector, WsConnector, WsLink, WsSession};
