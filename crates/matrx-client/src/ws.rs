//! Stateful, reconnecting WebSocket transport with request correlation.
//!
//! Every outbound tool call carries a fresh correlation id; the engine echoes
//! it back on the matching response, so many calls can be in flight and
//! complete out of order. Pending calls survive a reconnect and only give up
//! at their own timeout or on [`WsSession::shutdown`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::{SinkExt, StreamExt};
use matrx_observability::{emit_event, ObservabilityEvent, ProcessKind};
use matrx_types::{
    new_correlation_id, ControlAction, ControlFrame, InboundFrame, ToolInput,
    ToolInvocationRequest, ToolInvocationResult,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use crate::config::ClientConfig;
use crate::correlator::{PendingGuard, PendingRequests};
use crate::error::{ClientError, Result};
use crate::event_bus::{EventBus, SessionEvent};
use crate::reconnect::ReconnectController;
use crate::session_state::{SessionSignal, SessionState};

/// What the link pump reports upward.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Text(String),
    /// Reported without closing; a `Closed` follows if the link is gone.
    Error(String),
    Closed,
}

/// One open connection as a pair of channels. Dropping `outbound` closes it.
pub struct WsLink {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

#[async_trait]
pub trait WsConnector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<WsLink>;
}

pub struct TungsteniteConnector;

#[async_trait]
impl WsConnector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<WsLink> {
        let (ws_stream, _) = tokio_tungstenite::connect_async(url).await?;
        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<LinkEvent>();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = out_rx.recv() => match outbound {
                        Some(text) => {
                            if let Err(e) = write.send(Message::Text(text)).await {
                                let _ = in_tx.send(LinkEvent::Error(e.to_string()));
                                break;
                            }
                        }
                        None => {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        }
                    },
                    inbound = read.next() => match inbound {
                        Some(Ok(Message::Text(text))) => {
                            let _ = in_tx.send(LinkEvent::Text(text));
                        }
                        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                            Ok(text) => {
                                let _ = in_tx.send(LinkEvent::Text(text));
                            }
                            Err(_) => tracing::debug!("Dropping non-UTF-8 binary frame"),
                        },
                        Some(Ok(Message::Ping(_))) => {
                            // Queued pong goes out on flush.
                            let _ = write.flush().await;
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            let _ = in_tx.send(LinkEvent::Error(e.to_string()));
                            break;
                        }
                    }
                }
            }
            let _ = in_tx.send(LinkEvent::Closed);
        });

        Ok(WsLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

struct ActiveLink {
    generation: u64,
    outbound: mpsc::UnboundedSender<String>,
    reader: Option<JoinHandle<()>>,
}

struct SessionInner {
    url: String,
    connector: Arc<dyn WsConnector>,
    state: Mutex<SessionState>,
    link: Mutex<Option<ActiveLink>>,
    link_generation: AtomicU64,
    pending: PendingRequests,
    events: EventBus,
    reconnect: ReconnectController,
    connect_lock: tokio::sync::Mutex<()>,
    shutdown: CancellationToken,
    invoke_timeout: Duration,
    process: ProcessKind,
}

/// Cheap to clone; all clones drive the same connection.
#[derive(Clone)]
pub struct WsSession {
    inner: Arc<SessionInner>,
}

impl WsSession {
    pub fn new(url: impl Into<String>, config: &ClientConfig, connector: Arc<dyn WsConnector>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                url: url.into(),
                connector,
                state: Mutex::new(SessionState::Disconnected),
                link: Mutex::new(None),
                link_generation: AtomicU64::new(0),
                pending: PendingRequests::new(),
                events: EventBus::new(),
                reconnect: ReconnectController::new(config.reconnect.clone()),
                connect_lock: tokio::sync::Mutex::new(()),
                shutdown: CancellationToken::new(),
                invoke_timeout: config.invoke_timeout(),
                process: config.process,
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.inner.pending
    }

    pub fn reconnect_scheduled(&self) -> bool {
        self.inner.reconnect.is_scheduled()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.reconnect.attempts()
    }

    /// Resolves once the socket is open. On failure the error is returned and
    /// a reconnect is scheduled, exactly as if an open link had dropped.
    pub async fn connect(&self) -> Result<()> {
        self.inner.connect().await
    }

    pub async fn invoke_tool(&self, tool: &str, input: ToolInput) -> Result<ToolInvocationResult> {
        let request = ToolInvocationRequest::new(tool, input);
        let frame = serde_json::to_string(&request)?;
        self.inner.send_correlated(&request.id, tool, frame).await
    }

    /// Round trip through the engine's `ping` control action.
    pub async fn ping(&self) -> Result<Duration> {
        let id = new_correlation_id();
        let frame = serde_json::to_string(&ControlFrame {
            id: Some(id.clone()),
            action: ControlAction::Ping,
        })?;
        let started = Instant::now();
        self.inner.send_correlated(&id, "ping", frame).await?;
        Ok(started.elapsed())
    }

    /// Fails the local waiter for `id` with [`ClientError::Aborted`] and asks
    /// the engine to stop the task. Returns whether a local waiter existed.
    pub fn cancel(&self, id: &str) -> Result<bool> {
        let outbound = self.inner.connected_outbound()?;
        let had_waiter = self.inner.pending.resolve(id, Err(ClientError::Aborted));
        let frame = serde_json::to_string(&ControlFrame {
            id: Some(id.to_string()),
            action: ControlAction::Cancel,
        })?;
        outbound.send(frame).map_err(|_| ClientError::NotConnected)?;
        Ok(had_waiter)
    }

    /// Aborts every local waiter, then asks the engine to cancel everything it
    /// is running for this connection. Returns the engine's summary.
    pub async fn cancel_all(&self) -> Result<String> {
        self.inner.connected_outbound()?;
        let aborted = self.inner.pending.fail_all(|| ClientError::Aborted);
        tracing::info!("Aborted {} pending WebSocket request(s)", aborted);

        let id = new_correlation_id();
        let frame = serde_json::to_string(&ControlFrame {
            id: Some(id.clone()),
            action: ControlAction::CancelAll,
        })?;
        let result = self.inner.send_correlated(&id, "cancel_all", frame).await?;
        Ok(result.output)
    }

    /// Stops reconnecting, closes the link and fails every waiter with
    /// [`ClientError::Closed`]. Idempotent.
    pub fn shutdown(&self) {
        self.inner.shutdown();
    }
}

impl SessionInner {
    fn transition(&self, signal: SessionSignal) -> SessionState {
        let (from, to) = {
            let mut state = self.state.lock();
            let from = *state;
            *state = from.next(signal);
            (from, *state)
        };
        if from != to {
            tracing::debug!("WebSocket session {} -> {} ({:?})", from.as_str(), to.as_str(), signal);
            self.events.publish(SessionEvent::StateChanged(to));
        }
        to
    }

    fn state(&self) -> SessionState {
        *self.state.lock()
    }

    fn connected_outbound(&self) -> Result<mpsc::UnboundedSender<String>> {
        if self.state() != SessionState::Connected {
            return Err(ClientError::NotConnected);
        }
        self.link
            .lock()
            .as_ref()
            .map(|link| link.outbound.clone())
            .ok_or(ClientError::NotConnected)
    }

    async fn connect(self: &Arc<Self>) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(ClientError::Closed);
        }
        let _serialized = self.connect_lock.lock().await;
        if self.state() == SessionState::Connected {
            return Ok(());
        }
        self.reconnect.cancel();
        self.transition(SessionSignal::ConnectRequested);

        let opened = tokio::select! {
            _ = self.shutdown.cancelled() => Err(ClientError::Closed),
            opened = self.connector.connect(&self.url) => opened,
        };

        match opened {
            Ok(link) if !self.shutdown.is_cancelled() => {
                self.open_link(link);
                Ok(())
            }
            Ok(_) => Err(ClientError::Closed),
            Err(e) => {
                tracing::warn!("WebSocket connect to {} failed: {}", self.url, e);
                self.events.publish(SessionEvent::Error(e.to_string()));
                emit_event(
                    Level::WARN,
                    self.process,
                    ObservabilityEvent::new("ws.connect_failed", "ws_session")
                        .endpoint(&self.url)
                        .error_code(e.code()),
                );
                if self.shutdown.is_cancelled() {
                    self.transition(SessionSignal::Shutdown);
                } else {
                    self.transition(SessionSignal::ConnectFailed);
                    self.schedule_reconnect();
                }
                Err(e)
            }
        }
    }

    fn open_link(self: &Arc<Self>, link: WsLink) {
        let generation = self.link_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let previous = self.link.lock().replace(ActiveLink {
            generation,
            outbound: link.outbound,
            reader: None,
        });
        if let Some(previous) = previous.and_then(|old| old.reader) {
            previous.abort();
        }

        self.reconnect.reset();
        self.transition(SessionSignal::Opened);
        self.events.publish(SessionEvent::Connected);
        emit_event(
            Level::INFO,
            self.process,
            ObservabilityEvent::new("ws.connected", "ws_session")
                .endpoint(&self.url)
                .status("connected"),
        );

        let reader = tokio::spawn(read_loop(Arc::downgrade(self), generation, link.inbound));
        let mut slot = self.link.lock();
        match slot.as_mut().filter(|active| active.generation == generation) {
            Some(active) => active.reader = Some(reader),
            None => reader.abort(),
        }
    }

    fn handle_text(&self, text: &str) {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!("Dropping non-JSON WebSocket frame: {}", e);
                return;
            }
        };

        match serde_json::from_value::<InboundFrame>(value.clone()) {
            Ok(frame) => {
                if let Some(id) = frame.id.clone() {
                    let outcome = if frame.is_error() {
                        Err(ClientError::Remote(frame.output_text()))
                    } else {
                        Ok(frame.into_result())
                    };
                    if !self.pending.resolve(&id, outcome) {
                        tracing::debug!("No waiter for response {} (late or unsolicited)", id);
                    }
                }
            }
            Err(e) => tracing::debug!("Uncorrelated WebSocket frame: {}", e),
        }

        self.events.publish(SessionEvent::Message(value));
    }

    fn handle_link_error(&self, error: String) {
        tracing::warn!("WebSocket error on {}: {}", self.url, error);
        self.events.publish(SessionEvent::Error(error));
    }

    fn handle_link_closed(self: &Arc<Self>, generation: u64) {
        {
            let mut slot = self.link.lock();
            match slot.as_ref() {
                Some(active) if active.generation == generation => *slot = None,
                _ => return,
            }
        }

        self.events.publish(SessionEvent::Disconnected);
        emit_event(
            Level::INFO,
            self.process,
            ObservabilityEvent::new("ws.disconnected", "ws_session")
                .endpoint(&self.url)
                .status("disconnected"),
        );

        if self.shutdown.is_cancelled() {
            self.transition(SessionSignal::Shutdown);
            return;
        }
        self.transition(SessionSignal::Closed);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.reconnect.schedule(move || reconnect_attempt(weak));
    }

    async fn send_correlated(&self, id: &str, label: &str, frame: String) -> Result<ToolInvocationResult> {
        let outbound = self.connected_outbound()?;
        let rx = self
            .pending
            .register(id, label)
            .ok_or_else(|| ClientError::Decode(format!("Duplicate correlation id {}", id)))?;
        let _guard = PendingGuard::new(&self.pending, id);

        outbound.send(frame).map_err(|_| ClientError::NotConnected)?;

        match tokio::time::timeout(self.invoke_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => {
                emit_event(
                    Level::WARN,
                    self.process,
                    ObservabilityEvent::new("ws.invoke_timeout", "ws_session")
                        .correlation_id(id)
                        .tool(label)
                        .error_code("timeout"),
                );
                Err(ClientError::Timeout {
                    tool: label.to_string(),
                    after: self.invoke_timeout,
                })
            }
        }
    }

    fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        self.reconnect.cancel();

        let link = self.link.lock().take();
        if let Some(link) = link {
            if let Some(reader) = link.reader {
                reader.abort();
            }
            // Dropping the sender closes the socket.
            drop(link.outbound);
            self.events.publish(SessionEvent::Disconnected);
        }

        let failed = self.pending.fail_all(|| ClientError::Closed);
        self.transition(SessionSignal::Shutdown);
        tracing::info!("WebSocket session shut down ({} pending request(s) failed)", failed);
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(link) = self.link.get_mut().take() {
            if let Some(reader) = link.reader {
                reader.abort();
            }
        }
    }
}

fn reconnect_attempt(session: Weak<SessionInner>) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        let Some(inner) = session.upgrade() else {
            return;
        };
        if inner.shutdown.is_cancelled() {
            return;
        }
        if let Err(e) = inner.connect().await {
            tracing::debug!("Reconnect attempt failed: {}", e);
        }
    })
}

async fn read_loop(
    session: Weak<SessionInner>,
    generation: u64,
    mut inbound: mpsc::UnboundedReceiver<LinkEvent>,
) {
    while let Some(event) = inbound.recv().await {
        let Some(inner) = session.upgrade() else {
            return;
        };
        match event {
            LinkEvent::Text(text) => inner.handle_text(&text),
            LinkEvent::Error(error) => inner.handle_link_error(error),
            LinkEvent::Closed => break,
        }
    }
    if let Some(inner) = session.upgrade() {
        inner.handle_link_closed(generation);
    }
}
