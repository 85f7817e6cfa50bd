use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::session_state::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Disconnected,
    Error,
    Message,
    StateChanged,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Connected,
    Disconnected,
    Error(String),
    /// Every parsed inbound frame, correlated or not.
    Message(Value),
    StateChanged(SessionState),
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::Connected => EventKind::Connected,
            SessionEvent::Disconnected => EventKind::Disconnected,
            SessionEvent::Error(_) => EventKind::Error,
            SessionEvent::Message(_) => EventKind::Message,
            SessionEvent::StateChanged(_) => EventKind::StateChanged,
        }
    }
}

type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;
type Registry = Mutex<HashMap<EventKind, Vec<(u64, Listener)>>>;

/// Fan-out for session events: synchronous callbacks keyed by kind, plus a
/// broadcast channel for async consumers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
    listeners: Arc<Registry>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(2048);
        Self {
            tx,
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn on(
        &self,
        kind: EventKind,
        listener: impl Fn(&SessionEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners
            .lock()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(listener)));
        Subscription {
            registry: Arc::downgrade(&self.listeners),
            kind,
            id,
            active: AtomicBool::new(true),
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.lock().get(&kind).map_or(0, Vec::len)
    }

    pub fn publish(&self, event: SessionEvent) {
        // Snapshot first so a listener may (un)subscribe without deadlocking.
        let listeners: Vec<Listener> = self
            .listeners
            .lock()
            .get(&event.kind())
            .map(|entries| entries.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();
        for listener in listeners {
            listener(&event);
        }
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Returned by [`EventBus::on`]. Dropping it keeps the listener registered.
pub struct Subscription {
    registry: Weak<Registry>,
    kind: EventKind,
    id: u64,
    active: AtomicBool,
}

impl Subscription {
    /// Idempotent.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            let mut map = registry.lock();
            if let Some(entries) = map.get_mut(&self.kind) {
                entries.retain(|(id, _)| *id != self.id);
                if entries.is_empty() {
                    map.remove(&self.kind);
                }
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
