use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Inputs that move a WebSocket session between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    ConnectRequested,
    Opened,
    ConnectFailed,
    Closed,
    Shutdown,
}

impl SessionState {
    /// The whole transition table. Failures and closes park the session in
    /// `Reconnecting`; only an explicit shutdown returns it to `Disconnected`.
    pub fn next(self, signal: SessionSignal) -> SessionState {
        use SessionSignal::*;
        use SessionState::*;

        match (self, signal) {
            (_, Shutdown) => Disconnected,
            (Connected, ConnectRequested) => Connected,
            (_, ConnectRequested) => Connecting,
            (_, Opened) => Connected,
            (Disconnected, ConnectFailed | Closed) => Disconnected,
            (_, ConnectFailed | Closed) => Reconnecting,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Reconnecting => "reconnecting",
        }
    }
}
