use std::time::Duration;

use matrx_observability::ProcessKind;
use serde::{Deserialize, Serialize};

use crate::reconnect::ReconnectPolicy;

pub const DEFAULT_ENGINE_HOST: &str = "127.0.0.1";
pub const DEFAULT_ENGINE_PORT: u16 = 22140;
pub const DEFAULT_PORT_SPAN: u16 = 20;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 800;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_INVOKE_TIMEOUT_MS: u64 = 120_000;

pub const ENV_ENGINE_HOST: &str = "MATRX_ENGINE_HOST";
pub const ENV_ENGINE_PORT: &str = "MATRX_ENGINE_PORT";
pub const ENV_USER_ID: &str = "MATRX_USER_ID";
pub const ENV_API_TOKEN: &str = "MATRX_API_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    /// First port probed during discovery.
    pub port: u16,
    /// Number of ports probed, the default one included.
    pub port_span: u16,
    pub probe_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub invoke_timeout_ms: u64,
    pub user_id: Option<String>,
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
    pub reconnect: ReconnectPolicy,
    /// Tags structured lifecycle events.
    #[serde(skip)]
    pub process: ProcessKind,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_ENGINE_HOST.to_string(),
            port: DEFAULT_ENGINE_PORT,
            port_span: DEFAULT_PORT_SPAN,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            invoke_timeout_ms: DEFAULT_INVOKE_TIMEOUT_MS,
            user_id: None,
            api_token: None,
            reconnect: ReconnectPolicy::default(),
            process: ProcessKind::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with `MATRX_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        if let Some(host) = non_empty(ENV_ENGINE_HOST) {
            self.host = host;
        }
        if let Some(port) = non_empty(ENV_ENGINE_PORT) {
            match port.parse::<u16>() {
                Ok(port) => self.port = port,
                Err(_) => tracing::warn!("Ignoring invalid {}: {}", ENV_ENGINE_PORT, port),
            }
        }
        if let Some(user_id) = non_empty(ENV_USER_ID) {
            self.user_id = Some(user_id);
        }
        if let Some(token) = non_empty(ENV_API_TOKEN) {
            self.api_token = Some(token);
        }
        self
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_millis(self.invoke_timeout_ms)
    }

    /// Ports in probe order: the default first, then upward.
    pub fn candidate_ports(&self) -> Vec<u16> {
        (0..self.port_span.max(1))
            .filter_map(|offset| self.port.checked_add(offset))
            .collect()
    }
}
