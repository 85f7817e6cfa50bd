use serde::{Deserialize, Serialize};

/// Where a running engine was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineEndpoint {
    pub port: u16,
    pub base_url: String,
    pub ws_url: String,
}

impl EngineEndpoint {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            port,
            base_url: format!("http://{}:{}", host, port),
            ws_url: format!("ws://{}:{}/ws", host, port),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}
