use serde::{Deserialize, Serialize};

/// `GET /` response.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct EngineInfo {
    #[serde(default)]
    pub version: String,
}

/// Runtime settings exposed at `/settings`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineSettings {
    #[serde(default = "default_headless")]
    pub headless_scraping: bool,
    #[serde(default = "default_scrape_delay")]
    pub scrape_delay: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            headless_scraping: default_headless(),
            scrape_delay: default_scrape_delay(),
        }
    }
}

fn default_headless() -> bool {
    true
}

fn default_scrape_delay() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProxyStatus {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub proxy_url: String,
    #[serde(default)]
    pub request_count: u64,
    #[serde(default)]
    pub bytes_forwarded: u64,
    #[serde(default)]
    pub active_connections: u64,
    #[serde(default)]
    pub uptime_seconds: f64,
}
