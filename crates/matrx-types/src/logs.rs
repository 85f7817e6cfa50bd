use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One record of the engine's structured access log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AccessLogEntry {
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub origin: String,
    #[serde(default)]
    pub user_agent: String,
    pub status: u16,
    #[serde(default)]
    pub duration_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AccessLogSnapshot {
    #[serde(default)]
    pub entries: Vec<AccessLogEntry>,
}
