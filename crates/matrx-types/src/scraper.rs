use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScrapeRequest {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub keywords: Vec<String>,
    #[serde(default = "default_search_count")]
    pub count: u32,
    #[serde(default = "default_country")]
    pub country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchAndScrapeRequest {
    pub keywords: Vec<String>,
    #[serde(default = "default_results_per_keyword")]
    pub total_results_per_keyword: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchRequest {
    pub query: String,
    #[serde(default = "default_effort")]
    pub effort: String,
    #[serde(default = "default_country")]
    pub country: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RemoteScraperStatus {
    #[serde(default)]
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_search_count() -> u32 {
    10
}

fn default_results_per_keyword() -> u32 {
    5
}

fn default_country() -> String {
    "US".to_string()
}

fn default_effort() -> String {
    "thorough".to_string()
}

impl SearchRequest {
    pub fn new(keywords: Vec<String>) -> Self {
        Self {
            keywords,
            count: default_search_count(),
            country: default_country(),
        }
    }
}

impl ResearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            effort: default_effort(),
            country: default_country(),
        }
    }
}
