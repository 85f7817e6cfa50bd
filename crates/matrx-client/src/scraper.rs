use matrx_types::{
    RemoteScraperStatus, ResearchRequest, ScrapeRequest, SearchAndScrapeRequest, SearchRequest,
};
use serde_json::Value;

use crate::error::Result;
use crate::rest::RestInvoker;
use crate::sse::SseRequest;

impl RestInvoker {
    pub async fn remote_scraper_status(&self) -> Result<RemoteScraperStatus> {
        self.get_json("/remote-scraper/status").await
    }

    pub async fn remote_scrape(&self, request: &ScrapeRequest) -> Result<Value> {
        self.post_json("/remote-scraper/scrape", request).await
    }

    pub async fn remote_search(&self, request: &SearchRequest) -> Result<Value> {
        self.post_json("/remote-scraper/search", request).await
    }

    pub async fn remote_search_and_scrape(&self, request: &SearchAndScrapeRequest) -> Result<Value> {
        self.post_json("/remote-scraper/search-and-scrape", request)
            .await
    }

    pub async fn remote_research(&self, request: &ResearchRequest) -> Result<Value> {
        self.post_json("/remote-scraper/research", request).await
    }
}

/// Request descriptors for the incremental (SSE) scraper routes.
pub fn scrape_stream(request: &ScrapeRequest) -> Result<SseRequest> {
    SseRequest::post("/remote-scraper/scrape/stream", request)
}

pub fn search_and_scrape_stream(request: &SearchAndScrapeRequest) -> Result<SseRequest> {
    SseRequest::post("/remote-scraper/search-and-scrape/stream", request)
}

pub fn research_stream(request: &ResearchRequest) -> Result<SseRequest> {
    SseRequest::post("/remote-scraper/research/stream", request)
}
