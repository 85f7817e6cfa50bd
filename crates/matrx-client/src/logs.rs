use matrx_types::AccessLogSnapshot;
use reqwest::Method;

use crate::error::Result;
use crate::rest::RestInvoker;
use crate::sse::SseRequest;

pub const DEFAULT_ACCESS_LOG_LIMIT: usize = 100;

impl RestInvoker {
    /// Last `limit` records of the engine access log, oldest first.
    pub async fn access_log(&self, limit: usize) -> Result<AccessLogSnapshot> {
        let builder = self
            .request(Method::GET, "/logs/access")
            .await
            .query(&[("limit", limit)]);
        self.send(builder).await
    }
}

/// Live access-log records; each `data:` line is one JSON entry.
pub fn access_log_stream() -> SseRequest {
    SseRequest::get("/logs/access/stream").token_in_query()
}

/// Live application log lines.
pub fn engine_log_stream() -> SseRequest {
    SseRequest::get("/logs/stream").token_in_query()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_streams_authenticate_through_query() {
        assert!(access_log_stream().token_in_query);
        assert_eq!(engine_log_stream().path, "/logs/stream");
    }
}
