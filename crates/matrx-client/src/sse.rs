//! Server-sent-event consumption for log tailing and incremental scraper
//! results.
//!
//! The engine writes one `data:` line per payload, optionally preceded by an
//! `event:` line. Each `data:` line is dispatched as soon as it is complete;
//! the event name then falls back to `message`.

use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, Result};
use crate::rest::{check_status, RestInvoker};

pub const DEFAULT_EVENT_NAME: &str = "message";

#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: String,
    pub data: Value,
}

/// Incremental line decoder. Bytes after the last newline stay buffered, so a
/// line (or a UTF-8 sequence) split across chunks is decoded only once whole.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    current_event: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(event) = self.decode_line(&line[..newline]) {
                events.push(event);
            }
        }
        events
    }

    /// End of stream: decode whatever unterminated line is left.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let rest = std::mem::take(&mut self.buffer);
        let event = self.decode_line(&rest);
        self.current_event = None;
        event.into_iter().collect()
    }

    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<SseEvent> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        let line = String::from_utf8_lossy(raw);
        if line.trim().is_empty() || line.starts_with(':') {
            return None;
        }

        if let Some(name) = line.strip_prefix("event:") {
            let name = name.trim();
            self.current_event = (!name.is_empty()).then(|| name.to_string());
            return None;
        }

        let payload = line.strip_prefix("data:")?;
        let payload = payload.strip_prefix(' ').unwrap_or(payload);
        let data = serde_json::from_str(payload)
            .unwrap_or_else(|_| Value::String(payload.to_string()));
        let event = self
            .current_event
            .take()
            .unwrap_or_else(|| DEFAULT_EVENT_NAME.to_string());
        Some(SseEvent { event, data })
    }
}

/// Which engine route to stream and how to call it.
#[derive(Debug, Clone, PartialEq)]
pub struct SseRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub query: Vec<(String, String)>,
    /// `EventSource`-style routes read the token from `?token=` instead of a header.
    pub token_in_query: bool,
}

impl SseRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
            query: Vec::new(),
            token_in_query: false,
        }
    }

    pub fn post<B: Serialize + ?Sized>(path: impl Into<String>, body: &B) -> Result<Self> {
        Ok(Self {
            method: Method::POST,
            path: path.into(),
            body: Some(serde_json::to_value(body)?),
            query: Vec::new(),
            token_in_query: false,
        })
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn token_in_query(mut self) -> Self {
        self.token_in_query = true;
        self
    }
}

/// Callbacks for a pushed stream. Nothing fires after [`SseHandle::abort`].
pub trait SseHandler: Send + 'static {
    fn on_event(&mut self, event: &str, data: Value);

    fn on_done(&mut self) {}

    /// Genuine failures only; an intentional abort never lands here.
    fn on_error(&mut self, error: ClientError) {
        tracing::warn!("SSE stream failed: {}", error);
    }
}

type EventFn = Box<dyn FnMut(&str, Value) + Send>;
type DoneFn = Box<dyn FnMut() + Send>;
type ErrorFn = Box<dyn FnMut(ClientError) + Send>;

/// Closure-backed [`SseHandler`].
pub struct SseCallbacks {
    on_event: EventFn,
    on_done: Option<DoneFn>,
    on_error: Option<ErrorFn>,
}

impl SseCallbacks {
    pub fn new(on_event: impl FnMut(&str, Value) + Send + 'static) -> Self {
        Self {
            on_event: Box::new(on_event),
            on_done: None,
            on_error: None,
        }
    }

    pub fn on_done(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.on_done = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(ClientError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

impl SseHandler for SseCallbacks {
    fn on_event(&mut self, event: &str, data: Value) {
        (self.on_event)(event, data);
    }

    fn on_done(&mut self) {
        if let Some(f) = self.on_done.as_mut() {
            f();
        }
    }

    fn on_error(&mut self, error: ClientError) {
        match self.on_error.as_mut() {
            Some(f) => f(error),
            None => tracing::warn!("SSE stream failed: {}", error),
        }
    }
}

/// Caller-owned cancel handle for a spawned stream.
pub struct SseHandle {
    token: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SseHandle {
    /// Idempotent; safe mid-stream.
    pub fn abort(&self) {
        self.token.cancel();
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map_or(true, |task| task.is_finished())
    }

    /// Waits for the stream to end on its own or be aborted.
    pub async fn join(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

async fn open_response(invoker: &RestInvoker, request: &SseRequest) -> Result<reqwest::Response> {
    let mut builder = invoker
        .stream_request(request.method.clone(), &request.path)
        .await;
    if !request.query.is_empty() {
        builder = builder.query(&request.query);
    }
    if request.token_in_query {
        if let Some(token) = invoker.current_token().await {
            builder = builder.query(&[("token", token)]);
        }
    }
    if let Some(body) = &request.body {
        builder = builder.json(body);
    }

    tracing::debug!("Opening SSE stream {} {}", request.method, request.path);
    let response = builder.send().await?;
    check_status(response).await
}

/// Pull-based variant: the caller drives the stream and drops it to stop.
pub async fn open_sse(
    invoker: &RestInvoker,
    request: &SseRequest,
) -> Result<impl Stream<Item = Result<SseEvent>>> {
    let response = open_response(invoker, request).await?;
    let stream = response.bytes_stream();

    Ok(async_stream::stream! {
        let mut decoder = SseDecoder::new();
        let mut failed = false;

        futures::pin_mut!(stream);

        while let Some(chunk_result) = stream.next().await {
            match chunk_result {
                Ok(chunk) => {
                    for event in decoder.push(&chunk) {
                        yield Ok(event);
                    }
                }
                Err(e) => {
                    tracing::warn!("SSE stream error: {}", e);
                    yield Err(ClientError::Transport(format!("Stream error: {}", e)));
                    failed = true;
                    break;
                }
            }
        }

        if !failed {
            for event in decoder.finish() {
                yield Ok(event);
            }
        }
        tracing::debug!("SSE stream ended");
    })
}

/// Push-based variant: spawns the stream and feeds `handler` until the
/// stream ends, fails, or the returned handle is aborted.
pub fn stream_sse<H: SseHandler>(invoker: RestInvoker, request: SseRequest, handler: H) -> SseHandle {
    let token = CancellationToken::new();
    let task = tokio::spawn(run_stream(invoker, request, handler, token.clone()));
    SseHandle {
        token,
        task: Mutex::new(Some(task)),
    }
}

async fn run_stream<H: SseHandler>(
    invoker: RestInvoker,
    request: SseRequest,
    mut handler: H,
    token: CancellationToken,
) {
    let opened = tokio::select! {
        biased;
        _ = token.cancelled() => return,
        opened = open_sse(&invoker, &request) => opened,
    };

    let stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            if !token.is_cancelled() {
                handler.on_error(e);
            }
            return;
        }
    };
    futures::pin_mut!(stream);

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return,
            next = stream.next() => next,
        };
        if token.is_cancelled() {
            return;
        }
        match next {
            Some(Ok(event)) => handler.on_event(&event.event, event.data),
            Some(Err(e)) => {
                handler.on_error(e);
                return;
            }
            None => break,
        }
    }

    if !token.is_cancelled() {
        handler.on_done();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SAMPLE: &str = "event: progress\ndata: {\"step\":1,\"label\":\"héllo ✓\"}\n: keep-alive\n\ndata: plain text\r\nevent: done\ndata: {\"ok\":true}\n";

    fn decode_all(chunks: &[&[u8]]) -> Vec<SseEvent> {
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(decoder.push(chunk));
        }
        events.extend(decoder.finish());
        events
    }

    fn expected() -> Vec<SseEvent> {
        vec![
            SseEvent {
                event: "progress".to_string(),
                data: json!({ "step": 1, "label": "héllo ✓" }),
            },
            SseEvent {
                event: "message".to_string(),
                data: json!("plain text"),
            },
            SseEvent {
                event: "done".to_string(),
                data: json!({ "ok": true }),
            },
        ]
    }

    #[test]
    fn decodes_whole_payload() {
        assert_eq!(decode_all(&[SAMPLE.as_bytes()]), expected());
    }

    #[test]
    fn split_at_seven_matches_whole() {
        let bytes = SAMPLE.as_bytes();
        assert_eq!(decode_all(&[&bytes[..7], &bytes[7..]]), expected());
    }

    #[test]
    fn every_split_point_matches_whole() {
        let bytes = SAMPLE.as_bytes();
        for at in 0..=bytes.len() {
            assert_eq!(
                decode_all(&[&bytes[..at], &bytes[at..]]),
                expected(),
                "split at {}",
                at
            );
        }
    }

    #[test]
    fn byte_at_a_time_matches_whole() {
        let chunks: Vec<&[u8]> = SAMPLE.as_bytes().chunks(1).collect();
        assert_eq!(decode_all(&chunks), expected());
    }

    #[test]
    fn partial_line_is_held_until_newline() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\":").is_empty());
        assert!(decoder.has_pending());
        let events = decoder.push(b"1}\n");
        assert_eq!(events[0].data, json!({ "a": 1 }));
        assert!(!decoder.has_pending());
    }

    #[test]
    fn event_name_resets_after_each_data_line() {
        let events = decode_all(&[b"event: log\ndata: 1\ndata: 2\n"]);
        assert_eq!(events[0].event, "log");
        assert_eq!(events[1].event, "message");
    }

    #[test]
    fn finish_flushes_unterminated_final_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"tail\":true}").is_empty());
        let events = decoder.finish();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, json!({ "tail": true }));
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn data_without_space_and_unknown_fields() {
        let events = decode_all(&[b"id: 7\nretry: 100\ndata:42\n"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, json!(42));
    }

    #[test]
    fn request_builders_set_query_and_token_mode() {
        let request = SseRequest::get("/logs/access/stream")
            .query("limit", "10")
            .token_in_query();
        assert_eq!(request.method, Method::GET);
        assert!(request.token_in_query);
        assert_eq!(request.query, vec![("limit".to_string(), "10".to_string())]);
        assert!(request.body.is_none());
    }
}
