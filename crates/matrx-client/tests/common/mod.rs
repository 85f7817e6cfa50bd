#![allow(dead_code)]

use std::time::Duration;

use matrx_client::{ClientConfig, EngineEndpoint, RestInvoker, StaticToken, TokenProvider};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub line: String,
    pub head: String,
    pub body: String,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        let wanted = name.to_ascii_lowercase();
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            (key.trim().to_ascii_lowercase() == wanted).then(|| value.trim().to_string())
        })
    }
}

pub async fn read_request(socket: &mut TcpStream) -> CapturedRequest {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    let head_end = loop {
        let n = socket.read(&mut buf).await.expect("read");
        assert!(n > 0, "client closed before sending headers");
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };
    let head = String::from_utf8_lossy(&data[..head_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    let mut body = data[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut buf).await.expect("read body");
        if n == 0 {
            break;
        }
        body.extend_from_slice(&buf[..n]);
    }

    CapturedRequest {
        line: head.lines().next().unwrap_or("").to_string(),
        head,
        body: String::from_utf8_lossy(&body).to_string(),
    }
}

/// Answers exactly one request with a JSON body and reports what it received.
pub async fn spawn_json_server(
    status: &'static str,
    body: impl Into<String>,
) -> (String, oneshot::Receiver<CapturedRequest>) {
    let body = body.into();
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket
            .write_all(response.as_bytes())
            .await
            .expect("write_all");
        let _ = tx.send(request);
    });
    (format!("http://{}", addr), rx)
}

/// Streams `chunks` as an event-stream body, pausing before each one, then
/// closes the connection.
pub async fn spawn_sse_server(
    chunks: Vec<(Duration, String)>,
) -> (String, oneshot::Receiver<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local_addr");
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let request = read_request(&mut socket).await;
        let _ = tx.send(request);
        let head = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n";
        if socket.write_all(head.as_bytes()).await.is_err() {
            return;
        }
        for (pause, chunk) in chunks {
            tokio::time::sleep(pause).await;
            if socket.write_all(chunk.as_bytes()).await.is_err() {
                return;
            }
            let _ = socket.flush().await;
        }
        let _ = socket.shutdown().await;
    });
    (format!("http://{}", addr), rx)
}

pub fn endpoint_for(base_url: &str) -> EngineEndpoint {
    let port = base_url
        .rsplit(':')
        .next()
        .and_then(|p| p.parse::<u16>().ok())
        .expect("port in base url");
    EngineEndpoint::new("127.0.0.1", port)
}

pub fn invoker(base_url: &str, token: Option<&str>, user_id: Option<&str>) -> RestInvoker {
    let auth = token.map(|t| Arc::new(StaticToken::new(t)) as Arc<dyn TokenProvider>);
    RestInvoker::new(
        endpoint_for(base_url),
        ClientConfig::default().request_timeout(),
        auth,
        user_id.map(str::to_string),
    )
    .expect("invoker")
}
