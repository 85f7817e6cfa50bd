use std::time::Duration;

use futures::{SinkExt, StreamExt};
use matrx_client::{
    ClientConfig, EngineClient, EngineEndpoint, ReconnectPolicy, SessionEvent, SessionState,
};
use matrx_types::ToolInput;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Minimal engine: answers tool calls with the tool name, `ping` with `pong`.
/// The first connection is dropped after `close_first_after` frames when set.
async fn spawn_engine(close_first_after: Option<usize>) -> (u16, mpsc::UnboundedReceiver<usize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("local_addr").port();
    let (accepted_tx, accepted_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut connection = 0usize;
        while let Ok((stream, _)) = listener.accept().await {
            connection += 1;
            let _ = accepted_tx.send(connection);
            let limit = if connection == 1 { close_first_after } else { None };
            tokio::spawn(async move {
                let mut ws = tokio_tungstenite::accept_async(stream).await.expect("handshake");
                let mut handled = 0usize;
                while let Some(Ok(message)) = ws.next().await {
                    let Message::Text(text) = message else { continue };
                    let frame: Value = serde_json::from_str(&text).expect("json");
                    let reply = match frame["action"].as_str() {
                        Some("ping") => json!({ "type": "success", "output": "pong", "id": frame["id"] }),
                        _ => json!({ "type": "success", "output": frame["tool"], "id": frame["id"] }),
                    };
                    ws.send(Message::Text(reply.to_string())).await.expect("send");
                    handled += 1;
                    if limit == Some(handled) {
                        let _ = ws.close(None).await;
                        break;
                    }
                }
            });
        }
    });

    (port, accepted_rx)
}

fn client_for(port: u16) -> EngineClient {
    let config = ClientConfig {
        reconnect: ReconnectPolicy::fixed(Duration::from_millis(100)),
        ..ClientConfig::default()
    };
    let client = EngineClient::new(config);
    client
        .attach(EngineEndpoint::new("127.0.0.1", port))
        .expect("attach");
    client
}

#[tokio::test]
async fn invoke_and_ping_over_real_socket() {
    let (port, _) = spawn_engine(None).await;
    let client = client_for(port);

    client.connect_ws().await.unwrap();
    let result = client.invoke_tool_ws("ListDirectory", ToolInput::new()).await.unwrap();
    assert_eq!(result.output, "ListDirectory");

    let ws = client.ws().unwrap();
    assert!(ws.ping().await.is_ok());
    assert!(ws.pending().is_empty());
    client.shutdown();
    assert_eq!(ws.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn server_close_triggers_reconnect() {
    let (port, mut accepted) = spawn_engine(Some(1)).await;
    let client = client_for(port);
    let ws = client.ws().unwrap();
    let mut events = ws.events().subscribe();

    client.connect_ws().await.unwrap();
    assert_eq!(accepted.recv().await, Some(1));
    client.invoke_tool_ws("Bash", ToolInput::new()).await.unwrap();

    let saw_reconnect = tokio::time::timeout(Duration::from_secs(5), async {
        let mut disconnected = false;
        loop {
            match events.recv().await {
                Ok(SessionEvent::Disconnected) => disconnected = true,
                Ok(SessionEvent::Connected) if disconnected => return true,
                Ok(_) => {}
                Err(_) => return false,
            }
        }
    })
    .await
    .unwrap_or(false);

    assert!(saw_reconnect);
    assert_eq!(accepted.recv().await, Some(2));
    let result = client.invoke_tool_ws("Read", ToolInput::new()).await.unwrap();
    assert_eq!(result.output, "Read");
    client.shutdown();
}
