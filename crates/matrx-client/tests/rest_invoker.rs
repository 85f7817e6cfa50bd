mod common;

use common::{invoker, spawn_json_server};
use matrx_client::{best_effort_default, ClientError, NoteFilter};
use matrx_types::{
    ConflictResolution, EngineSettings, ProxyStatus, ToolInput, ToolResultKind,
    UpdateNoteRequest,
};
use serde_json::{json, Value};

#[tokio::test]
async fn invoke_tool_posts_body_with_auth_headers() {
    let (base, captured) = spawn_json_server(
        "200 OK",
        r#"{"type":"success","output":"hello","metadata":{"exit_code":0}}"#,
    )
    .await;
    let rest = invoker(&base, Some("tok-123"), Some("user-1"));

    let mut input = ToolInput::new();
    input.insert("command".to_string(), json!("echo hello"));
    let result = rest.invoke_tool("Bash", input).await.unwrap();

    assert_eq!(result.kind, ToolResultKind::Success);
    assert_eq!(result.output, "hello");
    assert_eq!(result.metadata.unwrap()["exit_code"], 0);

    let request = captured.await.unwrap();
    assert!(request.line.starts_with("POST /tools/invoke "));
    assert_eq!(request.header("authorization").as_deref(), Some("Bearer tok-123"));
    assert_eq!(request.header("x-user-id").as_deref(), Some("user-1"));
    let body: Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(body, json!({ "tool": "Bash", "input": { "command": "echo hello" } }));
}

#[tokio::test]
async fn tool_level_failure_is_not_a_transport_error() {
    let (base, _) = spawn_json_server("200 OK", r#"{"type":"error","output":"exit 1"}"#).await;
    let result = invoker(&base, None, None)
        .invoke_tool("Bash", ToolInput::new())
        .await
        .unwrap();
    assert!(result.is_error());
}

#[tokio::test]
async fn non_2xx_carries_status_and_body() {
    let (base, _) = spawn_json_server("401 Unauthorized", r#"{"detail":"bad token"}"#).await;
    let err = invoker(&base, Some("wrong"), None)
        .list_tools()
        .await
        .unwrap_err();
    match err {
        ClientError::Http { status, body } => {
            assert_eq!(status, 401);
            assert!(body.contains("bad token"));
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn unauthenticated_requests_send_no_bearer() {
    let (base, captured) = spawn_json_server("200 OK", r#"{"tools":["Bash","Read"]}"#).await;
    let tools = invoker(&base, None, None).list_tools().await.unwrap();
    assert_eq!(tools, vec!["Bash", "Read"]);
    let request = captured.await.unwrap();
    assert!(request.header("authorization").is_none());
    assert!(request.header("x-user-id").is_none());
}

#[tokio::test]
async fn malformed_success_body_is_a_decode_error() {
    let (base, _) = spawn_json_server("200 OK", "not json").await;
    let err = invoker(&base, None, None).settings().await.unwrap_err();
    assert!(matches!(err, ClientError::Decode(_)));
}

#[tokio::test]
async fn settings_round_trip_uses_put() {
    let (base, captured) =
        spawn_json_server("200 OK", r#"{"headless_scraping":false,"scrape_delay":2.5}"#).await;
    let updated = invoker(&base, None, None)
        .update_settings(&EngineSettings {
            headless_scraping: false,
            scrape_delay: 2.5,
        })
        .await
        .unwrap();
    assert!(!updated.headless_scraping);
    let request = captured.await.unwrap();
    assert!(request.line.starts_with("PUT /settings "));
}

#[tokio::test]
async fn document_routes_refuse_without_user_id() {
    // Nothing listens here; the call must fail before any connection attempt.
    let rest = invoker("http://127.0.0.1:9", None, None);
    assert!(matches!(
        rest.folder_tree().await,
        Err(ClientError::MissingUserId)
    ));
    assert!(matches!(
        rest.update_note("n1", &UpdateNoteRequest::content("x")).await,
        Err(ClientError::MissingUserId)
    ));
}

#[tokio::test]
async fn list_notes_passes_filters_as_query() {
    let (base, captured) = spawn_json_server(
        "200 OK",
        r#"[{"id":"n1","label":"Plan","content":"..","folder_name":"Work"}]"#,
    )
    .await;
    let notes = invoker(&base, None, Some("user-1"))
        .list_notes(&NoteFilter {
            folder_id: Some("f1".to_string()),
            search: Some("plan".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].folder_name, "Work");

    let request = captured.await.unwrap();
    assert!(request.line.contains("/documents/notes?"));
    assert!(request.line.contains("folder_id=f1"));
    assert!(request.line.contains("search=plan"));
}

#[tokio::test]
async fn resolve_conflict_sends_snake_case_resolution() {
    let (base, captured) =
        spawn_json_server("200 OK", r#"{"status":"resolved","resolution":"keep_both"}"#).await;
    invoker(&base, None, Some("user-1"))
        .resolve_conflict("n9", ConflictResolution::KeepBoth)
        .await
        .unwrap();
    let request = captured.await.unwrap();
    assert!(request.line.starts_with("POST /documents/conflicts/n9/resolve "));
    let body: Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(body, json!({ "resolution": "keep_both" }));
}

#[tokio::test]
async fn delete_mapping_includes_local_path_query() {
    let (base, captured) = spawn_json_server("200 OK", r#"{"status":"deleted"}"#).await;
    let ack = invoker(&base, None, Some("user-1"))
        .delete_mapping("m1", Some("f1"), Some("/home/me/notes"))
        .await
        .unwrap();
    assert_eq!(ack.status, "deleted");
    let request = captured.await.unwrap();
    assert!(request.line.starts_with("DELETE /documents/mappings/m1?"));
    assert!(request.line.contains("local_path=%2Fhome%2Fme%2Fnotes"));
}

#[tokio::test]
async fn best_effort_read_falls_back_on_server_error() {
    let (base, _) = spawn_json_server("503 Service Unavailable", r#"{"detail":"down"}"#).await;
    let rest = invoker(&base, None, None);
    let status: ProxyStatus = best_effort_default("proxy status", rest.proxy_status()).await;
    assert_eq!(status, ProxyStatus::default());
}

#[tokio::test]
async fn access_log_snapshot_requests_limit() {
    let (base, captured) = spawn_json_server(
        "200 OK",
        r#"{"entries":[{"timestamp":"2026-03-01T10:00:00+00:00","method":"GET","path":"/","query":"","origin":"","user_agent":"t","status":200,"duration_ms":0.4}]}"#,
    )
    .await;
    let snapshot = invoker(&base, None, None).access_log(25).await.unwrap();
    assert_eq!(snapshot.entries.len(), 1);
    assert_eq!(snapshot.entries[0].status, 200);
    let request = captured.await.unwrap();
    assert!(request.line.starts_with("GET /logs/access?limit=25 "));
}
