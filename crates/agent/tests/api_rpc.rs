//! JSON-RPC surface tests driven through the axum router.

use agentry::{ChatOptions, ChatRequest, EventStream, LlmError, StreamEvent, StreamingChatProvider};
use agentry_agent::AgentBuilder;
use agentry_agent::api::AgentApp;
use agentry_agent::config::AgentManifest;
use agentry_agent::error::AgentResult;
use agentry_agent::tools::ToolCatalog;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Arc;
use tower::util::ServiceExt;

const MANIFEST: &str = r#"
    [agent]
    name = "RPC Agent"
    description = "Serves the wire tests"

    [persona]
    prompt = "You are terse."

    [[skill]]
    id = "chat"
    name = "Chat"
    description = "Plain conversation"
"#;

struct ScriptedProvider {
    scripts: Mutex<VecDeque<Vec<Result<StreamEvent, LlmError>>>>,
}

#[async_trait]
impl StreamingChatProvider for ScriptedProvider {
    async fn stream_message(
        &self,
        _request: ChatRequest,
        _options: ChatOptions,
    ) -> Result<EventStream, LlmError> {
        let events = self.scripts.lock().pop_front().unwrap_or_default();
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

struct EmptyCatalog;

#[async_trait]
impl ToolCatalog for EmptyCatalog {
    fn tools(&self) -> Vec<agentry::Tool> {
        Vec::new()
    }
    async fn call_tool(&self, name: &str, _arguments: Value) -> AgentResult<Value> {
        panic!("unexpected MCP call: {name}")
    }
}

async fn build_app(scripts: Vec<Vec<Result<StreamEvent, LlmError>>>) -> Arc<AgentApp> {
    let manifest = AgentManifest::parse(MANIFEST).unwrap();
    AgentBuilder::new(
        manifest,
        Arc::new(ScriptedProvider {
            scripts: Mutex::new(scripts.into()),
        }),
    )
    .with_catalog(Arc::new(EmptyCatalog))
    .build()
    .await
    .unwrap()
}

async fn post_rpc(app: &Arc<AgentApp>, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .router()
        .oneshot(
            Request::post("/")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn send_params(text: &str, context_id: Option<&str>, task_id: Option<&str>) -> Value {
    let mut message = json!({
        "role": "user",
        "parts": [{"kind": "text", "text": text}],
    });
    if let Some(context_id) = context_id {
        message["contextId"] = json!(context_id);
    }
    if let Some(task_id) = task_id {
        message["taskId"] = json!(task_id);
    }
    json!({"message": message})
}

// ── Discovery ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn agent_card_is_served_on_both_well_known_paths() {
    let app = build_app(vec![]).await;
    for path in ["/.well-known/agent.json", "/.well-known/agent-card.json"] {
        let response = app
            .clone()
            .router()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let card: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(card["name"], "RPC Agent");
        assert_eq!(card["capabilities"]["streaming"], true);
        assert!(card["protocolVersion"].is_string());
    }
}

// ── Envelope errors ───────────────────────────────────────────────────────

#[tokio::test]
async fn malformed_json_yields_parse_error() {
    let app = build_app(vec![]).await;
    let response = app
        .clone()
        .router()
        .oneshot(
            Request::post("/")
                .header("content-type", "application/json")
                .body(Body::from("{ not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let envelope: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(envelope["error"]["code"], -32700);
}

#[tokio::test]
async fn unknown_method_yields_method_not_found() {
    let app = build_app(vec![]).await;
    let (_, envelope) = post_rpc(
        &app,
        json!({"jsonrpc": "2.0", "id": 5, "method": "tasks/cancel", "params": {}}),
    )
    .await;
    assert_eq!(envelope["error"]["code"], -32601);
    assert_eq!(envelope["id"], 5);
}

#[tokio::test]
async fn unknown_context_yields_invalid_request_with_data() {
    let app = build_app(vec![]).await;
    let (_, envelope) = post_rpc(
        &app,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "message/send",
            "params": send_params("Hi", Some("ctx-unknown"), None),
        }),
    )
    .await;
    assert_eq!(envelope["error"]["code"], -32600);
    assert_eq!(envelope["error"]["data"]["contextId"], "ctx-unknown");
    assert!(envelope["error"]["data"]["hint"].is_string());
}

// ── message/send ──────────────────────────────────────────────────────────

#[tokio::test]
async fn message_send_returns_completed_task_with_artifacts() {
    let app = build_app(vec![vec![
        Ok(StreamEvent::text_delta("Hello")),
        Ok(StreamEvent::text_delta(" world")),
        Ok(StreamEvent::TextEnd),
    ]])
    .await;

    let (status, envelope) = post_rpc(
        &app,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "message/send",
            "params": send_params("Say hello", None, Some("t-rpc")),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let task = &envelope["result"];
    assert_eq!(task["kind"], "task");
    assert_eq!(task["id"], "t-rpc");
    assert_eq!(task["status"]["state"], "completed");
    // The server generated and echoed a context id.
    assert!(task["contextId"].as_str().unwrap().starts_with("ctx-"));

    let artifacts = task["artifacts"].as_array().unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0]["artifactId"], "text-response-t-rpc");
    let texts: Vec<&str> = artifacts[0]["parts"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect();
    assert_eq!(texts.concat(), "Hello world");
}

// ── tasks/get ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn tasks_get_returns_settled_task_and_rejects_unknown_ids() {
    let app = build_app(vec![vec![Ok(StreamEvent::text_delta("done")), Ok(StreamEvent::TextEnd)]])
        .await;

    let (_, envelope) = post_rpc(
        &app,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tasks/get",
            "params": {"id": "t-nope"},
        }),
    )
    .await;
    assert_eq!(envelope["error"]["code"], -32602);

    post_rpc(
        &app,
        json!({
            "jsonrpc": "2.0",
            "id": 2,
            "method": "message/send",
            "params": send_params("go", None, Some("t-fetch")),
        }),
    )
    .await;

    let (_, envelope) = post_rpc(
        &app,
        json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tasks/get",
            "params": {"id": "t-fetch"},
        }),
    )
    .await;
    assert_eq!(envelope["result"]["id"], "t-fetch");
    assert_eq!(envelope["result"]["status"]["state"], "completed");
}

// ── health ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_ok() {
    let app = build_app(vec![]).await;
    let response = app
        .clone()
        .router()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
}
