//! A2A transport shell: JSON-RPC 2.0 over HTTP POST with SSE streaming.
//!
//! One POST endpoint carries `message/send`, `message/stream`,
//! `tasks/get` and `tasks/resubscribe`; the agent card is served on the
//! well-known discovery paths. Streaming responses frame each A2A event
//! as a JSON-RPC envelope in an SSE `data:` line, with the terminal
//! event flagged `final: true`.

use crate::a2a::{AgentCard, Message, TaskEvent, rpc};
use crate::context::ContextManager;
use crate::error::AgentError;
use crate::event_bus::{BusSignal, EventBusRegistry, TaskEventBus};
use crate::handlers::{AgentExecutor, RequestContext, Routed};
use crate::workflow::WorkflowRuntime;
use axum::Router;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use futures::Stream;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

/// Shared state behind the A2A endpoint.
pub struct AgentApp {
    pub executor: Arc<AgentExecutor>,
    pub contexts: Arc<ContextManager>,
    pub runtime: Arc<WorkflowRuntime>,
    pub buses: Arc<EventBusRegistry>,
    pub card: AgentCard,
}

impl AgentApp {
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/", post(handle_rpc))
            .route("/.well-known/agent.json", get(agent_card))
            .route("/.well-known/agent-card.json", get(agent_card))
            .route("/health", get(health))
            .layer(CorsLayer::permissive())
            .with_state(self)
    }

    /// Bind and serve until the process exits.
    pub async fn run(self: Arc<Self>, addr: &str) -> anyhow::Result<()> {
        let router = self.clone().router();
        let listener = tokio::net::TcpListener::bind(addr).await?;
        log::info!("A2A endpoint listening on http://{addr}");
        axum::serve(listener, router).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct MessageSendParams {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct TaskIdParams {
    id: String,
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}

async fn agent_card(State(app): State<Arc<AgentApp>>) -> Json<AgentCard> {
    Json(app.card.clone())
}

async fn handle_rpc(State(app): State<Arc<AgentApp>>, body: String) -> Response {
    let request: rpc::Request = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(error) => {
            return rpc_error(
                None,
                rpc::ErrorObject {
                    code: rpc::PARSE_ERROR,
                    message: format!("parse error: {error}"),
                    data: None,
                },
            );
        }
    };
    let id = request.id.clone();

    match request.method.as_str() {
        "message/send" => message_send(app, id, request.params).await,
        "message/stream" => message_stream(app, id, request.params),
        "tasks/get" => tasks_get(app, id, request.params),
        "tasks/resubscribe" => tasks_resubscribe(app, id, request.params),
        other => rpc_error(
            id,
            rpc::ErrorObject {
                code: rpc::METHOD_NOT_FOUND,
                message: format!("unknown method: {other}"),
                data: None,
            },
        ),
    }
}

fn rpc_error(id: Option<Value>, error: rpc::ErrorObject) -> Response {
    Json(rpc::Response::failure(id, error)).into_response()
}

fn parse_params<T: serde::de::DeserializeOwned>(
    id: &Option<Value>,
    params: Value,
) -> Result<T, Response> {
    serde_json::from_value(params).map_err(|error| {
        rpc_error(
            id.clone(),
            rpc::ErrorObject {
                code: rpc::INVALID_PARAMS,
                message: format!("invalid params: {error}"),
                data: None,
            },
        )
    })
}

/// Request-shape checks shared by send and stream: a task id must name a
/// paused task, and a supplied context id must name a live context.
fn prevalidate(app: &AgentApp, message: &Message) -> Option<AgentError> {
    if let Some(task_id) = &message.task_id {
        if app.runtime.is_paused(task_id) {
            return None;
        }
        if let Some(state) = app.runtime.task_state(task_id) {
            return Some(AgentError::TaskNotPaused {
                task_id: task_id.clone(),
                state,
            });
        }
    }
    if let Some(context_id) = &message.context_id {
        if app.contexts.get_context(context_id).is_none() {
            return Some(AgentError::ContextNotFound {
                context_id: context_id.clone(),
                hint: "omit contextId to create a new context".to_string(),
            });
        }
    }
    None
}

/// Build the executor request, assigning a server-generated task id when
/// the client did not provide one.
fn request_from(message: Message) -> (RequestContext, String) {
    let context_id = message.context_id.clone();
    let task_id = message
        .task_id
        .clone()
        .unwrap_or_else(|| format!("task-{}", Uuid::now_v7()));
    (
        RequestContext {
            message,
            context_id,
            task_id: Some(task_id.clone()),
        },
        task_id,
    )
}

/// Mirror a request bus into the per-task registry buses so `tasks/get`
/// and `tasks/resubscribe` see every task this request touched.
async fn mirror_events(mut rx: broadcast::Receiver<BusSignal>, buses: Arc<EventBusRegistry>) {
    loop {
        match rx.recv().await {
            Ok(BusSignal::Event(event)) => {
                let bus = buses.get_or_create(event.task_id());
                let is_final = event.is_final();
                bus.publish(event);
                if is_final {
                    bus.finished();
                }
            }
            Ok(BusSignal::Finished) => break,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                log::warn!("registry mirror lagged by {missed} events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn message_send(app: Arc<AgentApp>, id: Option<Value>, params: Value) -> Response {
    let params: MessageSendParams = match parse_params(&id, params) {
        Ok(params) => params,
        Err(response) => return response,
    };
    if let Some(error) = prevalidate(&app, &params.message) {
        return rpc_error(id, error.into());
    }

    let (request, task_id) = request_from(params.message);
    let bus = Arc::new(TaskEventBus::new(&task_id));
    let mirror = tokio::spawn(mirror_events(bus.subscribe(), app.buses.clone()));

    let routed = app.executor.execute(request, bus.clone()).await;
    bus.finished();
    let _ = mirror.await;

    match routed {
        Ok(routed) => {
            let settled_task = match routed {
                Routed::AiTurn { task_id, .. } => task_id,
                Routed::WorkflowResume { task_id } => task_id,
            };
            match app.buses.get(&settled_task).and_then(|bus| bus.snapshot()) {
                Some(task) => Json(rpc::Response::success(
                    id,
                    serde_json::to_value(task).unwrap_or(Value::Null),
                ))
                .into_response(),
                None => rpc_error(
                    id,
                    rpc::ErrorObject {
                        code: rpc::INTERNAL_ERROR,
                        message: format!("no events recorded for task {settled_task}"),
                        data: None,
                    },
                ),
            }
        }
        Err(error) => rpc_error(id, error.into()),
    }
}

fn message_stream(app: Arc<AgentApp>, id: Option<Value>, params: Value) -> Response {
    let params: MessageSendParams = match parse_params(&id, params) {
        Ok(params) => params,
        Err(response) => return response,
    };
    if let Some(error) = prevalidate(&app, &params.message) {
        return rpc_error(id, error.into());
    }

    let (request, task_id) = request_from(params.message);
    let bus = Arc::new(TaskEventBus::new(&task_id));
    let rx = bus.subscribe();
    tokio::spawn(mirror_events(bus.subscribe(), app.buses.clone()));

    let executor = app.executor.clone();
    let exec_bus = bus.clone();
    tokio::spawn(async move {
        if let Err(error) = executor.execute(request, exec_bus.clone()).await {
            log::warn!("stream request failed after validation: {error}");
        }
        exec_bus.finished();
    });

    sse_response(id, Vec::new(), rx, false).into_response()
}

fn tasks_get(app: Arc<AgentApp>, id: Option<Value>, params: Value) -> Response {
    let params: TaskIdParams = match parse_params(&id, params) {
        Ok(params) => params,
        Err(response) => return response,
    };
    match app.buses.get(&params.id).and_then(|bus| bus.snapshot()) {
        Some(task) => Json(rpc::Response::success(
            id,
            serde_json::to_value(task).unwrap_or(Value::Null),
        ))
        .into_response(),
        None => rpc_error(
            id,
            AgentError::TaskNotFound {
                task_id: params.id,
            }
            .into(),
        ),
    }
}

fn tasks_resubscribe(app: Arc<AgentApp>, id: Option<Value>, params: Value) -> Response {
    let params: TaskIdParams = match parse_params(&id, params) {
        Ok(params) => params,
        Err(response) => return response,
    };
    let Some(bus) = app.buses.get(&params.id) else {
        return rpc_error(
            id,
            AgentError::TaskNotFound {
                task_id: params.id,
            }
            .into(),
        );
    };
    let (replay, rx) = bus.replay_and_subscribe();
    let already_finished = bus.is_finished();
    sse_response(id, replay, rx, already_finished).into_response()
}

/// Frame bus events as JSON-RPC envelopes in SSE `data:` lines: the
/// backlog first, then the live stream until `Finished`.
fn sse_response(
    request_id: Option<Value>,
    backlog: Vec<TaskEvent>,
    rx: broadcast::Receiver<BusSignal>,
    already_finished: bool,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let state = (
        VecDeque::from(backlog),
        rx,
        already_finished,
        request_id,
    );
    let stream = futures::stream::unfold(
        state,
        |(mut backlog, mut rx, already_finished, request_id)| async move {
            if let Some(event) = backlog.pop_front() {
                let item = envelope_event(&request_id, &event);
                return Some((item, (backlog, rx, already_finished, request_id)));
            }
            if already_finished {
                return None;
            }
            loop {
                match rx.recv().await {
                    Ok(BusSignal::Event(event)) => {
                        let item = envelope_event(&request_id, &event);
                        return Some((item, (backlog, rx, already_finished, request_id)));
                    }
                    Ok(BusSignal::Finished) => return None,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        log::warn!("SSE subscriber lagged by {missed} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        },
    );
    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn envelope_event(request_id: &Option<Value>, event: &TaskEvent) -> Result<Event, Infallible> {
    let envelope = rpc::Response::success(
        request_id.clone(),
        serde_json::to_value(event).unwrap_or(Value::Null),
    );
    let data = serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_string());
    Ok(Event::default().data(data))
}
