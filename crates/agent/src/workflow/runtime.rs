//! The workflow runtime: plugin registry, dispatch, the pump loop that
//! drives workflow bodies, pause/resume with schema validation, and
//! shutdown.
//!
//! Every execution gets a yield channel (body -> runtime) and a resume
//! channel (runtime -> body). The pump loop receives yielded states,
//! performs state-machine bookkeeping, and re-broadcasts them as
//! execution events with a replay log, so a subscriber attaching after
//! dispatch still observes everything in order.

use crate::a2a::{Artifact, TaskState};
use crate::error::{AgentError, AgentResult};
use crate::state::ensure_transition;
use crate::workflow::plugin::{WorkflowContext, WorkflowPlugin, WorkflowState, dispatch_tool_name};
use crate::workflow::validation::{InputValidator, SchemaValidator, ValidationIssue};
use agentry::Tool;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// How long a dispatcher waits for the first yield by default.
pub const DEFAULT_DISPATCH_RESPONSE_TIMEOUT: Duration = Duration::from_millis(500);

const FIRST_YIELD_POLL_INTERVAL: Duration = Duration::from_millis(10);
const YIELD_CHANNEL_BUFFER: usize = 64;
const RESUME_CHANNEL_BUFFER: usize = 8;
const EXECUTION_EVENT_BUFFER: usize = 256;

/// Where a paused task stands and what it needs to resume.
#[derive(Debug, Clone)]
pub struct PauseInfo {
    pub state: TaskState,
    pub message: Option<String>,
    pub input_schema: Option<Value>,
}

/// Events emitted by a running execution.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// Progress note; no state change
    Update { message: Option<String> },
    /// An artifact chunk or blob
    Artifact {
        artifact: Artifact,
        append: bool,
        last_chunk: bool,
        metadata: Option<Map<String, Value>>,
    },
    /// The execution paused awaiting input
    Pause {
        pause: PauseInfo,
        validation_errors: Option<Vec<ValidationIssue>>,
    },
    /// The body returned its final result
    Done { result: Value },
    /// The body failed
    Error { message: String },
    /// The body rejected the task
    Reject { reason: String },
}

/// Result of a resume attempt.
#[derive(Debug, Clone)]
pub enum ResumeOutcome {
    /// The generator was resumed with the validated input
    Resumed { metadata: Map<String, Value> },
    /// Input failed pause-time validation; the task remains paused and a
    /// new pause event (with the errors attached) follows on the next tick
    Invalid { errors: Vec<ValidationIssue> },
}

/// Broadcast channel with a replay log: subscribers receive everything
/// emitted before they attached, then the live stream, with no gap and no
/// duplication.
#[derive(Debug)]
struct ExecutionEvents {
    inner: Mutex<(Vec<ExecutionEvent>, broadcast::Sender<ExecutionEvent>)>,
}

impl ExecutionEvents {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(EXECUTION_EVENT_BUFFER);
        Self {
            inner: Mutex::new((Vec::new(), sender)),
        }
    }

    fn emit(&self, event: ExecutionEvent) {
        let mut guard = self.inner.lock();
        guard.0.push(event.clone());
        let _ = guard.1.send(event);
    }

    fn subscribe(&self) -> (Vec<ExecutionEvent>, broadcast::Receiver<ExecutionEvent>) {
        let guard = self.inner.lock();
        (guard.0.clone(), guard.1.subscribe())
    }
}

/// Handle to one dispatched workflow execution.
#[derive(Debug)]
pub struct WorkflowExecution {
    pub task_id: String,
    pub context_id: String,
    pub plugin_id: String,
    events: ExecutionEvents,
    metadata: Mutex<Map<String, Value>>,
}

impl WorkflowExecution {
    fn new(task_id: String, context_id: String, plugin_id: String) -> Self {
        Self {
            task_id,
            context_id,
            plugin_id,
            events: ExecutionEvents::new(),
            metadata: Mutex::new(Map::new()),
        }
    }

    /// Backlog of already-emitted events plus a live receiver.
    pub fn subscribe(&self) -> (Vec<ExecutionEvent>, broadcast::Receiver<ExecutionEvent>) {
        self.events.subscribe()
    }

    /// Live receiver only, skipping the backlog. For resubscribing after
    /// a pause was already forwarded.
    pub fn subscribe_live(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.events.subscribe().1
    }

    pub fn metadata(&self) -> Map<String, Value> {
        self.metadata.lock().clone()
    }

    fn emit(&self, event: ExecutionEvent) {
        self.events.emit(event);
    }

    fn attach_metadata(&self, entries: Map<String, Value>) {
        let mut metadata = self.metadata.lock();
        for (key, value) in entries {
            metadata.insert(key, value);
        }
    }
}

struct PauseRecord {
    info: PauseInfo,
    validator: Option<Arc<SchemaValidator>>,
}

struct TaskRecord {
    state: TaskState,
    pause: Option<PauseRecord>,
    first_yield: Option<WorkflowState>,
    is_final: bool,
    error: Option<String>,
    validation_errors: Option<Vec<ValidationIssue>>,
    result: Option<Value>,
    resume_tx: mpsc::Sender<Value>,
    body_abort: Option<tokio::task::AbortHandle>,
}

#[derive(Default)]
struct ResumeTracking {
    count: usize,
    primary_order: usize,
}

/// Everything a dispatch needs besides the plugin id.
#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    pub context_id: String,
    pub task_id: Option<String>,
    pub parameters: Value,
    pub metadata: Map<String, Value>,
}

/// Process-wide workflow runtime.
pub struct WorkflowRuntime {
    plugins: RwLock<IndexMap<String, Arc<dyn WorkflowPlugin>>>,
    executions: RwLock<HashMap<String, Arc<WorkflowExecution>>>,
    tasks: Arc<RwLock<HashMap<String, TaskRecord>>>,
    resume_tracking: Arc<Mutex<HashMap<String, ResumeTracking>>>,
    shutting_down: Arc<AtomicBool>,
}

impl Default for WorkflowRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkflowRuntime {
    pub fn new() -> Self {
        Self {
            plugins: RwLock::new(IndexMap::new()),
            executions: RwLock::new(HashMap::new()),
            tasks: Arc::new(RwLock::new(HashMap::new())),
            resume_tracking: Arc::new(Mutex::new(HashMap::new())),
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    // ── Registration ───────────────────────────────────────────────────────

    /// Register a plugin under its canonical id.
    ///
    /// Rejects malformed ids, empty name/version, and duplicate canonical
    /// ids (`my-flow` and `my_flow` collide by design).
    pub fn register(&self, plugin: Arc<dyn WorkflowPlugin>) -> AgentResult<String> {
        let canonical = crate::workflow::plugin::canonical_plugin_id(plugin.id())?;
        if plugin.name().trim().is_empty() {
            return Err(AgentError::InvalidPluginId {
                id: plugin.id().to_string(),
                reason: "plugin name is required".to_string(),
            });
        }
        if plugin.version().trim().is_empty() {
            return Err(AgentError::InvalidPluginId {
                id: plugin.id().to_string(),
                reason: "plugin version is required".to_string(),
            });
        }
        let mut plugins = self.plugins.write();
        if plugins.contains_key(&canonical) {
            return Err(AgentError::DuplicatePlugin {
                canonical_id: canonical,
            });
        }
        log::info!(
            "workflow registered: {} v{} ({})",
            canonical,
            plugin.version(),
            plugin.name()
        );
        plugins.insert(canonical.clone(), plugin);
        Ok(canonical)
    }

    /// Exact lookup by canonical id. `get_plugin("my-flow")` misses even
    /// when `my-flow` was registered: registration canonicalized it.
    pub fn get_plugin(&self, canonical_id: &str) -> Option<Arc<dyn WorkflowPlugin>> {
        self.plugins.read().get(canonical_id).cloned()
    }

    pub fn plugin_ids(&self) -> Vec<String> {
        self.plugins.read().keys().cloned().collect()
    }

    /// One `dispatch_workflow_*` tool per registered plugin, in
    /// registration order.
    pub fn dispatch_tools(&self) -> Vec<Tool> {
        self.plugins
            .read()
            .iter()
            .map(|(canonical, plugin)| {
                let parameters = plugin
                    .input_validator()
                    .and_then(|validator| validator.schema())
                    .unwrap_or_else(|| json!({"type": "object", "additionalProperties": true}));
                Tool::function(
                    dispatch_tool_name(canonical),
                    plugin.description().to_string(),
                    parameters,
                )
            })
            .collect()
    }

    // ── Dispatch ───────────────────────────────────────────────────────────

    /// Dispatch a workflow and return its execution handle immediately.
    ///
    /// Invalid parameters synthesize a terminal `failed` execution without
    /// ever starting the body.
    pub fn dispatch(
        &self,
        plugin_id: &str,
        ctx: DispatchContext,
    ) -> AgentResult<Arc<WorkflowExecution>> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(AgentError::ShuttingDown);
        }
        let plugin = self
            .get_plugin(plugin_id)
            .ok_or_else(|| AgentError::PluginNotFound {
                plugin_id: plugin_id.to_string(),
            })?;

        let task_id = ctx
            .task_id
            .unwrap_or_else(|| format!("task-{}", Uuid::now_v7()));
        let execution = Arc::new(WorkflowExecution::new(
            task_id.clone(),
            ctx.context_id.clone(),
            plugin_id.to_string(),
        ));
        let (resume_tx, resume_rx) = mpsc::channel(RESUME_CHANNEL_BUFFER);

        if let Some(validator) = plugin.input_validator() {
            if let Err(issues) = validator.validate(&ctx.parameters) {
                let message = issues
                    .iter()
                    .map(|issue| issue.to_string())
                    .collect::<Vec<_>>()
                    .join("; ");
                log::warn!("workflow {plugin_id} dispatch rejected: {message}");
                self.tasks.write().insert(
                    task_id.clone(),
                    TaskRecord {
                        state: TaskState::Failed,
                        pause: None,
                        first_yield: None,
                        is_final: true,
                        error: Some(message.clone()),
                        validation_errors: Some(issues),
                        result: None,
                        resume_tx,
                        body_abort: None,
                    },
                );
                self.executions
                    .write()
                    .insert(task_id.clone(), execution.clone());
                execution.emit(ExecutionEvent::Error { message });
                return Ok(execution);
            }
        }

        let (yield_tx, yield_rx) = mpsc::channel(YIELD_CHANNEL_BUFFER);
        let workflow_ctx = WorkflowContext::new(
            ctx.context_id,
            task_id.clone(),
            ctx.parameters,
            ctx.metadata,
            yield_tx,
            resume_rx,
        );

        let body: JoinHandle<anyhow::Result<Value>> = {
            let plugin = plugin.clone();
            tokio::spawn(async move { plugin.run(workflow_ctx).await })
        };

        self.tasks.write().insert(
            task_id.clone(),
            TaskRecord {
                state: TaskState::Working,
                pause: None,
                first_yield: None,
                is_final: false,
                error: None,
                validation_errors: None,
                result: None,
                resume_tx,
                body_abort: Some(body.abort_handle()),
            },
        );
        self.executions
            .write()
            .insert(task_id.clone(), execution.clone());

        tokio::spawn(pump(
            self.tasks.clone(),
            self.resume_tracking.clone(),
            self.shutting_down.clone(),
            execution.clone(),
            yield_rx,
            body,
        ));

        log::debug!("workflow {plugin_id} dispatched as {task_id}");
        Ok(execution)
    }

    // ── First yield ────────────────────────────────────────────────────────

    /// Wait for the execution's first yield.
    ///
    /// Returns it only when it is a `dispatch-response`; `None` on
    /// timeout, on an already-terminal task, or on any other first-yield
    /// tag.
    pub async fn wait_for_first_yield(
        &self,
        task_id: &str,
        timeout: Duration,
    ) -> Option<WorkflowState> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let tasks = self.tasks.read();
                let record = tasks.get(task_id)?;
                if let Some(first) = &record.first_yield {
                    return match first {
                        WorkflowState::DispatchResponse { .. } => Some(first.clone()),
                        _ => None,
                    };
                }
                if record.is_final {
                    return None;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return None;
            }
            tokio::time::sleep(FIRST_YIELD_POLL_INTERVAL).await;
        }
    }

    // ── Resume ─────────────────────────────────────────────────────────────

    /// Resume a paused execution with a client-supplied input value.
    ///
    /// Invalid input leaves the task paused, returns the issues, and
    /// re-emits the pause (with the errors attached) on the next tick.
    /// Failures after a successful resume surface through the execution's
    /// `Error` event, never through this return value.
    pub fn resume_workflow(&self, task_id: &str, input: Value) -> AgentResult<ResumeOutcome> {
        let execution = self.executions.read().get(task_id).cloned();
        let mut tasks = self.tasks.write();
        let record = tasks
            .get_mut(task_id)
            .ok_or_else(|| AgentError::TaskNotFound {
                task_id: task_id.to_string(),
            })?;
        if !record.state.is_paused() {
            return Err(AgentError::TaskNotPaused {
                task_id: task_id.to_string(),
                state: record.state,
            });
        }

        let (request_order, primary_order) = {
            let mut tracking = self.resume_tracking.lock();
            let entry = tracking.entry(task_id.to_string()).or_default();
            entry.count += 1;
            if entry.primary_order == 0 {
                entry.primary_order = entry.count;
            }
            (entry.count, entry.primary_order)
        };
        let mut metadata = Map::new();
        metadata.insert("concurrentRequest".to_string(), json!(request_order > 1));
        metadata.insert("requestOrder".to_string(), json!(request_order));
        metadata.insert(
            "primaryResume".to_string(),
            json!(request_order == primary_order),
        );
        if let Some(execution) = &execution {
            execution.attach_metadata(metadata.clone());
        }

        let (validator, pause_info) = {
            let pause = record.pause.as_ref().ok_or_else(|| {
                AgentError::Internal(format!("paused task {task_id} has no pause record"))
            })?;
            (pause.validator.clone(), pause.info.clone())
        };

        if let Some(validator) = validator {
            if let Err(issues) = validator.validate(&input) {
                record.validation_errors = Some(issues.clone());
                if let Some(execution) = execution {
                    let errors = issues.clone();
                    tokio::spawn(async move {
                        tokio::task::yield_now().await;
                        execution.emit(ExecutionEvent::Pause {
                            pause: pause_info,
                            validation_errors: Some(errors),
                        });
                    });
                }
                log::debug!("resume of {task_id} failed validation ({} issues)", issues.len());
                return Ok(ResumeOutcome::Invalid { errors: issues });
            }
        }

        ensure_transition(task_id, record.state, TaskState::Working)?;
        record.state = TaskState::Working;
        record.pause = None;
        record.validation_errors = None;
        record
            .resume_tx
            .try_send(input)
            .map_err(|_| AgentError::Internal(format!("resume channel for {task_id} unavailable")))?;
        self.resume_tracking.lock().remove(task_id);
        log::debug!("workflow task {task_id} resumed");
        Ok(ResumeOutcome::Resumed { metadata })
    }

    // ── Cancel / shutdown ──────────────────────────────────────────────────

    /// Cancel a running execution. Only permitted from `working`.
    pub fn cancel_workflow(&self, task_id: &str) -> AgentResult<()> {
        let mut tasks = self.tasks.write();
        let record = tasks
            .get_mut(task_id)
            .ok_or_else(|| AgentError::TaskNotFound {
                task_id: task_id.to_string(),
            })?;
        if record.state != TaskState::Working {
            return Err(AgentError::InvalidTransition {
                task_id: task_id.to_string(),
                from: record.state,
                to: TaskState::Canceled,
            });
        }
        ensure_transition(task_id, record.state, TaskState::Canceled)?;
        record.state = TaskState::Canceled;
        record.is_final = true;
        if let Some(abort) = &record.body_abort {
            abort.abort();
        }
        self.resume_tracking.lock().remove(task_id);
        log::info!("workflow task {task_id} canceled");
        Ok(())
    }

    /// Cancel every non-terminal execution and clear all tables.
    /// Subsequent dispatches fail with `ShuttingDown`.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let mut tasks = self.tasks.write();
        for (task_id, record) in tasks.iter_mut() {
            if !record.is_final {
                log::info!("shutdown: canceling workflow task {task_id}");
                record.state = TaskState::Canceled;
                record.is_final = true;
                if let Some(abort) = &record.body_abort {
                    abort.abort();
                }
            }
        }
        tasks.clear();
        drop(tasks);
        self.executions.write().clear();
        self.resume_tracking.lock().clear();
        self.plugins.write().clear();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    // ── Introspection ──────────────────────────────────────────────────────

    pub fn get_execution(&self, task_id: &str) -> Option<Arc<WorkflowExecution>> {
        self.executions.read().get(task_id).cloned()
    }

    pub fn task_state(&self, task_id: &str) -> Option<TaskState> {
        self.tasks.read().get(task_id).map(|record| record.state)
    }

    pub fn is_paused(&self, task_id: &str) -> bool {
        self.task_state(task_id)
            .is_some_and(|state| state.is_paused())
    }

    pub fn pause_info(&self, task_id: &str) -> Option<PauseInfo> {
        self.tasks
            .read()
            .get(task_id)
            .and_then(|record| record.pause.as_ref().map(|pause| pause.info.clone()))
    }

    /// Error recorded on a failed or rejected execution.
    pub fn get_error(&self, task_id: &str) -> Option<String> {
        self.tasks
            .read()
            .get(task_id)
            .and_then(|record| record.error.clone())
    }

    /// Final result of a completed execution.
    pub fn get_result(&self, task_id: &str) -> Option<Value> {
        self.tasks
            .read()
            .get(task_id)
            .and_then(|record| record.result.clone())
    }
}

/// Drive one execution: receive yielded states, keep the task record
/// honest, broadcast execution events, then settle the body's outcome.
async fn pump(
    tasks: Arc<RwLock<HashMap<String, TaskRecord>>>,
    tracking: Arc<Mutex<HashMap<String, ResumeTracking>>>,
    shutting_down: Arc<AtomicBool>,
    execution: Arc<WorkflowExecution>,
    mut yields: mpsc::Receiver<WorkflowState>,
    body: JoinHandle<anyhow::Result<Value>>,
) {
    let task_id = execution.task_id.clone();
    let mut first = true;
    let mut rejected = false;

    while let Some(state) = yields.recv().await {
        if first {
            first = false;
            if let Some(record) = tasks.write().get_mut(&task_id) {
                record.first_yield = Some(state.clone());
            }
        }
        match state {
            WorkflowState::DispatchResponse { .. } => {
                // Retrievable via wait_for_first_yield only; never re-emitted.
            }
            WorkflowState::StatusUpdate { message } => {
                execution.emit(ExecutionEvent::Update { message });
            }
            WorkflowState::Artifact {
                artifact,
                append,
                last_chunk,
                metadata,
            } => {
                execution.emit(ExecutionEvent::Artifact {
                    artifact,
                    append: append.unwrap_or(false),
                    last_chunk: last_chunk.unwrap_or(false),
                    metadata,
                });
            }
            WorkflowState::Interrupted {
                reason,
                message,
                input_schema,
                artifact,
            } => {
                let paused_state = reason.task_state();
                let transition = {
                    let mut guard = tasks.write();
                    let Some(record) = guard.get_mut(&task_id) else {
                        break;
                    };
                    match ensure_transition(&task_id, record.state, paused_state) {
                        Ok(()) => {
                            let validator = input_schema.as_ref().and_then(|schema| {
                                match SchemaValidator::new(schema.clone()) {
                                    Ok(validator) => Some(Arc::new(validator)),
                                    Err(error) => {
                                        log::warn!(
                                            "task {task_id}: pause schema does not compile, skipping validation: {error}"
                                        );
                                        None
                                    }
                                }
                            });
                            record.state = paused_state;
                            record.pause = Some(PauseRecord {
                                info: PauseInfo {
                                    state: paused_state,
                                    message: message.clone(),
                                    input_schema: input_schema.clone(),
                                },
                                validator,
                            });
                            Ok(PauseInfo {
                                state: paused_state,
                                message,
                                input_schema,
                            })
                        }
                        Err(error) => Err(error),
                    }
                };
                match transition {
                    Ok(pause) => {
                        if let Some(artifact) = artifact {
                            execution.emit(ExecutionEvent::Artifact {
                                artifact,
                                append: false,
                                last_chunk: false,
                                metadata: None,
                            });
                        }
                        // Let subscribers register before the pause lands.
                        tokio::task::yield_now().await;
                        execution.emit(ExecutionEvent::Pause {
                            pause,
                            validation_errors: None,
                        });
                        // recv() now parks until the body is resumed.
                    }
                    Err(error) => {
                        log::error!("task {task_id}: {error}");
                        fail_record(&tasks, &task_id, error.to_string());
                        execution.emit(ExecutionEvent::Error {
                            message: error.to_string(),
                        });
                        body.abort();
                        rejected = true;
                        break;
                    }
                }
            }
            WorkflowState::Reject { reason } => {
                // The generator declares its own terminal rejection; this
                // bypasses the transition table (which only admits
                // rejection of freshly submitted tasks) by design — see
                // DESIGN.md.
                if let Some(record) = tasks.write().get_mut(&task_id) {
                    record.state = TaskState::Rejected;
                    record.is_final = true;
                    record.error = Some(reason.clone());
                }
                execution.emit(ExecutionEvent::Reject { reason });
                body.abort();
                rejected = true;
                break;
            }
        }
    }

    tracking.lock().remove(&task_id);
    if rejected {
        return;
    }

    match body.await {
        Ok(Ok(result)) => {
            let final_state = if shutting_down.load(Ordering::SeqCst) {
                TaskState::Canceled
            } else {
                TaskState::Completed
            };
            let settled = {
                let mut guard = tasks.write();
                match guard.get_mut(&task_id) {
                    Some(record) if !record.is_final => {
                        match ensure_transition(&task_id, record.state, final_state) {
                            Ok(()) => {
                                record.state = final_state;
                                record.is_final = true;
                                record.result = Some(result.clone());
                                Ok(())
                            }
                            Err(error) => {
                                record.state = TaskState::Failed;
                                record.is_final = true;
                                record.error = Some(error.to_string());
                                Err(error)
                            }
                        }
                    }
                    _ => return,
                }
            };
            match settled {
                Ok(()) if final_state == TaskState::Completed => {
                    execution.emit(ExecutionEvent::Done { result });
                }
                Ok(()) => {}
                Err(error) => {
                    log::error!("task {task_id}: {error}");
                    execution.emit(ExecutionEvent::Error {
                        message: error.to_string(),
                    });
                }
            }
        }
        Ok(Err(error)) => {
            let message = error.to_string();
            log::warn!("workflow task {task_id} failed: {message}");
            if fail_record(&tasks, &task_id, message.clone()) {
                execution.emit(ExecutionEvent::Error { message });
            }
        }
        Err(join_error) => {
            if join_error.is_cancelled() {
                // cancel/shutdown already recorded the terminal state
                return;
            }
            let message = format!("workflow task panicked: {join_error}");
            log::error!("{message}");
            if fail_record(&tasks, &task_id, message.clone()) {
                execution.emit(ExecutionEvent::Error { message });
            }
        }
    }
}

/// Mark a record failed unless it already settled. Returns whether the
/// record was updated.
fn fail_record(
    tasks: &Arc<RwLock<HashMap<String, TaskRecord>>>,
    task_id: &str,
    message: String,
) -> bool {
    let mut guard = tasks.write();
    match guard.get_mut(task_id) {
        Some(record) if !record.is_final => {
            record.state = TaskState::Failed;
            record.is_final = true;
            record.error = Some(message);
            true
        }
        _ => false,
    }
}
