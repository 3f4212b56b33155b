//! Per-task event bus.
//!
//! Each task gets its own bus: the execution side publishes A2A task
//! events, the transport side subscribes and frames them as SSE. The bus
//! also retains everything it has published so `tasks/get` can rebuild a
//! task snapshot and `tasks/resubscribe` can replay before continuing.
//! Log append and broadcast happen under one lock, so a replay-plus-
//! subscribe observes every event exactly once.

use crate::a2a::{Artifact, Task, TaskEvent, TaskState, TaskStatus};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;

const EVENT_BUS_BUFFER: usize = 1024;

/// One item observed by bus subscribers.
#[derive(Debug, Clone)]
pub enum BusSignal {
    /// A published A2A event
    Event(TaskEvent),
    /// The producing side is done; no further events will arrive
    Finished,
}

/// Publish/finish surface for a single task.
pub struct TaskEventBus {
    task_id: String,
    inner: Mutex<(Vec<TaskEvent>, broadcast::Sender<BusSignal>)>,
    finished: AtomicBool,
}

impl TaskEventBus {
    pub fn new(task_id: impl Into<String>) -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUS_BUFFER);
        Self {
            task_id: task_id.into(),
            inner: Mutex::new((Vec::new(), sender)),
            finished: AtomicBool::new(false),
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Subscribe to the live event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<BusSignal> {
        self.inner.lock().1.subscribe()
    }

    /// Everything published so far plus a live receiver, with no gap and
    /// no duplication between the two.
    pub fn replay_and_subscribe(&self) -> (Vec<TaskEvent>, broadcast::Receiver<BusSignal>) {
        let guard = self.inner.lock();
        (guard.0.clone(), guard.1.subscribe())
    }

    /// Publish one event to all subscribers and the replay log.
    pub fn publish(&self, event: TaskEvent) {
        log::debug!(
            "bus[{}]: publish {}",
            self.task_id,
            event_kind_for_log(&event)
        );
        let mut guard = self.inner.lock();
        guard.0.push(event.clone());
        let _ = guard.1.send(BusSignal::Event(event));
    }

    /// Signal that no further events will be published.
    ///
    /// Idempotent: subscribers observe `Finished` at most once no matter
    /// how many times this is called.
    pub fn finished(&self) {
        if !self.finished.swap(true, Ordering::SeqCst) {
            log::debug!("bus[{}]: finished", self.task_id);
            let guard = self.inner.lock();
            let _ = guard.1.send(BusSignal::Finished);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Everything published so far, in order.
    pub fn events(&self) -> Vec<TaskEvent> {
        self.inner.lock().0.clone()
    }

    /// Rebuild a task record from the replay log: the latest status plus
    /// artifacts assembled from their chunks in arrival order.
    pub fn snapshot(&self) -> Option<Task> {
        let events = self.events();
        let mut context_id: Option<String> = None;
        let mut status: Option<TaskStatus> = None;
        let mut artifacts: Vec<Artifact> = Vec::new();

        for event in &events {
            match event {
                TaskEvent::Task {
                    context_id: ctx,
                    status: s,
                    artifacts: initial,
                    ..
                } => {
                    context_id = Some(ctx.clone());
                    status = Some(s.clone());
                    artifacts = initial.clone();
                }
                TaskEvent::StatusUpdate {
                    context_id: ctx,
                    status: s,
                    ..
                } => {
                    context_id.get_or_insert_with(|| ctx.clone());
                    status = Some(s.clone());
                }
                TaskEvent::ArtifactUpdate {
                    context_id: ctx,
                    artifact,
                    append,
                    ..
                } => {
                    context_id.get_or_insert_with(|| ctx.clone());
                    match artifacts
                        .iter_mut()
                        .find(|a| a.artifact_id == artifact.artifact_id)
                    {
                        Some(existing) if *append => {
                            existing.parts.extend(artifact.parts.iter().cloned());
                        }
                        Some(existing) => *existing = artifact.clone(),
                        None => artifacts.push(artifact.clone()),
                    }
                }
            }
        }

        Some(Task {
            id: self.task_id.clone(),
            context_id: context_id?,
            status: status.unwrap_or_else(|| TaskStatus::new(TaskState::Submitted)),
            artifacts,
            kind: "task".to_string(),
        })
    }
}

/// Registry of per-task buses keyed by task id.
#[derive(Default)]
pub struct EventBusRegistry {
    buses: RwLock<HashMap<String, Arc<TaskEventBus>>>,
}

impl EventBusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the bus for a task, creating it on first use.
    pub fn get_or_create(&self, task_id: &str) -> Arc<TaskEventBus> {
        if let Some(bus) = self.buses.read().get(task_id) {
            return bus.clone();
        }
        let mut buses = self.buses.write();
        buses
            .entry(task_id.to_string())
            .or_insert_with(|| Arc::new(TaskEventBus::new(task_id)))
            .clone()
    }

    pub fn get(&self, task_id: &str) -> Option<Arc<TaskEventBus>> {
        self.buses.read().get(task_id).cloned()
    }

    pub fn remove(&self, task_id: &str) -> Option<Arc<TaskEventBus>> {
        self.buses.write().remove(task_id)
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.buses.read().keys().cloned().collect()
    }
}

fn event_kind_for_log(event: &TaskEvent) -> &'static str {
    match event {
        TaskEvent::Task { .. } => "task",
        TaskEvent::StatusUpdate { .. } => "status-update",
        TaskEvent::ArtifactUpdate { .. } => "artifact-update",
    }
}
