use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use super::TaskStore;
use crate::a2a::{new_task, Message, Task, TaskArtifactUpdateEvent, TaskStatusUpdateEvent};
use crate::errors::{ServerError, ServerResult};
use crate::events::Event;

/// Owns the authoritative view of one task for the duration of a request.
///
/// Queued events and inbound messages are folded into the tracked [`Task`]
/// here; every mutation is written through the [`TaskStore`] immediately so a
/// concurrent `tasks/get` never observes a stale snapshot. The task id may be
/// unbound at construction (brand-new task) and binds to the first task the
/// agent materializes.
pub struct TaskManager {
    store: Arc<dyn TaskStore>,
    initial_message: Option<Message>,
    state: Mutex<TaskManagerState>,
}

struct TaskManagerState {
    task_id: Option<String>,
    context_id: Option<String>,
    current: Option<Task>,
}

impl TaskManager {
    pub fn new(
        task_id: Option<String>,
        context_id: Option<String>,
        store: Arc<dyn TaskStore>,
        initial_message: Option<Message>,
    ) -> Self {
        Self {
            store,
            initial_message,
            state: Mutex::new(TaskManagerState {
                task_id,
                context_id,
                current: None,
            }),
        }
    }

    /// The currently stored task, or `None` when nothing was persisted yet.
    pub async fn get_task(&self) -> ServerResult<Option<Task>> {
        let mut state = self.state.lock().await;
        if state.current.is_some() {
            return Ok(state.current.clone());
        }
        let Some(task_id) = state.task_id.clone() else {
            return Ok(None);
        };
        let task = self.store.get(&task_id).await?;
        state.current = task.clone();
        Ok(task)
    }

    /// Fold one queued event into the tracked task. Bare messages and errors
    /// carry no task mutation and pass through untouched.
    pub async fn process(&self, event: &Event) -> ServerResult<()> {
        match event {
            Event::Task(task) => self.save_task(task.clone()).await,
            Event::StatusUpdate(update) => self.apply_status_update(update).await,
            Event::ArtifactUpdate(update) => self.apply_artifact_update(update).await,
            Event::Message(_) | Event::Error(_) => Ok(()),
        }
    }

    /// Append a message to the task's history and persist.
    pub async fn update_with_message(&self, message: Message, mut task: Task) -> ServerResult<Task> {
        if let Some(previous) = task.status.message.take() {
            task.history.push(previous);
        }
        task.history.push(message);
        self.save_task(task.clone()).await?;
        Ok(task)
    }

    /// Persist a full snapshot, binding this manager's ids on first contact.
    pub async fn save_task(&self, task: Task) -> ServerResult<()> {
        let mut state = self.state.lock().await;
        if let Some(bound) = &state.task_id {
            if bound != &task.id {
                return Err(ServerError::internal(format!(
                    "event task id {} does not match tracked task {bound}",
                    task.id
                )));
            }
        } else {
            debug!(task_id = %task.id, "binding task manager to new task");
            state.task_id = Some(task.id.clone());
        }
        if state.context_id.is_none() {
            state.context_id = Some(task.context_id.clone());
        }
        self.store.save(&task).await?;
        state.current = Some(task);
        Ok(())
    }

    async fn apply_status_update(&self, update: &TaskStatusUpdateEvent) -> ServerResult<()> {
        let mut task = self.ensure_task(&update.task_id, &update.context_id).await?;
        // A superseded status message becomes history rather than vanishing.
        if let Some(previous) = task.status.message.take() {
            task.history.push(previous);
        }
        task.status = update.status.clone();
        self.save_task(task).await
    }

    async fn apply_artifact_update(&self, update: &TaskArtifactUpdateEvent) -> ServerResult<()> {
        let mut task = self.ensure_task(&update.task_id, &update.context_id).await?;
        let artifact = update.artifact.clone();
        let existing = task
            .artifacts
            .iter_mut()
            .find(|a| a.artifact_id == artifact.artifact_id);
        match existing {
            Some(existing) if update.append.unwrap_or(false) => {
                existing.parts.extend(artifact.parts);
            }
            Some(existing) => *existing = artifact,
            None => task.artifacts.push(artifact),
        }
        self.save_task(task).await
    }

    /// The tracked task, or a fresh submitted one when a delta arrives before
    /// any snapshot (seeded with the request's inbound message).
    async fn ensure_task(&self, task_id: &str, context_id: &str) -> ServerResult<Task> {
        {
            let state = self.state.lock().await;
            if let Some(bound) = &state.task_id {
                if bound != task_id {
                    return Err(ServerError::internal(format!(
                        "event task id {task_id} does not match tracked task {bound}"
                    )));
                }
            }
            if let Some(current) = &state.current {
                return Ok(current.clone());
            }
        }
        if let Some(task) = self.store.get(task_id).await? {
            return Ok(task);
        }
        debug!(task_id, "materializing task from update event");
        let mut task = match &self.initial_message {
            Some(message) => new_task(message.clone().for_task(task_id, context_id)),
            None => Task::new(task_id, context_id),
        };
        task.id = task_id.to_string();
        task.context_id = context_id.to_string();
        Ok(task)
    }
}
