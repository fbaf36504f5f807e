use crate::a2a::{
    Message, SendStreamingMessageResult, Task, TaskArtifactUpdateEvent, TaskStatusUpdateEvent,
};
use crate::errors::ServerError;

/// A payload flowing through an [`EventQueue`](super::EventQueue).
///
/// `Task` and `Message` are snapshots; `StatusUpdate` and `ArtifactUpdate` are
/// deltas the aggregator folds into the tracked task. `Error` carries a
/// failure raised by the agent executor into the consumer side of the
/// pipeline. Events are transient and never persisted directly.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Task(Task),
    Message(Message),
    StatusUpdate(TaskStatusUpdateEvent),
    ArtifactUpdate(TaskArtifactUpdateEvent),
    Error(ServerError),
}

impl Event {
    /// The id of the task this event belongs to, when it carries one.
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Event::Task(task) => Some(&task.id),
            Event::Message(message) => message.task_id.as_deref(),
            Event::StatusUpdate(update) => Some(&update.task_id),
            Event::ArtifactUpdate(update) => Some(&update.task_id),
            Event::Error(_) => None,
        }
    }

    pub fn context_id(&self) -> Option<&str> {
        match self {
            Event::Task(task) => Some(&task.context_id),
            Event::Message(message) => message.context_id.as_deref(),
            Event::StatusUpdate(update) => Some(&update.context_id),
            Event::ArtifactUpdate(update) => Some(&update.context_id),
            Event::Error(_) => None,
        }
    }

    /// Whether this event concludes the stream: a bare message, a status
    /// update flagged final, a task snapshot already in a terminal state, or
    /// an error.
    pub fn is_final(&self) -> bool {
        match self {
            Event::Message(_) | Event::Error(_) => true,
            Event::StatusUpdate(update) => update.is_final,
            Event::Task(task) => task.status.state.is_terminal(),
            Event::ArtifactUpdate(_) => false,
        }
    }

    /// Short discriminant used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Task(_) => "task",
            Event::Message(_) => "message",
            Event::StatusUpdate(_) => "status-update",
            Event::ArtifactUpdate(_) => "artifact-update",
            Event::Error(_) => "error",
        }
    }

    /// Convert to the wire frame for streaming responses. An `Error` event
    /// becomes the error it carries.
    pub fn into_stream_result(self) -> Result<SendStreamingMessageResult, ServerError> {
        match self {
            Event::Task(task) => Ok(SendStreamingMessageResult::Task(task)),
            Event::Message(message) => Ok(SendStreamingMessageResult::Message(message)),
            Event::StatusUpdate(update) => Ok(SendStreamingMessageResult::StatusUpdate(update)),
            Event::ArtifactUpdate(update) => Ok(SendStreamingMessageResult::ArtifactUpdate(update)),
            Event::Error(error) => Err(error),
        }
    }
}

impl From<Task> for Event {
    fn from(task: Task) -> Self {
        Event::Task(task)
    }
}

impl From<Message> for Event {
    fn from(message: Message) -> Self {
        Event::Message(message)
    }
}

impl From<TaskStatusUpdateEvent> for Event {
    fn from(update: TaskStatusUpdateEvent) -> Self {
        Event::StatusUpdate(update)
    }
}

impl From<TaskArtifactUpdateEvent> for Event {
    fn from(update: TaskArtifactUpdateEvent) -> Self {
        Event::ArtifactUpdate(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::a2a::{TaskState, TaskStatus};

    #[test]
    fn test_finality() {
        let task = Task::new("t1", "c1");
        assert!(!Event::Task(task.clone()).is_final());

        let mut done = task.clone();
        done.status = TaskStatus::new(TaskState::Completed);
        assert!(Event::Task(done).is_final());

        assert!(Event::Message(Message::agent_text("hi")).is_final());
        assert!(Event::Error(ServerError::internal("x")).is_final());

        let update = TaskStatusUpdateEvent::new(&task, TaskStatus::new(TaskState::Working), false);
        assert!(!Event::StatusUpdate(update).is_final());
        let update = TaskStatusUpdateEvent::new(&task, TaskStatus::new(TaskState::Completed), true);
        assert!(Event::StatusUpdate(update).is_final());
    }

    #[test]
    fn test_task_id_extraction() {
        let task = Task::new("t1", "c1");
        assert_eq!(Event::Task(task.clone()).task_id(), Some("t1"));
        assert_eq!(Event::Task(task).context_id(), Some("c1"));
        assert_eq!(Event::Message(Message::agent_text("hi")).task_id(), None);
        assert_eq!(Event::Error(ServerError::internal("x")).task_id(), None);
    }

    #[test]
    fn test_stream_result_conversion() {
        let ok = Event::Message(Message::agent_text("hi")).into_stream_result();
        assert!(matches!(ok, Ok(SendStreamingMessageResult::Message(_))));

        let err = Event::Error(ServerError::internal("boom")).into_stream_result();
        assert!(matches!(err, Err(ServerError::Internal { .. })));
    }
}
