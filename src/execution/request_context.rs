use uuid::Uuid;

use crate::a2a::{Message, MessageSendParams, Task};
use crate::errors::{ServerError, ServerResult};

/// Per-invocation bundle handed to the agent executor: the inbound params,
/// the reconciled task/context ids, the current task snapshot (if the task
/// already exists), and any related tasks referenced by the message.
#[derive(Debug, Clone)]
pub struct RequestContext {
    params: Option<MessageSendParams>,
    task_id: String,
    context_id: String,
    task: Option<Task>,
    related_tasks: Vec<Task>,
}

impl RequestContext {
    pub fn builder() -> RequestContextBuilder {
        RequestContextBuilder::new()
    }

    /// The inbound message, when this context was built from send params.
    pub fn message(&self) -> Option<&Message> {
        self.params.as_ref().map(|p| &p.message)
    }

    pub fn params(&self) -> Option<&MessageSendParams> {
        self.params.as_ref()
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn context_id(&self) -> &str {
        &self.context_id
    }

    /// Snapshot of the task as it existed when the request arrived.
    pub fn task(&self) -> Option<&Task> {
        self.task.as_ref()
    }

    pub fn related_tasks(&self) -> &[Task] {
        &self.related_tasks
    }
}

/// Builds a [`RequestContext`], generating absent ids and validating explicit
/// ones against the inbound message.
#[derive(Debug, Default)]
pub struct RequestContextBuilder {
    params: Option<MessageSendParams>,
    task_id: Option<String>,
    context_id: Option<String>,
    task: Option<Task>,
    related_tasks: Vec<Task>,
}

impl RequestContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(mut self, params: MessageSendParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn context_id(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }

    pub fn task(mut self, task: Task) -> Self {
        self.task = Some(task);
        self
    }

    pub fn related_tasks(mut self, related_tasks: Vec<Task>) -> Self {
        self.related_tasks = related_tasks;
        self
    }

    /// Reconcile ids and produce the context.
    ///
    /// Ids are resolved in order: explicit builder id, then the id on the
    /// inbound message, then the current task, then a fresh UUID. An explicit
    /// id that contradicts the message is a client error. Resolved ids are
    /// stamped back onto the message so the executor sees a consistent view.
    pub fn build(self) -> ServerResult<RequestContext> {
        let Self {
            mut params,
            task_id,
            context_id,
            task,
            related_tasks,
        } = self;

        let message = params.as_ref().map(|p| &p.message);

        if let (Some(explicit), Some(from_message)) =
            (task_id.as_deref(), message.and_then(|m| m.task_id.as_deref()))
        {
            if explicit != from_message {
                return Err(ServerError::invalid_params(format!(
                    "message taskId {from_message} does not match request task id {explicit}"
                )));
            }
        }
        if let (Some(explicit), Some(from_message)) = (
            context_id.as_deref(),
            message.and_then(|m| m.context_id.as_deref()),
        ) {
            if explicit != from_message {
                return Err(ServerError::invalid_params(format!(
                    "message contextId {from_message} does not match request context id {explicit}"
                )));
            }
        }

        let task_id = task_id
            .or_else(|| message.and_then(|m| m.task_id.clone()))
            .or_else(|| task.as_ref().map(|t| t.id.clone()))
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let context_id = context_id
            .or_else(|| message.and_then(|m| m.context_id.clone()))
            .or_else(|| task.as_ref().map(|t| t.context_id.clone()))
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if let Some(task) = &task {
            if task.id != task_id {
                return Err(ServerError::invalid_params(format!(
                    "current task id {} does not match request task id {task_id}",
                    task.id
                )));
            }
        }

        if let Some(params) = &mut params {
            params.message.task_id = Some(task_id.clone());
            params.message.context_id = Some(context_id.clone());
        }

        Ok(RequestContext {
            params,
            task_id,
            context_id,
            task,
            related_tasks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::a2a::Message;

    #[test]
    fn test_generates_missing_ids() {
        let params = MessageSendParams::new(Message::user_text("hi"));
        let context = RequestContext::builder().params(params).build().unwrap();

        assert!(!context.task_id().is_empty());
        assert!(!context.context_id().is_empty());
        // Ids are stamped back onto the message.
        let message = context.message().unwrap();
        assert_eq!(message.task_id.as_deref(), Some(context.task_id()));
        assert_eq!(message.context_id.as_deref(), Some(context.context_id()));
    }

    #[test]
    fn test_uses_message_ids() {
        let params = MessageSendParams::new(Message::user_text("hi").for_task("t1", "c1"));
        let context = RequestContext::builder().params(params).build().unwrap();
        assert_eq!(context.task_id(), "t1");
        assert_eq!(context.context_id(), "c1");
    }

    #[test]
    fn test_id_mismatch_is_client_error() {
        let params = MessageSendParams::new(Message::user_text("hi").for_task("t1", "c1"));
        let result = RequestContext::builder()
            .params(params)
            .task_id("other")
            .build();
        assert!(matches!(result, Err(ServerError::InvalidParams { .. })));

        let params = MessageSendParams::new(Message::user_text("hi").for_task("t1", "c1"));
        let result = RequestContext::builder()
            .params(params)
            .context_id("other")
            .build();
        assert!(matches!(result, Err(ServerError::InvalidParams { .. })));
    }

    #[test]
    fn test_ids_fall_back_to_current_task() {
        let task = Task::new("t1", "c1");
        let context = RequestContext::builder().task(task).build().unwrap();
        assert_eq!(context.task_id(), "t1");
        assert_eq!(context.context_id(), "c1");
    }

    #[test]
    fn test_current_task_id_mismatch_rejected() {
        let task = Task::new("t1", "c1");
        let params = MessageSendParams::new(Message::user_text("hi").for_task("t2", "c1"));
        let result = RequestContext::builder().task(task).params(params).build();
        assert!(matches!(result, Err(ServerError::InvalidParams { .. })));
    }
}
