use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::{debug, error, warn};

use super::{EventStream, RequestHandler};
use crate::a2a::{
    DeleteTaskPushNotificationConfigParams, GetTaskPushNotificationConfigParams,
    ListTaskPushNotificationConfigParams, MessageSendParams, PushNotificationConfig,
    SendMessageResult, Task, TaskIdParams, TaskPushNotificationConfig, TaskQueryParams,
};
use crate::errors::{ServerError, ServerResult};
use crate::events::{Event, EventConsumer, EventQueue, InMemoryQueueManager, QueueManager};
use crate::execution::{AgentExecutor, RequestContext};
use crate::tasks::{
    EventKind, PushNotificationConfigStore, PushNotificationSender, ResultAggregator, TaskManager,
    TaskStore,
};

/// The orchestration core behind every protocol operation.
///
/// Wires an [`AgentExecutor`] to the event pipeline: requests resolve into a
/// [`RequestContext`], the executor runs as a spawned producer writing into
/// the task's [`EventQueue`], and a [`ResultAggregator`] folds the consumed
/// events into persisted task state. Push notification support is optional
/// and absent by default.
pub struct DefaultRequestHandler {
    agent_executor: Arc<dyn AgentExecutor>,
    task_store: Arc<dyn TaskStore>,
    queue_manager: Arc<dyn QueueManager>,
    push_config_store: Option<Arc<dyn PushNotificationConfigStore>>,
    push_sender: Option<Arc<dyn PushNotificationSender>>,
    running_agents: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl DefaultRequestHandler {
    pub fn new(agent_executor: Arc<dyn AgentExecutor>, task_store: Arc<dyn TaskStore>) -> Self {
        Self {
            agent_executor,
            task_store,
            queue_manager: Arc::new(InMemoryQueueManager::new()),
            push_config_store: None,
            push_sender: None,
            running_agents: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_queue_manager(mut self, queue_manager: Arc<dyn QueueManager>) -> Self {
        self.queue_manager = queue_manager;
        self
    }

    pub fn with_push_notifications(
        mut self,
        config_store: Arc<dyn PushNotificationConfigStore>,
        sender: Arc<dyn PushNotificationSender>,
    ) -> Self {
        self.push_config_store = Some(config_store);
        self.push_sender = Some(sender);
        self
    }

    /// Resolve a send request into a context and a bound task manager,
    /// persisting the inbound message onto an existing task.
    async fn setup_message_execution(
        &self,
        params: &MessageSendParams,
    ) -> ServerResult<(RequestContext, Arc<TaskManager>)> {
        let mut task = None;
        if let Some(task_id) = &params.message.task_id {
            let existing =
                self.task_store
                    .get(task_id)
                    .await?
                    .ok_or_else(|| ServerError::TaskNotFound {
                        task_id: task_id.clone(),
                    })?;
            if existing.status.state.is_terminal() {
                return Err(ServerError::invalid_params(format!(
                    "task {task_id} is in terminal state {:?} and cannot accept new messages",
                    existing.status.state
                )));
            }
            task = Some(existing);
        }

        let mut related_tasks = Vec::new();
        for related_id in &params.message.reference_task_ids {
            if let Some(related) = self.task_store.get(related_id).await? {
                related_tasks.push(related);
            } else {
                debug!(related_id = %related_id, "referenced task not found, skipping");
            }
        }

        let mut builder = RequestContext::builder()
            .params(params.clone())
            .related_tasks(related_tasks);
        if let Some(task) = task.clone() {
            builder = builder.task(task);
        }
        let context = builder.build()?;

        // Bind the manager only to ids the client supplied. A request that
        // names no task leaves it unbound so the agent may assign its own id.
        let task_manager = Arc::new(TaskManager::new(
            params.message.task_id.clone(),
            params.message.context_id.clone(),
            self.task_store.clone(),
            Some(params.message.clone()),
        ));

        if let Some(task) = task {
            task_manager
                .update_with_message(params.message.clone(), task)
                .await?;
        }

        if let Some(config) = params
            .configuration
            .as_ref()
            .and_then(|c| c.push_notification_config.clone())
        {
            self.register_push_config(context.task_id(), config).await?;
        }

        Ok((context, task_manager))
    }

    async fn register_push_config(
        &self,
        task_id: &str,
        config: PushNotificationConfig,
    ) -> ServerResult<()> {
        let Some(store) = &self.push_config_store else {
            return Ok(());
        };
        store.set_info(task_id, config).await?;
        Ok(())
    }

    /// Spawn the executor as the queue's producer. The producer owns the
    /// close: the event stream ends when `execute` returns, and an executor
    /// failure reaches the consumer as an error event rather than vanishing.
    async fn spawn_producer(&self, context: RequestContext, queue: EventQueue) {
        let executor = self.agent_executor.clone();
        let task_id = context.task_id().to_string();
        let handle = tokio::spawn(async move {
            if let Err(e) = executor.execute(&context, &queue).await {
                error!(task_id = %context.task_id(), error = %e, "agent executor failed");
                queue.enqueue(Event::Error(e));
            }
            queue.close();
        });
        self.running_agents.lock().await.insert(task_id, handle);
    }

    /// Wait for the producer and retire the task's queue. Runs inline on the
    /// non-interrupted paths.
    async fn finish_producer(&self, task_id: &str) {
        let handle = self.running_agents.lock().await.remove(task_id);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    error!(task_id, error = %e, "agent producer panicked");
                }
            }
        }
        match self.queue_manager.close(task_id).await {
            Ok(()) | Err(ServerError::NoQueue { .. }) => {}
            Err(e) => warn!(task_id, error = %e, "failed to retire event queue"),
        }
    }

    /// Same as [`finish_producer`](Self::finish_producer), detached. Used
    /// when an interrupted blocking call returns early while the agent keeps
    /// working.
    fn finish_producer_in_background(&self, task_id: String) {
        let running_agents = self.running_agents.clone();
        let queue_manager = self.queue_manager.clone();
        tokio::spawn(async move {
            let handle = running_agents.lock().await.remove(&task_id);
            if let Some(handle) = handle {
                if let Err(e) = handle.await {
                    if !e.is_cancelled() {
                        error!(task_id = %task_id, error = %e, "agent producer panicked");
                    }
                }
            }
            match queue_manager.close(&task_id).await {
                Ok(()) | Err(ServerError::NoQueue { .. }) => {}
                Err(e) => warn!(task_id = %task_id, error = %e, "failed to retire event queue"),
            }
        });
    }

    async fn notify_task_update(&self, aggregator: &ResultAggregator) {
        let Some(sender) = &self.push_sender else {
            return;
        };
        match aggregator.current_task().await {
            Ok(Some(task)) => sender.send_notification(&task).await,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "could not load task for push notification"),
        }
    }

    /// Require the push config store, the protocol capability gate.
    fn push_config_store(&self) -> ServerResult<&Arc<dyn PushNotificationConfigStore>> {
        self.push_config_store
            .as_ref()
            .ok_or(ServerError::PushNotificationNotSupported)
    }

    async fn require_task(&self, task_id: &str) -> ServerResult<Task> {
        self.task_store
            .get(task_id)
            .await?
            .ok_or_else(|| ServerError::TaskNotFound {
                task_id: task_id.to_string(),
            })
    }
}

#[async_trait]
impl RequestHandler for DefaultRequestHandler {
    async fn on_message_send(&self, params: MessageSendParams) -> ServerResult<SendMessageResult> {
        let history_length = params.configuration.as_ref().and_then(|c| c.history_length);
        let (context, task_manager) = self.setup_message_execution(&params).await?;
        let task_id = context.task_id().to_string();

        let queue = self.queue_manager.create_or_tap(&task_id).await?;
        let mut consumer = EventConsumer::new(queue.clone());
        self.spawn_producer(context, queue).await;

        let aggregator = ResultAggregator::new(task_manager);
        let consumed = aggregator.consume_and_break_on_interrupt(&mut consumer).await;

        // The queue and producer are retired on every outcome. An interrupt
        // hands the remaining drain to a background task so the agent can
        // keep running past this response.
        if matches!(consumed, Ok((_, true))) {
            self.finish_producer_in_background(task_id.clone());
        } else {
            self.finish_producer(&task_id).await;
        }

        let (result, _interrupted) = consumed?;
        self.notify_task_update(&aggregator).await;

        match result {
            Some(EventKind::Message(message)) => Ok(SendMessageResult::Message(message)),
            Some(EventKind::Task(task)) => {
                if task.id != task_id {
                    return Err(ServerError::internal(format!(
                        "agent produced task {} for request bound to task {task_id}",
                        task.id
                    )));
                }
                Ok(SendMessageResult::Task(task.with_history_trimmed(history_length)))
            }
            None => Err(ServerError::internal("agent produced no events")),
        }
    }

    async fn on_message_send_stream(
        &self,
        params: MessageSendParams,
    ) -> ServerResult<EventStream> {
        let (context, task_manager) = self.setup_message_execution(&params).await?;
        let request_id = context.task_id().to_string();

        let queue = self.queue_manager.create_or_tap(&request_id).await?;
        let consumer = EventConsumer::new(queue.clone());
        self.spawn_producer(context, queue.clone()).await;

        let push_config = params
            .configuration
            .as_ref()
            .and_then(|c| c.push_notification_config.clone());

        let aggregator = Arc::new(ResultAggregator::new(task_manager));
        let mut folded = Box::pin(aggregator.clone().consume_and_emit(consumer));

        let (tx, rx) = mpsc::channel::<ServerResult<Event>>(16);
        let push_sender = self.push_sender.clone();
        let push_config_store = self.push_config_store.clone();
        let running_agents = self.running_agents.clone();
        let queue_manager = self.queue_manager.clone();
        tokio::spawn(async move {
            let mut task_id = request_id.clone();
            while let Some(item) = folded.next().await {
                // A task materializing under a server-assigned id moves the
                // queue registration and any supplied push config with it.
                if let Ok(Event::Task(task)) = &item {
                    if task.id != task_id {
                        debug!(
                            request_id = %task_id,
                            assigned_id = %task.id,
                            "agent assigned its own task id, re-registering queue"
                        );
                        if let Err(e) = queue_manager.add(&task.id, queue.clone()).await {
                            warn!(task_id = %task.id, error = %e, "could not re-register queue");
                        }
                        if let (Some(store), Some(config)) = (&push_config_store, &push_config) {
                            if let Err(e) = store.set_info(&task.id, config.clone()).await {
                                warn!(task_id = %task.id, error = %e, "could not move push config");
                            }
                        }
                        task_id = task.id.clone();
                    }
                }
                if item.is_ok() {
                    if let Some(sender) = &push_sender {
                        if let Ok(Some(task)) = aggregator.current_task().await {
                            sender.send_notification(&task).await;
                        }
                    }
                }
                // A closed receiver means the subscriber disconnected; fall
                // through to cleanup either way.
                if tx.send(item).await.is_err() {
                    debug!(task_id = %task_id, "stream subscriber disconnected");
                    break;
                }
            }
            let handle = running_agents.lock().await.remove(&request_id);
            if let Some(handle) = handle {
                if let Err(e) = handle.await {
                    if !e.is_cancelled() {
                        error!(task_id = %task_id, error = %e, "agent producer panicked");
                    }
                }
            }
            // Retire the request-time registration and, when the agent chose
            // its own id, the re-registered one as well.
            for id in [request_id, task_id] {
                match queue_manager.close(&id).await {
                    Ok(()) | Err(ServerError::NoQueue { .. }) => {}
                    Err(e) => warn!(task_id = %id, error = %e, "failed to retire event queue"),
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn on_get_task(&self, params: TaskQueryParams) -> ServerResult<Task> {
        let task = self.require_task(&params.id).await?;
        Ok(task.with_history_trimmed(params.history_length))
    }

    async fn on_cancel_task(&self, params: TaskIdParams) -> ServerResult<Task> {
        let task = self.require_task(&params.id).await?;
        if task.status.state.is_terminal() {
            return Err(ServerError::TaskNotCancelable {
                task_id: params.id.clone(),
            });
        }

        let task_manager = Arc::new(TaskManager::new(
            Some(task.id.clone()),
            Some(task.context_id.clone()),
            self.task_store.clone(),
            None,
        ));

        // Tap the live queue when the task is still running so concurrent
        // subscribers observe the cancellation too; otherwise use a private
        // queue just for this exchange.
        let queue = match self.queue_manager.tap(&params.id).await {
            Some(queue) => queue,
            None => EventQueue::new(),
        };
        let mut consumer = EventConsumer::new(queue.clone());

        let context = RequestContext::builder()
            .task_id(params.id.clone())
            .task(task)
            .build()?;
        self.agent_executor.cancel(&context, &queue).await?;

        // Cancellation is cooperative: the running producer is left alone and
        // joined by its own request's cleanup once the executor winds down.
        // Closing this end bounds the drain for an executor that accepted the
        // cancel without emitting a final event.
        queue.close();

        let aggregator = ResultAggregator::new(task_manager);
        match aggregator.consume_all(&mut consumer).await? {
            Some(EventKind::Task(task)) => Ok(task),
            _ => Err(ServerError::InvalidAgentResponse {
                message: "agent did not report task state after cancellation".to_string(),
            }),
        }
    }

    async fn on_resubscribe_to_task(&self, params: TaskIdParams) -> ServerResult<EventStream> {
        let task = self.require_task(&params.id).await?;
        // Resubscription never restarts the agent. Without a live queue there
        // is nothing to subscribe to.
        let queue =
            self.queue_manager
                .tap(&params.id)
                .await
                .ok_or_else(|| ServerError::TaskNotFound {
                    task_id: params.id.clone(),
                })?;

        let task_manager = Arc::new(TaskManager::new(
            Some(task.id),
            Some(task.context_id),
            self.task_store.clone(),
            None,
        ));
        let aggregator = Arc::new(ResultAggregator::new(task_manager));
        Ok(Box::pin(aggregator.consume_and_emit(EventConsumer::new(queue))))
    }

    async fn on_set_task_push_notification_config(
        &self,
        params: TaskPushNotificationConfig,
    ) -> ServerResult<TaskPushNotificationConfig> {
        let store = self.push_config_store()?.clone();
        self.require_task(&params.task_id).await?;
        let stored = store
            .set_info(&params.task_id, params.push_notification_config)
            .await?;
        Ok(TaskPushNotificationConfig {
            task_id: params.task_id,
            push_notification_config: stored,
        })
    }

    async fn on_get_task_push_notification_config(
        &self,
        params: GetTaskPushNotificationConfigParams,
    ) -> ServerResult<TaskPushNotificationConfig> {
        let store = self.push_config_store()?.clone();
        self.require_task(&params.id).await?;
        let configs = store.get_info(&params.id).await?;
        let config = match &params.push_notification_config_id {
            Some(config_id) => configs
                .into_iter()
                .find(|c| c.id.as_deref() == Some(config_id.as_str())),
            None => configs.into_iter().next(),
        };
        match config {
            Some(config) => Ok(TaskPushNotificationConfig {
                task_id: params.id,
                push_notification_config: config,
            }),
            None => Err(ServerError::invalid_params(format!(
                "no push notification config found for task {}",
                params.id
            ))),
        }
    }

    async fn on_list_task_push_notification_config(
        &self,
        params: ListTaskPushNotificationConfigParams,
    ) -> ServerResult<Vec<TaskPushNotificationConfig>> {
        let store = self.push_config_store()?.clone();
        self.require_task(&params.id).await?;
        let configs = store.get_info(&params.id).await?;
        Ok(configs
            .into_iter()
            .map(|config| TaskPushNotificationConfig {
                task_id: params.id.clone(),
                push_notification_config: config,
            })
            .collect())
    }

    async fn on_delete_task_push_notification_config(
        &self,
        params: DeleteTaskPushNotificationConfigParams,
    ) -> ServerResult<()> {
        let store = self.push_config_store()?.clone();
        store
            .delete_info(&params.id, Some(&params.push_notification_config_id))
            .await
    }
}
