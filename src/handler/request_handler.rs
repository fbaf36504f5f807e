use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::a2a::{
    DeleteTaskPushNotificationConfigParams, GetTaskPushNotificationConfigParams,
    ListTaskPushNotificationConfigParams, MessageSendParams, SendMessageResult, Task, TaskIdParams,
    TaskPushNotificationConfig, TaskQueryParams,
};
use crate::errors::ServerResult;
use crate::events::Event;

/// Ordered sequence of events a streaming operation produces. Transports turn
/// each item into a wire frame with
/// [`Event::into_stream_result`](crate::events::Event::into_stream_result).
pub type EventStream = Pin<Box<dyn Stream<Item = ServerResult<Event>> + Send>>;

/// Transport-agnostic surface of the server. One method per protocol
/// operation; transports (JSON-RPC, gRPC, REST) adapt their framing onto
/// these calls and map [`ServerError`](crate::ServerError) to their error
/// encoding.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// `message/send`: run the agent and block until a result or interrupt.
    async fn on_message_send(&self, params: MessageSendParams) -> ServerResult<SendMessageResult>;

    /// `message/stream`: run the agent and surface every event as it happens.
    async fn on_message_send_stream(&self, params: MessageSendParams)
        -> ServerResult<EventStream>;

    /// `tasks/get`: the current snapshot of a task.
    async fn on_get_task(&self, params: TaskQueryParams) -> ServerResult<Task>;

    /// `tasks/cancel`: request cooperative cancellation of an open task.
    async fn on_cancel_task(&self, params: TaskIdParams) -> ServerResult<Task>;

    /// `tasks/resubscribe`: rejoin the live event stream of an in-flight
    /// task. Requires both the task and its queue to still exist.
    async fn on_resubscribe_to_task(&self, params: TaskIdParams) -> ServerResult<EventStream>;

    /// `tasks/pushNotificationConfig/set`.
    async fn on_set_task_push_notification_config(
        &self,
        params: TaskPushNotificationConfig,
    ) -> ServerResult<TaskPushNotificationConfig>;

    /// `tasks/pushNotificationConfig/get`.
    async fn on_get_task_push_notification_config(
        &self,
        params: GetTaskPushNotificationConfigParams,
    ) -> ServerResult<TaskPushNotificationConfig>;

    /// `tasks/pushNotificationConfig/list`.
    async fn on_list_task_push_notification_config(
        &self,
        params: ListTaskPushNotificationConfigParams,
    ) -> ServerResult<Vec<TaskPushNotificationConfig>>;

    /// `tasks/pushNotificationConfig/delete`.
    async fn on_delete_task_push_notification_config(
        &self,
        params: DeleteTaskPushNotificationConfigParams,
    ) -> ServerResult<()>;
}
