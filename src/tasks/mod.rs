//! Task state: persistence ([`TaskStore`]), the per-request authoritative
//! view ([`TaskManager`]), the aggregation state machine
//! ([`ResultAggregator`]), and push-notification collaborators.

mod push_notification;
mod result_aggregator;
mod task_manager;
mod task_store;

pub use push_notification::{
    HttpPushNotificationSender, InMemoryPushNotificationConfigStore, PushNotificationConfigStore,
    PushNotificationSender,
};
pub use result_aggregator::{EventKind, ResultAggregator};
pub use task_manager::TaskManager;
pub use task_store::{InMemoryTaskStore, TaskStore};
