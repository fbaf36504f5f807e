use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::EventQueue;
use crate::errors::{ServerError, ServerResult};

/// Registry mapping task id to its main [`EventQueue`].
///
/// Enforces the single-producer invariant: at most one main queue per task id,
/// with duplicates rejected at insert time rather than overwritten.
#[async_trait]
pub trait QueueManager: Send + Sync {
    /// Register a new main queue. Fails with [`ServerError::QueueExists`] if
    /// the task id is already registered.
    async fn add(&self, task_id: &str, queue: EventQueue) -> ServerResult<()>;

    /// The main queue for a task, if one is registered.
    async fn get(&self, task_id: &str) -> Option<EventQueue>;

    /// A fresh tap of the task's main queue, or `None` when no main queue
    /// exists. Never auto-creates.
    async fn tap(&self, task_id: &str) -> Option<EventQueue>;

    /// Tap the existing main queue, or create and register one when the task
    /// has none. How a caller either joins an in-flight task or starts a new
    /// one.
    async fn create_or_tap(&self, task_id: &str) -> ServerResult<EventQueue>;

    /// Remove the main queue and close it (closing all taps). Fails with
    /// [`ServerError::NoQueue`] when the task has no queue.
    async fn close(&self, task_id: &str) -> ServerResult<()>;
}

/// Single-process [`QueueManager`] over a guarded hash map.
pub struct InMemoryQueueManager {
    queues: RwLock<HashMap<String, EventQueue>>,
}

impl InMemoryQueueManager {
    pub fn new() -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryQueueManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueManager for InMemoryQueueManager {
    async fn add(&self, task_id: &str, queue: EventQueue) -> ServerResult<()> {
        let mut queues = self.queues.write().await;
        if queues.contains_key(task_id) {
            return Err(ServerError::QueueExists {
                task_id: task_id.to_string(),
            });
        }
        debug!(task_id, "registered main event queue");
        queues.insert(task_id.to_string(), queue);
        Ok(())
    }

    async fn get(&self, task_id: &str) -> Option<EventQueue> {
        self.queues.read().await.get(task_id).cloned()
    }

    async fn tap(&self, task_id: &str) -> Option<EventQueue> {
        let queues = self.queues.read().await;
        // The registry only ever holds main queues, so tap() cannot fail.
        queues.get(task_id).and_then(|q| q.tap().ok())
    }

    async fn create_or_tap(&self, task_id: &str) -> ServerResult<EventQueue> {
        let mut queues = self.queues.write().await;
        if let Some(existing) = queues.get(task_id) {
            debug!(task_id, "tapping existing event queue");
            return existing.tap();
        }
        debug!(task_id, "creating main event queue");
        let queue = EventQueue::new();
        queues.insert(task_id.to_string(), queue.clone());
        Ok(queue)
    }

    async fn close(&self, task_id: &str) -> ServerResult<()> {
        let mut queues = self.queues.write().await;
        match queues.remove(task_id) {
            Some(queue) => {
                debug!(task_id, "closing and deregistering event queue");
                queue.close();
                Ok(())
            }
            None => Err(ServerError::NoQueue {
                task_id: task_id.to_string(),
            }),
        }
    }
}
