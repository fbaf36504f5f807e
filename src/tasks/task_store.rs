use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::a2a::Task;
use crate::errors::ServerResult;

/// Persistence for [`Task`] snapshots, keyed by task id.
///
/// The orchestration core persists through this trait on every mutation so a
/// concurrent `tasks/get` always observes the latest committed state.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn save(&self, task: &Task) -> ServerResult<()>;

    async fn get(&self, task_id: &str) -> ServerResult<Option<Task>>;

    /// Idempotent: deleting an absent task succeeds silently.
    async fn delete(&self, task_id: &str) -> ServerResult<()>;
}

/// In-memory [`TaskStore`] for development and tests. Tasks live in a guarded
/// hash map and are lost on process exit.
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<String, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn save(&self, task: &Task) -> ServerResult<()> {
        let mut tasks = self.tasks.write().await;
        tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    async fn get(&self, task_id: &str) -> ServerResult<Option<Task>> {
        let tasks = self.tasks.read().await;
        Ok(tasks.get(task_id).cloned())
    }

    async fn delete(&self, task_id: &str) -> ServerResult<()> {
        let mut tasks = self.tasks.write().await;
        tasks.remove(task_id);
        Ok(())
    }
}
