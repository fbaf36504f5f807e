use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::a2a::{PushNotificationConfig, Task};
use crate::errors::ServerResult;

/// Storage for per-task push notification configs.
///
/// A task may carry several configs, distinguished by config id. A config
/// without an id is keyed by its URL, so re-registering the same URL replaces
/// rather than duplicates.
#[async_trait]
pub trait PushNotificationConfigStore: Send + Sync {
    /// Register or replace a config for the task. Returns the stored config,
    /// with its effective id filled in.
    async fn set_info(
        &self,
        task_id: &str,
        config: PushNotificationConfig,
    ) -> ServerResult<PushNotificationConfig>;

    async fn get_info(&self, task_id: &str) -> ServerResult<Vec<PushNotificationConfig>>;

    /// Remove one config by id, or every config for the task when `config_id`
    /// is `None`. Absent entries are ignored.
    async fn delete_info(&self, task_id: &str, config_id: Option<&str>) -> ServerResult<()>;
}

/// Delivers task state to registered push endpoints.
#[async_trait]
pub trait PushNotificationSender: Send + Sync {
    /// Best effort: delivery failures are logged, never surfaced to the
    /// request that triggered them.
    async fn send_notification(&self, task: &Task);
}

/// In-memory [`PushNotificationConfigStore`].
pub struct InMemoryPushNotificationConfigStore {
    configs: RwLock<HashMap<String, Vec<PushNotificationConfig>>>,
}

impl InMemoryPushNotificationConfigStore {
    pub fn new() -> Self {
        Self {
            configs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryPushNotificationConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushNotificationConfigStore for InMemoryPushNotificationConfigStore {
    async fn set_info(
        &self,
        task_id: &str,
        mut config: PushNotificationConfig,
    ) -> ServerResult<PushNotificationConfig> {
        if config.id.is_none() {
            config.id = Some(config.url.clone());
        }
        let mut configs = self.configs.write().await;
        let entries = configs.entry(task_id.to_string()).or_default();
        match entries.iter_mut().find(|c| c.id == config.id) {
            Some(existing) => *existing = config.clone(),
            None => entries.push(config.clone()),
        }
        Ok(config)
    }

    async fn get_info(&self, task_id: &str) -> ServerResult<Vec<PushNotificationConfig>> {
        let configs = self.configs.read().await;
        Ok(configs.get(task_id).cloned().unwrap_or_default())
    }

    async fn delete_info(&self, task_id: &str, config_id: Option<&str>) -> ServerResult<()> {
        let mut configs = self.configs.write().await;
        match config_id {
            None => {
                configs.remove(task_id);
            }
            Some(config_id) => {
                if let Some(entries) = configs.get_mut(task_id) {
                    entries.retain(|c| c.id.as_deref() != Some(config_id));
                    if entries.is_empty() {
                        configs.remove(task_id);
                    }
                }
            }
        }
        Ok(())
    }
}

/// [`PushNotificationSender`] that POSTs the task JSON to every registered
/// endpoint over HTTP.
pub struct HttpPushNotificationSender {
    client: reqwest::Client,
    config_store: std::sync::Arc<dyn PushNotificationConfigStore>,
}

impl HttpPushNotificationSender {
    pub fn new(config_store: std::sync::Arc<dyn PushNotificationConfigStore>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config_store,
        }
    }

    pub fn with_client(
        config_store: std::sync::Arc<dyn PushNotificationConfigStore>,
        client: reqwest::Client,
    ) -> Self {
        Self {
            client,
            config_store,
        }
    }

    async fn dispatch(&self, task: &Task, config: &PushNotificationConfig) {
        let mut request = self.client.post(&config.url).json(task);
        if let Some(token) = &config.token {
            request = request.header("X-A2A-Notification-Token", token);
        }
        match request.send().await {
            Ok(response) if response.status().is_success() => {
                debug!(task_id = %task.id, url = %config.url, "push notification delivered");
            }
            Ok(response) => {
                warn!(
                    task_id = %task.id,
                    url = %config.url,
                    status = %response.status(),
                    "push endpoint rejected notification"
                );
            }
            Err(e) => {
                warn!(
                    task_id = %task.id,
                    url = %config.url,
                    error = %e,
                    "failed to deliver push notification"
                );
            }
        }
    }
}

#[async_trait]
impl PushNotificationSender for HttpPushNotificationSender {
    async fn send_notification(&self, task: &Task) {
        let configs = match self.config_store.get_info(&task.id).await {
            Ok(configs) => configs,
            Err(e) => {
                warn!(task_id = %task.id, error = %e, "failed to load push configs");
                return;
            }
        };
        // One bad endpoint must not starve the others.
        for config in &configs {
            self.dispatch(task, config).await;
        }
    }
}
