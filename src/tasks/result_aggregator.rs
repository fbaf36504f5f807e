use std::sync::Arc;

use futures::Stream;
use tokio::sync::{mpsc, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error};

use super::TaskManager;
use crate::a2a::{Message, Task};
use crate::errors::ServerResult;
use crate::events::{Event, EventConsumer};

/// Terminal outcome of an aggregated event sequence: either the tracked task
/// or a bare message the agent answered with instead of running a task.
#[derive(Debug, Clone)]
pub enum EventKind {
    Task(Task),
    Message(Message),
}

/// Folds an event sequence into a single result via a [`TaskManager`].
///
/// Each consumption strategy maps to one request shape: blocking sends break
/// on interrupt states, streaming sends re-emit every event after folding it,
/// and cancellation drains everything.
pub struct ResultAggregator {
    task_manager: Arc<TaskManager>,
    message: Mutex<Option<Message>>,
}

impl ResultAggregator {
    pub fn new(task_manager: Arc<TaskManager>) -> Self {
        Self {
            task_manager,
            message: Mutex::new(None),
        }
    }

    /// The aggregated result so far. A bare message wins over the tracked
    /// task, matching how agents short-circuit task creation.
    pub async fn current_result(&self) -> ServerResult<Option<EventKind>> {
        if let Some(message) = self.message.lock().await.clone() {
            return Ok(Some(EventKind::Message(message)));
        }
        Ok(self.task_manager.get_task().await?.map(EventKind::Task))
    }

    pub async fn current_task(&self) -> ServerResult<Option<Task>> {
        self.task_manager.get_task().await
    }

    /// Consume until the sequence ends or the task pauses for input.
    ///
    /// Returns the result plus an `interrupted` flag. When interrupted, the
    /// queue is left open and the caller is expected to keep draining it in
    /// the background so the producer is not blocked.
    pub async fn consume_and_break_on_interrupt(
        &self,
        consumer: &mut EventConsumer,
    ) -> ServerResult<(Option<EventKind>, bool)> {
        while let Some(item) = consumer.consume().await {
            let event = item?;
            if let Event::Message(message) = event {
                *self.message.lock().await = Some(message.clone());
                return Ok((Some(EventKind::Message(message)), false));
            }
            self.task_manager.process(&event).await?;
            if let Event::StatusUpdate(update) = &event {
                if update.status.state.is_interrupt() {
                    debug!(
                        task_id = %update.task_id,
                        state = ?update.status.state,
                        "task paused, returning early"
                    );
                    return Ok((self.current_result().await?, true));
                }
            }
        }
        Ok((self.current_result().await?, false))
    }

    /// Drain the whole sequence, then report the result. Used for
    /// cancellation, where the caller needs the final task state and nothing
    /// in between.
    pub async fn consume_all(&self, consumer: &mut EventConsumer) -> ServerResult<Option<EventKind>> {
        while let Some(item) = consumer.consume().await {
            let event = item?;
            if let Event::Message(message) = event {
                *self.message.lock().await = Some(message.clone());
                return Ok(Some(EventKind::Message(message)));
            }
            self.task_manager.process(&event).await?;
        }
        self.current_result().await
    }

    /// Consume the sequence and re-emit each event after folding it into the
    /// tracked task, so stream subscribers observe the same order the store
    /// commits in.
    pub fn consume_and_emit(
        self: Arc<Self>,
        mut consumer: EventConsumer,
    ) -> impl Stream<Item = ServerResult<Event>> + Send {
        let (tx, rx) = mpsc::channel(16);
        let aggregator = self;
        tokio::spawn(async move {
            while let Some(item) = consumer.consume().await {
                let item = match item {
                    Ok(event) => {
                        if let Event::Message(message) = &event {
                            *aggregator.message.lock().await = Some(message.clone());
                            Ok(event)
                        } else {
                            match aggregator.task_manager.process(&event).await {
                                Ok(()) => Ok(event),
                                Err(e) => {
                                    error!(error = %e, "failed to fold event into task");
                                    Err(e)
                                }
                            }
                        }
                    }
                    Err(e) => Err(e),
                };
                let stop = item.is_err();
                // A dropped receiver means the subscriber went away; stop
                // consuming so the queue can wind down.
                if tx.send(item).await.is_err() || stop {
                    break;
                }
            }
        });
        ReceiverStream::new(rx)
    }
}
