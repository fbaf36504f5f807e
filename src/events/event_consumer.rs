use std::time::Duration;

use futures::Stream;
use tracing::debug;

use super::{Event, EventQueue};
use crate::errors::{ServerError, ServerResult};

/// Default local polling interval for blocking reads. This bounds how long a
/// single `dequeue` sleeps, not how long a request may run.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Pulls events off one [`EventQueue`] end as a lazy sequence.
///
/// The sequence ends when the queue reports closed-and-drained, or right
/// after yielding a final event (a bare message, a final status update, a
/// terminal task snapshot, or an executor error). In the latter case the
/// consumer also closes its queue end so the pipeline winds down even if the
/// producer never closes it.
pub struct EventConsumer {
    queue: EventQueue,
    poll_interval: Duration,
    finished: bool,
}

impl EventConsumer {
    pub fn new(queue: EventQueue) -> Self {
        Self {
            queue,
            poll_interval: DEFAULT_POLL_INTERVAL,
            finished: false,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Take one already-buffered event without blocking. Errors when nothing
    /// is buffered.
    pub async fn consume_one(&mut self) -> ServerResult<Event> {
        match self.queue.dequeue(None).await {
            Ok(Some(Event::Error(error))) => Err(error),
            Ok(Some(event)) => Ok(event),
            Ok(None) | Err(_) => Err(ServerError::internal(
                "no event available in the queue",
            )),
        }
    }

    /// The next event, blocking until one arrives or the sequence ends.
    ///
    /// `None` marks the end of the sequence; an `Event::Error` surfaces as
    /// `Some(Err(..))` and ends the sequence on the next call.
    pub async fn consume(&mut self) -> Option<ServerResult<Event>> {
        if self.finished {
            return None;
        }
        loop {
            match self.queue.dequeue(Some(self.poll_interval)).await {
                Ok(Some(event)) => {
                    if event.is_final() {
                        debug!(kind = event.kind(), "final event, closing consumer");
                        self.finished = true;
                        self.queue.close();
                    }
                    return match event {
                        Event::Error(error) => Some(Err(error)),
                        event => Some(Ok(event)),
                    };
                }
                // Timeout: keep polling. End-to-end deadlines belong to the
                // transport layer.
                Ok(None) => continue,
                Err(_) => {
                    debug!("queue closed and drained, ending consumption");
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    /// Adapt this consumer into a [`Stream`] of events.
    pub fn into_stream(self) -> impl Stream<Item = ServerResult<Event>> + Send {
        futures::stream::unfold(self, |mut consumer| async move {
            consumer.consume().await.map(|item| (item, consumer))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::a2a::{Message, Task, TaskState, TaskStatus, TaskStatusUpdateEvent};
    use futures::StreamExt;

    fn working_update(task: &Task) -> Event {
        Event::StatusUpdate(TaskStatusUpdateEvent::new(
            task,
            TaskStatus::new(TaskState::Working),
            false,
        ))
    }

    fn final_update(task: &Task) -> Event {
        Event::StatusUpdate(TaskStatusUpdateEvent::new(
            task,
            TaskStatus::new(TaskState::Completed),
            true,
        ))
    }

    #[tokio::test]
    async fn test_consume_until_final_event() {
        let queue = EventQueue::new();
        let task = Task::new("t1", "c1");
        queue.enqueue(working_update(&task));
        queue.enqueue(final_update(&task));

        let mut consumer = EventConsumer::new(queue.clone());
        assert!(consumer.consume().await.unwrap().is_ok());
        assert!(consumer.consume().await.unwrap().is_ok());

        // Final event ends the sequence and closes the queue.
        assert!(consumer.consume().await.is_none());
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn test_consume_ends_on_close() {
        let queue = EventQueue::new();
        let task = Task::new("t1", "c1");
        queue.enqueue(working_update(&task));
        queue.close();

        let mut consumer = EventConsumer::new(queue);
        assert!(consumer.consume().await.unwrap().is_ok());
        assert!(consumer.consume().await.is_none());
        assert!(consumer.consume().await.is_none());
    }

    #[tokio::test]
    async fn test_error_event_surfaces_and_ends() {
        let queue = EventQueue::new();
        queue.enqueue(Event::Error(ServerError::internal("executor failed")));

        let mut consumer = EventConsumer::new(queue);
        let item = consumer.consume().await.unwrap();
        assert!(matches!(item, Err(ServerError::Internal { .. })));
        assert!(consumer.consume().await.is_none());
    }

    #[tokio::test]
    async fn test_consume_waits_for_slow_producer() {
        let queue = EventQueue::new();
        let producer = queue.clone();
        let task = Task::new("t1", "c1");
        let update = final_update(&task);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            producer.enqueue(update);
        });

        let mut consumer =
            EventConsumer::new(queue).with_poll_interval(Duration::from_millis(5));
        assert!(consumer.consume().await.unwrap().is_ok());
        assert!(consumer.consume().await.is_none());
    }

    #[tokio::test]
    async fn test_consume_one_requires_buffered_event() {
        let queue = EventQueue::new();
        let mut consumer = EventConsumer::new(queue.clone());
        assert!(consumer.consume_one().await.is_err());

        queue.enqueue(Event::Message(Message::agent_text("hi")));
        assert!(consumer.consume_one().await.is_ok());
    }

    #[tokio::test]
    async fn test_stream_adapter() {
        let queue = EventQueue::new();
        let task = Task::new("t1", "c1");
        queue.enqueue(working_update(&task));
        queue.enqueue(final_update(&task));

        let events: Vec<_> = EventConsumer::new(queue).into_stream().collect().await;
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.is_ok()));
    }
}
