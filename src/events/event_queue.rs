use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{debug, warn};

use super::Event;
use crate::errors::{ServerError, ServerResult};

/// Default buffer capacity per queue end. This is a soft limit: crossing it
/// logs a warning and keeps going. Backpressure toward the producer is
/// explicitly not part of this queue's contract.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Dequeue on a queue that is closed and fully drained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("event queue is closed")]
pub struct QueueClosed;

struct InboxState {
    buffer: VecDeque<Event>,
    closed: bool,
}

/// One readable end of a queue: a buffer plus the notifier that wakes blocked
/// consumers on enqueue and close.
struct Inbox {
    state: Mutex<InboxState>,
    notify: Notify,
    capacity: usize,
}

impl Inbox {
    fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(InboxState {
                buffer: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, InboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, event: Event) {
        {
            let mut state = self.lock();
            if state.closed {
                warn!(kind = event.kind(), "queue end is closed, dropping event");
                return;
            }
            if state.buffer.len() >= self.capacity {
                warn!(
                    capacity = self.capacity,
                    "event queue exceeded its soft capacity limit"
                );
            }
            state.buffer.push_back(event);
        }
        self.notify.notify_waiters();
    }

    fn close(&self) {
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.notify.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

/// Routes every published event to the main inbox and all tapped inboxes,
/// preserving enqueue order per inbox.
struct Fanout {
    main: Arc<Inbox>,
    taps: Mutex<Vec<Arc<Inbox>>>,
    capacity: usize,
}

impl Fanout {
    fn publish(&self, event: Event) {
        let taps = {
            let guard = self.taps.lock().unwrap_or_else(PoisonError::into_inner);
            guard.clone()
        };
        for tap in &taps {
            tap.push(event.clone());
        }
        self.main.push(event);
    }

    fn register_tap(&self) -> Arc<Inbox> {
        let inbox = Arc::new(Inbox::new(self.capacity));
        self.taps
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(inbox.clone());
        inbox
    }

    fn close_all(&self) {
        self.main.close();
        let taps = self.taps.lock().unwrap_or_else(PoisonError::into_inner);
        for tap in taps.iter() {
            tap.close();
        }
    }
}

/// A bounded, multicast, closable FIFO carrying the events of one task.
///
/// One main queue exists per task; [`tap`](EventQueue::tap) creates child
/// queues that mirror every *future* enqueue (a late subscriber never sees
/// history). Enqueues on a tap route back through the root, so all readers
/// observe a single merged sequence. Cloning the handle shares the same
/// underlying end.
///
/// Closing the main queue closes every tap; closing a tap detaches only that
/// tap. Events still buffered at close time stay readable until each end is
/// drained, so a consumer mid-read never loses events to a racing close.
#[derive(Clone)]
pub struct EventQueue {
    fanout: Arc<Fanout>,
    inbox: Arc<Inbox>,
    is_tap: bool,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// A main queue with a custom soft capacity. Taps inherit the capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let main = Arc::new(Inbox::new(capacity));
        let fanout = Arc::new(Fanout {
            main: main.clone(),
            taps: Mutex::new(Vec::new()),
            capacity,
        });
        Self {
            fanout,
            inbox: main,
            is_tap: false,
        }
    }

    /// Append an event for every reader of this queue. No-op (logged) once
    /// this end is closed.
    pub fn enqueue(&self, event: Event) {
        debug!(kind = event.kind(), task_id = ?event.task_id(), "enqueue event");
        self.fanout.publish(event);
    }

    /// Pull the next event off this end.
    ///
    /// `wait` bounds how long to block; `None` polls without blocking.
    /// Returns `Ok(None)` when nothing arrived in time and `Err(QueueClosed)`
    /// once the queue is closed and drained.
    pub async fn dequeue(&self, wait: Option<Duration>) -> Result<Option<Event>, QueueClosed> {
        let deadline = wait.map(|d| tokio::time::Instant::now() + d);
        loop {
            let notified = self.inbox.notify.notified();
            tokio::pin!(notified);
            // Register interest before the buffer check so a concurrent
            // enqueue cannot slip between check and await.
            notified.as_mut().enable();

            {
                let mut state = self.inbox.lock();
                if let Some(event) = state.buffer.pop_front() {
                    debug!(kind = event.kind(), "dequeued event");
                    return Ok(Some(event));
                }
                if state.closed {
                    debug!("queue closed and drained");
                    return Err(QueueClosed);
                }
            }

            let Some(deadline) = deadline else {
                return Ok(None);
            };
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    /// Create a child queue receiving a live copy of all future events. Only
    /// the main queue can be tapped.
    pub fn tap(&self) -> ServerResult<EventQueue> {
        if self.is_tap {
            return Err(ServerError::internal("only the main queue can be tapped"));
        }
        debug!("tapping event queue");
        Ok(EventQueue {
            fanout: self.fanout.clone(),
            inbox: self.fanout.register_tap(),
            is_tap: true,
        })
    }

    /// Close this end. Idempotent. Closing the main queue closes all taps.
    pub fn close(&self) {
        debug!(is_tap = self.is_tap, "closing event queue");
        if self.is_tap {
            self.inbox.close();
        } else {
            self.fanout.close_all();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inbox.lock();
        f.debug_struct("EventQueue")
            .field("is_tap", &self.is_tap)
            .field("buffered", &state.buffer.len())
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::a2a::Message;

    fn message_event(text: &str) -> Event {
        Event::Message(Message::agent_text(text))
    }

    fn text_of(event: &Event) -> &str {
        match event {
            Event::Message(m) => m.parts[0].as_text().unwrap(),
            _ => panic!("expected message event"),
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = EventQueue::new();
        queue.enqueue(message_event("a"));
        queue.enqueue(message_event("b"));

        let first = queue.dequeue(None).await.unwrap().unwrap();
        let second = queue.dequeue(None).await.unwrap().unwrap();
        assert_eq!(text_of(&first), "a");
        assert_eq!(text_of(&second), "b");
        assert!(queue.dequeue(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dequeue_timeout() {
        let queue = EventQueue::new();
        let got = queue.dequeue(Some(Duration::from_millis(20))).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn test_dequeue_wakes_on_enqueue() {
        let queue = EventQueue::new();
        let reader = queue.clone();
        let handle = tokio::spawn(async move {
            reader.dequeue(Some(Duration::from_secs(5))).await
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.enqueue(message_event("late"));
        let event = handle.await.unwrap().unwrap().unwrap();
        assert_eq!(text_of(&event), "late");
    }

    #[tokio::test]
    async fn test_close_drains_then_reports_closed() {
        let queue = EventQueue::new();
        queue.enqueue(message_event("buffered"));
        queue.close();

        // Buffered events survive close; only the drained queue errors.
        let event = queue.dequeue(None).await.unwrap().unwrap();
        assert_eq!(text_of(&event), "buffered");
        assert_eq!(queue.dequeue(None).await, Err(QueueClosed));
    }

    #[tokio::test]
    async fn test_enqueue_after_close_is_noop() {
        let queue = EventQueue::new();
        queue.close();
        queue.enqueue(message_event("dropped"));
        assert_eq!(queue.dequeue(None).await, Err(QueueClosed));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let queue = EventQueue::new();
        queue.close();
        queue.close();
        assert!(queue.is_closed());
    }

    #[tokio::test]
    async fn test_tap_sees_only_future_events() {
        let queue = EventQueue::new();
        queue.enqueue(message_event("before"));

        let tap = queue.tap().unwrap();
        queue.enqueue(message_event("after"));

        let event = tap.dequeue(None).await.unwrap().unwrap();
        assert_eq!(text_of(&event), "after");
        assert!(tap.dequeue(None).await.unwrap().is_none());

        // The main queue still has both.
        let event = queue.dequeue(None).await.unwrap().unwrap();
        assert_eq!(text_of(&event), "before");
        let event = queue.dequeue(None).await.unwrap().unwrap();
        assert_eq!(text_of(&event), "after");
    }

    #[tokio::test]
    async fn test_tap_enqueue_routes_to_root() {
        let queue = EventQueue::new();
        let tap_a = queue.tap().unwrap();
        let tap_b = queue.tap().unwrap();

        tap_a.enqueue(message_event("from-tap"));

        for end in [&queue, &tap_a, &tap_b] {
            let event = end.dequeue(None).await.unwrap().unwrap();
            assert_eq!(text_of(&event), "from-tap");
        }
    }

    #[tokio::test]
    async fn test_tap_of_tap_is_rejected() {
        let queue = EventQueue::new();
        let tap = queue.tap().unwrap();
        assert!(tap.tap().is_err());
    }

    #[tokio::test]
    async fn test_close_propagates_to_taps() {
        let queue = EventQueue::new();
        let tap = queue.tap().unwrap();
        queue.enqueue(message_event("x"));
        queue.close();

        assert!(tap.is_closed());
        let event = tap.dequeue(None).await.unwrap().unwrap();
        assert_eq!(text_of(&event), "x");
        assert_eq!(tap.dequeue(None).await, Err(QueueClosed));
    }

    #[tokio::test]
    async fn test_closing_tap_leaves_main_open() {
        let queue = EventQueue::new();
        let tap = queue.tap().unwrap();
        tap.close();

        assert!(!queue.is_closed());
        queue.enqueue(message_event("still-alive"));
        let event = queue.dequeue(None).await.unwrap().unwrap();
        assert_eq!(text_of(&event), "still-alive");
    }

    #[tokio::test]
    async fn test_soft_capacity_keeps_accepting() {
        let queue = EventQueue::with_capacity(2);
        for i in 0..4 {
            queue.enqueue(message_event(&format!("m{i}")));
        }
        let mut seen = 0;
        while queue.dequeue(None).await.unwrap().is_some() {
            seen += 1;
        }
        assert_eq!(seen, 4);
    }
}
