//! The per-task event pipeline: the [`Event`] union, the multicast
//! [`EventQueue`], the task-id keyed [`QueueManager`] registry, and the
//! [`EventConsumer`] that turns queue reads into a lazy event sequence.

mod event;
mod event_consumer;
mod event_queue;
mod queue_manager;

pub use event::Event;
pub use event_consumer::EventConsumer;
pub use event_queue::{EventQueue, QueueClosed, DEFAULT_QUEUE_CAPACITY};
pub use queue_manager::{InMemoryQueueManager, QueueManager};
