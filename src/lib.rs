//! Server-side orchestration core for agent-to-agent (A2A) RPC.
//!
//! The crate sits between a transport (JSON-RPC, gRPC, REST) and an agent's
//! business logic. Transports call the [`RequestHandler`] operations; the
//! agent plugs in as an [`AgentExecutor`] that reports progress by writing
//! events into an [`EventQueue`]. [`DefaultRequestHandler`] wires the two
//! together: it spawns the executor as a producer, consumes the resulting
//! event sequence, folds it into persisted [`Task`](a2a::Task) state, and
//! shapes the outcome for blocking, streaming, and resubscription calls.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use a2a_server::a2a::{Message, MessageSendParams, TaskState, TaskStatus, TaskStatusUpdateEvent};
//! use a2a_server::events::EventQueue;
//! use a2a_server::execution::{AgentExecutor, RequestContext};
//! use a2a_server::tasks::InMemoryTaskStore;
//! use a2a_server::{DefaultRequestHandler, RequestHandler, ServerResult};
//!
//! struct EchoAgent;
//!
//! #[async_trait::async_trait]
//! impl AgentExecutor for EchoAgent {
//!     async fn execute(&self, context: &RequestContext, queue: &EventQueue) -> ServerResult<()> {
//!         let text = context
//!             .message()
//!             .and_then(|m| m.parts.first())
//!             .and_then(|p| p.as_text())
//!             .unwrap_or_default();
//!         queue.enqueue(Message::agent_text(text).into());
//!         Ok(())
//!     }
//!
//!     async fn cancel(&self, context: &RequestContext, queue: &EventQueue) -> ServerResult<()> {
//!         if let Some(task) = context.task() {
//!             let update =
//!                 TaskStatusUpdateEvent::new(task, TaskStatus::new(TaskState::Canceled), true);
//!             queue.enqueue(update.into());
//!         }
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> ServerResult<()> {
//! let handler = DefaultRequestHandler::new(Arc::new(EchoAgent), Arc::new(InMemoryTaskStore::new()));
//! let params = MessageSendParams::new(Message::user_text("hello"));
//! let _result = handler.on_message_send(params).await?;
//! # Ok(())
//! # }
//! ```

pub mod a2a;
pub mod errors;
pub mod events;
pub mod execution;
pub mod handler;
pub mod tasks;

pub use errors::{ProtocolError, ServerError, ServerResult};
pub use handler::{DefaultRequestHandler, EventStream, RequestHandler};
