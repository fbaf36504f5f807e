use async_trait::async_trait;

use super::RequestContext;
use crate::errors::ServerResult;
use crate::events::EventQueue;

/// The agent's business logic, supplied by the embedding application.
///
/// `execute` runs concurrently with the request handler's consumer loop and
/// reports progress solely by enqueueing events; an `Err` return is turned
/// into an error event by the core. Implementations signal completion with a
/// final event (terminal status update, task snapshot, or bare message); the
/// core closes the queue once `execute` returns.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    /// Run the work described by `context`, writing progress into `queue`.
    async fn execute(&self, context: &RequestContext, queue: &EventQueue) -> ServerResult<()>;

    /// Request cancellation of an in-flight task. Cancellation is
    /// cooperative: a conforming implementation emits a `canceled` terminal
    /// status event; one that cannot cancel returns
    /// [`ServerError::UnsupportedOperation`](crate::ServerError::UnsupportedOperation).
    async fn cancel(&self, context: &RequestContext, queue: &EventQueue) -> ServerResult<()>;
}
