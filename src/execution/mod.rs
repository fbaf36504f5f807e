//! The seam between the orchestration core and the embedding application:
//! the [`AgentExecutor`] trait the application implements, and the
//! [`RequestContext`] handed to it per invocation.

mod agent_executor;
mod request_context;

pub use agent_executor::AgentExecutor;
pub use request_context::{RequestContext, RequestContextBuilder};
