//! The protocol-facing request surface: the [`RequestHandler`] trait a
//! transport calls into, and [`DefaultRequestHandler`], the orchestration
//! core wiring executor, queues, stores and push notifications together.

mod default_request_handler;
mod request_handler;

pub use default_request_handler::DefaultRequestHandler;
pub use request_handler::{EventStream, RequestHandler};
