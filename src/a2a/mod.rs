//! A2A protocol data model.
//!
//! Wire types from the A2A specification, limited to what the server core
//! needs: tasks, messages, streaming update events, and the parameter/result
//! shapes of the task-facing protocol operations. Discovery (agent card) and
//! security scheme types are out of scope.

mod types;

pub use types::*;
