use serde::{Deserialize, Serialize};

/// Main error type for the A2A server core.
///
/// Variants split into two families: client errors (invalid params, task not
/// found, unsupported operations) that map onto typed A2A protocol errors, and
/// internal errors (executor bugs, empty event streams, queue-registry
/// violations) that are reported to the wire only as a generic internal error
/// carrying the original message.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServerError {
    // === Client errors ===
    #[error("Task not found: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("Task cannot be canceled: {task_id}")]
    TaskNotCancelable { task_id: String },

    #[error("Push notifications are not supported by this server")]
    PushNotificationNotSupported,

    #[error("Unsupported operation: {operation}")]
    UnsupportedOperation { operation: String },

    #[error("Invalid parameters: {message}")]
    InvalidParams { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    // === Internal errors ===
    #[error("Invalid agent response: {message}")]
    InvalidAgentResponse { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    // === Queue management errors (internal-only, never meant for the wire) ===
    #[error("Event queue already exists for task: {task_id}")]
    QueueExists { task_id: String },

    #[error("No event queue exists for task: {task_id}")]
    NoQueue { task_id: String },
}

impl ServerError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// The JSON-RPC error code for this error, per the A2A specification.
    ///
    /// Queue management errors indicate an orchestration bug; they collapse to
    /// the generic internal code rather than leaking their own taxonomy.
    pub fn error_code(&self) -> i32 {
        match self {
            Self::TaskNotFound { .. } => -32001,
            Self::TaskNotCancelable { .. } => -32002,
            Self::PushNotificationNotSupported => -32003,
            Self::UnsupportedOperation { .. } => -32004,
            Self::InvalidAgentResponse { .. } => -32006,
            Self::InvalidParams { .. } => -32602,
            Self::InvalidRequest { .. } => -32600,
            Self::Internal { .. } | Self::QueueExists { .. } | Self::NoQueue { .. } => -32603,
        }
    }

    /// Whether this error is the caller's fault (returned as a typed protocol
    /// error) rather than a server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::TaskNotFound { .. }
                | Self::TaskNotCancelable { .. }
                | Self::PushNotificationNotSupported
                | Self::UnsupportedOperation { .. }
                | Self::InvalidParams { .. }
                | Self::InvalidRequest { .. }
        )
    }

    /// Build the wire-facing payload. Internal variants keep their message but
    /// nothing else; no stack traces or queue-registry details cross this
    /// boundary.
    pub fn to_protocol_error(&self) -> ProtocolError {
        let message = match self {
            Self::QueueExists { .. } | Self::NoQueue { .. } => "Internal error".to_string(),
            other => other.to_string(),
        };
        ProtocolError {
            code: self.error_code(),
            message,
            data: None,
        }
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(error: serde_json::Error) -> Self {
        ServerError::Internal {
            message: format!("serialization error: {error}"),
        }
    }
}

/// JSON-RPC error object as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProtocolError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Convenience alias used throughout the crate.
pub type ServerResult<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = ServerError::TaskNotFound {
            task_id: "t1".to_string(),
        };
        assert_eq!(err.error_code(), -32001);
        assert!(err.is_client_error());

        let err = ServerError::internal("boom");
        assert_eq!(err.error_code(), -32603);
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_queue_errors_do_not_leak() {
        let err = ServerError::QueueExists {
            task_id: "t1".to_string(),
        };
        assert!(!err.is_client_error());
        let wire = err.to_protocol_error();
        assert_eq!(wire.code, -32603);
        assert_eq!(wire.message, "Internal error");

        let err = ServerError::NoQueue {
            task_id: "t1".to_string(),
        };
        assert_eq!(err.to_protocol_error().message, "Internal error");
    }

    #[test]
    fn test_internal_error_keeps_message() {
        let err = ServerError::internal("executor panicked");
        let wire = err.to_protocol_error();
        assert_eq!(wire.code, -32603);
        assert!(wire.message.contains("executor panicked"));
    }
}
