//! Error types for keel.

pub mod unified;

pub use unified::{ErrorCategory, Propagation};

use thiserror::Error;

/// Primary error type for all keel operations.
#[derive(Error, Debug)]
pub enum KeelError {
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Schema validation error: {0}")]
    SchemaValidation(String),

    #[error("Permission denied for {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Handler error (tool_use_id {tool_use_id}): {message}")]
    HandlerError {
        tool_use_id: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Timeout after {0}ms")]
    Timeout(u64),

    #[error("cancelled")]
    Cancelled,

    #[error("Session closed")]
    SessionClosed,

    #[error("Protocol decode error: {0}")]
    ProtocolDecode(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl KeelError {
    /// Wrap a handler failure, keeping the originating tool use id.
    pub fn handler(tool_use_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HandlerError {
            tool_use_id: tool_use_id.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Wrap a handler failure with its underlying cause.
    pub fn handler_with_source(
        tool_use_id: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::HandlerError {
            tool_use_id: tool_use_id.into(),
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    pub fn permission_denied(tool_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PermissionDenied {
            tool_name: tool_name.into(),
            reason: reason.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ToolNotFound(_) | Self::SchemaValidation(_) | Self::InvalidArgument(_) => {
                ErrorCategory::Validation
            }
            Self::PermissionDenied { .. } => ErrorCategory::Permission,
            Self::HandlerError { .. } => ErrorCategory::Handler,
            Self::Timeout(_) | Self::Cancelled => ErrorCategory::Interrupted,
            Self::SessionClosed | Self::InvalidState(_) => ErrorCategory::Session,
            Self::ProtocolDecode(_) => ErrorCategory::Protocol,
            Self::Transport(_) => ErrorCategory::Transport,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Io(_) => ErrorCategory::Io,
            Self::Serialization(_) => ErrorCategory::Serialization,
        }
    }

    /// Where this error is absorbed when it arises inside a turn.
    pub fn propagation(&self) -> Propagation {
        match self.category() {
            ErrorCategory::Validation
            | ErrorCategory::Permission
            | ErrorCategory::Handler
            | ErrorCategory::Interrupted => Propagation::ToolCall,
            ErrorCategory::Protocol => Propagation::SessionFatal,
            ErrorCategory::Session => match self {
                Self::SessionClosed => Propagation::SessionFatal,
                _ => Propagation::Caller,
            },
            ErrorCategory::Transport => Propagation::Turn,
            ErrorCategory::Configuration | ErrorCategory::Io | ErrorCategory::Serialization => {
                Propagation::Caller
            }
        }
    }

    /// Whether the error can be recovered at the tool-call boundary.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.propagation(), Propagation::ToolCall)
    }

    /// Whether the error forces the session closed.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self.propagation(), Propagation::SessionFatal)
    }

    /// Text reported to the model in an `is_error` tool result.
    pub fn tool_result_text(&self) -> String {
        match self {
            Self::PermissionDenied { reason, .. } => reason.clone(),
            Self::Cancelled => "cancelled".to_string(),
            Self::Timeout(ms) => format!("cancelled: timed out after {ms}ms"),
            Self::HandlerError { message, .. } => format!("tool handler failed: {message}"),
            other => other.to_string(),
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, KeelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_errors_are_recoverable() {
        let errors = [
            KeelError::ToolNotFound("mcp__calc__sub".into()),
            KeelError::SchemaValidation("missing required field 'a'".into()),
            KeelError::permission_denied("Write", "blocked"),
            KeelError::handler("toolu_1", "boom"),
            KeelError::Timeout(50),
            KeelError::Cancelled,
        ];
        for err in errors {
            assert!(err.is_recoverable(), "expected recoverable: {err}");
            assert!(!err.is_session_fatal());
        }
    }

    #[test]
    fn protocol_and_closed_are_session_fatal() {
        assert!(KeelError::ProtocolDecode("bad".into()).is_session_fatal());
        assert!(KeelError::SessionClosed.is_session_fatal());
        assert!(!KeelError::InvalidState("busy".into()).is_session_fatal());
    }

    #[test]
    fn transport_failure_ends_only_the_turn() {
        let err = KeelError::Transport("connection reset".into());
        assert_eq!(err.propagation(), Propagation::Turn);
        assert_eq!(err.category(), ErrorCategory::Transport);
    }

    #[test]
    fn cancelled_tool_result_text_is_bare() {
        assert_eq!(KeelError::Cancelled.tool_result_text(), "cancelled");
        assert!(KeelError::Timeout(250)
            .tool_result_text()
            .starts_with("cancelled"));
    }

    #[test]
    fn denial_reports_only_the_reason() {
        let err = KeelError::permission_denied("Write", ".env files are off limits");
        assert_eq!(err.tool_result_text(), ".env files are off limits");
        let msg = err.to_string();
        assert!(msg.contains("Write"), "expected tool name in message: {msg}");
    }

    #[test]
    fn handler_error_keeps_tool_use_id_and_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = KeelError::handler_with_source("toolu_9", io);
        match &err {
            KeelError::HandlerError {
                tool_use_id,
                source,
                ..
            } => {
                assert_eq!(tool_use_id, "toolu_9");
                assert!(source.is_some());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.tool_result_text().contains("disk full"));
    }
}
