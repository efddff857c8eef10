//! Error classification and propagation policy.

use serde::{Deserialize, Serialize};

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Tool lookup and argument validation.
    Validation,
    /// Denied by a hook, the permission mode, or the allow list.
    Permission,
    /// A tool or hook handler failed.
    Handler,
    /// Timed out or cancelled.
    Interrupted,
    /// The session is closed or not in a state that allows the operation.
    Session,
    /// Malformed events from the model transport.
    Protocol,
    /// The model transport itself failed.
    Transport,
    Configuration,
    Io,
    Serialization,
}

/// Where an error is absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Propagation {
    /// Surfaced to the model as an `is_error` tool result; the turn continues.
    ToolCall,
    /// Ends the current turn with an error result; the session stays usable.
    Turn,
    /// Ends the turn and closes the session.
    SessionFatal,
    /// Returned directly to the caller of a session operation.
    Caller,
}
