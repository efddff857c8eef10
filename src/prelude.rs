//! Convenience re-exports for common use.

pub use crate::error::{KeelError, Result};
pub use crate::hooks::{hook_fn, HookConfig, HookEvent, HookInput, HookMatcherConfig, HookOutput};
pub use crate::permissions::{PermissionDecision, PermissionMode, PermissionRequest};
pub use crate::session::{Session, SessionManager, SessionOptions, SessionState};
pub use crate::stream::MessageStream;
pub use crate::tools::{McpServer, ToolArguments, ToolContext, ToolDefinition, ToolOutput};
pub use crate::transport::ModelTransport;
pub use crate::types::{ContentBlock, Message, ResultMessage, ToolResultBlock, ToolUseBlock};
