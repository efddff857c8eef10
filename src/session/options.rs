//! Session configuration surface.

use std::time::Duration;

use bon::Builder;

use crate::hooks::{HookConfig, DEFAULT_HOOK_TIMEOUT};
use crate::permissions::{PermissionMode, PermissionResolver};
use crate::tools::{McpServer, ToolDefinition};

pub const DEFAULT_MAX_PARALLEL_TOOLS: usize = 8;

/// Time and concurrency bounds for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Builder)]
pub struct SessionLimits {
    /// Per hook invocation.
    #[builder(default = DEFAULT_HOOK_TIMEOUT)]
    pub hook_timeout: Duration,
    /// Per tool handler invocation; unbounded when absent.
    pub tool_timeout: Option<Duration>,
    /// Model calls per submitted prompt; unbounded when absent.
    pub max_turns: Option<usize>,
    #[builder(default = DEFAULT_MAX_PARALLEL_TOOLS)]
    pub max_parallel_tools: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            hook_timeout: DEFAULT_HOOK_TIMEOUT,
            tool_timeout: None,
            max_turns: None,
            max_parallel_tools: DEFAULT_MAX_PARALLEL_TOOLS,
        }
    }
}

/// Everything fixed at session creation.
///
/// ```
/// use keel::{McpServer, PermissionMode, SessionOptions};
///
/// let options = SessionOptions::builder()
///     .permission_mode(PermissionMode::AcceptEdits)
///     .allowed_tools(vec!["mcp__calculator__add".to_string()])
///     .mcp_servers(vec![McpServer::new("calculator", "1.0.0")])
///     .build();
/// assert_eq!(options.permission_mode, PermissionMode::AcceptEdits);
/// ```
#[derive(Clone, Default, Builder)]
pub struct SessionOptions {
    /// Qualified names the session may execute; empty allows all.
    #[builder(default)]
    pub allowed_tools: Vec<String>,
    #[builder(default)]
    pub permission_mode: PermissionMode,
    #[builder(default)]
    pub mcp_servers: Vec<McpServer>,
    /// Tools addressed by bare name.
    #[builder(default)]
    pub builtin_tools: Vec<ToolDefinition>,
    #[builder(default)]
    pub hooks: HookConfig,
    pub permission_resolver: Option<PermissionResolver>,
    #[builder(into)]
    pub system_prompt: Option<String>,
    #[builder(default)]
    pub limits: SessionLimits,
}

impl std::fmt::Debug for SessionOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOptions")
            .field("allowed_tools", &self.allowed_tools)
            .field("permission_mode", &self.permission_mode)
            .field(
                "mcp_servers",
                &self.mcp_servers.iter().map(McpServer::name).collect::<Vec<_>>(),
            )
            .field("builtin_tools", &self.builtin_tools.len())
            .field("hooks", &self.hooks)
            .field("permission_resolver", &self.permission_resolver.is_some())
            .field("system_prompt", &self.system_prompt)
            .field("limits", &self.limits)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let options = SessionOptions::builder().build();

        assert!(options.allowed_tools.is_empty());
        assert_eq!(options.permission_mode, PermissionMode::Default);
        assert_eq!(options.limits, SessionLimits::default());
        assert!(options.system_prompt.is_none());
    }

    #[test]
    fn limits_builder_fills_defaults() {
        let limits = SessionLimits::builder().max_turns(3).build();

        assert_eq!(limits.max_turns, Some(3));
        assert_eq!(limits.max_parallel_tools, DEFAULT_MAX_PARALLEL_TOOLS);
        assert_eq!(limits.hook_timeout, DEFAULT_HOOK_TIMEOUT);
    }
}
