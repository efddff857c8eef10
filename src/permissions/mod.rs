//! Permission modes, default decisions, and the interactive resolver capability.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::tools::ToolMetadata;

/// Reason given when an `Ask` cannot be put to anyone.
pub const NO_RESOLVER_REASON: &str = "no permission resolver configured";

/// Session-wide policy for authorizing tool execution.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum PermissionMode {
    /// Mutating tools need approval; everything else runs.
    #[default]
    #[serde(rename = "default")]
    #[strum(serialize = "default")]
    Default,
    /// Mutating tools run without approval.
    #[serde(rename = "acceptEdits")]
    #[strum(serialize = "acceptEdits")]
    AcceptEdits,
    #[serde(rename = "bypassPermissions")]
    #[strum(serialize = "bypassPermissions")]
    BypassPermissions,
    /// Nothing executes.
    #[serde(rename = "plan", alias = "planOnly")]
    #[strum(to_string = "plan", serialize = "planOnly")]
    PlanOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Decision {
    Allow,
    Deny,
    Ask,
}

/// An allow/deny/ask verdict with an optional reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDecision {
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PermissionDecision {
    pub fn allow() -> Self {
        Self {
            decision: Decision::Allow,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Deny,
            reason: Some(reason.into()),
        }
    }

    pub fn ask(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Ask,
            reason: Some(reason.into()),
        }
    }

    pub fn is_allow(&self) -> bool {
        self.decision == Decision::Allow
    }

    pub fn is_deny(&self) -> bool {
        self.decision == Decision::Deny
    }

    /// Reason text, or a generic one naming the decision.
    pub fn reason_or_default(&self, tool_name: &str) -> String {
        self.reason
            .clone()
            .unwrap_or_else(|| format!("permission {} for tool '{tool_name}'", self.decision))
    }
}

/// A pending `Ask` put to the interactive resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub session_id: String,
    pub tool_use_id: String,
    pub tool_name: String,
    pub input: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Async resolver turning an `Ask` into `Allow` or `Deny`.
pub type PermissionResolver =
    Arc<dyn Fn(PermissionRequest) -> BoxFuture<'static, PermissionDecision> + Send + Sync>;

/// Per-session authority for default tool decisions.
#[derive(Clone, Default)]
pub struct PermissionController {
    mode: PermissionMode,
    allowed_tools: BTreeSet<String>,
    resolver: Option<PermissionResolver>,
}

impl PermissionController {
    pub fn new(mode: PermissionMode) -> Self {
        Self {
            mode,
            allowed_tools: BTreeSet::new(),
            resolver: None,
        }
    }

    /// Restrict execution to these qualified names. Empty means unrestricted.
    pub fn with_allowed_tools(mut self, allowed: impl IntoIterator<Item = String>) -> Self {
        self.allowed_tools = allowed.into_iter().collect();
        self
    }

    pub fn with_resolver(mut self, resolver: Option<PermissionResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn mode(&self) -> PermissionMode {
        self.mode
    }

    pub fn allowed_tools(&self) -> &BTreeSet<String> {
        &self.allowed_tools
    }

    pub fn has_resolver(&self) -> bool {
        self.resolver.is_some()
    }

    /// Whether the allow list admits the tool.
    pub fn is_allowed(&self, qualified_name: &str) -> bool {
        self.allowed_tools.is_empty() || self.allowed_tools.contains(qualified_name)
    }

    /// Denial for a tool outside the allow list, if it is outside.
    pub fn check_allowed(&self, qualified_name: &str) -> Option<PermissionDecision> {
        (!self.is_allowed(qualified_name)).then(|| {
            PermissionDecision::deny(format!(
                "tool '{qualified_name}' is not in the allowed tools for this session"
            ))
        })
    }

    /// Whether the allow list names the tool explicitly.
    pub fn is_listed(&self, qualified_name: &str) -> bool {
        self.allowed_tools.contains(qualified_name)
    }

    /// Default decision for a tool under the session mode.
    ///
    /// Listing a tool in the allow list pre-approves it, so an `Ask` becomes
    /// `Allow`. Plan mode still denies listed tools.
    pub fn decide(&self, tool: &ToolMetadata) -> PermissionDecision {
        let decision = decide(self.mode, tool);
        if decision.decision == Decision::Ask && self.is_listed(&tool.qualified_name) {
            return PermissionDecision::allow();
        }
        decision
    }

    /// Turn an `Ask` into a final decision; `Allow` and `Deny` pass through.
    pub async fn resolve(
        &self,
        decision: PermissionDecision,
        request: PermissionRequest,
    ) -> PermissionDecision {
        if decision.decision != Decision::Ask {
            return decision;
        }
        let Some(resolver) = &self.resolver else {
            return PermissionDecision::deny(NO_RESOLVER_REASON);
        };
        let tool_name = request.tool_name.clone();
        let resolved = resolver(request).await;
        match resolved.decision {
            Decision::Ask => PermissionDecision::deny(format!(
                "permission request for tool '{tool_name}' was left unresolved"
            )),
            _ => resolved,
        }
    }
}

impl std::fmt::Debug for PermissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionController")
            .field("mode", &self.mode)
            .field("allowed_tools", &self.allowed_tools)
            .field("resolver", &self.resolver.is_some())
            .finish()
    }
}

/// Default decision for `tool` under `mode`.
pub fn decide(mode: PermissionMode, tool: &ToolMetadata) -> PermissionDecision {
    match mode {
        PermissionMode::BypassPermissions => PermissionDecision::allow(),
        PermissionMode::AcceptEdits if tool.mutating => PermissionDecision::allow(),
        PermissionMode::PlanOnly => PermissionDecision::deny(format!(
            "plan mode: tool '{}' was not executed",
            tool.qualified_name
        )),
        PermissionMode::Default | PermissionMode::AcceptEdits => {
            if tool.mutating {
                PermissionDecision::ask(format!(
                    "tool '{}' modifies state and needs approval",
                    tool.qualified_name
                ))
            } else {
                PermissionDecision::allow()
            }
        }
    }
}
