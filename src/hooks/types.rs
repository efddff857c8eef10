//! Hook events, payloads, and handler signature.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio_util::sync::CancellationToken;

use crate::error::KeelError;
use crate::permissions::{Decision, PermissionDecision};
use crate::types::ResultSubtype;

/// Lifecycle point at which hooks fire.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
pub enum HookEvent {
    PreToolUse,
    PostToolUse,
    UserPromptSubmit,
    Stop,
}

impl HookEvent {
    /// Whether matchers apply to this event.
    pub fn is_tool_event(self) -> bool {
        matches!(self, Self::PreToolUse | Self::PostToolUse)
    }
}

/// Payload handed to a hook handler.
///
/// Serializes to the input mapping: `hook_event_name`, `session_id`, and
/// whichever of the tool, prompt, or result keys the event carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookInput {
    pub hook_event_name: HookEvent,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_response: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_subtype: Option<ResultSubtype>,
}

impl HookInput {
    fn bare(event: HookEvent, session_id: &str) -> Self {
        Self {
            hook_event_name: event,
            session_id: session_id.to_string(),
            tool_name: None,
            tool_input: None,
            tool_response: None,
            prompt: None,
            result_subtype: None,
        }
    }

    pub fn pre_tool_use(
        session_id: &str,
        tool_name: &str,
        tool_input: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            tool_name: Some(tool_name.to_string()),
            tool_input: Some(tool_input),
            ..Self::bare(HookEvent::PreToolUse, session_id)
        }
    }

    pub fn post_tool_use(
        session_id: &str,
        tool_name: &str,
        tool_input: serde_json::Map<String, serde_json::Value>,
        tool_response: serde_json::Value,
    ) -> Self {
        Self {
            tool_name: Some(tool_name.to_string()),
            tool_input: Some(tool_input),
            tool_response: Some(tool_response),
            ..Self::bare(HookEvent::PostToolUse, session_id)
        }
    }

    pub fn user_prompt_submit(session_id: &str, prompt: &str) -> Self {
        Self {
            prompt: Some(prompt.to_string()),
            ..Self::bare(HookEvent::UserPromptSubmit, session_id)
        }
    }

    pub fn stop(session_id: &str, result_subtype: ResultSubtype) -> Self {
        Self {
            result_subtype: Some(result_subtype),
            ..Self::bare(HookEvent::Stop, session_id)
        }
    }

    /// The input as a JSON mapping.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// A string field of `tool_input`.
    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.tool_input
            .as_ref()
            .and_then(|input| input.get(key))
            .and_then(|v| v.as_str())
    }
}

/// What a hook handler returns. All keys are optional; an empty output means no opinion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_decision: Option<Decision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission_decision_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_input: Option<serde_json::Map<String, serde_json::Value>>,
}

impl HookOutput {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn allow() -> Self {
        Self {
            permission_decision: Some(Decision::Allow),
            ..Self::default()
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            permission_decision: Some(Decision::Deny),
            permission_decision_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn ask(reason: impl Into<String>) -> Self {
        Self {
            permission_decision: Some(Decision::Ask),
            permission_decision_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn with_updated_input(mut self, input: serde_json::Map<String, serde_json::Value>) -> Self {
        self.updated_input = Some(input);
        self
    }

    /// Parse a raw handler mapping; `null` is an empty output.
    pub fn from_value(value: serde_json::Value) -> Result<Self, KeelError> {
        if value.is_null() {
            return Ok(Self::none());
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn is_empty(&self) -> bool {
        self.permission_decision.is_none() && self.updated_input.is_none()
    }

    pub fn decision(&self) -> Option<PermissionDecision> {
        self.permission_decision.map(|decision| PermissionDecision {
            decision,
            reason: self.permission_decision_reason.clone(),
        })
    }
}

/// Context handed to every hook call.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    pub session_id: String,
    /// Fires when the session's current turn is cancelled.
    pub cancel: CancellationToken,
}

/// Hook handler: `(input, tool_use_id, context) -> output`.
pub type HookFn = Arc<
    dyn Fn(
            HookInput,
            Option<String>,
            HookContext,
        ) -> Pin<Box<dyn Future<Output = Result<HookOutput, KeelError>> + Send>>
        + Send
        + Sync,
>;

/// Wrap an async closure as a [`HookFn`].
pub fn hook_fn<F, Fut>(f: F) -> HookFn
where
    F: Fn(HookInput, Option<String>, HookContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HookOutput, KeelError>> + Send + 'static,
{
    Arc::new(move |input, tool_use_id, ctx| Box::pin(f(input, tool_use_id, ctx)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_uses_camel_case_keys() {
        let value = serde_json::to_value(HookOutput::deny("blocked")).expect("encode");

        assert_eq!(
            value,
            json!({"permissionDecision": "deny", "permissionDecisionReason": "blocked"})
        );
    }

    #[test]
    fn output_parses_raw_mapping() {
        let output = HookOutput::from_value(json!({
            "permissionDecision": "ask",
            "updatedInput": {"command": "ls"},
            "somethingElse": 1,
        }))
        .expect("parse");

        let decision = output.decision().expect("decision");
        assert_eq!(decision.decision, Decision::Ask);
        assert_eq!(output.updated_input.expect("input")["command"], json!("ls"));
        assert!(HookOutput::from_value(serde_json::Value::Null)
            .expect("null")
            .is_empty());
    }

    #[test]
    fn input_serializes_only_relevant_keys() {
        let input = HookInput::user_prompt_submit("s1", "hello");

        let value = input.to_value();

        assert_eq!(value["hook_event_name"], json!("UserPromptSubmit"));
        assert_eq!(value["prompt"], json!("hello"));
        assert!(value.get("tool_name").is_none());
    }
}
