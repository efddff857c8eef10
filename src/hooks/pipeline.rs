//! Ordered, short-circuiting hook dispatch.

use std::collections::BTreeMap;
use std::time::Duration;

use super::matcher::HookMatcher;
use super::types::{HookContext, HookEvent, HookFn, HookInput, HookOutput};
use crate::error::KeelError;
use crate::permissions::{Decision, PermissionDecision};
use crate::session::audit::AuditEvent;
use crate::util::catch_panic;

pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(60);

/// One registered hook.
#[derive(Clone)]
pub struct HookRegistration {
    pub event: HookEvent,
    pub matcher: HookMatcher,
    pub handler: HookFn,
    /// Position in the pipeline; hooks run in ascending order.
    pub order: usize,
    /// Overrides the pipeline default.
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for HookRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistration")
            .field("event", &self.event)
            .field("matcher", &self.matcher)
            .field("order", &self.order)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Configuration-surface grouping: one matcher over an ordered list of hooks.
#[derive(Clone, Default)]
pub struct HookMatcherConfig {
    pub matcher: Option<String>,
    pub hooks: Vec<HookFn>,
    pub timeout: Option<Duration>,
}

impl HookMatcherConfig {
    /// Hooks that apply to every tool.
    pub fn new(hooks: Vec<HookFn>) -> Self {
        Self {
            matcher: None,
            hooks,
            timeout: None,
        }
    }

    pub fn matching(matcher: impl Into<String>, hooks: Vec<HookFn>) -> Self {
        Self {
            matcher: Some(matcher.into()),
            hooks,
            timeout: None,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl std::fmt::Debug for HookMatcherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookMatcherConfig")
            .field("matcher", &self.matcher)
            .field("hooks", &self.hooks.len())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Event to ordered matcher groups, as accepted at session creation.
pub type HookConfig = BTreeMap<HookEvent, Vec<HookMatcherConfig>>;

/// Result of dispatching one event.
#[derive(Debug, Default)]
pub struct PipelineOutcome {
    /// The Deny that stopped dispatch, else the last explicit Allow or Ask.
    pub decision: Option<PermissionDecision>,
    /// Input as rewritten by the hooks, if any hook rewrote it.
    pub updated_input: Option<serde_json::Map<String, serde_json::Value>>,
    /// A PreToolUse handler failure; aborts the tool call.
    pub failure: Option<KeelError>,
    pub audit: Vec<AuditEvent>,
    pub hooks_run: usize,
}

impl PipelineOutcome {
    pub fn denied(&self) -> bool {
        self.decision.as_ref().is_some_and(|d| d.is_deny())
    }
}

/// A session's hook snapshot.
#[derive(Clone, Debug)]
pub struct HookPipeline {
    registrations: Vec<HookRegistration>,
    next_order: usize,
    default_timeout: Duration,
}

impl Default for HookPipeline {
    fn default() -> Self {
        Self::new(DEFAULT_HOOK_TIMEOUT)
    }
}

impl HookPipeline {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            registrations: Vec::new(),
            next_order: 0,
            default_timeout,
        }
    }

    /// Register every hook of a configuration surface, event by event.
    pub fn from_config(config: &HookConfig, default_timeout: Duration) -> Result<Self, KeelError> {
        let mut pipeline = Self::new(default_timeout);
        for (event, groups) in config {
            for group in groups {
                for hook in &group.hooks {
                    pipeline.register_with_timeout(
                        *event,
                        group.matcher.as_deref(),
                        hook.clone(),
                        group.timeout,
                    )?;
                }
            }
        }
        Ok(pipeline)
    }

    /// Append a hook; returns its order.
    pub fn register(
        &mut self,
        event: HookEvent,
        matcher: Option<&str>,
        handler: HookFn,
    ) -> Result<usize, KeelError> {
        self.register_with_timeout(event, matcher, handler, None)
    }

    pub fn register_with_timeout(
        &mut self,
        event: HookEvent,
        matcher: Option<&str>,
        handler: HookFn,
        timeout: Option<Duration>,
    ) -> Result<usize, KeelError> {
        let matcher = HookMatcher::parse(matcher)?;
        let order = self.next_order;
        self.next_order += 1;
        self.registrations.push(HookRegistration {
            event,
            matcher,
            handler,
            order,
            timeout,
        });
        Ok(order)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Hooks that fire for `event` on `tool_name`, in order.
    pub fn matching<'a>(
        &'a self,
        event: HookEvent,
        tool_name: Option<&'a str>,
    ) -> impl Iterator<Item = &'a HookRegistration> + 'a {
        self.registrations.iter().filter(move |reg| {
            reg.event == event
                && (!event.is_tool_event()
                    || tool_name.map_or(true, |name| reg.matcher.matches(name)))
        })
    }

    /// Run the matching hooks for one event.
    ///
    /// Decisions are honoured for `PreToolUse` and `UserPromptSubmit`; other
    /// events are audit-only. A timed-out hook counts as no opinion; a
    /// panicking hook is treated like one that returned an error.
    pub async fn dispatch(
        &self,
        mut input: HookInput,
        tool_use_id: Option<&str>,
        ctx: &HookContext,
    ) -> PipelineOutcome {
        let event = input.hook_event_name;
        let tool_name = input.tool_name.clone();
        let honours_decisions = matches!(event, HookEvent::PreToolUse | HookEvent::UserPromptSubmit);
        let mut outcome = PipelineOutcome::default();
        let tool_use_id = tool_use_id.map(str::to_string);

        for reg in self.matching(event, tool_name.as_deref()) {
            let timeout = reg.timeout.unwrap_or(self.default_timeout);
            let handler = &reg.handler;
            let call = catch_panic(async {
                handler(input.clone(), tool_use_id.clone(), ctx.clone()).await
            });
            outcome.hooks_run += 1;

            let returned = match tokio::time::timeout(timeout, call).await {
                Ok(Ok(returned)) => returned,
                Ok(Err(panic)) => Err(KeelError::handler(
                    tool_use_id.clone().unwrap_or_default(),
                    format!("{event} hook panicked: {panic}"),
                )),
                Err(_) => {
                    tracing::warn!(
                        session_id = %ctx.session_id,
                        event = %event,
                        order = reg.order,
                        timeout_ms = timeout.as_millis() as u64,
                        "hook timed out"
                    );
                    outcome.audit.push(AuditEvent::HookTimedOut {
                        event,
                        order: reg.order,
                        tool_use_id: tool_use_id.clone(),
                        timeout_ms: timeout.as_millis() as u64,
                    });
                    continue;
                }
            };

            let output = match returned {
                Ok(output) => output,
                Err(err) => {
                    tracing::warn!(
                        session_id = %ctx.session_id,
                        event = %event,
                        order = reg.order,
                        error = %err,
                        "hook failed"
                    );
                    outcome.audit.push(AuditEvent::HookFailed {
                        event,
                        order: reg.order,
                        tool_use_id: tool_use_id.clone(),
                        error: err.to_string(),
                    });
                    if event == HookEvent::PreToolUse {
                        outcome.failure = Some(err);
                        return outcome;
                    }
                    continue;
                }
            };

            if !honours_decisions {
                outcome.audit.push(AuditEvent::HookOutput {
                    event,
                    order: reg.order,
                    tool_use_id: tool_use_id.clone(),
                    output: serde_json::to_value(&output).unwrap_or_default(),
                });
                continue;
            }

            if let Some(updated) = output.updated_input.clone() {
                apply_update(&mut input, &updated);
                outcome.updated_input = Some(updated);
            }

            if let Some(decision) = output.decision() {
                tracing::debug!(
                    session_id = %ctx.session_id,
                    event = %event,
                    order = reg.order,
                    decision = %decision.decision,
                    "hook decision"
                );
                let deny = decision.decision == Decision::Deny;
                outcome.decision = Some(decision);
                if deny {
                    break;
                }
            }
        }
        outcome
    }
}

fn apply_update(input: &mut HookInput, updated: &serde_json::Map<String, serde_json::Value>) {
    match input.hook_event_name {
        HookEvent::UserPromptSubmit => {
            if let Some(prompt) = updated.get("prompt").and_then(|v| v.as_str()) {
                input.prompt = Some(prompt.to_string());
            }
        }
        _ => input.tool_input = Some(updated.clone()),
    }
}

/// Shorthand for an output that only rewrites the prompt.
pub fn rewrite_prompt(prompt: impl Into<String>) -> HookOutput {
    let mut updated = serde_json::Map::new();
    updated.insert("prompt".to_string(), serde_json::Value::String(prompt.into()));
    HookOutput::none().with_updated_input(updated)
}
