//! The turn loop: model calls, tool batches, and the terminal result.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::audit::AuditEvent;
use super::manager::SessionInner;
use super::state::SessionState;
use crate::error::KeelError;
use crate::hooks::{HookContext, HookInput, PipelineOutcome};
use crate::permissions::{PermissionDecision, PermissionRequest};
use crate::stream::MessageDecoder;
use crate::tools::{ToolContext, ToolMetadata};
use crate::transport::{ModelRequest, RawEventStream};
use crate::types::{
    Message, ResultMessage, ResultStats, ResultSubtype, ToolResultBlock, ToolUseBlock,
};
use crate::util::{catch_panic, with_timeout};

const CLOSED_REASON: &str = "session closed";

/// One submitted prompt, from hooks through the final result.
pub(crate) struct Turn {
    pub(crate) session: Arc<SessionInner>,
    pub(crate) seq: u64,
    pub(crate) tx: mpsc::UnboundedSender<Message>,
    pub(crate) cancel: CancellationToken,
}

#[derive(Debug, Default)]
struct Counters {
    model_calls: usize,
    tool_calls: usize,
    tool_errors: usize,
    usage: Option<serde_json::Value>,
}

enum TurnEnd {
    Completed {
        wire_result: Option<ResultMessage>,
        last_text: Option<String>,
    },
    MaxTurns(usize),
    PromptBlocked(String),
    Failed(KeelError),
    Cancelled,
}

enum Interruption {
    Cancelled,
    Failed(KeelError),
}

/// What one model call produced.
#[derive(Default)]
struct ModelCall {
    tool_uses: Vec<ToolUseBlock>,
    wire_result: Option<ResultMessage>,
    last_text: Option<String>,
    interrupted: Option<Interruption>,
}

/// Feeds transport events into a queue; aborted when dropped.
struct EventReader {
    task: JoinHandle<()>,
}

impl EventReader {
    fn spawn(
        mut events: RawEventStream,
        tx: mpsc::UnboundedSender<Result<serde_json::Value, KeelError>>,
    ) -> Self {
        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if tx.send(event).is_err() {
                    break;
                }
            }
        });
        Self { task }
    }
}

impl Drop for EventReader {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl Turn {
    /// Run the turn; a panic still ends it with an error result.
    pub(crate) async fn supervise(self, prompt: String) {
        let session = Arc::clone(&self.session);
        let (seq, tx, cancel) = (self.seq, self.tx.clone(), self.cancel.clone());
        let started = Instant::now();
        let Err(panic) = catch_panic(self.run(prompt)).await else {
            return;
        };

        cancel.cancel();
        tracing::error!(session_id = %session.id, error = %panic, "turn panicked");
        let stats = ResultStats {
            session_id: session.id.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
            ..ResultStats::default()
        };
        let mut result = ResultMessage::error(stats, format!("turn aborted: {panic}"));
        result.subtype = ResultSubtype::ErrorDuringExecution;
        let message = Message::Result(result);
        session.append(message.clone());
        let _ = tx.send(message);
        session.turn_finished(seq);
    }

    async fn run(self, prompt: String) {
        let started = Instant::now();
        let mut counters = Counters::default();
        let end = self.drive(prompt, &mut counters).await;

        let stats = ResultStats {
            session_id: self.session.id.clone(),
            duration_ms: started.elapsed().as_millis() as u64,
            num_turns: counters.model_calls,
            num_tool_calls: counters.tool_calls,
            num_tool_errors: counters.tool_errors,
            usage: counters.usage.take(),
        };
        let (result, fatal) = match end {
            TurnEnd::Completed {
                wire_result,
                last_text,
            } => {
                let mut result = ResultMessage::success(stats);
                if let Some(wire) = wire_result {
                    result.subtype = wire.subtype;
                    result.result = wire.result;
                    result.error = wire.error;
                }
                if result.result.is_none() {
                    result.result = last_text;
                }
                (result, false)
            }
            TurnEnd::MaxTurns(max) => {
                let mut result =
                    ResultMessage::error(stats, format!("reached max_turns limit of {max}"));
                result.subtype = ResultSubtype::ErrorMaxTurns;
                (result, false)
            }
            TurnEnd::PromptBlocked(reason) => (ResultMessage::error(stats, reason), false),
            TurnEnd::Failed(err) => {
                let fatal = err.is_session_fatal();
                tracing::warn!(
                    session_id = %self.session.id,
                    error = %err,
                    fatal,
                    "turn failed"
                );
                (ResultMessage::error(stats, err.to_string()), fatal)
            }
            TurnEnd::Cancelled => (ResultMessage::error(stats, CLOSED_REASON), false),
        };

        if !self.cancel.is_cancelled() {
            self.run_stop_hooks(result.subtype).await;
        }
        if fatal {
            self.session.set_state(SessionState::Closed);
        }
        tracing::debug!(
            session_id = %self.session.id,
            subtype = %result.subtype,
            num_turns = result.stats.num_turns,
            num_tool_calls = result.stats.num_tool_calls,
            "turn finished"
        );
        self.emit(Message::Result(result));
        self.session.turn_finished(self.seq);
    }

    fn emit(&self, message: Message) {
        self.session.append(message.clone());
        // The consumer may have detached; the transcript still gets every message.
        let _ = self.tx.send(message);
    }

    fn hook_context(&self) -> HookContext {
        HookContext {
            session_id: self.session.id.clone(),
            cancel: self.cancel.clone(),
        }
    }

    async fn drive(&self, prompt: String, counters: &mut Counters) -> TurnEnd {
        let prompt = match self.submit_prompt(prompt).await {
            Ok(prompt) => prompt,
            Err(reason) => return TurnEnd::PromptBlocked(reason),
        };
        if self.cancel.is_cancelled() {
            return TurnEnd::Cancelled;
        }
        self.session.append(Message::user_text(prompt));
        self.session.set_state(SessionState::Streaming);

        let tools = self.session.advertised_tools();
        let mut decoder = MessageDecoder::new();
        let mut last_text = None;
        let mut call_index = 0;
        loop {
            if let Some(max) = self.session.limits.max_turns {
                if call_index >= max {
                    return TurnEnd::MaxTurns(max);
                }
            }
            counters.model_calls += 1;
            let request = ModelRequest {
                session_id: self.session.id.clone(),
                transcript: self.session.transcript_snapshot(),
                tools: tools.clone(),
                system_prompt: self.session.system_prompt.clone(),
                call_index,
            };
            let call = self.read_model_call(request, &mut decoder).await;
            if call.last_text.is_some() {
                last_text = call.last_text;
            }
            if let Some(usage) = call.wire_result.as_ref().and_then(|r| r.stats.usage.clone()) {
                counters.usage = Some(usage);
            }

            if let Some(interruption) = call.interrupted {
                if !call.tool_uses.is_empty() {
                    let results = self.cancel_unrun(&call.tool_uses);
                    counters.tool_calls += results.len();
                    counters.tool_errors += results.len();
                    self.emit(Message::tool_results(results));
                }
                return match interruption {
                    Interruption::Cancelled => TurnEnd::Cancelled,
                    Interruption::Failed(err) => TurnEnd::Failed(err),
                };
            }

            if call.tool_uses.is_empty() {
                return TurnEnd::Completed {
                    wire_result: call.wire_result,
                    last_text,
                };
            }

            let results = self.run_tool_batch(call.tool_uses).await;
            counters.tool_calls += results.len();
            counters.tool_errors += results.iter().filter(|r| r.is_error).count();
            self.emit(Message::tool_results(results));
            if self.cancel.is_cancelled() {
                return TurnEnd::Cancelled;
            }
            call_index += 1;
        }
    }

    /// Run UserPromptSubmit hooks; `Err` carries the denial reason.
    async fn submit_prompt(&self, prompt: String) -> Result<String, String> {
        let input = HookInput::user_prompt_submit(&self.session.id, &prompt);
        let PipelineOutcome {
            decision,
            updated_input,
            audit,
            ..
        } = self
            .session
            .hooks
            .dispatch(input, None, &self.hook_context())
            .await;
        self.session.audit.extend(audit);

        if let Some(denied) = decision.filter(PermissionDecision::is_deny) {
            let reason = denied
                .reason
                .unwrap_or_else(|| "prompt blocked by UserPromptSubmit hook".to_string());
            self.session.audit.record(AuditEvent::PromptBlocked {
                reason: reason.clone(),
            });
            return Err(reason);
        }
        Ok(updated_input
            .and_then(|input| {
                input
                    .get("prompt")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .unwrap_or(prompt))
    }

    async fn read_model_call(&self, request: ModelRequest, decoder: &mut MessageDecoder) -> ModelCall {
        let mut call = ModelCall::default();
        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                call.interrupted = Some(Interruption::Cancelled);
                return call;
            }
            opened = self.session.transport.stream_events(request) => opened,
        };
        let events = match opened {
            Ok(events) => events,
            Err(err) => {
                call.interrupted = Some(Interruption::Failed(err));
                return call;
            }
        };

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let _reader = EventReader::spawn(events, events_tx);
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    call.interrupted = Some(Interruption::Cancelled);
                    break;
                }
                next = events_rx.recv() => next,
            };
            let raw = match next {
                None => break,
                Some(Ok(raw)) => raw,
                Some(Err(err)) => {
                    call.interrupted = Some(Interruption::Failed(err));
                    break;
                }
            };
            match decoder.decode(raw) {
                Err(err) => {
                    call.interrupted = Some(Interruption::Failed(err));
                    break;
                }
                Ok(Message::Result(result)) => {
                    call.wire_result = Some(result);
                    break;
                }
                Ok(message) => {
                    let text = message.text();
                    if !text.is_empty() {
                        call.last_text = Some(text);
                    }
                    call.tool_uses
                        .extend(message.tool_uses().into_iter().cloned());
                    self.emit(message);
                }
            }
        }
        call
    }

    /// Answer tool uses that never got to run.
    fn cancel_unrun(&self, tool_uses: &[ToolUseBlock]) -> Vec<ToolResultBlock> {
        tool_uses
            .iter()
            .map(|tool_use| {
                self.session.audit.record(AuditEvent::ToolCancelled {
                    tool_use_id: tool_use.id.clone(),
                    tool_name: tool_use.name.clone(),
                    reason: "turn ended before the tool ran".to_string(),
                });
                ToolResultBlock::cancelled(&tool_use.id)
            })
            .collect()
    }

    /// Run a batch concurrently; results come back in tool-use order.
    async fn run_tool_batch(&self, tool_uses: Vec<ToolUseBlock>) -> Vec<ToolResultBlock> {
        let permits = Arc::new(Semaphore::new(
            self.session.limits.max_parallel_tools.max(1),
        ));
        let tasks: Vec<(String, JoinHandle<ToolResultBlock>)> = tool_uses
            .into_iter()
            .map(|tool_use| {
                let id = tool_use.id.clone();
                let call = ToolCall {
                    session: Arc::clone(&self.session),
                    tool_use,
                    cancel: self.cancel.child_token(),
                    permits: Arc::clone(&permits),
                };
                (id, tokio::spawn(call.run()))
            })
            .collect();

        let mut results = Vec::with_capacity(tasks.len());
        for (id, task) in tasks {
            let block = match task.await {
                Ok(block) => block,
                Err(err) => {
                    tracing::warn!(
                        session_id = %self.session.id,
                        tool_use_id = %id,
                        error = %err,
                        "tool task failed"
                    );
                    ToolResultBlock::error(id, format!("tool task failed: {err}"))
                }
            };
            results.push(block);
        }
        results
    }

    async fn run_stop_hooks(&self, subtype: ResultSubtype) {
        let input = HookInput::stop(&self.session.id, subtype);
        let outcome = self
            .session
            .hooks
            .dispatch(input, None, &self.hook_context())
            .await;
        self.session.audit.extend(outcome.audit);
    }
}

/// One tool use, executed on its own task.
struct ToolCall {
    session: Arc<SessionInner>,
    tool_use: ToolUseBlock,
    cancel: CancellationToken,
    permits: Arc<Semaphore>,
}

impl ToolCall {
    async fn run(self) -> ToolResultBlock {
        let started = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            block = async {
                let _permit = Arc::clone(&self.permits).acquire_owned().await.ok();
                self.execute().await
            } => Some(block),
        };

        let block = match outcome {
            Some(block) => block,
            None => {
                tracing::debug!(
                    session_id = %self.session.id,
                    tool_use_id = %self.tool_use.id,
                    "tool call cancelled"
                );
                self.session.audit.record(AuditEvent::ToolCancelled {
                    tool_use_id: self.tool_use.id.clone(),
                    tool_name: self.tool_use.name.clone(),
                    reason: CLOSED_REASON.to_string(),
                });
                return ToolResultBlock::cancelled(&self.tool_use.id);
            }
        };
        self.session.audit.record(AuditEvent::ToolCompleted {
            tool_use_id: self.tool_use.id.clone(),
            tool_name: self.tool_use.name.clone(),
            is_error: block.is_error,
            duration_ms: started.elapsed().as_millis() as u64,
        });
        block
    }

    /// Allow list, PreToolUse, permission decision, invoke, PostToolUse.
    async fn execute(&self) -> ToolResultBlock {
        let session = &self.session;
        let ToolUseBlock { id, name, input } = &self.tool_use;
        tracing::debug!(session_id = %session.id, tool_use_id = %id, tool_name = %name, "tool call");

        if let Some(denied) = session.permissions.check_allowed(name) {
            return self.denied(denied);
        }

        let hook_ctx = HookContext {
            session_id: session.id.clone(),
            cancel: self.cancel.clone(),
        };
        let PipelineOutcome {
            decision,
            updated_input,
            failure,
            audit,
            ..
        } = session
            .hooks
            .dispatch(
                HookInput::pre_tool_use(&session.id, name, input.clone()),
                Some(id.as_str()),
                &hook_ctx,
            )
            .await;
        session.audit.extend(audit);
        if let Some(err) = failure {
            let message = format!("PreToolUse hook failed: {err}");
            self.failed(&KeelError::handler(id.clone(), message.clone()));
            return ToolResultBlock::error(id, message);
        }
        let input = updated_input.unwrap_or_else(|| input.clone());

        let decision = match decision {
            Some(decision) if decision.is_deny() => return self.denied(decision),
            Some(decision) => decision,
            None => {
                let metadata = session
                    .registry
                    .metadata(name)
                    .unwrap_or_else(|| ToolMetadata::unknown(name.clone()));
                session.permissions.decide(&metadata)
            }
        };
        let request = PermissionRequest {
            session_id: session.id.clone(),
            tool_use_id: id.clone(),
            tool_name: name.clone(),
            input: input.clone(),
            reason: decision.reason.clone(),
        };
        let decision = session.permissions.resolve(decision, request).await;
        if decision.is_deny() {
            return self.denied(decision);
        }

        let tool_cancel = self.cancel.child_token();
        let ctx = ToolContext {
            tool_use_id: id.clone(),
            tool_name: name.clone(),
            session_id: session.id.clone(),
            cancel: tool_cancel.clone(),
        };
        let invocation = session.registry.invoke(name, input.clone(), ctx);
        let invoked = match session.limits.tool_timeout {
            Some(limit) => {
                let invoked = with_timeout(limit, invocation).await;
                if matches!(invoked, Err(KeelError::Timeout(_))) {
                    tool_cancel.cancel();
                }
                invoked
            }
            None => invocation.await,
        };
        let block = match invoked {
            Ok(block) => block,
            Err(err) => {
                self.failed(&err);
                ToolResultBlock::error(id, err.tool_result_text())
            }
        };

        let response = serde_json::json!({
            "content": block.output,
            "is_error": block.is_error,
        });
        let outcome = session
            .hooks
            .dispatch(
                HookInput::post_tool_use(&session.id, name, input, response),
                Some(id.as_str()),
                &hook_ctx,
            )
            .await;
        session.audit.extend(outcome.audit);
        block
    }

    fn denied(&self, decision: PermissionDecision) -> ToolResultBlock {
        let reason = decision.reason_or_default(&self.tool_use.name);
        tracing::debug!(
            session_id = %self.session.id,
            tool_use_id = %self.tool_use.id,
            tool_name = %self.tool_use.name,
            reason = %reason,
            "tool call denied"
        );
        self.session.audit.record(AuditEvent::ToolDenied {
            tool_use_id: self.tool_use.id.clone(),
            tool_name: self.tool_use.name.clone(),
            reason: reason.clone(),
        });
        let err = KeelError::permission_denied(&self.tool_use.name, reason);
        ToolResultBlock::error(&self.tool_use.id, err.tool_result_text())
    }

    fn failed(&self, err: &KeelError) {
        let event = match err {
            KeelError::Timeout(_) | KeelError::Cancelled => AuditEvent::ToolCancelled {
                tool_use_id: self.tool_use.id.clone(),
                tool_name: self.tool_use.name.clone(),
                reason: err.tool_result_text(),
            },
            _ => AuditEvent::ToolFailed {
                tool_use_id: self.tool_use.id.clone(),
                tool_name: self.tool_use.name.clone(),
                error: err.to_string(),
                cause: std::error::Error::source(err).map(|source| source.to_string()),
            },
        };
        tracing::debug!(
            session_id = %self.session.id,
            tool_use_id = %self.tool_use.id,
            error = %err,
            "tool call failed"
        );
        self.session.audit.record(event);
    }
}
