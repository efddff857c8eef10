//! Transport that replays canned model calls.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ModelRequest, ModelTransport, RawEventStream};
use crate::error::KeelError;

/// One step of a scripted model call.
///
/// In a script file a step is either a wire event or one of the control
/// objects `{"delay_ms": n}`, `{"transport_error": "..."}`, `{"pending": true}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScriptStep {
    Delay { delay_ms: u64 },
    Fail { transport_error: String },
    /// Stall forever; the call only ends by cancellation.
    Pending { pending: bool },
    Event(serde_json::Value),
}

impl ScriptStep {
    pub fn event(value: serde_json::Value) -> Self {
        Self::Event(value)
    }

    pub fn delay(ms: u64) -> Self {
        Self::Delay { delay_ms: ms }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail {
            transport_error: message.into(),
        }
    }

    pub fn pending() -> Self {
        Self::Pending { pending: true }
    }
}

/// A script file: one list of steps per model call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub calls: Vec<Vec<ScriptStep>>,
}

impl Script {
    pub fn from_json(raw: &str) -> Result<Self, KeelError> {
        serde_json::from_str(raw)
            .map_err(|e| KeelError::Configuration(format!("invalid script: {e}")))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, KeelError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }
}

/// Replays one scripted call per model request and records every request.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    calls: Mutex<VecDeque<Vec<ScriptStep>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedTransport {
    pub fn new(calls: impl IntoIterator<Item = Vec<ScriptStep>>) -> Self {
        Self {
            calls: Mutex::new(calls.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn from_script(script: Script) -> Self {
        Self::new(script.calls)
    }

    /// Queue another call.
    pub fn push_call(&self, steps: Vec<ScriptStep>) {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(steps);
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Calls not yet consumed.
    pub fn remaining(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[async_trait]
impl ModelTransport for ScriptedTransport {
    async fn stream_events(&self, request: ModelRequest) -> Result<RawEventStream, KeelError> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request);
        let steps = self
            .calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .ok_or_else(|| KeelError::Transport("script exhausted".to_string()))?;

        let stream = async_stream::stream! {
            for step in steps {
                match step {
                    ScriptStep::Delay { delay_ms } => {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                    ScriptStep::Fail { transport_error } => {
                        yield Err(KeelError::Transport(transport_error));
                        break;
                    }
                    ScriptStep::Pending { .. } => {
                        std::future::pending::<()>().await;
                    }
                    ScriptStep::Event(value) => yield Ok(value),
                }
            }
        };
        Ok(Box::pin(stream))
    }
}
