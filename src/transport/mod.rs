//! Model transport capability.
//!
//! The session engine does not run inference. Each model call is delegated to a
//! [`ModelTransport`], which receives the transcript and tool specs and returns
//! the raw wire events of the response.

pub mod scripted;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

pub use scripted::{Script, ScriptStep, ScriptedTransport};

use crate::error::KeelError;
use crate::tools::ToolSpec;
use crate::types::Message;

/// Raw events of one model call, in arrival order.
pub type RawEventStream = BoxStream<'static, Result<serde_json::Value, KeelError>>;

/// Everything the transport needs for one model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub session_id: String,
    /// Complete transcript so far, including the current prompt and any tool results.
    pub transcript: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Zero-based model call index within the current turn.
    pub call_index: usize,
}

/// Produces the raw event stream of a model call.
#[async_trait]
pub trait ModelTransport: Send + Sync {
    async fn stream_events(&self, request: ModelRequest) -> Result<RawEventStream, KeelError>;
}
