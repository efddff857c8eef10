//! Per-turn decoding of transport events into messages.

use std::collections::HashSet;

use serde_json::Value;

use super::wire;
use crate::error::KeelError;
use crate::types::{ContentBlock, Message};

/// Decodes raw transport events for one turn.
///
/// On top of envelope parsing, tracks tool-use ids so a duplicate within the
/// turn is a protocol error, and refuses content the session itself owns
/// (user envelopes and tool results).
#[derive(Debug, Default)]
pub struct MessageDecoder {
    seen_tool_use_ids: HashSet<String>,
    events: usize,
}

impl MessageDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events decoded so far.
    pub fn events(&self) -> usize {
        self.events
    }

    pub fn decode(&mut self, raw: Value) -> Result<Message, KeelError> {
        let message = wire::decode(raw)?;
        match &message {
            Message::User(_) => {
                return Err(KeelError::ProtocolDecode(
                    "transport sent a user envelope; user content originates from the session"
                        .to_string(),
                ))
            }
            Message::Assistant(assistant) => {
                for block in &assistant.content {
                    match block {
                        ContentBlock::Text { .. } => {}
                        ContentBlock::ToolUse(tool_use) => {
                            if tool_use.id.is_empty() {
                                return Err(KeelError::ProtocolDecode(
                                    "tool_use block has an empty id".to_string(),
                                ));
                            }
                            if tool_use.name.is_empty() {
                                return Err(KeelError::ProtocolDecode(format!(
                                    "tool_use block '{}' has an empty name",
                                    tool_use.id
                                )));
                            }
                            if !self.seen_tool_use_ids.insert(tool_use.id.clone()) {
                                return Err(KeelError::ProtocolDecode(format!(
                                    "duplicate tool_use id '{}'",
                                    tool_use.id
                                )));
                            }
                        }
                        ContentBlock::ToolResult(result) => {
                            return Err(KeelError::ProtocolDecode(format!(
                                "assistant envelope carries a tool_result for '{}'",
                                result.tool_use_id
                            )))
                        }
                    }
                }
            }
            Message::Result(_) => {}
        }
        self.events += 1;
        Ok(message)
    }
}
