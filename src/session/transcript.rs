//! Append-only conversation transcript.

use std::collections::HashSet;

use crate::types::{Message, ResultMessage};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_result(&self) -> Option<&ResultMessage> {
        self.messages.iter().rev().find_map(Message::as_result)
    }

    /// Tool-use ids that have no matching tool result yet, in order of appearance.
    pub fn unanswered_tool_uses(&self) -> Vec<String> {
        let answered: HashSet<&str> = self
            .messages
            .iter()
            .flat_map(Message::tool_results_iter)
            .map(|result| result.tool_use_id.as_str())
            .collect();
        self.messages
            .iter()
            .flat_map(Message::tool_uses)
            .filter(|tool_use| !answered.contains(tool_use.id.as_str()))
            .map(|tool_use| tool_use.id.clone())
            .collect()
    }

    /// Tool results whose id matches no earlier tool use.
    pub fn orphan_tool_results(&self) -> Vec<String> {
        let mut requested = HashSet::new();
        let mut orphans = Vec::new();
        for message in &self.messages {
            for tool_use in message.tool_uses() {
                requested.insert(tool_use.id.as_str());
            }
            for result in message.tool_results_iter() {
                if !requested.contains(result.tool_use_id.as_str()) {
                    orphans.push(result.tool_use_id.clone());
                }
            }
        }
        orphans
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}
