//! Conversation messages and content blocks.
//!
//! The serde representation of these types is the wire envelope consumed from
//! the model transport: `{"type": "user" | "assistant" | "result", ...}`.

use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};

/// A single unit of conversation, as stored in a session transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    User(UserMessage),
    Assistant(AssistantMessage),
    Result(ResultMessage),
}

impl Message {
    /// A user prompt consisting of one text block.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::User(UserMessage::text(text))
    }

    /// An assistant message with the given blocks.
    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self::Assistant(AssistantMessage {
            content,
            model: None,
        })
    }

    /// A user message carrying tool results.
    pub fn tool_results(results: Vec<ToolResultBlock>) -> Self {
        Self::User(UserMessage {
            content: results.into_iter().map(ContentBlock::ToolResult).collect(),
        })
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Self::User(_) => MessageKind::User,
            Self::Assistant(_) => MessageKind::Assistant,
            Self::Result(_) => MessageKind::Result,
        }
    }

    /// Content blocks of user and assistant messages (empty for results).
    pub fn content(&self) -> &[ContentBlock] {
        match self {
            Self::User(user) => &user.content,
            Self::Assistant(assistant) => &assistant.content,
            Self::Result(_) => &[],
        }
    }

    /// Concatenated text blocks.
    pub fn text(&self) -> String {
        match self {
            Self::Result(result) => result.result.clone().unwrap_or_default(),
            _ => self
                .content()
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    pub fn tool_uses(&self) -> Vec<&ToolUseBlock> {
        self.content()
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse(tool_use) => Some(tool_use),
                _ => None,
            })
            .collect()
    }

    pub fn tool_results_iter(&self) -> impl Iterator<Item = &ToolResultBlock> {
        self.content().iter().filter_map(|block| match block {
            ContentBlock::ToolResult(result) => Some(result),
            _ => None,
        })
    }

    pub fn as_result(&self) -> Option<&ResultMessage> {
        match self {
            Self::Result(result) => Some(result),
            _ => None,
        }
    }
}

/// Discriminant of [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageKind {
    User,
    Assistant,
    Result,
}

/// User-side message: a prompt or a batch of tool results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserMessage {
    #[serde(deserialize_with = "deserialize_user_content")]
    pub content: Vec<ContentBlock>,
}

impl UserMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }
}

/// Model output for one step of a turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantMessage {
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Terminal event of a turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultMessage {
    pub subtype: ResultSubtype,
    #[serde(flatten)]
    pub stats: ResultStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResultMessage {
    pub fn success(stats: ResultStats) -> Self {
        Self {
            subtype: ResultSubtype::Success,
            stats,
            result: None,
            error: None,
        }
    }

    pub fn error(stats: ResultStats, error: impl Into<String>) -> Self {
        Self {
            subtype: ResultSubtype::Error,
            stats,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self.subtype, ResultSubtype::Success)
    }
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResultSubtype {
    Success,
    Error,
    ErrorMaxTurns,
    ErrorDuringExecution,
}

/// Execution statistics reported with a [`ResultMessage`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResultStats {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub num_turns: usize,
    #[serde(default)]
    pub num_tool_calls: usize,
    #[serde(default)]
    pub num_tool_errors: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<serde_json::Value>,
}

/// A single part of message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse(ToolUseBlock),
    ToolResult(ToolResultBlock),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: serde_json::Map<String, serde_json::Value>,
}

impl ToolUseBlock {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        input: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
        }
    }
}

/// The outcome of one tool invocation, correlated by `tool_use_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    #[serde(rename = "content", deserialize_with = "deserialize_tool_result_content")]
    pub output: String,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResultBlock {
    pub fn success(tool_use_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(tool_use_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_use_id: tool_use_id.into(),
            output: output.into(),
            is_error: true,
        }
    }

    pub fn cancelled(tool_use_id: impl Into<String>) -> Self {
        Self::error(tool_use_id, "cancelled")
    }
}

/// Text item inside a `content` array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextContent {
    Text { text: String },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TextOrItems<T> {
    Text(String),
    Items(Vec<T>),
}

fn deserialize_tool_result_content<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match TextOrItems::<TextContent>::deserialize(deserializer)? {
        TextOrItems::Text(text) => text,
        TextOrItems::Items(items) => items
            .into_iter()
            .map(|TextContent::Text { text }| text)
            .collect::<Vec<_>>()
            .join("\n"),
    })
}

fn deserialize_user_content<'de, D>(deserializer: D) -> Result<Vec<ContentBlock>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match TextOrItems::<ContentBlock>::deserialize(deserializer)? {
        TextOrItems::Text(text) => vec![ContentBlock::Text { text }],
        TextOrItems::Items(items) => items,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_result_accepts_string_or_text_items() {
        let from_string: ToolResultBlock = serde_json::from_value(json!({
            "tool_use_id": "toolu_1",
            "content": "ok",
        }))
        .expect("string content");
        assert_eq!(from_string.output, "ok");
        assert!(!from_string.is_error);

        let from_items: ToolResultBlock = serde_json::from_value(json!({
            "tool_use_id": "toolu_1",
            "content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}],
            "is_error": true,
        }))
        .expect("item content");
        assert_eq!(from_items.output, "a\nb");
        assert!(from_items.is_error);
    }

    #[test]
    fn user_envelope_accepts_plain_string() {
        let message: Message =
            serde_json::from_value(json!({"type": "user", "content": "hello"})).expect("decode");
        assert_eq!(message, Message::user_text("hello"));
    }

    #[test]
    fn result_envelope_fills_missing_stats_with_defaults() {
        let message: Message =
            serde_json::from_value(json!({"type": "result", "subtype": "success"}))
                .expect("decode");
        let result = message.as_result().expect("result");
        assert_eq!(result.subtype, ResultSubtype::Success);
        assert_eq!(result.stats, ResultStats::default());
        assert!(!result.is_error());
    }

    #[test]
    fn text_joins_only_text_blocks() {
        let message = Message::assistant(vec![
            ContentBlock::text("Let me "),
            ContentBlock::ToolUse(ToolUseBlock::new("t1", "Read", Default::default())),
            ContentBlock::text("check."),
        ]);
        assert_eq!(message.text(), "Let me check.");
        assert_eq!(message.tool_uses().len(), 1);
        assert_eq!(message.kind(), MessageKind::Assistant);
    }

    #[test]
    fn result_subtype_uses_snake_case_names() {
        assert_eq!(ResultSubtype::ErrorMaxTurns.to_string(), "error_max_turns");
        assert_eq!(
            serde_json::to_value(ResultSubtype::ErrorDuringExecution).expect("encode"),
            json!("error_during_execution")
        );
    }
}
