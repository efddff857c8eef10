//! Wire envelopes: `{"type": "user" | "assistant" | "result", ...}`.

use serde_json::Value;

use crate::error::KeelError;
use crate::types::Message;

const ENVELOPE_TYPES: [&str; 3] = ["user", "assistant", "result"];

/// Render a message as its wire envelope.
pub fn encode(message: &Message) -> Result<Value, KeelError> {
    Ok(serde_json::to_value(message)?)
}

/// Render a message as one line of JSON.
pub fn encode_line(message: &Message) -> Result<String, KeelError> {
    Ok(serde_json::to_string(message)?)
}

pub fn encode_transcript(messages: &[Message]) -> Result<Vec<Value>, KeelError> {
    messages.iter().map(encode).collect()
}

/// Parse one envelope. Unknown types and malformed bodies are protocol errors.
pub fn decode(raw: Value) -> Result<Message, KeelError> {
    let kind = match raw.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        Some(other) => {
            return Err(KeelError::ProtocolDecode(format!(
                "envelope 'type' must be a string, got {other}"
            )))
        }
        None => {
            return Err(KeelError::ProtocolDecode(
                "envelope has no 'type'".to_string(),
            ))
        }
    };
    if !ENVELOPE_TYPES.contains(&kind.as_str()) {
        return Err(KeelError::ProtocolDecode(format!(
            "unknown envelope type '{kind}'"
        )));
    }
    serde_json::from_value(raw)
        .map_err(|e| KeelError::ProtocolDecode(format!("malformed '{kind}' envelope: {e}")))
}

/// Parse one line of JSON.
pub fn decode_line(line: &str) -> Result<Message, KeelError> {
    let raw: Value = serde_json::from_str(line.trim())
        .map_err(|e| KeelError::ProtocolDecode(format!("invalid JSON: {e}")))?;
    decode(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentBlock, ToolResultBlock, ToolUseBlock};
    use serde_json::json;

    #[test]
    fn assistant_envelope_shape() {
        let mut input = serde_json::Map::new();
        input.insert("a".into(), json!(15));
        let message = Message::assistant(vec![ContentBlock::ToolUse(ToolUseBlock::new(
            "toolu_1",
            "mcp__calculator__add",
            input,
        ))]);

        let value = encode(&message).expect("encode");

        assert_eq!(
            value,
            json!({
                "type": "assistant",
                "content": [{
                    "type": "tool_use",
                    "id": "toolu_1",
                    "name": "mcp__calculator__add",
                    "input": {"a": 15},
                }],
            })
        );
    }

    #[test]
    fn tool_results_encode_as_user_envelope() {
        let message = Message::tool_results(vec![ToolResultBlock::error("toolu_1", "cancelled")]);

        let value = encode(&message).expect("encode");

        assert_eq!(value["type"], json!("user"));
        assert_eq!(value["content"][0]["type"], json!("tool_result"));
        assert_eq!(value["content"][0]["content"], json!("cancelled"));
        assert_eq!(value["content"][0]["is_error"], json!(true));
    }

    #[test]
    fn transcript_encodes_in_order() {
        let transcript = vec![
            Message::user_text("hi"),
            Message::assistant(vec![ContentBlock::text("hello")]),
        ];

        let values = encode_transcript(&transcript).expect("encode");

        assert_eq!(values.len(), 2);
        assert_eq!(values[0]["type"], json!("user"));
        assert_eq!(values[1]["content"][0]["text"], json!("hello"));
    }

    #[test]
    fn unknown_type_is_protocol_error() {
        let err = decode(json!({"type": "system", "subtype": "init"})).unwrap_err();

        assert!(matches!(err, KeelError::ProtocolDecode(msg) if msg.contains("system")));
    }

    #[test]
    fn missing_type_is_protocol_error() {
        assert!(matches!(
            decode(json!({"content": []})),
            Err(KeelError::ProtocolDecode(_))
        ));
    }

    #[test]
    fn malformed_body_is_protocol_error() {
        let err = decode(json!({"type": "assistant", "content": "not a list"})).unwrap_err();

        assert!(matches!(err, KeelError::ProtocolDecode(_)));
    }

    #[test]
    fn decode_line_rejects_invalid_json() {
        assert!(matches!(
            decode_line("{not json"),
            Err(KeelError::ProtocolDecode(_))
        ));
    }
}
