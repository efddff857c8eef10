//! Tests for the wire envelope codec.

use pretty_assertions::assert_eq;
use serde_json::json;

use keel::stream::wire;
use keel::{ContentBlock, KeelError, Message, ResultSubtype, ToolResultBlock, ToolUseBlock};

#[test]
fn tool_use_and_result_pair_survives_the_wire() {
    let tool_use = ToolUseBlock::new(
        "toolu_01",
        "mcp__calculator__add",
        json!({"a": 15, "b": 27}).as_object().cloned().unwrap(),
    );
    let request = Message::assistant(vec![
        ContentBlock::text("Adding."),
        ContentBlock::ToolUse(tool_use.clone()),
    ]);
    let reply = Message::tool_results(vec![ToolResultBlock::success("toolu_01", "15 + 27 = 42")]);

    let line = wire::encode_line(&request).unwrap();
    assert_eq!(wire::decode_line(&line).unwrap(), request);
    let decoded = wire::decode(wire::encode(&reply).unwrap()).unwrap();
    assert_eq!(decoded, reply);
    assert_eq!(decoded.tool_results_iter().next().unwrap().tool_use_id, tool_use.id);
}

#[test]
fn tool_result_shape_matches_envelope_contract() {
    let value = wire::encode(&Message::tool_results(vec![ToolResultBlock::cancelled("t9")])).unwrap();

    assert_eq!(
        value,
        json!({
            "type": "user",
            "content": [{"type": "tool_result", "tool_use_id": "t9", "content": "cancelled", "is_error": true}]
        })
    );
}

#[test]
fn result_envelope_carries_stats() {
    let message = wire::decode(json!({
        "type": "result",
        "subtype": "error_max_turns",
        "session_id": "s1",
        "num_turns": 4,
        "error": "reached max_turns limit of 4"
    }))
    .unwrap();

    let result = message.as_result().unwrap();
    assert_eq!(result.subtype, ResultSubtype::ErrorMaxTurns);
    assert_eq!(result.stats.num_turns, 4);
    assert!(result.is_error());
}

#[test]
fn malformed_envelopes_are_protocol_errors() {
    for raw in [
        json!({"content": []}),
        json!({"type": 7}),
        json!({"type": "system", "content": []}),
        json!({"type": "assistant", "content": [{"type": "image"}]}),
    ] {
        assert!(
            matches!(wire::decode(raw.clone()), Err(KeelError::ProtocolDecode(_))),
            "{raw}"
        );
    }
    assert!(matches!(
        wire::decode_line("{not json"),
        Err(KeelError::ProtocolDecode(_))
    ));
}
