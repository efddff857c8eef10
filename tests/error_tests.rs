//! Tests for the error system.

use keel::error::*;

#[test]
fn permission_denied_renders_reason_for_the_model() {
    let err = KeelError::permission_denied("Write", "secrets live in .env");
    assert!(matches!(&err, KeelError::PermissionDenied { .. }));
    assert_eq!(err.to_string(), "Permission denied for Write: secrets live in .env");
    assert_eq!(err.tool_result_text(), "secrets live in .env");
}

#[test]
fn error_helper_mappings_are_stable_for_major_variants() {
    struct Case {
        error: KeelError,
        expected_category: ErrorCategory,
        expected_propagation: Propagation,
    }

    let io_error = std::io::Error::new(std::io::ErrorKind::Other, "disk");
    let serde_error = serde_json::from_str::<serde_json::Value>("{not-json}").unwrap_err();

    let cases = vec![
        Case {
            error: KeelError::ToolNotFound("mcp__calc__pow".to_string()),
            expected_category: ErrorCategory::Validation,
            expected_propagation: Propagation::ToolCall,
        },
        Case {
            error: KeelError::SchemaValidation("missing required field 'a'".to_string()),
            expected_category: ErrorCategory::Validation,
            expected_propagation: Propagation::ToolCall,
        },
        Case {
            error: KeelError::permission_denied("Bash", "dangerous"),
            expected_category: ErrorCategory::Permission,
            expected_propagation: Propagation::ToolCall,
        },
        Case {
            error: KeelError::handler("toolu_1", "boom"),
            expected_category: ErrorCategory::Handler,
            expected_propagation: Propagation::ToolCall,
        },
        Case {
            error: KeelError::Timeout(5000),
            expected_category: ErrorCategory::Interrupted,
            expected_propagation: Propagation::ToolCall,
        },
        Case {
            error: KeelError::Cancelled,
            expected_category: ErrorCategory::Interrupted,
            expected_propagation: Propagation::ToolCall,
        },
        Case {
            error: KeelError::ProtocolDecode("unknown envelope type 'x'".to_string()),
            expected_category: ErrorCategory::Protocol,
            expected_propagation: Propagation::SessionFatal,
        },
        Case {
            error: KeelError::SessionClosed,
            expected_category: ErrorCategory::Session,
            expected_propagation: Propagation::SessionFatal,
        },
        Case {
            error: KeelError::InvalidState("busy".to_string()),
            expected_category: ErrorCategory::Session,
            expected_propagation: Propagation::Caller,
        },
        Case {
            error: KeelError::Transport("reset".to_string()),
            expected_category: ErrorCategory::Transport,
            expected_propagation: Propagation::Turn,
        },
        Case {
            error: KeelError::Configuration("bad-config".to_string()),
            expected_category: ErrorCategory::Configuration,
            expected_propagation: Propagation::Caller,
        },
        Case {
            error: KeelError::Io(io_error),
            expected_category: ErrorCategory::Io,
            expected_propagation: Propagation::Caller,
        },
        Case {
            error: KeelError::Serialization(serde_error),
            expected_category: ErrorCategory::Serialization,
            expected_propagation: Propagation::Caller,
        },
    ];

    for case in cases {
        assert_eq!(case.error.category(), case.expected_category, "{}", case.error);
        assert_eq!(case.error.propagation(), case.expected_propagation, "{}", case.error);
        assert_eq!(
            case.error.is_recoverable(),
            case.expected_propagation == Propagation::ToolCall
        );
        assert_eq!(
            case.error.is_session_fatal(),
            case.expected_propagation == Propagation::SessionFatal
        );
    }
}

#[test]
fn handler_error_keeps_its_source() {
    let cause = KeelError::InvalidArgument("Missing number argument: a".to_string());
    let err = KeelError::handler_with_source("toolu_9", cause);

    match &err {
        KeelError::HandlerError {
            tool_use_id,
            message,
            source: Some(source),
        } => {
            assert_eq!(tool_use_id, "toolu_9");
            assert_eq!(message, "Invalid argument: Missing number argument: a");
            assert_eq!(source.to_string(), *message);
        }
        other => panic!("expected handler error with source, got {other:?}"),
    }
    assert_eq!(
        err.tool_result_text(),
        "tool handler failed: Invalid argument: Missing number argument: a"
    );
}

#[test]
fn interruption_text_says_cancelled() {
    assert_eq!(KeelError::Cancelled.tool_result_text(), "cancelled");
    assert_eq!(
        KeelError::Timeout(250).tool_result_text(),
        "cancelled: timed out after 250ms"
    );
}
