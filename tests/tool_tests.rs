//! Tests for tool registration and dispatch.

mod common;

use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use serde_json::json;

use common::*;
use keel::tools::ToolId;
use keel::{KeelError, McpServer, ToolContext, ToolDefinition, ToolOutput, ToolRegistry};

fn ctx(id: &str) -> ToolContext {
    ToolContext {
        tool_use_id: id.to_string(),
        ..ToolContext::default()
    }
}

#[tokio::test]
async fn invoke_addresses_server_tools_by_qualified_name() {
    let registry = ToolRegistry::build([calculator(Arc::default())]).unwrap();

    let block = registry
        .invoke("mcp__calc__add", object(json!({"a": 123, "b": 456})), ctx("t1"))
        .await
        .unwrap();

    assert_eq!(block.tool_use_id, "t1");
    assert_eq!(block.output, "123 + 456 = 579");
    assert!(!block.is_error);
    assert!(matches!(
        registry.invoke("add", object(json!({"a": 1, "b": 2})), ctx("t2")).await,
        Err(KeelError::ToolNotFound(_))
    ));
}

#[tokio::test]
async fn rebuilding_from_the_same_definitions_dispatches_identically() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let first = ToolRegistry::build([calculator(Arc::clone(&log))]).unwrap();
    let second = ToolRegistry::build([calculator(Arc::clone(&log))]).unwrap();

    assert_eq!(first.names(), second.names());
    assert_eq!(first.tool_specs(), second.tool_specs());
    for input in [json!({"a": 2, "b": 3}), json!({"a": "x", "b": 3}), json!({"b": 3})] {
        let a = first.invoke("mcp__calc__add", object(input.clone()), ctx("t")).await;
        let b = second.invoke("mcp__calc__add", object(input), ctx("t")).await;
        match (a, b) {
            (Ok(a), Ok(b)) => assert_eq!(a, b),
            (Err(a), Err(b)) => assert_eq!(a.to_string(), b.to_string()),
            (a, b) => panic!("dispatch diverged: {a:?} vs {b:?}"),
        }
    }
}

#[test]
fn builtins_and_servers_share_one_namespace() {
    let read = CountingTool::new("Read", "contents");
    let registry = ToolRegistry::builder()
        .server(calculator(Arc::default()))
        .builtin(read.definition.clone())
        .build()
        .unwrap();

    assert_eq!(
        registry.names(),
        vec!["Read", "mcp__calc__add", "mcp__calc__slow_add"]
    );
    let meta = registry.metadata("mcp__calc__add").unwrap();
    assert_eq!(meta.id, ToolId::server_tool("calc", "add"));
    assert_eq!(registry.metadata("Read").unwrap().id, ToolId::builtin("Read"));
    assert_eq!(registry.servers().len(), 1);
}

#[test]
fn duplicate_registrations_are_rejected() {
    let err = ToolRegistry::build([calculator(Arc::default()), calculator(Arc::default())])
        .unwrap_err();
    assert!(err.to_string().contains("calc"), "{err}");

    let tool = || {
        ToolDefinition::builder("echo", "Echo").handler(|_args, _ctx| async {
            Ok(ToolOutput::text("echo"))
        })
    };
    let err = ToolRegistry::build([McpServer::new("dup", "1").tools([tool(), tool()])])
        .unwrap_err();
    assert!(err.to_string().contains("mcp__dup__echo"), "{err}");
}

#[test]
fn tool_specs_carry_json_schema() {
    let registry = ToolRegistry::build([calculator(Arc::default())]).unwrap();
    let spec = registry
        .tool_specs()
        .into_iter()
        .find(|spec| spec.name == "mcp__calc__add")
        .unwrap();

    assert_eq!(spec.description, "Add two numbers");
    assert_eq!(spec.input_schema["type"], "object");
    assert_eq!(spec.input_schema["properties"]["a"]["type"], "number");
    assert_eq!(spec.input_schema["required"], json!(["a", "b"]));
}
