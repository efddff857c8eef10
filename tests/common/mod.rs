//! Shared test helpers: wire events, scripted transports, and counting tools.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Map, Value};

use keel::{
    McpServer, Message, ResultMessage, ScriptStep, ScriptedTransport, ToolDefinition, ToolOutput,
    ToolResultBlock,
};

pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

/// Assistant envelope with a single tool use.
pub fn tool_use(id: &str, name: &str, input: Value) -> Value {
    tool_uses(&[(id, name, input)])
}

/// Assistant envelope requesting several tools at once.
pub fn tool_uses(calls: &[(&str, &str, Value)]) -> Value {
    let content: Vec<Value> = calls
        .iter()
        .map(|(id, name, input)| json!({"type": "tool_use", "id": id, "name": name, "input": input}))
        .collect();
    json!({"type": "assistant", "content": content})
}

pub fn assistant_text(text: &str) -> Value {
    json!({"type": "assistant", "content": [{"type": "text", "text": text}]})
}

pub fn wire_result() -> Value {
    json!({"type": "result", "subtype": "success", "usage": {"input_tokens": 12, "output_tokens": 3}})
}

/// A model call made only of wire events.
pub fn call(events: Vec<Value>) -> Vec<ScriptStep> {
    events.into_iter().map(ScriptStep::event).collect()
}

/// A model call that answers with text and ends.
pub fn text_call(text: &str) -> Vec<ScriptStep> {
    call(vec![assistant_text(text), wire_result()])
}

pub fn transport(calls: Vec<Vec<ScriptStep>>) -> Arc<ScriptedTransport> {
    Arc::new(ScriptedTransport::new(calls))
}

/// A tool that counts its invocations and echoes a fixed reply.
pub struct CountingTool {
    pub calls: Arc<AtomicUsize>,
    pub definition: ToolDefinition,
}

impl CountingTool {
    pub fn new(name: &str, reply: &str) -> Self {
        Self::build(name, reply, false, Duration::ZERO)
    }

    pub fn mutating(name: &str, reply: &str) -> Self {
        Self::build(name, reply, true, Duration::ZERO)
    }

    pub fn delayed(name: &str, reply: &str, delay: Duration) -> Self {
        Self::build(name, reply, false, delay)
    }

    fn build(name: &str, reply: &str, mutating: bool, delay: Duration) -> Self {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let reply = reply.to_string();
        let definition = ToolDefinition::builder(name, format!("test tool {name}"))
            .optional_field("file_path", "string")
            .mutating(mutating)
            .handler(move |_args, _ctx| {
                let counter = Arc::clone(&counter);
                let reply = reply.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    Ok(ToolOutput::text(reply))
                }
            });
        Self { calls, definition }
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// `calc` server whose tools record the order in which they finish.
pub fn calculator(finished: Arc<Mutex<Vec<String>>>) -> McpServer {
    let add_log = Arc::clone(&finished);
    let add = ToolDefinition::builder("add", "Add two numbers")
        .field("a", "float")
        .field("b", "float")
        .handler(move |args, _ctx| {
            let log = Arc::clone(&add_log);
            async move {
                let (a, b) = (args.get_f64("a")?, args.get_f64("b")?);
                log.lock().unwrap().push("add".to_string());
                Ok(ToolOutput::text(format!("{a} + {b} = {}", a + b)))
            }
        });
    let slow_log = finished;
    let slow_add = ToolDefinition::builder("slow_add", "Add two numbers, slowly")
        .field("a", "float")
        .field("b", "float")
        .optional_field("delay_ms", "integer")
        .handler(move |args, _ctx| {
            let log = Arc::clone(&slow_log);
            async move {
                let delay = args.get_i64("delay_ms").unwrap_or(0) as u64;
                tokio::time::sleep(Duration::from_millis(delay)).await;
                let (a, b) = (args.get_f64("a")?, args.get_f64("b")?);
                log.lock().unwrap().push(format!("slow_add:{delay}"));
                Ok(ToolOutput::text(format!("{a} + {b} = {}", a + b)))
            }
        });
    McpServer::new("calc", "1.0.0").tools([add, slow_add])
}

/// Every tool result block in stream order.
pub fn tool_results(messages: &[Message]) -> Vec<ToolResultBlock> {
    messages
        .iter()
        .flat_map(|message| message.tool_results_iter().cloned())
        .collect()
}

pub fn final_result(messages: &[Message]) -> ResultMessage {
    match messages.last() {
        Some(Message::Result(result)) => result.clone(),
        other => panic!("stream must end with a result, got {other:?}"),
    }
}
