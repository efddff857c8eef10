//! Demo calculator server and guard hooks used by `keel replay`.

use crate::error::KeelError;
use crate::hooks::{hook_fn, HookConfig, HookEvent, HookFn, HookInput, HookMatcherConfig, HookOutput};
use crate::tools::{McpServer, ToolDefinition, ToolOutput};

pub const CALCULATOR_SERVER: &str = "calculator";

/// Substrings that make a Bash command too dangerous to run.
pub const DANGEROUS_PATTERNS: [&str; 3] = ["rm -rf /", ":(){ :|:& };:", "> /dev/sda"];

/// Prompt used when `replay` is given none.
pub const DEFAULT_PROMPT: &str =
    "Please calculate: 1. 123 + 456  2. 7 × 8  3. what is 25°C in Fahrenheit?";

pub fn add_tool() -> ToolDefinition {
    ToolDefinition::builder("add", "Add two numbers")
        .field("a", "float")
        .field("b", "float")
        .handler(|args, _ctx| async move {
            let (a, b) = (args.get_f64("a")?, args.get_f64("b")?);
            tracing::debug!(a, b, "add");
            Ok(ToolOutput::text(format!("{a} + {b} = {}", a + b)))
        })
}

pub fn multiply_tool() -> ToolDefinition {
    ToolDefinition::builder("multiply", "Multiply two numbers")
        .field("a", "float")
        .field("b", "float")
        .handler(|args, _ctx| async move {
            let (a, b) = (args.get_f64("a")?, args.get_f64("b")?);
            tracing::debug!(a, b, "multiply");
            Ok(ToolOutput::text(format!("{a} × {b} = {}", a * b)))
        })
}

pub fn celsius_to_fahrenheit_tool() -> ToolDefinition {
    ToolDefinition::builder(
        "celsius_to_fahrenheit",
        "Convert a Celsius temperature to Fahrenheit",
    )
    .field("celsius", "float")
    .handler(|args, _ctx| async move {
        let celsius = args.get_f64("celsius")?;
        let fahrenheit = celsius * 9.0 / 5.0 + 32.0;
        Ok(ToolOutput::text(format!("{celsius}°C = {fahrenheit:.1}°F")))
    })
}

/// `calculator` server with `add`, `multiply`, and `celsius_to_fahrenheit`.
pub fn calculator_server() -> McpServer {
    McpServer::new(CALCULATOR_SERVER, "1.0.0").tools([
        add_tool(),
        multiply_tool(),
        celsius_to_fahrenheit_tool(),
    ])
}

/// Verdict of the guard for one PreToolUse input.
pub fn guard_verdict(input: &HookInput) -> HookOutput {
    let tool_name = input.tool_name.as_deref().unwrap_or_default();
    match tool_name {
        "Write" | "Edit" | "Read" => {
            let file_path = input.input_str("file_path").unwrap_or_default();
            if file_path.contains(".env") {
                return HookOutput::deny(format!(
                    "access to '{file_path}' is blocked: .env files hold secrets"
                ));
            }
        }
        "Bash" => {
            let command = input.input_str("command").unwrap_or_default();
            if let Some(pattern) = DANGEROUS_PATTERNS.iter().find(|p| command.contains(**p)) {
                return HookOutput::deny(format!("dangerous command pattern detected: {pattern}"));
            }
        }
        _ => {}
    }
    HookOutput::none()
}

pub fn guard_hook() -> HookFn {
    hook_fn(|input: HookInput, tool_use_id, _ctx| async move {
        let verdict = guard_verdict(&input);
        if verdict.is_empty() {
            tracing::debug!(tool_name = ?input.tool_name, tool_use_id = ?tool_use_id, "guard: allowed");
        } else {
            tracing::info!(
                tool_name = ?input.tool_name,
                tool_use_id = ?tool_use_id,
                reason = ?verdict.permission_decision_reason,
                "guard: blocked"
            );
        }
        Ok::<_, KeelError>(verdict)
    })
}

pub fn audit_hook() -> HookFn {
    hook_fn(|input: HookInput, tool_use_id, _ctx| async move {
        tracing::info!(
            tool_name = ?input.tool_name,
            tool_use_id = ?tool_use_id,
            "tool finished"
        );
        Ok::<_, KeelError>(HookOutput::none())
    })
}

/// Guard on every PreToolUse, audit on every PostToolUse.
pub fn demo_hooks() -> HookConfig {
    HookConfig::from([
        (
            HookEvent::PreToolUse,
            vec![HookMatcherConfig::new(vec![guard_hook()])],
        ),
        (
            HookEvent::PostToolUse,
            vec![HookMatcherConfig::new(vec![audit_hook()])],
        ),
    ])
}
