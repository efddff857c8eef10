//! Tool definitions, handler trait, and handler output shape.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::arguments::ToolArguments;
use super::schema::InputSchema;
use crate::error::KeelError;
use crate::types::TextContent;

/// Context available during tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub tool_use_id: String,
    /// Qualified tool name as the model addressed it.
    pub tool_name: String,
    pub session_id: String,
    /// Fires when the turn is cancelled or the per-tool timeout elapses.
    pub cancel: CancellationToken,
}

/// What a handler returns: text content items plus an error flag.
///
/// Serialized as `{"content": [{"type": "text", "text": ...}], "is_error": true?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: Vec<TextContent>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![TextContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// An output the model should see as a failed call.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![TextContent::Text { text: text.into() }],
            is_error: true,
        }
    }

    /// Parse a raw handler mapping.
    pub fn from_value(value: serde_json::Value) -> Result<Self, KeelError> {
        serde_json::from_value(value).map_err(|e| {
            KeelError::InvalidArgument(format!("tool output must be a content mapping: {e}"))
        })
    }

    /// Text items joined by newlines.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .map(|TextContent::Text { text }| text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Implement to provide a tool body without a closure.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: ToolArguments, ctx: ToolContext) -> Result<ToolOutput, KeelError>;
}

type HandlerFn = dyn Fn(
        ToolArguments,
        ToolContext,
    ) -> Pin<Box<dyn Future<Output = Result<ToolOutput, KeelError>> + Send>>
    + Send
    + Sync;

struct FnHandler {
    f: Arc<HandlerFn>,
}

#[async_trait]
impl ToolHandler for FnHandler {
    async fn call(&self, args: ToolArguments, ctx: ToolContext) -> Result<ToolOutput, KeelError> {
        (self.f)(args, ctx).await
    }
}

/// A named, schema-described tool with its handler.
#[derive(Clone)]
pub struct ToolDefinition {
    name: String,
    description: String,
    schema: InputSchema,
    mutating: bool,
    handler: Arc<dyn ToolHandler>,
}

impl ToolDefinition {
    /// Start a definition; finish it with [`ToolDefinitionBuilder::handler`].
    pub fn builder(name: impl Into<String>, description: impl Into<String>) -> ToolDefinitionBuilder {
        ToolDefinitionBuilder {
            name: name.into(),
            description: description.into(),
            schema: InputSchema::default(),
            mutating: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn schema(&self) -> &InputSchema {
        &self.schema
    }

    /// Whether the tool edits files or other state; drives `acceptEdits` and plan mode.
    pub fn is_mutating(&self) -> bool {
        self.mutating
    }

    pub fn handler(&self) -> Arc<dyn ToolHandler> {
        Arc::clone(&self.handler)
    }
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("mutating", &self.mutating)
            .finish()
    }
}

/// Builder for [`ToolDefinition`].
pub struct ToolDefinitionBuilder {
    name: String,
    description: String,
    schema: InputSchema,
    mutating: bool,
}

impl ToolDefinitionBuilder {
    /// Declare a required input field with a primitive type tag.
    pub fn field(mut self, name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        self.schema = self.schema.field(name, type_tag);
        self
    }

    pub fn optional_field(mut self, name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        self.schema = self.schema.optional_field(name, type_tag);
        self
    }

    /// Replace the whole schema.
    pub fn schema(mut self, schema: InputSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn mutating(mut self, mutating: bool) -> Self {
        self.mutating = mutating;
        self
    }

    /// Finish with a closure handler.
    pub fn handler<F, Fut>(self, handler: F) -> ToolDefinition
    where
        F: Fn(ToolArguments, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolOutput, KeelError>> + Send + 'static,
    {
        let f: Arc<HandlerFn> = Arc::new(move |args, ctx| Box::pin(handler(args, ctx)));
        self.handler_arc(Arc::new(FnHandler { f }))
    }

    /// Finish with a shared [`ToolHandler`] implementation.
    pub fn handler_arc(self, handler: Arc<dyn ToolHandler>) -> ToolDefinition {
        ToolDefinition {
            name: self.name,
            description: self.description,
            schema: self.schema,
            mutating: self.mutating,
            handler,
        }
    }
}

/// Tool as advertised to the model transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_serializes_as_content_mapping() {
        let value = serde_json::to_value(ToolOutput::text("15 + 27 = 42")).expect("encode");
        assert_eq!(
            value,
            json!({"content": [{"type": "text", "text": "15 + 27 = 42"}]})
        );

        let err = serde_json::to_value(ToolOutput::error("nope")).expect("encode");
        assert_eq!(err["is_error"], json!(true));
    }

    #[test]
    fn output_from_raw_mapping() {
        let output = ToolOutput::from_value(json!({
            "content": [{"type": "text", "text": "a"}, {"type": "text", "text": "b"}]
        }))
        .expect("parse");

        assert_eq!(output.joined_text(), "a\nb");
        assert!(!output.is_error);
        assert!(ToolOutput::from_value(json!("bare string")).is_err());
    }

    #[tokio::test]
    async fn closure_handler_receives_arguments() {
        let def = ToolDefinition::builder("add", "Add two numbers")
            .field("a", "float")
            .field("b", "float")
            .handler(|args, _ctx| async move {
                let a = args.get_f64("a")?;
                let b = args.get_f64("b")?;
                Ok(ToolOutput::text(format!("{a} + {b} = {}", a + b)))
            });

        let args = ToolArguments::from_value(json!({ "a": 15, "b": 27 }));
        let output = def
            .handler()
            .call(args, ToolContext::default())
            .await
            .expect("call");

        assert_eq!(output.joined_text(), "15 + 27 = 42");
        assert!(!def.is_mutating());
        assert_eq!(def.schema().fields.len(), 2);
    }
}
