//! Tool system: definitions, schemas, and the registry that dispatches calls.

pub mod arguments;
pub mod definition;
pub mod registry;
pub mod schema;

pub use arguments::ToolArguments;
pub use definition::{
    ToolContext, ToolDefinition, ToolDefinitionBuilder, ToolHandler, ToolOutput, ToolSpec,
};
pub use registry::{McpServer, RegistryBuilder, ServerInfo, ToolId, ToolMetadata, ToolRegistry};
pub use schema::{CompiledSchema, FieldType, InputSchema, SchemaField};
