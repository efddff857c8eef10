//! Tool registry: server grouping, qualified naming, lookup, validation, dispatch.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::arguments::ToolArguments;
use super::definition::{ToolContext, ToolDefinition, ToolSpec};
use super::schema::CompiledSchema;
use crate::error::KeelError;
use crate::types::ToolResultBlock;

const MCP_PREFIX: &str = "mcp";
const SEPARATOR: &str = "__";

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]+$").expect("tool name validation regex must compile")
});

/// Address of a tool: an optional server plus the tool's own name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ToolId {
    pub server: Option<String>,
    pub name: String,
}

impl ToolId {
    pub fn server_tool(server: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            server: Some(server.into()),
            name: name.into(),
        }
    }

    pub fn builtin(name: impl Into<String>) -> Self {
        Self {
            server: None,
            name: name.into(),
        }
    }

    /// `mcp__{server}__{tool}` for server tools, the bare name for builtins.
    pub fn qualified_name(&self) -> String {
        match &self.server {
            Some(server) => format!("{MCP_PREFIX}{SEPARATOR}{server}{SEPARATOR}{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Split a qualified name back into its parts.
    pub fn parse(qualified: &str) -> Self {
        let prefix = format!("{MCP_PREFIX}{SEPARATOR}");
        if let Some(rest) = qualified.strip_prefix(&prefix) {
            if let Some((server, name)) = rest.split_once(SEPARATOR) {
                if !server.is_empty() && !name.is_empty() {
                    return Self::server_tool(server, name);
                }
            }
        }
        Self::builtin(qualified)
    }
}

impl std::fmt::Display for ToolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

/// A named, versioned group of tools.
#[derive(Debug, Clone)]
pub struct McpServer {
    name: String,
    version: String,
    tools: Vec<ToolDefinition>,
}

impl McpServer {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            tools: Vec::new(),
        }
    }

    pub fn tool(mut self, tool: ToolDefinition) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tools(mut self, tools: impl IntoIterator<Item = ToolDefinition>) -> Self {
        self.tools.extend(tools);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.tools
    }
}

/// What the permission layer needs to know about a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub id: ToolId,
    pub qualified_name: String,
    pub description: String,
    pub mutating: bool,
}

impl ToolMetadata {
    /// Metadata for a name the registry does not know.
    pub fn unknown(qualified_name: impl Into<String>) -> Self {
        let qualified_name = qualified_name.into();
        Self {
            id: ToolId::parse(&qualified_name),
            qualified_name,
            description: String::new(),
            mutating: false,
        }
    }
}

/// Name and version of a registered server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub tools: Vec<String>,
}

struct RegisteredTool {
    metadata: ToolMetadata,
    definition: ToolDefinition,
    schema: CompiledSchema,
}

struct RegistryInner {
    tools: BTreeMap<String, RegisteredTool>,
    servers: Vec<ServerInfo>,
}

/// Immutable map from qualified tool name to definition.
///
/// Cheap to clone; safe to share across concurrent tool invocations.
#[derive(Clone)]
pub struct ToolRegistry {
    inner: Arc<RegistryInner>,
}

impl ToolRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Build from server groups only.
    pub fn build(servers: impl IntoIterator<Item = McpServer>) -> Result<Self, KeelError> {
        Self::builder().servers(servers).build()
    }

    pub fn empty() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                tools: BTreeMap::new(),
                servers: Vec::new(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tools.is_empty()
    }

    pub fn contains(&self, qualified_name: &str) -> bool {
        self.inner.tools.contains_key(qualified_name)
    }

    /// Qualified names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.inner.tools.keys().cloned().collect()
    }

    pub fn servers(&self) -> &[ServerInfo] {
        &self.inner.servers
    }

    pub fn metadata(&self, qualified_name: &str) -> Option<ToolMetadata> {
        self.inner
            .tools
            .get(qualified_name)
            .map(|tool| tool.metadata.clone())
    }

    pub fn definition(&self, qualified_name: &str) -> Option<&ToolDefinition> {
        self.inner
            .tools
            .get(qualified_name)
            .map(|tool| &tool.definition)
    }

    /// Tool descriptions for the model transport, keyed by qualified name.
    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        self.inner
            .tools
            .iter()
            .map(|(name, tool)| ToolSpec {
                name: name.clone(),
                description: tool.definition.description().to_string(),
                input_schema: tool.schema.to_json_schema(),
            })
            .collect()
    }

    /// Check a tool input against the tool's schema.
    pub fn validate(
        &self,
        qualified_name: &str,
        input: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), KeelError> {
        let tool = self
            .inner
            .tools
            .get(qualified_name)
            .ok_or_else(|| KeelError::ToolNotFound(qualified_name.to_string()))?;
        tool.schema.validate(input)
    }

    /// Look up, validate, and run a tool.
    ///
    /// A handler output flagged `is_error` becomes an error block; a handler
    /// failure is returned as [`KeelError::HandlerError`].
    pub async fn invoke(
        &self,
        qualified_name: &str,
        input: serde_json::Map<String, serde_json::Value>,
        ctx: ToolContext,
    ) -> Result<ToolResultBlock, KeelError> {
        let tool = self
            .inner
            .tools
            .get(qualified_name)
            .ok_or_else(|| KeelError::ToolNotFound(qualified_name.to_string()))?;
        tool.schema.validate(&input)?;

        let tool_use_id = ctx.tool_use_id.clone();
        let handler = tool.definition.handler();
        match handler.call(ToolArguments::new(input), ctx).await {
            Ok(output) => Ok(ToolResultBlock {
                tool_use_id,
                output: output.joined_text(),
                is_error: output.is_error,
            }),
            Err(err @ (KeelError::HandlerError { .. } | KeelError::Cancelled | KeelError::Timeout(_))) => {
                Err(err)
            }
            Err(err) => Err(KeelError::handler_with_source(tool_use_id, err)),
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .field("servers", &self.inner.servers)
            .finish()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

/// Collects server groups and builtin tools, then validates them all at once.
#[derive(Debug, Clone, Default)]
pub struct RegistryBuilder {
    servers: Vec<McpServer>,
    builtins: Vec<ToolDefinition>,
}

impl RegistryBuilder {
    pub fn server(mut self, server: McpServer) -> Self {
        self.servers.push(server);
        self
    }

    pub fn servers(mut self, servers: impl IntoIterator<Item = McpServer>) -> Self {
        self.servers.extend(servers);
        self
    }

    /// A tool addressed by its bare name, outside any server.
    pub fn builtin(mut self, tool: ToolDefinition) -> Self {
        self.builtins.push(tool);
        self
    }

    pub fn builtins(mut self, tools: impl IntoIterator<Item = ToolDefinition>) -> Self {
        self.builtins.extend(tools);
        self
    }

    pub fn build(self) -> Result<ToolRegistry, KeelError> {
        let mut tools = BTreeMap::new();
        let mut servers = Vec::with_capacity(self.servers.len());
        let mut server_names = HashSet::new();

        for server in &self.servers {
            check_name("server", server.name())?;
            if !server_names.insert(server.name().to_string()) {
                return Err(KeelError::SchemaValidation(format!(
                    "duplicate server name '{}'",
                    server.name()
                )));
            }
            let mut registered = Vec::with_capacity(server.definitions().len());
            for definition in server.definitions() {
                let id = ToolId::server_tool(server.name(), definition.name());
                registered.push(id.qualified_name());
                insert_tool(&mut tools, id, definition)?;
            }
            servers.push(ServerInfo {
                name: server.name().to_string(),
                version: server.version().to_string(),
                tools: registered,
            });
        }

        for definition in &self.builtins {
            insert_tool(&mut tools, ToolId::builtin(definition.name()), definition)?;
        }

        tracing::debug!(
            tools = tools.len(),
            servers = servers.len(),
            "tool registry built"
        );
        Ok(ToolRegistry {
            inner: Arc::new(RegistryInner { tools, servers }),
        })
    }
}

fn check_name(kind: &str, name: &str) -> Result<(), KeelError> {
    if name.is_empty() {
        return Err(KeelError::SchemaValidation(format!(
            "{kind} name must not be empty"
        )));
    }
    if name.contains(SEPARATOR) {
        return Err(KeelError::SchemaValidation(format!(
            "{kind} name '{name}' must not contain '{SEPARATOR}'"
        )));
    }
    if !NAME_RE.is_match(name) {
        return Err(KeelError::SchemaValidation(format!(
            "{kind} name '{name}' may only contain letters, digits, '_' and '-'"
        )));
    }
    Ok(())
}

fn insert_tool(
    tools: &mut BTreeMap<String, RegisteredTool>,
    id: ToolId,
    definition: &ToolDefinition,
) -> Result<(), KeelError> {
    check_name("tool", definition.name())?;
    let schema = definition.schema().compile().map_err(|e| match e {
        KeelError::SchemaValidation(msg) => {
            KeelError::SchemaValidation(format!("tool '{}': {msg}", id.qualified_name()))
        }
        other => other,
    })?;
    let qualified_name = id.qualified_name();
    if tools.contains_key(&qualified_name) {
        return Err(KeelError::SchemaValidation(format!(
            "duplicate tool '{qualified_name}'"
        )));
    }
    tools.insert(
        qualified_name.clone(),
        RegisteredTool {
            metadata: ToolMetadata {
                id,
                qualified_name,
                description: definition.description().to_string(),
                mutating: definition.is_mutating(),
            },
            definition: definition.clone(),
            schema,
        },
    );
    Ok(())
}
