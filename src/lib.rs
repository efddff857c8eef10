//! keel: session engine for tool-using agents
//!
//! A [`Session`] drives turns against a [`ModelTransport`]: each submitted
//! prompt streams assistant messages, runs the requested tools through the
//! hook pipeline and permission controller, and ends with exactly one
//! [`ResultMessage`].
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use futures::StreamExt;
//! use keel::prelude::*;
//! use keel::ScriptedTransport;
//!
//! # async fn example() -> keel::Result<()> {
//! let add = ToolDefinition::builder("add", "Add two numbers")
//!     .field("a", "float")
//!     .field("b", "float")
//!     .handler(|args, _ctx| async move {
//!         let (a, b) = (args.get_f64("a")?, args.get_f64("b")?);
//!         Ok(ToolOutput::text(format!("{a} + {b} = {}", a + b)))
//!     });
//! let options = SessionOptions::builder()
//!     .mcp_servers(vec![McpServer::new("calc", "1.0.0").tool(add)])
//!     .allowed_tools(vec!["mcp__calc__add".to_string()])
//!     .build();
//!
//! let transport = Arc::new(ScriptedTransport::default());
//! let session = Session::open(options, transport)?;
//! let mut stream = session.send("What is 123 + 456?")?;
//! while let Some(message) = stream.next().await {
//!     println!("{message:?}");
//! }
//! session.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod hooks;
pub mod permissions;
pub mod prelude;
pub mod session;
pub mod stream;
pub mod tools;
pub mod transport;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;

pub use config::SessionConfig;
pub use error::{ErrorCategory, KeelError, Propagation, Result};
pub use hooks::{
    hook_fn, HookConfig, HookContext, HookEvent, HookFn, HookInput, HookMatcher,
    HookMatcherConfig, HookOutput, HookPipeline, PipelineOutcome,
};
pub use permissions::{
    Decision, PermissionController, PermissionDecision, PermissionMode, PermissionRequest,
    PermissionResolver,
};
pub use session::{
    AuditEvent, AuditLog, AuditRecord, Session, SessionLimits, SessionManager, SessionOptions,
    SessionState, Transcript,
};
pub use stream::{MessageDecoder, MessageStream};
pub use tools::{
    InputSchema, McpServer, ToolArguments, ToolContext, ToolDefinition, ToolHandler,
    ToolMetadata, ToolOutput, ToolRegistry, ToolSpec,
};
pub use transport::{ModelRequest, ModelTransport, RawEventStream, Script, ScriptStep, ScriptedTransport};
pub use types::{
    AssistantMessage, ContentBlock, Message, MessageKind, ResultMessage, ResultStats,
    ResultSubtype, TextContent, ToolResultBlock, ToolUseBlock, UserMessage,
};
