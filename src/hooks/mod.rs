//! Lifecycle hooks around prompt submission and tool execution.

pub mod matcher;
pub mod pipeline;
pub mod types;

pub use matcher::HookMatcher;
pub use pipeline::{
    rewrite_prompt, HookConfig, HookMatcherConfig, HookPipeline, HookRegistration,
    PipelineOutcome, DEFAULT_HOOK_TIMEOUT,
};
pub use types::{hook_fn, HookContext, HookEvent, HookFn, HookInput, HookOutput};
