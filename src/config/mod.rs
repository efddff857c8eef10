//! Configuration system (layered: code > env > config file).

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::KeelError;
use crate::permissions::PermissionMode;
use crate::session::{SessionLimits, SessionOptions};

pub const ENV_PERMISSION_MODE: &str = "KEEL_PERMISSION_MODE";
pub const ENV_ALLOWED_TOOLS: &str = "KEEL_ALLOWED_TOOLS";
pub const ENV_HOOK_TIMEOUT_MS: &str = "KEEL_HOOK_TIMEOUT_MS";
pub const ENV_TOOL_TIMEOUT_MS: &str = "KEEL_TOOL_TIMEOUT_MS";
pub const ENV_MAX_TURNS: &str = "KEEL_MAX_TURNS";
pub const ENV_MAX_PARALLEL_TOOLS: &str = "KEEL_MAX_PARALLEL_TOOLS";
pub const ENV_SYSTEM_PROMPT: &str = "KEEL_SYSTEM_PROMPT";

/// Serializable subset of [`SessionOptions`].
///
/// Tools, hooks, and the permission resolver are code; everything else may
/// come from a TOML file or the environment:
///
/// ```toml
/// permission_mode = "acceptEdits"
/// allowed_tools = ["mcp__calculator__add"]
/// tool_timeout_ms = 5000
/// max_turns = 8
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub permission_mode: PermissionMode,
    pub allowed_tools: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hook_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_parallel_tools: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl SessionConfig {
    /// Parse a TOML document.
    pub fn from_toml(raw: &str) -> Result<Self, KeelError> {
        toml::from_str(raw).map_err(|err| KeelError::Configuration(err.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, KeelError> {
        toml::to_string(self).map_err(|err| KeelError::Configuration(err.to_string()))
    }

    /// Load a config file; a missing file is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, KeelError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|err| KeelError::Configuration(format!("{}: {err}", path.display())))
    }

    /// Load a config file, falling back to defaults when it does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, KeelError> {
        match Self::load(path) {
            Err(KeelError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// `config.toml` under the platform config directory.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "keel", "keel")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Default config file (if any) with environment overrides applied.
    pub fn discover() -> Result<Self, KeelError> {
        let config = match Self::default_path() {
            Some(path) => Self::load_or_default(path)?,
            None => Self::default(),
        };
        config.with_env()
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, KeelError> {
        Self::default().with_env()
    }

    /// Apply `KEEL_*` overrides from the process environment, loading `.env` first.
    pub fn with_env(self) -> Result<Self, KeelError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        self.with_vars(|key| std::env::var(key).ok())
    }

    /// Apply `KEEL_*` overrides from an arbitrary lookup.
    pub fn with_vars(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, KeelError> {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(mode) = var(ENV_PERMISSION_MODE) {
            self.permission_mode = PermissionMode::from_str(&mode).map_err(|_| {
                KeelError::Configuration(format!(
                    "{ENV_PERMISSION_MODE}: unknown permission mode '{mode}'"
                ))
            })?;
        }
        if let Some(tools) = var(ENV_ALLOWED_TOOLS) {
            self.allowed_tools = tools
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(ms) = var(ENV_HOOK_TIMEOUT_MS) {
            self.hook_timeout_ms = Some(parse_number(ENV_HOOK_TIMEOUT_MS, &ms)?);
        }
        if let Some(ms) = var(ENV_TOOL_TIMEOUT_MS) {
            self.tool_timeout_ms = Some(parse_number(ENV_TOOL_TIMEOUT_MS, &ms)?);
        }
        if let Some(n) = var(ENV_MAX_TURNS) {
            self.max_turns = Some(parse_number(ENV_MAX_TURNS, &n)?);
        }
        if let Some(n) = var(ENV_MAX_PARALLEL_TOOLS) {
            self.max_parallel_tools = Some(parse_number(ENV_MAX_PARALLEL_TOOLS, &n)?);
        }
        if let Some(prompt) = lookup(ENV_SYSTEM_PROMPT).filter(|p| !p.trim().is_empty()) {
            self.system_prompt = Some(prompt);
        }
        Ok(self)
    }

    pub fn limits(&self) -> SessionLimits {
        let defaults = SessionLimits::default();
        SessionLimits {
            hook_timeout: self
                .hook_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.hook_timeout),
            tool_timeout: self.tool_timeout_ms.map(Duration::from_millis),
            max_turns: self.max_turns,
            max_parallel_tools: self
                .max_parallel_tools
                .unwrap_or(defaults.max_parallel_tools),
        }
    }

    /// Seed session options; tools, hooks, and the resolver stay unset.
    pub fn into_options(self) -> SessionOptions {
        let limits = self.limits();
        SessionOptions {
            allowed_tools: self.allowed_tools,
            permission_mode: self.permission_mode,
            system_prompt: self.system_prompt,
            limits,
            ..SessionOptions::default()
        }
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T, KeelError> {
    raw.parse()
        .map_err(|_| KeelError::Configuration(format!("{key}: expected a number, got '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_toml_with_camel_case_modes() {
        let config = SessionConfig::from_toml(
            r#"
            permission_mode = "plan"
            allowed_tools = ["mcp__calculator__add", "Read"]
            tool_timeout_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.permission_mode, PermissionMode::PlanOnly);
        assert_eq!(config.allowed_tools, vec!["mcp__calculator__add", "Read"]);
        assert_eq!(config.limits().tool_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.limits().max_parallel_tools, SessionLimits::default().max_parallel_tools);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = SessionConfig::from_toml("permision_mode = \"plan\"").unwrap_err();
        assert!(matches!(err, KeelError::Configuration(_)));
    }

    #[test]
    fn env_overrides_file_values() {
        let env = vars(&[
            (ENV_PERMISSION_MODE, "acceptEdits"),
            (ENV_ALLOWED_TOOLS, "mcp__calculator__add, mcp__calculator__multiply,"),
            (ENV_MAX_TURNS, "3"),
            (ENV_HOOK_TIMEOUT_MS, " 1500 "),
        ]);
        let config = SessionConfig {
            max_turns: Some(10),
            ..SessionConfig::default()
        }
        .with_vars(|key| env.get(key).cloned())
        .unwrap();

        assert_eq!(config.permission_mode, PermissionMode::AcceptEdits);
        assert_eq!(
            config.allowed_tools,
            vec!["mcp__calculator__add", "mcp__calculator__multiply"]
        );
        assert_eq!(config.max_turns, Some(3));
        assert_eq!(config.limits().hook_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn empty_env_values_are_ignored() {
        let env = vars(&[(ENV_PERMISSION_MODE, ""), (ENV_SYSTEM_PROMPT, "  ")]);
        let config = SessionConfig::default()
            .with_vars(|key| env.get(key).cloned())
            .unwrap();

        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn bad_env_values_name_the_variable() {
        let env = vars(&[(ENV_MAX_PARALLEL_TOOLS, "lots")]);
        let err = SessionConfig::default()
            .with_vars(|key| env.get(key).cloned())
            .unwrap_err();
        assert!(err.to_string().contains(ENV_MAX_PARALLEL_TOOLS));

        let env = vars(&[(ENV_PERMISSION_MODE, "yolo")]);
        let err = SessionConfig::default()
            .with_vars(|key| env.get(key).cloned())
            .unwrap_err();
        assert!(err.to_string().contains("unknown permission mode 'yolo'"));
    }

    #[test]
    fn into_options_carries_limits() {
        let options = SessionConfig {
            permission_mode: PermissionMode::BypassPermissions,
            max_parallel_tools: Some(2),
            system_prompt: Some("be brief".into()),
            ..SessionConfig::default()
        }
        .into_options();

        assert_eq!(options.permission_mode, PermissionMode::BypassPermissions);
        assert_eq!(options.limits.max_parallel_tools, 2);
        assert_eq!(options.system_prompt.as_deref(), Some("be brief"));
        assert!(options.mcp_servers.is_empty());
    }
}
