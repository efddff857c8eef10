//! Tool-name matchers for hook registrations.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::KeelError;

static NAME_LIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]+(\|[A-Za-z0-9_-]+)*$").expect("name list regex must compile")
});

/// Selects which tool names a hook applies to.
///
/// `None`, `""`, and `"*"` match everything; `Write|Edit` matches those exact
/// names; anything else is an anchored regular expression.
#[derive(Debug, Clone)]
pub enum HookMatcher {
    All,
    Names(Vec<String>),
    Pattern(Regex),
}

impl HookMatcher {
    pub fn parse(matcher: Option<&str>) -> Result<Self, KeelError> {
        let raw = match matcher.map(str::trim) {
            None | Some("") | Some("*") => return Ok(Self::All),
            Some(raw) => raw,
        };
        if NAME_LIST_RE.is_match(raw) {
            return Ok(Self::Names(raw.split('|').map(str::to_string).collect()));
        }
        Regex::new(&format!("^(?:{raw})$"))
            .map(Self::Pattern)
            .map_err(|e| KeelError::Configuration(format!("invalid hook matcher '{raw}': {e}")))
    }

    pub fn matches(&self, tool_name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Names(names) => names.iter().any(|name| name == tool_name),
            Self::Pattern(pattern) => pattern.is_match(tool_name),
        }
    }
}

impl Default for HookMatcher {
    fn default() -> Self {
        Self::All
    }
}
