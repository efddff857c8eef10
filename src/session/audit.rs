//! Per-session audit trail.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hooks::HookEvent;

/// Something worth keeping a record of that does not appear in the transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditEvent {
    HookTimedOut {
        event: HookEvent,
        order: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_use_id: Option<String>,
        timeout_ms: u64,
    },
    HookFailed {
        event: HookEvent,
        order: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_use_id: Option<String>,
        error: String,
    },
    /// Output of an audit-only hook (PostToolUse, Stop).
    HookOutput {
        event: HookEvent,
        order: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_use_id: Option<String>,
        output: serde_json::Value,
    },
    ToolDenied {
        tool_use_id: String,
        tool_name: String,
        reason: String,
    },
    ToolFailed {
        tool_use_id: String,
        tool_name: String,
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cause: Option<String>,
    },
    ToolCancelled {
        tool_use_id: String,
        tool_name: String,
        reason: String,
    },
    ToolCompleted {
        tool_use_id: String,
        tool_name: String,
        is_error: bool,
        duration_ms: u64,
    },
    PromptBlocked {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: AuditEvent,
}

/// Append-only, shareable audit log.
#[derive(Debug, Default)]
pub struct AuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: AuditEvent) {
        let record = AuditRecord {
            timestamp: Utc::now(),
            event,
        };
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record);
    }

    pub fn extend(&self, events: impl IntoIterator<Item = AuditEvent>) {
        for event in events {
            self.record(event);
        }
    }

    pub fn snapshot(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
