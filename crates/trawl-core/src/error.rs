use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failed tool invocation, as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolErrorKind {
    NotFound,
    Timeout,
    PermissionDenied,
    ProtocolError,
}

impl std::fmt::Display for ToolErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotFound => "NotFound",
            Self::Timeout => "Timeout",
            Self::PermissionDenied => "PermissionDenied",
            Self::ProtocolError => "ProtocolError",
        };
        f.write_str(s)
    }
}

/// Error returned by a capability provider for a single call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {reason}")]
pub struct ToolFault {
    pub kind: ToolErrorKind,
    pub reason: String,
}

impl ToolFault {
    pub fn new(kind: ToolErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::NotFound, reason)
    }

    pub fn timeout(reason: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Timeout, reason)
    }

    pub fn permission_denied(reason: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::PermissionDenied, reason)
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::ProtocolError, reason)
    }
}

/// Why a task ended in `Failed`. Carried on the task outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskFailure {
    /// A tool call kept failing after the retry budget was spent.
    Tool {
        tool: String,
        error: ToolErrorKind,
        detail: String,
    },
    /// A provenance or sequencing rule was broken.
    Policy { rule: String, detail: String },
    /// The finalizer rejected the accumulated state and nothing can fix it.
    Schema { detail: String },
    /// The task issued more tool calls than allowed.
    TurnLimit { limit: u32 },
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tool {
                tool,
                error,
                detail,
            } => write!(f, "tool '{tool}' failed with {error}: {detail}"),
            Self::Policy { rule, detail } => write!(f, "policy violation [{rule}]: {detail}"),
            Self::Schema { detail } => write!(f, "schema violation: {detail}"),
            Self::TurnLimit { limit } => write!(f, "turn limit of {limit} reached"),
        }
    }
}

/// Unified error type for the trawl workspace.
#[derive(Error, Debug)]
pub enum TrawlError {
    // ── Orchestration errors ───────────────────────────────────
    #[error("clarification needed: {0}")]
    ClarificationNeeded(String),

    #[error("tool failure: {tool}: {kind}: {reason}")]
    ToolFailure {
        tool: String,
        kind: ToolErrorKind,
        reason: String,
    },

    #[error("policy violation: {rule}: {detail}")]
    PolicyViolation { rule: String, detail: String },

    #[error("schema violation: {field}: {reason}")]
    SchemaViolation { field: String, reason: String },

    #[error("invalid transition: event {event} in phase {phase}")]
    InvalidTransition { phase: String, event: String },

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl TrawlError {
    pub fn policy(rule: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::PolicyViolation {
            rule: rule.into(),
            detail: detail.into(),
        }
    }

    pub fn schema(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SchemaViolation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TrawlError>;
