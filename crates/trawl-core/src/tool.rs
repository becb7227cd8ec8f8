use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::{ToolErrorKind, ToolFault};

/// Which external capability provider serves a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Browser,
    FileStore,
}

/// Every verb the invocation layer can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    // Browser control
    Navigate,
    Snapshot,
    ExtractFact,
    Interact,
    Wait,
    // File store
    Read,
    Write,
    List,
    Mkdir,
    Delete,
}

impl ToolName {
    pub const ALL: [ToolName; 10] = [
        ToolName::Navigate,
        ToolName::Snapshot,
        ToolName::ExtractFact,
        ToolName::Interact,
        ToolName::Wait,
        ToolName::Read,
        ToolName::Write,
        ToolName::List,
        ToolName::Mkdir,
        ToolName::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::Snapshot => "snapshot",
            Self::ExtractFact => "extract_fact",
            Self::Interact => "interact",
            Self::Wait => "wait",
            Self::Read => "read",
            Self::Write => "write",
            Self::List => "list",
            Self::Mkdir => "mkdir",
            Self::Delete => "delete",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == name)
    }

    pub fn provider(&self) -> ProviderKind {
        match self {
            Self::Navigate | Self::Snapshot | Self::ExtractFact | Self::Interact | Self::Wait => {
                ProviderKind::Browser
            }
            Self::Read | Self::Write | Self::List | Self::Mkdir | Self::Delete => {
                ProviderKind::FileStore
            }
        }
    }

    /// Read-only file-store verbs. Every browser verb is treated as state-changing.
    pub fn is_idempotent(&self) -> bool {
        matches!(self, Self::Read | Self::List)
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of interaction performed against a located element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    Click,
    Fill,
    Press,
    Select,
    Hover,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Fill => "fill",
            Self::Press => "press",
            Self::Select => "select",
            Self::Hover => "hover",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "click" => Some(Self::Click),
            "fill" => Some(Self::Fill),
            "press" => Some(Self::Press),
            "select" => Some(Self::Select),
            "hover" => Some(Self::Hover),
            _ => None,
        }
    }

    /// Kinds that carry a value (text to type, key to press, option to pick).
    pub fn requires_value(&self) -> bool {
        matches!(self, Self::Fill | Self::Press | Self::Select)
    }
}

impl std::fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single tool call: `{ "tool": "<name>", "args": { ... } }`.
///
/// The name stays a plain string so a malformed request can still be
/// recorded and rejected by the invocation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolRequest {
    pub fn new(tool: ToolName, args: Value) -> Self {
        Self {
            tool: tool.as_str().to_string(),
            args,
        }
    }

    pub fn navigate(url: &str) -> Self {
        Self::new(ToolName::Navigate, json!({ "url": url }))
    }

    pub fn snapshot() -> Self {
        Self::new(ToolName::Snapshot, json!({}))
    }

    pub fn extract_fact(hint: &str) -> Self {
        Self::new(ToolName::ExtractFact, json!({ "hint": hint }))
    }

    /// `element` names the fact the selector came from so the store can
    /// attach a validation result to it.
    pub fn interact(
        kind: InteractionKind,
        target: &str,
        value: Option<&str>,
        element: &str,
    ) -> Self {
        let mut args = json!({
            "kind": kind.as_str(),
            "target": target,
            "element": element,
        });
        if let Some(v) = value {
            args["value"] = Value::String(v.to_string());
        }
        Self::new(ToolName::Interact, args)
    }

    pub fn wait(condition: &str) -> Self {
        Self::new(ToolName::Wait, json!({ "condition": condition }))
    }

    pub fn read(path: &str) -> Self {
        Self::new(ToolName::Read, json!({ "path": path }))
    }

    pub fn write(path: &str, content: &str) -> Self {
        Self::new(ToolName::Write, json!({ "path": path, "content": content }))
    }

    pub fn list(path: &str) -> Self {
        Self::new(ToolName::List, json!({ "path": path }))
    }

    pub fn mkdir(path: &str) -> Self {
        Self::new(ToolName::Mkdir, json!({ "path": path }))
    }

    pub fn delete(path: &str) -> Self {
        Self::new(ToolName::Delete, json!({ "path": path }))
    }

    pub fn name(&self) -> Option<ToolName> {
        ToolName::parse(&self.tool)
    }

    /// String argument lookup.
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(|v| v.as_str())
    }

    /// Compact human-readable form, e.g. `navigate(https://example.com)`.
    pub fn describe(&self) -> String {
        let inner = match self.name() {
            Some(ToolName::Navigate) => self.arg_str("url").unwrap_or_default().to_string(),
            Some(ToolName::ExtractFact) => self.arg_str("hint").unwrap_or_default().to_string(),
            Some(ToolName::Interact) => format!(
                "{}, {}",
                self.arg_str("kind").unwrap_or_default(),
                self.arg_str("target").unwrap_or_default()
            ),
            Some(ToolName::Wait) => self.arg_str("condition").unwrap_or_default().to_string(),
            Some(ToolName::Snapshot) => String::new(),
            Some(_) => self.arg_str("path").unwrap_or_default().to_string(),
            None => self.args.to_string(),
        };
        format!("{}({})", self.tool, inner)
    }
}

/// Normalised result of a tool call: `{ "ok": bool, "data"?: any, "error"?: "<ErrorKind>" }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolErrorKind>,
    /// Human-readable failure detail. Not part of the decision inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ToolOutcome {
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
            detail: None,
        }
    }

    pub fn failure(fault: ToolFault) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(fault.kind),
            detail: Some(fault.reason),
        }
    }

    pub fn from_result(result: std::result::Result<Value, ToolFault>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(fault) => Self::failure(fault),
        }
    }

    /// Error kind of a failed outcome. A failure without a kind is a protocol error.
    pub fn error_kind(&self) -> Option<ToolErrorKind> {
        if self.ok {
            None
        } else {
            Some(self.error.unwrap_or(ToolErrorKind::ProtocolError))
        }
    }

    /// Whether any string inside `data` equals `value` exactly.
    pub fn contains_value(&self, value: &str) -> bool {
        fn walk(v: &Value, needle: &str) -> bool {
            match v {
                Value::String(s) => s == needle,
                Value::Array(items) => items.iter().any(|i| walk(i, needle)),
                Value::Object(map) => map.values().any(|i| walk(i, needle)),
                _ => false,
            }
        }
        self.data.as_ref().is_some_and(|d| walk(d, value))
    }
}
