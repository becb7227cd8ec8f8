//! Minimal per-tool argument schema, checked before anything is dispatched.

use serde_json::Value;
use trawl_core::{InteractionKind, ToolFault, ToolName, ToolRequest};

/// Check `request` and return the tool it names.
///
/// Any failure is a `ProtocolError`; the provider never sees a malformed call.
pub fn validate(request: &ToolRequest) -> Result<ToolName, ToolFault> {
    let tool = ToolName::parse(&request.tool)
        .ok_or_else(|| ToolFault::protocol(format!("unknown tool '{}'", request.tool)))?;

    match &request.args {
        Value::Object(_) => {}
        Value::Null if tool == ToolName::Snapshot => {}
        other => {
            return Err(ToolFault::protocol(format!(
                "{tool}: args must be an object, got {}",
                type_name(other)
            )));
        }
    }

    match tool {
        ToolName::Navigate => {
            let raw = required_str(request, tool, "url")?;
            let parsed = url::Url::parse(raw)
                .map_err(|e| ToolFault::protocol(format!("navigate: invalid url '{raw}': {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ToolFault::protocol(format!(
                    "navigate: unsupported scheme '{}'",
                    parsed.scheme()
                )));
            }
        }
        ToolName::Snapshot => {}
        ToolName::ExtractFact => {
            non_empty(request, tool, "hint")?;
        }
        ToolName::Interact => {
            let kind = required_str(request, tool, "kind")?;
            let kind = InteractionKind::parse(kind)
                .ok_or_else(|| ToolFault::protocol(format!("interact: unknown kind '{kind}'")))?;
            non_empty(request, tool, "target")?;
            if kind.requires_value() {
                required_str(request, tool, "value")?;
            } else {
                optional_str(request, tool, "value")?;
            }
            optional_str(request, tool, "element")?;
        }
        ToolName::Wait => {
            let condition = required_str(request, tool, "condition")?;
            parse_wait_condition(condition)?;
        }
        ToolName::Read | ToolName::List | ToolName::Mkdir | ToolName::Delete => {
            required_str(request, tool, "path")?;
        }
        ToolName::Write => {
            required_str(request, tool, "path")?;
            required_str(request, tool, "content")?;
        }
    }
    Ok(tool)
}

/// A parsed `wait` condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitCondition {
    Load,
    Selector(String),
    Idle(u64),
}

pub fn parse_wait_condition(raw: &str) -> Result<WaitCondition, ToolFault> {
    if raw == "load" {
        return Ok(WaitCondition::Load);
    }
    if let Some(css) = raw.strip_prefix("selector:") {
        let css = css.trim();
        if css.is_empty() {
            return Err(ToolFault::protocol("wait: empty selector"));
        }
        return Ok(WaitCondition::Selector(css.to_string()));
    }
    if let Some(ms) = raw.strip_prefix("idle:") {
        let ms = ms
            .trim()
            .parse::<u64>()
            .map_err(|_| ToolFault::protocol(format!("wait: invalid idle duration '{ms}'")))?;
        return Ok(WaitCondition::Idle(ms));
    }
    Err(ToolFault::protocol(format!(
        "wait: unknown condition '{raw}' (expected load, selector:<css>, idle:<ms>)"
    )))
}

fn required_str<'a>(request: &'a ToolRequest, tool: ToolName, key: &str) -> Result<&'a str, ToolFault> {
    match request.args.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(ToolFault::protocol(format!(
            "{tool}: '{key}' must be a string, got {}",
            type_name(other)
        ))),
        None => Err(ToolFault::protocol(format!("{tool}: missing '{key}'"))),
    }
}

fn non_empty<'a>(request: &'a ToolRequest, tool: ToolName, key: &str) -> Result<&'a str, ToolFault> {
    let value = required_str(request, tool, key)?;
    if value.trim().is_empty() {
        return Err(ToolFault::protocol(format!("{tool}: '{key}' is empty")));
    }
    Ok(value)
}

fn optional_str(request: &ToolRequest, tool: ToolName, key: &str) -> Result<(), ToolFault> {
    match request.args.get(key) {
        None | Some(Value::Null) | Some(Value::String(_)) => Ok(()),
        Some(other) => Err(ToolFault::protocol(format!(
            "{tool}: '{key}' must be a string, got {}",
            type_name(other)
        ))),
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
