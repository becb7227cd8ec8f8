//! Writing finalized descriptors into the session workspace.

use std::path::PathBuf;
use tracing::{info, warn};

use trawl_config::ExistingArtifactPolicy;
use trawl_core::{FileStore, Result, TaskDescriptor, ToolFault, TrawlError};
use trawl_tools::WorkspaceRoot;

/// What happened to the descriptor file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persisted {
    Written(PathBuf),
    /// An earlier descriptor for the same target was replaced.
    Overwrote(PathBuf),
    /// An earlier descriptor exists and the policy keeps it.
    Preserved(PathBuf),
}

impl Persisted {
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Written(p) | Self::Overwrote(p) | Self::Preserved(p) => p,
        }
    }
}

/// `descriptors/<slug>.json`, relative to the session workspace.
///
/// The slug is built from the target's host and path, e.g.
/// `https://example.com/login` → `example-com-login`.
pub fn descriptor_path(descriptor: &TaskDescriptor) -> String {
    let slug = descriptor
        .target_url()
        .and_then(|u| url::Url::parse(u).ok())
        .map(|u| format!("{}{}", u.host_str().unwrap_or_default(), u.path()))
        .map(|raw| slugify(&raw))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "untitled".to_string());
    format!("descriptors/{slug}.json")
}

fn slugify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

/// Write `descriptor` as pretty JSON under `workspace`.
///
/// The path goes through [`WorkspaceRoot::resolve`] like any tool call.
pub async fn persist_descriptor(
    files: &dyn FileStore,
    workspace: &WorkspaceRoot,
    descriptor: &TaskDescriptor,
    policy: ExistingArtifactPolicy,
) -> Result<Persisted> {
    let relative = descriptor_path(descriptor);
    let path = workspace.resolve(&relative).map_err(|f| write_failure(&relative, f))?;
    let existed = files.exists(&path).await;

    if existed && policy == ExistingArtifactPolicy::Preserve {
        info!(path = %path.display(), "descriptor exists, preserving");
        return Ok(Persisted::Preserved(path));
    }

    let body = descriptor.to_pretty_json()?;
    files
        .write(&path, &body)
        .await
        .map_err(|f| write_failure(&relative, f))?;

    if existed {
        warn!(path = %path.display(), "overwrote existing descriptor");
        Ok(Persisted::Overwrote(path))
    } else {
        info!(path = %path.display(), "descriptor written");
        Ok(Persisted::Written(path))
    }
}

fn write_failure(path: &str, fault: ToolFault) -> TrawlError {
    TrawlError::ToolFailure {
        tool: "write".into(),
        kind: fault.kind,
        reason: format!("{path}: {}", fault.reason),
    }
}
