//! Capability-provider seams.
//!
//! The invocation layer talks to the outside world only through these two
//! traits. Arguments arrive already validated; file-store paths arrive already
//! resolved inside the workspace root.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::ToolFault;
use crate::tool::InteractionKind;

/// Stateful browser-control surface. Every call may change page state.
#[async_trait]
pub trait BrowserControl: Send + Sync {
    /// Load `url` in the session's active page.
    async fn navigate(&self, url: &str) -> Result<Value, ToolFault>;

    /// Structural snapshot of the current page. The result carries an
    /// `elements` array whose entries have a `name` field.
    async fn snapshot(&self) -> Result<Value, ToolFault>;

    /// Resolve a human hint ("login button") to a real selector. A result
    /// without a `selector` string means the element could not be located.
    async fn extract_fact(&self, hint: &str) -> Result<Value, ToolFault>;

    async fn interact(
        &self,
        kind: InteractionKind,
        target: &str,
        value: Option<&str>,
    ) -> Result<Value, ToolFault>;

    async fn wait(&self, condition: &str) -> Result<Value, ToolFault>;

    /// Drop any held browser session. Called on cancellation and teardown.
    async fn release(&self) {}
}

/// A directory listing entry returned by [`FileStore::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Shared file-store surface.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn read(&self, path: &Path) -> Result<String, ToolFault>;

    async fn write(&self, path: &Path, content: &str) -> Result<(), ToolFault>;

    async fn list(&self, path: &Path) -> Result<Vec<DirEntry>, ToolFault>;

    async fn mkdir(&self, path: &Path) -> Result<(), ToolFault>;

    async fn delete(&self, path: &Path) -> Result<(), ToolFault>;

    async fn exists(&self, path: &Path) -> bool;
}
