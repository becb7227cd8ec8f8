//! Scripted providers for deterministic testing and transcript replay.
//!
//! Neither provider touches a real browser or disk.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use trawl_core::{
    BrowserControl, DirEntry, FileStore, InteractionKind, ToolFault, ToolName, ToolOutcome,
    ToolRequest,
};

/// One pre-configured reply from the scripted browser.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Reply(Result<Value, ToolFault>),
    /// Reply after a delay.
    Delayed(Duration, Result<Value, ToolFault>),
    /// Never reply. Used to force the invoker's timeout.
    Hang,
}

/// A browser that answers from a queue instead of driving Chrome.
///
/// # Example
/// ```
/// use trawl_tools::mock::ScriptedBrowser;
/// let browser = ScriptedBrowser::new()
///     .with_ok(serde_json::json!({ "url": "https://example.com" }))
///     .with_hang();
/// ```
#[derive(Default)]
pub struct ScriptedBrowser {
    script: Mutex<VecDeque<ScriptStep>>,
    /// Every call received, in order, as a wire request.
    calls: Arc<Mutex<Vec<ToolRequest>>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
    released: AtomicBool,
}

/// Tracks concurrent calls for the sequentiality assertions.
struct Active<'a>(&'a AtomicUsize);

impl Drop for Active<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ScriptedBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a browser that replays recorded outcomes in order.
    pub fn from_outcomes(outcomes: impl IntoIterator<Item = ToolOutcome>) -> Self {
        let browser = Self::new();
        for outcome in outcomes {
            browser.push(ScriptStep::Reply(outcome_to_result(outcome)));
        }
        browser
    }

    pub fn with_ok(self, data: Value) -> Self {
        self.push(ScriptStep::Reply(Ok(data)));
        self
    }

    pub fn with_fault(self, fault: ToolFault) -> Self {
        self.push(ScriptStep::Reply(Err(fault)));
        self
    }

    pub fn with_delay(self, delay: Duration, data: Value) -> Self {
        self.push(ScriptStep::Delayed(delay, Ok(data)));
        self
    }

    pub fn with_hang(self) -> Self {
        self.push(ScriptStep::Hang);
        self
    }

    /// Queue a step directly (for shared-reference access patterns).
    pub fn push(&self, step: ScriptStep) {
        self.script.lock().push_back(step);
    }

    pub fn recorded_calls(&self) -> Vec<ToolRequest> {
        self.calls.lock().clone()
    }

    /// Highest number of calls that were ever outstanding at once.
    pub fn max_concurrency(&self) -> usize {
        self.max_active.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }

    pub fn was_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    async fn answer(&self, call: ToolRequest) -> Result<Value, ToolFault> {
        self.calls.lock().push(call);
        let now = self.active.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_active.fetch_max(now, Ordering::AcqRel);
        let _active = Active(&self.active);

        let step = self.script.lock().pop_front();
        match step {
            Some(ScriptStep::Reply(result)) => result,
            Some(ScriptStep::Delayed(delay, result)) => {
                tokio::time::sleep(delay).await;
                result
            }
            Some(ScriptStep::Hang) => std::future::pending().await,
            None => Err(ToolFault::protocol("scripted browser: no more queued replies")),
        }
    }
}

fn outcome_to_result(outcome: ToolOutcome) -> Result<Value, ToolFault> {
    match outcome.error_kind() {
        None => Ok(outcome.data.unwrap_or(Value::Null)),
        Some(kind) => Err(ToolFault::new(kind, outcome.detail.unwrap_or_default())),
    }
}

#[async_trait]
impl BrowserControl for ScriptedBrowser {
    async fn navigate(&self, url: &str) -> Result<Value, ToolFault> {
        self.answer(ToolRequest::navigate(url)).await
    }

    async fn snapshot(&self) -> Result<Value, ToolFault> {
        self.answer(ToolRequest::snapshot()).await
    }

    async fn extract_fact(&self, hint: &str) -> Result<Value, ToolFault> {
        self.answer(ToolRequest::extract_fact(hint)).await
    }

    async fn interact(
        &self,
        kind: InteractionKind,
        target: &str,
        value: Option<&str>,
    ) -> Result<Value, ToolFault> {
        let mut args = json!({ "kind": kind.as_str(), "target": target });
        if let Some(v) = value {
            args["value"] = Value::String(v.to_string());
        }
        self.answer(ToolRequest::new(ToolName::Interact, args)).await
    }

    async fn wait(&self, condition: &str) -> Result<Value, ToolFault> {
        self.answer(ToolRequest::wait(condition)).await
    }

    async fn release(&self) {
        self.released.store(true, Ordering::Release);
    }
}

// ─── In-memory file store ────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    File(String),
    Dir,
}

/// A file store held in a map. Paths arrive already resolved.
#[derive(Default)]
pub struct MemoryFileStore {
    nodes: Mutex<BTreeMap<PathBuf, Node>>,
    mutations: AtomicUsize,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful write/mkdir/delete calls.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::Acquire)
    }

    /// All files and their contents.
    pub fn files(&self) -> BTreeMap<PathBuf, String> {
        self.nodes
            .lock()
            .iter()
            .filter_map(|(p, n)| match n {
                Node::File(c) => Some((p.clone(), c.clone())),
                Node::Dir => None,
            })
            .collect()
    }

    fn mark_parents(nodes: &mut BTreeMap<PathBuf, Node>, path: &Path) {
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            nodes.entry(ancestor.to_path_buf()).or_insert(Node::Dir);
        }
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn read(&self, path: &Path) -> Result<String, ToolFault> {
        match self.nodes.lock().get(path) {
            Some(Node::File(content)) => Ok(content.clone()),
            Some(Node::Dir) => Err(ToolFault::protocol(format!("{} is a directory", path.display()))),
            None => Err(ToolFault::not_found(format!("{} does not exist", path.display()))),
        }
    }

    async fn write(&self, path: &Path, content: &str) -> Result<(), ToolFault> {
        let mut nodes = self.nodes.lock();
        if matches!(nodes.get(path), Some(Node::Dir)) {
            return Err(ToolFault::protocol(format!("{} is a directory", path.display())));
        }
        Self::mark_parents(&mut nodes, path);
        nodes.insert(path.to_path_buf(), Node::File(content.to_string()));
        self.mutations.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn list(&self, path: &Path) -> Result<Vec<DirEntry>, ToolFault> {
        let nodes = self.nodes.lock();
        if !matches!(nodes.get(path), Some(Node::Dir)) {
            return Err(ToolFault::not_found(format!("{} is not a directory", path.display())));
        }
        Ok(nodes
            .iter()
            .filter(|(p, _)| p.parent() == Some(path))
            .filter_map(|(p, n)| {
                p.file_name().map(|name| DirEntry {
                    name: name.to_string_lossy().to_string(),
                    is_dir: *n == Node::Dir,
                })
            })
            .collect())
    }

    async fn mkdir(&self, path: &Path) -> Result<(), ToolFault> {
        let mut nodes = self.nodes.lock();
        if matches!(nodes.get(path), Some(Node::File(_))) {
            return Err(ToolFault::protocol(format!("{} is a file", path.display())));
        }
        Self::mark_parents(&mut nodes, path);
        nodes.insert(path.to_path_buf(), Node::Dir);
        self.mutations.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<(), ToolFault> {
        let mut nodes = self.nodes.lock();
        if nodes.remove(path).is_none() {
            return Err(ToolFault::not_found(format!("{} does not exist", path.display())));
        }
        nodes.retain(|p, _| !p.starts_with(path));
        self.mutations.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn exists(&self, path: &Path) -> bool {
        self.nodes.lock().contains_key(path)
    }
}
