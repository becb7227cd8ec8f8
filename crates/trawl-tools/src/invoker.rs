use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use trawl_config::schema::ToolsConfig;
use trawl_core::{
    BrowserControl, FileStore, InteractionKind, ProviderKind, ToolFault, ToolName, ToolOutcome,
    ToolRequest,
};

use crate::schema;
use crate::workspace::WorkspaceRoot;

/// Dispatches one tool call at a time to the right capability provider.
///
/// One invoker per task. A second `invoke` while one is outstanding is
/// refused with `ProtocolError` rather than queued.
pub struct ToolInvoker {
    browser: Arc<dyn BrowserControl>,
    files: Arc<dyn FileStore>,
    workspace: WorkspaceRoot,
    action_timeout: Duration,
    navigation_timeout: Duration,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when the call finishes or its future is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ToolInvoker {
    pub fn new(
        browser: Arc<dyn BrowserControl>,
        files: Arc<dyn FileStore>,
        workspace: WorkspaceRoot,
        tools: &ToolsConfig,
    ) -> Self {
        Self {
            browser,
            files,
            workspace,
            action_timeout: tools.action_timeout(),
            navigation_timeout: tools.navigation_timeout(),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn workspace(&self) -> &WorkspaceRoot {
        &self.workspace
    }

    pub fn browser(&self) -> &Arc<dyn BrowserControl> {
        &self.browser
    }

    /// Execute a single request. Never panics; every failure is folded into
    /// a `ToolOutcome { ok: false, error: Some(kind) }`.
    pub async fn invoke(&self, request: &ToolRequest) -> ToolOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(tool = %request.tool, "rejected: another call is still in flight");
            return ToolOutcome::failure(ToolFault::protocol(
                "a tool call is already in flight for this task",
            ));
        }
        let _flight = InFlight(&self.in_flight);

        let outcome = ToolOutcome::from_result(self.dispatch(request).await);
        debug!(
            tool = %request.tool,
            ok = outcome.ok,
            error = ?outcome.error,
            "tool call returned"
        );
        outcome
    }

    async fn dispatch(&self, request: &ToolRequest) -> Result<Value, ToolFault> {
        let tool = schema::validate(request)?;
        let limit = if tool == ToolName::Navigate {
            self.navigation_timeout
        } else {
            self.action_timeout
        };

        let call = async {
            match tool.provider() {
                ProviderKind::Browser => self.call_browser(tool, request).await,
                ProviderKind::FileStore => self.call_files(tool, request).await,
            }
        };

        tokio::time::timeout(limit, call).await.map_err(|_| {
            ToolFault::timeout(format!("{tool} exceeded {}ms", limit.as_millis()))
        })?
    }

    async fn call_browser(&self, tool: ToolName, request: &ToolRequest) -> Result<Value, ToolFault> {
        let arg = |key: &str| request.arg_str(key).unwrap_or_default();
        match tool {
            ToolName::Navigate => self.browser.navigate(arg("url")).await,
            ToolName::Snapshot => self.browser.snapshot().await,
            ToolName::ExtractFact => self.browser.extract_fact(arg("hint")).await,
            ToolName::Interact => {
                let kind = InteractionKind::parse(arg("kind"))
                    .ok_or_else(|| ToolFault::protocol("interact: unknown kind"))?;
                self.browser
                    .interact(kind, arg("target"), request.arg_str("value"))
                    .await
            }
            ToolName::Wait => self.browser.wait(arg("condition")).await,
            other => Err(ToolFault::protocol(format!("{other} is not a browser verb"))),
        }
    }

    /// File-store verbs. The path is resolved inside the workspace before
    /// the provider is touched.
    async fn call_files(&self, tool: ToolName, request: &ToolRequest) -> Result<Value, ToolFault> {
        let raw = request.arg_str("path").unwrap_or_default();
        let path = self.workspace.resolve(raw)?;
        let shown = self.workspace.relative(&path).display().to_string();

        match tool {
            ToolName::Read => {
                let content = self.files.read(&path).await?;
                Ok(json!({ "path": shown, "content": content }))
            }
            ToolName::Write => {
                let content = request.arg_str("content").unwrap_or_default();
                self.files.write(&path, content).await?;
                Ok(json!({ "path": shown, "bytes": content.len() }))
            }
            ToolName::List => {
                let entries = self.files.list(&path).await?;
                Ok(json!({ "path": shown, "entries": entries }))
            }
            ToolName::Mkdir => {
                self.files.mkdir(&path).await?;
                Ok(json!({ "path": shown }))
            }
            ToolName::Delete => {
                self.files.delete(&path).await?;
                Ok(json!({ "path": shown }))
            }
            other => Err(ToolFault::protocol(format!("{other} is not a file-store verb"))),
        }
    }
}
