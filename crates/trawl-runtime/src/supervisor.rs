use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use trawl_config::TrawlConfig;
use trawl_config::schema::BrowserConfig;
use trawl_core::{
    BrowserControl, EventBus, FileStore, Result, Task, TaskEvent, TaskStatus, TaskType, TrawlError,
};
use trawl_planner::RequestNormalizer;
use trawl_tools::{CdpBrowser, ToolInvoker, WorkspaceRoot};

use crate::persist::{Persisted, persist_descriptor};
use crate::runner::{TaskOutcome, TaskRunner};

/// Opens one browser session per task.
pub trait BrowserFactory: Send + Sync {
    fn create(&self, task: &Task) -> Arc<dyn BrowserControl>;
}

/// Each task gets its own tab on the configured Chrome.
pub struct CdpBrowserFactory {
    config: BrowserConfig,
}

impl CdpBrowserFactory {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

impl BrowserFactory for CdpBrowserFactory {
    fn create(&self, _task: &Task) -> Arc<dyn BrowserControl> {
        Arc::new(CdpBrowser::new(self.config.clone()))
    }
}

type Running = JoinHandle<(TaskRunner, Result<TaskOutcome>)>;

/// A running task.
pub struct TaskHandle {
    pub task_id: Uuid,
    pub session_id: String,
    cancel: CancellationToken,
    join: Running,
}

impl TaskHandle {
    /// Request cancellation. Takes effect before the next turn is issued.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub async fn join(self) -> Result<TaskOutcome> {
        let (_, result) = self.join.await.map_err(join_error)?;
        result
    }
}

fn join_error(e: tokio::task::JoinError) -> TrawlError {
    TrawlError::Other(anyhow::anyhow!("task runner panicked or was aborted: {e}"))
}

enum Entry {
    Start,
    Resume(String),
}

/// Runs tasks concurrently. Every task has its own store, invoker, and
/// browser session; all tasks share one file store.
#[derive(Clone)]
pub struct Supervisor {
    config: Arc<TrawlConfig>,
    files: Arc<dyn FileStore>,
    browsers: Arc<dyn BrowserFactory>,
    normalizer: Arc<dyn RequestNormalizer>,
    events: EventBus,
    shutdown: CancellationToken,
    running: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
}

impl Supervisor {
    pub fn new(
        config: TrawlConfig,
        files: Arc<dyn FileStore>,
        browsers: Arc<dyn BrowserFactory>,
        normalizer: Arc<dyn RequestNormalizer>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            files,
            browsers,
            normalizer,
            events: EventBus::default(),
            shutdown: CancellationToken::new(),
            running: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &TrawlConfig {
        &self.config
    }

    pub async fn running_count(&self) -> usize {
        self.running.read().await.len()
    }

    /// Start a task for `request` in `session`.
    ///
    /// Fails only if the session name would place its workspace outside
    /// the configured root.
    pub async fn spawn(&self, session: &str, request: &str) -> Result<TaskHandle> {
        let workspace = self.session_workspace(session)?;
        let task = Task::new(session, request);
        let browser = self.browsers.create(&task);
        let invoker = ToolInvoker::new(browser, self.files.clone(), workspace, &self.config.tools);
        let cancel = self.shutdown.child_token();
        let runner = TaskRunner::from_request(
            task,
            self.normalizer.as_ref(),
            invoker,
            &self.config.orchestrator,
        )
        .with_events(self.events.clone())
        .with_cancel(cancel.clone());

        Ok(self.launch(runner, Entry::Start).await)
    }

    /// Continue a task that ended in `AWAITING_TARGET`, with the missing target.
    pub async fn resume(&self, handle: TaskHandle, target_url: &str) -> Result<TaskHandle> {
        let (runner, _) = handle.join.await.map_err(join_error)?;
        if runner.state().phase != TaskStatus::AwaitingTarget {
            return Err(TrawlError::InvalidTransition {
                phase: runner.state().phase.to_string(),
                event: "resume".into(),
            });
        }
        Ok(self.launch(runner, Entry::Resume(target_url.to_string())).await)
    }

    /// Cancel every running task.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn launch(&self, mut runner: TaskRunner, entry: Entry) -> TaskHandle {
        let task_id = runner.task().id;
        let session_id = runner.task().session_id.clone();
        let cancel = runner.cancel_token();
        self.running.write().await.insert(task_id, cancel.clone());

        let files = self.files.clone();
        let running = self.running.clone();
        let workspace = self.config.workspace.clone();

        let join = tokio::spawn(async move {
            let result = match entry {
                Entry::Start => runner.run().await,
                Entry::Resume(url) => runner.resume(&url).await,
            };

            let result = match result {
                Ok(mut outcome) if !outcome.is_resumable() => {
                    if workspace.persist_descriptors
                        && let Some(descriptor) = outcome
                            .descriptor
                            .as_ref()
                            .filter(|d| d.task_type() == TaskType::GeneratePom)
                    {
                        let root = runner.invoker().workspace().clone();
                        match persist_descriptor(
                            files.as_ref(),
                            &root,
                            descriptor,
                            workspace.on_existing,
                        )
                        .await
                        {
                            Ok(persisted) => {
                                runner.events().publish(TaskEvent::DescriptorPersisted {
                                    task_id,
                                    path: persisted.path().display().to_string(),
                                    at: chrono::Utc::now(),
                                });
                                if matches!(persisted, Persisted::Overwrote(_)) {
                                    outcome.warnings.push(format!(
                                        "overwrote existing descriptor at {}",
                                        persisted.path().display()
                                    ));
                                }
                                outcome.persisted_to = Some(persisted.path().clone());
                            }
                            Err(e) => {
                                warn!(task_id = %task_id, error = %e, "descriptor not persisted");
                                outcome.warnings.push(format!("descriptor not persisted: {e}"));
                            }
                        }
                    }
                    runner.invoker().browser().release().await;
                    Ok(outcome)
                }
                // Resumable: keep the browser session for the continuation.
                Ok(outcome) => Ok(outcome),
                Err(e) => {
                    runner.invoker().browser().release().await;
                    Err(e)
                }
            };

            running.write().await.remove(&task_id);
            match &result {
                Ok(outcome) => info!(task_id = %task_id, summary = %outcome.summary(), "task ended"),
                Err(e) => warn!(task_id = %task_id, error = %e, "task aborted"),
            }
            (runner, result)
        });

        TaskHandle {
            task_id,
            session_id,
            cancel,
            join,
        }
    }

    /// `<root>/<session>`, refusing session names that escape the root.
    fn session_workspace(&self, session: &str) -> Result<WorkspaceRoot> {
        if session.trim().is_empty() {
            return Err(TrawlError::ConfigValidation {
                field: "session".into(),
                reason: "must not be empty".into(),
            });
        }
        let root = WorkspaceRoot::new(&self.config.workspace.root);
        let path = root.resolve(session).map_err(|f| TrawlError::ToolFailure {
            tool: "workspace".into(),
            kind: f.kind,
            reason: f.reason,
        })?;
        Ok(WorkspaceRoot::new(path))
    }
}
