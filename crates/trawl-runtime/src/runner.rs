use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use trawl_config::schema::OrchestratorConfig;
use trawl_core::{
    EventBus, Result, Task, TaskDescriptor, TaskEvent, TaskFailure, TaskStatus, TaskType,
    ToolOutcome, ToolRequest, TrawlError,
};
use trawl_planner::{Action, Event, Finalizer, Goal, PlanState, RequestNormalizer, Router};
use trawl_store::{StateStore, TurnRecord};
use trawl_tools::ToolInvoker;

/// What a run produced. Returned for every ending, including clarification.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub task_id: uuid::Uuid,
    pub session_id: String,
    /// The target the task ran against, whether named in the request or
    /// supplied on resume.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<TaskDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<TaskFailure>,
    pub warnings: Vec<String>,
    pub turns: Vec<TurnRecord>,
    pub elapsed_ms: u64,
    /// Where the descriptor was written, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persisted_to: Option<PathBuf>,
}

impl TaskOutcome {
    /// The task stopped for missing input and can be resumed.
    pub fn is_resumable(&self) -> bool {
        self.status == TaskStatus::AwaitingTarget
    }

    pub fn summary(&self) -> String {
        match (&self.status, &self.descriptor, &self.failure) {
            (TaskStatus::Finalized, Some(d), _) => format!(
                "finalized {} with {} locator(s) in {} turn(s)",
                d.target_url().unwrap_or_default(),
                d.extracted_locators().len(),
                self.turns.len()
            ),
            (TaskStatus::AwaitingTarget, Some(d), _) => {
                format!("clarification needed: {}", d.reasoning())
            }
            (TaskStatus::Failed, _, Some(f)) => format!("failed after {} turn(s): {f}", self.turns.len()),
            (status, _, _) => format!("{status} after {} turn(s)", self.turns.len()),
        }
    }
}

/// Drives one task through the router until it finalizes, fails, is
/// cancelled, or needs clarification.
///
/// Exactly one tool call is outstanding at a time; cancellation is only
/// observed between turns.
pub struct TaskRunner {
    task: Task,
    state: PlanState,
    store: StateStore,
    router: Router,
    finalizer: Finalizer,
    invoker: ToolInvoker,
    events: EventBus,
    cancel: CancellationToken,
    descriptor: Option<TaskDescriptor>,
    started: Instant,
}

impl TaskRunner {
    pub fn new(mut task: Task, goal: Goal, invoker: ToolInvoker, config: &OrchestratorConfig) -> Self {
        task.target_url = goal.target_url.clone();
        let store = StateStore::new(task.id);
        Self {
            task,
            state: PlanState::new(goal),
            store,
            router: Router::new(config),
            finalizer: Finalizer::new(),
            invoker,
            events: EventBus::default(),
            cancel: CancellationToken::new(),
            descriptor: None,
            started: Instant::now(),
        }
    }

    /// Normalize `task.raw_request` and build a runner for it.
    pub fn from_request(
        task: Task,
        normalizer: &dyn RequestNormalizer,
        invoker: ToolInvoker,
        config: &OrchestratorConfig,
    ) -> Self {
        let goal = normalizer.normalize(&task.raw_request);
        Self::new(task, goal, invoker, config)
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn state(&self) -> &PlanState {
        &self.state
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn invoker(&self) -> &ToolInvoker {
        &self.invoker
    }

    pub async fn run(&mut self) -> Result<TaskOutcome> {
        self.events.publish(TaskEvent::TaskCreated {
            task_id: self.task.id,
            session_id: self.task.session_id.clone(),
            request: self.task.raw_request.clone(),
        });
        info!(task_id = %self.task.id, session = %self.task.session_id, "task started");
        self.drive(Event::Start).await
    }

    /// Continue a task that stopped in `AWAITING_TARGET`.
    pub async fn resume(&mut self, target_url: &str) -> Result<TaskOutcome> {
        if self.state.phase != TaskStatus::AwaitingTarget {
            return Err(TrawlError::InvalidTransition {
                phase: self.state.phase.to_string(),
                event: "resume".into(),
            });
        }
        match url::Url::parse(target_url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {}
            _ => {
                return Err(TrawlError::ClarificationNeeded(format!(
                    "'{target_url}' is not an http(s) URL"
                )));
            }
        }
        self.task.target_url = Some(target_url.to_string());
        info!(task_id = %self.task.id, target_url, "task resumed");
        self.drive(Event::TargetProvided(target_url.to_string())).await
    }

    async fn drive(&mut self, first: Event) -> Result<TaskOutcome> {
        let mut event = first;
        loop {
            // Between turns: nothing is outstanding here.
            if self.cancel.is_cancelled() && !matches!(event, Event::Cancel) {
                event = Event::Cancel;
            }

            let transition = match self.router.decide(&self.state, &self.store, event) {
                Ok(t) => t,
                Err(TrawlError::PolicyViolation { rule, detail }) => {
                    warn!(task_id = %self.task.id, %rule, %detail, "policy violation");
                    self.router.decide(
                        &self.state,
                        &self.store,
                        Event::PolicyViolated { rule, detail },
                    )?
                }
                Err(e) => return Err(e),
            };
            self.enter(transition.state);

            event = match transition.action {
                Action::Invoke { request, backoff } => {
                    if let Some(delay) = backoff {
                        debug!(task_id = %self.task.id, ?delay, "backing off before retry");
                        let cancelled = tokio::select! {
                            _ = self.cancel.cancelled() => true,
                            _ = tokio::time::sleep(delay) => false,
                        };
                        if cancelled {
                            event = Event::Cancel;
                            continue;
                        }
                    }
                    self.turn(request).await?
                }
                Action::Clarify { reason } => {
                    info!(task_id = %self.task.id, %reason, "clarification needed");
                    self.events.publish(TaskEvent::ClarificationRequested {
                        task_id: self.task.id,
                        reason: reason.clone(),
                    });
                    self.descriptor = Some(Finalizer::clarification(&reason));
                    return Ok(self.outcome());
                }
                Action::Finalize => match self.finalizer.finalize(&self.state, &self.store) {
                    Ok(descriptor) => {
                        self.descriptor = Some(descriptor);
                        Event::Finalized
                    }
                    Err(TrawlError::SchemaViolation { field, reason }) => {
                        warn!(task_id = %self.task.id, %field, %reason, "finalization rejected");
                        Event::FinalizeRejected(format!("{field}: {reason}"))
                    }
                    Err(TrawlError::PolicyViolation { rule, detail }) => {
                        Event::PolicyViolated { rule, detail }
                    }
                    Err(e) => return Err(e),
                },
                Action::Fail(failure) => {
                    warn!(task_id = %self.task.id, %failure, "task failed");
                    self.events.publish(TaskEvent::TaskFailed {
                        task_id: self.task.id,
                        failure,
                    });
                    return Ok(self.outcome());
                }
                Action::Release => {
                    self.invoker.browser().release().await;
                    info!(task_id = %self.task.id, "task cancelled");
                    self.events.publish(TaskEvent::TaskCancelled {
                        task_id: self.task.id,
                    });
                    return Ok(self.outcome());
                }
                Action::Done => {
                    let locators = self
                        .descriptor
                        .as_ref()
                        .map(|d| d.extracted_locators().len())
                        .unwrap_or_default();
                    info!(task_id = %self.task.id, locators, turns = self.store.turn_count(), "task finalized");
                    self.events.publish(TaskEvent::TaskFinalized {
                        task_id: self.task.id,
                        locators,
                    });
                    return Ok(self.outcome());
                }
            };
        }
    }

    /// Issue one call, wait for it, and record it. Returns the next router event.
    async fn turn(&mut self, request: ToolRequest) -> Result<Event> {
        let seq = self.store.turn_count() + 1;
        self.events.publish(TaskEvent::TurnIssued {
            task_id: self.task.id,
            seq,
            tool: request.tool.clone(),
            summary: request.describe(),
        });
        debug!(task_id = %self.task.id, seq, call = %request.describe(), "invoking");

        let outcome: ToolOutcome = self.invoker.invoke(&request).await;
        let recorded = self.store.record_turn(request, outcome.clone());

        self.events.publish(TaskEvent::TurnCompleted {
            task_id: self.task.id,
            seq,
            ok: outcome.ok,
            error: outcome.error,
        });
        for fact in self.store.facts().iter().filter(|f| f.provenance_turn_id == seq) {
            self.events.publish(TaskEvent::FactExtracted {
                task_id: self.task.id,
                name: fact.name.clone(),
                value: fact.value.clone(),
                seq,
            });
        }

        match recorded {
            Ok(_) => Ok(Event::ToolReturned(outcome)),
            Err(TrawlError::PolicyViolation { rule, detail }) => {
                Ok(Event::PolicyViolated { rule, detail })
            }
            Err(e) => Err(e),
        }
    }

    fn enter(&mut self, next: PlanState) {
        if next.phase != self.state.phase {
            debug!(task_id = %self.task.id, from = %self.state.phase, to = %next.phase, "phase changed");
            self.events.publish(TaskEvent::PhaseChanged {
                task_id: self.task.id,
                from: self.state.phase,
                to: next.phase,
            });
        }
        self.task.status = next.phase;
        self.state = next;
    }

    fn outcome(&self) -> TaskOutcome {
        // A generate_pom descriptor exists only once the router has accepted it.
        let descriptor = self.descriptor.clone().filter(|d| match d.task_type() {
            TaskType::GeneratePom => self.state.phase == TaskStatus::Finalized,
            TaskType::ClarificationNeeded => self.state.phase == TaskStatus::AwaitingTarget,
        });
        TaskOutcome {
            task_id: self.task.id,
            session_id: self.task.session_id.clone(),
            target_url: self.task.target_url.clone(),
            status: self.state.phase,
            descriptor,
            failure: self.state.failure.clone(),
            warnings: self.state.warnings.clone(),
            turns: self.store.turns().to_vec(),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            persisted_to: None,
        }
    }
}
