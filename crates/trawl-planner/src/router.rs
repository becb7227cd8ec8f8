//! The planner/router state machine.
//!
//! [`Router::decide`] is a pure function `(PlanState, StateStore, Event) ->
//! (PlanState, Action)`. It never performs I/O and never edits the store; the
//! runtime executes the returned action and feeds the result back as the
//! next event.
//!
//! Policy table (phase × outcome):
//!
//! | phase              | on success                                   | on failure                     |
//! |--------------------|----------------------------------------------|--------------------------------|
//! | `INIT`             | target known → navigate; else clarify        |                                |
//! | `NAVIGATING`       | snapshot                                     | retry once, then fail          |
//! | `SNAPSHOTTING`     | (discover elements) → next extraction        | retry once, then fail          |
//! | `EXTRACTING`       | next unresolved element, interaction, ready  | `NotFound` → unresolvable; else retry once, then fail |
//! | `ACTING`           | re-snapshot if page changes, else validate   | retry once, then fail          |
//! | `VALIDATING`       | ready                                        | retry once, then fail          |
//! | `READY_TO_FINALIZE`| finalize if no required fact is missing      | rejected → extract missing, else fail |

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use trawl_config::schema::OrchestratorConfig;
use trawl_core::{
    Result, TaskFailure, TaskStatus, ToolErrorKind, ToolOutcome, ToolRequest, TrawlError,
};
use trawl_store::StateStore;

use crate::goal::{Goal, Interaction};

/// Everything the router knows about a task besides the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanState {
    pub phase: TaskStatus,
    pub target_url: Option<String>,
    /// Elements to locate, in request (or snapshot) order.
    pub elements: Vec<String>,
    /// Elements are taken from snapshots rather than the request.
    pub discover: bool,
    pub interaction: Option<Interaction>,
    pub interaction_done: bool,
    /// Elements declared impossible to locate.
    pub unresolvable: Vec<String>,
    /// The call issued and not yet answered.
    pub pending: Option<ToolRequest>,
    /// Consecutive failed attempts of the pending action.
    pub attempts: u32,
    pub turns_issued: u32,
    pub warnings: Vec<String>,
    pub failure: Option<TaskFailure>,
}

impl PlanState {
    pub fn new(goal: Goal) -> Self {
        Self {
            phase: TaskStatus::Init,
            target_url: goal.target_url.clone(),
            discover: goal.discovers_elements(),
            elements: goal.elements,
            interaction: goal.interaction,
            interaction_done: false,
            unresolvable: Vec::new(),
            pending: None,
            attempts: 0,
            turns_issued: 0,
            warnings: Vec::new(),
            failure: None,
        }
    }

    /// Elements that must carry a fact before finalization.
    pub fn required(&self) -> Vec<String> {
        self.elements
            .iter()
            .filter(|e| !self.unresolvable.contains(*e))
            .cloned()
            .collect()
    }
}

/// Inputs to the router.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start,
    /// A previously missing target was supplied; resumes an `AWAITING_TARGET` task.
    TargetProvided(String),
    /// The pending call returned. The store already holds its turn.
    ToolReturned(ToolOutcome),
    /// The finalizer refused the accumulated state.
    FinalizeRejected(String),
    Finalized,
    PolicyViolated { rule: String, detail: String },
    Cancel,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::TargetProvided(_) => "target_provided",
            Self::ToolReturned(_) => "tool_returned",
            Self::FinalizeRejected(_) => "finalize_rejected",
            Self::Finalized => "finalized",
            Self::PolicyViolated { .. } => "policy_violated",
            Self::Cancel => "cancel",
        }
    }
}

/// The single thing the runtime must do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Issue one tool call, after `backoff` if this is a retry.
    Invoke {
        request: ToolRequest,
        backoff: Option<Duration>,
    },
    /// Ask the requester for missing input. The task stays resumable.
    Clarify { reason: String },
    /// Hand the state to the finalizer.
    Finalize,
    Fail(TaskFailure),
    /// Drop held resources; the task is cancelled.
    Release,
    Done,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: PlanState,
    pub action: Action,
}

/// One retry with bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self {
            max_attempts: config.max_attempts_per_action.max(1),
            base: Duration::from_millis(config.retry_backoff_ms),
            cap: Duration::from_millis(config.retry_backoff_max_ms.max(config.retry_backoff_ms)),
        }
    }

    /// Wait before re-issuing after `failures` consecutive failures (≥ 1).
    pub fn backoff(&self, failures: u32) -> Duration {
        let shift = failures.saturating_sub(1).min(16);
        self.base.saturating_mul(1u32 << shift).min(self.cap)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&OrchestratorConfig::default())
    }
}

/// Deterministic next-action policy.
#[derive(Debug, Clone)]
pub struct Router {
    retry: RetryPolicy,
    max_turns: u32,
    max_discovered: usize,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(&OrchestratorConfig::default())
    }
}

impl Router {
    pub fn new(config: &OrchestratorConfig) -> Self {
        Self {
            retry: RetryPolicy::from_config(config),
            max_turns: config.max_turns,
            max_discovered: config.max_discovered_elements,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn decide(&self, state: &PlanState, store: &StateStore, event: Event) -> Result<Transition> {
        if state.phase.is_terminal() {
            return Err(invalid(state.phase, &event));
        }
        let mut next = state.clone();
        debug!(phase = %state.phase, event = event.name(), "routing");

        let action = match event {
            Event::Cancel => {
                next.phase = TaskStatus::Cancelled;
                next.pending = None;
                Action::Release
            }
            Event::PolicyViolated { rule, detail } => fail(&mut next, TaskFailure::Policy { rule, detail }),
            Event::Start => {
                if state.phase != TaskStatus::Init {
                    return Err(invalid(state.phase, &Event::Start));
                }
                match next.target_url.clone() {
                    Some(url) => self.navigate(&mut next, &url)?,
                    None => {
                        enter(&mut next, TaskStatus::AwaitingTarget)?;
                        Action::Clarify {
                            reason: "target resource missing".into(),
                        }
                    }
                }
            }
            Event::TargetProvided(url) => {
                if !matches!(state.phase, TaskStatus::Init | TaskStatus::AwaitingTarget) {
                    return Err(invalid(state.phase, &Event::TargetProvided(url)));
                }
                next.target_url = Some(url.clone());
                self.navigate(&mut next, &url)?
            }
            Event::ToolReturned(outcome) => self.on_tool_returned(&mut next, store, outcome)?,
            Event::FinalizeRejected(reason) => {
                if state.phase != TaskStatus::ReadyToFinalize {
                    return Err(invalid(state.phase, &Event::FinalizeRejected(reason)));
                }
                match store.missing_facts(&next.required()).into_iter().next() {
                    Some(element) => {
                        enter(&mut next, TaskStatus::Extracting)?;
                        self.issue(&mut next, ToolRequest::extract_fact(&element), None)?
                    }
                    None => fail(&mut next, TaskFailure::Schema { detail: reason }),
                }
            }
            Event::Finalized => {
                if state.phase != TaskStatus::ReadyToFinalize {
                    return Err(invalid(state.phase, &Event::Finalized));
                }
                enter(&mut next, TaskStatus::Finalized)?;
                Action::Done
            }
        };

        Ok(Transition {
            state: next,
            action,
        })
    }

    // ── Tool results ───────────────────────────────────────────

    fn on_tool_returned(
        &self,
        next: &mut PlanState,
        store: &StateStore,
        outcome: ToolOutcome,
    ) -> Result<Action> {
        let request = next.pending.take().ok_or_else(|| {
            TrawlError::policy("sequential_invocation", "a result arrived with no call outstanding")
        })?;

        if let Some(kind) = outcome.error_kind() {
            let detail = outcome.detail.clone().unwrap_or_else(|| kind.to_string());
            if next.phase == TaskStatus::Extracting && kind == ToolErrorKind::NotFound {
                let element = request.arg_str("hint").unwrap_or_default().to_string();
                mark_unresolvable(next, &element, &detail);
                return self.advance_extraction(next, store);
            }
            return self.retry_or_fail(next, request, kind, detail);
        }

        next.attempts = 0;
        match next.phase {
            TaskStatus::Navigating => {
                enter(next, TaskStatus::Snapshotting)?;
                self.issue(next, ToolRequest::snapshot(), None)
            }
            TaskStatus::Snapshotting => {
                if next.discover {
                    self.discover(next, outcome.data.as_ref());
                }
                enter(next, TaskStatus::Extracting)?;
                self.advance_extraction(next, store)
            }
            TaskStatus::Extracting => {
                let element = request.arg_str("hint").unwrap_or_default().to_string();
                if !store.has_fact(&element) {
                    mark_unresolvable(next, &element, "no selector in result");
                }
                self.advance_extraction(next, store)
            }
            TaskStatus::Acting => {
                next.interaction_done = true;
                let changes_page = next.interaction.as_ref().is_some_and(|i| i.changes_page);
                if changes_page {
                    enter(next, TaskStatus::Snapshotting)?;
                    self.issue(next, ToolRequest::snapshot(), None)
                } else {
                    enter(next, TaskStatus::Validating)?;
                    let target = request.arg_str("target").unwrap_or_default();
                    self.issue(next, ToolRequest::wait(&format!("selector:{target}")), None)
                }
            }
            TaskStatus::Validating => {
                enter(next, TaskStatus::ReadyToFinalize)?;
                self.check_ready(next, store)
            }
            phase => Err(invalid(phase, &Event::ToolReturned(outcome))),
        }
    }

    fn retry_or_fail(
        &self,
        next: &mut PlanState,
        request: ToolRequest,
        kind: ToolErrorKind,
        detail: String,
    ) -> Result<Action> {
        next.attempts += 1;
        if next.attempts < self.retry.max_attempts {
            let backoff = self.retry.backoff(next.attempts);
            debug!(tool = %request.tool, attempt = next.attempts, ?backoff, "retrying");
            return self.issue(next, request, Some(backoff));
        }
        Ok(fail(
            next,
            TaskFailure::Tool {
                tool: request.tool,
                error: kind,
                detail,
            },
        ))
    }

    // ── Progress ───────────────────────────────────────────────

    fn navigate(&self, next: &mut PlanState, url: &str) -> Result<Action> {
        enter(next, TaskStatus::Navigating)?;
        self.issue(next, ToolRequest::navigate(url), None)
    }

    /// Take element names from a snapshot result, capped and deduplicated.
    fn discover(&self, next: &mut PlanState, data: Option<&Value>) {
        let names = data
            .and_then(|d| d.get("elements"))
            .and_then(|e| e.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i.get("name").and_then(|n| n.as_str()))
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        let before = next.elements.len();
        for name in names {
            if next.elements.len() >= self.max_discovered {
                break;
            }
            if !name.is_empty() && !next.elements.contains(&name) {
                next.elements.push(name);
            }
        }
        if next.elements.len() == before && before == 0 {
            next.warnings.push("snapshot reported no elements to locate".into());
        }
    }

    /// Next extraction, else the requested interaction, else finalization.
    fn advance_extraction(&self, next: &mut PlanState, store: &StateStore) -> Result<Action> {
        let unresolved = next
            .elements
            .iter()
            .find(|e| !store.has_fact(e) && !next.unresolvable.contains(*e))
            .cloned();
        if let Some(element) = unresolved {
            enter(next, TaskStatus::Extracting)?;
            return self.issue(next, ToolRequest::extract_fact(&element), None);
        }

        if let Some(interaction) = next.interaction.clone()
            && !next.interaction_done
        {
            enter(next, TaskStatus::Acting)?;
            let Some(fact) = store.fact(&interaction.element) else {
                return Ok(fail(
                    next,
                    TaskFailure::Policy {
                        rule: "interaction_target_unresolved".into(),
                        detail: format!(
                            "no extracted selector for '{}'; refusing to act on a guessed target",
                            interaction.element
                        ),
                    },
                ));
            };
            let request = ToolRequest::interact(
                interaction.kind,
                &fact.value,
                interaction.value.as_deref(),
                &interaction.element,
            );
            return self.issue(next, request, None);
        }

        enter(next, TaskStatus::ReadyToFinalize)?;
        self.check_ready(next, store)
    }

    fn check_ready(&self, next: &mut PlanState, store: &StateStore) -> Result<Action> {
        match store.missing_facts(&next.required()).into_iter().next() {
            Some(element) => {
                enter(next, TaskStatus::Extracting)?;
                self.issue(next, ToolRequest::extract_fact(&element), None)
            }
            None => Ok(Action::Finalize),
        }
    }

    /// Issue a call. Refuses while another is outstanding and enforces the turn cap.
    fn issue(
        &self,
        next: &mut PlanState,
        request: ToolRequest,
        backoff: Option<Duration>,
    ) -> Result<Action> {
        if let Some(ref pending) = next.pending {
            return Err(TrawlError::policy(
                "sequential_invocation",
                format!(
                    "{} requested while {} is outstanding",
                    request.describe(),
                    pending.describe()
                ),
            ));
        }
        if next.turns_issued >= self.max_turns {
            return Ok(fail(
                next,
                TaskFailure::TurnLimit {
                    limit: self.max_turns,
                },
            ));
        }
        if backoff.is_none() {
            next.attempts = 0;
        }
        next.turns_issued += 1;
        next.pending = Some(request.clone());
        Ok(Action::Invoke { request, backoff })
    }
}

fn mark_unresolvable(next: &mut PlanState, element: &str, reason: &str) {
    if !next.unresolvable.iter().any(|e| e == element) {
        next.unresolvable.push(element.to_string());
        next.warnings
            .push(format!("could not locate '{element}': {reason}"));
    }
}

fn fail(next: &mut PlanState, failure: TaskFailure) -> Action {
    next.phase = TaskStatus::Failed;
    next.pending = None;
    next.failure = Some(failure.clone());
    Action::Fail(failure)
}

/// Move to `to`, checking the edge against the lifecycle graph.
fn enter(next: &mut PlanState, to: TaskStatus) -> Result<()> {
    if next.phase != to && !next.phase.can_transition_to(to) {
        return Err(TrawlError::InvalidTransition {
            phase: next.phase.to_string(),
            event: format!("enter {to}"),
        });
    }
    next.phase = to;
    Ok(())
}

fn invalid(phase: TaskStatus, event: &Event) -> TrawlError {
    TrawlError::InvalidTransition {
        phase: phase.to_string(),
        event: event.name().to_string(),
    }
}
