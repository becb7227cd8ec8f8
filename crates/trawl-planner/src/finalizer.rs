use std::collections::BTreeMap;
use tracing::{debug, info};

use trawl_core::{Result, TaskDescriptor, TaskType, ToolName, TrawlError};
use trawl_store::StateStore;

use crate::router::PlanState;

/// Builds the one immutable descriptor for a task, or refuses to.
#[derive(Debug, Default, Clone, Copy)]
pub struct Finalizer;

impl Finalizer {
    pub fn new() -> Self {
        Self
    }

    /// Check the accumulated state and emit a `generate_pom` descriptor.
    ///
    /// Rejects with `SchemaViolation` when the target is unknown or a
    /// required element has no fact, and with `PolicyViolation` when a fact
    /// no longer matches the turn it cites. Nothing is emitted on rejection.
    pub fn finalize(&self, state: &PlanState, store: &StateStore) -> Result<TaskDescriptor> {
        let Some(target_url) = state.target_url.clone() else {
            return Err(TrawlError::schema("target_url", "required for generate_pom"));
        };

        let missing = store.missing_facts(&state.required());
        if !missing.is_empty() {
            return Err(TrawlError::schema(
                "extracted_locators",
                format!("no fact for: {}", missing.join(", ")),
            ));
        }

        let mut locators = BTreeMap::new();
        for fact in store.facts() {
            let requested = state.elements.contains(&fact.name);
            if !requested && !fact.extra {
                return Err(TrawlError::schema(
                    "extracted_locators",
                    format!("'{}' was neither requested nor flagged as an extra", fact.name),
                ));
            }
            if !store.verify_provenance(fact) {
                return Err(TrawlError::policy(
                    "fact_without_provenance",
                    format!(
                        "'{}' cites turn {} whose result does not contain '{}'",
                        fact.name, fact.provenance_turn_id, fact.value
                    ),
                ));
            }
            // A later fact under the same name supersedes an earlier one.
            locators.insert(fact.name.clone(), fact.value.clone());
        }

        let reasoning = reasoning(&target_url, state, store, &locators);
        debug!(locators = locators.len(), "descriptor assembled");
        info!(target_url = %target_url, "task finalized");

        Ok(TaskDescriptor::new(
            TaskType::GeneratePom,
            Some(target_url),
            state.elements.clone(),
            locators,
            reasoning,
        ))
    }

    /// Descriptor for a task that cannot proceed without more input.
    pub fn clarification(reason: &str) -> TaskDescriptor {
        TaskDescriptor::new(
            TaskType::ClarificationNeeded,
            None,
            Vec::new(),
            BTreeMap::new(),
            reason.to_string(),
        )
    }
}

/// Deterministic account of which turns produced the result. Never includes timestamps.
fn reasoning(
    target_url: &str,
    state: &PlanState,
    store: &StateStore,
    locators: &BTreeMap<String, String>,
) -> String {
    let mut parts = Vec::new();

    let navigated = store
        .turns()
        .iter()
        .rev()
        .find(|t| t.action_requested.name() == Some(ToolName::Navigate) && t.action_result.ok);
    match navigated {
        Some(t) => parts.push(format!("navigated to {target_url} (turn {})", t.sequence_no)),
        None => parts.push(format!("target {target_url}")),
    }

    let snapshots: Vec<String> = store
        .turns()
        .iter()
        .filter(|t| t.action_requested.name() == Some(ToolName::Snapshot) && t.action_result.ok)
        .map(|t| t.sequence_no.to_string())
        .collect();
    if !snapshots.is_empty() {
        let source = if state.discover {
            "elements discovered from snapshot"
        } else {
            "snapshot"
        };
        parts.push(format!("{source} (turn {})", snapshots.join(", ")));
    }

    for (name, value) in locators {
        if let Some(fact) = store.fact(name) {
            let label = if fact.extra { "extra " } else { "" };
            parts.push(format!(
                "{label}{name} = {value} (turn {})",
                fact.provenance_turn_id
            ));
        }
    }

    for v in store.validations() {
        let verdict = if v.success { "succeeded" } else { "failed" };
        parts.push(format!(
            "{} on {} {verdict} (turn {})",
            v.action_type, v.fact_name, v.turn
        ));
    }

    for element in &state.unresolvable {
        parts.push(format!("{element} could not be located"));
    }

    parts.join("; ")
}
