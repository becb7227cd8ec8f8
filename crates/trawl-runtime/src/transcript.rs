//! Recorded runs, and replaying them against a fresh task.
//!
//! A transcript holds the request and every tool call with its outcome.
//! Replaying feeds the recorded outcomes back through a scripted browser;
//! for an unchanged router the replay issues the same calls and produces a
//! byte-identical descriptor. A target supplied on resume is recorded too,
//! and the replay resumes with it.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use trawl_config::TrawlConfig;
use trawl_core::{Result, Task, ToolOutcome, ToolRequest};
use trawl_planner::{RequestNormalizer, RuleNormalizer};
use trawl_tools::mock::{MemoryFileStore, ScriptedBrowser};
use trawl_tools::{ToolInvoker, WorkspaceRoot};

use crate::runner::{TaskOutcome, TaskRunner};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub request: ToolRequest,
    pub outcome: ToolOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub session_id: String,
    pub request: String,
    /// Set when the target came from outside the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
    #[serde(default)]
    pub turns: Vec<TranscriptTurn>,
}

impl Transcript {
    pub fn from_outcome(request: &str, outcome: &TaskOutcome) -> Self {
        Self {
            session_id: outcome.session_id.clone(),
            request: request.to_string(),
            target_url: outcome.target_url.clone(),
            turns: outcome
                .turns
                .iter()
                .map(|t| TranscriptTurn {
                    request: t.action_requested.clone(),
                    outcome: t.action_result.clone(),
                })
                .collect(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Run the transcript's request against its recorded outcomes.
///
/// No browser or disk is touched. If the replay issues a different call
/// than the one recorded at the same position, a warning is added to the
/// outcome.
pub async fn replay(transcript: &Transcript, config: &TrawlConfig) -> Result<TaskOutcome> {
    let browser = Arc::new(ScriptedBrowser::from_outcomes(
        transcript.turns.iter().map(|t| t.outcome.clone()),
    ));
    let invoker = ToolInvoker::new(
        browser,
        Arc::new(MemoryFileStore::new()),
        WorkspaceRoot::new(&config.workspace.root),
        &config.tools,
    );
    let mut orchestrator = config.orchestrator.clone();
    // Recorded outcomes are returned instantly; waiting out backoff adds nothing.
    orchestrator.retry_backoff_ms = 0;
    orchestrator.retry_backoff_max_ms = 0;

    let task = Task::new(transcript.session_id.clone(), transcript.request.clone());
    let goal = RuleNormalizer::new().normalize(&transcript.request);
    let mut runner = TaskRunner::new(task, goal, invoker, &orchestrator);
    let mut outcome = runner.run().await?;
    if outcome.is_resumable()
        && let Some(ref target) = transcript.target_url
    {
        outcome = runner.resume(target).await?;
    }

    let divergence = transcript
        .turns
        .iter()
        .zip(&outcome.turns)
        .find(|(want, got)| want.request != got.action_requested)
        .map(|(want, got)| {
            format!(
                "replay diverged at turn {}: recorded {} but issued {}",
                got.sequence_no,
                want.request.describe(),
                got.action_requested.describe()
            )
        });
    if let Some(message) = divergence {
        warn!("{message}");
        outcome.warnings.push(message);
    }
    if outcome.turns.len() != transcript.turns.len() {
        outcome.warnings.push(format!(
            "replay issued {} call(s), transcript has {}",
            outcome.turns.len(),
            transcript.turns.len()
        ));
    }
    Ok(outcome)
}
