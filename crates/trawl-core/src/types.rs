use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a task.
pub type TaskId = Uuid;

/// Owning project / session identifier. Tasks in the same session share a file store.
pub type SessionId = String;

/// Lifecycle phase of a task, as driven by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Init,
    AwaitingTarget,
    Navigating,
    Snapshotting,
    Extracting,
    Acting,
    Validating,
    ReadyToFinalize,
    Finalized,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finalized | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    ///
    /// `AwaitingTarget`, `Failed`, and `Cancelled` are reachable from every
    /// non-terminal phase; terminal phases have no outgoing edges.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        if self.is_terminal() {
            return false;
        }
        if matches!(next, AwaitingTarget | Failed | Cancelled) {
            return true;
        }
        matches!(
            (self, next),
            (Init, Navigating)
                | (AwaitingTarget, Navigating)
                | (Navigating, Navigating)
                | (Navigating, Snapshotting)
                | (Snapshotting, Snapshotting)
                | (Snapshotting, Extracting)
                | (Extracting, Extracting)
                | (Extracting, Acting)
                | (Extracting, ReadyToFinalize)
                | (Acting, Acting)
                | (Acting, Validating)
                | (Acting, Snapshotting)
                | (Validating, Validating)
                | (Validating, ReadyToFinalize)
                | (ReadyToFinalize, Extracting)
                | (ReadyToFinalize, Finalized)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "INIT",
            Self::AwaitingTarget => "AWAITING_TARGET",
            Self::Navigating => "NAVIGATING",
            Self::Snapshotting => "SNAPSHOTTING",
            Self::Extracting => "EXTRACTING",
            Self::Acting => "ACTING",
            Self::Validating => "VALIDATING",
            Self::ReadyToFinalize => "READY_TO_FINALIZE",
            Self::Finalized => "FINALIZED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// One end-to-end orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub session_id: SessionId,
    pub raw_request: String,
    pub target_url: Option<String>,
    pub status: TaskStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Task {
    pub fn new(session_id: impl Into<SessionId>, raw_request: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            raw_request: raw_request.into(),
            target_url: None,
            status: TaskStatus::Init,
            created_at: chrono::Utc::now(),
        }
    }
}
