use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::{TaskFailure, ToolErrorKind};
use crate::types::TaskStatus;

/// Task lifecycle events published by the orchestration loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskEvent {
    TaskCreated {
        task_id: Uuid,
        session_id: String,
        request: String,
    },
    PhaseChanged {
        task_id: Uuid,
        from: TaskStatus,
        to: TaskStatus,
    },

    // ── Turns ──────────────────────────────────────────────────
    TurnIssued {
        task_id: Uuid,
        seq: u32,
        tool: String,
        summary: String,
    },
    TurnCompleted {
        task_id: Uuid,
        seq: u32,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ToolErrorKind>,
    },
    FactExtracted {
        task_id: Uuid,
        name: String,
        value: String,
        seq: u32,
    },

    // ── Outcomes ───────────────────────────────────────────────
    ClarificationRequested {
        task_id: Uuid,
        reason: String,
    },
    TaskFinalized {
        task_id: Uuid,
        locators: usize,
    },
    TaskFailed {
        task_id: Uuid,
        failure: TaskFailure,
    },
    TaskCancelled {
        task_id: Uuid,
    },
    DescriptorPersisted {
        task_id: Uuid,
        path: String,
        at: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for task lifecycle pub/sub.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<TaskEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, event: TaskEvent) {
        // No subscribers is fine.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
