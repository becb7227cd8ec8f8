use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What the downstream code-synthesis step is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    GeneratePom,
    ClarificationNeeded,
}

/// Immutable snapshot emitted once by the finalizer.
///
/// Fields are private: a descriptor can be read and serialised, never edited.
/// Locators are kept in an ordered map so the canonical JSON is byte-stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    task_type: TaskType,
    target_url: Option<String>,
    elements_to_find: Vec<String>,
    extracted_locators: BTreeMap<String, String>,
    reasoning: String,
}

impl TaskDescriptor {
    pub fn new(
        task_type: TaskType,
        target_url: Option<String>,
        elements_to_find: Vec<String>,
        extracted_locators: BTreeMap<String, String>,
        reasoning: String,
    ) -> Self {
        Self {
            task_type,
            target_url,
            elements_to_find,
            extracted_locators,
            reasoning,
        }
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn target_url(&self) -> Option<&str> {
        self.target_url.as_deref()
    }

    pub fn elements_to_find(&self) -> &[String] {
        &self.elements_to_find
    }

    pub fn extracted_locators(&self) -> &BTreeMap<String, String> {
        &self.extracted_locators
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Compact wire form.
    pub fn to_canonical_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_pretty_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
