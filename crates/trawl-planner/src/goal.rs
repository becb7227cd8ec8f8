use serde::{Deserialize, Serialize};
use trawl_core::InteractionKind;

/// An interaction the request explicitly asks for ("click X then regenerate").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub kind: InteractionKind,
    /// Element whose extracted selector is the interaction target.
    pub element: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// A follow-up step was requested, so the page is re-snapshotted afterwards.
    #[serde(default)]
    pub changes_page: bool,
}

/// Initial goal parameters derived from a raw request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub target_url: Option<String>,
    /// Elements of interest, in the order the request names them.
    pub elements: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction: Option<Interaction>,
}

impl Goal {
    /// No elements were named; they will be taken from the page snapshot.
    pub fn discovers_elements(&self) -> bool {
        self.elements.is_empty()
    }
}
