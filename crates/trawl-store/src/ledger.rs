use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use trawl_core::{InteractionKind, Result, ToolName, ToolOutcome, ToolRequest, TrawlError};

/// One request/result pair issued to a capability provider. Never mutated after append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub sequence_no: u32,
    pub action_requested: ToolRequest,
    pub action_result: ToolOutcome,
    pub timestamp: DateTime<Utc>,
}

/// A named value obtained from a live tool result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFact {
    pub name: String,
    pub value: String,
    /// `sequence_no` of the turn whose result contained `value`.
    pub provenance_turn_id: u32,
    /// Discovered incidentally, not requested.
    #[serde(default)]
    pub extra: bool,
}

/// Outcome of an interaction performed against a fact's selector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub fact_name: String,
    pub action_type: InteractionKind,
    pub success: bool,
    pub turn: u32,
}

/// Append-only ledger for one task.
#[derive(Debug, Clone)]
pub struct StateStore {
    task_id: Uuid,
    turns: Vec<TurnRecord>,
    facts: Vec<ExtractedFact>,
    validations: Vec<ValidationResult>,
}

impl StateStore {
    pub fn new(task_id: Uuid) -> Self {
        Self {
            task_id,
            turns: Vec::new(),
            facts: Vec::new(),
            validations: Vec::new(),
        }
    }

    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    // ── Appends ────────────────────────────────────────────────

    /// Append a turn and derive facts / validations from it.
    ///
    /// The turn is always recorded. If a derived fact fails its provenance
    /// check the error is returned after the append.
    pub fn record_turn(&mut self, request: ToolRequest, outcome: ToolOutcome) -> Result<TurnRecord> {
        let sequence_no = self.turns.len() as u32 + 1;
        let record = TurnRecord {
            sequence_no,
            action_requested: request,
            action_result: outcome,
            timestamp: Utc::now(),
        };
        self.turns.push(record.clone());
        debug!(
            task_id = %self.task_id,
            seq = sequence_no,
            tool = %record.action_requested.tool,
            ok = record.action_result.ok,
            "turn recorded"
        );

        match record.action_requested.name() {
            Some(ToolName::ExtractFact) if record.action_result.ok => self.derive_facts(&record)?,
            Some(ToolName::Interact) => self.derive_validation(&record),
            _ => {}
        }
        Ok(record)
    }

    fn derive_facts(&mut self, record: &TurnRecord) -> Result<()> {
        let Some(data) = record.action_result.data.as_ref() else {
            return Ok(());
        };
        if let (Some(hint), Some(selector)) = (
            record.action_requested.arg_str("hint"),
            data.get("selector").and_then(|v| v.as_str()),
        ) {
            self.record_fact(hint, selector, record.sequence_no, false)?;
        }
        if let Some(extras) = data.get("extras").and_then(|v| v.as_object()) {
            for (name, value) in extras {
                match value.as_str() {
                    Some(selector) => {
                        self.record_fact(name, selector, record.sequence_no, true)?;
                    }
                    None => warn!(task_id = %self.task_id, %name, "ignoring non-string extra"),
                }
            }
        }
        Ok(())
    }

    fn derive_validation(&mut self, record: &TurnRecord) {
        let request = &record.action_requested;
        let (Some(element), Some(kind)) = (
            request.arg_str("element"),
            request.arg_str("kind").and_then(InteractionKind::parse),
        ) else {
            return;
        };
        self.record_validation(element, kind, record.action_result.ok, record.sequence_no);
    }

    /// Record a fact, citing the turn that produced it.
    ///
    /// Fails with `fact_without_provenance` unless that turn's recorded
    /// result contains `value` verbatim.
    pub fn record_fact(
        &mut self,
        name: &str,
        value: &str,
        turn: u32,
        extra: bool,
    ) -> Result<&ExtractedFact> {
        let backed = self
            .turn(turn)
            .is_some_and(|t| t.action_result.contains_value(value));
        if !backed {
            return Err(TrawlError::policy(
                "fact_without_provenance",
                format!("'{name}' = '{value}' is not present in the result of turn {turn}"),
            ));
        }
        self.facts.push(ExtractedFact {
            name: name.to_string(),
            value: value.to_string(),
            provenance_turn_id: turn,
            extra,
        });
        debug!(task_id = %self.task_id, %name, %value, turn, extra, "fact recorded");
        Ok(&self.facts[self.facts.len() - 1])
    }

    pub fn record_validation(
        &mut self,
        fact_name: &str,
        action_type: InteractionKind,
        success: bool,
        turn: u32,
    ) {
        self.validations.push(ValidationResult {
            fact_name: fact_name.to_string(),
            action_type,
            success,
            turn,
        });
    }

    // ── Queries ────────────────────────────────────────────────

    pub fn has_fact(&self, name: &str) -> bool {
        self.facts.iter().any(|f| f.name == name)
    }

    /// Latest fact recorded under `name`.
    pub fn fact(&self, name: &str) -> Option<&ExtractedFact> {
        self.facts.iter().rev().find(|f| f.name == name)
    }

    /// Names from `required` with no fact yet, in the order given.
    pub fn missing_facts(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|name| !self.has_fact(name))
            .cloned()
            .collect()
    }

    pub fn last_turn(&self) -> Option<&TurnRecord> {
        self.turns.last()
    }

    pub fn turn(&self, sequence_no: u32) -> Option<&TurnRecord> {
        // sequence numbers are dense and start at 1
        sequence_no
            .checked_sub(1)
            .and_then(|i| self.turns.get(i as usize))
    }

    /// Count of successful validations.
    pub fn validated_count(&self) -> usize {
        self.validations.iter().filter(|v| v.success).count()
    }

    pub fn turns(&self) -> &[TurnRecord] {
        &self.turns
    }

    pub fn facts(&self) -> &[ExtractedFact] {
        &self.facts
    }

    pub fn validations(&self) -> &[ValidationResult] {
        &self.validations
    }

    pub fn turn_count(&self) -> u32 {
        self.turns.len() as u32
    }

    /// Whether the cited turn still shows `fact.value` in its result.
    pub fn verify_provenance(&self, fact: &ExtractedFact) -> bool {
        self.turn(fact.provenance_turn_id)
            .is_some_and(|t| t.action_result.contains_value(&fact.value))
    }
}
