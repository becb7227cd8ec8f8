#[cfg(test)]
mod tests {
    use serde_json::json;
    use trawl_core::{InteractionKind, ToolFault, ToolOutcome, ToolRequest, TrawlError};
    use trawl_store::StateStore;
    use uuid::Uuid;

    fn store() -> StateStore {
        StateStore::new(Uuid::new_v4())
    }

    fn names(required: &[&str]) -> Vec<String> {
        required.iter().map(|s| s.to_string()).collect()
    }

    // ── Ledger ─────────────────────────────────────────────────

    #[test]
    fn test_sequence_numbers_start_at_one_and_are_dense() {
        let mut s = store();
        let a = s
            .record_turn(
                ToolRequest::navigate("https://example.com"),
                ToolOutcome::success(json!({ "url": "https://example.com" })),
            )
            .unwrap();
        let b = s
            .record_turn(ToolRequest::snapshot(), ToolOutcome::success(json!({ "elements": [] })))
            .unwrap();
        assert_eq!(a.sequence_no, 1);
        assert_eq!(b.sequence_no, 2);
        assert_eq!(s.turn_count(), 2);
        assert_eq!(s.last_turn().unwrap().sequence_no, 2);
        assert!(s.turn(0).is_none());
        assert_eq!(s.turn(1).unwrap().action_requested.tool, "navigate");
    }

    #[test]
    fn test_failed_turns_are_recorded_too() {
        let mut s = store();
        s.record_turn(
            ToolRequest::navigate("https://example.com"),
            ToolOutcome::failure(ToolFault::timeout("slow")),
        )
        .unwrap();
        assert_eq!(s.turns().len(), 1);
        assert!(!s.turns()[0].action_result.ok);
    }

    // ── Fact derivation ────────────────────────────────────────

    #[test]
    fn test_extract_fact_result_becomes_fact() {
        let mut s = store();
        s.record_turn(
            ToolRequest::extract_fact("heading"),
            ToolOutcome::success(json!({ "hint": "heading", "selector": "h1" })),
        )
        .unwrap();
        let fact = s.fact("heading").unwrap();
        assert_eq!(fact.value, "h1");
        assert_eq!(fact.provenance_turn_id, 1);
        assert!(!fact.extra);
        assert!(s.verify_provenance(fact));
    }

    #[test]
    fn test_extract_without_selector_yields_no_fact() {
        let mut s = store();
        s.record_turn(
            ToolRequest::extract_fact("footer"),
            ToolOutcome::success(json!({ "hint": "footer", "matches": 0 })),
        )
        .unwrap();
        assert!(!s.has_fact("footer"));
        assert!(s.facts().is_empty());
    }

    #[test]
    fn test_extras_are_flagged() {
        let mut s = store();
        s.record_turn(
            ToolRequest::extract_fact("heading"),
            ToolOutcome::success(json!({
                "selector": "h1",
                "extras": { "logo": "img.logo", "bogus": 3 }
            })),
        )
        .unwrap();
        let logo = s.fact("logo").unwrap();
        assert!(logo.extra);
        assert_eq!(logo.value, "img.logo");
        assert!(!s.has_fact("bogus"));
    }

    #[test]
    fn test_latest_fact_wins() {
        let mut s = store();
        s.record_turn(
            ToolRequest::extract_fact("heading"),
            ToolOutcome::success(json!({ "selector": "h1" })),
        )
        .unwrap();
        s.record_turn(
            ToolRequest::extract_fact("heading"),
            ToolOutcome::success(json!({ "selector": "#title" })),
        )
        .unwrap();
        assert_eq!(s.fact("heading").unwrap().value, "#title");
        assert_eq!(s.fact("heading").unwrap().provenance_turn_id, 2);
    }

    // ── Provenance ─────────────────────────────────────────────

    #[test]
    fn test_fabricated_fact_is_rejected() {
        let mut s = store();
        s.record_turn(
            ToolRequest::extract_fact("login button"),
            ToolOutcome::success(json!({ "selector": "#login" })),
        )
        .unwrap();
        let err = s.record_fact("login button", "button.made-up", 1, false).unwrap_err();
        match err {
            TrawlError::PolicyViolation { rule, .. } => assert_eq!(rule, "fact_without_provenance"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(s.facts().len(), 1);
    }

    #[test]
    fn test_fact_citing_missing_turn_is_rejected() {
        let mut s = store();
        assert!(s.record_fact("heading", "h1", 7, false).is_err());
    }

    #[test]
    fn test_manual_fact_with_real_origin_is_accepted() {
        let mut s = store();
        s.record_turn(
            ToolRequest::snapshot(),
            ToolOutcome::success(json!({ "elements": [{ "name": "heading", "tag": "h1" }] })),
        )
        .unwrap();
        let fact = s.record_fact("heading", "h1", 1, true).unwrap();
        assert_eq!(fact.provenance_turn_id, 1);
    }

    // ── Queries ────────────────────────────────────────────────

    #[test]
    fn test_missing_facts_preserves_order() {
        let mut s = store();
        s.record_turn(
            ToolRequest::extract_fact("login button"),
            ToolOutcome::success(json!({ "selector": "#login" })),
        )
        .unwrap();
        let missing = s.missing_facts(&names(&["username field", "login button", "password field"]));
        assert_eq!(missing, names(&["username field", "password field"]));
        assert!(s.missing_facts(&[]).is_empty());
    }

    #[test]
    fn test_interaction_records_validation() {
        let mut s = store();
        s.record_turn(
            ToolRequest::interact(InteractionKind::Click, "#login", None, "login button"),
            ToolOutcome::success(json!({ "performed": "click" })),
        )
        .unwrap();
        s.record_turn(
            ToolRequest::interact(InteractionKind::Click, "#login", None, "login button"),
            ToolOutcome::failure(ToolFault::timeout("stuck")),
        )
        .unwrap();
        assert_eq!(s.validations().len(), 2);
        assert_eq!(s.validated_count(), 1);
        assert_eq!(s.validations()[0].fact_name, "login button");
        assert_eq!(s.validations()[0].action_type, InteractionKind::Click);
    }
}
