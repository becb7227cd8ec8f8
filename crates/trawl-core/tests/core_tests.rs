#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::collections::BTreeMap;
    use trawl_core::*;

    // ── Tool names ─────────────────────────────────────────────

    #[test]
    fn test_tool_name_parse_roundtrip() {
        for name in ToolName::ALL {
            assert_eq!(ToolName::parse(name.as_str()), Some(name));
        }
        assert_eq!(ToolName::parse("teleport"), None);
    }

    #[test]
    fn test_tool_name_provider_split() {
        assert_eq!(ToolName::Navigate.provider(), ProviderKind::Browser);
        assert_eq!(ToolName::Wait.provider(), ProviderKind::Browser);
        assert_eq!(ToolName::Write.provider(), ProviderKind::FileStore);
        assert_eq!(ToolName::Delete.provider(), ProviderKind::FileStore);
    }

    #[test]
    fn test_only_read_and_list_are_idempotent() {
        let idempotent: Vec<_> = ToolName::ALL.iter().filter(|t| t.is_idempotent()).collect();
        assert_eq!(idempotent, vec![&ToolName::Read, &ToolName::List]);
    }

    // ── Requests & outcomes ────────────────────────────────────

    #[test]
    fn test_request_wire_shape() {
        let req = ToolRequest::navigate("https://example.com");
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, json!({ "tool": "navigate", "args": { "url": "https://example.com" } }));
    }

    #[test]
    fn test_interact_request_omits_missing_value() {
        let req = ToolRequest::interact(InteractionKind::Click, "#go", None, "go button");
        assert!(req.args.get("value").is_none());
        assert_eq!(req.arg_str("element"), Some("go button"));

        let req = ToolRequest::interact(InteractionKind::Fill, "#q", Some("rust"), "search");
        assert_eq!(req.arg_str("value"), Some("rust"));
    }

    #[test]
    fn test_request_describe() {
        assert_eq!(
            ToolRequest::navigate("https://example.com").describe(),
            "navigate(https://example.com)"
        );
        assert_eq!(ToolRequest::snapshot().describe(), "snapshot()");
        assert_eq!(ToolRequest::extract_fact("heading").describe(), "extract_fact(heading)");
    }

    #[test]
    fn test_outcome_wire_shape() {
        let ok = ToolOutcome::success(json!({ "selector": "h1" }));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({ "ok": true, "data": { "selector": "h1" } })
        );

        let err = ToolOutcome::failure(ToolFault::timeout("navigation exceeded 30000ms"));
        let v = serde_json::to_value(&err).unwrap();
        assert_eq!(v["ok"], json!(false));
        assert_eq!(v["error"], json!("Timeout"));
    }

    #[test]
    fn test_outcome_contains_value_walks_nested_data() {
        let outcome = ToolOutcome::success(json!({
            "hint": "more info",
            "extras": { "logo": "img.logo" },
            "list": ["a", { "deep": "a[href='/x']" }]
        }));
        assert!(outcome.contains_value("img.logo"));
        assert!(outcome.contains_value("a[href='/x']"));
        assert!(!outcome.contains_value("a[href="));
        assert!(!ToolOutcome::failure(ToolFault::not_found("x")).contains_value("x"));
    }

    #[test]
    fn test_failure_without_kind_is_protocol_error() {
        let outcome = ToolOutcome {
            ok: false,
            data: None,
            error: None,
            detail: None,
        };
        assert_eq!(outcome.error_kind(), Some(ToolErrorKind::ProtocolError));
    }

    // ── Status graph ───────────────────────────────────────────

    #[test]
    fn test_terminal_states_have_no_exits() {
        for terminal in [TaskStatus::Finalized, TaskStatus::Failed, TaskStatus::Cancelled] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(TaskStatus::Extracting));
            assert!(!terminal.can_transition_to(TaskStatus::Failed));
        }
    }

    #[test]
    fn test_exception_paths_reachable_from_any_live_state() {
        for from in [
            TaskStatus::Init,
            TaskStatus::Navigating,
            TaskStatus::Extracting,
            TaskStatus::Validating,
        ] {
            assert!(from.can_transition_to(TaskStatus::AwaitingTarget));
            assert!(from.can_transition_to(TaskStatus::Failed));
        }
        assert!(!TaskStatus::Init.can_transition_to(TaskStatus::Extracting));
        assert!(!TaskStatus::Navigating.can_transition_to(TaskStatus::ReadyToFinalize));
    }

    #[test]
    fn test_status_serializes_screaming() {
        let json = serde_json::to_string(&TaskStatus::ReadyToFinalize).unwrap();
        assert_eq!(json, "\"READY_TO_FINALIZE\"");
        assert_eq!(TaskStatus::AwaitingTarget.to_string(), "AWAITING_TARGET");
    }

    // ── Descriptor ─────────────────────────────────────────────

    #[test]
    fn test_descriptor_canonical_json_is_ordered() {
        let mut locators = BTreeMap::new();
        locators.insert("more_info_link".to_string(), "a".to_string());
        locators.insert("heading".to_string(), "h1".to_string());
        let d = TaskDescriptor::new(
            TaskType::GeneratePom,
            Some("https://example.com".into()),
            vec!["more_info_link".into(), "heading".into()],
            locators,
            "because".into(),
        );
        let json = d.to_canonical_json().unwrap();
        assert_eq!(
            json,
            r#"{"task_type":"generate_pom","target_url":"https://example.com","elements_to_find":["more_info_link","heading"],"extracted_locators":{"heading":"h1","more_info_link":"a"},"reasoning":"because"}"#
        );
    }

    #[test]
    fn test_clarification_descriptor_has_null_target() {
        let d = TaskDescriptor::new(
            TaskType::ClarificationNeeded,
            None,
            vec![],
            BTreeMap::new(),
            "target resource missing".into(),
        );
        let v: serde_json::Value = serde_json::from_str(&d.to_canonical_json().unwrap()).unwrap();
        assert_eq!(v["task_type"], json!("clarification_needed"));
        assert!(v["target_url"].is_null());
    }

    // ── Errors ─────────────────────────────────────────────────

    #[test]
    fn test_error_display_names_rule() {
        let err = TrawlError::policy("fact_without_provenance", "heading");
        let s = err.to_string();
        assert!(s.contains("fact_without_provenance"));
        assert!(s.contains("heading"));
    }

    #[test]
    fn test_task_failure_display() {
        let f = TaskFailure::Tool {
            tool: "navigate".into(),
            error: ToolErrorKind::Timeout,
            detail: "30000ms".into(),
        };
        assert!(f.to_string().contains("Timeout"));
        assert!(TaskFailure::TurnLimit { limit: 5 }.to_string().contains('5'));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TrawlError = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_error_kind_wire_names() {
        for (kind, name) in [
            (ToolErrorKind::NotFound, "NotFound"),
            (ToolErrorKind::Timeout, "Timeout"),
            (ToolErrorKind::PermissionDenied, "PermissionDenied"),
            (ToolErrorKind::ProtocolError, "ProtocolError"),
        ] {
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(name));
            assert_eq!(kind.to_string(), name);
        }
    }

    // ── Event bus ──────────────────────────────────────────────

    #[tokio::test]
    async fn test_event_bus_delivers_to_subscribers() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let id = uuid::Uuid::new_v4();
        bus.publish(TaskEvent::TaskCancelled { task_id: id });
        match rx.recv().await.unwrap() {
            TaskEvent::TaskCancelled { task_id } => assert_eq!(task_id, id),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_event_bus_without_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(TaskEvent::TaskCancelled {
            task_id: uuid::Uuid::nil(),
        });
    }
}
