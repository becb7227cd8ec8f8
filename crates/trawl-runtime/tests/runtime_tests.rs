#[cfg(test)]
mod tests {
    use fixtures::*;

    /// Shared fixtures. Kept in a module so each test group can `use` them.
    mod fixtures {
        pub use serde_json::json;
        pub use std::collections::VecDeque;
        pub use std::sync::{Arc, Mutex};
        pub use std::time::Duration;
        pub use trawl_config::TrawlConfig;
        pub use trawl_core::{
            BrowserControl, Task, TaskEvent, TaskFailure, TaskStatus, ToolErrorKind, ToolRequest,
        };
        pub use trawl_planner::RuleNormalizer;
        pub use trawl_runtime::{BrowserFactory, Supervisor, TaskRunner, Transcript, replay};
        pub use trawl_tools::mock::{MemoryFileStore, ScriptedBrowser};
        pub use trawl_tools::{LocalFileStore, ToolInvoker, WorkspaceRoot};

        pub const MORE_INFO: &str = "a[href='https://www.iana.org/domains/example']";

        pub fn config() -> TrawlConfig {
            let mut c = TrawlConfig::default();
            c.orchestrator.retry_backoff_ms = 1;
            c.orchestrator.retry_backoff_max_ms = 4;
            c.tools.action_timeout_ms = 200;
            c.tools.navigation_timeout_ms = 50;
            c
        }

        /// Replies for "navigate to https://example.com and generate a page model".
        pub fn example_com() -> ScriptedBrowser {
            ScriptedBrowser::new()
                .with_ok(json!({ "url": "https://example.com", "title": "Example Domain" }))
                .with_ok(json!({
                    "url": "https://example.com",
                    "elements": [
                        { "name": "heading", "tag": "h1", "text": "Example Domain" },
                        { "name": "more_info_link", "tag": "a", "text": "More information..." }
                    ]
                }))
                .with_ok(json!({ "hint": "heading", "selector": "h1", "tag": "h1" }))
                .with_ok(json!({ "hint": "more_info_link", "selector": MORE_INFO, "tag": "a" }))
        }

        pub fn runner(request: &str, browser: Arc<ScriptedBrowser>, config: &TrawlConfig) -> TaskRunner {
            let invoker = ToolInvoker::new(
                browser,
                Arc::new(MemoryFileStore::new()),
                WorkspaceRoot::new("ws"),
                &config.tools,
            );
            TaskRunner::from_request(
                Task::new("p1", request),
                &RuleNormalizer::new(),
                invoker,
                &config.orchestrator,
            )
        }

        /// Hands out pre-scripted browsers in spawn order.
        #[derive(Default)]
        pub struct ScriptedFactory {
            queue: Mutex<VecDeque<Arc<ScriptedBrowser>>>,
        }

        impl ScriptedFactory {
            pub fn with(browsers: Vec<Arc<ScriptedBrowser>>) -> Arc<Self> {
                Arc::new(Self {
                    queue: Mutex::new(browsers.into()),
                })
            }
        }

        impl BrowserFactory for ScriptedFactory {
            fn create(&self, _task: &Task) -> Arc<dyn BrowserControl> {
                let next = self.queue.lock().unwrap().pop_front();
                next.unwrap_or_else(|| Arc::new(ScriptedBrowser::new()))
            }
        }

        pub fn supervisor(config: TrawlConfig, browsers: Vec<Arc<ScriptedBrowser>>) -> Supervisor {
            Supervisor::new(
                config,
                Arc::new(LocalFileStore::new()),
                ScriptedFactory::with(browsers),
                Arc::new(RuleNormalizer::new()),
            )
        }
    }

    // ── Runner ─────────────────────────────────────────────────

    #[tokio::test]
    async fn test_page_model_turns_and_descriptor() {
        let browser = Arc::new(example_com());
        let mut r = runner(
            "navigate to https://example.com and generate a page model",
            browser.clone(),
            &config(),
        );
        let outcome = r.run().await.unwrap();

        assert_eq!(outcome.status, TaskStatus::Finalized);
        assert_eq!(
            browser.recorded_calls(),
            vec![
                ToolRequest::navigate("https://example.com"),
                ToolRequest::snapshot(),
                ToolRequest::extract_fact("heading"),
                ToolRequest::extract_fact("more_info_link"),
            ]
        );
        let seqs: Vec<u32> = outcome.turns.iter().map(|t| t.sequence_no).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);

        let json = outcome.descriptor.unwrap().to_canonical_json().unwrap();
        let expected_prefix = format!(
            r#"{{"task_type":"generate_pom","target_url":"https://example.com","elements_to_find":["heading","more_info_link"],"extracted_locators":{{"heading":"h1","more_info_link":"{MORE_INFO}"}},"reasoning":""#
        );
        assert!(json.starts_with(&expected_prefix), "{json}");
        assert!(json.contains("(turn 3)"));
        assert!(json.contains("(turn 4)"));
    }

    #[tokio::test]
    async fn test_calls_are_strictly_sequential() {
        let browser = Arc::new(example_com());
        let mut r = runner(
            "navigate to https://example.com and generate a page model",
            browser.clone(),
            &config(),
        );
        r.run().await.unwrap();
        assert_eq!(browser.max_concurrency(), 1);
        assert_eq!(browser.remaining(), 0);
    }

    #[tokio::test]
    async fn test_missing_target_then_resume() {
        let browser = Arc::new(example_com());
        let mut r = runner("generate a page model", browser.clone(), &config());

        let first = r.run().await.unwrap();
        assert_eq!(first.status, TaskStatus::AwaitingTarget);
        assert!(first.is_resumable());
        assert!(first.turns.is_empty());
        assert_eq!(
            first.descriptor.unwrap().to_canonical_json().unwrap(),
            r#"{"task_type":"clarification_needed","target_url":null,"elements_to_find":[],"extracted_locators":{},"reasoning":"target resource missing"}"#
        );

        assert!(r.resume("ftp://example.com").await.is_err());

        let second = r.resume("https://example.com").await.unwrap();
        assert_eq!(second.status, TaskStatus::Finalized);
        assert_eq!(second.descriptor.unwrap().extracted_locators().len(), 2);
        assert_eq!(r.task().target_url.as_deref(), Some("https://example.com"));
    }

    #[tokio::test]
    async fn test_navigate_timeout_twice_fails_after_one_retry() {
        let browser = Arc::new(ScriptedBrowser::new().with_hang().with_hang());
        let mut r = runner("generate a page model for https://slow.test", browser.clone(), &config());
        let outcome = r.run().await.unwrap();

        assert_eq!(outcome.status, TaskStatus::Failed);
        match outcome.failure {
            Some(TaskFailure::Tool { ref tool, error, .. }) => {
                assert_eq!(tool, "navigate");
                assert_eq!(error, ToolErrorKind::Timeout);
            }
            ref other => panic!("unexpected failure: {other:?}"),
        }
        assert_eq!(outcome.turns.len(), 2);
        assert_eq!(browser.recorded_calls().len(), 2);
        assert!(outcome.descriptor.is_none());
    }

    #[tokio::test]
    async fn test_replay_is_byte_identical() {
        let request = "navigate to https://example.com and generate a page model";
        let mut r = runner(request, Arc::new(example_com()), &config());
        let original = r.run().await.unwrap();
        let transcript = Transcript::from_outcome(request, &original);

        let replayed = replay(&transcript, &config()).await.unwrap();
        assert!(replayed.warnings.is_empty(), "{:?}", replayed.warnings);
        assert_eq!(
            original.descriptor.unwrap().to_canonical_json().unwrap(),
            replayed.descriptor.unwrap().to_canonical_json().unwrap()
        );
    }

    #[tokio::test]
    async fn test_replay_of_resumed_run_resumes_with_recorded_target() {
        let request = "generate a page model";
        let mut r = runner(request, Arc::new(example_com()), &config());
        assert!(r.run().await.unwrap().is_resumable());
        let original = r.resume("https://example.com").await.unwrap();
        assert_eq!(original.status, TaskStatus::Finalized);
        assert_eq!(original.target_url.as_deref(), Some("https://example.com"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resumed.json");
        Transcript::from_outcome(request, &original).save(&path).unwrap();
        let transcript = Transcript::load(&path).unwrap();
        assert_eq!(transcript.target_url.as_deref(), Some("https://example.com"));

        let replayed = replay(&transcript, &config()).await.unwrap();
        assert!(replayed.warnings.is_empty(), "{:?}", replayed.warnings);
        assert_eq!(replayed.status, TaskStatus::Finalized);
        assert_eq!(replayed.turns.len(), original.turns.len());
        assert_eq!(
            original.descriptor.unwrap().to_canonical_json().unwrap(),
            replayed.descriptor.unwrap().to_canonical_json().unwrap()
        );
    }

    #[tokio::test]
    async fn test_transcript_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let request = "navigate to https://example.com and generate a page model";
        let mut r = runner(request, Arc::new(example_com()), &config());
        let outcome = r.run().await.unwrap();

        let path = dir.path().join("runs/example.json");
        Transcript::from_outcome(request, &outcome).save(&path).unwrap();
        let loaded = Transcript::load(&path).unwrap();
        assert_eq!(loaded.turns.len(), 4);
        assert_eq!(loaded.request, request);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let browser = Arc::new(example_com());
        let mut r = runner(
            "navigate to https://example.com and generate a page model",
            browser.clone(),
            &config(),
        );
        r.cancel_token().cancel();
        let outcome = r.run().await.unwrap();

        assert_eq!(outcome.status, TaskStatus::Cancelled);
        assert!(outcome.turns.is_empty());
        assert!(browser.was_released());
        // Never resumed.
        assert!(r.resume("https://example.com").await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let mut cfg = config();
        cfg.orchestrator.retry_backoff_ms = 10_000;
        cfg.orchestrator.retry_backoff_max_ms = 10_000;
        let browser = Arc::new(
            ScriptedBrowser::new().with_fault(trawl_core::ToolFault::protocol("connection reset")),
        );
        let mut r = runner("model https://example.com", browser.clone(), &cfg);
        let token = r.cancel_token();

        let handle = tokio::spawn(async move { r.run().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();

        let outcome = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("cancellation should interrupt the backoff")
            .unwrap()
            .unwrap();
        assert_eq!(outcome.status, TaskStatus::Cancelled);
        assert_eq!(outcome.turns.len(), 1);
        assert!(browser.was_released());
    }

    #[tokio::test]
    async fn test_events_follow_the_run() {
        let browser = Arc::new(example_com());
        let bus = trawl_core::EventBus::default();
        let mut rx = bus.subscribe();
        let mut r = runner(
            "navigate to https://example.com and generate a page model",
            browser,
            &config(),
        )
        .with_events(bus);
        r.run().await.unwrap();

        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        assert!(matches!(events.first(), Some(TaskEvent::TaskCreated { .. })));
        assert!(matches!(events.last(), Some(TaskEvent::TaskFinalized { locators: 2, .. })));
        let issued = events
            .iter()
            .filter(|e| matches!(e, TaskEvent::TurnIssued { .. }))
            .count();
        assert_eq!(issued, 4);
        let facts = events
            .iter()
            .filter(|e| matches!(e, TaskEvent::FactExtracted { .. }))
            .count();
        assert_eq!(facts, 2);
    }

    // ── Supervisor ─────────────────────────────────────────────

    #[tokio::test]
    async fn test_concurrent_tasks_persist_descriptors() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config();
        cfg.workspace.root = dir.path().to_path_buf();
        let a = Arc::new(example_com());
        let b = Arc::new(example_com());
        let sup = supervisor(cfg, vec![a.clone(), b.clone()]);

        let request = "navigate to https://example.com and generate a page model";
        let h1 = sup.spawn("alpha", request).await.unwrap();
        let h2 = sup.spawn("beta", request).await.unwrap();
        let (o1, o2) = tokio::join!(h1.join(), h2.join());
        let (o1, o2) = (o1.unwrap(), o2.unwrap());

        assert_eq!(o1.status, TaskStatus::Finalized);
        assert_eq!(o2.status, TaskStatus::Finalized);
        assert_eq!(a.max_concurrency(), 1);
        assert_eq!(b.max_concurrency(), 1);
        assert!(a.was_released() && b.was_released());

        let p1 = dir.path().join("alpha/descriptors/example-com.json");
        let p2 = dir.path().join("beta/descriptors/example-com.json");
        assert_eq!(o1.persisted_to.as_deref(), Some(p1.as_path()));
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&p2).unwrap()).unwrap();
        assert_eq!(written["extracted_locators"]["heading"], json!("h1"));
        assert_eq!(sup.running_count().await, 0);
    }

    #[tokio::test]
    async fn test_existing_descriptor_policy() {
        let dir = tempfile::tempdir().unwrap();
        let request = "navigate to https://example.com and generate a page model";

        let mut cfg = config();
        cfg.workspace.root = dir.path().to_path_buf();
        let sup = supervisor(cfg.clone(), vec![Arc::new(example_com()), Arc::new(example_com())]);
        sup.spawn("p", request).await.unwrap().join().await.unwrap();
        let second = sup.spawn("p", request).await.unwrap().join().await.unwrap();
        assert!(second.warnings.iter().any(|w| w.contains("overwrote")));

        cfg.workspace.on_existing = trawl_config::ExistingArtifactPolicy::Preserve;
        let sup = supervisor(cfg, vec![Arc::new(example_com())]);
        let third = sup.spawn("p", request).await.unwrap().join().await.unwrap();
        assert!(third.warnings.iter().all(|w| !w.contains("overwrote")));
        assert!(third.persisted_to.is_some());
    }

    #[tokio::test]
    async fn test_session_outside_root_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config();
        cfg.workspace.root = dir.path().to_path_buf();
        let sup = supervisor(cfg, vec![]);
        assert!(sup.spawn("../elsewhere", "model https://example.com").await.is_err());
        assert!(sup.spawn("  ", "model https://example.com").await.is_err());
    }

    #[tokio::test]
    async fn test_handle_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config();
        cfg.workspace.root = dir.path().to_path_buf();
        let browser = Arc::new(
            ScriptedBrowser::new()
                .with_delay(Duration::from_millis(30), json!({ "url": "https://example.com" }))
                .with_ok(json!({ "elements": [] })),
        );
        let sup = supervisor(cfg, vec![browser.clone()]);

        let handle = sup.spawn("p", "model https://example.com").await.unwrap();
        handle.cancel();
        let outcome = handle.join().await.unwrap();
        assert_eq!(outcome.status, TaskStatus::Cancelled);
        assert!(outcome.turns.len() <= 1);
        assert!(outcome.persisted_to.is_none());
        assert!(browser.was_released());
    }

    #[tokio::test]
    async fn test_supervisor_resume() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config();
        cfg.workspace.root = dir.path().to_path_buf();
        let browser = Arc::new(example_com());
        let sup = supervisor(cfg, vec![browser.clone()]);

        let handle = sup.spawn("p", "generate a page model").await.unwrap();
        let handle = sup.resume(handle, "https://example.com").await.unwrap();
        let outcome = handle.join().await.unwrap();
        assert_eq!(outcome.status, TaskStatus::Finalized);
        assert_eq!(browser.recorded_calls().len(), 4);
    }
}
