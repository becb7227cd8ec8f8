#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;
    use trawl_config::ConfigLoader;
    use trawl_config::schema::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_orchestrator_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_turns, 50);
        assert_eq!(config.max_attempts_per_action, 2);
        assert_eq!(config.retry_backoff_ms, 250);
        assert_eq!(config.retry_backoff_max_ms, 2000);
        assert_eq!(config.max_discovered_elements, 12);
    }

    #[test]
    fn test_tools_defaults_match_provider_timeouts() {
        let config = ToolsConfig::default();
        assert_eq!(config.action_timeout().as_millis(), 10_000);
        assert_eq!(config.navigation_timeout().as_millis(), 30_000);
    }

    #[test]
    fn test_workspace_defaults() {
        let config = WorkspaceConfig::default();
        assert_eq!(config.root, std::path::PathBuf::from("workspace"));
        assert!(config.persist_descriptors);
        assert_eq!(config.on_existing, ExistingArtifactPolicy::Overwrite);
    }

    #[test]
    fn test_default_config_validates_clean() {
        let warnings = TrawlConfig::default().validate().unwrap();
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    // ── TOML tests ─────────────────────────────────────────────

    #[test]
    fn test_partial_toml_applies_defaults() {
        let config: TrawlConfig = toml::from_str(
            r#"
[orchestrator]
max_turns = 20

[workspace]
on_existing = "preserve"
"#,
        )
        .unwrap();
        assert_eq!(config.orchestrator.max_turns, 20);
        assert_eq!(config.orchestrator.max_attempts_per_action, 2);
        assert_eq!(config.workspace.on_existing, ExistingArtifactPolicy::Preserve);
        assert_eq!(config.browser.cdp_port, 9222);
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = TrawlConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let restored: TrawlConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.tools.action_timeout_ms, config.tools.action_timeout_ms);
        assert_eq!(restored.workspace.root, config.workspace.root);
    }

    #[test]
    fn test_unknown_existing_policy_is_rejected() {
        let result = ConfigLoader::from_toml("[workspace]\non_existing = \"merge\"\n");
        assert!(result.is_err());
    }

    // ── Validation tests ───────────────────────────────────────

    #[test]
    fn test_zero_turns_is_an_error() {
        let mut config = TrawlConfig::default();
        config.orchestrator.max_turns = 0;
        let err = config.validate().unwrap_err();
        assert!(err.contains("orchestrator.max_turns"));
    }

    #[test]
    fn test_zero_timeout_is_an_error() {
        let mut config = TrawlConfig::default();
        config.tools.navigation_timeout_ms = 0;
        assert!(config.validate().unwrap_err().contains("tools.navigation_timeout_ms"));
    }

    #[test]
    fn test_unknown_log_format_is_a_warning() {
        let mut config = TrawlConfig::default();
        config.logging.format = "xml".into();
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity, WarningSeverity::Warning);
        assert!(warnings[0].to_string().contains("logging.format"));
    }

    #[test]
    fn test_inverted_backoff_is_info() {
        let mut config = TrawlConfig::default();
        config.orchestrator.retry_backoff_max_ms = 10;
        let warnings = config.validate().unwrap();
        assert!(warnings.iter().any(|w| w.severity == WarningSeverity::Info));
    }

    // ── Env override tests ─────────────────────────────────────

    #[test]
    fn test_env_overrides_apply() {
        let config = ConfigLoader::apply_env_overrides(
            TrawlConfig::default(),
            env(&[
                ("TRAWL_WORKSPACE_ROOT", "/srv/trawl"),
                ("TRAWL_CDP_PORT", "9333"),
                ("TRAWL_MAX_TURNS", "7"),
                ("TRAWL_ACTION_TIMEOUT_MS", "500"),
                ("TRAWL_LOG_LEVEL", "debug"),
            ]),
        );
        assert_eq!(config.workspace.root, std::path::PathBuf::from("/srv/trawl"));
        assert_eq!(config.browser.cdp_port, 9333);
        assert_eq!(config.orchestrator.max_turns, 7);
        assert_eq!(config.tools.action_timeout_ms, 500);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_env_override_ignores_garbage_numbers() {
        let config = ConfigLoader::apply_env_overrides(
            TrawlConfig::default(),
            env(&[("TRAWL_CDP_PORT", "not-a-port")]),
        );
        assert_eq!(config.browser.cdp_port, 9222);
    }

    // ── ConfigLoader tests ─────────────────────────────────────

    #[test]
    fn test_config_loader_with_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("trawl.toml");
        let mut f = std::fs::File::create(&config_path).unwrap();
        writeln!(
            f,
            r#"
[tools]
action_timeout_ms = 2500

[browser]
headless = false

[logging]
format = "json"
"#
        )
        .unwrap();

        let loader = ConfigLoader::load(Some(config_path.as_path())).unwrap();
        assert_eq!(loader.path(), config_path.as_path());
        let config = loader.get();
        assert_eq!(config.tools.action_timeout_ms, 2500);
        assert!(!config.browser.headless);
        assert_eq!(config.logging.format, "json");
    }

    #[test]
    fn test_config_loader_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::load(Some(dir.path().join("absent.toml").as_path())).unwrap();
        assert_eq!(loader.get().tools.navigation_timeout_ms, 30_000);
    }

    #[test]
    fn test_config_loader_rejects_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("trawl.toml");
        std::fs::write(&config_path, "[orchestrator]\nmax_attempts_per_action = 0\n").unwrap();
        let err = ConfigLoader::load(Some(config_path.as_path())).err().unwrap();
        assert!(err.to_string().contains("max_attempts_per_action"));
    }

    #[test]
    fn test_resolve_path_prefers_explicit() {
        let p = std::path::Path::new("/tmp/explicit.toml");
        assert_eq!(ConfigLoader::resolve_path(Some(p)), p.to_path_buf());
    }
}
