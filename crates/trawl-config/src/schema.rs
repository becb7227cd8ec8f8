use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration, maps to `trawl.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrawlConfig {
    pub orchestrator: OrchestratorConfig,
    pub tools: ToolsConfig,
    pub browser: BrowserConfig,
    pub workspace: WorkspaceConfig,
    pub logging: LoggingConfig,
}

// ── Orchestrator ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum tool calls a single task may issue before it is failed.
    pub max_turns: u32,
    /// Attempts per action, including the first one. 2 = retry once.
    pub max_attempts_per_action: u32,
    /// Backoff before the first retry; doubles per further attempt.
    pub retry_backoff_ms: u64,
    /// Upper bound for the retry backoff.
    pub retry_backoff_max_ms: u64,
    /// Cap on element names taken from a snapshot when the request names none.
    pub max_discovered_elements: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_turns: 50,
            max_attempts_per_action: 2,
            retry_backoff_ms: 250,
            retry_backoff_max_ms: 2_000,
            max_discovered_elements: 12,
        }
    }
}

// ── Tools ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Bounded wait for every call except `navigate`.
    pub action_timeout_ms: u64,
    /// Bounded wait for `navigate`.
    pub navigation_timeout_ms: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            action_timeout_ms: 10_000,
            navigation_timeout_ms: 30_000,
        }
    }
}

impl ToolsConfig {
    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }
}

// ── Browser ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Chrome DevTools Protocol port to connect to (or launch on).
    pub cdp_port: u16,
    /// Launch Chrome headless when no running instance is found.
    pub headless: bool,
    /// Explicit Chrome/Chromium binary. Auto-detected when unset.
    pub chrome_path: Option<PathBuf>,
    /// Seconds to wait for a launched browser to accept CDP connections.
    pub launch_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            cdp_port: 9222,
            headless: true,
            chrome_path: None,
            launch_timeout_secs: 10,
        }
    }
}

// ── Workspace ──────────────────────────────────────────────────

/// What to do when a persisted artifact already exists at the target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingArtifactPolicy {
    /// Replace the file and log a warning naming it.
    Overwrite,
    /// Leave the existing file untouched and record a warning.
    Preserve,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Root every file-store path is resolved against.
    pub root: PathBuf,
    /// Write finalized descriptors under `<root>/<session>/descriptors/`.
    pub persist_descriptors: bool,
    pub on_existing: ExistingArtifactPolicy,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("workspace"),
            persist_descriptors: true,
            on_existing: ExistingArtifactPolicy::Overwrite,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

/// A single config validation issue.
#[derive(Debug)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            WarningSeverity::Error => "error",
            WarningSeverity::Warning => "warning",
            WarningSeverity::Info => "info",
        };
        write!(f, "[{}] {}: {}", tag, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, " ({})", h)?;
        }
        Ok(())
    }
}

impl TrawlConfig {
    /// Validate the config and return a list of warnings.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Orchestrator ───
        if self.orchestrator.max_turns == 0 {
            warnings.push(ConfigWarning {
                field: "orchestrator.max_turns".into(),
                message: "max_turns is 0, no tool call could ever be issued".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 50".into()),
            });
        } else if self.orchestrator.max_turns < 4 {
            warnings.push(ConfigWarning {
                field: "orchestrator.max_turns".into(),
                message: format!(
                    "max_turns {} leaves no room for extraction after navigate + snapshot",
                    self.orchestrator.max_turns
                ),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        if self.orchestrator.max_attempts_per_action == 0 {
            warnings.push(ConfigWarning {
                field: "orchestrator.max_attempts_per_action".into(),
                message: "must be at least 1".into(),
                severity: WarningSeverity::Error,
                hint: Some("2 means one retry".into()),
            });
        } else if self.orchestrator.max_attempts_per_action > 5 {
            warnings.push(ConfigWarning {
                field: "orchestrator.max_attempts_per_action".into(),
                message: format!(
                    "{} attempts per action will re-issue state-changing browser calls many times",
                    self.orchestrator.max_attempts_per_action
                ),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        if self.orchestrator.retry_backoff_max_ms < self.orchestrator.retry_backoff_ms {
            warnings.push(ConfigWarning {
                field: "orchestrator.retry_backoff_max_ms".into(),
                message: "cap is below the base backoff; the base will be used".into(),
                severity: WarningSeverity::Info,
                hint: None,
            });
        }

        if self.orchestrator.max_discovered_elements == 0 {
            warnings.push(ConfigWarning {
                field: "orchestrator.max_discovered_elements".into(),
                message: "0 disables element discovery for requests that name no elements".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        // ── Tools ───
        for (field, value) in [
            ("tools.action_timeout_ms", self.tools.action_timeout_ms),
            ("tools.navigation_timeout_ms", self.tools.navigation_timeout_ms),
        ] {
            if value == 0 {
                warnings.push(ConfigWarning {
                    field: field.into(),
                    message: "timeout is 0, every call would time out".into(),
                    severity: WarningSeverity::Error,
                    hint: None,
                });
            }
        }

        // ── Browser ───
        if self.browser.cdp_port == 0 {
            warnings.push(ConfigWarning {
                field: "browser.cdp_port".into(),
                message: "port 0 is not a valid CDP port".into(),
                severity: WarningSeverity::Error,
                hint: Some("Chrome's default is 9222".into()),
            });
        }
        if let Some(ref p) = self.browser.chrome_path
            && !p.exists()
        {
            warnings.push(ConfigWarning {
                field: "browser.chrome_path".into(),
                message: format!("{} does not exist", p.display()),
                severity: WarningSeverity::Warning,
                hint: Some("Remove it to auto-detect Chrome".into()),
            });
        }

        // ── Workspace ───
        if self.workspace.root.as_os_str().is_empty() {
            warnings.push(ConfigWarning {
                field: "workspace.root".into(),
                message: "workspace root is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 'workspace'".into()),
            });
        }

        // ── Logging ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.level".into(),
                message: format!("unknown log level '{}'", self.logging.level),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_levels.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
