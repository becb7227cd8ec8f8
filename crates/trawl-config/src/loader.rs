use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::schema::TrawlConfig;

/// Loads the trawl configuration from disk plus environment.
pub struct ConfigLoader {
    config: TrawlConfig,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > TRAWL_CONFIG env > ~/.trawl/trawl.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("TRAWL_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".trawl")
            .join("trawl.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> trawl_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            Self::parse(&raw, &config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            TrawlConfig::default()
        };

        let config = Self::apply_env_overrides(config, |key| std::env::var(key).ok());
        Self::check(&config)?;

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Build a loader from TOML text. No environment overrides are applied.
    pub fn from_toml(raw: &str) -> trawl_core::Result<Self> {
        let config_path = PathBuf::from("<inline>");
        let config = Self::parse(raw, &config_path)?;
        Self::check(&config)?;
        Ok(Self {
            config,
            config_path,
        })
    }

    /// Get a copy of the loaded config.
    pub fn get(&self) -> TrawlConfig {
        self.config.clone()
    }

    /// Path the config was (or would have been) read from.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    fn parse(raw: &str, path: &Path) -> trawl_core::Result<TrawlConfig> {
        toml::from_str::<TrawlConfig>(raw).map_err(|e| {
            trawl_core::TrawlError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Validate config: log warnings, fail on errors.
    fn check(config: &TrawlConfig) -> trawl_core::Result<()> {
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
                Ok(())
            }
            Err(e) => Err(trawl_core::TrawlError::Config(e)),
        }
    }

    /// Apply env var overrides (TRAWL_WORKSPACE_ROOT, TRAWL_CDP_PORT, etc.).
    /// Unparseable numeric values are ignored with a warning.
    pub fn apply_env_overrides<F>(mut config: TrawlConfig, lookup: F) -> TrawlConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TRAWL_WORKSPACE_ROOT") {
            config.workspace.root = PathBuf::from(v);
        }
        if let Some(v) = lookup("TRAWL_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Some(v) = lookup("TRAWL_CDP_PORT") {
            match v.parse::<u16>() {
                Ok(port) => config.browser.cdp_port = port,
                Err(_) => warn!(value = %v, "ignoring invalid TRAWL_CDP_PORT"),
            }
        }
        if let Some(v) = lookup("TRAWL_MAX_TURNS") {
            match v.parse::<u32>() {
                Ok(n) => config.orchestrator.max_turns = n,
                Err(_) => warn!(value = %v, "ignoring invalid TRAWL_MAX_TURNS"),
            }
        }
        if let Some(v) = lookup("TRAWL_ACTION_TIMEOUT_MS") {
            match v.parse::<u64>() {
                Ok(ms) => config.tools.action_timeout_ms = ms,
                Err(_) => warn!(value = %v, "ignoring invalid TRAWL_ACTION_TIMEOUT_MS"),
            }
        }
        if let Some(v) = lookup("TRAWL_CHROME_PATH") {
            config.browser.chrome_path = Some(PathBuf::from(v));
        }
        config
    }
}
