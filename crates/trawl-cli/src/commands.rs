use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, warn};

use trawl_config::{ConfigLoader, TrawlConfig, WarningSeverity};
use trawl_core::{Result, TaskEvent, TaskStatus, TrawlError};
use trawl_planner::{RequestNormalizer, RuleNormalizer};
use trawl_runtime::{CdpBrowserFactory, Supervisor, TaskOutcome, Transcript, replay};
use trawl_tools::LocalFileStore;

/// Turns free-form browser automation requests into verified task descriptors
#[derive(Parser)]
#[command(name = "trawl", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to trawl.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one or more requests; several requests run concurrently
    Run {
        /// Free-form requests, e.g. "navigate to https://example.com and generate a page model"
        #[arg(required = true)]
        requests: Vec<String>,

        /// Session (project) the tasks belong to; selects the workspace directory
        #[arg(short, long, default_value = "default")]
        session: String,

        /// Target URL for requests that do not name one
        #[arg(short, long)]
        target: Option<String>,

        /// Write a replayable transcript per task into this directory
        #[arg(long)]
        record: Option<PathBuf>,

        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replay a recorded transcript and print the resulting descriptor
    Replay {
        transcript: PathBuf,

        /// Print the full outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show current configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate configuration and check that Chrome can be found
    Doctor,
    /// Show version and build info
    Version,
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // --verbose > --quiet > --log-level > config
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level.as_deref().unwrap_or(&config.logging.level)
        };

        let filter = || {
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level))
        };
        match config.logging.format.as_str() {
            "json" => tracing_subscriber::fmt()
                .with_env_filter(filter())
                .json()
                .with_target(true)
                .init(),
            "compact" => tracing_subscriber::fmt()
                .with_env_filter(filter())
                .compact()
                .with_target(false)
                .init(),
            _ => tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_target(false)
                .init(),
        }

        match self.command {
            Commands::Run {
                requests,
                session,
                target,
                record,
                json,
            } => Self::cmd_run(config, requests, session, target, record, json).await,
            Commands::Replay { transcript, json } => {
                Self::cmd_replay(config, &transcript, json).await
            }
            Commands::Config { json } => Self::cmd_config(config, json, config_loader.path()),
            Commands::Doctor => Self::cmd_doctor(config),
            Commands::Version => Self::cmd_version(),
            Commands::Completions { shell } => Self::cmd_completions(shell),
        }
    }

    async fn cmd_run(
        config: TrawlConfig,
        requests: Vec<String>,
        session: String,
        target: Option<String>,
        record: Option<PathBuf>,
        json: bool,
    ) -> Result<()> {
        let supervisor = Supervisor::new(
            config.clone(),
            Arc::new(LocalFileStore::new()),
            Arc::new(CdpBrowserFactory::new(config.browser.clone())),
            Arc::new(RuleNormalizer::new()),
        );

        let progress = if json {
            None
        } else {
            let mut rx = supervisor.events().subscribe();
            Some(tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(event) => print_event(&event),
                        Err(RecvError::Lagged(n)) => warn!(skipped = n, "progress output lagged"),
                        Err(RecvError::Closed) => break,
                    }
                }
            }))
        };

        let interrupt = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("⏹  Cancelling after the current turn...");
                    supervisor.shutdown();
                }
            })
        };

        let normalizer = RuleNormalizer::new();
        let mut handles = Vec::with_capacity(requests.len());
        for request in &requests {
            let handle = supervisor.spawn(&session, request).await?;
            // A request without its own URL gets --target, if one was given.
            let handle = match target.as_deref() {
                Some(url) if normalizer.normalize(request).target_url.is_none() => {
                    supervisor.resume(handle, url).await?
                }
                _ => handle,
            };
            handles.push(handle);
        }

        let results = futures::future::join_all(handles.into_iter().map(|h| h.join())).await;
        interrupt.abort();
        if let Some(p) = progress {
            p.abort();
        }

        let mut unfinished = 0;
        for (request, result) in requests.iter().zip(results) {
            let outcome = match result {
                Ok(o) => o,
                Err(e) => {
                    error!(%request, error = %e, "task aborted");
                    eprintln!("❌ {request}: {e}");
                    unfinished += 1;
                    continue;
                }
            };
            if let Some(ref dir) = record {
                let path = dir.join(format!("{}.json", outcome.task_id));
                Transcript::from_outcome(request, &outcome).save(&path)?;
                println!("📼 Transcript: {}", path.display());
            }
            if outcome.status != TaskStatus::Finalized {
                unfinished += 1;
            }
            print_outcome(&outcome, json)?;
        }

        if unfinished > 0 {
            return Err(TrawlError::Other(anyhow::anyhow!(
                "{unfinished} of {} task(s) did not finalize",
                requests.len()
            )));
        }
        Ok(())
    }

    async fn cmd_replay(config: TrawlConfig, path: &Path, json: bool) -> Result<()> {
        let transcript = Transcript::load(path)?;
        let outcome = replay(&transcript, &config).await?;
        print_outcome(&outcome, json)?;
        if !outcome.warnings.is_empty() && !json {
            println!("⚠️  Replay did not match the recording exactly.");
        }
        Ok(())
    }

    fn cmd_config(config: TrawlConfig, json: bool, path: &Path) -> Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            println!("# {}", path.display());
            println!(
                "{}",
                toml::to_string_pretty(&config).map_err(|e| TrawlError::Config(e.to_string()))?
            );
        }
        Ok(())
    }

    fn cmd_doctor(config: TrawlConfig) -> Result<()> {
        println!("🩺 Trawl Doctor: configuration audit");
        println!();

        let warnings = match config.validate() {
            Ok(w) => w,
            Err(e) => {
                println!("{e}");
                return Ok(());
            }
        };

        let mut warn_count = 0;
        let mut info_count = 0;
        for w in &warnings {
            println!("  {w}");
            match w.severity {
                WarningSeverity::Warning => warn_count += 1,
                WarningSeverity::Info => info_count += 1,
                WarningSeverity::Error => {}
            }
        }

        match trawl_tools::browser::find_chrome_binary(config.browser.chrome_path.as_deref()) {
            Ok(path) => println!("  ✅ chrome: {}", path.display()),
            Err(e) => {
                println!("  ⚠️  chrome: {}", e.reason);
                warn_count += 1;
            }
        }

        println!();
        if warn_count == 0 {
            println!("✅ No warnings ({info_count} note(s)).");
        } else {
            println!("⚠️  {warn_count} warning(s), {info_count} note(s).");
        }
        Ok(())
    }

    fn cmd_version() -> Result<()> {
        println!("trawl v{}", env!("CARGO_PKG_VERSION"));
        println!("   Target: {}", std::env::consts::ARCH);
        println!("   OS: {}", std::env::consts::OS);
        #[cfg(debug_assertions)]
        println!("   Profile: debug");
        #[cfg(not(debug_assertions))]
        println!("   Profile: release");
        Ok(())
    }

    fn cmd_completions(shell: Shell) -> Result<()> {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "trawl", &mut std::io::stdout());
        Ok(())
    }
}

fn print_event(event: &TaskEvent) {
    match event {
        TaskEvent::TurnIssued { seq, summary, .. } => println!("  → [{seq}] {summary}"),
        TaskEvent::TurnCompleted {
            seq,
            ok: false,
            error,
            ..
        } => {
            let kind = error.map(|k| k.to_string()).unwrap_or_else(|| "error".into());
            println!("  ✗ [{seq}] {kind}");
        }
        TaskEvent::FactExtracted {
            name, value, seq, ..
        } => println!("  ✓ [{seq}] {name} = {value}"),
        TaskEvent::ClarificationRequested { reason, .. } => println!("  ? {reason}"),
        TaskEvent::DescriptorPersisted { path, .. } => println!("  💾 {path}"),
        _ => {}
    }
}

fn print_outcome(outcome: &TaskOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    println!();
    println!("{}", outcome.summary());
    for w in &outcome.warnings {
        println!("  ⚠️  {w}");
    }
    if let Some(ref descriptor) = outcome.descriptor {
        println!("{}", descriptor.to_pretty_json()?);
    }
    println!("   {} turn(s), {} ms", outcome.turns.len(), outcome.elapsed_ms);
    Ok(())
}
