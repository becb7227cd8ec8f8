//! # trawl-config
//!
//! Configuration system for trawl. Reads from `trawl.toml` and environment
//! variables, environment taking precedence over the file.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::TrawlConfig;
pub use schema::{ConfigWarning, ExistingArtifactPolicy, WarningSeverity};
