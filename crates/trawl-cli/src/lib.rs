//! # trawl-cli
//!
//! Command-line interface for trawl.
//!
//! ## Commands
//!
//! - `trawl run`: Turn one or more requests into task descriptors
//! - `trawl replay`: Re-run a recorded transcript without a browser
//! - `trawl config`: Show the effective configuration
//! - `trawl doctor`: Validate configuration and locate Chrome

pub mod commands;

pub use commands::Cli;
