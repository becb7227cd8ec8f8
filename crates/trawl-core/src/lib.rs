//! # trawl-core
//!
//! Core types, traits, and primitives for the trawl orchestration core.
//! This crate defines the shared vocabulary used by every other crate in the workspace:
//! the tool wire contract, the capability-provider traits, the task descriptor,
//! and the unified error type.

pub mod descriptor;
pub mod error;
pub mod event;
pub mod provider;
pub mod tool;
pub mod types;

pub use descriptor::{TaskDescriptor, TaskType};
pub use error::{TaskFailure, ToolErrorKind, ToolFault, TrawlError, Result};
pub use event::{EventBus, TaskEvent};
pub use provider::{BrowserControl, DirEntry, FileStore};
pub use tool::{InteractionKind, ProviderKind, ToolName, ToolOutcome, ToolRequest};
pub use types::*;
