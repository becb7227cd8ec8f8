//! # trawl-tools
//!
//! The Tool Invocation Layer. A [`ToolInvoker`] validates a [`ToolRequest`]
//! against a per-tool argument schema, resolves file-store paths inside the
//! workspace root, and dispatches exactly one call at a time to a capability
//! provider under a bounded wait.
//!
//! Providers shipped here:
//!
//! - [`CdpBrowser`]: Chrome DevTools Protocol browser control.
//! - [`LocalFileStore`]: local disk, writes serialised per path.
//! - [`mock`]: scripted browser and in-memory file store for tests and replay.
//!
//! [`ToolRequest`]: trawl_core::ToolRequest

pub mod browser;
pub mod invoker;
pub mod mock;
pub mod schema;
pub mod workspace;

pub use browser::CdpBrowser;
pub use invoker::ToolInvoker;
pub use workspace::{LocalFileStore, WorkspaceRoot};
