//! # trawl-runtime
//!
//! Runs tasks end to end.
//!
//! ```text
//!   raw request ──► RequestNormalizer ──► Goal
//!                                          │
//!              ┌───────────────────────────▼──────────┐
//!              │              TaskRunner              │
//!              │                                      │
//!              │  1. Decide   ← Router (pure)         │
//!              │  2. Invoke   ← ToolInvoker (1 call)  │
//!              │  3. Record   ← StateStore (append)   │
//!              │  4. Repeat until Finalize/Fail/Clarify│
//!              │  5. Finalize ← Finalizer             │
//!              └───────────────────┬──────────────────┘
//!                                  │ TaskOutcome
//!                                  ▼
//!              Supervisor: persist descriptor, release browser
//! ```
//!
//! Each task owns its store, invoker, and browser session. Tasks in one
//! supervisor share the file store.

pub mod persist;
pub mod runner;
pub mod supervisor;
pub mod transcript;

pub use persist::{Persisted, descriptor_path, persist_descriptor};
pub use runner::{TaskOutcome, TaskRunner};
pub use supervisor::{BrowserFactory, CdpBrowserFactory, Supervisor, TaskHandle};
pub use transcript::{Transcript, TranscriptTurn, replay};
