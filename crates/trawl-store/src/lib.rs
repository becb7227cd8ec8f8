//! # trawl-store
//!
//! The per-task State Store:
//!
//! - **Turns**: append-only ledger of every tool request and its normalised result.
//! - **Facts**: named values lifted out of tool results, each citing the turn it came from.
//! - **Validations**: whether an interaction against a fact's selector succeeded.
//!
//! A store is owned by exactly one orchestration loop; every mutating method
//! takes `&mut self`, so concurrent writers are ruled out by the borrow checker.

pub mod ledger;

pub use ledger::{ExtractedFact, StateStore, TurnRecord, ValidationResult};
