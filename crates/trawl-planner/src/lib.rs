//! # trawl-planner
//!
//! Deciding what to do next, and when to stop.
//!
//! - [`RuleNormalizer`] turns a raw request into a [`Goal`].
//! - [`Router`] is a pure transition function over [`PlanState`]: given an
//!   [`Event`] it returns the next state and exactly one [`Action`].
//! - [`Finalizer`] checks the accumulated facts and emits the immutable
//!   [`TaskDescriptor`](trawl_core::TaskDescriptor).

pub mod finalizer;
pub mod goal;
pub mod normalizer;
pub mod router;

pub use finalizer::Finalizer;
pub use goal::{Goal, Interaction};
pub use normalizer::{RequestNormalizer, RuleNormalizer};
pub use router::{Action, Event, PlanState, RetryPolicy, Router, Transition};
