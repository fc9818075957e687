//! Condition matching engine
//!
//! ```text
//!  feed ──submit──► SnapshotQueue ──► evaluation task
//!                                         │  Matcher::evaluate (one pass)
//!                                         ├─► on_state_changed  (observers)
//!                                         └─► on_trigger        (observers)
//!                                                 │
//!                                          TriggerForwarder ──► Executor task
//! ```
//!
//! - [`Condition`] / [`ConditionSet`]: the rules being watched
//! - [`Matcher`]: synchronous pass logic and edge-triggered firing
//! - [`MatchingEngine`]: bounded ingestion, the evaluation task, observers

mod condition;
mod matcher;
mod runner;

pub use condition::{Condition, ConditionSet};
pub use crate::common::errors::DataError;
pub use matcher::{Matcher, PassOutcome};
pub use runner::{EngineState, EngineStats, MatchingEngine};
