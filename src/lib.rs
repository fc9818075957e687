//! Condition Trader Library
//!
//! Evaluates a set of market conditions against streaming snapshots and,
//! when every condition holds at once, hands a trigger to a risk-gated
//! executor that places (or simulates) a market order.

pub mod common;
pub mod config;
pub mod engine;
pub mod execution;
pub mod feed;

// Re-export commonly used types
pub use common::errors::{BackendError, Result, RiskRejection, TraderError};
pub use common::traits::{EngineObserver, ExecutionBackend};
pub use common::types::{
    ConditionSetView, ConditionView, Execution, Operator, Order, OrderKind, Side, Snapshot,
    TradeEvent, Trigger,
};
pub use config::types::AppConfig;
pub use engine::{Condition, EngineState, EngineStats, MatchingEngine};
pub use execution::{Executor, PortfolioStatus, RiskParameters, SimulatedBackend, TriggerForwarder};
pub use feed::MarketSimulator;
