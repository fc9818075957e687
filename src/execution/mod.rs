//! Order placement behind risk checks
//!
//! Triggers arrive from the engine through `TriggerForwarder`; the
//! `Executor` sizes a market order, applies the risk limits and dispatches
//! to an `ExecutionBackend`, falling back to a simulated fill on failure.

pub mod backend;
pub mod executor;
pub mod ledger;
pub mod risk;

pub use backend::{build_backend, FillModel, OfflineBackend, SimulatedBackend};
pub use executor::{Executor, TriggerForwarder};
pub use ledger::{Ledger, PortfolioStatus};
pub use risk::RiskParameters;
