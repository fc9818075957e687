//! Trait seams between the engine, its observers and execution venues

use async_trait::async_trait;

use super::errors::BackendError;
use super::types::{
    AccountInfo, BrokerPosition, ConditionSetView, Execution, Order, OrderStatus, Trigger,
};

/// Receives notifications from the matching engine
///
/// Both callbacks run synchronously on the engine's evaluation task, so they
/// must return quickly. Anything slow (order placement, I/O) belongs on
/// another task; see `TriggerForwarder`.
///
/// A panic inside a callback is caught and logged by the engine; it does not
/// reach other observers.
pub trait EngineObserver: Send + Sync {
    /// Called after an evaluation pass flipped at least one `satisfied` flag,
    /// and after the set is replaced, extended, reset or cleared
    fn on_state_changed(&self, _conditions: &ConditionSetView) {}

    /// Called once per satisfaction episode, on the pass where the set
    /// became fully satisfied
    fn on_trigger(&self, _trigger: &Trigger) {}

    /// Name used in log lines
    fn name(&self) -> &str {
        "observer"
    }
}

/// Capability interface of a venue that can execute orders
///
/// The executor only depends on this trait; concrete gateways (simulator,
/// broker adapters) are chosen by the owning process.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// Name of the venue
    fn name(&self) -> &str;

    /// Whether fills from this backend are simulated
    fn is_simulated(&self) -> bool {
        false
    }

    /// Establish a session with the venue
    async fn authenticate(&self) -> Result<(), BackendError>;

    /// Balances and buying power
    async fn get_account_info(&self) -> Result<AccountInfo, BackendError>;

    /// Submit an order and wait for its fill
    async fn place_order(&self, order: &Order) -> Result<Execution, BackendError>;

    /// Cancel a working order
    async fn cancel_order(&self, order_id: &str) -> Result<(), BackendError>;

    /// Open positions
    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, BackendError>;

    /// Current state of one order
    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatus, BackendError>;
}
