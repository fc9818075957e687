//! Common test utilities and fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use condition_trader::common::types::{
    AccountInfo, BrokerPosition, OrderState, OrderStatus, PRICE, VOLUME,
};
use condition_trader::config::EngineSettings;
use condition_trader::{
    BackendError, Condition, ConditionSetView, EngineObserver, Execution, ExecutionBackend,
    MatchingEngine, Operator, Order, Snapshot, Trigger,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// RSI < 30, Price < 150, Volume > 2,000,000
pub fn oversold_conditions() -> Vec<Condition> {
    vec![
        Condition::new("rsi", "RSI", Operator::Lt, 30.0).unwrap(),
        Condition::new("price", PRICE, Operator::Lt, 150.0).unwrap(),
        Condition::new("volume", VOLUME, Operator::Gt, 2_000_000.0).unwrap(),
    ]
}

/// Snapshot satisfying [`oversold_conditions`]
pub fn oversold_snapshot() -> Snapshot {
    Snapshot::new("AAPL", 120.0, 2_500_000.0).with_indicator("RSI", 25.0)
}

/// Snapshot failing only the RSI condition
pub fn neutral_snapshot() -> Snapshot {
    Snapshot::new("AAPL", 120.0, 2_500_000.0).with_indicator("RSI", 55.0)
}

/// Engine with a short poll interval so stop is prompt
pub fn fast_engine() -> MatchingEngine {
    MatchingEngine::new(&EngineSettings {
        queue_capacity: 64,
        poll_interval_ms: 10,
    })
}

/// Observer that records everything it is told
#[derive(Default)]
pub struct RecordingObserver {
    states: Mutex<Vec<ConditionSetView>>,
    triggers: Mutex<Vec<Trigger>>,
}

impl RecordingObserver {
    pub fn states(&self) -> Vec<ConditionSetView> {
        self.states.lock().unwrap().clone()
    }

    pub fn triggers(&self) -> Vec<Trigger> {
        self.triggers.lock().unwrap().clone()
    }

    pub fn trigger_count(&self) -> usize {
        self.triggers.lock().unwrap().len()
    }
}

impl EngineObserver for RecordingObserver {
    fn on_state_changed(&self, conditions: &ConditionSetView) {
        self.states.lock().unwrap().push(conditions.clone());
    }

    fn on_trigger(&self, trigger: &Trigger) {
        self.triggers.lock().unwrap().push(trigger.clone());
    }

    fn name(&self) -> &str {
        "recorder"
    }
}

/// Poll `check` every 5ms until it holds or `limit` passes
pub async fn wait_until(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

/// Backend whose order calls never complete in time
pub struct StalledBackend {
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl StalledBackend {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionBackend for StalledBackend {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn authenticate(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn get_account_info(&self) -> Result<AccountInfo, BackendError> {
        Ok(AccountInfo::default())
    }

    async fn place_order(&self, _order: &Order) -> Result<Execution, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Err(BackendError::Network("gave up".to_string()))
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), BackendError> {
        Err(BackendError::UnknownOrder(order_id.to_string()))
    }

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, BackendError> {
        Ok(Vec::new())
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatus, BackendError> {
        Ok(OrderStatus {
            order_id: order_id.to_string(),
            state: OrderState::Rejected,
            filled_quantity: 0,
            filled_price: None,
        })
    }
}
