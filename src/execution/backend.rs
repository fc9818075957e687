//! Execution backends: the in-process simulator and the offline stand-in

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument};

use crate::common::errors::BackendError;
use crate::common::traits::ExecutionBackend;
use crate::common::types::{
    generate_id, AccountInfo, BrokerPosition, Execution, Order, OrderKind, OrderState, OrderStatus,
    Side,
};
use crate::config::types::{BackendKind, ExecutionSettings};

/// Price and commission model for simulated fills
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillModel {
    /// Commission as a fraction of notional
    pub commission_rate: f64,
    /// Slippage is drawn uniformly from `[-max_slippage, max_slippage]`
    pub max_slippage: f64,
}

impl Default for FillModel {
    fn default() -> Self {
        Self {
            commission_rate: 0.001,
            max_slippage: 0.0005,
        }
    }
}

impl FillModel {
    pub fn from_settings(settings: &ExecutionSettings) -> Self {
        Self {
            commission_rate: settings.commission_rate.max(0.0),
            max_slippage: settings.max_slippage.abs(),
        }
    }

    /// Fill the whole order near its reference price
    pub fn fill(&self, order: &Order) -> Execution {
        let slippage = if self.max_slippage > 0.0 {
            rand::thread_rng().gen_range(-self.max_slippage..=self.max_slippage)
        } else {
            0.0
        };
        let executed_price = order.reference_price * (1.0 + slippage);
        let commission = executed_price * order.quantity as f64 * self.commission_rate;

        Execution {
            order: order.clone(),
            executed_price,
            executed_quantity: order.quantity,
            timestamp: Utc::now(),
            execution_id: generate_id("SIM"),
            commission,
            is_simulated: true,
            is_fallback: false,
        }
    }
}

#[derive(Debug, Default)]
struct Book {
    cash: f64,
    positions: HashMap<String, BrokerPosition>,
    orders: HashMap<String, OrderStatus>,
}

impl Book {
    fn apply_fill(&mut self, execution: &Execution) {
        let signed = match execution.order.side {
            Side::Buy => execution.executed_quantity as i64,
            Side::Sell => -(execution.executed_quantity as i64),
        };
        self.cash -= signed as f64 * execution.executed_price + execution.commission;

        let position = self
            .positions
            .entry(execution.order.symbol.clone())
            .or_insert_with(|| BrokerPosition {
                symbol: execution.order.symbol.clone(),
                quantity: 0,
                avg_price: 0.0,
            });

        let new_qty = position.quantity + signed;
        if position.quantity == 0 || position.quantity.signum() == signed.signum() {
            let total_cost = position.avg_price * position.quantity.abs() as f64
                + execution.executed_price * signed.abs() as f64;
            position.avg_price = total_cost / new_qty.abs() as f64;
        } else if new_qty == 0 {
            position.avg_price = 0.0;
        } else if new_qty.signum() != position.quantity.signum() {
            position.avg_price = execution.executed_price;
        }
        position.quantity = new_qty;

        if position.quantity == 0 {
            self.positions.remove(&execution.order.symbol);
        }
    }
}

/// In-process venue: market orders fill at once, stop and limit orders rest
///
/// A resting order is acknowledged with an `Execution` whose
/// `executed_quantity` is zero.
pub struct SimulatedBackend {
    fill_model: FillModel,
    authenticated: AtomicBool,
    book: Mutex<Book>,
}

impl SimulatedBackend {
    pub fn new(fill_model: FillModel, starting_cash: f64) -> Self {
        Self {
            fill_model,
            authenticated: AtomicBool::new(false),
            book: Mutex::new(Book {
                cash: starting_cash,
                ..Book::default()
            }),
        }
    }

    fn ensure_authenticated(&self) -> Result<(), BackendError> {
        if self.authenticated.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::NotAuthenticated)
        }
    }

    fn book(&self) -> std::sync::MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ExecutionBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    fn is_simulated(&self) -> bool {
        true
    }

    async fn authenticate(&self) -> Result<(), BackendError> {
        self.authenticated.store(true, Ordering::SeqCst);
        info!("simulated backend ready");
        Ok(())
    }

    async fn get_account_info(&self) -> Result<AccountInfo, BackendError> {
        self.ensure_authenticated()?;
        let book = self.book();
        let positions_value: f64 = book
            .positions
            .values()
            .map(|p| p.quantity as f64 * p.avg_price)
            .sum();
        Ok(AccountInfo {
            cash_available: book.cash,
            portfolio_value: book.cash + positions_value,
            buying_power: book.cash.max(0.0),
        })
    }

    #[instrument(skip(self, order), fields(order_id = %order.client_order_id, symbol = %order.symbol))]
    async fn place_order(&self, order: &Order) -> Result<Execution, BackendError> {
        self.ensure_authenticated()?;
        if order.quantity == 0 {
            return Err(BackendError::Invalid("quantity must be positive".to_string()));
        }
        if !order.reference_price.is_finite() || order.reference_price <= 0.0 {
            return Err(BackendError::Invalid(format!(
                "bad reference price {}",
                order.reference_price
            )));
        }

        let mut book = self.book();
        match order.kind {
            OrderKind::Market => {
                let execution = self.fill_model.fill(order);
                book.apply_fill(&execution);
                book.orders.insert(
                    order.client_order_id.clone(),
                    OrderStatus {
                        order_id: order.client_order_id.clone(),
                        state: OrderState::Filled,
                        filled_quantity: execution.executed_quantity,
                        filled_price: Some(execution.executed_price),
                    },
                );
                debug!(price = execution.executed_price, qty = execution.executed_quantity, "simulated fill");
                Ok(execution)
            }
            OrderKind::Limit | OrderKind::Stop => {
                let price = order
                    .limit_price
                    .or(order.stop_price)
                    .ok_or_else(|| BackendError::Invalid("resting order without a price".to_string()))?;
                book.orders.insert(
                    order.client_order_id.clone(),
                    OrderStatus {
                        order_id: order.client_order_id.clone(),
                        state: OrderState::Working,
                        filled_quantity: 0,
                        filled_price: None,
                    },
                );
                debug!(kind = ?order.kind, price, "resting order accepted");
                Ok(Execution {
                    order: order.clone(),
                    executed_price: price,
                    executed_quantity: 0,
                    timestamp: Utc::now(),
                    execution_id: generate_id("ACK"),
                    commission: 0.0,
                    is_simulated: true,
                    is_fallback: false,
                })
            }
        }
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), BackendError> {
        self.ensure_authenticated()?;
        let mut book = self.book();
        let status = book
            .orders
            .get_mut(order_id)
            .ok_or_else(|| BackendError::UnknownOrder(order_id.to_string()))?;
        match status.state {
            OrderState::Working => {
                status.state = OrderState::Cancelled;
                Ok(())
            }
            other => Err(BackendError::Rejected(format!(
                "order {} is {:?}, cannot cancel",
                order_id, other
            ))),
        }
    }

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, BackendError> {
        self.ensure_authenticated()?;
        let mut positions: Vec<BrokerPosition> = self.book().positions.values().cloned().collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(positions)
    }

    async fn get_order_status(&self, order_id: &str) -> Result<OrderStatus, BackendError> {
        self.ensure_authenticated()?;
        self.book()
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| BackendError::UnknownOrder(order_id.to_string()))
    }
}

/// Backend used when no venue is connected
///
/// Every call fails with a retryable network error, so each trigger ends in
/// the executor's simulated-fill fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineBackend;

impl OfflineBackend {
    fn unavailable<T>() -> Result<T, BackendError> {
        Err(BackendError::Network("no broker connected".to_string()))
    }
}

#[async_trait]
impl ExecutionBackend for OfflineBackend {
    fn name(&self) -> &str {
        "offline"
    }

    async fn authenticate(&self) -> Result<(), BackendError> {
        Self::unavailable()
    }

    async fn get_account_info(&self) -> Result<AccountInfo, BackendError> {
        Self::unavailable()
    }

    async fn place_order(&self, _order: &Order) -> Result<Execution, BackendError> {
        Self::unavailable()
    }

    async fn cancel_order(&self, _order_id: &str) -> Result<(), BackendError> {
        Self::unavailable()
    }

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, BackendError> {
        Self::unavailable()
    }

    async fn get_order_status(&self, _order_id: &str) -> Result<OrderStatus, BackendError> {
        Self::unavailable()
    }
}

/// Construct the backend named in the configuration
pub fn build_backend(settings: &ExecutionSettings) -> Arc<dyn ExecutionBackend> {
    match settings.backend {
        BackendKind::Simulated => Arc::new(SimulatedBackend::new(
            FillModel::from_settings(settings),
            settings.portfolio_value,
        )),
        BackendKind::Offline => Arc::new(OfflineBackend),
    }
}
