//! Risk-gated executor: turns a trigger into at most one recorded execution

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use super::backend::FillModel;
use super::ledger::{Ledger, PortfolioStatus};
use super::risk::RiskParameters;
use crate::common::errors::{BackendError, Result, RiskRejection};
use crate::common::traits::{EngineObserver, ExecutionBackend};
use crate::common::types::{Execution, Order, Side, TradeEvent, Trigger};
use crate::config::types::ExecutionSettings;

/// Sizes, risk-checks and dispatches orders for triggers
///
/// The ledger lock is held from the risk checks until the execution is
/// recorded, so concurrent triggers see a consistent daily P&L.
pub struct Executor {
    backend: Arc<dyn ExecutionBackend>,
    risk: RiskParameters,
    fallback: FillModel,
    dispatch_timeout: Duration,
    protective_orders: bool,
    ledger: Mutex<Ledger>,
    events: Option<mpsc::Sender<TradeEvent>>,
}

impl Executor {
    pub fn new(
        backend: Arc<dyn ExecutionBackend>,
        risk: RiskParameters,
        settings: &ExecutionSettings,
    ) -> Result<Self> {
        risk.validate()?;
        Ok(Self {
            backend,
            risk,
            fallback: FillModel::from_settings(settings),
            dispatch_timeout: Duration::from_millis(settings.dispatch_timeout_ms.max(1)),
            protective_orders: settings.protective_orders,
            ledger: Mutex::new(Ledger::new(settings.portfolio_value)),
            events: None,
        })
    }

    /// Publish trade events on `sender`
    pub fn with_events(mut self, sender: mpsc::Sender<TradeEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    /// Authenticate with the backend; false means every order will fall back
    pub async fn connect(&self) -> bool {
        match self.backend.authenticate().await {
            Ok(()) => {
                info!(
                    backend = self.backend.name(),
                    simulated = self.backend.is_simulated(),
                    "execution backend connected"
                );
                true
            }
            Err(e) => {
                warn!(backend = self.backend.name(), error = %e, "execution backend unavailable, fills will be simulated");
                false
            }
        }
    }

    /// Handle one trigger
    ///
    /// Returns the recorded execution, or the reason nothing was placed.
    /// A backend failure is not an error here: the order is filled by the
    /// simulator instead and the result is flagged `is_fallback`.
    #[instrument(skip(self, trigger), fields(symbol = %trigger.symbol))]
    pub async fn on_trigger(&self, trigger: &Trigger) -> Result<Execution> {
        let symbol = trigger.symbol.as_str();
        let price = trigger.snapshot.price;
        if !price.is_finite() || price <= 0.0 {
            let rejection = RiskRejection::NoMarketPrice {
                symbol: symbol.to_string(),
            };
            return self.reject(symbol, rejection).await;
        }

        let mut ledger = self.ledger.lock().await;
        ledger.roll_day(Utc::now());

        if let Err(rejection) = self.risk.check_daily_loss(ledger.daily_pnl()) {
            drop(ledger);
            return self.reject(symbol, rejection).await;
        }

        let shares = self.risk.position_size(ledger.portfolio_value(), price);
        if shares == 0 {
            drop(ledger);
            return self.reject(symbol, RiskRejection::ZeroShares { price }).await;
        }

        let order = Order::market(symbol, Side::Buy, shares, price);
        if let Err(rejection) = self.risk.check_notional(order.notional()) {
            drop(ledger);
            return self.reject(symbol, rejection).await;
        }

        info!(
            order_id = %order.client_order_id,
            qty = order.quantity,
            price,
            conditions = trigger.conditions.len(),
            "placing order"
        );
        let (execution, from_backend) = self.dispatch(&order).await;
        ledger.record(execution.clone());
        drop(ledger);

        info!(
            execution_id = %execution.execution_id,
            price = execution.executed_price,
            qty = execution.executed_quantity,
            commission = execution.commission,
            simulated = execution.is_simulated,
            fallback = execution.is_fallback,
            "trade executed"
        );
        self.emit(TradeEvent::Executed(execution.clone()));

        if from_backend && self.protective_orders {
            self.place_protective_orders(&execution).await;
        }
        Ok(execution)
    }

    /// Send to the backend, falling back to a simulated fill on any failure
    async fn dispatch(&self, order: &Order) -> (Execution, bool) {
        let error = match timeout(self.dispatch_timeout, self.backend.place_order(order)).await {
            Ok(Ok(execution)) => return (execution, true),
            Ok(Err(e)) => e,
            Err(_) => BackendError::Timeout(self.dispatch_timeout.as_millis() as u64),
        };

        warn!(
            backend = self.backend.name(),
            error = %error,
            retryable = error.is_retryable(),
            "backend failed, using simulated fill"
        );
        self.emit(TradeEvent::Fallback {
            symbol: order.symbol.clone(),
            reason: error.to_string(),
        });

        let execution = Execution {
            is_fallback: true,
            ..self.fallback.fill(order)
        };
        (execution, false)
    }

    async fn place_protective_orders(&self, execution: &Execution) {
        let qty = execution.executed_quantity;
        if qty == 0 {
            return;
        }
        let symbol = execution.order.symbol.as_str();
        let entry = execution.executed_price;
        let orders = [
            Order::stop(symbol, Side::Sell, qty, self.risk.stop_loss_price(entry)),
            Order::limit(symbol, Side::Sell, qty, self.risk.take_profit_price(entry)),
        ];

        for order in orders {
            let failure = match timeout(self.dispatch_timeout, self.backend.place_order(&order)).await {
                Ok(Ok(_)) => {
                    info!(kind = ?order.kind, price = order.reference_price, "protective order placed");
                    continue;
                }
                Ok(Err(e)) => e,
                Err(_) => BackendError::Timeout(self.dispatch_timeout.as_millis() as u64),
            };
            warn!(kind = ?order.kind, error = %failure, "protective order failed");
            self.emit(TradeEvent::ProtectiveOrderFailed {
                symbol: symbol.to_string(),
                kind: order.kind,
                reason: failure.to_string(),
            });
        }
    }

    async fn reject(&self, symbol: &str, rejection: RiskRejection) -> Result<Execution> {
        warn!(reason = %rejection, "trigger rejected by risk checks");
        self.emit(TradeEvent::Rejected {
            symbol: symbol.to_string(),
            reason: rejection.to_string(),
        });
        Err(rejection.into())
    }

    /// Publish without waiting: a full channel drops the event
    fn emit(&self, event: TradeEvent) {
        let Some(sender) = &self.events else {
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(?event, "trade event channel full, event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("trade event receiver dropped");
            }
        }
    }

    /// Drain triggers until every sender is dropped
    pub async fn run(self: Arc<Self>, mut triggers: mpsc::UnboundedReceiver<Trigger>) {
        info!("executor started");
        while let Some(trigger) = triggers.recv().await {
            if let Err(e) = self.on_trigger(&trigger).await {
                debug!(error = %e, "trigger produced no execution");
            }
        }
        info!("trigger channel closed, executor stopped");
    }

    /// Add realized P&L to today's total
    pub async fn record_pnl(&self, delta: f64) {
        let mut ledger = self.ledger.lock().await;
        ledger.roll_day(Utc::now());
        ledger.record_pnl(delta);
    }

    pub async fn set_portfolio_value(&self, value: f64) {
        self.ledger.lock().await.set_portfolio_value(value);
    }

    pub async fn daily_pnl(&self) -> f64 {
        self.ledger.lock().await.daily_pnl()
    }

    pub async fn executed_trades(&self) -> Vec<Execution> {
        self.ledger.lock().await.executions().to_vec()
    }

    pub async fn portfolio_status(&self) -> PortfolioStatus {
        self.ledger.lock().await.status()
    }

    pub fn risk(&self) -> &RiskParameters {
        &self.risk
    }
}

/// Engine observer that hands triggers to the executor task
///
/// Never blocks the evaluation task.
pub struct TriggerForwarder {
    sender: mpsc::UnboundedSender<Trigger>,
}

impl TriggerForwarder {
    pub fn new(sender: mpsc::UnboundedSender<Trigger>) -> Self {
        Self { sender }
    }
}

impl EngineObserver for TriggerForwarder {
    fn on_trigger(&self, trigger: &Trigger) {
        if self.sender.send(trigger.clone()).is_err() {
            error!(symbol = %trigger.symbol, "executor is gone, trigger not handled");
        }
    }

    fn name(&self) -> &str {
        "trigger_forwarder"
    }
}
