//! Executed-trades ledger and daily P&L tracking

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use crate::common::types::Execution;

/// Summary of the executor's book
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioStatus {
    pub portfolio_value: f64,
    pub total_invested: f64,
    pub total_commission: f64,
    pub daily_pnl: f64,
    pub trade_count: usize,
    pub cash_available: f64,
}

/// Append-only record of fills plus the day's running P&L
#[derive(Debug, Clone)]
pub struct Ledger {
    portfolio_value: f64,
    daily_pnl: f64,
    trading_day: NaiveDate,
    executions: Vec<Execution>,
}

impl Ledger {
    pub fn new(portfolio_value: f64) -> Self {
        Self::starting_on(portfolio_value, Utc::now().date_naive())
    }

    /// Ledger whose current trading day is `day`
    pub fn starting_on(portfolio_value: f64, day: NaiveDate) -> Self {
        Self {
            portfolio_value,
            daily_pnl: 0.0,
            trading_day: day,
            executions: Vec::new(),
        }
    }

    /// Reset daily P&L when `now` falls on a later UTC day
    ///
    /// Returns true when a reset happened.
    pub fn roll_day(&mut self, now: DateTime<Utc>) -> bool {
        let today = now.date_naive();
        if today > self.trading_day {
            info!(previous = %self.trading_day, %today, pnl = self.daily_pnl, "new trading day, daily pnl reset");
            self.trading_day = today;
            self.daily_pnl = 0.0;
            return true;
        }
        false
    }

    pub fn record(&mut self, execution: Execution) {
        self.executions.push(execution);
    }

    /// Add realized P&L to the day's total
    pub fn record_pnl(&mut self, delta: f64) {
        self.daily_pnl += delta;
    }

    pub fn set_portfolio_value(&mut self, value: f64) {
        self.portfolio_value = value;
    }

    pub fn portfolio_value(&self) -> f64 {
        self.portfolio_value
    }

    pub fn daily_pnl(&self) -> f64 {
        self.daily_pnl
    }

    pub fn trading_day(&self) -> NaiveDate {
        self.trading_day
    }

    pub fn executions(&self) -> &[Execution] {
        &self.executions
    }

    pub fn status(&self) -> PortfolioStatus {
        let total_invested: f64 = self.executions.iter().map(Execution::notional).sum();
        let total_commission: f64 = self.executions.iter().map(|e| e.commission).sum();
        PortfolioStatus {
            portfolio_value: self.portfolio_value,
            total_invested,
            total_commission,
            daily_pnl: self.daily_pnl,
            trade_count: self.executions.len(),
            cash_available: self.portfolio_value - total_invested,
        }
    }
}
