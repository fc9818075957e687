//! Risk limits and position sizing

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::common::errors::{Result, RiskRejection, TraderError};

/// Per-run risk configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskParameters {
    /// Largest order notional allowed, in currency
    #[serde(default = "default_max_position_size")]
    pub max_position_size: f64,
    /// Trading stops once daily P&L reaches minus this amount
    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss: f64,
    /// Distance to the protective stop, as a fraction of entry price
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: f64,
    /// Distance to the take-profit, as a fraction of entry price
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: f64,
    /// Fraction of the portfolio put at risk per trade
    #[serde(default = "default_max_risk_per_trade")]
    pub max_risk_per_trade: f64,
}

impl Default for RiskParameters {
    fn default() -> Self {
        Self {
            max_position_size: default_max_position_size(),
            max_daily_loss: default_max_daily_loss(),
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            max_risk_per_trade: default_max_risk_per_trade(),
        }
    }
}

fn default_max_position_size() -> f64 {
    10_000.0
}

fn default_max_daily_loss() -> f64 {
    1_000.0
}

fn default_stop_loss_pct() -> f64 {
    0.02
}

fn default_take_profit_pct() -> f64 {
    0.05
}

fn default_max_risk_per_trade() -> f64 {
    0.01
}

impl RiskParameters {
    /// Reject values that would make sizing meaningless
    ///
    /// Aggressive but usable settings (more than 5% risk per trade, stops
    /// wider than 10%) only produce a warning.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("max_position_size", self.max_position_size),
            ("max_daily_loss", self.max_daily_loss),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(TraderError::Configuration(format!(
                    "risk.{} must be positive, got {}",
                    name, value
                )));
            }
        }

        let fractions = [
            ("stop_loss_pct", self.stop_loss_pct),
            ("take_profit_pct", self.take_profit_pct),
            ("max_risk_per_trade", self.max_risk_per_trade),
        ];
        for (name, value) in fractions {
            if !value.is_finite() || value <= 0.0 || value > 1.0 {
                return Err(TraderError::Configuration(format!(
                    "risk.{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.max_risk_per_trade > 0.05 {
            warn!(value = self.max_risk_per_trade, "max risk per trade exceeds 5%");
        }
        if self.stop_loss_pct > 0.10 {
            warn!(value = self.stop_loss_pct, "stop loss exceeds 10%");
        }
        Ok(())
    }

    /// Whole shares such that hitting the stop loses `max_risk_per_trade`
    /// of the portfolio
    ///
    /// `floor((portfolio_value * max_risk_per_trade) / (price * stop_loss_pct))`,
    /// or zero when the inputs do not produce a positive finite count.
    pub fn position_size(&self, portfolio_value: f64, price: f64) -> u64 {
        let risk_amount = portfolio_value * self.max_risk_per_trade;
        let per_share_risk = price * self.stop_loss_pct;
        let shares = (risk_amount / per_share_risk).floor();
        if shares.is_finite() && shares > 0.0 {
            shares as u64
        } else {
            0
        }
    }

    /// Refuse new trades once the day's loss reaches the limit
    pub fn check_daily_loss(&self, daily_pnl: f64) -> std::result::Result<(), RiskRejection> {
        if daily_pnl <= -self.max_daily_loss {
            return Err(RiskRejection::DailyLossLimit {
                daily_pnl,
                max_daily_loss: self.max_daily_loss,
            });
        }
        Ok(())
    }

    /// Refuse orders whose notional exceeds the position cap
    pub fn check_notional(&self, notional: f64) -> std::result::Result<(), RiskRejection> {
        if notional > self.max_position_size {
            return Err(RiskRejection::PositionTooLarge {
                notional,
                max_position_size: self.max_position_size,
            });
        }
        Ok(())
    }

    pub fn stop_loss_price(&self, entry_price: f64) -> f64 {
        entry_price * (1.0 - self.stop_loss_pct)
    }

    pub fn take_profit_price(&self, entry_price: f64) -> f64 {
        entry_price * (1.0 + self.take_profit_pct)
    }
}
