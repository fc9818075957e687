//! Configuration types

use serde::{Deserialize, Serialize};

use crate::common::channels::DEFAULT_QUEUE_CAPACITY;
use crate::common::errors::Result;
use crate::engine::Condition;
use crate::execution::RiskParameters;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Matching engine settings
    #[serde(default)]
    pub engine: EngineSettings,
    /// Risk limits applied to every trigger
    #[serde(default)]
    pub risk: RiskParameters,
    /// Executor and backend settings
    #[serde(default)]
    pub execution: ExecutionSettings,
    /// Simulated market data feed
    #[serde(default)]
    pub feed: FeedSettings,
    /// General application settings
    #[serde(default)]
    pub settings: AppSettings,
    /// Pre-parsed conditions to watch at startup
    #[serde(default)]
    pub conditions: Vec<ConditionConfig>,
}

impl AppConfig {
    /// Convert the configured condition records, rejecting the first bad one
    pub fn build_conditions(&self) -> Result<Vec<Condition>> {
        self.conditions.iter().map(ConditionConfig::build).collect()
    }
}

/// Matching engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Maximum pending snapshots before stale ones are dropped
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// How long the evaluation task waits on an empty queue before
    /// re-checking for shutdown, in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_poll_interval() -> u64 {
    100
}

/// Which execution backend the executor talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process simulator that fills market orders immediately
    #[default]
    Simulated,
    /// No venue connected; every order falls back to a simulated fill
    Offline,
}

/// Executor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSettings {
    /// Portfolio value used for position sizing
    #[serde(default = "default_portfolio_value")]
    pub portfolio_value: f64,
    /// Bound on a single backend call, in milliseconds
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_ms: u64,
    /// Backend selection
    #[serde(default)]
    pub backend: BackendKind,
    /// Submit stop-loss and take-profit orders after a fill
    #[serde(default = "default_true")]
    pub protective_orders: bool,
    /// Simulated commission as a fraction of notional
    #[serde(default = "default_commission_rate")]
    pub commission_rate: f64,
    /// Largest simulated slippage as a fraction of price
    #[serde(default = "default_max_slippage")]
    pub max_slippage: f64,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            portfolio_value: default_portfolio_value(),
            dispatch_timeout_ms: default_dispatch_timeout(),
            backend: BackendKind::default(),
            protective_orders: true,
            commission_rate: default_commission_rate(),
            max_slippage: default_max_slippage(),
        }
    }
}

fn default_portfolio_value() -> f64 {
    100_000.0
}

fn default_dispatch_timeout() -> u64 {
    3000
}

fn default_true() -> bool {
    true
}

fn default_commission_rate() -> f64 {
    0.001
}

fn default_max_slippage() -> f64 {
    0.0005
}

/// Simulated market data settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSettings {
    /// Symbol the simulator produces snapshots for
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Delay between snapshots in milliseconds
    #[serde(default = "default_feed_interval")]
    pub interval_ms: u64,
    /// Starting price
    #[serde(default = "default_base_price")]
    pub base_price: f64,
    /// Average volume per snapshot
    #[serde(default = "default_base_volume")]
    pub base_volume: f64,
    /// Fixed RNG seed for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            interval_ms: default_feed_interval(),
            base_price: default_base_price(),
            base_volume: default_base_volume(),
            seed: None,
        }
    }
}

fn default_symbol() -> String {
    "AAPL".to_string()
}

fn default_feed_interval() -> u64 {
    500
}

fn default_base_price() -> f64 {
    150.0
}

fn default_base_volume() -> f64 {
    1_000_000.0
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// One pre-parsed condition record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    pub task_id: String,
    /// Source text, shown in status output
    #[serde(default)]
    pub description: Option<String>,
    /// "Price", "Volume" or an indicator name such as "RSI"
    pub indicator: String,
    /// "<", ">", "<=", ">=" or a word alias such as "below"
    pub operator: String,
    pub threshold: f64,
}

impl ConditionConfig {
    pub fn build(&self) -> Result<Condition> {
        let condition =
            Condition::parse(&self.task_id, &self.indicator, &self.operator, self.threshold)?;
        Ok(match &self.description {
            Some(text) => condition.with_description(text),
            None => condition,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::Operator;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.engine.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.engine.poll_interval_ms, 100);
        assert_eq!(config.execution.backend, BackendKind::Simulated);
        assert_eq!(config.execution.dispatch_timeout_ms, 3000);
        assert_eq!(config.feed.symbol, "AAPL");
        assert!(config.conditions.is_empty());
    }

    #[test]
    fn test_build_conditions() {
        let config = AppConfig {
            conditions: vec![
                ConditionConfig {
                    task_id: "task_1".into(),
                    description: Some("RSI < 30".into()),
                    indicator: "RSI".into(),
                    operator: "<".into(),
                    threshold: 30.0,
                },
                ConditionConfig {
                    task_id: "task_2".into(),
                    description: None,
                    indicator: "Volume".into(),
                    operator: "spike".into(),
                    threshold: 2_000_000.0,
                },
            ],
            ..AppConfig::default()
        };

        let conditions = config.build_conditions().unwrap();
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].description(), "RSI < 30");
        assert_eq!(conditions[1].operator(), Operator::Gt);
    }

    #[test]
    fn test_unknown_operator_is_rejected() {
        let record = ConditionConfig {
            task_id: "task_1".into(),
            description: None,
            indicator: "RSI".into(),
            operator: "approximately".into(),
            threshold: 30.0,
        };
        assert!(record.build().is_err());
    }
}
