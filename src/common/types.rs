//! Shared types passed between the feed, the engine and the executor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use super::errors::TraderError;

/// Indicator name that reads `Snapshot::price`
pub const PRICE: &str = "Price";
/// Indicator name that reads `Snapshot::volume`
pub const VOLUME: &str = "Volume";

/// One symbol's market state at a point in time
///
/// Created by the feed on every tick and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Instrument identifier
    pub symbol: String,
    /// Last traded price
    pub price: f64,
    /// Traded volume
    pub volume: f64,
    /// Derived indicators keyed by name ("RSI", "SMA 20", ...)
    #[serde(default)]
    pub indicators: HashMap<String, f64>,
    /// Capture time
    pub observed_at: DateTime<Utc>,
}

impl Snapshot {
    /// Create a snapshot with no indicators, stamped now
    pub fn new(symbol: impl Into<String>, price: f64, volume: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            volume,
            indicators: HashMap::new(),
            observed_at: Utc::now(),
        }
    }

    /// Add or overwrite one indicator value
    pub fn with_indicator(mut self, name: impl Into<String>, value: f64) -> Self {
        self.indicators.insert(name.into(), value);
        self
    }

    /// Override the capture time
    pub fn at(mut self, observed_at: DateTime<Utc>) -> Self {
        self.observed_at = observed_at;
        self
    }

    /// Read a field by indicator name
    ///
    /// `Price` and `Volume` map to the fixed fields, anything else is looked
    /// up in the indicator map. Returns `None` when the key is absent.
    pub fn value_of(&self, indicator: &str) -> Option<f64> {
        match indicator {
            PRICE => Some(self.price),
            VOLUME => Some(self.volume),
            other => self.indicators.get(other).copied(),
        }
    }
}

/// Comparison applied between an observed value and a threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">=")]
    Ge,
}

impl Operator {
    /// Apply the comparison `lhs op rhs`
    pub fn compare(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Operator::Lt => lhs < rhs,
            Operator::Gt => lhs > rhs,
            Operator::Le => lhs <= rhs,
            Operator::Ge => lhs >= rhs,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = TraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "<" | "below" | "under" | "drop" => Ok(Operator::Lt),
            ">" | "above" | "over" | "spike" => Ok(Operator::Gt),
            "<=" => Ok(Operator::Le),
            ">=" => Ok(Operator::Ge),
            other => Err(TraderError::Configuration(format!(
                "unknown operator '{}'",
                other
            ))),
        }
    }
}

/// Read-only view of one condition, safe to hand to other contexts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionView {
    pub task_id: String,
    pub description: String,
    pub indicator: String,
    pub operator: Operator,
    pub threshold: f64,
    pub current_value: Option<f64>,
    pub satisfied: bool,
}

impl ConditionView {
    /// Short status label for display
    pub fn status(&self) -> &'static str {
        if self.satisfied {
            "met"
        } else {
            "pending"
        }
    }
}

impl std::fmt::Display for ConditionView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let current = self
            .current_value
            .map(|v| format!("{:.2}", v))
            .unwrap_or_else(|| "-".to_string());
        write!(
            f,
            "[{}] {} {} {} {} (current {})",
            self.status(),
            self.task_id,
            self.indicator,
            self.operator,
            self.threshold,
            current
        )
    }
}

/// Read-only view of a whole condition set at one generation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConditionSetView {
    /// Bumped every time the set is replaced, extended, reset or cleared
    pub generation: u64,
    /// Symbol whose evaluation state this is; `None` for the pending template
    pub symbol: Option<String>,
    /// Conditions in insertion order
    pub conditions: Vec<ConditionView>,
}

impl ConditionSetView {
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Number of conditions currently satisfied
    pub fn met_count(&self) -> usize {
        self.conditions.iter().filter(|c| c.satisfied).count()
    }

    /// Non-empty and every condition satisfied
    pub fn all_satisfied(&self) -> bool {
        !self.conditions.is_empty() && self.conditions.iter().all(|c| c.satisfied)
    }
}

/// Edge event raised when a condition set has just become fully satisfied
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    /// Symbol whose snapshot completed the set
    pub symbol: String,
    /// The snapshot that completed the set
    pub snapshot: Snapshot,
    /// The set as it stood after the completing pass
    pub conditions: ConditionSetView,
    pub fired_at: DateTime<Utc>,
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Market,
    Limit,
    Stop,
}

/// How long an order stays working
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Fill what is possible now, cancel the rest
    #[serde(rename = "IOC")]
    ImmediateOrCancel,
    #[serde(rename = "GTC")]
    GoodTillCancel,
    #[serde(rename = "DAY")]
    Day,
}

impl std::fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeInForce::ImmediateOrCancel => write!(f, "IOC"),
            TimeInForce::GoodTillCancel => write!(f, "GTC"),
            TimeInForce::Day => write!(f, "DAY"),
        }
    }
}

/// An order handed to an execution backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Locally assigned identifier
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub kind: OrderKind,
    /// Whole shares, always > 0
    pub quantity: u64,
    /// Limit price for `OrderKind::Limit`
    pub limit_price: Option<f64>,
    /// Trigger price for `OrderKind::Stop`
    pub stop_price: Option<f64>,
    /// Market price the order was sized against
    pub reference_price: f64,
    pub time_in_force: TimeInForce,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Market order, immediate-or-cancel
    pub fn market(symbol: impl Into<String>, side: Side, quantity: u64, reference_price: f64) -> Self {
        Self {
            client_order_id: generate_id("ORD"),
            symbol: symbol.into(),
            side,
            kind: OrderKind::Market,
            quantity,
            limit_price: None,
            stop_price: None,
            reference_price,
            time_in_force: TimeInForce::ImmediateOrCancel,
            created_at: Utc::now(),
        }
    }

    /// Resting limit order, good-till-cancel
    pub fn limit(symbol: impl Into<String>, side: Side, quantity: u64, price: f64) -> Self {
        Self {
            kind: OrderKind::Limit,
            limit_price: Some(price),
            time_in_force: TimeInForce::GoodTillCancel,
            ..Self::market(symbol, side, quantity, price)
        }
    }

    /// Resting stop order, good-till-cancel
    pub fn stop(symbol: impl Into<String>, side: Side, quantity: u64, stop_price: f64) -> Self {
        Self {
            kind: OrderKind::Stop,
            stop_price: Some(stop_price),
            time_in_force: TimeInForce::GoodTillCancel,
            ..Self::market(symbol, side, quantity, stop_price)
        }
    }

    /// Quantity times reference price
    pub fn notional(&self) -> f64 {
        self.quantity as f64 * self.reference_price
    }
}

/// A filled order, immutable once recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub order: Order,
    pub executed_price: f64,
    pub executed_quantity: u64,
    pub timestamp: DateTime<Utc>,
    /// Unique per execution
    pub execution_id: String,
    pub commission: f64,
    /// True when the fill came from the simulator rather than a venue
    pub is_simulated: bool,
    /// True when the simulator stood in for a backend that failed
    #[serde(default)]
    pub is_fallback: bool,
}

impl Execution {
    /// Executed price times executed quantity
    pub fn notional(&self) -> f64 {
        self.executed_price * self.executed_quantity as f64
    }
}

/// Outcome notifications published by the executor
#[derive(Debug, Clone, PartialEq)]
pub enum TradeEvent {
    /// An order was filled and recorded in the ledger
    Executed(Execution),
    /// A trigger was handled without placing any order
    Rejected { symbol: String, reason: String },
    /// The backend failed and a simulated fill is being used instead
    Fallback { symbol: String, reason: String },
    /// A stop-loss or take-profit order could not be placed
    ProtectiveOrderFailed {
        symbol: String,
        kind: OrderKind,
        reason: String,
    },
}

/// Account summary reported by a backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub cash_available: f64,
    pub portfolio_value: f64,
    pub buying_power: f64,
}

/// Open position reported by a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub symbol: String,
    /// Signed share count, negative when short
    pub quantity: i64,
    pub avg_price: f64,
}

/// Lifecycle state of an order at the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Working,
    Filled,
    Cancelled,
    Rejected,
}

/// Status snapshot of one order at the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatus {
    pub order_id: String,
    pub state: OrderState,
    pub filled_quantity: u64,
    pub filled_price: Option<f64>,
}

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Process-unique identifier: `PREFIX-<epoch ms>-<sequence>`
pub fn generate_id(prefix: &str) -> String {
    let seq = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{}", prefix, Utc::now().timestamp_millis(), seq)
}
