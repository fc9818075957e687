//! Random-walk market data generator and fixed test scenarios

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use super::indicators::{self, EMA_10, MACD, RSI, SMA_20, SMA_50};
use crate::common::errors::{Result, TraderError};
use crate::common::types::Snapshot;
use crate::config::types::FeedSettings;
use crate::engine::MatchingEngine;

const MIN_PRICE: f64 = 50.0;
const MAX_PRICE: f64 = 250.0;
const HISTORY_LEN: usize = 200;
const STEP_STDDEV: f64 = 0.02;
const RSI_PERIODS: usize = 14;

/// Names accepted by [`MarketSimulator::scenario`]
pub const SCENARIOS: [&str; 3] = ["oversold", "overbought", "volume_spike"];

/// Produces snapshots for one symbol
///
/// Each step moves the price by a roughly normal percentage (σ = 2%),
/// clamped to [50, 250]. Volume is the base volume scaled by U(0.5, 2.5).
pub struct MarketSimulator {
    symbol: String,
    price: f64,
    base_volume: f64,
    history: VecDeque<f64>,
    rng: StdRng,
}

impl MarketSimulator {
    pub fn new(settings: &FeedSettings) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            symbol: settings.symbol.clone(),
            price: settings.base_price.clamp(MIN_PRICE, MAX_PRICE),
            base_volume: settings.base_volume,
            history: VecDeque::with_capacity(HISTORY_LEN),
            rng,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Advance one step and return the resulting snapshot
    pub fn next_snapshot(&mut self) -> Snapshot {
        // Irwin-Hall: sum of 12 uniforms minus 6 is close to N(0, 1)
        let z: f64 = (0..12).map(|_| self.rng.gen::<f64>()).sum::<f64>() - 6.0;
        self.price = (self.price * (1.0 + z * STEP_STDDEV)).clamp(MIN_PRICE, MAX_PRICE);

        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(self.price);

        let volume = self.base_volume * self.rng.gen_range(0.5..2.5);
        let mut snapshot = Snapshot::new(self.symbol.clone(), self.price, volume);
        for (name, value) in self.indicators() {
            snapshot = snapshot.with_indicator(name, value);
        }
        snapshot
    }

    /// Indicators available for the current history
    ///
    /// Nothing is published until 14 prices exist.
    fn indicators(&self) -> Vec<(&'static str, f64)> {
        let prices: Vec<f64> = self.history.iter().copied().collect();
        if prices.len() < RSI_PERIODS {
            return Vec::new();
        }

        let mut out = vec![(RSI, indicators::rsi(&prices, RSI_PERIODS))];
        if let Some(v) = indicators::sma(&prices, 20) {
            out.push((SMA_20, v));
        }
        if let Some(v) = indicators::sma(&prices, 50) {
            out.push((SMA_50, v));
        }
        if let Some(v) = indicators::ema(&prices, 10) {
            out.push((EMA_10, v));
        }
        if let Some(v) = indicators::macd(&prices) {
            out.push((MACD, v));
        }
        out
    }

    /// Fixed snapshot for a named market situation
    pub fn scenario(&self, name: &str) -> Result<Snapshot> {
        let (price, volume, rsi, sma_20, sma_50) = match name {
            "oversold" => (120.0, 2_000_000.0, 25.0, 140.0, 145.0),
            "overbought" => (180.0, 5_000_000.0, 75.0, 160.0, 155.0),
            "volume_spike" => (150.0, 5_000_000.0, 50.0, 150.0, 150.0),
            other => {
                return Err(TraderError::Configuration(format!(
                    "unknown scenario '{}', expected one of {}",
                    other,
                    SCENARIOS.join(", ")
                )))
            }
        };
        Ok(Snapshot::new(self.symbol.clone(), price, volume)
            .with_indicator(RSI, rsi)
            .with_indicator(SMA_20, sma_20)
            .with_indicator(SMA_50, sma_50))
    }
}

/// Submit a snapshot every `interval` until `shutdown` turns true
pub async fn run(
    mut simulator: MarketSimulator,
    engine: Arc<MatchingEngine>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    info!(symbol = %simulator.symbol(), ?interval, "market simulator started");
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = simulator.next_snapshot();
                debug!(symbol = %snapshot.symbol, price = snapshot.price, volume = snapshot.volume, "snapshot");
                engine.submit(snapshot);
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!(symbol = %simulator.symbol(), "market simulator stopped");
}
