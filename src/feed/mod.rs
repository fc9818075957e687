//! Simulated market data source

pub mod indicators;
pub mod simulator;

pub use simulator::{run, MarketSimulator, SCENARIOS};
