//! Condition Trader - Main Entry Point
//!
//! Watches simulated market data for a configured set of conditions and
//! places a risk-sized order each time they are all met together.

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use condition_trader::common::channels::{create_trade_event_channel, create_trigger_channel};
use condition_trader::config::load_config;
use condition_trader::execution::build_backend;
use condition_trader::feed::{self, MarketSimulator};
use condition_trader::{
    ConditionSetView, EngineObserver, Executor, MatchingEngine, TradeEvent, Trigger,
    TriggerForwarder,
};

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TRADER_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Submit one fixed snapshot (oversold, overbought, volume_spike)
    /// instead of running the random-walk feed
    #[arg(long)]
    scenario: Option<String>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    duration_secs: Option<u64>,
}

/// Logs the condition table whenever it changes
struct StatusLogger;

impl EngineObserver for StatusLogger {
    fn on_state_changed(&self, conditions: &ConditionSetView) {
        info!(
            generation = conditions.generation,
            met = conditions.met_count(),
            total = conditions.len(),
            "conditions updated"
        );
        for condition in &conditions.conditions {
            info!("  {}", condition);
        }
    }

    fn on_trigger(&self, trigger: &Trigger) {
        info!(symbol = %trigger.symbol, price = trigger.snapshot.price, "all conditions met");
    }

    fn name(&self) -> &str {
        "status_logger"
    }
}

async fn report_events(mut events: mpsc::Receiver<TradeEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            TradeEvent::Executed(execution) => info!(
                symbol = %execution.order.symbol,
                qty = execution.executed_quantity,
                price = execution.executed_price,
                commission = execution.commission,
                simulated = execution.is_simulated,
                fallback = execution.is_fallback,
                "EXECUTED"
            ),
            TradeEvent::Rejected { symbol, reason } => warn!(%symbol, %reason, "REJECTED"),
            TradeEvent::Fallback { symbol, reason } => warn!(%symbol, %reason, "FALLBACK"),
            TradeEvent::ProtectiveOrderFailed { symbol, kind, reason } => {
                warn!(%symbol, ?kind, %reason, "PROTECTIVE ORDER FAILED")
            }
        }
    }
}

async fn wait_for_shutdown(duration: Option<Duration>) -> Result<()> {
    match duration {
        Some(limit) => {
            tokio::select! {
                res = tokio::signal::ctrl_c() => res?,
                _ = tokio::time::sleep(limit) => info!(?limit, "run duration elapsed"),
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting condition trader");
    info!("Configuration file: {}", args.config);

    let config = load_config(Some(&args.config)).context("failed to load configuration")?;

    let engine = Arc::new(MatchingEngine::new(&config.engine));
    engine.replace_conditions(config.build_conditions()?)?;

    let (event_tx, event_rx) = create_trade_event_channel();
    let executor = Arc::new(
        Executor::new(build_backend(&config.execution), config.risk.clone(), &config.execution)?
            .with_events(event_tx),
    );
    executor.connect().await;

    let (trigger_tx, trigger_rx) = create_trigger_channel();
    engine.register_observer(Arc::new(TriggerForwarder::new(trigger_tx)));
    engine.register_observer(Arc::new(StatusLogger));

    let executor_task = tokio::spawn(executor.clone().run(trigger_rx));
    let events_task = tokio::spawn(report_events(event_rx));

    engine.start()?;

    let simulator = MarketSimulator::new(&config.feed);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let feed_task = match args.scenario.as_deref() {
        Some(name) => {
            let snapshot = simulator.scenario(name)?;
            info!(scenario = name, price = snapshot.price, "submitting scenario snapshot");
            engine.submit(snapshot);
            None
        }
        None => Some(tokio::spawn(feed::run(
            simulator,
            engine.clone(),
            Duration::from_millis(config.feed.interval_ms.max(1)),
            shutdown_rx,
        ))),
    };

    info!("Application initialized successfully");
    wait_for_shutdown(args.duration_secs.map(Duration::from_secs)).await?;
    info!("Shutting down...");

    let _ = shutdown_tx.send(true);
    if let Some(task) = feed_task {
        task.await?;
    }
    engine.stop().await;
    let stats = engine.stats();
    info!(
        submitted = stats.submitted,
        evaluated = stats.evaluated,
        dropped = stats.dropped,
        triggers = stats.triggers,
        "engine stopped"
    );

    // Dropping the forwarder closes the trigger channel and ends the executor task
    engine.clear_observers();
    executor_task.await?;

    let status = executor.portfolio_status().await;
    println!("{}", serde_json::to_string_pretty(&status)?);

    drop(executor);
    events_task.await?;
    Ok(())
}
