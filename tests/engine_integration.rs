//! Integration tests for the matching engine
//!
//! These drive a running engine through its public API and observe it the
//! way the executor does, through a registered observer.

mod common;

use common::{
    fast_engine, neutral_snapshot, oversold_conditions, oversold_snapshot, wait_until,
    RecordingObserver,
};
use condition_trader::common::types::{PRICE, VOLUME};
use condition_trader::engine::Matcher;
use condition_trader::{Condition, EngineState, Operator, Snapshot, TraderError};
use pretty_assertions::assert_eq;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(2);

// ============================================================================
// Firing semantics
// ============================================================================

#[test_log::test(tokio::test)]
async fn test_trigger_fires_once_per_episode() {
    let engine = fast_engine();
    let recorder = Arc::new(RecordingObserver::default());
    engine.register_observer(recorder.clone());
    engine.replace_conditions(oversold_conditions()).unwrap();
    engine.start().unwrap();

    for _ in 0..3 {
        engine.submit(oversold_snapshot());
    }
    assert!(wait_until(WAIT, || engine.stats().evaluated == 3).await);
    assert_eq!(recorder.trigger_count(), 1);

    engine.submit(neutral_snapshot());
    engine.submit(oversold_snapshot());
    assert!(wait_until(WAIT, || recorder.trigger_count() == 2).await);
    assert_eq!(engine.stats().evaluated, 5);

    let trigger = &recorder.triggers()[0];
    assert_eq!(trigger.symbol, "AAPL");
    assert_eq!(trigger.snapshot.price, 120.0);
    assert!(trigger.conditions.all_satisfied());
    assert_eq!(trigger.conditions.len(), 3);

    engine.stop().await;
}

#[tokio::test]
async fn test_other_symbols_do_not_rearm_an_episode() {
    let engine = fast_engine();
    let recorder = Arc::new(RecordingObserver::default());
    engine.register_observer(recorder.clone());
    engine
        .replace_conditions(vec![Condition::new("price", PRICE, Operator::Lt, 150.0).unwrap()])
        .unwrap();
    engine.start().unwrap();

    for _ in 0..5 {
        engine.submit(Snapshot::new("AAPL", 120.0, 1_000.0));
        engine.submit(Snapshot::new("MSFT", 300.0, 1_000.0));
    }
    assert!(wait_until(WAIT, || engine.stats().evaluated == 10).await);

    let triggers = recorder.triggers();
    assert_eq!(triggers.len(), 1);
    assert_eq!(triggers[0].symbol, "AAPL");
    assert_eq!(triggers[0].conditions.symbol.as_deref(), Some("AAPL"));

    assert!(engine.conditions_for("AAPL").unwrap().all_satisfied());
    assert_eq!(engine.conditions_for("MSFT").unwrap().met_count(), 0);
    assert!(engine.conditions_for("GOOG").is_none());

    engine.stop().await;
}

#[tokio::test]
async fn test_empty_set_never_fires() {
    let engine = fast_engine();
    let recorder = Arc::new(RecordingObserver::default());
    engine.register_observer(recorder.clone());
    engine.start().unwrap();

    for _ in 0..10 {
        engine.submit(oversold_snapshot());
    }
    assert!(wait_until(WAIT, || engine.stats().evaluated == 10).await);
    assert_eq!(recorder.trigger_count(), 0);

    engine.stop().await;
}

#[tokio::test]
async fn test_missing_indicator_never_satisfies() {
    let engine = fast_engine();
    let recorder = Arc::new(RecordingObserver::default());
    engine.register_observer(recorder.clone());
    engine.replace_conditions(oversold_conditions()).unwrap();
    engine.start().unwrap();

    // price and volume pass, RSI is absent
    engine.submit(Snapshot::new("AAPL", 120.0, 2_500_000.0));
    assert!(wait_until(WAIT, || engine.stats().evaluated == 1).await);
    assert_eq!(recorder.trigger_count(), 0);

    let view = engine.conditions();
    let rsi = view.conditions.iter().find(|c| c.task_id == "rsi").unwrap();
    assert!(!rsi.satisfied);
    assert_eq!(rsi.current_value, None);
    assert_eq!(view.met_count(), 2);

    engine.stop().await;
}

#[test]
fn test_comparator_boundaries() {
    let mut inclusive = Matcher::new();
    inclusive
        .replace(vec![Condition::new("v", VOLUME, Operator::Ge, 2_000_000.0).unwrap()])
        .unwrap();
    let outcome = inclusive.evaluate(Snapshot::new("AAPL", 100.0, 2_000_000.0));
    assert!(outcome.trigger.is_some());

    let mut strict = Matcher::new();
    strict
        .replace(vec![Condition::new("v", VOLUME, Operator::Gt, 2_000_000.0).unwrap()])
        .unwrap();
    let outcome = strict.evaluate(Snapshot::new("AAPL", 100.0, 2_000_000.0));
    assert!(outcome.trigger.is_none());

    let mut upper = Matcher::new();
    upper
        .replace(vec![Condition::new("p", PRICE, Operator::Le, 150.0).unwrap()])
        .unwrap();
    assert!(upper.evaluate(Snapshot::new("AAPL", 150.0, 1.0)).trigger.is_some());
}

#[tokio::test]
async fn test_reset_rearms_trigger() {
    let engine = fast_engine();
    let recorder = Arc::new(RecordingObserver::default());
    engine.register_observer(recorder.clone());
    engine.replace_conditions(oversold_conditions()).unwrap();
    engine.start().unwrap();

    engine.submit(oversold_snapshot());
    assert!(wait_until(WAIT, || recorder.trigger_count() == 1).await);

    engine.reset_conditions();
    assert_eq!(engine.conditions().met_count(), 0);

    engine.submit(oversold_snapshot());
    assert!(wait_until(WAIT, || recorder.trigger_count() == 2).await);

    engine.stop().await;
}

// ============================================================================
// Condition set management
// ============================================================================

fn set_a() -> Vec<Condition> {
    vec![
        Condition::new("a1", "RSI", Operator::Lt, 30.0).unwrap(),
        Condition::new("a2", PRICE, Operator::Lt, 150.0).unwrap(),
    ]
}

fn set_b() -> Vec<Condition> {
    vec![
        Condition::new("b1", "RSI", Operator::Gt, 10.0).unwrap(),
        Condition::new("b2", PRICE, Operator::Gt, 100.0).unwrap(),
        Condition::new("b3", VOLUME, Operator::Gt, 1.0).unwrap(),
    ]
}

fn ids(view: &condition_trader::ConditionSetView) -> BTreeSet<String> {
    view.conditions.iter().map(|c| c.task_id.clone()).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_replacement_is_atomic_under_load() {
    let engine = Arc::new(fast_engine());
    let recorder = Arc::new(RecordingObserver::default());
    engine.register_observer(recorder.clone());
    engine.replace_conditions(set_a()).unwrap();
    engine.start().unwrap();

    let producer = {
        let engine = engine.clone();
        tokio::spawn(async move {
            for i in 0..500 {
                let rsi = if i % 2 == 0 { 20.0 } else { 50.0 };
                engine.submit(Snapshot::new("AAPL", 120.0, 10.0).with_indicator("RSI", rsi));
                tokio::task::yield_now().await;
            }
        })
    };
    let swapper = {
        let engine = engine.clone();
        tokio::spawn(async move {
            for i in 0..200 {
                let next = if i % 2 == 0 { set_b() } else { set_a() };
                engine.replace_conditions(next).unwrap();
                tokio::task::yield_now().await;
            }
        })
    };
    producer.await.unwrap();
    swapper.await.unwrap();
    assert!(wait_until(WAIT, || engine.pending() == 0).await);
    engine.stop().await;

    let a: BTreeSet<String> = ["a1", "a2"].iter().map(|s| s.to_string()).collect();
    let b: BTreeSet<String> = ["b1", "b2", "b3"].iter().map(|s| s.to_string()).collect();
    for view in recorder.states() {
        let seen = ids(&view);
        assert!(seen == a || seen == b, "mixed condition set: {:?}", seen);
    }
    for trigger in recorder.triggers() {
        let seen = ids(&trigger.conditions);
        assert!(seen == a || seen == b, "mixed trigger set: {:?}", seen);
        assert!(trigger.conditions.all_satisfied());
    }
}

#[tokio::test]
async fn test_duplicate_ids_keep_previous_set() {
    let engine = fast_engine();
    engine.replace_conditions(oversold_conditions()).unwrap();
    let before = engine.conditions();

    let duplicated = vec![
        Condition::new("x", "RSI", Operator::Lt, 30.0).unwrap(),
        Condition::new("x", PRICE, Operator::Lt, 150.0).unwrap(),
    ];
    assert!(engine.replace_conditions(duplicated).is_err());
    assert_eq!(engine.conditions(), before);
}

#[tokio::test]
async fn test_state_change_published_after_replace() {
    let engine = fast_engine();
    let recorder = Arc::new(RecordingObserver::default());
    engine.register_observer(recorder.clone());
    engine.start().unwrap();

    engine.replace_conditions(oversold_conditions()).unwrap();
    assert!(wait_until(WAIT, || recorder.states().iter().any(|s| s.len() == 3)).await);

    engine.clear_conditions();
    assert!(wait_until(WAIT, || recorder.states().last().map_or(false, |s| s.is_empty())).await);

    engine.stop().await;
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_stop_is_idempotent() {
    let engine = fast_engine();
    engine.stop().await;

    engine.start().unwrap();
    assert!(matches!(engine.start(), Err(TraderError::AlreadyRunning)));
    assert_eq!(engine.state(), EngineState::Running);

    engine.stop().await;
    engine.stop().await;
    assert_eq!(engine.state(), EngineState::Stopped);
}

#[tokio::test]
async fn test_no_notifications_after_stop() {
    let engine = fast_engine();
    let recorder = Arc::new(RecordingObserver::default());
    engine.register_observer(recorder.clone());
    engine.replace_conditions(oversold_conditions()).unwrap();
    engine.start().unwrap();
    engine.stop().await;

    let states_before = recorder.states().len();
    engine.submit(oversold_snapshot());
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(engine.stats().evaluated, 0);
    assert_eq!(engine.pending(), 1);
    assert_eq!(recorder.states().len(), states_before);
    assert_eq!(recorder.trigger_count(), 0);
}

#[tokio::test]
async fn test_latest_snapshot_per_symbol() {
    let engine = fast_engine();
    engine.start().unwrap();

    engine.submit(Snapshot::new("AAPL", 120.0, 1.0));
    engine.submit(Snapshot::new("MSFT", 310.0, 1.0));
    engine.submit(Snapshot::new("AAPL", 121.0, 1.0));
    assert!(wait_until(WAIT, || engine.stats().evaluated == 3).await);

    assert_eq!(engine.latest_snapshot("AAPL").unwrap().price, 121.0);
    assert_eq!(engine.latest_snapshot("MSFT").unwrap().price, 310.0);
    assert!(engine.latest_snapshot("GOOG").is_none());

    engine.stop().await;
}
