//! Synchronous evaluation core: one pass per snapshot, edge-triggered firing

use chrono::Utc;
use std::collections::HashMap;
use tracing::debug;

use super::condition::{Condition, ConditionSet};
use crate::common::errors::Result;
use crate::common::types::{ConditionSetView, Snapshot, Trigger};

/// Notifications produced by one evaluation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassOutcome {
    /// Present when at least one `satisfied` flag flipped
    pub state_changed: Option<ConditionSetView>,
    /// Present on the pass that opened a new satisfaction episode
    pub trigger: Option<Trigger>,
}

/// Evaluation state of the set for one symbol
#[derive(Debug, Clone)]
struct SymbolState {
    conditions: ConditionSet,
    /// The current satisfaction episode has already produced its trigger
    fired: bool,
}

/// Owns the active condition set and decides when to fire
///
/// `set` holds the rules with pending state. Each symbol gets its own copy
/// the first time one of its snapshots is evaluated, so values, satisfied
/// flags and the `fired` flag of one symbol never affect another. Every
/// per-symbol copy is dropped when the set is swapped, extended, reset or
/// cleared. Within a symbol, `fired` is cleared whenever a pass ends with
/// the set not fully satisfied.
#[derive(Debug, Default)]
pub struct Matcher {
    set: ConditionSet,
    generation: u64,
    symbols: HashMap<String, SymbolState>,
    last_symbol: Option<String>,
    latest: HashMap<String, Snapshot>,
}

impl Matcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a new set; evaluation state starts from scratch
    pub fn replace(&mut self, conditions: Vec<Condition>) -> Result<ConditionSetView> {
        let set = ConditionSet::new(conditions)?;
        self.set = set;
        Ok(self.next_generation())
    }

    /// Append conditions to the current set
    pub fn add(&mut self, conditions: Vec<Condition>) -> Result<ConditionSetView> {
        self.set.extend(conditions)?;
        Ok(self.next_generation())
    }

    /// Clear every condition's value and satisfied flag
    pub fn reset(&mut self) -> ConditionSetView {
        self.set.reset();
        self.next_generation()
    }

    /// Drop every condition
    pub fn clear(&mut self) -> ConditionSetView {
        self.set = ConditionSet::default();
        self.next_generation()
    }

    fn next_generation(&mut self) -> ConditionSetView {
        self.generation += 1;
        self.symbols.clear();
        self.last_symbol = None;
        self.view()
    }

    /// View for the most recently evaluated symbol, or the pending set
    /// when nothing has been evaluated since the last change
    pub fn view(&self) -> ConditionSetView {
        self.last_symbol
            .as_deref()
            .and_then(|symbol| self.symbol_view(symbol))
            .unwrap_or_else(|| self.set.view(self.generation))
    }

    /// View of one symbol's evaluation state
    pub fn symbol_view(&self, symbol: &str) -> Option<ConditionSetView> {
        self.symbols
            .get(symbol)
            .map(|state| self.state_view(symbol, state))
    }

    fn state_view(&self, symbol: &str, state: &SymbolState) -> ConditionSetView {
        ConditionSetView {
            symbol: Some(symbol.to_string()),
            ..state.conditions.view(self.generation)
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Whether the current episode for `symbol` has already fired
    pub fn has_fired(&self, symbol: &str) -> bool {
        self.symbols.get(symbol).map_or(false, |state| state.fired)
    }

    /// Last snapshot evaluated for a symbol
    pub fn latest_snapshot(&self, symbol: &str) -> Option<&Snapshot> {
        self.latest.get(symbol)
    }

    /// Evaluate every condition against one snapshot, using only the
    /// state of the snapshot's symbol
    pub fn evaluate(&mut self, snapshot: Snapshot) -> PassOutcome {
        let symbol = snapshot.symbol.clone();
        let template = &self.set;
        let state = self
            .symbols
            .entry(symbol.clone())
            .or_insert_with(|| SymbolState {
                conditions: template.clone(),
                fired: false,
            });

        let mut flipped = false;
        for condition in state.conditions.iter_mut() {
            let was_satisfied = condition.is_satisfied();
            if let Err(reason) = condition.evaluate(&snapshot) {
                debug!(
                    task_id = condition.task_id(),
                    symbol = %symbol,
                    %reason,
                    "condition left unsatisfied"
                );
            }
            flipped |= condition.is_satisfied() != was_satisfied;
        }

        let all_satisfied = state.conditions.all_satisfied();
        let opens_episode = all_satisfied && !state.fired;
        state.fired = all_satisfied;

        self.last_symbol = Some(symbol.clone());
        let mut outcome = PassOutcome::default();
        if flipped || opens_episode {
            let view = self.symbol_view(&symbol).unwrap_or_default();
            if flipped {
                outcome.state_changed = Some(view.clone());
            }
            if opens_episode {
                outcome.trigger = Some(Trigger {
                    symbol: symbol.clone(),
                    snapshot: snapshot.clone(),
                    conditions: view,
                    fired_at: Utc::now(),
                });
            }
        }

        self.latest.insert(symbol, snapshot);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{Operator, PRICE, VOLUME};

    fn entry_conditions() -> Vec<Condition> {
        vec![
            Condition::new("task_1", "RSI", Operator::Lt, 30.0).unwrap(),
            Condition::new("task_2", PRICE, Operator::Lt, 150.0).unwrap(),
            Condition::new("task_3", VOLUME, Operator::Gt, 2_000_000.0).unwrap(),
        ]
    }

    fn oversold() -> Snapshot {
        Snapshot::new("AAPL", 120.0, 2_500_000.0).with_indicator("RSI", 25.0)
    }

    fn neutral() -> Snapshot {
        Snapshot::new("AAPL", 160.0, 1_000_000.0).with_indicator("RSI", 50.0)
    }

    #[test]
    fn test_fires_once_per_episode() {
        let mut matcher = Matcher::new();
        matcher.replace(entry_conditions()).unwrap();

        let first = matcher.evaluate(oversold());
        assert!(first.trigger.is_some());
        assert!(first.state_changed.is_some());

        for _ in 0..5 {
            let again = matcher.evaluate(oversold());
            assert!(again.trigger.is_none());
            assert!(again.state_changed.is_none());
        }
        assert!(matcher.has_fired("AAPL"));
    }

    #[test]
    fn test_rearms_after_a_condition_flips_back() {
        let mut matcher = Matcher::new();
        matcher.replace(entry_conditions()).unwrap();

        assert!(matcher.evaluate(oversold()).trigger.is_some());
        let broken = matcher.evaluate(neutral());
        assert!(broken.trigger.is_none());
        assert!(broken.state_changed.is_some());
        assert!(!matcher.has_fired("AAPL"));

        assert!(matcher.evaluate(oversold()).trigger.is_some());
    }

    #[test]
    fn test_empty_set_never_fires() {
        let mut matcher = Matcher::new();
        for _ in 0..3 {
            let outcome = matcher.evaluate(oversold());
            assert_eq!(outcome, PassOutcome::default());
        }
    }

    #[test]
    fn test_missing_indicator_blocks_trigger() {
        let mut matcher = Matcher::new();
        matcher.replace(entry_conditions()).unwrap();

        let no_rsi = Snapshot::new("AAPL", 120.0, 2_500_000.0);
        let outcome = matcher.evaluate(no_rsi);
        assert!(outcome.trigger.is_none());

        let view = matcher.view();
        assert!(!view.conditions[0].satisfied);
        assert!(view.conditions[1].satisfied);
        assert!(view.conditions[2].satisfied);
    }

    #[test]
    fn test_replace_bumps_generation_and_rearms() {
        let mut matcher = Matcher::new();
        matcher.replace(entry_conditions()).unwrap();
        assert!(matcher.evaluate(oversold()).trigger.is_some());

        let view = matcher.replace(entry_conditions()).unwrap();
        assert_eq!(view.generation, 2);
        assert_eq!(view.met_count(), 0);

        let outcome = matcher.evaluate(oversold());
        let trigger = outcome.trigger.expect("new generation should fire");
        assert_eq!(trigger.conditions.generation, 2);
        assert_eq!(trigger.symbol, "AAPL");
    }

    #[test]
    fn test_reset_clears_values_and_rearms() {
        let mut matcher = Matcher::new();
        matcher.replace(entry_conditions()).unwrap();
        matcher.evaluate(oversold());

        let view = matcher.reset();
        assert!(view.conditions.iter().all(|c| c.current_value.is_none() && !c.satisfied));
        assert!(!matcher.has_fired("AAPL"));
        assert!(matcher.evaluate(oversold()).trigger.is_some());
    }

    #[test]
    fn test_add_keeps_existing_conditions() {
        let mut matcher = Matcher::new();
        matcher
            .replace(vec![Condition::new("task_1", "RSI", Operator::Lt, 30.0).unwrap()])
            .unwrap();
        assert!(matcher.evaluate(oversold()).trigger.is_some());

        let view = matcher
            .add(vec![Condition::new("task_2", "MACD", Operator::Gt, 0.0).unwrap()])
            .unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(view.conditions[0].task_id, "task_1");

        assert!(matcher.evaluate(oversold()).trigger.is_none());
        assert!(matcher
            .evaluate(oversold().with_indicator("MACD", 1.5))
            .trigger
            .is_some());
    }

    #[test]
    fn test_failed_replace_keeps_old_set() {
        let mut matcher = Matcher::new();
        matcher.replace(entry_conditions()).unwrap();

        let dup = vec![
            Condition::new("x", "RSI", Operator::Lt, 30.0).unwrap(),
            Condition::new("x", PRICE, Operator::Lt, 30.0).unwrap(),
        ];
        assert!(matcher.replace(dup).is_err());
        assert_eq!(matcher.len(), 3);
        assert_eq!(matcher.generation(), 1);
    }

    #[test]
    fn test_latest_snapshot_is_retained() {
        let mut matcher = Matcher::new();
        matcher.evaluate(oversold());
        matcher.evaluate(Snapshot::new("MSFT", 300.0, 10.0));

        assert_eq!(matcher.latest_snapshot("AAPL").unwrap().price, 120.0);
        assert_eq!(matcher.latest_snapshot("MSFT").unwrap().price, 300.0);
        assert!(matcher.latest_snapshot("GOOG").is_none());
    }

    #[test]
    fn test_symbols_keep_independent_episodes() {
        let mut matcher = Matcher::new();
        matcher
            .replace(vec![Condition::new("task_1", PRICE, Operator::Lt, 150.0).unwrap()])
            .unwrap();

        let mut aapl_triggers = 0;
        let mut msft_triggers = 0;
        for _ in 0..5 {
            if matcher.evaluate(Snapshot::new("AAPL", 120.0, 1.0)).trigger.is_some() {
                aapl_triggers += 1;
            }
            if matcher.evaluate(Snapshot::new("MSFT", 300.0, 1.0)).trigger.is_some() {
                msft_triggers += 1;
            }
        }
        assert_eq!(aapl_triggers, 1);
        assert_eq!(msft_triggers, 0);
        assert!(matcher.has_fired("AAPL"));
        assert!(!matcher.has_fired("MSFT"));

        let aapl = matcher.symbol_view("AAPL").unwrap();
        assert_eq!(aapl.symbol.as_deref(), Some("AAPL"));
        assert_eq!(aapl.conditions[0].current_value, Some(120.0));
        assert!(aapl.all_satisfied());
        let msft = matcher.symbol_view("MSFT").unwrap();
        assert_eq!(msft.conditions[0].current_value, Some(300.0));
        assert!(!msft.all_satisfied());
    }

    #[test]
    fn test_second_symbol_fires_its_own_episode() {
        let mut matcher = Matcher::new();
        matcher.replace(entry_conditions()).unwrap();

        let first = matcher.evaluate(oversold()).trigger.unwrap();
        let second = matcher
            .evaluate(Snapshot::new("MSFT", 100.0, 3_000_000.0).with_indicator("RSI", 20.0))
            .trigger
            .unwrap();
        assert_eq!(first.symbol, "AAPL");
        assert_eq!(second.symbol, "MSFT");
        assert_eq!(second.conditions.symbol.as_deref(), Some("MSFT"));

        matcher.reset();
        assert!(matcher.symbol_view("AAPL").is_none());
        assert!(!matcher.has_fired("MSFT"));
    }
}
