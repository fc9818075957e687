//! Condition records and the ordered set the engine evaluates

use std::collections::HashSet;

use crate::common::errors::{DataError, Result, TraderError};
use crate::common::types::{ConditionView, ConditionSetView, Operator, Snapshot};

/// One rule to watch plus its evaluation state
///
/// `satisfied` and `current_value` are only written by `evaluate` and
/// `reset`, both of which are crate-private: outside the engine a condition
/// is only ever seen through a `ConditionView`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    task_id: String,
    description: String,
    indicator: String,
    operator: Operator,
    threshold: f64,
    current_value: Option<f64>,
    satisfied: bool,
}

impl Condition {
    /// Build a validated condition
    ///
    /// Rejects an empty task id or indicator and a non-finite threshold.
    pub fn new(
        task_id: impl Into<String>,
        indicator: impl Into<String>,
        operator: Operator,
        threshold: f64,
    ) -> Result<Self> {
        let task_id = task_id.into();
        let indicator = indicator.into().trim().to_string();

        if task_id.trim().is_empty() {
            return Err(TraderError::InvalidCondition {
                task_id,
                reason: "empty task id".to_string(),
            });
        }
        if indicator.is_empty() {
            return Err(TraderError::InvalidCondition {
                task_id,
                reason: "empty indicator".to_string(),
            });
        }
        if !threshold.is_finite() {
            return Err(TraderError::InvalidCondition {
                task_id,
                reason: format!("threshold {} is not finite", threshold),
            });
        }

        let description = format!("{} {} {}", indicator, operator, threshold);
        Ok(Self {
            task_id,
            description,
            indicator,
            operator,
            threshold,
            current_value: None,
            satisfied: false,
        })
    }

    /// Build a condition from an operator token such as `"<="` or `"above"`
    pub fn parse(
        task_id: impl Into<String>,
        indicator: impl Into<String>,
        operator: &str,
        threshold: f64,
    ) -> Result<Self> {
        let task_id = task_id.into();
        let operator = operator
            .parse::<Operator>()
            .map_err(|e| TraderError::InvalidCondition {
                task_id: task_id.clone(),
                reason: e.to_string(),
            })?;
        Self::new(task_id, indicator, operator, threshold)
    }

    /// Replace the generated description with the source text
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn indicator(&self) -> &str {
        &self.indicator
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn current_value(&self) -> Option<f64> {
        self.current_value
    }

    pub fn is_satisfied(&self) -> bool {
        self.satisfied
    }

    /// Evaluate against a snapshot and record the result
    ///
    /// A missing or non-finite value leaves `current_value` untouched and
    /// forces `satisfied` to false.
    pub(crate) fn evaluate(&mut self, snapshot: &Snapshot) -> std::result::Result<bool, DataError> {
        let value = match snapshot.value_of(&self.indicator) {
            Some(v) => v,
            None => {
                self.satisfied = false;
                return Err(DataError::MissingIndicator(self.indicator.clone()));
            }
        };

        if !value.is_finite() {
            self.satisfied = false;
            return Err(DataError::NonFinite {
                indicator: self.indicator.clone(),
                value,
            });
        }

        self.current_value = Some(value);
        self.satisfied = self.operator.compare(value, self.threshold);
        Ok(self.satisfied)
    }

    pub(crate) fn reset(&mut self) {
        self.current_value = None;
        self.satisfied = false;
    }

    pub fn view(&self) -> ConditionView {
        ConditionView {
            task_id: self.task_id.clone(),
            description: self.description.clone(),
            indicator: self.indicator.clone(),
            operator: self.operator,
            threshold: self.threshold,
            current_value: self.current_value,
            satisfied: self.satisfied,
        }
    }
}

/// Ordered collection of conditions with unique task ids
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionSet {
    conditions: Vec<Condition>,
}

impl ConditionSet {
    /// Build a set, resetting every condition's evaluation state
    pub fn new(conditions: Vec<Condition>) -> Result<Self> {
        let mut set = Self::default();
        set.extend(conditions)?;
        Ok(set)
    }

    /// Append conditions, keeping insertion order
    ///
    /// Fails without modifying the set if any task id would be duplicated.
    pub fn extend(&mut self, conditions: Vec<Condition>) -> Result<()> {
        let mut seen: HashSet<&str> = self.conditions.iter().map(|c| c.task_id()).collect();
        for condition in &conditions {
            if !seen.insert(condition.task_id()) {
                return Err(TraderError::InvalidCondition {
                    task_id: condition.task_id().to_string(),
                    reason: "duplicate task id".to_string(),
                });
            }
        }

        self.conditions.extend(conditions.into_iter().map(|mut c| {
            c.reset();
            c
        }));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Condition> {
        self.conditions.iter_mut()
    }

    pub fn get(&self, task_id: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.task_id() == task_id)
    }

    /// Non-empty and every condition satisfied; an empty set is never satisfied
    pub fn all_satisfied(&self) -> bool {
        !self.conditions.is_empty() && self.conditions.iter().all(|c| c.is_satisfied())
    }

    pub(crate) fn reset(&mut self) {
        self.conditions.iter_mut().for_each(Condition::reset);
    }

    pub fn view(&self, generation: u64) -> ConditionSetView {
        ConditionSetView {
            generation,
            symbol: None,
            conditions: self.conditions.iter().map(Condition::view).collect(),
        }
    }
}
