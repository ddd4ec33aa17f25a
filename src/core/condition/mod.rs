// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Data Conditions
//!
//! A condition group is an ordered collection of predicates over a numeric
//! observation value. Each condition that fires yields a priority level; a
//! group's result is the worst (maximum) priority across firing conditions,
//! defaulting to [`DetectorPriorityLevel::Ok`] when nothing fires.
//!
//! Groups are loaded through the [`ConditionRepository`] capability and
//! memoized in a [`ConditionGroupCache`] which callers invalidate explicitly
//! whenever a group or its conditions are written.

pub mod cache;

pub use self::cache::ConditionGroupCache;

use crate::core::detector::DetectorPriorityLevel;
use crate::core::error::AlertFluxResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Comparison operator applied to the observation value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionComparison {
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
    Equal,
    NotEqual,
}

impl ConditionComparison {
    /// Parse a comparison operator from its configuration string.
    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            ">" | "gt" => Ok(ConditionComparison::GreaterThan),
            ">=" | "gte" => Ok(ConditionComparison::GreaterOrEqual),
            "<" | "lt" => Ok(ConditionComparison::LessThan),
            "<=" | "lte" => Ok(ConditionComparison::LessOrEqual),
            "==" | "eq" => Ok(ConditionComparison::Equal),
            "!=" | "ne" => Ok(ConditionComparison::NotEqual),
            _ => Err(format!(
                "Invalid comparison '{}'. Valid values: '>', '>=', '<', '<=', '==', '!='",
                s
            )),
        }
    }

    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConditionComparison::GreaterThan => ">",
            ConditionComparison::GreaterOrEqual => ">=",
            ConditionComparison::LessThan => "<",
            ConditionComparison::LessOrEqual => "<=",
            ConditionComparison::Equal => "==",
            ConditionComparison::NotEqual => "!=",
        }
    }
}

/// One predicate over the observation value. Fires with `priority` when the
/// comparison against `threshold` holds, otherwise yields nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataCondition {
    pub id: u64,
    pub comparison: ConditionComparison,
    pub threshold: i64,
    pub priority: DetectorPriorityLevel,
}

impl DataCondition {
    pub fn new(
        id: u64,
        comparison: ConditionComparison,
        threshold: i64,
        priority: DetectorPriorityLevel,
    ) -> Self {
        Self {
            id,
            comparison,
            threshold,
            priority,
        }
    }

    /// Evaluate the observation value against this condition.
    ///
    /// Returns the condition's priority when it fires, `None` otherwise.
    pub fn evaluate_value(&self, value: i64) -> Option<DetectorPriorityLevel> {
        let fired = match self.comparison {
            ConditionComparison::GreaterThan => value > self.threshold,
            ConditionComparison::GreaterOrEqual => value >= self.threshold,
            ConditionComparison::LessThan => value < self.threshold,
            ConditionComparison::LessOrEqual => value <= self.threshold,
            ConditionComparison::Equal => value == self.threshold,
            ConditionComparison::NotEqual => value != self.threshold,
        };
        fired.then_some(self.priority)
    }
}

/// An ordered collection of conditions owned by a detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConditionGroup {
    pub id: u64,
    pub conditions: Vec<DataCondition>,
}

impl DataConditionGroup {
    pub fn new(id: u64, conditions: Vec<DataCondition>) -> Self {
        Self { id, conditions }
    }

    /// Worst-case priority across all conditions for `value`.
    ///
    /// Conditions that do not fire contribute nothing; with no firing
    /// condition the result is [`DetectorPriorityLevel::Ok`].
    pub fn evaluate_value(&self, value: i64) -> DetectorPriorityLevel {
        let mut status = DetectorPriorityLevel::Ok;
        for condition in &self.conditions {
            if let Some(evaluation) = condition.evaluate_value(value) {
                status = status.max(evaluation);
            }
        }
        status
    }
}

/// Capability loading condition groups with their ordered conditions.
///
/// A missing group is not an error: implementations return `Ok(None)` and the
/// caller falls back to "no conditions configured".
pub trait ConditionRepository: Send + Sync {
    /// Load a group and its ordered conditions.
    ///
    /// # Errors
    ///
    /// Returns an error only when the underlying store fails; absence is
    /// `Ok(None)`.
    fn load_group(&self, group_id: u64) -> AlertFluxResult<Option<DataConditionGroup>>;
}

/// In-memory repository useful for tests and embedded deployments.
#[derive(Debug, Default)]
pub struct InMemoryConditionRepository {
    groups: Mutex<HashMap<u64, DataConditionGroup>>,
}

impl InMemoryConditionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a group. Callers owning a [`ConditionGroupCache`]
    /// must invalidate the group id afterwards.
    pub fn upsert_group(&self, group: DataConditionGroup) {
        self.groups.lock().unwrap().insert(group.id, group);
    }

    pub fn remove_group(&self, group_id: u64) {
        self.groups.lock().unwrap().remove(&group_id);
    }
}

impl ConditionRepository for InMemoryConditionRepository {
    fn load_group(&self, group_id: u64) -> AlertFluxResult<Option<DataConditionGroup>> {
        Ok(self.groups.lock().unwrap().get(&group_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warning_above_ten() -> DataCondition {
        DataCondition::new(
            1,
            ConditionComparison::GreaterThan,
            10,
            DetectorPriorityLevel::Low,
        )
    }

    #[test]
    fn test_condition_fires_above_threshold() {
        let condition = warning_above_ten();
        assert_eq!(condition.evaluate_value(15), Some(DetectorPriorityLevel::Low));
        assert_eq!(condition.evaluate_value(10), None);
        assert_eq!(condition.evaluate_value(5), None);
    }

    #[test]
    fn test_comparison_parse() {
        assert_eq!(
            ConditionComparison::parse(">").unwrap(),
            ConditionComparison::GreaterThan
        );
        assert_eq!(
            ConditionComparison::parse("lte").unwrap(),
            ConditionComparison::LessOrEqual
        );
        assert!(ConditionComparison::parse("~").is_err());
    }

    #[test]
    fn test_group_takes_max_priority() {
        let group = DataConditionGroup::new(
            7,
            vec![
                warning_above_ten(),
                DataCondition::new(
                    2,
                    ConditionComparison::GreaterThan,
                    100,
                    DetectorPriorityLevel::High,
                ),
            ],
        );
        assert_eq!(group.evaluate_value(5), DetectorPriorityLevel::Ok);
        assert_eq!(group.evaluate_value(50), DetectorPriorityLevel::Low);
        assert_eq!(group.evaluate_value(500), DetectorPriorityLevel::High);
    }

    #[test]
    fn test_repository_missing_group_is_none() {
        let repo = InMemoryConditionRepository::new();
        assert!(repo.load_group(99).unwrap().is_none());
        repo.upsert_group(DataConditionGroup::new(99, vec![warning_above_ten()]));
        assert_eq!(repo.load_group(99).unwrap().unwrap().conditions.len(), 1);
    }
}
