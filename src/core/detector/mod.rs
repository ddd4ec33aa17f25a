// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Detector Evaluation Core
//!
//! Detectors are per-entity monitoring rules evaluated against incoming
//! telemetry data packets. Each evaluation decides, per group key, whether an
//! alerting condition newly became active or inactive. The concrete engine in
//! [`stateful`] deduplicates replayed packets with a cache watermark and
//! stages active/priority transitions for a deferred commit to the backing
//! stores.
//!
//! Evaluation is split across three pieces:
//!
//! - [`handler`] - the polymorphic per-detector strategy seam plus the
//!   kind-keyed registry resolving a detector to its handler
//! - [`stateful`] - the stateful engine (dedupe, counters, state machine,
//!   deferred commit)
//! - [`processor`] - the batch orchestrator running many detectors against
//!   one packet

pub mod handler;
pub mod processor;
pub mod stateful;

pub use self::handler::{DetectorEvaluation, DetectorHandler, DetectorHandlerRegistry};
pub use self::processor::process_detectors;
pub use self::stateful::{
    CounterStrategy, NoopCounterStrategy, PacketExtractor, StatefulDetectorEngine,
    StatelessDetectorEngine,
};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identifier partitioning a data packet's observations into independent
/// evaluation units. `None` is the distinguished "no group" value; uniqueness
/// is per detector.
pub type DetectorGroupKey = Option<String>;

/// Ordered severity scale with [`DetectorPriorityLevel::Ok`] as the inactive
/// baseline. Persisted as its integer value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(i64)]
pub enum DetectorPriorityLevel {
    Ok = 0,
    Low = 25,
    Medium = 50,
    High = 75,
}

impl DetectorPriorityLevel {
    /// Integer value stored in the durable state table.
    #[inline]
    pub const fn value(&self) -> i64 {
        *self as i64
    }

    /// Parse a stored integer value back into a priority level.
    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(DetectorPriorityLevel::Ok),
            25 => Some(DetectorPriorityLevel::Low),
            50 => Some(DetectorPriorityLevel::Medium),
            75 => Some(DetectorPriorityLevel::High),
            _ => None,
        }
    }
}

impl Default for DetectorPriorityLevel {
    #[inline]
    fn default() -> Self {
        DetectorPriorityLevel::Ok
    }
}

/// A configured monitoring rule. Owns zero-or-one condition group and resolves
/// its handler strategy by `kind`. Created and configured externally;
/// immutable during an evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detector {
    pub id: u64,
    pub name: String,
    /// Handler strategy key, resolved through [`DetectorHandlerRegistry`].
    pub kind: String,
    pub condition_group_id: Option<u64>,
}

impl Detector {
    pub fn new(id: u64, name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: kind.into(),
            condition_group_id: None,
        }
    }

    pub fn with_condition_group(mut self, group_id: u64) -> Self {
        self.condition_group_id = Some(group_id);
        self
    }
}

/// An opaque, typed telemetry payload arriving for evaluation.
///
/// The payload carries enough information for a handler to derive one
/// deduplication value (monotonic per source stream) and a mapping from group
/// key to numeric observation value; extraction is handler-specific (see
/// [`PacketExtractor`]).
#[derive(Debug, Clone)]
pub struct DataPacket<T> {
    pub source_id: String,
    pub payload: T,
}

impl<T> DataPacket<T> {
    pub fn new(source_id: impl Into<String>, payload: T) -> Self {
        Self {
            source_id: source_id.into(),
            payload,
        }
    }
}

/// In-memory snapshot of everything known about one (detector, group_key)
/// pair, merged from the durable store (`active`, `status`) and the ephemeral
/// store (`dedupe_value`, `counter_updates`).
///
/// A counter value of `None` means "never set", distinguishing it from a
/// counter explicitly set to zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorStateData {
    pub group_key: DetectorGroupKey,
    pub active: bool,
    pub status: DetectorPriorityLevel,
    /// Last processed watermark, monotonically non-decreasing.
    pub dedupe_value: u64,
    pub counter_updates: HashMap<String, Option<i64>>,
}

impl DetectorStateData {
    /// Default state for a group key with no prior durable row and no prior
    /// ephemeral entries.
    pub fn defaults(group_key: DetectorGroupKey) -> Self {
        Self {
            group_key,
            active: false,
            status: DetectorPriorityLevel::Ok,
            dedupe_value: 0,
            counter_updates: HashMap::new(),
        }
    }
}

/// Output record for one group key whose state actually changed.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorEvaluationResult {
    pub group_key: DetectorGroupKey,
    pub is_active: bool,
    pub priority: DetectorPriorityLevel,
    /// Opaque extra data forwarded to downstream consumers.
    pub data: serde_json::Value,
}

/// Transaction-scoped accumulator of staged state updates.
///
/// One `evaluate` call produces one transaction; `commit_state_updates`
/// consumes it by value, so staged updates cannot be observed or replayed
/// after a commit.
#[derive(Debug, Default, Clone)]
pub struct StateTransaction {
    /// Staged dedupe watermark advances per group key.
    pub dedupe_updates: HashMap<DetectorGroupKey, u64>,
    /// Staged named-counter updates per group key; `None` unsets a counter.
    pub counter_updates: HashMap<DetectorGroupKey, HashMap<String, Option<i64>>>,
    /// Staged (active, priority) transitions per group key.
    pub state_updates: HashMap<DetectorGroupKey, (bool, DetectorPriorityLevel)>,
}

impl StateTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when nothing was staged, making a commit a no-op.
    pub fn is_empty(&self) -> bool {
        self.dedupe_updates.is_empty()
            && self.counter_updates.is_empty()
            && self.state_updates.is_empty()
    }

    pub fn stage_dedupe_update(&mut self, group_key: DetectorGroupKey, dedupe_value: u64) {
        self.dedupe_updates.insert(group_key, dedupe_value);
    }

    pub fn stage_counter_update(
        &mut self,
        group_key: DetectorGroupKey,
        counters: HashMap<String, Option<i64>>,
    ) {
        self.counter_updates.insert(group_key, counters);
    }

    pub fn stage_state_update(
        &mut self,
        group_key: DetectorGroupKey,
        is_active: bool,
        priority: DetectorPriorityLevel,
    ) {
        self.state_updates.insert(group_key, (is_active, priority));
    }

    /// Merge another transaction into this one, later stages winning.
    pub fn merge(&mut self, other: StateTransaction) {
        self.dedupe_updates.extend(other.dedupe_updates);
        self.counter_updates.extend(other.counter_updates);
        self.state_updates.extend(other.state_updates);
    }
}
