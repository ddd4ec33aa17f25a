// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Stateful Detector Engine
//!
//! The reusable [`DetectorHandler`] implementation managing dedupe, counters
//! and active/priority transitions, batched across group keys with a deferred
//! commit to both stores.
//!
//! ## Evaluation flow
//!
//! ```text
//! DataPacket ──extract──> dedupe value + {group_key: value}
//!                              │
//!                       bulk state fetch          (1 durable query,
//!                              │                   ≤2 cache pipelines)
//!                    per-group-key state machine
//!                              │
//!              results (state changes only) + StateTransaction
//! ```
//!
//! Evaluation stages updates into a [`StateTransaction`] without touching
//! either store; only [`StatefulDetectorEngine::commit_state_updates`] has
//! observable side effects. Evaluation may therefore run speculatively any
//! number of times before a commit is issued.
//!
//! ## Per-group-key state machine
//!
//! A group key's state is `{status, active}` with `active = (status != Ok)`.
//! A packet whose dedupe value does not advance the stored watermark is a
//! no-op, which makes at-least-once packet delivery idempotent as long as
//! dedupe values are monotonic per source.

use crate::core::condition::{ConditionGroupCache, ConditionRepository, DataConditionGroup};
use crate::core::config::DEFAULT_TTL_SECONDS;
use crate::core::detector::handler::{DetectorEvaluation, DetectorHandler};
use crate::core::detector::{
    DataPacket, Detector, DetectorEvaluationResult, DetectorGroupKey, DetectorPriorityLevel,
    DetectorStateData, StateTransaction,
};
use crate::core::error::{AlertFluxError, AlertFluxResult};
use crate::core::state::{
    DetectorStateRow, DurableStateStore, EphemeralCommand, EphemeralStateStore,
};
use crate::core::util::metrics;
use std::collections::HashMap;
use std::sync::Arc;

/// Detector-specific extraction of evaluation inputs from a data packet.
pub trait PacketExtractor<T>: Send + Sync {
    /// Names of the counters this detector tracks. Empty when the detector
    /// tracks none; the counter fetch pipeline is skipped entirely then.
    fn counter_names(&self) -> &[String];

    /// The deduplication watermark value for the whole packet, monotonic per
    /// source stream (e.g. a sequence number).
    fn dedupe_value(&self, data_packet: &DataPacket<T>) -> u64;

    /// The observation value for every group key present in the packet.
    fn group_values(&self, data_packet: &DataPacket<T>) -> HashMap<DetectorGroupKey, i64>;
}

/// Hook computing named counter deltas for one group key evaluation.
///
/// Counter semantics (thresholds, consecutive-evaluation tracking) are not
/// defined yet; the default [`NoopCounterStrategy`] stages an empty update so
/// the commit path stays uniform, and richer strategies can slot in without
/// touching the engine.
pub trait CounterStrategy: Send + Sync {
    fn compute(
        &self,
        group_key: &DetectorGroupKey,
        value: i64,
        state_data: &DetectorStateData,
    ) -> HashMap<String, Option<i64>>;
}

/// Default counter strategy: tracks nothing.
#[derive(Debug, Default)]
pub struct NoopCounterStrategy;

impl CounterStrategy for NoopCounterStrategy {
    fn compute(
        &self,
        _group_key: &DetectorGroupKey,
        _value: i64,
        _state_data: &DetectorStateData,
    ) -> HashMap<String, Option<i64>> {
        HashMap::new()
    }
}

/// Stateful per-detector evaluation engine. See the module docs for the
/// evaluation flow.
///
/// One engine instance serves one detector. Engines for different detectors
/// may run concurrently: their cache keys are namespaced by detector id and
/// durable rows race last-write-wins per (detector, group_key).
pub struct StatefulDetectorEngine<T> {
    detector: Detector,
    condition_group: Option<Arc<DataConditionGroup>>,
    extractor: Box<dyn PacketExtractor<T>>,
    counter_strategy: Box<dyn CounterStrategy>,
    ephemeral: Arc<dyn EphemeralStateStore>,
    durable: Arc<dyn DurableStateStore>,
    ttl_seconds: u64,
}

impl<T> StatefulDetectorEngine<T> {
    /// Construct an engine for `detector`, eagerly resolving its condition
    /// group through `cache`. A detector without a configured group gets an
    /// engine that never activates.
    ///
    /// # Errors
    ///
    /// Returns an error if the condition repository fails; a missing group is
    /// not an error.
    pub fn new(
        detector: Detector,
        extractor: Box<dyn PacketExtractor<T>>,
        ephemeral: Arc<dyn EphemeralStateStore>,
        durable: Arc<dyn DurableStateStore>,
        cache: &ConditionGroupCache,
        repository: &dyn ConditionRepository,
    ) -> AlertFluxResult<Self> {
        let condition_group = match detector.condition_group_id {
            Some(group_id) => cache.get_or_load(group_id, repository)?,
            None => None,
        };
        Ok(Self {
            detector,
            condition_group,
            extractor,
            counter_strategy: Box::new(NoopCounterStrategy),
            ephemeral,
            durable,
            ttl_seconds: DEFAULT_TTL_SECONDS,
        })
    }

    /// Replace the counter strategy.
    pub fn with_counter_strategy(mut self, strategy: Box<dyn CounterStrategy>) -> Self {
        self.counter_strategy = strategy;
        self
    }

    /// Override the expiry applied to cache writes.
    pub fn with_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    /// Cache key holding the dedupe watermark for a group key.
    fn dedupe_value_key(&self, group_key: &DetectorGroupKey) -> String {
        format!(
            "{}:{}:dedupe_value",
            self.detector.id,
            group_key.as_deref().unwrap_or("")
        )
    }

    /// Cache key holding one named counter for a group key.
    fn counter_value_key(&self, group_key: &DetectorGroupKey, counter_name: &str) -> String {
        format!(
            "{}:{}:{}",
            self.detector.id,
            group_key.as_deref().unwrap_or(""),
            counter_name
        )
    }

    /// Fetch [`DetectorStateData`] for every requested group key, falling
    /// back to defaults where nothing is stored.
    ///
    /// One durable query covers all keys; dedupe watermarks come back in one
    /// cache pipeline and counters (only if the detector declares any) in a
    /// second, regardless of group-key count.
    ///
    /// # Errors
    ///
    /// Returns an error when either store fails or a cached payload does not
    /// parse as an integer.
    pub fn get_state_data(
        &self,
        group_keys: &[DetectorGroupKey],
    ) -> AlertFluxResult<HashMap<DetectorGroupKey, DetectorStateData>> {
        let durable_rows = self.durable.fetch_states(self.detector.id, group_keys)?;
        let mut rows_by_key: HashMap<DetectorGroupKey, DetectorStateRow> = durable_rows
            .into_iter()
            .map(|row| (row.group_key.clone(), row))
            .collect();

        let dedupe_keys: Vec<String> = group_keys
            .iter()
            .map(|gk| self.dedupe_value_key(gk))
            .collect();
        let dedupe_raw = self.ephemeral.batch_get(&dedupe_keys)?;
        let mut dedupe_values: HashMap<DetectorGroupKey, u64> = HashMap::new();
        for (group_key, (key, raw)) in group_keys.iter().zip(dedupe_keys.iter().zip(dedupe_raw)) {
            let value = match raw {
                Some(raw) => {
                    raw.parse::<u64>()
                        .map_err(|e| AlertFluxError::MalformedStateValue {
                            key: key.clone(),
                            message: e.to_string(),
                        })?
                }
                None => 0,
            };
            dedupe_values.insert(group_key.clone(), value);
        }

        let counter_names = self.extractor.counter_names();
        let mut counters_by_key: HashMap<DetectorGroupKey, HashMap<String, Option<i64>>> =
            HashMap::new();
        if !counter_names.is_empty() {
            let counter_keys: Vec<String> = group_keys
                .iter()
                .flat_map(|gk| {
                    counter_names
                        .iter()
                        .map(|name| self.counter_value_key(gk, name))
                })
                .collect();
            let counter_raw = self.ephemeral.batch_get(&counter_keys)?;
            for (i, group_key) in group_keys.iter().enumerate() {
                let mut counters = HashMap::new();
                for (j, name) in counter_names.iter().enumerate() {
                    let flat = i * counter_names.len() + j;
                    let value = match &counter_raw[flat] {
                        Some(raw) => Some(raw.parse::<i64>().map_err(|e| {
                            AlertFluxError::MalformedStateValue {
                                key: counter_keys[flat].clone(),
                                message: e.to_string(),
                            }
                        })?),
                        None => None,
                    };
                    counters.insert(name.clone(), value);
                }
                counters_by_key.insert(group_key.clone(), counters);
            }
        }

        let mut results = HashMap::new();
        for group_key in group_keys {
            let row = rows_by_key.remove(group_key);
            results.insert(
                group_key.clone(),
                DetectorStateData {
                    group_key: group_key.clone(),
                    active: row.as_ref().map(|r| r.active).unwrap_or(false),
                    status: row
                        .as_ref()
                        .map(|r| r.state)
                        .unwrap_or(DetectorPriorityLevel::Ok),
                    dedupe_value: dedupe_values.get(group_key).copied().unwrap_or(0),
                    counter_updates: counters_by_key.remove(group_key).unwrap_or_default(),
                },
            );
        }
        Ok(results)
    }

    /// Evaluate one group key's observation value against the stored state.
    ///
    /// Returns a result only when the key's active flag or status changed;
    /// all staged effects go into `transaction`.
    fn evaluate_group_key_value(
        &self,
        transaction: &mut StateTransaction,
        group_key: &DetectorGroupKey,
        value: i64,
        state_data: &DetectorStateData,
        dedupe_value: u64,
    ) -> Option<DetectorEvaluationResult> {
        if dedupe_value <= state_data.dedupe_value {
            metrics::incr(metrics::DETECTOR_SKIP_ALREADY_PROCESSED);
            return None;
        }

        transaction.stage_dedupe_update(group_key.clone(), dedupe_value);

        let condition_group = match &self.condition_group {
            Some(group) => group,
            None => {
                metrics::incr(metrics::DETECTOR_SKIP_NO_CONDITION_GROUP);
                return None;
            }
        };

        let status = condition_group.evaluate_value(value);
        let is_active = status != DetectorPriorityLevel::Ok;

        transaction.stage_counter_update(
            group_key.clone(),
            self.counter_strategy.compute(group_key, value, state_data),
        );

        if state_data.active != is_active || state_data.status != status {
            transaction.stage_state_update(group_key.clone(), is_active, status);
            return Some(DetectorEvaluationResult {
                group_key: group_key.clone(),
                is_active,
                priority: status,
                data: serde_json::Value::Object(serde_json::Map::new()),
            });
        }
        None
    }

    /// Flush a transaction's staged updates to both stores.
    ///
    /// The ephemeral flush runs first, the durable flush second; both are
    /// idempotent and safe to retry. A durable failure after a successful
    /// ephemeral flush leaves dedupe/counter values committed - they
    /// self-heal on the next evaluation, while durable rows are only
    /// reconciled by a retried commit.
    ///
    /// # Errors
    ///
    /// Returns an error when either store fails; see above for the partial
    /// failure mode.
    pub fn commit_state_updates(&self, transaction: StateTransaction) -> AlertFluxResult<()> {
        let StateTransaction {
            dedupe_updates,
            counter_updates,
            state_updates,
        } = transaction;
        self.commit_ephemeral_state(dedupe_updates, counter_updates)?;
        self.commit_durable_state(state_updates)?;
        Ok(())
    }

    fn commit_ephemeral_state(
        &self,
        dedupe_updates: HashMap<DetectorGroupKey, u64>,
        counter_updates: HashMap<DetectorGroupKey, HashMap<String, Option<i64>>>,
    ) -> AlertFluxResult<()> {
        let mut commands = Vec::new();
        for (group_key, dedupe_value) in &dedupe_updates {
            commands.push(EphemeralCommand::Set {
                key: self.dedupe_value_key(group_key),
                value: dedupe_value.to_string(),
                ttl_seconds: self.ttl_seconds,
            });
        }
        for (group_key, counters) in &counter_updates {
            for (counter_name, counter_value) in counters {
                let key = self.counter_value_key(group_key, counter_name);
                match counter_value {
                    Some(value) => commands.push(EphemeralCommand::Set {
                        key,
                        value: value.to_string(),
                        ttl_seconds: self.ttl_seconds,
                    }),
                    None => commands.push(EphemeralCommand::Delete { key }),
                }
            }
        }
        if commands.is_empty() {
            return Ok(());
        }
        log::debug!(
            "detector {}: flushing {} ephemeral command(s)",
            self.detector.id,
            commands.len()
        );
        self.ephemeral.batch_apply(&commands)
    }

    fn commit_durable_state(
        &self,
        state_updates: HashMap<DetectorGroupKey, (bool, DetectorPriorityLevel)>,
    ) -> AlertFluxResult<()> {
        if state_updates.is_empty() {
            return Ok(());
        }
        // Fresh read of exactly the staged keys so a concurrent commit is not
        // blindly overwritten with stale values.
        let staged_keys: Vec<DetectorGroupKey> = state_updates.keys().cloned().collect();
        let existing: HashMap<DetectorGroupKey, DetectorStateRow> = self
            .durable
            .fetch_states(self.detector.id, &staged_keys)?
            .into_iter()
            .map(|row| (row.group_key.clone(), row))
            .collect();

        let mut created = Vec::new();
        let mut updated = Vec::new();
        for (group_key, (active, priority)) in state_updates {
            match existing.get(&group_key) {
                None => created.push(DetectorStateRow {
                    detector_id: self.detector.id,
                    group_key,
                    active,
                    state: priority,
                }),
                Some(row) if row.active != active || row.state != priority => {
                    updated.push(DetectorStateRow {
                        detector_id: self.detector.id,
                        group_key,
                        active,
                        state: priority,
                    })
                }
                Some(_) => {}
            }
        }

        log::debug!(
            "detector {}: committing durable state ({} created, {} updated)",
            self.detector.id,
            created.len(),
            updated.len()
        );
        self.durable.bulk_create(&created)?;
        self.durable.bulk_update(&updated)?;
        Ok(())
    }
}

impl<T> DetectorHandler<T> for StatefulDetectorEngine<T> {
    fn detector(&self) -> &Detector {
        &self.detector
    }

    fn evaluate(&self, data_packet: &DataPacket<T>) -> AlertFluxResult<DetectorEvaluation> {
        let dedupe_value = self.extractor.dedupe_value(data_packet);
        let group_values = self.extractor.group_values(data_packet);
        let group_keys: Vec<DetectorGroupKey> = group_values.keys().cloned().collect();
        let all_state_data = self.get_state_data(&group_keys)?;

        let mut transaction = StateTransaction::new();
        let mut results = Vec::new();
        for (group_key, value) in &group_values {
            let state_data = &all_state_data[group_key];
            if let Some(result) = self.evaluate_group_key_value(
                &mut transaction,
                group_key,
                *value,
                state_data,
                dedupe_value,
            ) {
                results.push(result);
            }
        }
        Ok(DetectorEvaluation::new(results, transaction))
    }
}

/// Minimal stateless strategy: evaluates conditions directly with no dedupe
/// and no persisted state, emitting a result for every firing group key.
/// Mostly a demonstration of the handler seam; production detectors use
/// [`StatefulDetectorEngine`].
pub struct StatelessDetectorEngine<T> {
    detector: Detector,
    condition_group: Option<Arc<DataConditionGroup>>,
    extractor: Box<dyn PacketExtractor<T>>,
}

impl<T> StatelessDetectorEngine<T> {
    /// Construct the engine, eagerly resolving the condition group like the
    /// stateful variant.
    ///
    /// # Errors
    ///
    /// Returns an error if the condition repository fails.
    pub fn new(
        detector: Detector,
        extractor: Box<dyn PacketExtractor<T>>,
        cache: &ConditionGroupCache,
        repository: &dyn ConditionRepository,
    ) -> AlertFluxResult<Self> {
        let condition_group = match detector.condition_group_id {
            Some(group_id) => cache.get_or_load(group_id, repository)?,
            None => None,
        };
        Ok(Self {
            detector,
            condition_group,
            extractor,
        })
    }
}

impl<T> DetectorHandler<T> for StatelessDetectorEngine<T> {
    fn detector(&self) -> &Detector {
        &self.detector
    }

    fn evaluate(&self, data_packet: &DataPacket<T>) -> AlertFluxResult<DetectorEvaluation> {
        let condition_group = match &self.condition_group {
            Some(group) => group,
            None => {
                metrics::incr(metrics::DETECTOR_SKIP_NO_CONDITION_GROUP);
                return Ok(DetectorEvaluation::default());
            }
        };

        let mut results = Vec::new();
        for (group_key, value) in self.extractor.group_values(data_packet) {
            let status = condition_group.evaluate_value(value);
            if status != DetectorPriorityLevel::Ok {
                results.push(DetectorEvaluationResult {
                    group_key,
                    is_active: true,
                    priority: status,
                    data: serde_json::Value::Object(serde_json::Map::new()),
                });
            }
        }
        Ok(DetectorEvaluation::new(results, StateTransaction::new()))
    }
}
