// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared fixtures for detector engine integration tests.

#![allow(dead_code)]

use alertflux_rust::core::condition::{
    ConditionComparison, ConditionGroupCache, DataCondition, DataConditionGroup,
    InMemoryConditionRepository,
};
use alertflux_rust::core::detector::{
    DataPacket, Detector, DetectorGroupKey, DetectorPriorityLevel, PacketExtractor,
    StatefulDetectorEngine,
};
use alertflux_rust::core::state::{DurableStateStore, EphemeralStateStore};
use std::collections::HashMap;
use std::sync::Arc;

/// Telemetry payload used across tests: a per-source sequence number plus one
/// observation value per group key.
#[derive(Debug, Clone)]
pub struct MetricsPayload {
    pub sequence: u64,
    pub values: HashMap<DetectorGroupKey, i64>,
}

/// Extractor for [`MetricsPayload`] packets.
pub struct MetricsExtractor {
    counter_names: Vec<String>,
}

impl MetricsExtractor {
    pub fn new() -> Self {
        Self {
            counter_names: Vec::new(),
        }
    }

    pub fn with_counters(counter_names: Vec<String>) -> Self {
        Self { counter_names }
    }
}

impl PacketExtractor<MetricsPayload> for MetricsExtractor {
    fn counter_names(&self) -> &[String] {
        &self.counter_names
    }

    fn dedupe_value(&self, data_packet: &DataPacket<MetricsPayload>) -> u64 {
        data_packet.payload.sequence
    }

    fn group_values(
        &self,
        data_packet: &DataPacket<MetricsPayload>,
    ) -> HashMap<DetectorGroupKey, i64> {
        data_packet.payload.values.clone()
    }
}

/// Build a packet carrying `entries` as (group_key, value) observations.
pub fn packet(sequence: u64, entries: &[(Option<&str>, i64)]) -> DataPacket<MetricsPayload> {
    let values = entries
        .iter()
        .map(|(group_key, value)| (group_key.map(str::to_string), *value))
        .collect();
    DataPacket::new(
        "test-source",
        MetricsPayload { sequence, values },
    )
}

/// A condition group with a single "warn above threshold" condition.
pub fn warn_above(group_id: u64, threshold: i64) -> DataConditionGroup {
    DataConditionGroup::new(
        group_id,
        vec![DataCondition::new(
            1,
            ConditionComparison::GreaterThan,
            threshold,
            DetectorPriorityLevel::Low,
        )],
    )
}

/// Repository plus cache with the given groups preloaded.
pub fn condition_setup(
    groups: Vec<DataConditionGroup>,
) -> (InMemoryConditionRepository, ConditionGroupCache) {
    let repository = InMemoryConditionRepository::new();
    for group in groups {
        repository.upsert_group(group);
    }
    (repository, ConditionGroupCache::new())
}

/// Build a stateful engine over the passed stores for `detector`.
pub fn stateful_engine(
    detector: Detector,
    extractor: MetricsExtractor,
    ephemeral: Arc<dyn EphemeralStateStore>,
    durable: Arc<dyn DurableStateStore>,
    repository: &InMemoryConditionRepository,
    cache: &ConditionGroupCache,
) -> StatefulDetectorEngine<MetricsPayload> {
    StatefulDetectorEngine::new(
        detector,
        Box::new(extractor),
        ephemeral,
        durable,
        cache,
        repository,
    )
    .expect("engine construction should not fail with in-memory repository")
}
