// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-wide named counters for detector evaluation bookkeeping.
//!
//! The evaluation core increments a small set of counters; an external
//! metrics exporter is expected to drain them. Counter names are part of the
//! crate's contract:
//!
//! - [`DETECTOR_SKIP_ALREADY_PROCESSED`] - packet rejected by the dedupe
//!   watermark
//! - [`DETECTOR_SKIP_NO_CONDITION_GROUP`] - detector has no usable condition
//!   group

use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Incremented when a packet was already processed for a group key.
pub const DETECTOR_SKIP_ALREADY_PROCESSED: &str = "detector.skip_already_processed";

/// Incremented when a detector without a condition group receives a packet.
pub const DETECTOR_SKIP_NO_CONDITION_GROUP: &str = "detector.skip_no_condition_group";

static COUNTERS: Lazy<DashMap<String, u64>> = Lazy::new(DashMap::new);

/// Increment a named counter by one.
pub fn incr(name: &str) {
    *COUNTERS.entry(name.to_string()).or_insert(0) += 1;
}

/// Current value of a named counter (0 if never incremented).
pub fn value(name: &str) -> u64 {
    COUNTERS.get(name).map(|v| *v).unwrap_or(0)
}

/// Snapshot of all counters, for exporters and tests.
pub fn snapshot() -> HashMap<String, u64> {
    COUNTERS
        .iter()
        .map(|entry| (entry.key().clone(), *entry.value()))
        .collect()
}

/// Reset all counters. Test helper.
pub fn reset() {
    COUNTERS.clear();
}
