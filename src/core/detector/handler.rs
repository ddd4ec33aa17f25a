// SPDX-License-Identifier: MIT OR Apache-2.0

//! Detector handler capability and the kind-keyed handler registry.
//!
//! A handler is the per-detector evaluation strategy. Concrete strategies
//! (stateful, stateless, or custom) implement [`DetectorHandler`] and are
//! resolved through [`DetectorHandlerRegistry`] by the detector's `kind`
//! string. Detectors whose kind has no registered factory simply resolve to
//! no handler and contribute nothing to a batch.

use crate::core::detector::{DataPacket, Detector, DetectorEvaluationResult, StateTransaction};
use crate::core::error::AlertFluxResult;
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of one handler evaluation: the emitted results plus the
/// transaction of staged state updates to be committed later. Stateless
/// strategies return an empty transaction.
#[derive(Debug, Default)]
pub struct DetectorEvaluation {
    pub results: Vec<DetectorEvaluationResult>,
    pub transaction: StateTransaction,
}

impl DetectorEvaluation {
    pub fn new(results: Vec<DetectorEvaluationResult>, transaction: StateTransaction) -> Self {
        Self {
            results,
            transaction,
        }
    }
}

/// Per-detector evaluation strategy.
pub trait DetectorHandler<T>: Send + Sync {
    /// The detector this handler was constructed for.
    fn detector(&self) -> &Detector;

    /// Evaluate one data packet, returning results for every group key whose
    /// state changed plus the staged updates for a deferred commit.
    ///
    /// # Errors
    ///
    /// Returns an error when a backing store is unavailable; evaluation has
    /// no durable side effects, so callers may retry the whole call.
    fn evaluate(&self, data_packet: &DataPacket<T>) -> AlertFluxResult<DetectorEvaluation>;
}

/// Factory producing a handler for one detector, or `None` when the detector
/// cannot be handled (e.g. misconfigured).
pub type DetectorHandlerFactory<T> =
    Arc<dyn Fn(&Detector) -> Option<Arc<dyn DetectorHandler<T>>> + Send + Sync>;

/// Registry resolving detectors to handlers by their `kind`.
///
/// The registry is plain data owned by the orchestrating caller; handler
/// instances are expected to be constructed once per detector and cached by
/// the caller for the lifetime of an evaluate→commit cycle.
pub struct DetectorHandlerRegistry<T> {
    factories: HashMap<String, DetectorHandlerFactory<T>>,
}

impl<T> Default for DetectorHandlerRegistry<T> {
    fn default() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }
}

impl<T> DetectorHandlerRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for a detector kind, replacing any previous one.
    pub fn register(&mut self, kind: impl Into<String>, factory: DetectorHandlerFactory<T>) {
        self.factories.insert(kind.into(), factory);
    }

    /// Resolve a handler for `detector`, or `None` when its kind is unknown
    /// or the factory declines.
    pub fn handler_for(&self, detector: &Detector) -> Option<Arc<dyn DetectorHandler<T>>> {
        self.factories
            .get(&detector.kind)
            .and_then(|factory| factory(detector))
    }
}

impl<T> std::fmt::Debug for DetectorHandlerRegistry<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorHandlerRegistry")
            .field("kinds", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
