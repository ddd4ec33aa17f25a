// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batch orchestrator running a set of detectors against one data packet.
//!
//! Detectors are evaluated independently, in input order; they share no
//! mutable state beyond each owning its own handler. Commit timing is the
//! caller's concern: each returned [`DetectorEvaluation`] carries the staged
//! transaction for its detector, to be passed to the engine's commit later.

use crate::core::detector::handler::{DetectorEvaluation, DetectorHandler, DetectorHandlerRegistry};
use crate::core::detector::{DataPacket, Detector};
use crate::core::error::AlertFluxResult;
use std::collections::HashSet;

/// Run `detectors` against one `data_packet`.
///
/// Detectors with no resolvable handler are skipped silently. Only detectors
/// producing a non-empty result list appear in the output, which preserves
/// input order.
///
/// The same group key appearing twice in one detector's result list is an
/// internal-consistency violation: it is logged as an error and processing
/// continues, with the result list left as the handler produced it.
///
/// # Errors
///
/// Returns an error when a handler evaluation fails (store unavailable),
/// aborting the batch.
pub fn process_detectors<T>(
    registry: &DetectorHandlerRegistry<T>,
    data_packet: &DataPacket<T>,
    detectors: &[Detector],
) -> AlertFluxResult<Vec<(Detector, DetectorEvaluation)>> {
    let mut results = Vec::new();

    for detector in detectors {
        let handler = match registry.handler_for(detector) {
            Some(handler) => handler,
            None => continue,
        };

        let evaluation = handler.evaluate(data_packet)?;

        let mut seen_group_keys = HashSet::new();
        for result in &evaluation.results {
            if !seen_group_keys.insert(result.group_key.clone()) {
                // This shouldn't happen - log an error and continue on, but
                // it needs investigating when it does.
                log::error!(
                    "Duplicate detector state group keys found: detector_id={} group_key={:?}",
                    detector.id,
                    result.group_key
                );
            }
        }

        if !evaluation.results.is_empty() {
            results.push((detector.clone(), evaluation));
        }
    }

    Ok(results)
}
