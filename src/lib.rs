// SPDX-License-Identifier: MIT OR Apache-2.0

//! # AlertFlux
//!
//! A stateful detector engine for telemetry alerting. Incoming data packets
//! are evaluated against per-entity detector rules; replayed packets are
//! deduplicated with a cache watermark, and active/priority transitions are
//! committed to a durable relational store so evaluation stays idempotent
//! across restarts.
//!
//! The crate is an embeddable processing core: an external scheduler feeds
//! packets and detectors to [`core::detector::process_detectors`] and decides
//! when to flush each detector's staged
//! [`core::detector::StateTransaction`].

pub mod core;
