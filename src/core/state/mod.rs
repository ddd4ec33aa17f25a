// SPDX-License-Identifier: MIT OR Apache-2.0

//! State stores backing the detector engine: a fast expiring key-value cache
//! for dedupe/counter bookkeeping and a relational table for committed
//! active/priority state.

pub mod durable;
pub mod ephemeral;

pub use self::durable::{
    DetectorStateRow, DurableStateStore, InMemoryDurableStore, SqliteDurableStore,
};
pub use self::ephemeral::{
    EphemeralCommand, EphemeralStateStore, InMemoryEphemeralStore, RedisEphemeralStore,
};
