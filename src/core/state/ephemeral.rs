// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ephemeral state store: expiring key-value cache for dedupe watermarks and
//! named counters.
//!
//! All access is batched. `batch_get` issues one pipelined round trip for any
//! number of keys and `batch_apply` flushes a list of commands the same way,
//! so evaluate/commit cost a fixed number of round trips regardless of how
//! many group keys a packet carries. The list-in/list-out shape keeps the
//! trait implementable over any concurrency-safe cache client.

use crate::core::config::RedisConfig;
use crate::core::error::AlertFluxResult;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// One staged cache mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EphemeralCommand {
    /// Write `value` under `key` with an expiry.
    Set {
        key: String,
        value: String,
        ttl_seconds: u64,
    },
    /// Remove `key`. Deleting an absent key is a no-op.
    Delete { key: String },
}

/// Batched access to the ephemeral cache.
pub trait EphemeralStateStore: Send + Sync {
    /// Fetch many keys in one pipelined round trip. The result has one entry
    /// per requested key, in request order; absent keys yield `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache is unreachable or the batch fails.
    fn batch_get(&self, keys: &[String]) -> AlertFluxResult<Vec<Option<String>>>;

    /// Apply many commands in one pipelined round trip.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache is unreachable or the batch fails.
    fn batch_apply(&self, commands: &[EphemeralCommand]) -> AlertFluxResult<()>;
}

/// Redis-backed ephemeral store using a blocking connection and one
/// `redis::pipe()` per batch call.
pub struct RedisEphemeralStore {
    connection: Mutex<redis::Connection>,
    key_prefix: String,
}

impl RedisEphemeralStore {
    /// Connect eagerly using the passed configuration.
    ///
    /// # Errors
    ///
    /// Returns an ephemeral-store error when the server is unreachable within
    /// the configured timeout. Callers (and tests) can treat that as
    /// "Redis not available".
    pub fn new(config: &RedisConfig) -> AlertFluxResult<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let connection = client
            .get_connection_with_timeout(Duration::from_millis(config.connection_timeout_ms))?;
        Ok(Self {
            connection: Mutex::new(connection),
            key_prefix: config.key_prefix.clone(),
        })
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

impl EphemeralStateStore for RedisEphemeralStore {
    fn batch_get(&self, keys: &[String]) -> AlertFluxResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("GET").arg(self.prefixed(key));
        }
        let mut connection = self.connection.lock().unwrap();
        let values: Vec<Option<String>> = pipe.query(&mut *connection)?;
        Ok(values)
    }

    fn batch_apply(&self, commands: &[EphemeralCommand]) -> AlertFluxResult<()> {
        if commands.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        for command in commands {
            match command {
                EphemeralCommand::Set {
                    key,
                    value,
                    ttl_seconds,
                } => {
                    pipe.cmd("SET")
                        .arg(self.prefixed(key))
                        .arg(value)
                        .arg("EX")
                        .arg(*ttl_seconds)
                        .ignore();
                }
                EphemeralCommand::Delete { key } => {
                    pipe.cmd("DEL").arg(self.prefixed(key)).ignore();
                }
            }
        }
        let mut connection = self.connection.lock().unwrap();
        pipe.query::<()>(&mut *connection)?;
        Ok(())
    }
}

/// Very small in-memory implementation useful for tests. Expiry is recorded
/// but never enforced; entries live until deleted.
#[derive(Debug, Default)]
pub struct InMemoryEphemeralStore {
    entries: Mutex<HashMap<String, String>>,
    ttls: Mutex<HashMap<String, u64>>,
}

impl InMemoryEphemeralStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct read of a single key. Test helper.
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    /// Expiry recorded for a key by the last `Set`. Test helper.
    pub fn ttl_of(&self, key: &str) -> Option<u64> {
        self.ttls.lock().unwrap().get(key).copied()
    }

    /// Number of live entries. Test helper.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

impl EphemeralStateStore for InMemoryEphemeralStore {
    fn batch_get(&self, keys: &[String]) -> AlertFluxResult<Vec<Option<String>>> {
        let entries = self.entries.lock().unwrap();
        Ok(keys.iter().map(|key| entries.get(key).cloned()).collect())
    }

    fn batch_apply(&self, commands: &[EphemeralCommand]) -> AlertFluxResult<()> {
        let mut entries = self.entries.lock().unwrap();
        let mut ttls = self.ttls.lock().unwrap();
        for command in commands {
            match command {
                EphemeralCommand::Set {
                    key,
                    value,
                    ttl_seconds,
                } => {
                    entries.insert(key.clone(), value.clone());
                    ttls.insert(key.clone(), *ttl_seconds);
                }
                EphemeralCommand::Delete { key } => {
                    entries.remove(key);
                    ttls.remove(key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_get_preserves_order_and_absence() {
        let store = InMemoryEphemeralStore::new();
        store
            .batch_apply(&[EphemeralCommand::Set {
                key: "b".to_string(),
                value: "2".to_string(),
                ttl_seconds: 60,
            }])
            .unwrap();
        let values = store
            .batch_get(&["a".to_string(), "b".to_string(), "c".to_string()])
            .unwrap();
        assert_eq!(values, vec![None, Some("2".to_string()), None]);
    }

    #[test]
    fn test_delete_absent_key_is_noop() {
        let store = InMemoryEphemeralStore::new();
        store
            .batch_apply(&[EphemeralCommand::Delete {
                key: "missing".to_string(),
            }])
            .unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_set_records_ttl() {
        let store = InMemoryEphemeralStore::new();
        store
            .batch_apply(&[EphemeralCommand::Set {
                key: "k".to_string(),
                value: "1".to_string(),
                ttl_seconds: 604_800,
            }])
            .unwrap();
        assert_eq!(store.ttl_of("k"), Some(604_800));
    }
}
