// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable state store: one relational row per (detector, group_key) holding
//! the committed active flag and priority level.
//!
//! Rows are created when a group key first transitions away from defaults and
//! updated in place afterwards; this core never deletes them. Concurrent
//! writers of the same row resolve last-write-wins, with no optimistic
//! concurrency token.

use crate::core::detector::{DetectorGroupKey, DetectorPriorityLevel};
use crate::core::error::{AlertFluxError, AlertFluxResult};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// One durable row. Invariant: at most one row per (detector_id, group_key).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorStateRow {
    pub detector_id: u64,
    pub group_key: DetectorGroupKey,
    pub active: bool,
    pub state: DetectorPriorityLevel,
}

/// Bulk access to committed detector state.
pub trait DurableStateStore: Send + Sync {
    /// Fetch all rows for `detector_id` across the requested group keys in a
    /// single filtered query. A `None` group key becomes a null-group filter
    /// arm. Keys with no row are simply absent from the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    fn fetch_states(
        &self,
        detector_id: u64,
        group_keys: &[DetectorGroupKey],
    ) -> AlertFluxResult<Vec<DetectorStateRow>>;

    /// Insert new rows in one bulk call.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    fn bulk_create(&self, rows: &[DetectorStateRow]) -> AlertFluxResult<()>;

    /// Update `active`/`state` of existing rows in one bulk call.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    fn bulk_update(&self, rows: &[DetectorStateRow]) -> AlertFluxResult<()>;
}

/// SQLite-backed durable store.
pub struct SqliteDurableStore {
    conn: Mutex<Connection>,
}

impl SqliteDurableStore {
    /// Open (or create) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema cannot
    /// be created.
    pub fn new<P: AsRef<Path>>(path: P) -> AlertFluxResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Fully in-memory database, handy for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn in_memory() -> AlertFluxResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> AlertFluxResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS detector_state (
                detector_id INTEGER NOT NULL,
                group_key TEXT,
                active INTEGER NOT NULL,
                state INTEGER NOT NULL,
                UNIQUE(detector_id, group_key)
            )",
            [],
        )?;
        // SQLite treats NULLs as distinct in unique constraints, so the
        // no-group row needs its own partial index to stay unique.
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_detector_state_no_group
                ON detector_state(detector_id) WHERE group_key IS NULL",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_from_sql(
        detector_id: u64,
        group_key: Option<String>,
        active: bool,
        state: i64,
    ) -> AlertFluxResult<DetectorStateRow> {
        let state = DetectorPriorityLevel::from_value(state).ok_or_else(|| {
            AlertFluxError::MalformedStateValue {
                key: format!("{}:{}", detector_id, group_key.as_deref().unwrap_or("")),
                message: format!("unknown priority level {}", state),
            }
        })?;
        Ok(DetectorStateRow {
            detector_id,
            group_key,
            active,
            state,
        })
    }
}

impl DurableStateStore for SqliteDurableStore {
    fn fetch_states(
        &self,
        detector_id: u64,
        group_keys: &[DetectorGroupKey],
    ) -> AlertFluxResult<Vec<DetectorStateRow>> {
        if group_keys.is_empty() {
            return Ok(Vec::new());
        }
        let named: Vec<&String> = group_keys.iter().flatten().collect();
        let wants_no_group = group_keys.iter().any(|k| k.is_none());

        let mut clauses = Vec::new();
        if !named.is_empty() {
            let placeholders = vec!["?"; named.len()].join(", ");
            clauses.push(format!("group_key IN ({})", placeholders));
        }
        if wants_no_group {
            clauses.push("group_key IS NULL".to_string());
        }
        let sql = format!(
            "SELECT detector_id, group_key, active, state FROM detector_state
                WHERE detector_id = ? AND ({})",
            clauses.join(" OR ")
        );

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&sql)?;
        let mut params: Vec<&dyn rusqlite::ToSql> = vec![&detector_id];
        for key in &named {
            params.push(*key);
        }
        let mut rows = stmt.query(params.as_slice())?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            result.push(Self::row_from_sql(
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
            )?);
        }
        Ok(result)
    }

    fn bulk_create(&self, rows: &[DetectorStateRow]) -> AlertFluxResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO detector_state (detector_id, group_key, active, state)
                    VALUES (?1, ?2, ?3, ?4)",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.detector_id,
                    row.group_key,
                    row.active,
                    row.state.value()
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn bulk_update(&self, rows: &[DetectorStateRow]) -> AlertFluxResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "UPDATE detector_state SET active = ?1, state = ?2
                    WHERE detector_id = ?3 AND group_key IS ?4",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.active,
                    row.state.value(),
                    row.detector_id,
                    row.group_key
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

/// Very small in-memory implementation useful for tests.
#[derive(Debug, Default)]
pub struct InMemoryDurableStore {
    rows: Mutex<HashMap<(u64, DetectorGroupKey), (bool, DetectorPriorityLevel)>>,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct read of a single row. Test helper.
    pub fn row(
        &self,
        detector_id: u64,
        group_key: &DetectorGroupKey,
    ) -> Option<(bool, DetectorPriorityLevel)> {
        self.rows
            .lock()
            .unwrap()
            .get(&(detector_id, group_key.clone()))
            .copied()
    }

    /// Total row count across detectors. Test helper.
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().unwrap().is_empty()
    }
}

impl DurableStateStore for InMemoryDurableStore {
    fn fetch_states(
        &self,
        detector_id: u64,
        group_keys: &[DetectorGroupKey],
    ) -> AlertFluxResult<Vec<DetectorStateRow>> {
        let rows = self.rows.lock().unwrap();
        Ok(group_keys
            .iter()
            .filter_map(|key| {
                rows.get(&(detector_id, key.clone()))
                    .map(|(active, state)| DetectorStateRow {
                        detector_id,
                        group_key: key.clone(),
                        active: *active,
                        state: *state,
                    })
            })
            .collect())
    }

    fn bulk_create(&self, new_rows: &[DetectorStateRow]) -> AlertFluxResult<()> {
        let mut rows = self.rows.lock().unwrap();
        for row in new_rows {
            rows.insert(
                (row.detector_id, row.group_key.clone()),
                (row.active, row.state),
            );
        }
        Ok(())
    }

    fn bulk_update(&self, updated_rows: &[DetectorStateRow]) -> AlertFluxResult<()> {
        let mut rows = self.rows.lock().unwrap();
        for row in updated_rows {
            if let Some(entry) = rows.get_mut(&(row.detector_id, row.group_key.clone())) {
                *entry = (row.active, row.state);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row(group_key: DetectorGroupKey) -> DetectorStateRow {
        DetectorStateRow {
            detector_id: 1,
            group_key,
            active: true,
            state: DetectorPriorityLevel::Low,
        }
    }

    #[test]
    fn test_sqlite_create_and_fetch() {
        let store = SqliteDurableStore::in_memory().unwrap();
        store
            .bulk_create(&[sample_row(Some("g1".to_string())), sample_row(None)])
            .unwrap();

        let rows = store
            .fetch_states(1, &[Some("g1".to_string()), None, Some("g2".to_string())])
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|r| r.group_key.is_none()));
        assert!(rows
            .iter()
            .any(|r| r.group_key.as_deref() == Some("g1") && r.active));
    }

    #[test]
    fn test_sqlite_update_in_place() {
        let store = SqliteDurableStore::in_memory().unwrap();
        store.bulk_create(&[sample_row(Some("g1".to_string()))]).unwrap();

        store
            .bulk_update(&[DetectorStateRow {
                detector_id: 1,
                group_key: Some("g1".to_string()),
                active: false,
                state: DetectorPriorityLevel::Ok,
            }])
            .unwrap();

        let rows = store.fetch_states(1, &[Some("g1".to_string())]).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].active);
        assert_eq!(rows[0].state, DetectorPriorityLevel::Ok);
    }

    #[test]
    fn test_sqlite_null_group_update() {
        let store = SqliteDurableStore::in_memory().unwrap();
        store.bulk_create(&[sample_row(None)]).unwrap();
        store
            .bulk_update(&[DetectorStateRow {
                detector_id: 1,
                group_key: None,
                active: false,
                state: DetectorPriorityLevel::Ok,
            }])
            .unwrap();
        let rows = store.fetch_states(1, &[None]).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].active);
    }

    #[test]
    fn test_fetch_filters_by_detector() {
        let store = SqliteDurableStore::in_memory().unwrap();
        store.bulk_create(&[sample_row(Some("g1".to_string()))]).unwrap();
        let rows = store.fetch_states(2, &[Some("g1".to_string())]).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_in_memory_roundtrip() {
        let store = InMemoryDurableStore::new();
        store.bulk_create(&[sample_row(Some("g1".to_string()))]).unwrap();
        assert_eq!(
            store.row(1, &Some("g1".to_string())),
            Some((true, DetectorPriorityLevel::Low))
        );
        store
            .bulk_update(&[DetectorStateRow {
                detector_id: 1,
                group_key: Some("g1".to_string()),
                active: false,
                state: DetectorPriorityLevel::Ok,
            }])
            .unwrap();
        assert_eq!(
            store.row(1, &Some("g1".to_string())),
            Some((false, DetectorPriorityLevel::Ok))
        );
    }
}
