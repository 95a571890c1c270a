//! In-memory store used for dry runs and tests.
//!
//! Committed record sets become visible through the shared handle; staged
//! sets of a rolled back transaction are discarded. Failures can be injected
//! at a chosen insert to exercise the rollback path.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::storage::{Connector, RecordSet, Store, StoreError, Transaction, Value};

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<&'static str, Vec<RecordSet>>,
    commits: u64,
    rollbacks: u64,
    inserts: u64,
    fail_at: Option<u64>,
    fail_begin: bool,
}

/// Shared in-memory store. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes the `n`-th insert (1-based, counted across all transactions) fail.
    pub fn fail_insert_at(&self, n: u64) {
        self.state().fail_at = Some(n);
    }

    /// Makes every `begin` fail until cleared.
    pub fn fail_begin(&self, fail: bool) {
        self.state().fail_begin = fail;
    }

    /// Committed record sets for a table, in commit order.
    pub fn record_sets(&self, table: &str) -> Vec<RecordSet> {
        self.state().tables.get(table).cloned().unwrap_or_default()
    }

    /// All committed rows for a table, as column/value pairs.
    pub fn rows(&self, table: &str) -> Vec<Vec<(String, Value)>> {
        self.record_sets(table)
            .iter()
            .flat_map(|set| {
                set.rows().iter().map(|row| {
                    set.columns()
                        .iter()
                        .cloned()
                        .zip(row.iter().cloned())
                        .collect()
                })
            })
            .collect()
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.state()
            .tables
            .get(table)
            .map(|sets| sets.iter().map(RecordSet::len).sum())
            .unwrap_or(0)
    }

    pub fn tables(&self) -> Vec<&'static str> {
        self.state().tables.keys().copied().collect()
    }

    pub fn commits(&self) -> u64 {
        self.state().commits
    }

    pub fn rollbacks(&self) -> u64 {
        self.state().rollbacks
    }
}

impl Store for MemoryStore {
    fn begin(&mut self) -> Result<Box<dyn Transaction + '_>, StoreError> {
        if self.state().fail_begin {
            return Err(StoreError::Begin("injected failure".to_string()));
        }
        Ok(Box::new(MemoryTransaction {
            store: self.clone(),
            staged: Vec::new(),
        }))
    }
}

impl Connector for MemoryStore {
    fn connect(&self) -> Result<Box<dyn Store>, StoreError> {
        Ok(Box::new(self.clone()))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

struct MemoryTransaction {
    store: MemoryStore,
    staged: Vec<RecordSet>,
}

impl Transaction for MemoryTransaction {
    fn insert(&mut self, records: &RecordSet) -> Result<u64, StoreError> {
        let mut state = self.store.state();
        state.inserts += 1;
        if state.fail_at == Some(state.inserts) {
            return Err(StoreError::Insert {
                table: records.table().to_string(),
                message: "injected failure".to_string(),
            });
        }
        drop(state);

        self.staged.push(records.clone());
        Ok(records.len() as u64)
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction { store, staged } = *self;
        let mut state = store.state();
        for set in staged {
            state.tables.entry(set.table()).or_default().push(set);
        }
        state.commits += 1;
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.store.state().rollbacks += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Row;

    fn set(table: &'static str, values: &[i64]) -> RecordSet {
        let mut set = RecordSet::new(table);
        for v in values {
            set.push(Row::new().with("v", *v)).unwrap();
        }
        set
    }

    #[test]
    fn test_commit_makes_rows_visible() {
        let mut store = MemoryStore::new();
        let handle = store.clone();

        let mut tx = store.begin().unwrap();
        assert_eq!(tx.insert(&set("a", &[1, 2])).unwrap(), 2);
        tx.insert(&set("b", &[3])).unwrap();
        assert_eq!(handle.row_count("a"), 0);
        tx.commit().unwrap();

        assert_eq!(handle.row_count("a"), 2);
        assert_eq!(handle.row_count("b"), 1);
        assert_eq!(handle.commits(), 1);
        assert_eq!(handle.rows("b"), vec![vec![("v".to_string(), Value::Int(3))]]);
        assert_eq!(handle.tables(), vec!["a", "b"]);
    }

    #[test]
    fn test_injected_insert_failure_and_rollback() {
        let mut store = MemoryStore::new();
        let handle = store.clone();
        handle.fail_insert_at(2);

        let mut tx = store.begin().unwrap();
        tx.insert(&set("a", &[1])).unwrap();
        assert!(matches!(
            tx.insert(&set("b", &[2])),
            Err(StoreError::Insert { .. })
        ));
        tx.rollback().unwrap();

        assert_eq!(handle.row_count("a"), 0);
        assert_eq!(handle.rollbacks(), 1);
        assert_eq!(handle.commits(), 0);
    }

    #[test]
    fn test_fail_begin() {
        let mut store = MemoryStore::new();
        store.fail_begin(true);
        assert!(matches!(store.begin(), Err(StoreError::Begin(_))));
        store.fail_begin(false);
        assert!(store.begin().is_ok());
    }
}
