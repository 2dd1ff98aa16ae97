//! In-memory executor
//!
//! A transactional [`Executor`] with no database behind it. Scripts are never
//! interpreted; a committed script is appended to the journal, and ledger rows live
//! in ordered maps. Writes are staged per transaction and only become visible on
//! commit, which is enough to exercise every ordering and atomicity property of the
//! engine.
//!
//! Faults can be injected by substring: a script containing a registered needle fails
//! (or times out) when executed, and a transaction that staged such a script fails to
//! commit.

use crate::executor::{Executor, ExecutorError, Transaction};
use crate::migration::LedgerEntry;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MemoryState {
    ledgers: HashMap<String, BTreeMap<String, LedgerEntry>>,
    journal: Vec<String>,
    failing_scripts: Vec<String>,
    timing_out_scripts: Vec<String>,
    failing_commits: Vec<String>,
}

/// Transactional in-memory [`Executor`]
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    state: Mutex<MemoryState>,
}

impl MemoryExecutor {
    /// Create an empty executor
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every script containing `needle` fail with `ExecutorError::Script`
    pub fn fail_scripts_containing(&self, needle: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_scripts.push(needle.into());
        }
    }

    /// Make every script containing `needle` fail with `ExecutorError::Timeout`
    pub fn time_out_scripts_containing(&self, needle: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.timing_out_scripts.push(needle.into());
        }
    }

    /// Make the commit of any transaction that ran a script containing `needle` fail
    pub fn fail_commits_containing(&self, needle: impl Into<String>) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_commits.push(needle.into());
        }
    }

    /// Remove every injected fault
    pub fn clear_faults(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.failing_scripts.clear();
            state.timing_out_scripts.clear();
            state.failing_commits.clear();
        }
    }

    /// Committed scripts, in commit order
    #[must_use]
    pub fn journal(&self) -> Vec<String> {
        self.state.lock().map(|s| s.journal.clone()).unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, ExecutorError> {
        self.state
            .lock()
            .map_err(|_| ExecutorError::Database("in-memory state lock poisoned".to_string()))
    }
}

impl Executor for MemoryExecutor {
    fn begin(&self) -> Result<Box<dyn Transaction + '_>, ExecutorError> {
        Ok(Box::new(MemoryTransaction {
            executor: self,
            scripts: Vec::new(),
            inserts: Vec::new(),
            deletes: Vec::new(),
        }))
    }

    fn ensure_ledger(&self, table: &str) -> Result<(), ExecutorError> {
        self.lock()?.ledgers.entry(table.to_string()).or_default();
        Ok(())
    }

    fn ledger_entries(&self, table: &str) -> Result<Vec<LedgerEntry>, ExecutorError> {
        Ok(self
            .lock()?
            .ledgers
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }
}

/// Transaction over a [`MemoryExecutor`]
struct MemoryTransaction<'a> {
    executor: &'a MemoryExecutor,
    scripts: Vec<String>,
    inserts: Vec<(String, LedgerEntry)>,
    deletes: Vec<(String, String)>,
}

impl MemoryTransaction<'_> {
    fn staged_insert(&self, table: &str, version: &str) -> Option<usize> {
        self.inserts
            .iter()
            .position(|(t, e)| t == table && e.version == version)
    }

    fn staged_delete(&self, table: &str, version: &str) -> bool {
        self.deletes.iter().any(|(t, v)| t == table && v == version)
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn execute(&mut self, script: &str) -> Result<(), ExecutorError> {
        let state = self.executor.lock()?;
        if let Some(needle) = state.timing_out_scripts.iter().find(|n| script.contains(n.as_str())) {
            return Err(ExecutorError::Timeout(format!(
                "canceling statement due to statement timeout (matched '{needle}')"
            )));
        }
        if let Some(needle) = state.failing_scripts.iter().find(|n| script.contains(n.as_str())) {
            return Err(ExecutorError::Script(format!("script rejected (matched '{needle}')")));
        }
        drop(state);

        self.scripts.push(script.to_string());
        Ok(())
    }

    fn insert_entry(&mut self, table: &str, entry: &LedgerEntry) -> Result<(), ExecutorError> {
        let state = self.executor.lock()?;
        let rows = state
            .ledgers
            .get(table)
            .ok_or_else(|| ExecutorError::Database(format!("relation \"{table}\" does not exist")))?;

        let committed = rows.contains_key(&entry.version) && !self.staged_delete(table, &entry.version);
        if committed || self.staged_insert(table, &entry.version).is_some() {
            return Err(ExecutorError::UniqueViolation(format!(
                "duplicate key value violates unique constraint: version={}",
                entry.version
            )));
        }
        drop(state);

        self.inserts.push((table.to_string(), entry.clone()));
        Ok(())
    }

    fn delete_entry(&mut self, table: &str, version: &str) -> Result<u64, ExecutorError> {
        if let Some(pos) = self.staged_insert(table, version) {
            self.inserts.remove(pos);
            return Ok(1);
        }

        let state = self.executor.lock()?;
        let rows = state
            .ledgers
            .get(table)
            .ok_or_else(|| ExecutorError::Database(format!("relation \"{table}\" does not exist")))?;
        if !rows.contains_key(version) || self.staged_delete(table, version) {
            return Ok(0);
        }
        drop(state);

        self.deletes.push((table.to_string(), version.to_string()));
        Ok(1)
    }

    fn commit(self: Box<Self>) -> Result<(), ExecutorError> {
        let mut state = self.executor.lock()?;

        let failing = self
            .scripts
            .iter()
            .find_map(|s| state.failing_commits.iter().find(|n| s.contains(n.as_str())));
        if let Some(needle) = failing {
            return Err(ExecutorError::Transaction(format!("commit failed (matched '{needle}')")));
        }

        // Re-check uniqueness against rows committed since the insert was staged
        for (table, entry) in &self.inserts {
            let taken = state
                .ledgers
                .get(table)
                .is_some_and(|rows| rows.contains_key(&entry.version))
                && !self.deletes.iter().any(|(t, v)| t == table && *v == entry.version);
            if taken {
                return Err(ExecutorError::UniqueViolation(format!(
                    "duplicate key value violates unique constraint: version={}",
                    entry.version
                )));
            }
        }

        // A row deleted by another commit since it was staged here is gone for good
        for (table, version) in &self.deletes {
            let present = state
                .ledgers
                .get(table)
                .is_some_and(|rows| rows.contains_key(version));
            if !present {
                return Err(ExecutorError::Conflict(format!(
                    "ledger row for version {version} was deleted concurrently"
                )));
            }
        }

        for (table, version) in &self.deletes {
            if let Some(rows) = state.ledgers.get_mut(table) {
                rows.remove(version);
            }
        }
        for (table, entry) in self.inserts {
            state
                .ledgers
                .entry(table)
                .or_default()
                .insert(entry.version.clone(), entry);
        }
        state.journal.extend(self.scripts);
        Ok(())
    }

    fn rollback(self: Box<Self>) -> Result<(), ExecutorError> {
        Ok(())
    }
}
