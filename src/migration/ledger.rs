//! Ledger of applied migrations
//!
//! The ledger table is the single source of truth for what has run. Every write goes
//! through [`Ledger::record`] or [`Ledger::erase`] inside the same transaction as the
//! script it accounts for, so a version is recorded if and only if its script committed.

use crate::executor::{Executor, Transaction};
use crate::migration::{LedgerEntry, LedgerError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

/// Ledger table used when none is configured
pub const DEFAULT_LEDGER_TABLE: &str = "schema_migrations";

static TABLE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("table name pattern is valid"));

/// Persistent record of applied versions, backed by an [`Executor`]
#[derive(Clone, Copy)]
pub struct Ledger<'a> {
    executor: &'a dyn Executor,
    table: &'a str,
}

impl<'a> Ledger<'a> {
    /// Ledger in the default `schema_migrations` table
    #[must_use]
    pub fn new(executor: &'a dyn Executor) -> Self {
        Self {
            executor,
            table: DEFAULT_LEDGER_TABLE,
        }
    }

    /// Ledger in a custom table
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidTable` unless `table` is a plain lowercase SQL
    /// identifier; PostgreSQL folds unquoted names to lowercase.
    pub fn with_table(executor: &'a dyn Executor, table: &'a str) -> Result<Self, LedgerError> {
        if !TABLE_NAME.is_match(table) {
            return Err(LedgerError::InvalidTable(table.to_string()));
        }
        Ok(Self { executor, table })
    }

    /// Name of the backing table
    #[must_use]
    pub fn table(&self) -> &str {
        self.table
    }

    /// Create the ledger table if it does not exist
    ///
    /// Idempotent and safe against concurrent callers.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Executor` if the table cannot be created.
    pub fn ensure_initialized(&self) -> Result<(), LedgerError> {
        self.executor.ensure_ledger(self.table)?;
        Ok(())
    }

    /// Committed entries keyed by version, iterating in ascending version order
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::Executor` if the entries cannot be read.
    pub fn applied_entries(&self) -> Result<BTreeMap<String, LedgerEntry>, LedgerError> {
        let entries = self.executor.ledger_entries(self.table)?;
        Ok(entries.into_iter().map(|e| (e.version.clone(), e)).collect())
    }

    /// Record `entry` inside `tx`
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::DuplicateVersion` if the version is already recorded
    /// (possibly by another process), or `LedgerError::Executor` for other failures.
    pub fn record(&self, tx: &mut dyn Transaction, entry: &LedgerEntry) -> Result<(), LedgerError> {
        match tx.insert_entry(self.table, entry) {
            Ok(()) => Ok(()),
            Err(e) if e.is_unique_violation() => Err(LedgerError::DuplicateVersion(entry.version.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete the entry for `version` inside `tx`
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::NotFound` if no entry exists for `version`, or
    /// `LedgerError::Executor` for other failures.
    pub fn erase(&self, tx: &mut dyn Transaction, version: &str) -> Result<(), LedgerError> {
        let removed = tx.delete_entry(self.table, version)?;
        if removed == 0 {
            return Err(LedgerError::NotFound(version.to_string()));
        }
        Ok(())
    }
}
