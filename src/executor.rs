//! Executor seam
//!
//! The migration engine never speaks a database dialect. Everything it needs from the
//! target system goes through [`Executor`] and the [`Transaction`]s it opens: running an
//! opaque script, and reading and writing ledger rows inside the same transaction as
//! that script.
//!
//! Implementations own their connection (or pool) and are injected into the
//! [`Migrator`](crate::migration::Migrator) at construction time.

use crate::migration::LedgerEntry;
use thiserror::Error;

/// Executor error type
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// A uniqueness constraint rejected the write
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    /// The statement or transaction exceeded its timeout
    #[error("timed out: {0}")]
    Timeout(String),
    /// The migration script itself failed
    #[error("script failed: {0}")]
    Script(String),
    /// A concurrent transaction already changed a row this one wrote
    #[error("write conflict: {0}")]
    Conflict(String),
    /// Transaction control (BEGIN/COMMIT/ROLLBACK) failed
    #[error("transaction error: {0}")]
    Transaction(String),
    /// The backend could not be reached
    #[error("connection error: {0}")]
    Connection(String),
    /// Any other backend error
    #[error("database error: {0}")]
    Database(String),
}

impl ExecutorError {
    /// Whether this error is a uniqueness violation
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, ExecutorError::UniqueViolation(_))
    }

    /// Whether another transaction got to the same row first
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, ExecutorError::Conflict(_))
    }

    /// Whether this error is a timeout
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, ExecutorError::Timeout(_))
    }
}

/// An open, all-or-nothing unit of work
///
/// Nothing written through a transaction is visible to other readers until
/// [`commit`](Transaction::commit) succeeds. A transaction that is dropped without
/// being committed is rolled back.
pub trait Transaction {
    /// Run an opaque script inside the transaction
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError` if any statement of the script fails. The transaction
    /// must then be rolled back.
    fn execute(&mut self, script: &str) -> Result<(), ExecutorError>;

    /// Insert a ledger row
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::UniqueViolation` if the version is already present.
    fn insert_entry(&mut self, table: &str, entry: &LedgerEntry) -> Result<(), ExecutorError>;

    /// Delete the ledger row for `version`, returning the number of rows removed
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError` if the delete statement fails.
    fn delete_entry(&mut self, table: &str, version: &str) -> Result<u64, ExecutorError>;

    /// Commit every write made through this transaction
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError` if the commit fails; no write becomes visible.
    fn commit(self: Box<Self>) -> Result<(), ExecutorError>;

    /// Discard every write made through this transaction
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError` if the backend reports a failure while rolling back.
    fn rollback(self: Box<Self>) -> Result<(), ExecutorError>;
}

/// Trait for transactional script execution against a target system
pub trait Executor {
    /// Open a new transaction
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError` if the transaction cannot be started.
    fn begin(&self) -> Result<Box<dyn Transaction + '_>, ExecutorError>;

    /// Create the ledger structure named `table` if it does not exist yet
    ///
    /// Must be safe to call concurrently from several processes.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError` if the structure cannot be created.
    fn ensure_ledger(&self, table: &str) -> Result<(), ExecutorError>;

    /// Read every committed ledger row, ordered by version ascending
    ///
    /// A ledger that was never created reads as empty.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError` if the rows cannot be read.
    fn ledger_entries(&self, table: &str) -> Result<Vec<LedgerEntry>, ExecutorError>;

    /// Run `script` as a single atomic unit and commit it
    ///
    /// # Errors
    ///
    /// Returns the error of the failing step; the transaction is rolled back and
    /// leaves no effect.
    fn run_in_transaction(&self, script: &str) -> Result<(), ExecutorError> {
        let mut tx = self.begin()?;
        if let Err(e) = tx.execute(script) {
            if let Err(rollback_err) = tx.rollback() {
                log::warn!("Rollback after failed script also failed: {rollback_err}");
            }
            return Err(e);
        }
        tx.commit()
    }
}
