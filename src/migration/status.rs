//! Migration status tracking

use crate::migration::{LedgerEntry, MigrationFile};
use serde::Serialize;
use std::path::PathBuf;

/// Migration status information
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    /// Applied migrations (from the ledger), ascending by version
    pub applied: Vec<LedgerEntry>,

    /// Pending migrations (from the store), ascending by version
    pub pending: Vec<PendingMigration>,

    /// Applied migrations whose file changed since it was applied
    pub drifted: Vec<Drift>,

    /// Applied migrations whose file is no longer in the store
    pub missing: Vec<LedgerEntry>,

    /// Number of applied migrations
    pub applied_count: usize,

    /// Number of pending migrations
    pub pending_count: usize,
}

/// Represents a pending migration (not yet applied)
#[derive(Debug, Clone, Serialize)]
pub struct PendingMigration {
    /// Migration version
    pub version: String,

    /// Migration name
    pub name: String,

    /// File path
    pub path: PathBuf,

    /// Checksum
    pub checksum: String,
}

impl PendingMigration {
    /// Migration id, `{version}_{name}`
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}_{}", self.version, self.name)
    }
}

impl From<&MigrationFile> for PendingMigration {
    fn from(file: &MigrationFile) -> Self {
        Self {
            version: file.version.clone(),
            name: file.name.clone(),
            path: file.path.clone(),
            checksum: file.checksum.clone(),
        }
    }
}

/// A file edited after it was applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Drift {
    pub version: String,
    pub name: String,
    /// Checksum recorded in the ledger
    pub stored: String,
    /// Checksum of the file as it is now
    pub current: String,
}

impl MigrationStatus {
    /// Create a new `MigrationStatus`
    #[must_use]
    pub fn new(
        applied: Vec<LedgerEntry>,
        pending: Vec<PendingMigration>,
        drifted: Vec<Drift>,
        missing: Vec<LedgerEntry>,
    ) -> Self {
        let applied_count = applied.len();
        let pending_count = pending.len();

        Self {
            applied,
            pending,
            drifted,
            missing,
            applied_count,
            pending_count,
        }
    }

    /// Versions recorded in the ledger
    #[must_use]
    pub fn applied_versions(&self) -> Vec<String> {
        self.applied.iter().map(|e| e.version.clone()).collect()
    }

    /// Ids (`{version}_{name}`) of pending migrations
    #[must_use]
    pub fn pending_versions(&self) -> Vec<String> {
        self.pending.iter().map(PendingMigration::id).collect()
    }

    /// Check if all migrations are applied
    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.pending_count == 0
    }

    /// Get the latest applied migration version
    #[must_use]
    pub fn latest_applied_version(&self) -> Option<&str> {
        self.applied.last().map(|e| e.version.as_str())
    }

    /// Get the next pending migration version
    #[must_use]
    pub fn next_pending_version(&self) -> Option<&str> {
        self.pending.first().map(|m| m.version.as_str())
    }
}
