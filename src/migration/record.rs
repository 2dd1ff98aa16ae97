//! `LedgerEntry` - one row of the ledger table

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Represents an applied migration in the ledger table
///
/// Entries are written once when a migration is applied and deleted when it is
/// rolled back; they are never updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    /// Migration version (timestamp: YYYYMMDDHHMMSS), unique
    pub version: String,

    /// Human-readable migration name
    pub name: String,

    /// `SHA-256` checksum of the migration file content at apply time
    pub checksum: String,

    /// When the migration was applied
    pub applied_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Create a new `LedgerEntry`
    #[must_use]
    pub fn new(version: String, name: String, checksum: String, applied_at: DateTime<Utc>) -> Self {
        Self {
            version,
            name,
            checksum,
            applied_at,
        }
    }

    /// Migration id, `{version}_{name}`
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}_{}", self.version, self.name)
    }
}
