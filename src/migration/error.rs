//! Migration-specific error types

use crate::executor::ExecutorError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a [`MigrationStore`](crate::migration::MigrationStore)
#[derive(Debug, Error)]
pub enum StoreError {
    /// The migrations directory (or a file in it) cannot be read
    #[error("cannot read {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A new migration file cannot be written
    #[error("cannot write {}: {source}", .path.display())]
    Unwritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// A `.sql` file whose name does not follow `{YYYYMMDDHHMMSS}_{name}.sql`
    #[error("migration file name '{0}' does not match expected pattern: {{YYYYMMDDHHMMSS}}_{{name}}.sql")]
    InvalidFileName(String),
    /// A migration name that cannot be used in a file name
    #[error("invalid migration name '{0}': use letters, digits, '_' and '-', starting with a letter or digit")]
    InvalidName(String),
    /// Migration content that is not valid UTF-8
    #[error("migration file {} is not valid UTF-8", .path.display())]
    Encoding { path: PathBuf },
    /// The next version would not fit the fixed 14-digit width
    #[error("no version after {0} fits in 14 digits")]
    VersionOverflow(String),
    /// Two files share one version
    #[error("version {version} is used by both {first} and {second}")]
    DuplicateVersion {
        version: String,
        first: String,
        second: String,
    },
}

/// Errors raised by the [`Ledger`](crate::migration::Ledger)
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Table name that is not a plain SQL identifier
    #[error("invalid ledger table name '{0}'")]
    InvalidTable(String),
    /// The version is already recorded
    #[error("version {0} is already recorded in the ledger")]
    DuplicateVersion(String),
    /// No entry exists for the version
    #[error("version {0} is not recorded in the ledger")]
    NotFound(String),
    /// Backend failure while reading or writing the ledger
    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// Errors surfaced by the [`Migrator`](crate::migration::Migrator)
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("migration store error: {0}")]
    Store(#[from] StoreError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// An up-block or its ledger commit failed; `applied` lists what succeeded
    /// earlier in the same run
    #[error("migration {version} failed: {cause} (applied before failure: {})", join_ids(.applied))]
    MigrationFailed {
        version: String,
        applied: Vec<String>,
        #[source]
        cause: ExecutorError,
    },

    /// A down-block or its ledger commit failed; `reversed` lists what succeeded
    /// earlier in the same run
    #[error("rollback of {version} failed: {cause} (reversed before failure: {})", join_ids(.reversed))]
    RollbackFailed {
        version: String,
        reversed: Vec<String>,
        #[source]
        cause: ExecutorError,
    },

    /// The ledger entry vanished while it was being rolled back
    #[error("rollback of {version} aborted: ledger entry not found (reversed before failure: {})", join_ids(.reversed))]
    NotFound {
        version: String,
        reversed: Vec<String>,
    },

    #[error(
        "migration '{name}' (version {version}) has been modified after being applied\n\
         stored checksum:  {stored}\n\
         current checksum: {current}"
    )]
    ChecksumMismatch {
        version: String,
        name: String,
        stored: String,
        current: String,
    },

    #[error("rollback steps must be at least 1")]
    InvalidSteps,

    #[error("invalid target version '{0}': expected a 14-digit version or {{version}}_{{name}}")]
    InvalidTarget(String),

    #[error("unknown migration version '{0}'")]
    UnknownVersion(String),
}

fn join_ids(ids: &[String]) -> String {
    if ids.is_empty() {
        "none".to_string()
    } else {
        ids.join(", ")
    }
}
