//! Migration engine
//!
//! This module provides the infrastructure for schema migrations, including:
//! - Migration file discovery, parsing and creation ([`DirectoryStore`])
//! - Up/down block extraction from a single script ([`MigrationScript`])
//! - Checksum calculation and drift detection
//! - The ledger of applied versions ([`Ledger`])
//! - Ordered apply and rollback ([`Migrator`])
//!
//! # Example
//!
//! ```rust,no_run
//! use tidemark::{DirectoryStore, MemoryExecutor, Migrator};
//!
//! # fn main() -> Result<(), tidemark::MigrationError> {
//! let store = DirectoryStore::new("./migrations");
//! let executor = MemoryExecutor::new();
//! let migrator = Migrator::new(&store, &executor);
//!
//! let applied = migrator.migrate(None)?;
//! println!("applied {applied:?}");
//!
//! let report = migrator.rollback(1)?;
//! println!("reversed {:?}", report.reversed);
//! # Ok(())
//! # }
//! ```

pub mod checksum;
pub mod error;
pub mod file;
pub mod ledger;
pub mod migrator;
pub mod record;
pub mod script;
pub mod status;
pub mod store;

pub use checksum::{digest, validate_checksum};
pub use error::{LedgerError, MigrationError, StoreError};
pub use file::MigrationFile;
pub use ledger::{Ledger, DEFAULT_LEDGER_TABLE};
pub use migrator::{Migrator, RollbackReport, SkipReason, SkippedRollback};
pub use record::LedgerEntry;
pub use script::{MigrationScript, COMMENT_PREFIX, ROLLBACK_MARKER};
pub use status::{Drift, MigrationStatus, PendingMigration};
pub use store::{DirectoryStore, MigrationStore};
