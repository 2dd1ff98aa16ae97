//! # Tidemark
//!
//! Versioned, checksummed SQL migrations applied exactly once each.
//!
//! A [`Migrator`](migration::Migrator) reads `{YYYYMMDDHHMMSS}_{name}.sql` files from a
//! [`MigrationStore`](migration::MigrationStore), compares them against the
//! [`Ledger`](migration::Ledger) of applied versions, and runs each pending up-block
//! in its own transaction through an injected [`Executor`]. Rollback runs the
//! down-blocks of the most recently applied versions in reverse order.
//!
//! The engine never talks to a database directly. [`MemoryExecutor`] is a
//! transactional in-memory backend; with the `postgres` feature,
//! [`PostgresExecutor`](postgres::PostgresExecutor) runs against PostgreSQL via `may_postgres`.

pub mod config;
pub mod executor;
pub mod memory;
pub mod migration;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use config::MigrateConfig;
pub use executor::{Executor, ExecutorError, Transaction};
pub use memory::MemoryExecutor;
pub use migration::{
    LedgerEntry, Ledger, MigrationError, MigrationFile, MigrationStatus, MigrationStore,
    DirectoryStore, Migrator, RollbackReport,
};
#[cfg(feature = "postgres")]
pub use postgres::{connect, PostgresExecutor};
