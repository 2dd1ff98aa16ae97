//! Tests for the migration engine against the in-memory executor

use std::cell::Cell;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tidemark::executor::{Executor, ExecutorError, Transaction};
use tidemark::migration::{Ledger, LedgerEntry, MigrationError, SkipReason};
use tidemark::{DirectoryStore, MemoryExecutor, Migrator};

const INIT: &str = "-- Migration: init\n\
                    CREATE TABLE counters (name TEXT PRIMARY KEY, n INT NOT NULL);\n\
                    INSERT INTO counters VALUES ('hits', 0);\n\
                    -- @rollback\n\
                    DROP TABLE counters;\n";

const ADD_INDEX: &str = "-- Migration: add_index\n\
                         CREATE INDEX idx_counters_n ON counters (n);\n\
                         -- @rollback\n\
                         DROP INDEX idx_counters_n;\n";

fn write(dir: &Path, file: &str, content: &str) {
    fs::write(dir.join(file), content).unwrap();
}

/// Two reversible migrations, none applied
fn scenario() -> (TempDir, DirectoryStore) {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "20240101000000_init.sql", INIT);
    write(dir.path(), "20240102000000_add_index.sql", ADD_INDEX);
    let store = DirectoryStore::new(dir.path());
    (dir, store)
}

#[test]
fn test_concrete_scenario() {
    let (_dir, store) = scenario();
    let executor = MemoryExecutor::new();
    let migrator = Migrator::new(&store, &executor);

    let applied = migrator.migrate(None).unwrap();
    assert_eq!(applied, vec!["20240101000000_init", "20240102000000_add_index"]);

    let status = migrator.status().unwrap();
    assert_eq!(status.applied_count, 2);
    assert_eq!(status.pending_count, 0);
    assert!(status.is_up_to_date());

    let report = migrator.rollback(1).unwrap();
    assert_eq!(report.reversed, vec!["20240102000000_add_index"]);
    assert!(report.skipped.is_empty());

    let status = migrator.status().unwrap();
    assert_eq!(status.applied_count, 1);
    assert_eq!(status.pending_count, 1);
    assert_eq!(status.applied_versions(), vec!["20240101000000"]);
    assert_eq!(status.pending_versions(), vec!["20240102000000_add_index"]);
}

#[test]
fn test_applies_in_version_order_regardless_of_creation_order() {
    let dir = TempDir::new().unwrap();
    // Written newest first so directory order is unlikely to match version order
    write(dir.path(), "20240301000000_c.sql", "SELECT 'c';\n");
    write(dir.path(), "20240101000000_a.sql", "SELECT 'a';\n");
    write(dir.path(), "20240201000000_b.sql", "SELECT 'b';\n");
    let store = DirectoryStore::new(dir.path());
    let executor = MemoryExecutor::new();

    let applied = Migrator::new(&store, &executor).migrate(None).unwrap();
    assert_eq!(
        applied,
        vec!["20240101000000_a", "20240201000000_b", "20240301000000_c"]
    );
    assert_eq!(executor.journal(), vec!["SELECT 'a';\n", "SELECT 'b';\n", "SELECT 'c';\n"]);
}

#[test]
fn test_migrate_is_idempotent() {
    let (_dir, store) = scenario();
    let executor = MemoryExecutor::new();
    let migrator = Migrator::new(&store, &executor);

    migrator.migrate(None).unwrap();
    let ledger_before = Ledger::new(&executor).applied_entries().unwrap();
    let journal_before = executor.journal();

    assert!(migrator.migrate(None).unwrap().is_empty());
    assert_eq!(Ledger::new(&executor).applied_entries().unwrap(), ledger_before);
    assert_eq!(executor.journal(), journal_before);
}

#[test]
fn test_failure_keeps_earlier_versions_and_resumes_after_fix() {
    let (dir, store) = scenario();
    write(dir.path(), "20240103000000_broken.sql", "ALTER TABLE counters ADD COLUMN BROKEN;\n");
    write(dir.path(), "20240104000000_after.sql", "SELECT 'after';\n");
    let executor = MemoryExecutor::new();
    executor.fail_scripts_containing("BROKEN");
    let migrator = Migrator::new(&store, &executor);

    let err = migrator.migrate(None).unwrap_err();
    match err {
        MigrationError::MigrationFailed { version, applied, cause } => {
            assert_eq!(version, "20240103000000_broken");
            assert_eq!(applied, vec!["20240101000000_init", "20240102000000_add_index"]);
            assert!(matches!(cause, ExecutorError::Script(_)));
        }
        other => panic!("unexpected error: {other}"),
    }

    let status = migrator.status().unwrap();
    assert_eq!(status.applied_versions(), vec!["20240101000000", "20240102000000"]);
    assert_eq!(
        status.pending_versions(),
        vec!["20240103000000_broken", "20240104000000_after"]
    );

    // Fix the script and re-run
    write(dir.path(), "20240103000000_broken.sql", "ALTER TABLE counters ADD COLUMN fixed INT;\n");
    let applied = migrator.migrate(None).unwrap();
    assert_eq!(applied, vec!["20240103000000_broken", "20240104000000_after"]);
    assert_eq!(executor.journal().len(), 4);
}

#[test]
fn test_target_is_inclusive_upper_bound() {
    let (dir, store) = scenario();
    write(dir.path(), "20240103000000_third.sql", "SELECT 3;\n");
    let executor = MemoryExecutor::new();
    let migrator = Migrator::new(&store, &executor);

    let applied = migrator.migrate(Some("20240102000000")).unwrap();
    assert_eq!(applied, vec!["20240101000000_init", "20240102000000_add_index"]);

    // A target between versions stops before the next one
    assert!(migrator.migrate(Some("20240102120000")).unwrap().is_empty());

    let applied = migrator.migrate(Some("20240103000000_third")).unwrap();
    assert_eq!(applied, vec!["20240103000000_third"]);
}

#[test]
fn test_invalid_target_touches_nothing() {
    let (_dir, store) = scenario();
    let executor = MemoryExecutor::new();
    let migrator = Migrator::new(&store, &executor);

    assert!(matches!(
        migrator.migrate(Some("latest")),
        Err(MigrationError::InvalidTarget(_))
    ));
    assert!(executor.journal().is_empty());
}

#[test]
fn test_rollback_round_trip() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "20240101000000_init.sql", INIT);
    let store = DirectoryStore::new(dir.path());
    let executor = MemoryExecutor::new();
    let migrator = Migrator::new(&store, &executor);

    migrator.migrate(None).unwrap();
    let report = migrator.rollback(1).unwrap();
    assert_eq!(report.reversed, vec!["20240101000000_init"]);

    let status = migrator.status().unwrap();
    assert_eq!(status.applied_count, 0);
    assert_eq!(status.pending_versions(), vec!["20240101000000_init"]);
    assert_eq!(executor.journal().last().unwrap(), "DROP TABLE counters;\n");
}

#[test]
fn test_rollback_newest_first_and_caps_steps() {
    let (_dir, store) = scenario();
    let executor = MemoryExecutor::new();
    let migrator = Migrator::new(&store, &executor);
    migrator.migrate(None).unwrap();

    let report = migrator.rollback(10).unwrap();
    assert_eq!(
        report.reversed,
        vec!["20240102000000_add_index", "20240101000000_init"]
    );
    assert!(migrator.rollback(1).unwrap().reversed.is_empty());
}

#[test]
fn test_rollback_zero_steps_rejected() {
    let (_dir, store) = scenario();
    let executor = MemoryExecutor::new();
    let migrator = Migrator::new(&store, &executor);

    assert!(matches!(migrator.rollback(0), Err(MigrationError::InvalidSteps)));
}

#[test]
fn test_irreversible_migration_is_skipped_and_kept() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "20240101000000_init.sql", INIT);
    write(dir.path(), "20240102000000_backfill.sql", "UPDATE counters SET n = 1;\n");
    let store = DirectoryStore::new(dir.path());
    let executor = MemoryExecutor::new();
    let migrator = Migrator::new(&store, &executor);
    migrator.migrate(None).unwrap();

    let report = migrator.rollback(2).unwrap();
    assert_eq!(report.reversed, vec!["20240101000000_init"]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].version, "20240102000000");
    assert_eq!(report.skipped[0].reason, SkipReason::Irreversible);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["reversed"][0], "20240101000000_init");
    assert_eq!(json["skipped"][0]["reason"], "Irreversible");

    let status = migrator.status().unwrap();
    assert_eq!(status.applied_versions(), vec!["20240102000000"]);
}

#[test]
fn test_missing_file_is_skipped_on_rollback() {
    let (dir, store) = scenario();
    let executor = MemoryExecutor::new();
    let migrator = Migrator::new(&store, &executor);
    migrator.migrate(None).unwrap();

    fs::remove_file(dir.path().join("20240102000000_add_index.sql")).unwrap();

    let status = migrator.status().unwrap();
    assert_eq!(status.missing.len(), 1);
    assert_eq!(status.missing[0].id(), "20240102000000_add_index");

    let report = migrator.rollback(2).unwrap();
    assert_eq!(report.reversed, vec!["20240101000000_init"]);
    assert_eq!(report.skipped[0].reason, SkipReason::MissingFile);
    assert_eq!(
        migrator.status().unwrap().applied_versions(),
        vec!["20240102000000"]
    );
}

#[test]
fn test_rollback_failure_stops_and_reports_progress() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "20240101000000_init.sql", INIT);
    write(
        dir.path(),
        "20240102000000_add_index.sql",
        "CREATE INDEX i ON counters (n);\n-- @rollback\nDROP INDEX i;\n",
    );
    write(
        dir.path(),
        "20240103000000_third.sql",
        "SELECT 3;\n-- @rollback\nSELECT -3;\n",
    );
    let store = DirectoryStore::new(dir.path());
    let executor = MemoryExecutor::new();
    let migrator = Migrator::new(&store, &executor);
    migrator.migrate(None).unwrap();

    executor.fail_scripts_containing("DROP INDEX");
    let err = migrator.rollback(3).unwrap_err();
    match err {
        MigrationError::RollbackFailed { version, reversed, .. } => {
            assert_eq!(version, "20240102000000_add_index");
            assert_eq!(reversed, vec!["20240103000000_third"]);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(
        migrator.status().unwrap().applied_versions(),
        vec!["20240101000000", "20240102000000"]
    );
}

#[test]
fn test_checksum_drift_is_reported_not_blocking() {
    let (dir, store) = scenario();
    let executor = MemoryExecutor::new();
    let migrator = Migrator::new(&store, &executor);
    migrator.migrate(None).unwrap();
    assert!(migrator.detect_drift().unwrap().is_empty());
    migrator.validate_checksums().unwrap();

    write(
        dir.path(),
        "20240101000000_init.sql",
        &INIT.replace("-- Migration: init", "-- Migration: init (edited)"),
    );
    write(dir.path(), "20240103000000_third.sql", "SELECT 3;\n");

    let drift = migrator.detect_drift().unwrap();
    assert_eq!(drift.len(), 1);
    assert_eq!(drift[0].version, "20240101000000");
    assert_ne!(drift[0].stored, drift[0].current);
    assert_eq!(migrator.status().unwrap().drifted, drift);

    assert!(matches!(
        migrator.validate_checksums(),
        Err(MigrationError::ChecksumMismatch { ref version, .. }) if version == "20240101000000"
    ));

    // Other versions still apply; the edited one is not re-applied
    assert_eq!(migrator.migrate(None).unwrap(), vec!["20240103000000_third"]);
}

#[test]
fn test_timeout_surfaces_as_migration_failure() {
    let (dir, store) = scenario();
    write(dir.path(), "20240103000000_slow.sql", "SELECT pg_sleep(600);\n");
    let executor = MemoryExecutor::new();
    executor.time_out_scripts_containing("pg_sleep");

    let err = Migrator::new(&store, &executor).migrate(None).unwrap_err();
    match err {
        MigrationError::MigrationFailed { version, cause, .. } => {
            assert_eq!(version, "20240103000000_slow");
            assert!(cause.is_timeout());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_commit_failure_leaves_version_pending() {
    let (_dir, store) = scenario();
    let executor = MemoryExecutor::new();
    executor.fail_commits_containing("CREATE INDEX");
    let migrator = Migrator::new(&store, &executor);

    let err = migrator.migrate(None).unwrap_err();
    assert!(matches!(
        err,
        MigrationError::MigrationFailed { ref version, ref applied, .. }
            if version == "20240102000000_add_index" && applied.len() == 1
    ));
    assert_eq!(
        migrator.status().unwrap().pending_versions(),
        vec!["20240102000000_add_index"]
    );
}

#[test]
fn test_empty_up_block_is_recorded() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "20240101000000_placeholder.sql", "-- nothing to do yet\n");
    let store = DirectoryStore::new(dir.path());
    let executor = MemoryExecutor::new();
    let migrator = Migrator::new(&store, &executor);

    assert_eq!(migrator.migrate(None).unwrap(), vec!["20240101000000_placeholder"]);
    assert!(executor.journal().is_empty());
    assert_eq!(migrator.status().unwrap().applied_count, 1);
}

#[test]
fn test_status_does_not_create_ledger() {
    let (_dir, store) = scenario();
    let executor = MemoryExecutor::new();
    let migrator = Migrator::new(&store, &executor);

    let status = migrator.status().unwrap();
    assert_eq!(status.pending_count, 2);
    assert_eq!(status.next_pending_version(), Some("20240101000000"));
    assert_eq!(status.latest_applied_version(), None);

    // Nothing was created, so a raw insert still fails
    let mut tx = executor.begin().unwrap();
    let entry = LedgerEntry::new(
        "20240101000000".to_string(),
        "init".to_string(),
        "0".repeat(64),
        chrono::Utc::now(),
    );
    assert!(tx.insert_entry("schema_migrations", &entry).is_err());
}

#[test]
fn test_custom_ledger_table() {
    let (_dir, store) = scenario();
    let executor = MemoryExecutor::new();
    let ledger = Ledger::with_table(&executor, "deploy_migrations").unwrap();
    let migrator = Migrator::with_ledger(&store, &executor, ledger);

    migrator.migrate(None).unwrap();
    assert_eq!(executor.ledger_entries("deploy_migrations").unwrap().len(), 2);
    assert!(executor.ledger_entries("schema_migrations").unwrap().is_empty());
}

#[test]
fn test_plans_do_not_mutate() {
    let (_dir, store) = scenario();
    let executor = MemoryExecutor::new();
    let migrator = Migrator::new(&store, &executor);

    let plan: Vec<_> = migrator
        .plan_migrate(Some("20240101000000"))
        .unwrap()
        .iter()
        .map(|f| f.id())
        .collect();
    assert_eq!(plan, vec!["20240101000000_init"]);
    assert!(migrator.plan_rollback(1).unwrap().is_empty());
    assert!(executor.journal().is_empty());

    migrator.migrate(None).unwrap();
    let plan: Vec<_> = migrator.plan_rollback(5).unwrap().iter().map(|e| e.id()).collect();
    assert_eq!(plan, vec!["20240102000000_add_index", "20240101000000_init"]);
}

#[test]
fn test_store_error_is_fatal() {
    let dir = TempDir::new().unwrap();
    let store = DirectoryStore::new(dir.path().join("does-not-exist"));
    let executor = MemoryExecutor::new();

    assert!(matches!(
        Migrator::new(&store, &executor).migrate(None),
        Err(MigrationError::Store(_))
    ));
}

/// Commits the first pending version from "another process" right after the
/// engine has read the ledger and opened its own transaction.
struct RacingExecutor {
    inner: MemoryExecutor,
    raced: Cell<bool>,
}

impl Executor for RacingExecutor {
    fn begin(&self) -> Result<Box<dyn Transaction + '_>, ExecutorError> {
        if !self.raced.replace(true) {
            let mut other = self.inner.begin()?;
            other.execute("CREATE TABLE counters (name TEXT PRIMARY KEY, n INT NOT NULL);")?;
            other.insert_entry(
                "schema_migrations",
                &LedgerEntry::new(
                    "20240101000000".to_string(),
                    "init".to_string(),
                    "0".repeat(64),
                    chrono::Utc::now(),
                ),
            )?;
            other.commit()?;
        }
        self.inner.begin()
    }

    fn ensure_ledger(&self, table: &str) -> Result<(), ExecutorError> {
        self.inner.ensure_ledger(table)
    }

    fn ledger_entries(&self, table: &str) -> Result<Vec<LedgerEntry>, ExecutorError> {
        self.inner.ledger_entries(table)
    }
}

#[test]
fn test_concurrent_apply_is_treated_as_applied() {
    let (_dir, store) = scenario();
    let executor = RacingExecutor {
        inner: MemoryExecutor::new(),
        raced: Cell::new(false),
    };
    let migrator = Migrator::new(&store, &executor);

    let applied = migrator.migrate(None).unwrap();
    assert_eq!(applied, vec!["20240102000000_add_index"]);

    // Our copy of the init script was rolled back; only the other process's ran
    let journal = executor.inner.journal();
    assert_eq!(journal.len(), 2);
    assert!(journal[1].contains("CREATE INDEX"));
    assert_eq!(migrator.status().unwrap().applied_count, 2);
}

/// Deletes a ledger entry from "another process" just before the engine erases it.
struct VanishingExecutor {
    inner: MemoryExecutor,
    armed: Cell<bool>,
}

impl Executor for VanishingExecutor {
    fn begin(&self) -> Result<Box<dyn Transaction + '_>, ExecutorError> {
        if self.armed.replace(false) {
            let mut other = self.inner.begin()?;
            other.delete_entry("schema_migrations", "20240102000000")?;
            other.commit()?;
        }
        self.inner.begin()
    }

    fn ensure_ledger(&self, table: &str) -> Result<(), ExecutorError> {
        self.inner.ensure_ledger(table)
    }

    fn ledger_entries(&self, table: &str) -> Result<Vec<LedgerEntry>, ExecutorError> {
        self.inner.ledger_entries(table)
    }
}

#[test]
fn test_concurrent_rollback_surfaces_not_found() {
    let (_dir, store) = scenario();
    let executor = VanishingExecutor {
        inner: MemoryExecutor::new(),
        armed: Cell::new(false),
    };
    let migrator = Migrator::new(&store, &executor);
    migrator.migrate(None).unwrap();

    executor.armed.set(true);
    let err = migrator.rollback(1).unwrap_err();
    assert!(matches!(
        err,
        MigrationError::NotFound { ref version, ref reversed }
            if version == "20240102000000_add_index" && reversed.is_empty()
    ));
    // The down-block was discarded with the aborted transaction
    assert!(!executor.inner.journal().iter().any(|s| s.contains("DROP INDEX")));
}

/// Runs a competing rollback of the same version just before our commit
struct RivalExecutor {
    inner: MemoryExecutor,
    armed: Cell<bool>,
}

struct RivalTransaction<'a> {
    inner: Box<dyn Transaction + 'a>,
    executor: &'a RivalExecutor,
}

impl Transaction for RivalTransaction<'_> {
    fn execute(&mut self, script: &str) -> Result<(), ExecutorError> {
        self.inner.execute(script)
    }

    fn insert_entry(&mut self, table: &str, entry: &LedgerEntry) -> Result<(), ExecutorError> {
        self.inner.insert_entry(table, entry)
    }

    fn delete_entry(&mut self, table: &str, version: &str) -> Result<u64, ExecutorError> {
        self.inner.delete_entry(table, version)
    }

    fn commit(self: Box<Self>) -> Result<(), ExecutorError> {
        if self.executor.armed.replace(false) {
            let mut rival = self.executor.inner.begin()?;
            rival.execute("DROP INDEX idx_counters_n;")?;
            rival.delete_entry("schema_migrations", "20240102000000")?;
            rival.commit()?;
        }
        self.inner.commit()
    }

    fn rollback(self: Box<Self>) -> Result<(), ExecutorError> {
        self.inner.rollback()
    }
}

impl Executor for RivalExecutor {
    fn begin(&self) -> Result<Box<dyn Transaction + '_>, ExecutorError> {
        Ok(Box::new(RivalTransaction {
            inner: self.inner.begin()?,
            executor: self,
        }))
    }

    fn ensure_ledger(&self, table: &str) -> Result<(), ExecutorError> {
        self.inner.ensure_ledger(table)
    }

    fn ledger_entries(&self, table: &str) -> Result<Vec<LedgerEntry>, ExecutorError> {
        self.inner.ledger_entries(table)
    }
}

#[test]
fn test_rollback_racing_to_commit_runs_down_block_once() {
    let (_dir, store) = scenario();
    let executor = RivalExecutor {
        inner: MemoryExecutor::new(),
        armed: Cell::new(false),
    };
    let migrator = Migrator::new(&store, &executor);
    migrator.migrate(None).unwrap();

    executor.armed.set(true);
    let err = migrator.rollback(1).unwrap_err();
    assert!(matches!(
        err,
        MigrationError::NotFound { ref version, ref reversed }
            if version == "20240102000000_add_index" && reversed.is_empty()
    ));

    let drops = executor
        .inner
        .journal()
        .iter()
        .filter(|s| s.contains("DROP INDEX"))
        .count();
    assert_eq!(drops, 1);
    assert_eq!(migrator.status().unwrap().applied_versions(), vec!["20240101000000"]);
}
