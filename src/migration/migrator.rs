//! Migrator - Core migration execution engine

use crate::executor::{Executor, ExecutorError, Transaction};
use crate::migration::{
    validate_checksum, Drift, Ledger, LedgerEntry, LedgerError, MigrationError, MigrationFile,
    MigrationStatus, MigrationStore, PendingMigration,
};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Instant;

/// Why a rollback step was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// The migration file was deleted after being applied
    MissingFile,
    /// The migration has no down-block
    Irreversible,
}

/// A version left in the ledger by a rollback
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRollback {
    pub version: String,
    pub name: String,
    pub reason: SkipReason,
}

/// Outcome of [`Migrator::rollback`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    /// Ids of reversed migrations, in the order they were reversed
    pub reversed: Vec<String>,
    /// Selected versions that could not be reversed
    pub skipped: Vec<SkippedRollback>,
}

/// Result of applying a single migration
enum Applied {
    Recorded,
    /// Another process recorded the version first
    AlreadyRecorded,
}

/// Failure while reversing a single migration
enum ReverseError {
    Executor(ExecutorError),
    NotFound,
}

/// Core migration execution engine
///
/// The `Migrator` owns no state. It reads the [`MigrationStore`] and the [`Ledger`]
/// on every call, and drives one transaction per migration through the [`Executor`].
/// Versions are processed strictly one at a time.
pub struct Migrator<'a> {
    store: &'a dyn MigrationStore,
    executor: &'a dyn Executor,
    ledger: Ledger<'a>,
}

impl<'a> Migrator<'a> {
    /// Create a Migrator recording into the default ledger table
    #[must_use]
    pub fn new(store: &'a dyn MigrationStore, executor: &'a dyn Executor) -> Self {
        Self {
            store,
            executor,
            ledger: Ledger::new(executor),
        }
    }

    /// Create a Migrator with an explicit ledger
    ///
    /// The ledger should be backed by the same executor, otherwise scripts and
    /// ledger rows are not committed together.
    #[must_use]
    pub fn with_ledger(store: &'a dyn MigrationStore, executor: &'a dyn Executor, ledger: Ledger<'a>) -> Self {
        Self {
            store,
            executor,
            ledger,
        }
    }

    /// The ledger this migrator records into
    #[must_use]
    pub fn ledger(&self) -> &Ledger<'a> {
        &self.ledger
    }

    /// Get migration status (applied vs pending)
    ///
    /// Reads only; the ledger table is not created if it is missing.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError` if the store or the ledger cannot be read.
    pub fn status(&self) -> Result<MigrationStatus, MigrationError> {
        let files = self.store.list()?;
        let applied = self.ledger.applied_entries()?;

        let pending = files
            .iter()
            .filter(|f| !applied.contains_key(&f.version))
            .map(PendingMigration::from)
            .collect();
        let drifted = drift_between(&files, &applied);
        let missing = applied
            .values()
            .filter(|e| !files.iter().any(|f| f.version == e.version))
            .cloned()
            .collect();

        Ok(MigrationStatus::new(
            applied.into_values().collect(),
            pending,
            drifted,
            missing,
        ))
    }

    /// List applied migrations whose file content changed after they were applied
    ///
    /// # Errors
    ///
    /// Returns `MigrationError` if the store or the ledger cannot be read.
    pub fn detect_drift(&self) -> Result<Vec<Drift>, MigrationError> {
        let files = self.store.list()?;
        let applied = self.ledger.applied_entries()?;
        Ok(drift_between(&files, &applied))
    }

    /// Validate checksums of all applied migrations that still have a file
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::ChecksumMismatch` for the first (lowest) drifted version.
    pub fn validate_checksums(&self) -> Result<(), MigrationError> {
        for drift in self.detect_drift()? {
            validate_checksum(&drift.version, &drift.name, &drift.stored, &drift.current)?;
        }
        Ok(())
    }

    /// Pending migrations that [`migrate`](Self::migrate) would apply for `target`
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidTarget` for a malformed target, or the
    /// store/ledger error if either cannot be read.
    pub fn plan_migrate(&self, target: Option<&str>) -> Result<Vec<MigrationFile>, MigrationError> {
        let target = target.map(target_version).transpose()?;
        let files = self.store.list()?;
        let applied = self.ledger.applied_entries()?;
        Ok(pending_up_to(files, &applied, target))
    }

    /// Ledger entries that [`rollback`](Self::rollback) would select for `steps`
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidSteps` if `steps` is zero, or the ledger error
    /// if it cannot be read.
    pub fn plan_rollback(&self, steps: usize) -> Result<Vec<LedgerEntry>, MigrationError> {
        if steps == 0 {
            return Err(MigrationError::InvalidSteps);
        }
        let applied = self.ledger.applied_entries()?;
        Ok(applied.into_values().rev().take(steps).collect())
    }

    /// Apply pending migrations in ascending version order
    ///
    /// With `target`, every pending version up to and including it is applied;
    /// later ones are left pending. Each migration runs in its own transaction
    /// together with its ledger entry. The first failure stops the run; migrations
    /// committed before it stay committed.
    ///
    /// # Returns
    ///
    /// Returns the ids (`{version}_{name}`) applied in this run.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::MigrationFailed` (carrying the ids applied before the
    /// failure) if an up-block or its commit fails.
    pub fn migrate(&self, target: Option<&str>) -> Result<Vec<String>, MigrationError> {
        let target = target.map(target_version).transpose()?;

        self.ledger.ensure_initialized()?;
        let files = self.store.list()?;
        let applied = self.ledger.applied_entries()?;
        warn_drift(&drift_between(&files, &applied));

        let pending = pending_up_to(files, &applied, target);
        if pending.is_empty() {
            log::debug!("No pending migrations to apply");
            return Ok(Vec::new());
        }

        let mut applied_ids = Vec::with_capacity(pending.len());
        for file in pending {
            let start = Instant::now();
            match self.apply_one(&file) {
                Ok(Applied::Recorded) => {
                    log::info!("Applied: {} ({}ms)", file.id(), start.elapsed().as_millis());
                    applied_ids.push(file.id());
                }
                Ok(Applied::AlreadyRecorded) => {
                    log::warn!("Skipped: {} was applied concurrently by another process", file.id());
                }
                Err(cause) => {
                    log::error!("Migration {} failed: {cause}", file.id());
                    return Err(MigrationError::MigrationFailed {
                        version: file.id(),
                        applied: applied_ids,
                        cause,
                    });
                }
            }
        }

        Ok(applied_ids)
    }

    /// Roll back the `steps` most recently applied migrations, newest first
    ///
    /// A selected version whose file is gone, or whose file has no down-block, is
    /// skipped with a warning and keeps its ledger entry.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidSteps` if `steps` is zero,
    /// `MigrationError::RollbackFailed` if a down-block or its commit fails, and
    /// `MigrationError::NotFound` if the ledger entry disappeared mid-rollback.
    pub fn rollback(&self, steps: usize) -> Result<RollbackReport, MigrationError> {
        if steps == 0 {
            return Err(MigrationError::InvalidSteps);
        }

        self.ledger.ensure_initialized()?;
        let applied = self.ledger.applied_entries()?;
        if applied.is_empty() {
            log::debug!("No applied migrations to roll back");
            return Ok(RollbackReport::default());
        }

        let mut report = RollbackReport::default();
        for entry in applied.values().rev().take(steps) {
            let Some(file) = self.store.find(&entry.version)? else {
                log::warn!(
                    "Cannot roll back {}: migration file not found, ledger entry kept",
                    entry.id()
                );
                report.skipped.push(skipped(entry, SkipReason::MissingFile));
                continue;
            };

            if file.checksum != entry.checksum {
                log::warn!(
                    "Migration {} was modified after being applied (stored checksum {}, current {})",
                    file.id(),
                    entry.checksum,
                    file.checksum
                );
            }

            let Some(down) = file.script().down else {
                log::warn!("No rollback SQL for {}, ledger entry kept", file.id());
                report.skipped.push(skipped(entry, SkipReason::Irreversible));
                continue;
            };

            match self.reverse_one(&entry.version, &down) {
                Ok(()) => {
                    log::info!("Rolled back: {}", file.id());
                    report.reversed.push(file.id());
                }
                Err(ReverseError::Executor(cause)) => {
                    log::error!("Rollback {} failed: {cause}", file.id());
                    return Err(MigrationError::RollbackFailed {
                        version: file.id(),
                        reversed: report.reversed,
                        cause,
                    });
                }
                Err(ReverseError::NotFound) => {
                    return Err(MigrationError::NotFound {
                        version: file.id(),
                        reversed: report.reversed,
                    });
                }
            }
        }

        Ok(report)
    }

    fn apply_one(&self, file: &MigrationFile) -> Result<Applied, ExecutorError> {
        let script = file.script();
        let entry = LedgerEntry::new(
            file.version.clone(),
            file.name.clone(),
            file.checksum.clone(),
            Utc::now(),
        );

        let mut tx = self.executor.begin()?;

        if script.has_up() {
            if let Err(e) = tx.execute(&script.up) {
                abort(tx);
                return Err(e);
            }
        } else {
            log::debug!("Migration {} has an empty up-block, recording only", file.id());
        }

        match self.ledger.record(tx.as_mut(), &entry) {
            Ok(()) => {}
            Err(LedgerError::DuplicateVersion(_)) => {
                abort(tx);
                return Ok(Applied::AlreadyRecorded);
            }
            Err(e) => {
                abort(tx);
                return Err(into_executor_error(e));
            }
        }

        match tx.commit() {
            Ok(()) => Ok(Applied::Recorded),
            // A concurrent apply can also surface at commit time
            Err(e) if e.is_unique_violation() => Ok(Applied::AlreadyRecorded),
            Err(e) => Err(e),
        }
    }

    fn reverse_one(&self, version: &str, down: &str) -> Result<(), ReverseError> {
        let mut tx = self.executor.begin().map_err(ReverseError::Executor)?;

        if let Err(e) = tx.execute(down) {
            abort(tx);
            return Err(ReverseError::Executor(e));
        }

        match self.ledger.erase(tx.as_mut(), version) {
            Ok(()) => {}
            Err(LedgerError::NotFound(_)) => {
                abort(tx);
                return Err(ReverseError::NotFound);
            }
            Err(e) => {
                abort(tx);
                return Err(ReverseError::Executor(into_executor_error(e)));
            }
        }

        tx.commit().map_err(|e| {
            if e.is_conflict() {
                ReverseError::NotFound
            } else {
                ReverseError::Executor(e)
            }
        })
    }
}

/// Roll back a transaction that already failed
fn abort(tx: Box<dyn Transaction + '_>) {
    if let Err(e) = tx.rollback() {
        log::warn!("Rollback of failed transaction also failed: {e}");
    }
}

fn into_executor_error(error: LedgerError) -> ExecutorError {
    match error {
        LedgerError::Executor(e) => e,
        other => ExecutorError::Database(other.to_string()),
    }
}

fn skipped(entry: &LedgerEntry, reason: SkipReason) -> SkippedRollback {
    SkippedRollback {
        version: entry.version.clone(),
        name: entry.name.clone(),
        reason,
    }
}

/// Normalize a target given as `{version}` or `{version}_{name}` to its version
fn target_version(target: &str) -> Result<String, MigrationError> {
    let version = target.split('_').next().unwrap_or_default();
    if version.len() == 14 && version.bytes().all(|b| b.is_ascii_digit()) {
        Ok(version.to_string())
    } else {
        Err(MigrationError::InvalidTarget(target.to_string()))
    }
}

/// Files not in the ledger, ascending, cut off after `target`
fn pending_up_to(
    files: Vec<MigrationFile>,
    applied: &BTreeMap<String, LedgerEntry>,
    target: Option<String>,
) -> Vec<MigrationFile> {
    files
        .into_iter()
        .filter(|f| !applied.contains_key(&f.version))
        .take_while(|f| target.as_ref().map_or(true, |t| f.version <= *t))
        .collect()
}

fn drift_between(files: &[MigrationFile], applied: &BTreeMap<String, LedgerEntry>) -> Vec<Drift> {
    files
        .iter()
        .filter_map(|f| {
            let entry = applied.get(&f.version)?;
            (entry.checksum != f.checksum).then(|| Drift {
                version: f.version.clone(),
                name: f.name.clone(),
                stored: entry.checksum.clone(),
                current: f.checksum.clone(),
            })
        })
        .collect()
}

fn warn_drift(drifted: &[Drift]) {
    for drift in drifted {
        log::warn!(
            "Migration {}_{} was modified after being applied (stored checksum {}, current {})",
            drift.version,
            drift.name,
            drift.stored,
            drift.current
        );
    }
}
