//! Migration file discovery and creation

use crate::migration::{MigrationFile, StoreError};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Format of the fixed-width version prefix
const VERSION_FORMAT: &str = "%Y%m%d%H%M%S";

static MIGRATION_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_\-]*$").expect("migration name pattern is valid"));

/// Source of migration definitions
///
/// The store is the single source of truth for which scripts exist. Every call
/// re-reads the backing collection; nothing is cached between calls.
pub trait MigrationStore {
    /// All migrations, sorted ascending by version
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the collection cannot be read or holds invalid entries.
    fn list(&self) -> Result<Vec<MigrationFile>, StoreError>;

    /// Write a new migration from the template and return it
    ///
    /// The new version is strictly greater than every version already present.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the name is invalid or the file cannot be written.
    fn create(&self, name: &str) -> Result<MigrationFile, StoreError>;

    /// Find the migration whose version is `version`
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the collection cannot be read.
    fn find(&self, version: &str) -> Result<Option<MigrationFile>, StoreError> {
        Ok(self.list()?.into_iter().find(|f| f.version == version))
    }
}

/// A directory of `{YYYYMMDDHHMMSS}_{name}.sql` files
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    migrations_dir: PathBuf,
}

impl DirectoryStore {
    /// Create a store over `migrations_dir`
    ///
    /// The directory does not have to exist until [`MigrationStore::create`] is called.
    pub fn new(migrations_dir: impl AsRef<Path>) -> Self {
        Self {
            migrations_dir: migrations_dir.as_ref().to_path_buf(),
        }
    }

    /// The backing directory
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.migrations_dir
    }

    /// Create a migration stamped with `now` (or later, if needed to stay unique)
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the name is invalid or the file cannot be written.
    pub fn create_at(&self, name: &str, now: DateTime<Utc>) -> Result<MigrationFile, StoreError> {
        if !MIGRATION_NAME.is_match(name) {
            return Err(StoreError::InvalidName(name.to_string()));
        }

        fs::create_dir_all(&self.migrations_dir).map_err(|source| StoreError::Unwritable {
            path: self.migrations_dir.clone(),
            source,
        })?;

        let existing = self.list()?;
        let version = next_version(existing.last().map(|f| f.version.as_str()), now)?;

        let path = self.migrations_dir.join(format!("{version}_{name}.sql"));
        let content = template(name, now);
        // Never clobber a file another process created under the same name
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .and_then(|mut file| file.write_all(content.as_bytes()))
            .map_err(|source| StoreError::Unwritable {
                path: path.clone(),
                source,
            })?;

        log::debug!("Created migration file {}", path.display());
        Ok(MigrationFile::new(path, version, name.to_string(), content))
    }
}

impl MigrationStore for DirectoryStore {
    fn list(&self) -> Result<Vec<MigrationFile>, StoreError> {
        let entries = fs::read_dir(&self.migrations_dir).map_err(|source| StoreError::Unreadable {
            path: self.migrations_dir.clone(),
            source,
        })?;

        let mut migrations = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Unreadable {
                path: self.migrations_dir.clone(),
                source,
            })?;
            let path = entry.path();

            // Only process .sql files
            if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("sql") {
                continue;
            }

            migrations.push(MigrationFile::read(&path)?);
        }

        // Directory order is arbitrary
        migrations.sort_by(|a, b| a.version.cmp(&b.version));

        for pair in migrations.windows(2) {
            if pair[0].version == pair[1].version {
                return Err(StoreError::DuplicateVersion {
                    version: pair[0].version.clone(),
                    first: pair[0].id(),
                    second: pair[1].id(),
                });
            }
        }

        Ok(migrations)
    }

    fn create(&self, name: &str) -> Result<MigrationFile, StoreError> {
        self.create_at(name, Utc::now())
    }
}

/// Pick the version for a new migration
///
/// Uses `now` when it sorts after `latest`; otherwise `latest` plus one second, so
/// two creations within the same second still get distinct, ordered versions.
///
/// # Errors
///
/// Returns `StoreError::VersionOverflow` if the bumped version no longer fits in
/// 14 digits.
pub fn next_version(latest: Option<&str>, now: DateTime<Utc>) -> Result<String, StoreError> {
    let candidate = now.format(VERSION_FORMAT).to_string();
    let Some(latest) = latest else {
        return Ok(candidate);
    };
    if candidate.as_str() > latest {
        return Ok(candidate);
    }

    let bumped = match NaiveDateTime::parse_from_str(latest, VERSION_FORMAT) {
        Ok(at) => (at + Duration::seconds(1)).format(VERSION_FORMAT).to_string(),
        // Not a calendar timestamp; bump numerically
        Err(_) => match latest.parse::<u64>() {
            Ok(n) => format!("{:014}", n + 1),
            Err(_) => return Err(StoreError::VersionOverflow(latest.to_string())),
        },
    };

    if bumped.len() == latest.len() && bumped.bytes().all(|b| b.is_ascii_digit()) {
        Ok(bumped)
    } else {
        Err(StoreError::VersionOverflow(latest.to_string()))
    }
}

fn template(name: &str, now: DateTime<Utc>) -> String {
    format!(
        "-- Migration: {name}\n\
         -- Created: {created}\n\
         \n\
         -- Up migration: forward statements go above the marker line.\n\
         -- Example:\n\
         -- CREATE TABLE example (\n\
         --     id BIGSERIAL PRIMARY KEY,\n\
         --     name VARCHAR(255) NOT NULL\n\
         -- );\n\
         \n\
         -- Down migration: reverse statements go below the marker line.\n\
         -- {marker}\n\
         -- DROP TABLE IF EXISTS example;\n",
        created = now.to_rfc3339(),
        marker = crate::migration::ROLLBACK_MARKER,
    )
}
