//! Migration file parsing

use crate::migration::{digest, MigrationScript, StoreError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

static FILE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{14})_([A-Za-z0-9][A-Za-z0-9_\-]*)\.sql$").expect("migration file name pattern is valid")
});

/// Represents a migration file read from the store
///
/// Built fresh from disk on every engine call and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct MigrationFile {
    /// Path to the migration file
    pub path: PathBuf,

    /// Migration version (timestamp: YYYYMMDDHHMMSS)
    pub version: String,

    /// Human-readable migration name
    pub name: String,

    /// Raw file content
    pub content: String,

    /// SHA-256 checksum of the file content
    pub checksum: String,
}

impl MigrationFile {
    /// Create a `MigrationFile` from content already in memory
    #[must_use]
    pub fn new(path: PathBuf, version: String, name: String, content: String) -> Self {
        let checksum = digest(content.as_bytes());
        Self {
            path,
            version,
            name,
            content,
            checksum,
        }
    }

    /// Read and parse the migration file at `path`
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the file name is invalid, the file cannot be read,
    /// or its content is not UTF-8.
    pub fn read(path: &Path) -> Result<Self, StoreError> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StoreError::InvalidFileName(path.display().to_string()))?;
        let (version, name) = Self::parse_filename(filename)?;

        let bytes = fs::read(path).map_err(|source| StoreError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let checksum = digest(&bytes);
        let content = String::from_utf8(bytes).map_err(|_| StoreError::Encoding {
            path: path.to_path_buf(),
        })?;

        Ok(Self {
            path: path.to_path_buf(),
            version,
            name,
            content,
            checksum,
        })
    }

    /// Parse migration file name to extract version and name
    ///
    /// Expected format: `{YYYYMMDDHHMMSS}_{name}.sql`
    ///
    /// # Example
    /// - `20240120120000_create_users_table.sql` → version: "20240120120000", name: "create_users_table"
    ///
    /// # Errors
    ///
    /// Returns `StoreError::InvalidFileName` if the name does not match.
    pub fn parse_filename(filename: &str) -> Result<(String, String), StoreError> {
        let caps = FILE_NAME
            .captures(filename)
            .ok_or_else(|| StoreError::InvalidFileName(filename.to_string()))?;
        Ok((caps[1].to_string(), caps[2].to_string()))
    }

    /// Migration id, `{version}_{name}`
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}_{}", self.version, self.name)
    }

    /// Split the content into up and down blocks
    #[must_use]
    pub fn script(&self) -> MigrationScript {
        MigrationScript::parse(&self.content)
    }
}
