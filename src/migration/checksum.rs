//! Checksum calculation for migration files

use crate::migration::MigrationError;
use sha2::{Digest, Sha256};

/// Calculate the SHA-256 checksum of migration file content
///
/// The digest covers the byte-identical file, comment lines and rollback marker
/// included, so any edit to an applied file shows up as drift.
///
/// Returns the 64-character lowercase hexadecimal representation.
#[must_use]
pub fn digest(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Validate a freshly computed checksum against the one stored in the ledger
///
/// # Errors
///
/// Returns `MigrationError::ChecksumMismatch` naming `version` and `name` if the
/// checksums differ.
pub fn validate_checksum(
    version: &str,
    name: &str,
    stored_checksum: &str,
    current_checksum: &str,
) -> Result<(), MigrationError> {
    if stored_checksum == current_checksum {
        Ok(())
    } else {
        Err(MigrationError::ChecksumMismatch {
            version: version.to_string(),
            name: name.to_string(),
            stored: stored_checksum.to_string(),
            current: current_checksum.to_string(),
        })
    }
}
