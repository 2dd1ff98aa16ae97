//! Human and JSON output for the CLI

use colored::Colorize;
use serde_json::{json, Value};
use tidemark::migration::{Drift, LedgerEntry, MigrationError, MigrationFile, SkipReason};
use tidemark::{MigrationStatus, RollbackReport};

pub fn status_report(status: &MigrationStatus) -> String {
    let mut lines = vec![String::new(), "Migration Status".bold().to_string(), String::new()];

    if status.applied.is_empty() {
        lines.push(format!("{} None", "Applied:".green()));
    } else {
        lines.push(format!("{} ({})", "Applied:".green(), status.applied_count));
        for entry in &status.applied {
            lines.push(format!(
                "  {} {} ({})",
                "✓".green(),
                entry.id(),
                entry.applied_at.format("%Y-%m-%d %H:%M:%S UTC")
            ));
        }
    }

    lines.push(String::new());

    if status.pending.is_empty() {
        lines.push(format!("{} None", "Pending:".yellow()));
    } else {
        lines.push(format!("{} ({})", "Pending:".yellow(), status.pending_count));
        for pending in &status.pending {
            lines.push(format!("  {} {}", "…".yellow(), pending.id()));
        }
    }

    if !status.drifted.is_empty() {
        lines.push(String::new());
        lines.push(drift_report(&status.drifted));
    }

    if !status.missing.is_empty() {
        lines.push(String::new());
        lines.push(format!("{} ({})", "Missing files:".red(), status.missing.len()));
        for entry in &status.missing {
            lines.push(format!("  {} {}", "✗".red(), entry.id()));
        }
    }

    lines.push(String::new());
    lines.push(format!(
        "Summary: {} applied, {} pending",
        status.applied_count, status.pending_count
    ));
    lines.join("\n")
}

/// The `{applied, pending, applied_migrations, pending_migrations}` status shape
pub fn status_json(status: &MigrationStatus) -> Value {
    json!({
        "applied": status.applied_count,
        "pending": status.pending_count,
        "applied_migrations": status.applied_versions(),
        "pending_migrations": status.pending_versions(),
        "drifted": status.drifted,
        "missing": status.missing.iter().map(LedgerEntry::id).collect::<Vec<_>>(),
    })
}

pub fn drift_report(drifted: &[Drift]) -> String {
    let mut lines = vec![format!(
        "{} ({})",
        "Modified after apply:".red(),
        drifted.len()
    )];
    for drift in drifted {
        lines.push(format!(
            "  {} {}_{} (stored {}, current {})",
            "!".red(),
            drift.version,
            drift.name,
            short(&drift.stored),
            short(&drift.current)
        ));
    }
    lines.join("\n")
}

pub fn migrate_plan(files: &[MigrationFile]) -> String {
    if files.is_empty() {
        return "No pending migrations to apply".to_string();
    }
    let mut lines = vec![format!("Would apply {} migration(s):", files.len())];
    for (i, file) in files.iter().enumerate() {
        lines.push(format!("  {}. {}", i + 1, file.id()));
    }
    lines.join("\n")
}

pub fn rollback_plan(entries: &[LedgerEntry]) -> String {
    if entries.is_empty() {
        return "No applied migrations to rollback".to_string();
    }
    let mut lines = vec![format!("Would rollback {} migration(s):", entries.len())];
    for (i, entry) in entries.iter().enumerate() {
        lines.push(format!("  {}. {}", i + 1, entry.id()));
    }
    lines.join("\n")
}

pub fn applied_report(applied: &[String]) -> String {
    if applied.is_empty() {
        return format!("{} No migrations to apply", "✓".green());
    }
    let mut lines = vec![format!(
        "{} Applied {} migration(s):",
        "✓".green(),
        applied.len()
    )];
    lines.extend(applied.iter().map(|id| format!("  {id}")));
    lines.join("\n")
}

pub fn rollback_report(report: &RollbackReport) -> String {
    let mut lines = Vec::new();
    if report.reversed.is_empty() {
        lines.push(format!("{} No migrations rolled back", "✓".green()));
    } else {
        lines.push(format!(
            "{} Rolled back {} migration(s):",
            "✓".green(),
            report.reversed.len()
        ));
        lines.extend(report.reversed.iter().map(|id| format!("  {id}")));
    }
    for skipped in &report.skipped {
        let reason = match skipped.reason {
            SkipReason::MissingFile => "migration file not found",
            SkipReason::Irreversible => "no rollback SQL",
        };
        lines.push(format!(
            "{} Skipped {}_{}: {reason}",
            "!".yellow(),
            skipped.version,
            skipped.name
        ));
    }
    lines.join("\n")
}

/// Details for one version, or a summary when `version` is `None`
///
/// `version` may be a bare version or a `{version}_{name}` id.
///
/// # Errors
///
/// Returns `MigrationError::UnknownVersion` if no applied or pending migration matches.
pub fn migration_info(status: &MigrationStatus, version: Option<&str>) -> Result<String, MigrationError> {
    let Some(requested) = version else {
        let mut lines = vec![
            String::new(),
            "Migration System Information".bold().to_string(),
            String::new(),
            format!("Total Migrations: {}", status.applied_count + status.pending_count),
            format!("Applied: {}", status.applied_count),
            format!("Pending: {}", status.pending_count),
        ];
        if let Some(latest) = status.latest_applied_version() {
            lines.push(format!("Latest Applied Version: {latest}"));
        }
        if let Some(next) = status.next_pending_version() {
            lines.push(format!("Next Pending Version: {next}"));
        }
        return Ok(lines.join("\n"));
    };

    let wanted = requested.split('_').next().unwrap_or_default();

    if let Some(entry) = status.applied.iter().find(|e| e.version == wanted) {
        let mut lines = vec![
            String::new(),
            "Migration Information".bold().to_string(),
            String::new(),
            format!("Version: {}", entry.version),
            format!("Name: {}", entry.name),
            format!("Checksum: {}", entry.checksum),
            format!("Applied At: {}", entry.applied_at.format("%Y-%m-%d %H:%M:%S UTC")),
        ];
        if let Some(drift) = status.drifted.iter().find(|d| d.version == wanted) {
            lines.push(format!("Current Checksum: {} {}", drift.current, "(modified)".red()));
        }
        lines.push("Status: Applied".to_string());
        return Ok(lines.join("\n"));
    }

    if let Some(pending) = status.pending.iter().find(|p| p.version == wanted) {
        let lines = [
            String::new(),
            "Migration Information (Pending)".bold().to_string(),
            String::new(),
            format!("Version: {}", pending.version),
            format!("Name: {}", pending.name),
            format!("Checksum: {}", pending.checksum),
            format!("Path: {}", pending.path.display()),
            "Status: Pending".to_string(),
        ];
        return Ok(lines.join("\n"));
    }

    Err(MigrationError::UnknownVersion(requested.to_string()))
}

fn short(checksum: &str) -> &str {
    checksum.get(..12).unwrap_or(checksum)
}
