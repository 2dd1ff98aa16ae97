//! Up/down block extraction
//!
//! A migration file is plain text. Everything above the first line containing the
//! rollback marker is the up-block, everything below it the down-block:
//!
//! ```sql
//! -- Migration: add_index
//! CREATE INDEX idx_counters_name ON counters (name);
//!
//! -- @rollback
//! DROP INDEX idx_counters_name;
//! ```
//!
//! Comment lines are left out of both blocks. The dialect of the blocks is never
//! inspected.

/// Token that separates the up-block from the down-block (matched case-insensitively)
pub const ROLLBACK_MARKER: &str = "@rollback";

/// Prefix of comment lines, checked after leading whitespace
pub const COMMENT_PREFIX: &str = "--";

/// The executable parts of one migration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationScript {
    /// Forward block
    pub up: String,
    /// Reverse block; `None` for irreversible migrations
    pub down: Option<String>,
}

impl MigrationScript {
    /// Split migration content into its up and down blocks
    #[must_use]
    pub fn parse(content: &str) -> Self {
        let mut up_lines = Vec::new();
        let mut down_lines = Vec::new();
        let mut in_rollback = false;

        for line in content.split('\n') {
            if is_marker(line) {
                in_rollback = true;
                continue;
            }
            if is_comment(line) {
                continue;
            }
            if in_rollback {
                down_lines.push(line);
            } else {
                up_lines.push(line);
            }
        }

        let down = down_lines.join("\n");
        Self {
            up: up_lines.join("\n"),
            down: if down.trim().is_empty() { None } else { Some(down) },
        }
    }

    /// Whether the up-block contains anything besides whitespace
    #[must_use]
    pub fn has_up(&self) -> bool {
        !self.up.trim().is_empty()
    }

    /// Whether the migration can be rolled back
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        self.down.is_some()
    }
}

fn is_marker(line: &str) -> bool {
    line.to_lowercase().contains(ROLLBACK_MARKER)
}

fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with(COMMENT_PREFIX)
}
