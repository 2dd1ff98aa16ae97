//! Command-line arguments

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tidemark-migrate")]
#[command(about = "Migration management tool for tidemark")]
#[command(version)]
pub struct Cli {
    /// Database connection URL (falls back to TIDEMARK_DATABASE_URL, DATABASE_URL, then config)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Migrations directory path (default: config value, then "migrations")
    #[arg(long, global = true)]
    pub migrations_dir: Option<PathBuf>,

    /// Ledger table name (default: config value, then "schema_migrations")
    #[arg(long, global = true)]
    pub ledger_table: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Create a new migration file
    #[command(alias = "generate")]
    Create {
        /// Migration name (e.g., "create_users_table")
        name: String,
    },

    /// Apply pending migrations
    Up {
        /// Apply pending migrations up to and including this version
        #[arg(long)]
        target: Option<String>,

        /// Dry run - show what would be executed without running
        #[arg(long)]
        dry_run: bool,
    },

    /// Rollback migrations
    Down {
        /// Number of migrations to rollback
        #[arg(long, default_value_t = 1)]
        steps: usize,

        /// Dry run - show what would be rolled back
        #[arg(long)]
        dry_run: bool,
    },

    /// Show migration status (applied vs pending)
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate checksums of applied migrations
    Validate,

    /// Show detailed migration information
    Info {
        /// Show information for a specific migration version
        #[arg(long)]
        version: Option<String>,
    },
}

impl Commands {
    /// Whether the command needs a database connection
    #[must_use]
    pub fn needs_database(&self) -> bool {
        !matches!(self, Commands::Create { .. })
    }
}
