//! Command handlers

use crate::cli::{Cli, Commands};
use crate::render;
use anyhow::{anyhow, Context, Result};
use colored::Colorize;
use tidemark::migration::MigrationStore;
use tidemark::{connect, DirectoryStore, Ledger, MigrateConfig, Migrator, PostgresExecutor};

/// Resolve configuration, connect if needed, and run the parsed command
///
/// # Errors
///
/// Returns any configuration, connection or migration error.
pub fn run(cli: Cli) -> Result<()> {
    let config = MigrateConfig::load().context("Failed to load configuration")?;

    let migrations_dir = cli.migrations_dir.clone().unwrap_or_else(|| config.migrations_dir.clone());
    let store = DirectoryStore::new(&migrations_dir);
    log::debug!("Using migrations directory {}", migrations_dir.display());

    if let Commands::Create { name } = &cli.command {
        return handle_create(&store, name);
    }

    let database_url = pick_database_url(
        cli.database_url.clone(),
        std::env::var("TIDEMARK_DATABASE_URL").ok(),
        std::env::var("DATABASE_URL").ok(),
        &config,
    )
    .ok_or_else(|| {
        anyhow!(
            "Database URL not provided. Use --database-url, set TIDEMARK_DATABASE_URL or \
             DATABASE_URL, or add database_url to the [migrate] config section."
        )
    })?;

    let client = connect(&database_url).context("Error connecting to database")?;
    let executor = PostgresExecutor::new(client).with_statement_timeout(config.statement_timeout());

    let table = cli.ledger_table.clone().unwrap_or_else(|| config.ledger_table.clone());
    let ledger = Ledger::with_table(&executor, &table)?;
    let migrator = Migrator::with_ledger(&store, &executor, ledger);

    execute(&migrator, &cli.command)
}

/// First non-empty source wins: flag, `TIDEMARK_DATABASE_URL`, `DATABASE_URL`, config file
#[must_use]
pub fn pick_database_url(
    flag: Option<String>,
    tidemark_env: Option<String>,
    database_env: Option<String>,
    config: &MigrateConfig,
) -> Option<String> {
    flag.or(tidemark_env)
        .or(database_env)
        .or_else(|| config.database_url.clone())
        .filter(|url| !url.trim().is_empty())
}

/// Run a database-backed command against an already wired migrator
///
/// # Errors
///
/// Returns the migration error of the underlying operation.
pub fn execute(migrator: &Migrator<'_>, command: &Commands) -> Result<()> {
    match command {
        Commands::Create { .. } => Err(anyhow!("create does not run against a database")),
        Commands::Up { target, dry_run } => handle_up(migrator, target.as_deref(), *dry_run),
        Commands::Down { steps, dry_run } => handle_down(migrator, *steps, *dry_run),
        Commands::Status { json } => handle_status(migrator, *json),
        Commands::Validate => handle_validate(migrator),
        Commands::Info { version } => handle_info(migrator, version.as_deref()),
    }
}

fn handle_create(store: &DirectoryStore, name: &str) -> Result<()> {
    let file = store.create(name)?;
    println!("{} Created migration: {}", "✓".green(), file.path.display());
    Ok(())
}

fn handle_up(migrator: &Migrator<'_>, target: Option<&str>, dry_run: bool) -> Result<()> {
    if dry_run {
        let plan = migrator.plan_migrate(target)?;
        println!("{}", render::migrate_plan(&plan));
        return Ok(());
    }

    log::info!("Applying migrations...");
    let applied = migrator.migrate(target)?;
    println!("{}", render::applied_report(&applied));
    Ok(())
}

fn handle_down(migrator: &Migrator<'_>, steps: usize, dry_run: bool) -> Result<()> {
    if dry_run {
        let plan = migrator.plan_rollback(steps)?;
        println!("{}", render::rollback_plan(&plan));
        return Ok(());
    }

    log::info!("Rolling back migrations...");
    let report = migrator.rollback(steps)?;
    println!("{}", render::rollback_report(&report));
    Ok(())
}

fn handle_status(migrator: &Migrator<'_>, json: bool) -> Result<()> {
    let status = migrator.status()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&render::status_json(&status))?);
    } else {
        println!("{}", render::status_report(&status));
    }
    Ok(())
}

fn handle_validate(migrator: &Migrator<'_>) -> Result<()> {
    log::info!("Validating checksums...");
    migrator.validate_checksums()?;
    println!("{} All checksums valid", "✓".green());
    Ok(())
}

fn handle_info(migrator: &Migrator<'_>, version: Option<&str>) -> Result<()> {
    let status = migrator.status()?;
    println!("{}", render::migration_info(&status, version)?);
    Ok(())
}
