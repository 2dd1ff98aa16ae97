//! Migration configuration
//!
//! [`MigrateConfig::load`] reads the `[migrate]` section of `config/config.toml`
//! (optional) and overlays environment variables prefixed with `TIDEMARK__MIGRATE__`,
//! e.g. `TIDEMARK__MIGRATE__LEDGER_TABLE=deploy_migrations`.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "config/config.toml";
const SECTION: &str = "migrate";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MigrateConfig {
    /// Database connection URL; usually supplied by the CLI or `DATABASE_URL`
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
    #[serde(default = "default_ledger_table")]
    pub ledger_table: String,
    /// Per-transaction statement timeout; `None` waits indefinitely
    #[serde(default)]
    pub statement_timeout_seconds: Option<u64>,
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_ledger_table() -> String {
    crate::migration::DEFAULT_LEDGER_TABLE.to_string()
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            migrations_dir: default_migrations_dir(),
            ledger_table: default_ledger_table(),
            statement_timeout_seconds: None,
        }
    }
}

impl MigrateConfig {
    /// Load the configuration from `config/config.toml`, falling back to env vars.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a present source cannot be parsed or holds invalid values.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix("TIDEMARK").separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // File present but unreadable: retry with env only
                log::warn!("Failed to load {CONFIG_FILE}, falling back to env: {err}");
                Config::builder()
                    .add_source(Environment::with_prefix("TIDEMARK").separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {err}, then env-only error: {env_err}"
                        ))
                    })?
            }
        };

        Self::from_settings(&settings)
    }

    /// Load the configuration from an explicit file, without environment overrides
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let settings = Config::builder().add_source(File::from(path)).build()?;
        Self::from_settings(&settings)
    }

    fn from_settings(settings: &Config) -> Result<Self, ConfigError> {
        match settings.get::<MigrateConfig>(SECTION) {
            Ok(cfg) => Ok(cfg),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "Migration configuration could not be loaded: {e}"
            ))),
        }
    }

    /// Statement timeout as a `Duration`
    #[must_use]
    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_seconds.map(Duration::from_secs)
    }
}
