//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod storage;
mod sync;

pub use storage::{StorageConfig, StorageType, DEFAULT_SQLITE_PATH};
pub use sync::{
    SyncConfig, DEFAULT_POLL_INTERVAL_SECS, DEFAULT_PUSH_INTERVAL_SECS, DEFAULT_PUSH_TIMEOUT_SECS,
};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "silo-ledger.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "SILO_LEDGER_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "SILO_LEDGER";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "SILO_LEDGER_LOG";

use serde::Deserialize;

use crate::model::{ConversionFactors, Quantity, Silo};

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local ledger storage.
    pub storage: StorageConfig,
    /// Remote sync.
    pub sync: SyncConfig,
    /// Kilograms per counted bucket / wagon.
    pub conversion: ConversionFactors,
    /// Silos inserted on first start.
    pub seed: SeedConfig,
}

/// Silos to create when the local silo collection is empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub silos: Vec<SiloSeed>,
}

/// Configured silo definition.
#[derive(Debug, Clone, Deserialize)]
pub struct SiloSeed {
    pub id: String,
    pub name: String,
    #[serde(rename = "type", default)]
    pub silo_type: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    /// Capacity in kilograms.
    #[serde(default)]
    pub capacity: Option<Quantity>,
    #[serde(default)]
    pub location: Option<String>,
}

impl SiloSeed {
    pub fn to_silo(&self) -> Silo {
        Silo {
            silo_type: self.silo_type.clone(),
            content_type: self.content_type.clone(),
            capacity: self.capacity,
            location: self.location.clone(),
            ..Silo::new(self.id.clone(), self.name.clone())
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `silo-ledger.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }

    /// Create config for testing: in-memory storage, no remote.
    pub fn for_test() -> Self {
        Self {
            storage: StorageConfig::in_memory(),
            ..Self::default()
        }
    }

    /// Configured seed silos as ledger records.
    pub fn seed_silos(&self) -> Vec<Silo> {
        self.seed.silos.iter().map(SiloSeed::to_silo).collect()
    }
}
