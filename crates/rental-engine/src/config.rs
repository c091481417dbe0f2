//! # Engine Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment variables (highest)                                    │
//! │     RENTAL_DATABASE_PATH, RENTAL_DB_MAX_CONNECTIONS,                   │
//! │     RENTAL_AVAILABILITY_TIMEOUT_MS, RENTAL_SYNC_POLL_INTERVAL_SECS,    │
//! │     RENTAL_SYNC_BATCH_SIZE, RENTAL_SYNC_MAX_ATTEMPTS, RENTAL_LOG_LEVEL │
//! │                        │                                                │
//! │                        ▼                                                │
//! │  2. Config file                                                        │
//! │     explicit path, or <platform config dir>/rental.toml                │
//! │                        │                                                │
//! │                        ▼                                                │
//! │  3. Defaults (lowest)                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # rental.toml
//! [database]
//! path = "/var/lib/rental/rental.db"
//! max_connections = 5
//!
//! [availability]
//! check_timeout_ms = 2000
//!
//! [vehicle_sync]
//! initial_backoff_ms = 100
//! max_elapsed_ms = 2000
//! poll_interval_secs = 5
//! batch_size = 50
//! max_attempts = 10
//! retention_days = 7
//!
//! [logging]
//! level = "info"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use rental_db::DbConfig;

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path. `:memory:` gives a throwaway database.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./rental.db")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseSettings {
    /// Pool configuration for [`rental_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        if self.path.as_os_str() == ":memory:" {
            DbConfig::in_memory()
        } else {
            DbConfig::new(&self.path).max_connections(self.max_connections)
        }
    }
}

// =============================================================================
// Availability Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilitySettings {
    /// Upper bound on one availability query. A check that takes longer is
    /// reported as Unknown.
    #[serde(default = "default_check_timeout")]
    pub check_timeout_ms: u64,
}

fn default_check_timeout() -> u64 {
    2000
}

impl Default for AvailabilitySettings {
    fn default() -> Self {
        AvailabilitySettings {
            check_timeout_ms: default_check_timeout(),
        }
    }
}

impl AvailabilitySettings {
    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }
}

// =============================================================================
// Vehicle Sync Settings
// =============================================================================

/// How vehicle status writes are retried.
///
/// The dispatcher retries right after a commit for at most
/// `max_elapsed_ms`. Whatever is still pending is picked up by the worker
/// every `poll_interval_secs`, until an entry has failed `max_attempts`
/// times. Applied entries are deleted after `retention_days`; 0 keeps them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleSyncSettings {
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_elapsed")]
    pub max_elapsed_ms: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_initial_backoff() -> u64 {
    100
}

fn default_max_elapsed() -> u64 {
    2000
}

fn default_poll_interval() -> u64 {
    5
}

fn default_batch_size() -> u32 {
    50
}

fn default_max_attempts() -> i64 {
    10
}

fn default_retention_days() -> u32 {
    7
}

impl Default for VehicleSyncSettings {
    fn default() -> Self {
        VehicleSyncSettings {
            initial_backoff_ms: default_initial_backoff(),
            max_elapsed_ms: default_max_elapsed(),
            poll_interval_secs: default_poll_interval(),
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
            retention_days: default_retention_days(),
        }
    }
}

impl VehicleSyncSettings {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_elapsed(&self) -> Duration {
        Duration::from_millis(self.max_elapsed_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

// =============================================================================
// Logging Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default `tracing` filter directive. `RUST_LOG` wins over it.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            level: default_log_level(),
        }
    }
}

// =============================================================================
// Main Config
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub availability: AvailabilitySettings,

    #[serde(default)]
    pub vehicle_sync: VehicleSyncSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl EngineConfig {
    /// Loads configuration from file and environment.
    ///
    /// ## Loading Order
    /// 1. Start with defaults
    /// 2. Load from config file (if exists)
    /// 3. Override with environment variables
    /// 4. Validate
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| EngineError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(EngineError::InvalidConfig("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(EngineError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.availability.check_timeout_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "availability.check_timeout_ms must be greater than 0".into(),
            ));
        }

        let sync = &self.vehicle_sync;
        if sync.batch_size == 0 {
            return Err(EngineError::InvalidConfig(
                "vehicle_sync.batch_size must be greater than 0".into(),
            ));
        }
        if sync.poll_interval_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "vehicle_sync.poll_interval_secs must be greater than 0".into(),
            ));
        }
        if sync.max_attempts < 1 {
            return Err(EngineError::InvalidConfig(
                "vehicle_sync.max_attempts must be at least 1".into(),
            ));
        }
        if sync.initial_backoff_ms > sync.max_elapsed_ms {
            return Err(EngineError::InvalidConfig(
                "vehicle_sync.initial_backoff_ms must not exceed max_elapsed_ms".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("RENTAL_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(max) = std::env::var("RENTAL_DB_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse::<u32>() {
                self.database.max_connections = n;
            }
        }

        if let Ok(ms) = std::env::var("RENTAL_AVAILABILITY_TIMEOUT_MS") {
            if let Ok(n) = ms.parse::<u64>() {
                self.availability.check_timeout_ms = n;
            }
        }

        if let Ok(secs) = std::env::var("RENTAL_SYNC_POLL_INTERVAL_SECS") {
            if let Ok(n) = secs.parse::<u64>() {
                self.vehicle_sync.poll_interval_secs = n;
            }
        }

        if let Ok(size) = std::env::var("RENTAL_SYNC_BATCH_SIZE") {
            if let Ok(n) = size.parse::<u32>() {
                self.vehicle_sync.batch_size = n;
            }
        }

        if let Ok(attempts) = std::env::var("RENTAL_SYNC_MAX_ATTEMPTS") {
            if let Ok(n) = attempts.parse::<i64>() {
                self.vehicle_sync.max_attempts = n;
            }
        }

        if let Ok(level) = std::env::var("RENTAL_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Default config file location (platform-specific).
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "rental", "engine")
            .map(|dirs| dirs.config_dir().join("rental.toml"))
    }
}
