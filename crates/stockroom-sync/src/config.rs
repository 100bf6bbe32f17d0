//! # Sync Configuration
//!
//! Where the store and the queue live, and how replay backs off.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     STOCKROOM_STORE_PATH=/srv/stockroom.db                             │
//! │     STOCKROOM_QUEUE_PATH=/var/lib/stockroom/queue.db                   │
//! │     STOCKROOM_START_OFFLINE=true                                       │
//! │     STOCKROOM_TX_ATTEMPTS=20                                           │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/stockroom/stockroom.toml (Linux)                         │
//! │     ~/Library/Application Support/com.stockroom.stockroom/... (macOS)  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # stockroom.toml
//! [store]
//! path = "/srv/stockroom/stockroom.db"
//! max_connections = 5
//! transaction_attempts = 10
//!
//! [queue]
//! path = "/home/jane/.local/share/stockroom/offline_queue.db"
//!
//! [replay]
//! initial_backoff_ms = 500
//! max_backoff_secs = 60
//! start_offline = false
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use stockroom_db::{DbConfig, DEFAULT_TRANSACTION_ATTEMPTS};

// =============================================================================
// Store Settings
// =============================================================================

/// The shared document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Optimistic retry budget for transactions such as mark-paid.
    #[serde(default = "default_transaction_attempts")]
    pub transaction_attempts: u32,
}

fn default_store_path() -> PathBuf {
    data_file("stockroom.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_transaction_attempts() -> u32 {
    DEFAULT_TRANSACTION_ATTEMPTS
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            path: default_store_path(),
            max_connections: default_max_connections(),
            transaction_attempts: default_transaction_attempts(),
        }
    }
}

// =============================================================================
// Queue Settings
// =============================================================================

/// The client-local durable queue. Must stay reachable when the store is not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSettings {
    #[serde(default = "default_queue_path")]
    pub path: PathBuf,
}

fn default_queue_path() -> PathBuf {
    data_file("offline_queue.db")
}

impl Default for QueueSettings {
    fn default() -> Self {
        QueueSettings {
            path: default_queue_path(),
        }
    }
}

// =============================================================================
// Replay Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaySettings {
    /// First delay after a halted replay (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Ceiling for the replay delay (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Start with the gate closed, queueing every mutation.
    #[serde(default)]
    pub start_offline: bool,
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    60
}

impl Default for ReplaySettings {
    fn default() -> Self {
        ReplaySettings {
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            start_offline: false,
        }
    }
}

impl ReplaySettings {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }
}

// =============================================================================
// Complete Configuration
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub replay: ReplaySettings,
}

impl SyncConfig {
    /// Loads configuration from defaults, the TOML file, then the environment.
    ///
    /// ## Loading Order
    /// 1. Start with defaults
    /// 2. Replace with the config file, if it exists
    /// 3. Apply `STOCKROOM_*` environment overrides
    /// 4. Validate
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
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

    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(())
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.store.transaction_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "transaction_attempts must be greater than 0".into(),
            ));
        }

        if self.store.max_connections == 0 {
            return Err(SyncError::InvalidConfig(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.replay.initial_backoff() > self.replay.max_backoff() {
            return Err(SyncError::InvalidConfig(format!(
                "initial_backoff_ms ({}) exceeds max_backoff_secs ({})",
                self.replay.initial_backoff_ms, self.replay.max_backoff_secs
            )));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `STOCKROOM_*` overrides read through `var`. Unparseable
    /// values are ignored.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(path) = var("STOCKROOM_STORE_PATH") {
            debug!(path = %path, "Overriding store path from environment");
            self.store.path = PathBuf::from(path);
        }

        if let Some(path) = var("STOCKROOM_QUEUE_PATH") {
            debug!(path = %path, "Overriding queue path from environment");
            self.queue.path = PathBuf::from(path);
        }

        if let Some(flag) = var("STOCKROOM_START_OFFLINE") {
            match flag.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.replay.start_offline = true,
                "0" | "false" | "no" => self.replay.start_offline = false,
                other => warn!(value = other, "Ignoring STOCKROOM_START_OFFLINE"),
            }
        }

        if let Some(attempts) = var("STOCKROOM_TX_ATTEMPTS") {
            if let Ok(n) = attempts.parse::<u32>() {
                self.store.transaction_attempts = n;
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("stockroom.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Pool settings for the document store.
    pub fn store_db_config(&self) -> DbConfig {
        DbConfig::new(self.store.path.clone())
            .max_connections(self.store.max_connections)
            .transaction_attempts(self.store.transaction_attempts)
    }

    /// Pool settings for the local queue database.
    pub fn queue_db_config(&self) -> DbConfig {
        DbConfig::new(self.queue.path.clone()).max_connections(1)
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "stockroom", "stockroom")
}

/// A file under the platform data dir, or the working directory without one.
fn data_file(name: &str) -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join(name))
        .unwrap_or_else(|| PathBuf::from(name))
}

// =============================================================================
// Unit Tests
// =============================================================================
