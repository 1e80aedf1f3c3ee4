//! # Engine Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     STOCKBOOK_DB_PATH=/var/lib/stockbook/stockbook.db                  │
//! │     STOCKBOOK_LOCK_TIMEOUT_MS=2000                                     │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/stockbook/engine.toml (Linux)                            │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/var/lib/stockbook/stockbook.db"
//! max_connections = 5
//!
//! [locking]
//! lock_timeout_ms = 5000
//!
//! [numbering]
//! width = 6
//!
//! [numbering.prefixes]
//! invoice = "INV"
//! receipt = "RCP"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use stockbook_core::sequence::MAX_WIDTH;
use stockbook_core::SequenceKind;
use stockbook_db::DbConfig;

/// Path value that selects a private in-memory database.
pub const IN_MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("No config path available")]
    NoPath,
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file, or `:memory:`.
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    directories::ProjectDirs::from("com", "stockbook", "stockbook")
        .map(|dirs| dirs.data_dir().join("stockbook.db").to_string_lossy().into_owned())
        .unwrap_or_else(|| "stockbook.db".to_string())
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSettings {
    /// How long an operation waits for a product or account lock before
    /// failing with a retryable conflict.
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_ms: u64,
}

fn default_lock_timeout() -> u64 {
    5_000
}

impl Default for LockSettings {
    fn default() -> Self {
        LockSettings {
            lock_timeout_ms: default_lock_timeout(),
        }
    }
}

/// Per-kind document prefixes. The branch code is appended at issue time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefixSettings {
    #[serde(default = "default_invoice_prefix")]
    pub invoice: String,
    #[serde(default = "default_receipt_prefix")]
    pub receipt: String,
    #[serde(default = "default_adjustment_prefix")]
    pub adjustment: String,
    #[serde(default = "default_transfer_prefix")]
    pub transfer: String,
    #[serde(default = "default_payment_prefix")]
    pub payment: String,
}

fn default_invoice_prefix() -> String {
    SequenceKind::Invoice.default_prefix().to_string()
}
fn default_receipt_prefix() -> String {
    SequenceKind::Receipt.default_prefix().to_string()
}
fn default_adjustment_prefix() -> String {
    SequenceKind::Adjustment.default_prefix().to_string()
}
fn default_transfer_prefix() -> String {
    SequenceKind::Transfer.default_prefix().to_string()
}
fn default_payment_prefix() -> String {
    SequenceKind::Payment.default_prefix().to_string()
}

impl Default for PrefixSettings {
    fn default() -> Self {
        PrefixSettings {
            invoice: default_invoice_prefix(),
            receipt: default_receipt_prefix(),
            adjustment: default_adjustment_prefix(),
            transfer: default_transfer_prefix(),
            payment: default_payment_prefix(),
        }
    }
}

impl PrefixSettings {
    pub fn for_kind(&self, kind: SequenceKind) -> &str {
        match kind {
            SequenceKind::Invoice => &self.invoice,
            SequenceKind::Receipt => &self.receipt,
            SequenceKind::Adjustment => &self.adjustment,
            SequenceKind::Transfer => &self.transfer,
            SequenceKind::Payment => &self.payment,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberingSettings {
    /// Zero-padded digits in a document number.
    #[serde(default = "default_width")]
    pub width: usize,

    #[serde(default)]
    pub prefixes: PrefixSettings,
}

fn default_width() -> usize {
    6
}

impl Default for NumberingSettings {
    fn default() -> Self {
        NumberingSettings {
            width: default_width(),
            prefixes: PrefixSettings::default(),
        }
    }
}

// =============================================================================
// Engine Configuration
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub locking: LockSettings,

    #[serde(default)]
    pub numbering: NumberingSettings,
}

impl EngineConfig {
    /// Defaults with a private in-memory database. Used by tests and demos.
    pub fn in_memory() -> Self {
        EngineConfig {
            database: DatabaseSettings {
                path: IN_MEMORY_PATH.to_string(),
                max_connections: 1,
            },
            ..Default::default()
        }
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (engine.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
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

        config.apply_overrides(|key| std::env::var(key).ok());
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
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or(ConfigError::NoPath)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.path.trim().is_empty() {
            return Err(ConfigError::invalid("database.path", "must not be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::invalid(
                "database.max_connections",
                "must be greater than 0",
            ));
        }
        if self.locking.lock_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "locking.lock_timeout_ms",
                "must be greater than 0",
            ));
        }
        if self.numbering.width == 0 || self.numbering.width > MAX_WIDTH {
            return Err(ConfigError::invalid(
                "numbering.width",
                format!("must be between 1 and {}", MAX_WIDTH),
            ));
        }
        for kind in SequenceKind::ALL {
            if self.numbering.prefixes.for_kind(kind).trim().is_empty() {
                return Err(ConfigError::invalid(
                    &format!("numbering.prefixes.{}", kind),
                    "must not be empty",
                ));
            }
        }
        Ok(())
    }

    /// Applies `STOCKBOOK_*` overrides read through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("STOCKBOOK_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = path;
        }

        if let Some(max) = lookup("STOCKBOOK_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring invalid STOCKBOOK_MAX_CONNECTIONS"),
            }
        }

        if let Some(timeout) = lookup("STOCKBOOK_LOCK_TIMEOUT_MS") {
            match timeout.parse::<u64>() {
                Ok(ms) => {
                    debug!(ms, "Overriding lock timeout from environment");
                    self.locking.lock_timeout_ms = ms;
                }
                Err(_) => warn!(value = %timeout, "Ignoring invalid STOCKBOOK_LOCK_TIMEOUT_MS"),
            }
        }

        if let Some(width) = lookup("STOCKBOOK_NUMBER_WIDTH") {
            match width.parse::<usize>() {
                Ok(w) => self.numbering.width = w,
                Err(_) => warn!(value = %width, "Ignoring invalid STOCKBOOK_NUMBER_WIDTH"),
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "stockbook", "stockbook")
            .map(|dirs| dirs.config_dir().join("engine.toml"))
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.locking.lock_timeout_ms)
    }

    pub fn is_in_memory(&self) -> bool {
        self.database.path == IN_MEMORY_PATH
    }

    /// Database settings in the form the storage layer takes.
    pub fn db_config(&self) -> DbConfig {
        if self.is_in_memory() {
            DbConfig::in_memory()
        } else {
            DbConfig::new(&self.database.path).max_connections(self.database.max_connections)
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
