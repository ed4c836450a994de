//! Store configuration module.
//!
//! This module provides configuration loading for the record manager and
//! the tables built on top of it, from environment variables.
//!
//! # Environment Variables
//!
//! - `XDBM_DATA_DIRECTORY`: Directory where store files are kept (default: `./data`)
//! - `XDBM_CACHE_PAGES`: Number of clean pages kept in the block cache (default: `1024`)
//! - `XDBM_TXNS_IN_LOG`: Committed transactions buffered in the log before a checkpoint (default: `10`)
//! - `XDBM_DUP_LIMIT`: Values held inline per key before moving to a nested tree (default: `512`)
//! - `XDBM_BTREE_ORDER`: Maximum entries per B-tree node (default: `32`)
//! - `XDBM_DISABLE_TRANSACTIONS`: Write pages straight to the data file, no log (default: `false`)
//!
//! # Invariants
//!
//! - `cache_pages`, `txns_in_log` and `duplicate_limit` are at least 1
//! - `btree_order` is at least [`StoreConfig::MIN_BTREE_ORDER`]

use std::path::PathBuf;

/// Record manager and table configuration.
///
/// # Post-conditions
///
/// When constructed via `from_env()` or `default()` every numeric field is
/// in its valid range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory where `<name>.db` and `<name>.lg` live.
    pub data_directory: PathBuf,
    /// Soft bound on the number of cached pages.
    /// Dirty pages and pages with unflushed commits are never evicted.
    pub cache_pages: usize,
    /// Commits buffered in the log before the page images are written back.
    pub txns_in_log: usize,
    /// Duplicate values stored inline before a key's values move into a nested tree.
    pub duplicate_limit: usize,
    /// Maximum number of entries in a B-tree node.
    pub btree_order: usize,
    /// Skip the transaction log entirely.
    pub disable_transactions: bool,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable is missing.
    MissingEnvVar(String),
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingEnvVar(name) => {
                write!(f, "missing required environment variable: {name}")
            }
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_directory: PathBuf::from(Self::DEFAULT_DATA_DIRECTORY),
            cache_pages: Self::DEFAULT_CACHE_PAGES,
            txns_in_log: Self::DEFAULT_TXNS_IN_LOG,
            duplicate_limit: Self::DEFAULT_DUPLICATE_LIMIT,
            btree_order: Self::DEFAULT_BTREE_ORDER,
            disable_transactions: false,
        }
    }
}

impl StoreConfig {
    /// Default data directory.
    pub const DEFAULT_DATA_DIRECTORY: &'static str = "./data";
    /// Default block cache size in pages.
    pub const DEFAULT_CACHE_PAGES: usize = 1024;
    /// Default number of commits buffered before a checkpoint.
    pub const DEFAULT_TXNS_IN_LOG: usize = 10;
    /// Default inline duplicate threshold.
    pub const DEFAULT_DUPLICATE_LIMIT: usize = 512;
    /// Default B-tree node capacity.
    pub const DEFAULT_BTREE_ORDER: usize = 32;
    /// Smallest node capacity that still leaves room to split and merge.
    pub const MIN_BTREE_ORDER: usize = 4;

    /// Load configuration from environment variables.
    ///
    /// Unset variables fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparsable or out-of-range value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_directory = std::env::var("XDBM_DATA_DIRECTORY")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(Self::DEFAULT_DATA_DIRECTORY));

        Ok(Self {
            data_directory,
            cache_pages: load_usize("XDBM_CACHE_PAGES", Self::DEFAULT_CACHE_PAGES, 1)?,
            txns_in_log: load_usize("XDBM_TXNS_IN_LOG", Self::DEFAULT_TXNS_IN_LOG, 1)?,
            duplicate_limit: load_usize("XDBM_DUP_LIMIT", Self::DEFAULT_DUPLICATE_LIMIT, 1)?,
            btree_order: load_usize(
                "XDBM_BTREE_ORDER",
                Self::DEFAULT_BTREE_ORDER,
                Self::MIN_BTREE_ORDER,
            )?,
            disable_transactions: load_bool("XDBM_DISABLE_TRANSACTIONS")?,
        })
    }

    #[must_use]
    pub fn with_data_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.data_directory = directory.into();
        self
    }

    #[must_use]
    pub const fn with_cache_pages(mut self, pages: usize) -> Self {
        self.cache_pages = if pages == 0 { 1 } else { pages };
        self
    }

    #[must_use]
    pub const fn with_txns_in_log(mut self, txns: usize) -> Self {
        self.txns_in_log = if txns == 0 { 1 } else { txns };
        self
    }

    #[must_use]
    pub const fn with_duplicate_limit(mut self, limit: usize) -> Self {
        self.duplicate_limit = if limit == 0 { 1 } else { limit };
        self
    }

    /// Set the B-tree node capacity, clamped to [`Self::MIN_BTREE_ORDER`].
    #[must_use]
    pub const fn with_btree_order(mut self, order: usize) -> Self {
        self.btree_order = if order < Self::MIN_BTREE_ORDER {
            Self::MIN_BTREE_ORDER
        } else {
            order
        };
        self
    }

    #[must_use]
    pub const fn with_transactions_disabled(mut self, disabled: bool) -> Self {
        self.disable_transactions = disabled;
        self
    }
}

fn load_usize(name: &str, default: usize, min: usize) -> Result<usize, ConfigError> {
    let Ok(value) = std::env::var(name) else {
        return Ok(default);
    };
    let parsed = value.parse::<usize>().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        message: format!("'{value}' is not a non-negative integer"),
    })?;
    if parsed < min {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("must be at least {min}, got {parsed}"),
        });
    }
    Ok(parsed)
}

fn load_bool(name: &str) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" | "" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                name: name.to_string(),
                message: format!("'{value}' is not a boolean"),
            }),
        },
        Err(_) => Ok(false),
    }
}
