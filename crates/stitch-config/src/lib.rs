//! Configuration for the stitch engine and its host bindings.
//!
//! Values are layered by `ortho_config`: built-in defaults, then a TOML file
//! named by `--config-path` or `STITCH_CONFIG_PATH`, then `STITCH_*`
//! environment variables, then command-line flags. [`Config::resolve`] runs
//! the layering over explicit arguments and checks the result;
//! [`Config::discover`] does the same for an embedded engine, which has no
//! command line of its own and so only sees the file and environment layers.

pub mod defaults;
mod logging;

use std::ffi::OsString;
use std::sync::Arc;

use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::defaults::{
    MAX_HASH_LENGTH, MIN_HASH_LENGTH, PROGRAM_NAME, default_hash_length,
    default_log_filter_string, default_log_format, default_worker_threads,
};
pub use crate::logging::{LogFormat, LogFormatParseError};

/// Errors raised while loading or validating configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A configuration layer could not be read or merged.
    #[error("failed to load configuration: {source}")]
    Load {
        /// Error reported by the layered loader.
        #[source]
        source: Arc<OrthoError>,
    },

    /// The worker thread count is zero.
    #[error("worker thread count must be at least 1, got {threads}")]
    WorkerThreads {
        /// Rejected count.
        threads: usize,
    },

    /// The hash length lies outside the supported range.
    #[error("hash length {length} is outside {MIN_HASH_LENGTH}..={MAX_HASH_LENGTH}")]
    HashLength {
        /// Rejected length.
        length: usize,
    },
}

impl From<Arc<OrthoError>> for ConfigError {
    fn from(source: Arc<OrthoError>) -> Self {
        Self::Load { source }
    }
}

/// Engine and logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, OrthoConfig)]
#[serde(default)]
#[ortho_config(prefix = "STITCH")]
pub struct Config {
    /// Log filter expression (`tracing-subscriber` `EnvFilter` syntax).
    log_filter: String,
    /// Log output format.
    log_format: LogFormat,
    /// Worker threads a build spreads its entry points over.
    worker_threads: usize,
    /// Hex characters kept from output hashes.
    hash_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter_string(),
            log_format: default_log_format(),
            worker_threads: default_worker_threads(),
            hash_length: default_hash_length(),
        }
    }
}

impl Config {
    /// Loads configuration from the file and environment layers only.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a layer fails to load or a value is out
    /// of range.
    pub fn discover() -> Result<Self, ConfigError> {
        Self::resolve([PROGRAM_NAME])
    }

    /// Loads configuration from every layer, reading flags from `args`.
    ///
    /// The first argument is the program name, as with `std::env::args_os`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a layer fails to load or a value is out
    /// of range.
    pub fn resolve<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        Self::load_from_iter(args)?.validate()
    }

    /// Log filter expression (`tracing-subscriber` `EnvFilter` syntax).
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Number of worker threads a build spreads its entry points over.
    #[must_use]
    pub const fn worker_threads(&self) -> usize {
        self.worker_threads
    }

    /// Number of hex characters kept from output hashes.
    #[must_use]
    pub const fn hash_length(&self) -> usize {
        self.hash_length
    }

    /// Replaces the log filter.
    #[must_use]
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Replaces the log format.
    #[must_use]
    pub const fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    /// Replaces the worker thread count. Zero is treated as one.
    #[must_use]
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads.max(1);
        self
    }

    /// Replaces the hash length, clamped to the supported range.
    #[must_use]
    pub fn with_hash_length(mut self, length: usize) -> Self {
        self.hash_length = length.clamp(MIN_HASH_LENGTH, MAX_HASH_LENGTH);
        self
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.worker_threads == 0 {
            return Err(ConfigError::WorkerThreads {
                threads: self.worker_threads,
            });
        }
        if !(MIN_HASH_LENGTH..=MAX_HASH_LENGTH).contains(&self.hash_length) {
            return Err(ConfigError::HashLength {
                length: self.hash_length,
            });
        }
        Ok(self)
    }
}
