//! Default values applied when neither a file nor the environment sets them.

use crate::logging::LogFormat;

/// Default log filter expression.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Default number of worker threads a single build spreads entry points over.
pub const DEFAULT_WORKER_THREADS: usize = 4;

/// Default number of hex characters kept from an output file's content hash.
pub const DEFAULT_HASH_LENGTH: usize = 16;

/// Shortest accepted hash length.
pub const MIN_HASH_LENGTH: usize = 8;

/// Longest accepted hash length (a full SHA-256 digest in hex).
pub const MAX_HASH_LENGTH: usize = 64;

/// Program name handed to the layered loader when no command line is given.
pub const PROGRAM_NAME: &str = "stitch";

/// Environment variable naming a TOML configuration file.
pub const CONFIG_PATH_ENV: &str = "STITCH_CONFIG_PATH";

/// Environment variable overriding the log filter.
pub const LOG_FILTER_ENV: &str = "STITCH_LOG_FILTER";

/// Environment variable overriding the log format.
pub const LOG_FORMAT_ENV: &str = "STITCH_LOG_FORMAT";

/// Environment variable overriding the worker thread count.
pub const WORKER_THREADS_ENV: &str = "STITCH_WORKER_THREADS";

/// Environment variable overriding the hash length.
pub const HASH_LENGTH_ENV: &str = "STITCH_HASH_LENGTH";

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

/// Default worker thread count.
#[must_use]
pub const fn default_worker_threads() -> usize {
    DEFAULT_WORKER_THREADS
}

/// Default hash length.
#[must_use]
pub const fn default_hash_length() -> usize {
    DEFAULT_HASH_LENGTH
}
