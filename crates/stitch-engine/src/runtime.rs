//! Engine-wide configuration.
//!
//! The configuration is fixed the first time it is needed. Embedders that
//! want specific values call [`configure`] before their first build;
//! otherwise it is loaded from the configuration file and `STITCH_*`
//! environment variables.

use once_cell::sync::OnceCell;
use stitch_config::Config;
use tracing::{debug, warn};

/// Tracing target for engine runtime state.
const RUNTIME_TARGET: &str = "stitch_engine::runtime";

static CONFIG: OnceCell<Config> = OnceCell::new();

/// Installs the engine configuration.
///
/// Returns the rejected value when a configuration is already in place.
///
/// # Errors
///
/// Returns `Err(config)` if the configuration was already fixed.
pub fn configure(config: Config) -> Result<(), Config> {
    CONFIG.set(config)?;
    debug!(target: RUNTIME_TARGET, "engine configuration installed");
    Ok(())
}

/// Returns the engine configuration, loading it from the environment on
/// first use.
#[must_use]
pub fn config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::discover().unwrap_or_else(|error| {
            warn!(target: RUNTIME_TARGET, %error, "invalid configuration; using defaults");
            Config::default()
        })
    })
}
