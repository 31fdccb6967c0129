//! Handling of ABI contract violations.
//!
//! Null callbacks, double releases and stale handles are programmer errors on
//! one side of the boundary. They are never reported through the data model;
//! the process fails loudly instead.

use std::fmt;

use tracing::error;

/// Tracing target for contract violations.
const CONTRACT_TARGET: &str = "stitch_abi::contract";

/// Logs a contract violation and terminates.
///
/// Debug builds panic so the message reaches the test harness; a panic
/// escaping an `extern "C"` entry point aborts the process. Release builds
/// abort directly.
///
/// # Panics
///
/// Always panics in debug builds.
pub fn violation(error: &dyn fmt::Display) -> ! {
    error!(target: CONTRACT_TARGET, %error, "ABI contract violated");
    if cfg!(debug_assertions) {
        panic!("ABI contract violated: {error}");
    }
    std::process::abort()
}
