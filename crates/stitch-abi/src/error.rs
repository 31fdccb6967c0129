//! Contract-level errors raised by the dispatch layer and the allocator.
//!
//! None of these ever travel across the boundary. At the `extern "C"` entry
//! points they are handed to [`crate::contract::violation`]; the fallible Rust
//! counterparts return them so tests and Rust callers can observe them.

use strum::Display;
use thiserror::Error;

/// The four foreign callback signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CallbackKind {
    /// Build completion for asynchronous builds.
    BuildAsync,
    /// Plugin setup for one build phase.
    PluginBuild,
    /// Plugin state cleanup.
    PluginDestructor,
    /// Plugin start hook.
    PluginOnStart,
}

/// Top-level records tracked by the allocation ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RecordKind {
    /// A [`crate::records::BuildResult`].
    BuildResult,
    /// A [`crate::records::ContextResult`].
    ContextResult,
    /// A [`crate::records::PluginOnStartResult`].
    PluginOnStartResult,
}

/// Errors raised while invoking a foreign callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// A dispatch was requested with a null function pointer.
    #[error("null {kind} callback passed to dispatch")]
    NullCallback {
        /// Signature the dispatch was made for.
        kind: CallbackKind,
    },
}

/// Errors raised while releasing a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReleaseError {
    /// The address is not a live record: it was already released, or it was
    /// never produced by the allocator.
    #[error("{kind} at {address:#x} is not live (double release or foreign record)")]
    UnknownRecord {
        /// Kind the caller tried to release.
        kind: RecordKind,
        /// Address passed to the release.
        address: usize,
    },

    /// The address is live but was allocated as a different record kind.
    #[error("record at {address:#x} is a {found}, not a {expected}")]
    KindMismatch {
        /// Kind the caller tried to release.
        expected: RecordKind,
        /// Kind the ledger recorded at allocation.
        found: RecordKind,
        /// Address passed to the release.
        address: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_callback_names_the_signature() {
        let error = DispatchError::NullCallback {
            kind: CallbackKind::PluginOnStart,
        };
        let message = error.to_string();
        assert!(
            message.contains("plugin_on_start"),
            "expected kind in message: {message}"
        );
    }

    #[test]
    fn unknown_record_reports_address_in_hex() {
        let error = ReleaseError::UnknownRecord {
            kind: RecordKind::PluginOnStartResult,
            address: 0xbeef,
        };
        let message = error.to_string();
        assert!(message.contains("0xbeef"), "expected address: {message}");
        assert!(
            message.contains("plugin_on_start_result"),
            "expected kind: {message}"
        );
    }
}
