//! Contract errors raised by the engine's handle-based surface.

use stitch_abi::DispatchError;
use strum::Display;
use thiserror::Error;

/// Kinds of handle issued by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum HandleKind {
    /// Build options under construction.
    Options,
    /// A registered plugin.
    Plugin,
    /// A build context.
    Context,
    /// A plugin setup scope, valid only during the setup callback.
    Build,
}

/// Misuse of the engine surface. At the `extern "C"` entry points these are
/// contract violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The handle was never issued, or its object is gone.
    #[error("unknown {kind} handle {handle}")]
    UnknownHandle {
        /// Expected handle kind.
        kind: HandleKind,
        /// Handle value supplied.
        handle: u64,
    },

    /// A required callback was null.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// A required output pointer was null.
    #[error("null output pointer passed to {operation}")]
    NullOutput {
        /// Entry point that received it.
        operation: &'static str,
    },
}

impl EngineError {
    pub(crate) const fn unknown(kind: HandleKind, handle: u64) -> Self {
        Self::UnknownHandle { kind, handle }
    }
}
