//! Cross-boundary data model and callback dispatch for the stitch engine.
//!
//! The `stitch-abi` crate defines everything that crosses the boundary between
//! the build engine and the process embedding it:
//!
//! - [`records`]: flat `#[repr(C)]` records (locations, notes, messages, output
//!   files, build results, plugin start results). Every buffer is paired with
//!   an explicit length; empty buffers are a null pointer and a zero length.
//! - [`owned`]: Rust-native mirrors of those records used by producers to
//!   build results and by consumers to copy them out.
//! - [`alloc`]: the allocator that turns owned data into records, and the
//!   ledger that makes double or foreign releases detectable.
//! - [`callbacks`] and [`dispatch`]: the four foreign callback signatures and
//!   the single trampoline through which each kind is invoked, plus the
//!   explicit destroy entry points.
//! - [`runtime`]: the idempotent process-wide initialisation hook.
//!
//! # Ownership
//!
//! Records are immutable snapshots. A record returned by a synchronous engine
//! call belongs to the caller until the matching destroy entry point runs. A
//! record delivered through [`dispatch::stitch_build_async_callback_dispatch`]
//! is only borrowed for the duration of the callback; the engine releases it
//! as soon as the dispatch returns.
//!
//! ```
//! use stitch_abi::alloc::{export_on_start_result, release_on_start_result};
//! use stitch_abi::owned::{MessageData, OnStartOutcome};
//!
//! let outcome = OnStartOutcome::default().with_error(MessageData::new("no config"));
//! let record = export_on_start_result(outcome);
//! // SAFETY: the record was produced by the allocator and is released once.
//! unsafe { release_on_start_result(record) }.expect("first release succeeds");
//! ```

pub mod alloc;
pub mod callbacks;
pub mod contract;
pub mod dispatch;
mod error;
pub mod owned;
pub mod raw;
pub mod records;
pub mod runtime;

pub use self::callbacks::{
    BuildAsyncCallback, PluginBuildCallback, PluginCallbackOnStart, PluginDestructor,
};
pub use self::error::{CallbackKind, DispatchError, RecordKind, ReleaseError};
pub use self::records::{
    BuildResult, ContextResult, Location, Message, Note, OutputFile, PluginOnStartResult,
};
