//! Reusable build contexts.

use std::error::Error;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use stitch_abi::dispatch::stitch_context_result_destroy;
use stitch_engine::ffi::{
    stitch_context_build, stitch_context_build_async, stitch_context_cancel,
    stitch_context_create, stitch_context_destroy,
};
use tracing::debug;

use crate::build::{BuildFuture, BuildOptions, BuildResult, dispatch_with, start_async};
use crate::message::Message;
use crate::plugin::{HookScope, collect_setups};

/// Tracing target for context lifecycle events.
const CONTEXT_TARGET: &str = "stitch::context";

/// Engine context handle, destroyed when the last owner lets go.
///
/// In-flight asynchronous builds hold a reference so the context outlives
/// them. The start hooks its plugins registered are freed right after the
/// engine context.
#[derive(Debug)]
pub(crate) struct ContextHandle {
    handle: u64,
    _hooks: HookScope,
}

impl ContextHandle {
    pub(crate) const fn handle(&self) -> u64 {
        self.handle
    }
}

impl Drop for ContextHandle {
    fn drop(&mut self) {
        debug!(target: CONTEXT_TARGET, context = self.handle, "destroying context");
        stitch_context_destroy(self.handle);
    }
}

/// Problems that prevented a context from being created.
pub struct ContextError {
    record: NonNull<stitch_abi::ContextResult>,
}

// SAFETY: the record is immutable and exclusively owned by this value.
unsafe impl Send for ContextError {}
// SAFETY: as above; shared access only reads.
unsafe impl Sync for ContextError {}

impl ContextError {
    /// The reported problems, in the order the engine found them.
    #[must_use]
    pub fn messages(&self) -> &[Message<'_>] {
        // SAFETY: the record stays live until `drop`.
        let raw = unsafe { self.record.as_ref() };
        // SAFETY: the messages live as long as `self`.
        unsafe { Message::slice(raw.messages, raw.messages_len) }
    }
}

impl fmt::Debug for ContextError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ContextError")
            .field("messages", &self.messages())
            .finish()
    }
}

impl fmt::Display for ContextError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("invalid build options")?;
        for (index, message) in self.messages().iter().enumerate() {
            let separator = if index == 0 { ": " } else { "; " };
            write!(formatter, "{separator}{message}")?;
        }
        Ok(())
    }
}

impl Error for ContextError {}

impl Drop for ContextError {
    fn drop(&mut self) {
        // SAFETY: this value owns the record and drops exactly once.
        unsafe { stitch_context_result_destroy(self.record.as_ptr()) };
    }
}

/// A build context. Plugins are set up once, when the context is created,
/// and every build reuses their hooks.
///
/// Dropping the context while asynchronous builds are running is allowed;
/// the engine context is destroyed once they report back.
#[derive(Debug)]
pub struct Context {
    handle: Arc<ContextHandle>,
}

impl Context {
    /// Creates a context from `options`.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when the options are invalid, for example when
    /// no entry point was added.
    pub fn new(options: &BuildOptions) -> Result<Self, ContextError> {
        let mut handle = 0;
        let (problems, hooks) = collect_setups(|| {
            // SAFETY: `handle` is valid for the write.
            unsafe { stitch_context_create(options.handle(), &raw mut handle) }
        });
        match NonNull::new(problems) {
            Some(record) => Err(ContextError { record }),
            None => Ok(Self {
                handle: Arc::new(ContextHandle {
                    handle,
                    _hooks: hooks,
                }),
            }),
        }
    }

    /// Runs a build on the calling thread.
    #[must_use]
    pub fn build(&self) -> BuildResult {
        // SAFETY: the engine hands over a fresh record.
        unsafe { BuildResult::from_record(stitch_context_build(self.handle.handle())) }
    }

    /// Runs a build on an engine thread.
    #[must_use]
    pub fn build_async(&self) -> BuildFuture {
        let handle = self.handle.handle();
        start_async(Some(Arc::clone(&self.handle)), |callback, data| {
            // SAFETY: `callback` consumes `data` exactly once.
            unsafe { stitch_context_build_async(handle, callback, data) };
        })
    }

    /// Runs a build on an engine thread and hands the result to
    /// `on_complete` on that thread.
    pub fn build_async_with<F>(&self, on_complete: F)
    where
        F: FnOnce(BuildResult) + Send + 'static,
    {
        let handle = self.handle.handle();
        dispatch_with(Some(Arc::clone(&self.handle)), on_complete, |callback, data| {
            // SAFETY: `callback` consumes `data` exactly once.
            unsafe { stitch_context_build_async(handle, callback, data) };
        });
    }

    /// Cancels the running builds, or the next build when none is running.
    ///
    /// A cancelled build reports a single "build was cancelled" error with
    /// id [`CANCELLED_ID`](crate::CANCELLED_ID). Builds started after the call
    /// are not affected.
    pub fn cancel_all(&self) {
        stitch_context_cancel(self.handle.handle());
    }
}
