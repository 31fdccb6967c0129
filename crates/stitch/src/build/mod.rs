//! Build results and one-shot builds.

mod future;
mod options;

use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use stitch_abi::alloc::export_build_result;
use stitch_abi::dispatch::stitch_build_result_destroy;
use stitch_abi::owned::{BuildOutcome, OutputFileData};
use stitch_abi::raw;
use stitch_engine::ffi::{stitch_build, stitch_build_async};
use tracing::trace;

pub use self::future::BuildFuture;
pub(crate) use self::future::{dispatch_with, start_async};
pub use self::options::BuildOptions;
use crate::message::Message;
use crate::plugin::collect_setups;

/// Tracing target for host-side build handling.
const BUILD_TARGET: &str = "stitch::build";

/// The result of one build. Owns the engine record and destroys it on drop.
///
/// A result with errors may still carry output files from entry points that
/// succeeded; check [`BuildResult::is_error`] rather than the output count.
pub struct BuildResult {
    record: NonNull<stitch_abi::BuildResult>,
}

// SAFETY: the record is immutable and exclusively owned by this value.
unsafe impl Send for BuildResult {}
// SAFETY: as above; shared access only reads.
unsafe impl Sync for BuildResult {}

impl BuildResult {
    /// Takes ownership of a record returned by a synchronous engine call.
    ///
    /// # Safety
    ///
    /// `record` must be a live build result that nobody else releases.
    pub(crate) unsafe fn from_record(record: *mut stitch_abi::BuildResult) -> Self {
        match NonNull::new(record) {
            Some(record) => Self { record },
            None => Self::from_outcome(BuildOutcome::default()),
        }
    }

    /// Creates a result owning a fresh copy of `outcome`.
    #[must_use]
    pub fn from_outcome(outcome: BuildOutcome) -> Self {
        let exported = export_build_result(outcome);
        // SAFETY: `Box::into_raw` inside the allocator never returns null.
        let record = unsafe { NonNull::new_unchecked(exported) };
        Self { record }
    }

    fn raw(&self) -> &stitch_abi::BuildResult {
        // SAFETY: the record stays live until `drop`.
        unsafe { self.record.as_ref() }
    }

    /// Returns `true` when the build produced at least one error.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.raw().is_error()
    }

    /// Errors in production order.
    #[must_use]
    pub fn errors(&self) -> &[Message<'_>] {
        let raw = self.raw();
        // SAFETY: the messages live as long as `self`.
        unsafe { Message::slice(raw.errors, raw.errors_len) }
    }

    /// Warnings in production order.
    #[must_use]
    pub fn warnings(&self) -> &[Message<'_>] {
        let raw = self.raw();
        // SAFETY: the messages live as long as `self`.
        unsafe { Message::slice(raw.warnings, raw.warnings_len) }
    }

    /// Emitted files in entry-point order.
    #[must_use]
    pub fn output_files(&self) -> &[OutputFile<'_>] {
        let raw = self.raw();
        // SAFETY: `OutputFile` is a transparent wrapper; the files live as
        // long as `self`.
        unsafe {
            raw::slice_or_empty(raw.output_files.cast_const().cast::<OutputFile<'_>>(), raw.output_files_len)
        }
    }

    /// Copies the whole result into owned form.
    #[must_use]
    pub fn to_outcome(&self) -> BuildOutcome {
        // SAFETY: the record is live for the duration of the call.
        unsafe { BuildOutcome::from_raw(self.raw()) }
    }
}

impl fmt::Debug for BuildResult {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("BuildResult")
            .field("output_files", &self.output_files())
            .field("errors", &self.errors())
            .field("warnings", &self.warnings())
            .finish()
    }
}

impl Drop for BuildResult {
    fn drop(&mut self) {
        trace!(target: BUILD_TARGET, record = ?self.record, "releasing build result");
        // SAFETY: this value owns the record and drops exactly once.
        unsafe { stitch_build_result_destroy(self.record.as_ptr()) };
    }
}

/// A view of one emitted file.
#[repr(transparent)]
pub struct OutputFile<'s> {
    raw: stitch_abi::OutputFile,
    _owner: PhantomData<&'s ()>,
}

impl OutputFile<'_> {
    /// Output path.
    #[must_use]
    pub fn path(&self) -> &str {
        // SAFETY: the owning result keeps the buffer alive for `self`.
        unsafe { raw::str_or_empty(self.raw.path, self.raw.path_len) }
    }

    /// Content fingerprint for change detection.
    #[must_use]
    pub fn hash(&self) -> &str {
        // SAFETY: as for `path`.
        unsafe { raw::str_or_empty(self.raw.hash, self.raw.hash_len) }
    }

    /// Raw contents.
    #[must_use]
    pub fn contents(&self) -> &[u8] {
        // SAFETY: as for `path`.
        unsafe { raw::bytes_or_empty(self.raw.contents, self.raw.contents_len) }
    }

    /// Contents as text, when they are valid UTF-8.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(self.contents()).ok()
    }

    /// Copies the file out of the result.
    #[must_use]
    pub fn to_owned_data(&self) -> OutputFileData {
        // SAFETY: the record is valid for the lifetime of `self`.
        unsafe { OutputFileData::from_raw(&self.raw) }
    }
}

impl fmt::Debug for OutputFile<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("OutputFile")
            .field("path", &self.path())
            .field("hash", &self.hash())
            .field("len", &self.contents().len())
            .finish()
    }
}

/// Runs a single build on the calling thread.
///
/// Invalid options are reported as errors on the result.
#[must_use]
pub fn build(options: &BuildOptions) -> BuildResult {
    let (record, _hooks) = collect_setups(|| stitch_build(options.handle()));
    // SAFETY: the engine hands over a fresh record.
    unsafe { BuildResult::from_record(record) }
}

/// Runs a single build on an engine thread.
#[must_use]
pub fn build_async(options: &BuildOptions) -> BuildFuture {
    let handle = options.handle();
    start_async(None, |callback, data| {
        // SAFETY: `callback` consumes `data` exactly once.
        unsafe { stitch_build_async(handle, callback, data) };
    })
}
