//! Fixed-layout records exchanged across the engine boundary.
//!
//! Field order is part of the ABI. Strings are UTF-8, not NUL-terminated, and
//! always travel with their byte length. An empty string or sequence is
//! encoded as a null pointer with a zero length, but readers must treat the
//! length as authoritative whatever the pointer holds.

use std::ffi::c_char;

/// Source position attached to a diagnostic or note.
///
/// `line`, `column` and `length` are 1-based, or `-1` when not applicable.
#[repr(C)]
#[derive(Debug)]
pub struct Location {
    /// Path of the file the position refers to.
    pub file: *const c_char,
    /// Byte length of `file`.
    pub file_len: usize,
    /// Resolution namespace the file belongs to (for example `file`).
    pub namespace: *const c_char,
    /// Byte length of `namespace`.
    pub namespace_len: usize,
    /// Line number, or `-1`.
    pub line: i64,
    /// Column number, or `-1`.
    pub column: i64,
    /// Length of the highlighted span, or `-1`.
    pub length: i64,
    /// Full text of the referenced line.
    pub line_text: *const c_char,
    /// Byte length of `line_text`.
    pub line_text_len: usize,
    /// Suggested replacement for the highlighted span.
    pub suggestion: *const c_char,
    /// Byte length of `suggestion`.
    pub suggestion_len: usize,
}

/// Secondary annotation attached to a [`Message`].
#[repr(C)]
#[derive(Debug)]
pub struct Note {
    /// Note text.
    pub text: *const c_char,
    /// Byte length of `text`.
    pub text_len: usize,
    /// Optional position; null when absent.
    pub location: *mut Location,
}

/// One diagnostic, either an error or a warning.
#[repr(C)]
#[derive(Debug)]
pub struct Message {
    /// Stable identifier used for deduplication.
    pub id: *const c_char,
    /// Byte length of `id`.
    pub id_len: usize,
    /// Name of the plugin that raised the diagnostic; empty otherwise.
    pub plugin_name: *const c_char,
    /// Byte length of `plugin_name`.
    pub plugin_name_len: usize,
    /// Diagnostic text.
    pub text: *const c_char,
    /// Byte length of `text`.
    pub text_len: usize,
    /// Optional primary position; null when absent.
    pub location: *mut Location,
    /// Notes in display order.
    pub notes: *mut Note,
    /// Number of entries in `notes`.
    pub notes_len: usize,
}

/// Result of a context-level operation. No messages means success.
#[repr(C)]
#[derive(Debug)]
pub struct ContextResult {
    /// Diagnostics in production order.
    pub messages: *mut Message,
    /// Number of entries in `messages`.
    pub messages_len: usize,
}

/// One emitted build artefact.
#[repr(C)]
#[derive(Debug)]
pub struct OutputFile {
    /// Output path as configured by the entry point.
    pub path: *const c_char,
    /// Byte length of `path`.
    pub path_len: usize,
    /// Content fingerprint used for change detection.
    pub hash: *const c_char,
    /// Byte length of `hash`.
    pub hash_len: usize,
    /// Raw file contents.
    pub contents: *const c_char,
    /// Byte length of `contents`.
    pub contents_len: usize,
}

/// Result of one full build.
///
/// Output files may be present alongside errors; failure is signalled by
/// `errors_len` alone.
#[repr(C)]
#[derive(Debug)]
pub struct BuildResult {
    /// Emitted files in entry-point order.
    pub output_files: *mut OutputFile,
    /// Number of entries in `output_files`.
    pub output_files_len: usize,
    /// Errors in production order.
    pub errors: *mut Message,
    /// Number of entries in `errors`.
    pub errors_len: usize,
    /// Warnings in production order.
    pub warnings: *mut Message,
    /// Number of entries in `warnings`.
    pub warnings_len: usize,
}

impl BuildResult {
    /// Returns `true` when the build reported at least one error.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.errors_len > 0
    }
}

impl ContextResult {
    /// Returns `true` when the operation reported no diagnostics.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.messages_len == 0
    }
}

/// Diagnostics returned by a plugin's start hook.
///
/// Errors fail the current build before any source is read; warnings do not.
#[repr(C)]
#[derive(Debug)]
pub struct PluginOnStartResult {
    /// Errors in production order.
    pub errors: *mut Message,
    /// Number of entries in `errors`.
    pub errors_len: usize,
    /// Warnings in production order.
    pub warnings: *mut Message,
    /// Number of entries in `warnings`.
    pub warnings_len: usize,
}
