//! Allocation and release of boundary records.
//!
//! `export_*` functions turn owned data into records whose buffers are leaked
//! boxes; the matching `release_*` functions rebuild and drop those boxes.
//! Top-level records are registered in a ledger, so a second release of the
//! same record, or the release of a record this module never produced, is
//! reported as a [`ReleaseError`] instead of freeing memory twice.
//!
//! Nested records (messages, notes, locations, output files) are owned by
//! their top-level record and are only released through it.

mod ledger;

use std::ffi::c_char;
use std::ptr;

use tracing::trace;

use crate::error::{RecordKind, ReleaseError};
use crate::owned::{
    BuildOutcome, LocationData, MessageData, NoteData, OnStartOutcome, OutputFileData,
};
use crate::records::{
    BuildResult, ContextResult, Location, Message, Note, OutputFile, PluginOnStartResult,
};

pub(crate) use self::ledger::initialise as initialise_ledger;

/// Tracing target for record allocation.
const ALLOC_TARGET: &str = "stitch_abi::alloc";

/// Allocates a [`BuildResult`] the caller must release exactly once.
#[must_use]
pub fn export_build_result(outcome: BuildOutcome) -> *mut BuildResult {
    let (output_files, output_files_len) =
        export_slice(outcome.output_files.into_iter().map(export_output_file).collect());
    let (errors, errors_len) = export_messages(outcome.errors);
    let (warnings, warnings_len) = export_messages(outcome.warnings);
    let record = Box::into_raw(Box::new(BuildResult {
        output_files,
        output_files_len,
        errors,
        errors_len,
        warnings,
        warnings_len,
    }));
    register(RecordKind::BuildResult, record)
}

/// Allocates a [`ContextResult`] the caller must release exactly once.
#[must_use]
pub fn export_context_result(messages: Vec<MessageData>) -> *mut ContextResult {
    let (messages, messages_len) = export_messages(messages);
    let record = Box::into_raw(Box::new(ContextResult {
        messages,
        messages_len,
    }));
    register(RecordKind::ContextResult, record)
}

/// Allocates a [`PluginOnStartResult`] the caller must release exactly once.
#[must_use]
pub fn export_on_start_result(outcome: OnStartOutcome) -> *mut PluginOnStartResult {
    let (errors, errors_len) = export_messages(outcome.errors);
    let (warnings, warnings_len) = export_messages(outcome.warnings);
    let record = Box::into_raw(Box::new(PluginOnStartResult {
        errors,
        errors_len,
        warnings,
        warnings_len,
    }));
    register(RecordKind::PluginOnStartResult, record)
}

/// Releases a [`BuildResult`] and everything it references. Null is a no-op.
///
/// # Safety
///
/// `record` must be null or a pointer returned by [`export_build_result`]
/// that no other thread is reading.
///
/// # Errors
///
/// Returns [`ReleaseError`] when `record` is not a live build result; nothing
/// is freed in that case.
pub unsafe fn release_build_result(record: *mut BuildResult) -> Result<(), ReleaseError> {
    let Some(record) = unregister(RecordKind::BuildResult, record)? else {
        return Ok(());
    };
    // SAFETY: the ledger confirmed the box came from `export_build_result`.
    let record = unsafe { Box::from_raw(record) };
    // SAFETY: the nested buffers were produced together with the record.
    unsafe {
        for file in take_slice(record.output_files, record.output_files_len) {
            release_output_file(&file);
        }
        release_messages(record.errors, record.errors_len);
        release_messages(record.warnings, record.warnings_len);
    }
    Ok(())
}

/// Releases a [`ContextResult`] and everything it references. Null is a no-op.
///
/// # Safety
///
/// `record` must be null or a pointer returned by [`export_context_result`]
/// that no other thread is reading.
///
/// # Errors
///
/// Returns [`ReleaseError`] when `record` is not a live context result.
pub unsafe fn release_context_result(record: *mut ContextResult) -> Result<(), ReleaseError> {
    let Some(record) = unregister(RecordKind::ContextResult, record)? else {
        return Ok(());
    };
    // SAFETY: the ledger confirmed the box came from `export_context_result`.
    let record = unsafe { Box::from_raw(record) };
    // SAFETY: the nested buffers were produced together with the record.
    unsafe { release_messages(record.messages, record.messages_len) };
    Ok(())
}

/// Releases a [`PluginOnStartResult`] and everything it references. Null is
/// a no-op.
///
/// # Safety
///
/// `record` must be null or a pointer returned by [`export_on_start_result`]
/// that no other thread is reading.
///
/// # Errors
///
/// Returns [`ReleaseError`] when `record` is not a live start result, which
/// includes every release after the first.
pub unsafe fn release_on_start_result(
    record: *mut PluginOnStartResult,
) -> Result<(), ReleaseError> {
    let Some(record) = unregister(RecordKind::PluginOnStartResult, record)? else {
        return Ok(());
    };
    // SAFETY: the ledger confirmed the box came from `export_on_start_result`.
    let record = unsafe { Box::from_raw(record) };
    // SAFETY: the nested buffers were produced together with the record.
    unsafe {
        release_messages(record.errors, record.errors_len);
        release_messages(record.warnings, record.warnings_len);
    }
    Ok(())
}

/// Returns `true` while `record` is allocated and not yet released.
#[must_use]
pub fn is_live<T>(record: *mut T) -> bool {
    ledger::contains(record.addr())
}

fn register<T>(kind: RecordKind, record: *mut T) -> *mut T {
    ledger::track(kind, record.addr());
    trace!(target: ALLOC_TARGET, %kind, address = record.addr(), "record allocated");
    record
}

fn unregister<T>(kind: RecordKind, record: *mut T) -> Result<Option<*mut T>, ReleaseError> {
    if record.is_null() {
        return Ok(None);
    }
    ledger::untrack(kind, record.addr())?;
    trace!(target: ALLOC_TARGET, %kind, address = record.addr(), "record released");
    Ok(Some(record))
}

fn export_str(value: String) -> (*const c_char, usize) {
    export_bytes(value.into_bytes())
}

fn export_bytes(value: Vec<u8>) -> (*const c_char, usize) {
    if value.is_empty() {
        return (ptr::null(), 0);
    }
    let boxed = value.into_boxed_slice();
    let len = boxed.len();
    (Box::into_raw(boxed).cast::<c_char>().cast_const(), len)
}

fn export_slice<T>(items: Vec<T>) -> (*mut T, usize) {
    if items.is_empty() {
        return (ptr::null_mut(), 0);
    }
    let boxed = items.into_boxed_slice();
    let len = boxed.len();
    (Box::into_raw(boxed).cast::<T>(), len)
}

fn export_location(location: Option<LocationData>) -> *mut Location {
    let Some(location) = location else {
        return ptr::null_mut();
    };
    let (file, file_len) = export_str(location.file);
    let (namespace, namespace_len) = export_str(location.namespace);
    let (line_text, line_text_len) = export_str(location.line_text);
    let (suggestion, suggestion_len) = export_str(location.suggestion);
    Box::into_raw(Box::new(Location {
        file,
        file_len,
        namespace,
        namespace_len,
        line: location.line,
        column: location.column,
        length: location.length,
        line_text,
        line_text_len,
        suggestion,
        suggestion_len,
    }))
}

fn export_note(note: NoteData) -> Note {
    let (text, text_len) = export_str(note.text);
    Note {
        text,
        text_len,
        location: export_location(note.location),
    }
}

fn export_message(message: MessageData) -> Message {
    let (id, id_len) = export_str(message.id);
    let (plugin_name, plugin_name_len) = export_str(message.plugin_name);
    let (text, text_len) = export_str(message.text);
    let (notes, notes_len) = export_slice(message.notes.into_iter().map(export_note).collect());
    Message {
        id,
        id_len,
        plugin_name,
        plugin_name_len,
        text,
        text_len,
        location: export_location(message.location),
        notes,
        notes_len,
    }
}

fn export_messages(messages: Vec<MessageData>) -> (*mut Message, usize) {
    export_slice(messages.into_iter().map(export_message).collect())
}

fn export_output_file(file: OutputFileData) -> OutputFile {
    let (path, path_len) = export_str(file.path);
    let (hash, hash_len) = export_str(file.hash);
    let (contents, contents_len) = export_bytes(file.contents);
    OutputFile {
        path,
        path_len,
        hash,
        hash_len,
        contents,
        contents_len,
    }
}

/// Reclaims a boxed slice produced by [`export_slice`].
///
/// # Safety
///
/// `ptr`/`len` must come from one `export_slice` call and be reclaimed once.
unsafe fn take_slice<T>(ptr: *mut T, len: usize) -> Vec<T> {
    if ptr.is_null() || len == 0 {
        return Vec::new();
    }
    // SAFETY: the caller guarantees the slice came from `export_slice`.
    unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(ptr, len)) }.into_vec()
}

/// Reclaims a buffer produced by [`export_bytes`].
///
/// # Safety
///
/// `ptr`/`len` must come from one `export_bytes` call and be reclaimed once.
unsafe fn release_bytes(ptr: *const c_char, len: usize) {
    // SAFETY: forwarded from the caller.
    drop(unsafe { take_slice(ptr.cast_mut().cast::<u8>(), len) });
}

/// # Safety
///
/// `location` must be null or come from [`export_location`].
unsafe fn release_location(location: *mut Location) {
    if location.is_null() {
        return;
    }
    // SAFETY: produced by `export_location`.
    let location = unsafe { Box::from_raw(location) };
    // SAFETY: the strings were exported with the location.
    unsafe {
        release_bytes(location.file, location.file_len);
        release_bytes(location.namespace, location.namespace_len);
        release_bytes(location.line_text, location.line_text_len);
        release_bytes(location.suggestion, location.suggestion_len);
    }
}

/// # Safety
///
/// `ptr`/`len` must come from [`export_messages`].
unsafe fn release_messages(ptr: *mut Message, len: usize) {
    // SAFETY: forwarded from the caller.
    for message in unsafe { take_slice(ptr, len) } {
        // SAFETY: every buffer was exported with the message.
        unsafe {
            release_bytes(message.id, message.id_len);
            release_bytes(message.plugin_name, message.plugin_name_len);
            release_bytes(message.text, message.text_len);
            release_location(message.location);
            for note in take_slice(message.notes, message.notes_len) {
                release_bytes(note.text, note.text_len);
                release_location(note.location);
            }
        }
    }
}

/// # Safety
///
/// `file` must come from [`export_output_file`].
unsafe fn release_output_file(file: &OutputFile) {
    // SAFETY: every buffer was exported with the file.
    unsafe {
        release_bytes(file.path, file.path_len);
        release_bytes(file.hash, file.hash_len);
        release_bytes(file.contents, file.contents_len);
    }
}
