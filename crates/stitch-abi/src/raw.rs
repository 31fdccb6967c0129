//! Readers for pointer/length pairs found in records.
//!
//! The length is authoritative: a zero length yields an empty value even when
//! the pointer is non-null, and a null pointer yields an empty value whatever
//! the length claims.

use std::ffi::c_char;
use std::{slice, str};

/// Borrows a UTF-8 string from a record field.
///
/// Invalid UTF-8 reads as the empty string.
///
/// # Safety
///
/// When `ptr` is non-null and `len` is non-zero, `ptr` must point to `len`
/// readable bytes that stay valid and unmodified for `'a`.
#[must_use]
pub unsafe fn str_or_empty<'a>(ptr: *const c_char, len: usize) -> &'a str {
    // SAFETY: forwarded from the caller.
    let bytes = unsafe { bytes_or_empty(ptr, len) };
    str::from_utf8(bytes).unwrap_or_default()
}

/// Borrows a UTF-8 string, returning `None` when the field is empty.
///
/// # Safety
///
/// Same contract as [`str_or_empty`].
#[must_use]
pub unsafe fn str_opt<'a>(ptr: *const c_char, len: usize) -> Option<&'a str> {
    // SAFETY: forwarded from the caller.
    let text = unsafe { str_or_empty(ptr, len) };
    (!text.is_empty()).then_some(text)
}

/// Borrows raw bytes from a record field.
///
/// # Safety
///
/// Same contract as [`str_or_empty`].
#[must_use]
pub unsafe fn bytes_or_empty<'a>(ptr: *const c_char, len: usize) -> &'a [u8] {
    // SAFETY: forwarded from the caller.
    unsafe { slice_or_empty(ptr.cast::<u8>(), len) }
}

/// Borrows a sequence of records.
///
/// # Safety
///
/// When `ptr` is non-null and `len` is non-zero, `ptr` must point to `len`
/// initialised values of `T` that stay valid for `'a`.
#[must_use]
pub unsafe fn slice_or_empty<'a, T>(ptr: *const T, len: usize) -> &'a [T] {
    if ptr.is_null() || len == 0 {
        return &[];
    }
    // SAFETY: non-null and non-empty; validity is the caller's contract.
    unsafe { slice::from_raw_parts(ptr, len) }
}
