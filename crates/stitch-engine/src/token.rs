//! Opaque caller tokens carried between engine threads.

use std::ffi::c_void;

/// A caller-supplied `void*` the engine passes back without interpreting.
///
/// The caller promises the pointee may be used from any engine thread, which
/// is what makes moving the pointer between threads sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token(*mut c_void);

// SAFETY: the engine never dereferences the pointer; thread-safety of the
// pointee is part of the callback contract.
unsafe impl Send for Token {}
// SAFETY: as above.
unsafe impl Sync for Token {}

impl Token {
    /// Wraps a caller pointer.
    #[must_use]
    pub const fn new(data: *mut c_void) -> Self {
        Self(data)
    }

    /// Returns the wrapped pointer.
    #[must_use]
    pub const fn as_ptr(self) -> *mut c_void {
        self.0
    }
}
