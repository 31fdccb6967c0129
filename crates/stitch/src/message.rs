//! Borrowed views over diagnostic records.
//!
//! Each view is a transparent wrapper around the matching record, so slices of
//! records can be reinterpreted as slices of views without copying. The
//! lifetime ties a view to the result that owns the memory.

use std::fmt;
use std::marker::PhantomData;

use stitch_abi::owned::{LocationData, MessageData, NoteData, UNKNOWN_POSITION};
use stitch_abi::raw;

/// A source position.
#[repr(transparent)]
pub struct Location<'s> {
    raw: stitch_abi::Location,
    _owner: PhantomData<&'s ()>,
}

impl Location<'_> {
    /// File the position refers to.
    #[must_use]
    pub fn file(&self) -> &str {
        // SAFETY: the owning result keeps the buffer alive for `self`.
        unsafe { raw::str_or_empty(self.raw.file, self.raw.file_len) }
    }

    /// Resolution namespace, when one was set.
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        // SAFETY: as for `file`.
        unsafe { raw::str_opt(self.raw.namespace, self.raw.namespace_len) }
    }

    /// 1-based line, if known.
    #[must_use]
    pub fn line(&self) -> Option<u64> {
        known(self.raw.line)
    }

    /// 1-based column, if known.
    #[must_use]
    pub fn column(&self) -> Option<u64> {
        known(self.raw.column)
    }

    /// Span length, if known.
    #[must_use]
    pub fn length(&self) -> Option<u64> {
        known(self.raw.length)
    }

    /// Text of the referenced line, when available.
    #[must_use]
    pub fn line_text(&self) -> Option<&str> {
        // SAFETY: as for `file`.
        unsafe { raw::str_opt(self.raw.line_text, self.raw.line_text_len) }
    }

    /// Suggested replacement for the span.
    #[must_use]
    pub fn suggestion(&self) -> Option<&str> {
        // SAFETY: as for `file`.
        unsafe { raw::str_opt(self.raw.suggestion, self.raw.suggestion_len) }
    }

    /// Copies the location out of the result.
    #[must_use]
    pub fn to_owned_data(&self) -> LocationData {
        // SAFETY: the record is valid for the lifetime of `self`.
        unsafe { LocationData::from_raw(&self.raw) }
    }
}

impl fmt::Debug for Location<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_owned_data().fmt(formatter)
    }
}

impl fmt::Display for Location<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.file())?;
        if let Some(line) = self.line() {
            write!(formatter, ":{line}")?;
            if let Some(column) = self.column() {
                write!(formatter, ":{column}")?;
            }
        }
        Ok(())
    }
}

fn known(value: i64) -> Option<u64> {
    if value == UNKNOWN_POSITION {
        None
    } else {
        u64::try_from(value).ok()
    }
}

/// # Safety
///
/// `location` must be null or valid for `'s`.
unsafe fn location_view<'s>(location: *mut stitch_abi::Location) -> Option<&'s Location<'s>> {
    // SAFETY: `Location` is a transparent wrapper around the record.
    unsafe { location.cast_const().cast::<Location<'s>>().as_ref() }
}

/// A note attached to a message.
#[repr(transparent)]
pub struct Note<'s> {
    raw: stitch_abi::Note,
    _owner: PhantomData<&'s ()>,
}

impl<'s> Note<'s> {
    /// Note text.
    #[must_use]
    pub fn text(&self) -> &str {
        // SAFETY: the owning result keeps the buffer alive for `self`.
        unsafe { raw::str_or_empty(self.raw.text, self.raw.text_len) }
    }

    /// Position the note points at.
    #[must_use]
    pub fn location(&self) -> Option<&Location<'s>> {
        // SAFETY: nested locations live as long as the note.
        unsafe { location_view(self.raw.location) }
    }

    /// Copies the note out of the result.
    #[must_use]
    pub fn to_owned_data(&self) -> NoteData {
        // SAFETY: the record is valid for the lifetime of `self`.
        unsafe { NoteData::from_raw(&self.raw) }
    }
}

impl fmt::Debug for Note<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_owned_data().fmt(formatter)
    }
}

/// An error or warning.
#[repr(transparent)]
pub struct Message<'s> {
    raw: stitch_abi::Message,
    _owner: PhantomData<&'s ()>,
}

impl<'s> Message<'s> {
    /// Reinterprets a record sequence as views.
    ///
    /// # Safety
    ///
    /// `ptr`/`len` must describe messages that stay valid for `'s`.
    pub(crate) unsafe fn slice<'a>(ptr: *mut stitch_abi::Message, len: usize) -> &'a [Self] {
        // SAFETY: `Message` is a transparent wrapper around the record.
        unsafe { raw::slice_or_empty(ptr.cast_const().cast::<Self>(), len) }
    }

    /// Stable identifier, when the producer set one.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        // SAFETY: the owning result keeps the buffer alive for `self`.
        unsafe { raw::str_opt(self.raw.id, self.raw.id_len) }
    }

    /// Plugin that raised the message, if any.
    #[must_use]
    pub fn plugin_name(&self) -> Option<&str> {
        // SAFETY: as for `id`.
        unsafe { raw::str_opt(self.raw.plugin_name, self.raw.plugin_name_len) }
    }

    /// Diagnostic text.
    #[must_use]
    pub fn text(&self) -> &str {
        // SAFETY: as for `id`.
        unsafe { raw::str_or_empty(self.raw.text, self.raw.text_len) }
    }

    /// Primary position.
    #[must_use]
    pub fn location(&self) -> Option<&Location<'s>> {
        // SAFETY: nested locations live as long as the message.
        unsafe { location_view(self.raw.location) }
    }

    /// Notes in display order.
    #[must_use]
    pub fn notes(&self) -> &[Note<'s>] {
        // SAFETY: `Note` is a transparent wrapper; the notes live as long as
        // the message.
        unsafe { raw::slice_or_empty(self.raw.notes.cast_const().cast::<Note<'s>>(), self.raw.notes_len) }
    }

    /// Copies the message out of the result.
    #[must_use]
    pub fn to_owned_data(&self) -> MessageData {
        // SAFETY: the record is valid for the lifetime of `self`.
        unsafe { MessageData::from_raw(&self.raw) }
    }
}

impl fmt::Debug for Message<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_owned_data().fmt(formatter)
    }
}

impl fmt::Display for Message<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(location) = self.location() {
            write!(formatter, "{location}: ")?;
        }
        if let Some(plugin) = self.plugin_name() {
            write!(formatter, "[plugin {plugin}] ")?;
        }
        formatter.write_str(self.text())
    }
}
