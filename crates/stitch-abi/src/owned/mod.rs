//! Rust-native mirrors of the boundary records.
//!
//! Producers assemble results from these types and hand them to
//! [`crate::alloc`]; consumers copy records back into them with the
//! `from_raw` readers when they need the data past a callback's return.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::raw;
use crate::records::{BuildResult, Location, Message, Note, OutputFile, PluginOnStartResult};

/// Value used for line, column and length when they do not apply.
pub const UNKNOWN_POSITION: i64 = -1;

/// Owned form of [`Location`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationData {
    /// File the position refers to.
    pub file: String,
    /// Resolution namespace.
    #[serde(default)]
    pub namespace: String,
    /// 1-based line, or [`UNKNOWN_POSITION`].
    pub line: i64,
    /// 1-based column, or [`UNKNOWN_POSITION`].
    pub column: i64,
    /// Span length, or [`UNKNOWN_POSITION`].
    pub length: i64,
    /// Text of the referenced line.
    #[serde(default)]
    pub line_text: String,
    /// Suggested replacement for the span.
    #[serde(default)]
    pub suggestion: String,
}

impl LocationData {
    /// Creates a location in `file` with every numeric field unknown.
    #[must_use]
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            namespace: String::new(),
            line: UNKNOWN_POSITION,
            column: UNKNOWN_POSITION,
            length: UNKNOWN_POSITION,
            line_text: String::new(),
            suggestion: String::new(),
        }
    }

    /// Sets the 1-based line and column.
    #[must_use]
    pub const fn at(mut self, line: i64, column: i64) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    /// Sets the span length.
    #[must_use]
    pub const fn with_length(mut self, length: i64) -> Self {
        self.length = length;
        self
    }

    /// Sets the namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the text of the referenced line.
    #[must_use]
    pub fn with_line_text(mut self, line_text: impl Into<String>) -> Self {
        self.line_text = line_text.into();
        self
    }

    /// Sets the suggested replacement.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = suggestion.into();
        self
    }

    /// Copies a record into owned form.
    ///
    /// # Safety
    ///
    /// Every pointer in `raw` must satisfy the record contract for the
    /// duration of the call.
    #[must_use]
    pub unsafe fn from_raw(raw: &Location) -> Self {
        // SAFETY: forwarded from the caller.
        unsafe {
            Self {
                file: raw::str_or_empty(raw.file, raw.file_len).to_owned(),
                namespace: raw::str_or_empty(raw.namespace, raw.namespace_len).to_owned(),
                line: raw.line,
                column: raw.column,
                length: raw.length,
                line_text: raw::str_or_empty(raw.line_text, raw.line_text_len).to_owned(),
                suggestion: raw::str_or_empty(raw.suggestion, raw.suggestion_len).to_owned(),
            }
        }
    }

    /// Copies an optional nested location.
    ///
    /// # Safety
    ///
    /// `raw` must be null or point to a valid [`Location`].
    unsafe fn from_nullable(raw: *const Location) -> Option<Self> {
        // SAFETY: null is checked by `as_ref`; validity is the caller's contract.
        unsafe { raw.as_ref().map(|location| Self::from_raw(location)) }
    }
}

/// Owned form of [`Note`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteData {
    /// Note text.
    pub text: String,
    /// Optional position.
    #[serde(default)]
    pub location: Option<LocationData>,
}

impl NoteData {
    /// Creates a note without a location.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            location: None,
        }
    }

    /// Attaches a location.
    #[must_use]
    pub fn with_location(mut self, location: LocationData) -> Self {
        self.location = Some(location);
        self
    }

    /// Copies a record into owned form.
    ///
    /// # Safety
    ///
    /// Every pointer in `raw` must satisfy the record contract for the
    /// duration of the call.
    #[must_use]
    pub unsafe fn from_raw(raw: &Note) -> Self {
        // SAFETY: forwarded from the caller.
        unsafe {
            Self {
                text: raw::str_or_empty(raw.text, raw.text_len).to_owned(),
                location: LocationData::from_nullable(raw.location),
            }
        }
    }
}

/// Renders `file`, then `:line` and `:column` when they are known.
impl fmt::Display for LocationData {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.file)?;
        if let Ok(line) = u64::try_from(self.line) {
            write!(formatter, ":{line}")?;
            if let Ok(column) = u64::try_from(self.column) {
                write!(formatter, ":{column}")?;
            }
        }
        Ok(())
    }
}

/// Owned form of [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    /// Stable identifier; may be empty.
    #[serde(default)]
    pub id: String,
    /// Originating plugin; empty when raised by the engine.
    #[serde(default)]
    pub plugin_name: String,
    /// Diagnostic text.
    pub text: String,
    /// Optional primary position.
    #[serde(default)]
    pub location: Option<LocationData>,
    /// Notes in display order.
    #[serde(default)]
    pub notes: Vec<NoteData>,
}

impl MessageData {
    /// Creates a message carrying only text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            plugin_name: String::new(),
            text: text.into(),
            location: None,
            notes: Vec::new(),
        }
    }

    /// Sets the deduplication identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Sets the originating plugin.
    #[must_use]
    pub fn with_plugin_name(mut self, plugin_name: impl Into<String>) -> Self {
        self.plugin_name = plugin_name.into();
        self
    }

    /// Sets the primary location.
    #[must_use]
    pub fn with_location(mut self, location: LocationData) -> Self {
        self.location = Some(location);
        self
    }

    /// Appends a note after any existing ones.
    #[must_use]
    pub fn with_note(mut self, note: NoteData) -> Self {
        self.notes.push(note);
        self
    }

    /// Copies a record into owned form, preserving note order.
    ///
    /// # Safety
    ///
    /// Every pointer in `raw`, including nested notes and locations, must
    /// satisfy the record contract for the duration of the call.
    #[must_use]
    pub unsafe fn from_raw(raw: &Message) -> Self {
        // SAFETY: forwarded from the caller.
        unsafe {
            Self {
                id: raw::str_or_empty(raw.id, raw.id_len).to_owned(),
                plugin_name: raw::str_or_empty(raw.plugin_name, raw.plugin_name_len).to_owned(),
                text: raw::str_or_empty(raw.text, raw.text_len).to_owned(),
                location: LocationData::from_nullable(raw.location),
                notes: raw::slice_or_empty(raw.notes.cast_const(), raw.notes_len)
                    .iter()
                    .map(|note| NoteData::from_raw(note))
                    .collect(),
            }
        }
    }

    /// Copies a sequence of message records.
    ///
    /// # Safety
    ///
    /// `ptr`/`len` must describe valid messages, as for [`Self::from_raw`].
    #[must_use]
    pub unsafe fn copy_all(ptr: *const Message, len: usize) -> Vec<Self> {
        // SAFETY: forwarded from the caller.
        unsafe {
            raw::slice_or_empty(ptr, len)
                .iter()
                .map(|message| Self::from_raw(message))
                .collect()
        }
    }
}

impl From<&str> for MessageData {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for MessageData {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl fmt::Display for MessageData {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(location) = &self.location {
            write!(formatter, "{location}: ")?;
        }
        if !self.plugin_name.is_empty() {
            write!(formatter, "[plugin {}] ", self.plugin_name)?;
        }
        formatter.write_str(&self.text)
    }
}

/// Owned form of [`OutputFile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFileData {
    /// Output path.
    pub path: String,
    /// Content fingerprint.
    pub hash: String,
    /// Raw contents.
    pub contents: Vec<u8>,
}

impl OutputFileData {
    /// Creates an output file.
    #[must_use]
    pub fn new(path: impl Into<String>, hash: impl Into<String>, contents: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            hash: hash.into(),
            contents,
        }
    }

    /// Copies a record into owned form.
    ///
    /// # Safety
    ///
    /// Every pointer in `raw` must satisfy the record contract for the
    /// duration of the call.
    #[must_use]
    pub unsafe fn from_raw(raw: &OutputFile) -> Self {
        // SAFETY: forwarded from the caller.
        unsafe {
            Self {
                path: raw::str_or_empty(raw.path, raw.path_len).to_owned(),
                hash: raw::str_or_empty(raw.hash, raw.hash_len).to_owned(),
                contents: raw::bytes_or_empty(raw.contents, raw.contents_len).to_vec(),
            }
        }
    }
}

/// Owned form of [`BuildResult`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOutcome {
    /// Emitted files in entry-point order.
    pub output_files: Vec<OutputFileData>,
    /// Errors in production order.
    pub errors: Vec<MessageData>,
    /// Warnings in production order.
    pub warnings: Vec<MessageData>,
}

impl BuildOutcome {
    /// Returns `true` when at least one error was produced.
    #[must_use]
    pub fn is_error(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Creates an outcome carrying a single error and nothing else.
    #[must_use]
    pub fn failed(error: MessageData) -> Self {
        Self {
            errors: vec![error],
            ..Self::default()
        }
    }

    /// Copies a record into owned form.
    ///
    /// # Safety
    ///
    /// Every pointer reachable from `raw` must satisfy the record contract
    /// for the duration of the call.
    #[must_use]
    pub unsafe fn from_raw(raw: &BuildResult) -> Self {
        // SAFETY: forwarded from the caller.
        unsafe {
            Self {
                output_files: raw::slice_or_empty(raw.output_files.cast_const(), raw.output_files_len)
                    .iter()
                    .map(|file| OutputFileData::from_raw(file))
                    .collect(),
                errors: MessageData::copy_all(raw.errors.cast_const(), raw.errors_len),
                warnings: MessageData::copy_all(raw.warnings.cast_const(), raw.warnings_len),
            }
        }
    }
}

/// Owned form of [`PluginOnStartResult`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnStartOutcome {
    /// Errors in production order.
    pub errors: Vec<MessageData>,
    /// Warnings in production order.
    pub warnings: Vec<MessageData>,
}

impl OnStartOutcome {
    /// Appends an error.
    #[must_use]
    pub fn with_error(mut self, error: MessageData) -> Self {
        self.errors.push(error);
        self
    }

    /// Appends a warning.
    #[must_use]
    pub fn with_warning(mut self, warning: MessageData) -> Self {
        self.warnings.push(warning);
        self
    }

    /// Returns `true` when the hook reported nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    /// Copies a record into owned form.
    ///
    /// # Safety
    ///
    /// Every pointer reachable from `raw` must satisfy the record contract
    /// for the duration of the call.
    #[must_use]
    pub unsafe fn from_raw(raw: &PluginOnStartResult) -> Self {
        // SAFETY: forwarded from the caller.
        unsafe {
            Self {
                errors: MessageData::copy_all(raw.errors.cast_const(), raw.errors_len),
                warnings: MessageData::copy_all(raw.warnings.cast_const(), raw.warnings_len),
            }
        }
    }
}
