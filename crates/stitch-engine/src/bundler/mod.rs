//! Minimal bundler producing output files and diagnostics per entry point.
//!
//! Every entry point is processed in isolation: its diagnostics never affect
//! another entry's output. When bundling, `import "<path>";` statements are
//! replaced by the imported module's contents, depth first. Each module is
//! emitted once per entry, so import cycles terminate.

use std::collections::{HashMap, HashSet};
use std::thread;

use camino::{Utf8Path, Utf8PathBuf};
use sha2::{Digest, Sha256};
use stitch_abi::owned::{LocationData, MessageData, NoteData, OutputFileData};
use tracing::{debug, warn};

use crate::options::EntryPoint;
use crate::source::{SourceError, SourceFs, normalise};

/// Tracing target for bundling.
const BUNDLER_TARGET: &str = "stitch_engine::bundler";

/// Diagnostic identifier for imports that do not resolve.
pub const UNRESOLVED_IMPORT_ID: &str = "unresolved-import";
/// Diagnostic identifier for a module imported twice from the same file.
pub const DUPLICATE_IMPORT_ID: &str = "duplicate-import";
/// Diagnostic identifier for entry points producing no code.
pub const EMPTY_ENTRY_ID: &str = "empty-entry";
/// Diagnostic identifier for sources that exist but cannot be read.
pub const UNREADABLE_SOURCE_ID: &str = "unreadable-source";

/// Result of building one entry point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryOutcome {
    /// Emitted file, absent when the entry produced errors.
    pub output: Option<OutputFileData>,
    /// Errors in production order.
    pub errors: Vec<MessageData>,
    /// Warnings in production order.
    pub warnings: Vec<MessageData>,
}

impl EntryOutcome {
    fn worker_failed(entry: &EntryPoint) -> Self {
        Self {
            errors: vec![
                MessageData::new(format!("Building \"{}\" failed unexpectedly", entry.input))
                    .with_id("internal-error"),
            ],
            ..Self::default()
        }
    }
}

/// Builds entry points against a source filesystem.
#[derive(Clone, Copy)]
pub struct Bundler<'s> {
    source: &'s dyn SourceFs,
    bundle: bool,
    hash_length: usize,
}

impl<'s> Bundler<'s> {
    /// Creates a bundler. Without `bundle`, entries are copied verbatim.
    #[must_use]
    pub fn new(source: &'s dyn SourceFs, bundle: bool, hash_length: usize) -> Self {
        Self {
            source,
            bundle,
            hash_length,
        }
    }

    /// Builds every entry point, spreading them over up to `workers` threads.
    ///
    /// Outcomes are returned in entry-point order.
    #[must_use]
    pub fn build_all(self, entries: &[EntryPoint], workers: usize) -> Vec<EntryOutcome> {
        let workers = workers.clamp(1, entries.len().max(1));
        if workers == 1 {
            return self.build_chunk(entries);
        }
        let chunk_size = entries.len().div_ceil(workers);
        thread::scope(|scope| {
            let pending: Vec<_> = entries
                .chunks(chunk_size)
                .enumerate()
                .map(|(index, chunk)| {
                    let worker = thread::Builder::new()
                        .name(format!("stitch-worker-{index}"))
                        .spawn_scoped(scope, move || self.build_chunk(chunk));
                    (chunk, worker)
                })
                .collect();
            pending
                .into_iter()
                .flat_map(|(chunk, worker)| match worker {
                    Ok(handle) => handle
                        .join()
                        .unwrap_or_else(|_| chunk.iter().map(EntryOutcome::worker_failed).collect()),
                    Err(error) => {
                        warn!(target: BUNDLER_TARGET, %error, "worker spawn failed; building inline");
                        self.build_chunk(chunk)
                    }
                })
                .collect()
        })
    }

    fn build_chunk(self, entries: &[EntryPoint]) -> Vec<EntryOutcome> {
        entries.iter().map(|entry| self.build_entry(entry)).collect()
    }

    /// Builds a single entry point.
    #[must_use]
    pub fn build_entry(self, entry: &EntryPoint) -> EntryOutcome {
        let input = normalise(&entry.input);
        debug!(target: BUNDLER_TARGET, input = %input, output = %entry.output, "building entry");
        let source = match self.source.read(&input) {
            Ok(source) => source,
            Err(SourceError::NotFound { .. }) => {
                return EntryOutcome {
                    errors: vec![
                        MessageData::new(format!("Could not resolve \"{}\"", entry.input))
                            .with_id(UNRESOLVED_IMPORT_ID),
                    ],
                    ..EntryOutcome::default()
                };
            }
            Err(error) => {
                return EntryOutcome {
                    errors: vec![unreadable(&error, None)],
                    ..EntryOutcome::default()
                };
            }
        };

        let mut state = EntryState::default();
        if self.bundle {
            state.visited.insert(input.clone());
            self.inline_module(&mut state, &input, &source);
        } else {
            state.output = source;
        }

        let mut outcome = EntryOutcome {
            output: None,
            errors: state.errors,
            warnings: state.warnings,
        };
        if !outcome.errors.is_empty() {
            return outcome;
        }
        if state.output.trim().is_empty() {
            outcome.warnings.push(
                MessageData::new(format!("Entry point \"{}\" produced no output", entry.input))
                    .with_id(EMPTY_ENTRY_ID)
                    .with_location(LocationData::new(input.as_str())),
            );
        }
        let contents = state.output.into_bytes();
        outcome.output = Some(OutputFileData::new(
            entry.output.as_str(),
            content_hash(&contents, self.hash_length),
            contents,
        ));
        outcome
    }

    fn inline_module(self, state: &mut EntryState, path: &Utf8Path, source: &str) {
        let directory = path.parent().unwrap_or_else(|| Utf8Path::new(""));
        let mut seen_here: HashMap<Utf8PathBuf, LocationData> = HashMap::new();
        for (index, line) in source.lines().enumerate() {
            let Some(import) = ImportStatement::parse(line) else {
                state.output.push_str(line);
                state.output.push('\n');
                continue;
            };
            let location = import.location(path, index, line);
            let target = normalise(&directory.join(import.specifier));

            if let Some(first) = seen_here.get(&target) {
                state.warnings.push(
                    MessageData::new(format!("Duplicate import of \"{}\"", import.specifier))
                        .with_id(DUPLICATE_IMPORT_ID)
                        .with_location(location)
                        .with_note(
                            NoteData::new("The first import is here").with_location(first.clone()),
                        ),
                );
                continue;
            }
            seen_here.insert(target.clone(), location.clone());

            if !self.source.exists(&target) {
                state.errors.push(self.unresolved(directory, import.specifier, location));
                continue;
            }
            if !state.visited.insert(target.clone()) {
                continue;
            }
            match self.source.read(&target) {
                Ok(nested) => self.inline_module(state, &target, &nested),
                Err(error) => state.errors.push(unreadable(&error, Some(location))),
            }
        }
    }

    fn unresolved(self, directory: &Utf8Path, specifier: &str, location: LocationData) -> MessageData {
        let with_extension = format!("{specifier}.js");
        let location = if self
            .source
            .exists(&normalise(&directory.join(&with_extension)))
        {
            location.with_suggestion(with_extension)
        } else {
            location
        };
        MessageData::new(format!("Could not resolve \"{specifier}\""))
            .with_id(UNRESOLVED_IMPORT_ID)
            .with_location(location)
    }
}

#[derive(Default)]
struct EntryState {
    visited: HashSet<Utf8PathBuf>,
    output: String,
    errors: Vec<MessageData>,
    warnings: Vec<MessageData>,
}

/// A side-effect import of the form `import "<specifier>";`.
#[derive(Debug, PartialEq, Eq)]
struct ImportStatement<'l> {
    specifier: &'l str,
    /// Byte offset of the specifier within the line.
    offset: usize,
}

impl<'l> ImportStatement<'l> {
    fn parse(line: &'l str) -> Option<Self> {
        let rest = line.trim_start().strip_prefix("import")?;
        let quoted = rest.trim_start();
        let quote = quoted.chars().next().filter(|c| matches!(c, '"' | '\''))?;
        let body = quoted.strip_prefix(quote)?;
        let end = body.find(quote)?;
        let specifier = body.get(..end)?;
        let trailing = body.get(end + 1..)?.trim();
        if specifier.is_empty() || !(trailing.is_empty() || trailing == ";") {
            return None;
        }
        let offset = line.len() - body.len();
        Some(Self { specifier, offset })
    }

    fn location(&self, file: &Utf8Path, index: usize, line: &str) -> LocationData {
        let column = line.get(..self.offset).map_or(0, |prefix| prefix.chars().count()) + 1;
        LocationData::new(file.as_str())
            .at(to_position(index + 1), to_position(column))
            .with_length(to_position(self.specifier.chars().count()))
            .with_line_text(line)
    }
}

fn to_position(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn unreadable(error: &SourceError, location: Option<LocationData>) -> MessageData {
    let message = MessageData::new(error.to_string()).with_id(UNREADABLE_SOURCE_ID);
    match location {
        Some(location) => message.with_location(location),
        None => message,
    }
}

/// Hex SHA-256 of `contents`, truncated to `length` characters.
///
/// Used for change detection only.
#[must_use]
pub fn content_hash(contents: &[u8], length: usize) -> String {
    let mut hex: String = Sha256::digest(contents)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect();
    hex.truncate(length);
    hex
}
