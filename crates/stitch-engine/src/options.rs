//! Build options assembled through option handles.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use camino::Utf8PathBuf;
use stitch_abi::owned::MessageData;

use crate::plugin::PluginDescriptor;
use crate::source::{OsFs, SourceFs};

/// One input file and the output path it is emitted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    /// Source path, relative to the source root.
    pub input: Utf8PathBuf,
    /// Output path recorded on the emitted file.
    pub output: Utf8PathBuf,
}

impl EntryPoint {
    /// Creates an entry point.
    #[must_use]
    pub fn new(input: impl Into<Utf8PathBuf>, output: impl Into<Utf8PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
        }
    }
}

/// Everything a context needs to run builds.
#[derive(Clone)]
pub struct BuildOptions {
    /// Entry points in build order.
    pub entry_points: Vec<EntryPoint>,
    /// Inline imports instead of copying entries verbatim.
    pub bundle: bool,
    /// Plugins in registration order.
    pub plugins: Vec<Arc<PluginDescriptor>>,
    /// Where sources are read from.
    pub source: Arc<dyn SourceFs>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            entry_points: Vec::new(),
            bundle: false,
            plugins: Vec::new(),
            source: Arc::new(OsFs::default()),
        }
    }
}

impl fmt::Debug for BuildOptions {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("BuildOptions")
            .field("entry_points", &self.entry_points)
            .field("bundle", &self.bundle)
            .field(
                "plugins",
                &self.plugins.iter().map(|plugin| plugin.name()).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl BuildOptions {
    /// Checks the options before a context is created.
    ///
    /// Returns one message per problem; an empty list means the options are
    /// usable.
    #[must_use]
    pub fn validate(&self) -> Vec<MessageData> {
        let mut messages = Vec::new();
        if self.entry_points.is_empty() {
            messages.push(
                MessageData::new("At least one entry point is required").with_id("no-entry-points"),
            );
        }
        let mut outputs = HashSet::new();
        for (index, entry) in self.entry_points.iter().enumerate() {
            if entry.input.as_str().is_empty() {
                messages.push(
                    MessageData::new(format!("Entry point {} has an empty input path", index + 1))
                        .with_id("empty-entry-input"),
                );
            }
            if !outputs.insert(&entry.output) {
                messages.push(
                    MessageData::new(format!(
                        "Two entry points write to the same output path \"{}\"",
                        entry.output
                    ))
                    .with_id("duplicate-output"),
                );
            }
        }
        messages
    }
}
