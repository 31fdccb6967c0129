//! Owned build options.

use std::fmt;
use std::sync::Arc;

use camino::Utf8Path;
use stitch_abi::contract;
use stitch_engine::SourceFs;
use stitch_engine::ffi::{
    set_source_fs, stitch_build_options_add_plugin, stitch_build_options_append_entry_point,
    stitch_build_options_bundle, stitch_build_options_create, stitch_build_options_destroy,
    stitch_build_options_set_root_dir,
};

use crate::plugin::{Plugin, register};

/// Build options held by the engine and released on drop.
///
/// Configured by value:
///
/// ```
/// use stitch::BuildOptions;
///
/// let options = BuildOptions::new()
///     .bundle(true)
///     .entry_point("src/index.js", "dist/index.js");
/// # drop(options);
/// ```
pub struct BuildOptions {
    handle: u64,
}

impl BuildOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handle: stitch_build_options_create(),
        }
    }

    pub(crate) const fn handle(&self) -> u64 {
        self.handle
    }

    /// Adds an entry point read from `input` and emitted at `output`.
    #[must_use]
    pub fn entry_point(self, input: impl AsRef<str>, output: impl AsRef<str>) -> Self {
        let (input, output) = (input.as_ref(), output.as_ref());
        // SAFETY: both strings outlive the call, which copies them.
        unsafe {
            stitch_build_options_append_entry_point(
                self.handle,
                input.as_ptr().cast(),
                input.len(),
                output.as_ptr().cast(),
                output.len(),
            );
        }
        self
    }

    /// Inlines imports into each entry point.
    #[must_use]
    pub fn bundle(self, bundle: bool) -> Self {
        stitch_build_options_bundle(self.handle, bundle);
        self
    }

    /// Reads sources relative to `root` on the local filesystem.
    #[must_use]
    pub fn root_dir(self, root: impl AsRef<Utf8Path>) -> Self {
        let root = root.as_ref().as_str();
        // SAFETY: the string outlives the call, which copies it.
        unsafe { stitch_build_options_set_root_dir(self.handle, root.as_ptr().cast(), root.len()) };
        self
    }

    /// Reads sources through `source` instead of the local filesystem.
    #[must_use]
    pub fn source_fs(self, source: impl SourceFs + 'static) -> Self {
        if let Err(error) = set_source_fs(self.handle, Arc::new(source)) {
            contract::violation(&error);
        }
        self
    }

    /// Attaches a plugin. Its setup runs each time a context is created from
    /// these options.
    #[must_use]
    pub fn plugin(self, plugin: impl Plugin) -> Self {
        let plugin = register(plugin);
        stitch_build_options_add_plugin(self.handle, plugin.handle());
        self
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BuildOptions {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("BuildOptions")
            .field("handle", &self.handle)
            .finish()
    }
}

impl Drop for BuildOptions {
    fn drop(&mut self) {
        stitch_build_options_destroy(self.handle);
    }
}
