//! Plugin descriptors, setup scopes, and start hooks.
//!
//! A plugin is a name, a setup callback and an opaque token. When a context
//! is created every plugin's setup callback runs once with a fresh build
//! handle; start hooks registered against that handle during the callback
//! are kept for the context's builds. The handle is retired as soon as the
//! callback returns.
//!
//! The destructor runs exactly once, when the last owner of the descriptor
//! (the plugin table, build options, contexts) releases it.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use stitch_abi::dispatch::{
    stitch_plugin_build_callback_dispatch, stitch_plugin_callback_on_start_dispatch,
    stitch_plugin_destructor_dispatch, stitch_plugin_on_start_result_destroy,
};
use stitch_abi::owned::{MessageData, OnStartOutcome};
use stitch_abi::{
    CallbackKind, DispatchError, PluginBuildCallback, PluginCallbackOnStart, PluginDestructor,
};
use tracing::{debug, trace};

use crate::error::{EngineError, HandleKind};
use crate::handles::HandleTable;
use crate::token::Token;

/// Tracing target for plugin lifecycle events.
const PLUGIN_TARGET: &str = "stitch_engine::plugin";

/// Start hooks collected per open setup scope.
static SETUP_SCOPES: Lazy<HandleTable<Vec<OnStartHook>>> = Lazy::new(HandleTable::new);

/// A registered plugin.
pub struct PluginDescriptor {
    name: String,
    setup: PluginBuildCallback,
    data: Token,
    destructor: PluginDestructor,
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("data", &self.data)
            .finish_non_exhaustive()
    }
}

impl PluginDescriptor {
    /// Creates a descriptor. A null `destructor` means the token needs no
    /// cleanup.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::NullCallback`] when `setup` is null.
    pub fn new(
        name: impl Into<String>,
        setup: PluginBuildCallback,
        data: Token,
        destructor: PluginDestructor,
    ) -> Result<Self, DispatchError> {
        if setup.is_none() {
            return Err(DispatchError::NullCallback {
                kind: CallbackKind::PluginBuild,
            });
        }
        Ok(Self {
            name: name.into(),
            setup,
            data,
            destructor,
        })
    }

    /// Plugin name, stamped on its diagnostics.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the setup callback under a fresh build handle and returns the
    /// hooks it registered.
    #[must_use]
    pub fn set_up(self: &Arc<Self>) -> PluginStage {
        let build = SETUP_SCOPES.insert(Vec::new());
        debug!(target: PLUGIN_TARGET, plugin = %self.name, build, "running plugin setup");
        // SAFETY: `setup` is non-null and the token is the one the plugin
        // registered with it.
        unsafe { stitch_plugin_build_callback_dispatch(self.setup, build, self.data.as_ptr()) };
        let hooks = SETUP_SCOPES.remove(build).unwrap_or_default();
        trace!(target: PLUGIN_TARGET, plugin = %self.name, hooks = hooks.len(), "plugin setup finished");
        PluginStage {
            plugin: Arc::clone(self),
            hooks,
        }
    }
}

impl Drop for PluginDescriptor {
    fn drop(&mut self) {
        if self.destructor.is_none() {
            return;
        }
        debug!(target: PLUGIN_TARGET, plugin = %self.name, "releasing plugin state");
        // SAFETY: the destructor is non-null and receives the token it was
        // registered with; this is the descriptor's only drop.
        unsafe { stitch_plugin_destructor_dispatch(self.destructor, self.data.as_ptr()) };
    }
}

/// A start hook registered during setup.
#[derive(Debug, Clone, Copy)]
pub struct OnStartHook {
    callback: PluginCallbackOnStart,
    data: Token,
}

/// A plugin together with the hooks its setup registered.
#[derive(Debug, Clone)]
pub struct PluginStage {
    plugin: Arc<PluginDescriptor>,
    hooks: Vec<OnStartHook>,
}

impl PluginStage {
    /// The plugin this stage belongs to.
    #[must_use]
    pub fn plugin(&self) -> &PluginDescriptor {
        &self.plugin
    }

    /// Number of start hooks registered.
    #[must_use]
    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }
}

/// Registers a start hook against an open setup scope.
///
/// # Errors
///
/// Returns [`EngineError::Dispatch`] when `callback` is null and
/// [`EngineError::UnknownHandle`] when `build` is not an open setup scope.
pub fn register_on_start(
    build: u64,
    callback: PluginCallbackOnStart,
    data: Token,
) -> Result<(), EngineError> {
    if callback.is_none() {
        return Err(DispatchError::NullCallback {
            kind: CallbackKind::PluginOnStart,
        }
        .into());
    }
    SETUP_SCOPES
        .with(build, |hooks| hooks.push(OnStartHook { callback, data }))
        .ok_or_else(|| EngineError::unknown(HandleKind::Build, build))
}

/// Runs every start hook in plugin order and merges what they report.
///
/// Each hook blocks until it returns. Returned records are copied and
/// destroyed immediately; diagnostics without a plugin name are stamped with
/// the plugin's.
#[must_use]
pub fn run_on_start(stages: &[PluginStage]) -> OnStartOutcome {
    let mut merged = OnStartOutcome::default();
    for stage in stages {
        for hook in &stage.hooks {
            trace!(target: PLUGIN_TARGET, plugin = %stage.plugin.name, "running start hook");
            // SAFETY: the hook was registered non-null with this token.
            let record =
                unsafe { stitch_plugin_callback_on_start_dispatch(hook.callback, hook.data.as_ptr()) };
            if record.is_null() {
                continue;
            }
            // SAFETY: a non-null hook result is a live record owned by the
            // engine from here on; it is copied, then destroyed exactly once.
            let copied = unsafe { OnStartOutcome::from_raw(&*record) };
            // SAFETY: as above.
            unsafe { stitch_plugin_on_start_result_destroy(record) };

            let name = stage.plugin.name();
            merged
                .errors
                .extend(copied.errors.into_iter().map(|message| stamp(message, name)));
            merged
                .warnings
                .extend(copied.warnings.into_iter().map(|message| stamp(message, name)));
        }
    }
    merged
}

fn stamp(message: MessageData, plugin_name: &str) -> MessageData {
    if message.plugin_name.is_empty() {
        message.with_plugin_name(plugin_name)
    } else {
        message
    }
}

/// Returns `true` when `build` is an open setup scope.
#[must_use]
pub fn is_open_scope(build: u64) -> bool {
    SETUP_SCOPES.contains(build)
}
