//! Rust plugins registered through the engine's plugin surface.
//!
//! A [`Plugin`] is shared through a state block whose address becomes the
//! plugin token. The engine hands the token back to the setup, start and
//! destructor trampolines below; the destructor releases the engine's
//! reference.
//!
//! Hooks are stored per setup run. Setups started through
//! [`collect_setups`] leave a [`HookScope`] behind, and dropping the scope
//! frees the hooks those runs registered. The host keeps the scope next to
//! the context (or one-shot build) the setups belong to. Setups run outside
//! a collection keep their hooks until the plugin itself is released.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use stitch_abi::PluginOnStartResult;
use stitch_abi::alloc::export_on_start_result;
use stitch_abi::owned::{MessageData, OnStartOutcome};
use stitch_engine::ffi::{stitch_plugin_builder_on_start, stitch_plugin_create, stitch_plugin_destroy};
use tracing::{debug, error};

/// Tracing target for host plugin trampolines.
const PLUGIN_TARGET: &str = "stitch::plugin";

/// Message id for a start hook that panicked.
pub const HOOK_PANIC_ID: &str = "plugin-panic";

/// A build plugin.
///
/// `setup` runs once for every context created from options carrying the
/// plugin. Hooks it registers may be called from any engine thread.
pub trait Plugin: Send + Sync + 'static {
    /// Name stamped on diagnostics raised by the plugin.
    fn name(&self) -> &str;

    /// Registers the plugin's hooks.
    fn setup(&self, build: &mut PluginBuilder<'_>);
}

/// Diagnostics returned by a start hook.
///
/// Errors abort the build before any source is read.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OnStartResult {
    outcome: OnStartOutcome,
}

impl OnStartResult {
    /// A result with no diagnostics.
    #[must_use]
    pub fn ok() -> Self {
        Self::default()
    }

    /// A result carrying a single error.
    #[must_use]
    pub fn error(message: impl Into<MessageData>) -> Self {
        Self::ok().with_error(message)
    }

    /// A result carrying a single warning.
    #[must_use]
    pub fn warning(message: impl Into<MessageData>) -> Self {
        Self::ok().with_warning(message)
    }

    /// Adds an error.
    #[must_use]
    pub fn with_error(self, message: impl Into<MessageData>) -> Self {
        Self {
            outcome: self.outcome.with_error(message.into()),
        }
    }

    /// Adds a warning.
    #[must_use]
    pub fn with_warning(self, message: impl Into<MessageData>) -> Self {
        Self {
            outcome: self.outcome.with_warning(message.into()),
        }
    }

    /// Returns `true` when there is nothing to report.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcome.is_empty()
    }

    fn into_record(self) -> *mut PluginOnStartResult {
        if self.outcome.is_empty() {
            ptr::null_mut()
        } else {
            export_on_start_result(self.outcome)
        }
    }
}

impl From<OnStartOutcome> for OnStartResult {
    fn from(outcome: OnStartOutcome) -> Self {
        Self { outcome }
    }
}

type HookFn = dyn Fn() -> OnStartResult + Send + Sync;

/// Double boxed so each hook has a thin, stable address.
type Hooks = Vec<Box<Box<HookFn>>>;

struct PluginState {
    plugin: Box<dyn Plugin>,
    /// Hooks keyed by the setup run that registered them.
    hooks: Mutex<HashMap<u64, Hooks>>,
}

impl PluginState {
    fn name(&self) -> &str {
        self.plugin.name()
    }

    fn hooks(&self) -> MutexGuard<'_, HashMap<u64, Hooks>> {
        self.hooks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of hooks currently held, across all setup runs.
    fn hook_count(&self) -> usize {
        self.hooks().values().map(Vec::len).sum()
    }
}

/// Keeps the hooks of one setup run alive.
struct HookLease {
    state: Arc<PluginState>,
    build: u64,
}

impl Drop for HookLease {
    fn drop(&mut self) {
        let released = self.state.hooks().remove(&self.build);
        if let Some(hooks) = released {
            debug!(
                target: PLUGIN_TARGET,
                plugin = self.state.name(),
                build = self.build,
                hooks = hooks.len(),
                "releasing start hooks"
            );
        }
    }
}

/// Hooks registered by the setup runs of one context or one-shot build.
///
/// They are freed when the scope is dropped, which must not happen before
/// the engine has finished every build that might call them.
#[derive(Default)]
pub(crate) struct HookScope {
    leases: Vec<HookLease>,
}

impl fmt::Debug for HookScope {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HookScope")
            .field("setups", &self.leases.len())
            .finish()
    }
}

thread_local! {
    /// Setup runs seen on this thread while a collection is open.
    static SETUPS: RefCell<Option<Vec<HookLease>>> = const { RefCell::new(None) };
}

/// Runs `create`, which may set up plugins on this thread, and returns the
/// scope owning the hooks those setups registered.
pub(crate) fn collect_setups<R>(create: impl FnOnce() -> R) -> (R, HookScope) {
    let outer = SETUPS.with_borrow_mut(|setups| setups.replace(Vec::new()));
    let value = create();
    let leases = SETUPS
        .with_borrow_mut(|setups| mem::replace(setups, outer))
        .unwrap_or_default();
    (value, HookScope { leases })
}

/// Registers start hooks while a plugin's setup runs.
pub struct PluginBuilder<'p> {
    build: u64,
    state: &'p PluginState,
}

impl PluginBuilder<'_> {
    /// Name of the plugin being set up.
    #[must_use]
    pub fn plugin_name(&self) -> &str {
        self.state.name()
    }

    /// Runs `hook` at the start of every build, before any source is read.
    pub fn on_start<F>(&mut self, hook: F)
    where
        F: Fn() -> OnStartResult + Send + Sync + 'static,
    {
        let boxed: Box<Box<HookFn>> = Box::new(Box::new(hook));
        let data = ptr::from_ref::<Box<HookFn>>(&*boxed).cast_mut().cast::<c_void>();
        self.state.hooks().entry(self.build).or_default().push(boxed);
        // SAFETY: the hook lives in the plugin state until its setup run's
        // scope is dropped, after the last build that can call it.
        unsafe { stitch_plugin_builder_on_start(self.build, Some(on_start), data) };
    }
}

impl fmt::Debug for PluginBuilder<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("PluginBuilder")
            .field("build", &self.build)
            .field("plugin", &self.state.name())
            .finish()
    }
}

fn panic_text(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Takes a new reference to the state behind a plugin token.
///
/// # Safety
///
/// `data` must be a token produced by `register` whose destructor has not
/// yet run.
unsafe fn shared_state(data: *mut c_void) -> Arc<PluginState> {
    let state = data.cast::<PluginState>().cast_const();
    // SAFETY: the engine's reference keeps the count above zero for the
    // duration of this call.
    unsafe {
        Arc::increment_strong_count(state);
        Arc::from_raw(state)
    }
}

unsafe extern "C" fn setup(build: u64, data: *mut c_void) {
    // SAFETY: `data` is the token made by `register`, alive until the
    // destructor.
    let state = unsafe { shared_state(data) };
    debug!(target: PLUGIN_TARGET, plugin = state.name(), build, "setting up plugin");
    let mut builder = PluginBuilder { build, state: &state };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| state.plugin.setup(&mut builder)));
    if let Err(payload) = outcome {
        error!(
            target: PLUGIN_TARGET,
            plugin = state.name(),
            panic = panic_text(payload.as_ref()),
            "plugin setup panicked"
        );
    }
    SETUPS.with_borrow_mut(|setups| {
        if let Some(open) = setups {
            open.push(HookLease { state, build });
        }
    });
}

unsafe extern "C" fn on_start(data: *mut c_void) -> *mut PluginOnStartResult {
    // SAFETY: `data` points at a hook owned by a live plugin state.
    let hook = unsafe { &*data.cast::<Box<HookFn>>() };
    match panic::catch_unwind(AssertUnwindSafe(|| hook())) {
        Ok(result) => result.into_record(),
        Err(payload) => {
            let text = format!("start hook panicked: {}", panic_text(payload.as_ref()));
            OnStartResult::error(MessageData::new(text).with_id(HOOK_PANIC_ID)).into_record()
        }
    }
}

unsafe extern "C" fn destroy(data: *mut c_void) {
    // SAFETY: the engine runs the destructor exactly once, after every other
    // use of the token, and so gives back the reference `register` leaked.
    let state = unsafe { Arc::from_raw(data.cast::<PluginState>().cast_const()) };
    debug!(
        target: PLUGIN_TARGET,
        plugin = state.name(),
        hooks = state.hook_count(),
        "releasing plugin"
    );
    if panic::catch_unwind(AssertUnwindSafe(move || drop(state))).is_err() {
        error!(target: PLUGIN_TARGET, "plugin panicked while dropping");
    }
}

/// A plugin handle owned by the host. The engine keeps the plugin alive for
/// as long as options or contexts reference it.
pub(crate) struct Registration {
    handle: u64,
}

impl Registration {
    pub(crate) const fn handle(&self) -> u64 {
        self.handle
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        stitch_plugin_destroy(self.handle);
    }
}

/// Hands `plugin` to the engine.
pub(crate) fn register(plugin: impl Plugin) -> Registration {
    let state = Arc::new(PluginState {
        plugin: Box::new(plugin),
        hooks: Mutex::new(HashMap::new()),
    });
    let name = state.name().to_owned();
    let data = Arc::into_raw(state).cast_mut().cast::<c_void>();
    // SAFETY: the name outlives the call; the trampolines accept `data` on any
    // thread because the state is `Send + Sync`.
    let handle = unsafe {
        stitch_plugin_create(name.as_ptr().cast(), name.len(), Some(setup), data, Some(destroy))
    };
    Registration { handle }
}
