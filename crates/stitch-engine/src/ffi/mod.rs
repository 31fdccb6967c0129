//! The engine's `extern "C"` surface.
//!
//! Objects are referred to by integer handles. Unknown handles, null
//! callbacks and null output pointers are contract violations and fail
//! loudly through [`contract::violation`]. Every entry point runs
//! [`stitch_runtime_init`] first.
//!
//! Records returned by value (`*mut BuildResult`, `*mut ContextResult`) belong
//! to the caller, who releases them with the matching destroy entry point from
//! `stitch_abi::dispatch`. Records delivered to a completion callback are
//! released by the engine once the callback returns.

use std::ffi::{c_char, c_void};
use std::ptr;
use std::sync::Arc;

use camino::Utf8PathBuf;
use once_cell::sync::Lazy;
use stitch_abi::alloc::{export_build_result, export_context_result};
use stitch_abi::owned::BuildOutcome;
use stitch_abi::runtime::stitch_runtime_init;
use stitch_abi::{
    BuildAsyncCallback, BuildResult, CallbackKind, ContextResult, DispatchError,
    PluginBuildCallback, PluginCallbackOnStart, PluginDestructor, contract, raw,
};
use tracing::debug;

use crate::context::{self, Context};
use crate::error::{EngineError, HandleKind};
use crate::handles::HandleTable;
use crate::options::{BuildOptions, EntryPoint};
use crate::plugin::{self, PluginDescriptor};
use crate::source::{OsFs, SourceFs};
use crate::token::Token;

/// Tracing target for the foreign surface.
const FFI_TARGET: &str = "stitch_engine::ffi";

static OPTIONS: Lazy<HandleTable<BuildOptions>> = Lazy::new(HandleTable::new);
static PLUGINS: Lazy<HandleTable<Arc<PluginDescriptor>>> = Lazy::new(HandleTable::new);
static CONTEXTS: Lazy<HandleTable<Arc<Context>>> = Lazy::new(HandleTable::new);

fn enforce<T>(result: Result<T, EngineError>) -> T {
    match result {
        Ok(value) => value,
        Err(error) => contract::violation(&error),
    }
}

fn update_options(options: u64, f: impl FnOnce(&mut BuildOptions)) -> Result<(), EngineError> {
    OPTIONS
        .with(options, f)
        .ok_or_else(|| EngineError::unknown(HandleKind::Options, options))
}

fn options(options: u64) -> Result<BuildOptions, EngineError> {
    OPTIONS
        .get(options)
        .ok_or_else(|| EngineError::unknown(HandleKind::Options, options))
}

fn context(context: u64) -> Result<Arc<Context>, EngineError> {
    CONTEXTS
        .get(context)
        .ok_or_else(|| EngineError::unknown(HandleKind::Context, context))
}

/// Copies a caller string. Invalid UTF-8 reads as empty.
///
/// # Safety
///
/// `ptr`/`len` must describe readable memory, or `len` must be zero.
unsafe fn text(ptr: *const c_char, len: usize) -> String {
    // SAFETY: forwarded from the caller.
    unsafe { raw::str_or_empty(ptr, len) }.to_owned()
}

/// Replaces the source filesystem of an options handle.
///
/// This is a Rust-level extension for embedders linking the engine directly.
///
/// # Errors
///
/// Returns [`EngineError::UnknownHandle`] when `options` is not live.
pub fn set_source_fs(options: u64, source: Arc<dyn SourceFs>) -> Result<(), EngineError> {
    stitch_runtime_init();
    update_options(options, |target| target.source = source)
}

/// Creates an empty set of build options.
#[unsafe(no_mangle)]
pub extern "C" fn stitch_build_options_create() -> u64 {
    stitch_runtime_init();
    let handle = OPTIONS.insert(BuildOptions::default());
    debug!(target: FFI_TARGET, handle, "build options created");
    handle
}

/// Turns import inlining on or off.
#[unsafe(no_mangle)]
pub extern "C" fn stitch_build_options_bundle(options: u64, bundle: bool) {
    stitch_runtime_init();
    enforce(update_options(options, |target| target.bundle = bundle));
}

/// Appends an entry point.
///
/// # Safety
///
/// Both strings must be readable for their lengths.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stitch_build_options_append_entry_point(
    options: u64,
    input: *const c_char,
    input_len: usize,
    output: *const c_char,
    output_len: usize,
) {
    stitch_runtime_init();
    // SAFETY: forwarded from the caller.
    let entry = unsafe { EntryPoint::new(text(input, input_len), text(output, output_len)) };
    enforce(update_options(options, |target| target.entry_points.push(entry)));
}

/// Reads sources from disk below `root` instead of the working directory.
///
/// # Safety
///
/// `root` must be readable for `root_len` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stitch_build_options_set_root_dir(
    options: u64,
    root: *const c_char,
    root_len: usize,
) {
    stitch_runtime_init();
    // SAFETY: forwarded from the caller.
    let root = Utf8PathBuf::from(unsafe { text(root, root_len) });
    enforce(update_options(options, |target| {
        target.source = Arc::new(OsFs::new(root));
    }));
}

/// Adds a plugin. The options keep the plugin alive until they are destroyed.
#[unsafe(no_mangle)]
pub extern "C" fn stitch_build_options_add_plugin(options: u64, plugin: u64) {
    stitch_runtime_init();
    let descriptor = enforce(
        PLUGINS
            .get(plugin)
            .ok_or_else(|| EngineError::unknown(HandleKind::Plugin, plugin)),
    );
    enforce(update_options(options, |target| target.plugins.push(descriptor)));
}

/// Destroys an options handle. Contexts created from it are unaffected.
#[unsafe(no_mangle)]
pub extern "C" fn stitch_build_options_destroy(options: u64) {
    stitch_runtime_init();
    enforce(
        OPTIONS
            .remove(options)
            .map(drop)
            .ok_or_else(|| EngineError::unknown(HandleKind::Options, options)),
    );
}

/// Registers a plugin and returns its handle.
///
/// `destructor` may be null when `data` needs no cleanup; otherwise it runs
/// exactly once, after the last options or context using the plugin is gone
/// and the handle is destroyed.
///
/// # Safety
///
/// `name` must be readable for `name_len` bytes. `callback` and `destructor`
/// must be safe to call with `data` from any engine thread.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stitch_plugin_create(
    name: *const c_char,
    name_len: usize,
    callback: PluginBuildCallback,
    data: *mut c_void,
    destructor: PluginDestructor,
) -> u64 {
    stitch_runtime_init();
    // SAFETY: forwarded from the caller.
    let name = unsafe { text(name, name_len) };
    let descriptor = enforce(
        PluginDescriptor::new(name, callback, Token::new(data), destructor).map_err(EngineError::from),
    );
    let handle = PLUGINS.insert(Arc::new(descriptor));
    debug!(target: FFI_TARGET, handle, "plugin registered");
    handle
}

/// Releases the plugin handle.
#[unsafe(no_mangle)]
pub extern "C" fn stitch_plugin_destroy(plugin: u64) {
    stitch_runtime_init();
    enforce(
        PLUGINS
            .remove(plugin)
            .map(drop)
            .ok_or_else(|| EngineError::unknown(HandleKind::Plugin, plugin)),
    );
}

/// Registers a start hook. Only valid while the setup callback that received
/// `build` is running.
///
/// # Safety
///
/// `callback` must be safe to call with `data` from any engine thread for as
/// long as the plugin lives.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stitch_plugin_builder_on_start(
    build: u64,
    callback: PluginCallbackOnStart,
    data: *mut c_void,
) {
    stitch_runtime_init();
    enforce(plugin::register_on_start(build, callback, Token::new(data)));
}

/// Creates a context from `options`.
///
/// On success writes the context handle to `context` and returns null. On
/// invalid options writes `0` and returns the problems; the caller destroys
/// the record with `stitch_context_result_destroy`.
///
/// # Safety
///
/// `context` must be valid for a `u64` write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stitch_context_create(options: u64, context: *mut u64) -> *mut ContextResult {
    stitch_runtime_init();
    if context.is_null() {
        contract::violation(&EngineError::NullOutput {
            operation: "stitch_context_create",
        });
    }
    let options = enforce(self::options(options));
    let (handle, result) = match Context::create(&options) {
        Ok(created) => (CONTEXTS.insert(Arc::new(created)), ptr::null_mut()),
        Err(problems) => (0, export_context_result(problems)),
    };
    debug!(target: FFI_TARGET, handle, "context created");
    // SAFETY: checked non-null above; validity is the caller's contract.
    unsafe { context.write(handle) };
    result
}

/// Runs a build on the calling thread. The caller destroys the result with
/// `stitch_build_result_destroy`.
#[unsafe(no_mangle)]
pub extern "C" fn stitch_context_build(context: u64) -> *mut BuildResult {
    stitch_runtime_init();
    let context = enforce(self::context(context));
    export_build_result(context.build())
}

/// Starts a build on an engine thread. `callback` runs once with a result
/// that is only valid until it returns.
///
/// # Safety
///
/// `callback` must be safe to call with `data` from an engine thread.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stitch_context_build_async(
    context: u64,
    callback: BuildAsyncCallback,
    data: *mut c_void,
) {
    stitch_runtime_init();
    let context = enforce(self::context(context));
    enforce(context.build_async(callback, Token::new(data)));
}

/// Cancels the running builds of a context, or its next build when idle.
#[unsafe(no_mangle)]
pub extern "C" fn stitch_context_cancel(context: u64) {
    stitch_runtime_init();
    enforce(self::context(context)).cancel();
}

/// Destroys a context handle. Builds already running still complete.
#[unsafe(no_mangle)]
pub extern "C" fn stitch_context_destroy(context: u64) {
    stitch_runtime_init();
    enforce(
        CONTEXTS
            .remove(context)
            .map(drop)
            .ok_or_else(|| EngineError::unknown(HandleKind::Context, context)),
    );
}

/// Creates a throwaway context and runs one build on the calling thread.
///
/// Invalid options are reported as errors in the returned result.
#[unsafe(no_mangle)]
pub extern "C" fn stitch_build(options: u64) -> *mut BuildResult {
    stitch_runtime_init();
    let options = enforce(self::options(options));
    let outcome = match Context::create(&options) {
        Ok(created) => created.build(),
        Err(problems) => BuildOutcome {
            errors: problems,
            ..BuildOutcome::default()
        },
    };
    export_build_result(outcome)
}

/// Creates a throwaway context and runs one build on an engine thread.
///
/// Invalid options are reported through `callback` before this returns.
///
/// # Safety
///
/// As for [`stitch_context_build_async`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stitch_build_async(
    options: u64,
    callback: BuildAsyncCallback,
    data: *mut c_void,
) {
    stitch_runtime_init();
    if callback.is_none() {
        contract::violation(&DispatchError::NullCallback {
            kind: CallbackKind::BuildAsync,
        });
    }
    let options = enforce(self::options(options));
    let data = Token::new(data);
    match Context::create(&options) {
        Ok(created) => enforce(Arc::new(created).build_async(callback, data)),
        Err(problems) => context::deliver(
            callback,
            BuildOutcome {
                errors: problems,
                ..BuildOutcome::default()
            },
            data,
        ),
    }
}

#[cfg(test)]
mod tests;
