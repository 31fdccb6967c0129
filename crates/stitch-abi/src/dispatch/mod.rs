//! Dispatch entry points: the only call path into foreign callbacks.
//!
//! Each callback signature has one trampoline. The engine never calls a
//! registered function pointer directly; it goes through the `extern "C"`
//! entry points below, which reject null pointers and log every invocation.
//! The `invoke_*` functions are the fallible Rust form of the same calls.
//!
//! Dispatches are synchronous. They run on whichever engine thread triggers
//! them, so callbacks must not assume they run on the caller's thread.

use std::ffi::c_void;

use tracing::trace;

use crate::alloc;
use crate::callbacks::{
    BuildAsyncCallback, PluginBuildCallback, PluginCallbackOnStart, PluginDestructor,
};
use crate::contract;
use crate::error::{CallbackKind, DispatchError};
use crate::records::{BuildResult, ContextResult, PluginOnStartResult};

/// Tracing target for callback dispatch.
const DISPATCH_TARGET: &str = "stitch_abi::dispatch";

/// Invokes a build-completion callback once.
///
/// # Safety
///
/// `callback` must be safe to call with `result` and `data`. `result` stays
/// owned by the engine; the callback may only read it until it returns.
///
/// # Errors
///
/// Returns [`DispatchError::NullCallback`] when `callback` is null; the
/// callback is not invoked.
pub unsafe fn invoke_build_async(
    callback: BuildAsyncCallback,
    result: *mut BuildResult,
    data: *mut c_void,
) -> Result<(), DispatchError> {
    let callback = require(callback, CallbackKind::BuildAsync)?;
    trace!(target: DISPATCH_TARGET, ?result, ?data, "dispatching build completion");
    // SAFETY: forwarded from the caller.
    unsafe { callback(result, data) };
    Ok(())
}

/// Invokes a plugin setup callback once for one build phase.
///
/// # Safety
///
/// `callback` must be safe to call with `handle` and `data`.
///
/// # Errors
///
/// Returns [`DispatchError::NullCallback`] when `callback` is null.
pub unsafe fn invoke_plugin_build(
    callback: PluginBuildCallback,
    handle: u64,
    data: *mut c_void,
) -> Result<(), DispatchError> {
    let callback = require(callback, CallbackKind::PluginBuild)?;
    trace!(target: DISPATCH_TARGET, handle, ?data, "dispatching plugin setup");
    // SAFETY: forwarded from the caller.
    unsafe { callback(handle, data) };
    Ok(())
}

/// Invokes a plugin destructor.
///
/// # Safety
///
/// `callback` must be safe to call with `data`, and `data` must not be used
/// by the engine afterwards.
///
/// # Errors
///
/// Returns [`DispatchError::NullCallback`] when `callback` is null.
pub unsafe fn invoke_plugin_destructor(
    callback: PluginDestructor,
    data: *mut c_void,
) -> Result<(), DispatchError> {
    let callback = require(callback, CallbackKind::PluginDestructor)?;
    trace!(target: DISPATCH_TARGET, ?data, "dispatching plugin destructor");
    // SAFETY: forwarded from the caller.
    unsafe { callback(data) };
    Ok(())
}

/// Invokes a plugin start hook and returns its result record.
///
/// The call blocks until the hook returns. A null record means the hook
/// produced no diagnostics.
///
/// # Safety
///
/// `callback` must be safe to call with `data`.
///
/// # Errors
///
/// Returns [`DispatchError::NullCallback`] when `callback` is null.
pub unsafe fn invoke_plugin_on_start(
    callback: PluginCallbackOnStart,
    data: *mut c_void,
) -> Result<*mut PluginOnStartResult, DispatchError> {
    let callback = require(callback, CallbackKind::PluginOnStart)?;
    trace!(target: DISPATCH_TARGET, ?data, "dispatching plugin start hook");
    // SAFETY: forwarded from the caller.
    let result = unsafe { callback(data) };
    trace!(target: DISPATCH_TARGET, ?result, "plugin start hook returned");
    Ok(result)
}

fn require<F>(callback: Option<F>, kind: CallbackKind) -> Result<F, DispatchError> {
    callback.ok_or(DispatchError::NullCallback { kind })
}

/// Delivers an asynchronous build result to the caller.
///
/// # Safety
///
/// See [`invoke_build_async`]. A null `callback` aborts the process.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stitch_build_async_callback_dispatch(
    callback: BuildAsyncCallback,
    result: *mut BuildResult,
    data: *mut c_void,
) {
    // SAFETY: forwarded from the caller.
    if let Err(error) = unsafe { invoke_build_async(callback, result, data) } {
        contract::violation(&error);
    }
}

/// Runs a plugin's setup callback for one build phase.
///
/// # Safety
///
/// See [`invoke_plugin_build`]. A null `callback` aborts the process.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stitch_plugin_build_callback_dispatch(
    callback: PluginBuildCallback,
    handle: u64,
    data: *mut c_void,
) {
    // SAFETY: forwarded from the caller.
    if let Err(error) = unsafe { invoke_plugin_build(callback, handle, data) } {
        contract::violation(&error);
    }
}

/// Hands a plugin's opaque state back to its destructor.
///
/// # Safety
///
/// See [`invoke_plugin_destructor`]. A null `callback` aborts the process.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stitch_plugin_destructor_dispatch(
    callback: PluginDestructor,
    data: *mut c_void,
) {
    // SAFETY: forwarded from the caller.
    if let Err(error) = unsafe { invoke_plugin_destructor(callback, data) } {
        contract::violation(&error);
    }
}

/// Runs a plugin start hook and returns its result record.
///
/// # Safety
///
/// See [`invoke_plugin_on_start`]. A null `callback` aborts the process.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stitch_plugin_callback_on_start_dispatch(
    callback: PluginCallbackOnStart,
    data: *mut c_void,
) -> *mut PluginOnStartResult {
    // SAFETY: forwarded from the caller.
    match unsafe { invoke_plugin_on_start(callback, data) } {
        Ok(result) => result,
        Err(error) => contract::violation(&error),
    }
}

/// Releases a plugin start result. Null is a no-op; any second release of
/// the same record aborts the process.
///
/// # Safety
///
/// `result` must be null or a record allocated by
/// [`alloc::export_on_start_result`] that nobody reads afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stitch_plugin_on_start_result_destroy(result: *mut PluginOnStartResult) {
    // SAFETY: forwarded from the caller.
    if let Err(error) = unsafe { alloc::release_on_start_result(result) } {
        contract::violation(&error);
    }
}

/// Releases a build result returned by a synchronous build. Null is a no-op.
///
/// # Safety
///
/// `result` must be null or a record allocated by
/// [`alloc::export_build_result`] that nobody reads afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stitch_build_result_destroy(result: *mut BuildResult) {
    // SAFETY: forwarded from the caller.
    if let Err(error) = unsafe { alloc::release_build_result(result) } {
        contract::violation(&error);
    }
}

/// Releases a context result. Null is a no-op.
///
/// # Safety
///
/// `result` must be null or a record allocated by
/// [`alloc::export_context_result`] that nobody reads afterwards.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn stitch_context_result_destroy(result: *mut ContextResult) {
    // SAFETY: forwarded from the caller.
    if let Err(error) = unsafe { alloc::release_context_result(result) } {
        contract::violation(&error);
    }
}
