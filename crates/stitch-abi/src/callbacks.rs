//! Function-pointer signatures a caller may register with the engine.
//!
//! Each signature is wrapped in `Option` so a null pointer coming from the
//! foreign side stays representable; the dispatch layer rejects it.

use std::ffi::c_void;

use crate::records::{BuildResult, PluginOnStartResult};

/// Receives the result of an asynchronous build together with the caller's
/// context token. The result is only valid until the callback returns.
pub type BuildAsyncCallback =
    Option<unsafe extern "C" fn(result: *mut BuildResult, data: *mut c_void)>;

/// Plugin setup callback, invoked once per build phase with a build handle
/// that is valid only for the duration of the call.
pub type PluginBuildCallback = Option<unsafe extern "C" fn(handle: u64, data: *mut c_void)>;

/// Releases the plugin's opaque state once the engine is finished with it.
pub type PluginDestructor = Option<unsafe extern "C" fn(data: *mut c_void)>;

/// Plugin start hook. A null return means the hook produced no diagnostics;
/// otherwise the engine releases the record with
/// [`crate::dispatch::stitch_plugin_on_start_result_destroy`] after reading it.
pub type PluginCallbackOnStart =
    Option<unsafe extern "C" fn(data: *mut c_void) -> *mut PluginOnStartResult>;
