//! Tests driving the engine through its `extern "C"` surface.

use std::collections::HashSet;
use std::ffi::c_void;
use std::sync::{Mutex, mpsc};
use std::time::Duration;

use rstest::rstest;
use stitch_abi::PluginOnStartResult;
use stitch_abi::alloc::export_on_start_result;
use stitch_abi::dispatch::{stitch_build_result_destroy, stitch_context_result_destroy};
use stitch_abi::owned::{MessageData, OnStartOutcome};

use super::*;
use crate::source::MemoryFs;

const BUILDS: usize = 8;

fn options_with(source: MemoryFs, entries: &[(&str, &str)]) -> u64 {
    let options = stitch_build_options_create();
    stitch_build_options_bundle(options, true);
    for (input, output) in entries {
        // SAFETY: both strings outlive the call.
        unsafe {
            stitch_build_options_append_entry_point(
                options,
                input.as_ptr().cast(),
                input.len(),
                output.as_ptr().cast(),
                output.len(),
            );
        }
    }
    set_source_fs(options, Arc::new(source)).expect("options are live");
    options
}

/// Completion sink: `(build index, output paths, error count)`.
type Completion = (usize, Vec<String>, usize);

struct Sink {
    index: usize,
    sender: mpsc::Sender<Completion>,
}

unsafe extern "C" fn collect(result: *mut BuildResult, data: *mut c_void) {
    // SAFETY: the token is a boxed sink handed over for exactly one completion.
    let sink = unsafe { Box::from_raw(data.cast::<Sink>()) };
    // SAFETY: the result is live for the duration of the callback.
    let outcome = unsafe { BuildOutcome::from_raw(&*result) };
    let paths = outcome.output_files.into_iter().map(|file| file.path).collect();
    sink.sender
        .send((sink.index, paths, outcome.errors.len()))
        .expect("receiver alive");
}

#[rstest]
fn concurrent_builds_each_complete_once_with_their_own_outputs() {
    let mut source = MemoryFs::new();
    for index in 0..BUILDS {
        source.insert(format!("entry{index}.js"), format!("build({index});"));
    }
    let (sender, receiver) = mpsc::channel::<Completion>();

    let mut contexts = Vec::new();
    for index in 0..BUILDS {
        let input = format!("entry{index}.js");
        let output = format!("out/{index}.js");
        let options = options_with(source.clone(), &[(input.as_str(), output.as_str())]);
        let mut context = 0;
        // SAFETY: `context` is a valid out pointer.
        let problems = unsafe { stitch_context_create(options, &raw mut context) };
        assert!(problems.is_null());
        stitch_build_options_destroy(options);

        let sink = Box::into_raw(Box::new(Sink {
            index,
            sender: sender.clone(),
        }));
        // SAFETY: `collect` consumes the boxed sink exactly once.
        unsafe { stitch_context_build_async(context, Some(collect), sink.cast()) };
        contexts.push(context);
    }
    drop(sender);

    let mut seen = HashSet::new();
    for _ in 0..BUILDS {
        let (index, paths, errors) = receiver
            .recv_timeout(Duration::from_secs(30))
            .expect("every build completes");
        assert!(seen.insert(index), "build {index} completed twice");
        assert_eq!(paths, [format!("out/{index}.js")]);
        assert_eq!(errors, 0);
    }
    assert!(receiver.recv_timeout(Duration::from_millis(100)).is_err());

    for context in contexts {
        stitch_context_destroy(context);
    }
}

#[rstest]
fn invalid_options_return_a_context_result() {
    let options = stitch_build_options_create();
    let mut context = u64::MAX;
    // SAFETY: `context` is a valid out pointer.
    let problems = unsafe { stitch_context_create(options, &raw mut context) };

    assert_eq!(context, 0);
    assert!(!problems.is_null());
    // SAFETY: the record is live until destroyed below.
    let messages = unsafe { MessageData::copy_all((*problems).messages.cast_const(), (*problems).messages_len) };
    assert_eq!(messages.len(), 1);
    // SAFETY: destroyed exactly once.
    unsafe { stitch_context_result_destroy(problems) };
    stitch_build_options_destroy(options);
}

#[rstest]
fn one_shot_build_reports_missing_entry() {
    let options = options_with(MemoryFs::new(), &[("test/not_exist.js", "out.js")]);
    let result = stitch_build(options);

    // SAFETY: the record is live until destroyed below.
    let outcome = unsafe { BuildOutcome::from_raw(&*result) };
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].text, "Could not resolve \"test/not_exist.js\"");
    // SAFETY: destroyed exactly once.
    unsafe { stitch_build_result_destroy(result) };
    stitch_build_options_destroy(options);
}

/// Plugin state: an event log and how many times cleanup ran.
#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<&'static str>>,
}

impl Recorder {
    fn push(data: *mut c_void, event: &'static str) {
        // SAFETY: tests pass a pointer to a live recorder.
        let recorder = unsafe { &*data.cast::<Self>() };
        recorder.events.lock().expect("events lock").push(event);
    }
}

unsafe extern "C" fn recorder_setup(build: u64, data: *mut c_void) {
    Recorder::push(data, "setup");
    // SAFETY: the hook and token stay valid while the plugin lives.
    unsafe { stitch_plugin_builder_on_start(build, Some(recorder_on_start), data) };
}

unsafe extern "C" fn recorder_on_start(data: *mut c_void) -> *mut PluginOnStartResult {
    Recorder::push(data, "start");
    export_on_start_result(OnStartOutcome::default().with_warning(MessageData::new("noted")))
}

unsafe extern "C" fn recorder_destroy(data: *mut c_void) {
    Recorder::push(data, "destroy");
}

#[rstest]
fn plugin_lifecycle_through_the_surface() {
    let recorder = Recorder::default();
    let token = std::ptr::from_ref(&recorder).cast_mut().cast::<c_void>();
    let name = "recorder";
    // SAFETY: callbacks only touch the recorder, which outlives the plugin.
    let plugin = unsafe {
        stitch_plugin_create(
            name.as_ptr().cast(),
            name.len(),
            Some(recorder_setup),
            token,
            Some(recorder_destroy),
        )
    };
    let options = options_with(MemoryFs::new().with_file("a.js", "a();"), &[("a.js", "a.out.js")]);
    stitch_build_options_add_plugin(options, plugin);
    stitch_plugin_destroy(plugin);

    let result = stitch_build(options);
    // SAFETY: the record is live until destroyed below.
    let outcome = unsafe { BuildOutcome::from_raw(&*result) };
    // SAFETY: destroyed exactly once.
    unsafe { stitch_build_result_destroy(result) };

    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].plugin_name, "recorder");
    assert_eq!(outcome.output_files.len(), 1);

    stitch_build_options_destroy(options);
    let events = recorder.events.lock().expect("events lock").clone();
    assert_eq!(events, ["setup", "start", "destroy"]);
}
