//! Crate-level integration and BDD tests.

use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::task::{Context as TaskContext, Poll, Waker};
use std::thread;
use std::time::Duration;

use rstest::{fixture, rstest};

use crate::plugin::HOOK_PANIC_ID;
use crate::{BuildOptions, BuildResult, Context, MemoryFs, OnStartResult, Plugin, PluginBuilder};

mod cancellation;
mod hooks;

#[fixture]
fn options() -> BuildOptions {
    BuildOptions::new().bundle(true).source_fs(
        MemoryFs::new()
            .with_file("index.js", "import \"./lib.js\";\nmain();\n")
            .with_file("lib.js", "lib();\n"),
    )
    .entry_point("index.js", "out/index.js")
}

struct Panicky;

impl Plugin for Panicky {
    fn name(&self) -> &str {
        "panicky"
    }

    fn setup(&self, build: &mut PluginBuilder<'_>) {
        build.on_start(|| panic!("hook exploded"));
    }
}

struct Warner;

impl Plugin for Warner {
    fn name(&self) -> &str {
        "warner"
    }

    fn setup(&self, build: &mut PluginBuilder<'_>) {
        assert_eq!(build.plugin_name(), "warner");
        build.on_start(|| OnStartResult::warning("cache is cold"));
    }
}

#[rstest]
fn synchronous_build_bundles_imports(options: BuildOptions) {
    let result = crate::build(&options);

    assert!(!result.is_error(), "{result:?}");
    let file = result.output_files().first().expect("one output");
    assert_eq!(file.path(), "out/index.js");
    assert_eq!(file.text(), Some("lib();\nmain();\n"));
    assert_eq!(file.to_owned_data().contents, file.contents());
}

#[rstest]
fn polled_future_resolves(options: BuildOptions) {
    let mut future = pin!(crate::build_async(&options));
    let mut cx = TaskContext::from_waker(Waker::noop());
    let result = loop {
        if let Poll::Ready(result) = future.as_mut().poll(&mut cx) {
            break result;
        }
        thread::sleep(Duration::from_millis(5));
    };
    assert_eq!(result.output_files().len(), 1);
}

#[rstest]
fn completion_runs_exactly_once(options: BuildOptions) {
    let context = Context::new(&options).expect("valid options");
    let calls = Arc::new(AtomicUsize::new(0));
    let (sender, receiver) = mpsc::channel::<BuildResult>();
    let counter = Arc::clone(&calls);
    context.build_async_with(move |result| {
        counter.fetch_add(1, Ordering::SeqCst);
        sender.send(result).expect("receiver alive");
    });
    drop(context);

    let result = receiver.recv().expect("one result");
    assert!(receiver.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.output_files().len(), 1);
}

#[rstest]
fn results_outlive_their_context(options: BuildOptions) {
    let context = Context::new(&options).expect("valid options");
    let future = context.build_async();
    drop(context);
    drop(options);

    let result = future.wait();
    assert_eq!(result.output_files().len(), 1);
}

#[rstest]
fn panicking_hook_becomes_an_error(options: BuildOptions) {
    let result = crate::build(&options.plugin(Panicky));

    let error = result.errors().first().expect("an error");
    assert_eq!(error.id(), Some(HOOK_PANIC_ID));
    assert_eq!(error.plugin_name(), Some("panicky"));
    assert!(error.text().contains("hook exploded"), "{error}");
    assert!(result.output_files().is_empty());
}

#[rstest]
fn hook_warnings_accompany_outputs(options: BuildOptions) {
    let context = Context::new(&options.plugin(Warner)).expect("valid options");

    for _ in 0..2 {
        let result = context.build();
        assert!(!result.is_error());
        let warnings: Vec<String> = result.warnings().iter().map(ToString::to_string).collect();
        assert_eq!(warnings, ["[plugin warner] cache is cold"]);
        assert_eq!(result.output_files().len(), 1);
    }
}

#[rstest]
fn context_error_lists_every_problem() {
    let options = BuildOptions::new()
        .entry_point("", "out/a.js")
        .entry_point("b.js", "out/a.js");

    let error = Context::new(&options).err().expect("invalid options");
    let ids: Vec<Option<&str>> = error.messages().iter().map(|message| message.id()).collect();
    assert_eq!(ids, [Some("empty-entry-input"), Some("duplicate-output")]);
    assert!(error.to_string().starts_with("invalid build options: "));
}

#[rstest]
fn copied_outcome_matches_the_views(options: BuildOptions) {
    let result = crate::build(&options);
    let outcome = result.to_outcome();
    let copy = BuildResult::from_outcome(outcome.clone());

    assert_eq!(copy.to_outcome(), outcome);
    assert_eq!(copy.output_files()[0].hash(), result.output_files()[0].hash());
}
