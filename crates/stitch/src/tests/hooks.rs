//! Lifetime of start hooks registered by host plugins.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rstest::{fixture, rstest};

use crate::{BuildOptions, Context, MemoryFs, OnStartResult, Plugin, PluginBuilder};

/// Each hook holds a reference to `note`, so its strong count tracks how
/// many hooks are alive.
struct Noted {
    note: Arc<str>,
}

impl Plugin for Noted {
    fn name(&self) -> &str {
        "noted"
    }

    fn setup(&self, build: &mut PluginBuilder<'_>) {
        let note = Arc::clone(&self.note);
        build.on_start(move || OnStartResult::warning(&*note));
    }
}

#[fixture]
fn note() -> Arc<str> {
    Arc::from("cache is cold")
}

fn options(note: &Arc<str>) -> BuildOptions {
    BuildOptions::new()
        .source_fs(MemoryFs::new().with_file("index.js", "main();\n"))
        .entry_point("index.js", "out/index.js")
        .plugin(Noted {
            note: Arc::clone(note),
        })
}

fn wait_for_count(note: &Arc<str>, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Arc::strong_count(note) != expected {
        assert!(
            Instant::now() < deadline,
            "{} references held, expected {expected}",
            Arc::strong_count(note)
        );
        thread::sleep(Duration::from_millis(5));
    }
}

#[rstest]
fn one_shot_builds_do_not_accumulate_hooks(note: Arc<str>) {
    let options = options(&note);

    for _ in 0..5 {
        let result = crate::build(&options);
        assert_eq!(result.warnings().len(), 1);
    }

    // The test and the plugin; no hook survives its build.
    assert_eq!(Arc::strong_count(&note), 2);
}

#[rstest]
fn async_one_shot_builds_release_hooks_once_reported(note: Arc<str>) {
    let options = options(&note);

    for _ in 0..3 {
        let result = crate::build_async(&options).wait();
        assert_eq!(result.warnings().len(), 1);
    }

    wait_for_count(&note, 2);
}

#[rstest]
fn contexts_keep_their_hooks_until_dropped(note: Arc<str>) {
    let options = options(&note);
    let first = Context::new(&options).expect("valid options");
    let second = Context::new(&options).expect("valid options");
    assert_eq!(Arc::strong_count(&note), 4);

    for _ in 0..3 {
        assert_eq!(first.build().warnings().len(), 1);
    }
    assert_eq!(Arc::strong_count(&note), 4);

    drop(first);
    assert_eq!(Arc::strong_count(&note), 3);
    drop(second);
    assert_eq!(Arc::strong_count(&note), 2);
}

#[rstest]
fn plugin_goes_with_the_last_context(note: Arc<str>) {
    let context = Context::new(&options(&note)).expect("valid options");
    // Options are gone; the context still holds the plugin and its hook.
    assert_eq!(Arc::strong_count(&note), 3);

    let future = context.build_async();
    drop(context);
    assert_eq!(future.wait().warnings().len(), 1);

    wait_for_count(&note, 1);
}
