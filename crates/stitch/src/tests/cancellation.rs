//! Cancelling context builds, directly and through dropped futures.

use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use rstest::{fixture, rstest};

use crate::{
    BuildFuture, BuildOptions, BuildResult, CANCELLED_ID, Context, MemoryFs, OnStartResult, Plugin,
    PluginBuilder,
};

const PATIENCE: Duration = Duration::from_secs(10);

/// Start hook that reports when it runs and then waits to be let through.
struct Turnstile {
    entered: mpsc::Sender<()>,
    release: Arc<Mutex<mpsc::Receiver<()>>>,
}

impl Plugin for Turnstile {
    fn name(&self) -> &str {
        "turnstile"
    }

    fn setup(&self, build: &mut PluginBuilder<'_>) {
        let entered = self.entered.clone();
        let release = Arc::clone(&self.release);
        build.on_start(move || {
            entered.send(()).expect("test is listening");
            release
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .recv_timeout(PATIENCE)
                .expect("test lets the build through");
            OnStartResult::ok()
        });
    }
}

/// The test's side of a [`Turnstile`].
struct Keeper {
    entered: mpsc::Receiver<()>,
    release: mpsc::Sender<()>,
}

impl Keeper {
    fn await_entry(&self) {
        self.entered
            .recv_timeout(PATIENCE)
            .expect("a build reached its start hook");
    }

    fn admit(&self) {
        self.release.send(()).expect("hook is alive");
    }
}

struct Gated {
    context: Context,
    keeper: Keeper,
}

#[fixture]
fn gated() -> Gated {
    let (entered, entered_rx) = mpsc::channel();
    let (release_tx, release) = mpsc::channel();
    let options = BuildOptions::new()
        .source_fs(MemoryFs::new().with_file("index.js", "main();\n"))
        .entry_point("index.js", "out/index.js")
        .plugin(Turnstile {
            entered,
            release: Arc::new(Mutex::new(release)),
        });
    Gated {
        context: Context::new(&options).expect("valid options"),
        keeper: Keeper {
            entered: entered_rx,
            release: release_tx,
        },
    }
}

fn assert_cancelled(result: &BuildResult) {
    let ids: Vec<Option<&str>> = result.errors().iter().map(|message| message.id()).collect();
    assert_eq!(ids, [Some(CANCELLED_ID)]);
    assert!(result.output_files().is_empty());
}

fn assert_next_build_succeeds(gated: &Gated) {
    gated.keeper.admit();
    let next = gated.context.build();
    assert!(!next.is_error(), "{next:?}");
    assert_eq!(next.output_files().len(), 1);
}

fn wait_until_finished(future: &BuildFuture) {
    let deadline = Instant::now() + PATIENCE;
    while !future.is_finished() {
        assert!(Instant::now() < deadline, "build never finished");
        thread::sleep(Duration::from_millis(5));
    }
}

#[rstest]
fn cancel_during_a_build_fails_that_build_only(gated: Gated) {
    let future = gated.context.build_async();
    gated.keeper.await_entry();
    assert!(!future.is_finished());

    gated.context.cancel_all();
    gated.keeper.admit();
    assert_cancelled(&future.wait());

    assert_next_build_succeeds(&gated);
}

#[rstest]
fn dropping_a_cancellable_future_early_cancels_running_builds(gated: Gated) {
    let (sender, receiver) = mpsc::channel();
    gated.context.build_async_with(move |result| {
        sender.send(result).expect("receiver alive");
    });
    gated.keeper.await_entry();
    let abandoned = gated.context.build_async().cancellable();
    gated.keeper.await_entry();
    assert!(!abandoned.is_finished());

    drop(abandoned);
    gated.keeper.admit();
    gated.keeper.admit();
    let observed = receiver.recv_timeout(PATIENCE).expect("observer completes");
    assert_cancelled(&observed);

    assert_next_build_succeeds(&gated);
}

#[rstest]
fn dropping_a_delivered_cancellable_future_changes_nothing(gated: Gated) {
    let future = gated.context.build_async().cancellable();
    gated.keeper.await_entry();
    gated.keeper.admit();
    wait_until_finished(&future);

    drop(future);

    assert_next_build_succeeds(&gated);
}

#[rstest]
fn plain_futures_never_cancel(gated: Gated) {
    let future = gated.context.build_async();
    gated.keeper.await_entry();
    drop(future);
    gated.keeper.admit();

    assert_next_build_succeeds(&gated);
}
