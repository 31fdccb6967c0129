//! Unit tests for context builds, driven through a mocked source filesystem.

use std::ffi::c_void;
use std::ptr;
use std::sync::mpsc;
use std::time::Duration;

use stitch_abi::owned::BuildOutcome;

use camino::Utf8Path;
use mockall::mock;
use rstest::{fixture, rstest};
use stitch_abi::BuildResult;
use stitch_abi::alloc::is_live;

use super::*;
use crate::source::{MemoryFs, SourceError};

mock! {
    Sources {}
    impl SourceFs for Sources {
        fn read(&self, path: &Utf8Path) -> Result<String, SourceError>;
        fn exists(&self, path: &Utf8Path) -> bool;
    }
}

#[fixture]
fn two_entries() -> Vec<EntryPoint> {
    vec![
        EntryPoint::new("a.js", "out/a.js"),
        EntryPoint::new("b.js", "out/b.js"),
    ]
}

fn context_over(source: impl SourceFs + 'static, entry_points: Vec<EntryPoint>) -> Context {
    let options = BuildOptions {
        entry_points,
        source: Arc::new(source),
        ..BuildOptions::default()
    };
    Context::create(&options).expect("valid options")
}

#[rstest]
fn entries_are_read_through_the_source_fs(two_entries: Vec<EntryPoint>) {
    let mut sources = MockSources::new();
    sources
        .expect_read()
        .times(2)
        .returning(|path| Ok(format!("// {path}\n")));
    sources.expect_exists().never();

    let outcome = context_over(sources, two_entries).build();

    assert!(!outcome.is_error());
    let paths: Vec<&str> = outcome.output_files.iter().map(|file| file.path.as_str()).collect();
    assert_eq!(paths, ["out/a.js", "out/b.js"]);
}

#[rstest]
fn read_failures_become_diagnostics(two_entries: Vec<EntryPoint>) {
    let mut sources = MockSources::new();
    sources.expect_read().returning(|path| {
        if path.as_str() == "a.js" {
            Err(SourceError::NotFound {
                path: path.to_path_buf(),
            })
        } else {
            Ok(String::from("b();\n"))
        }
    });

    let outcome = context_over(sources, two_entries).build();

    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].text, "Could not resolve \"a.js\"");
    assert_eq!(outcome.output_files.len(), 1);
}

#[rstest]
fn invalid_options_are_rejected_before_setup() {
    let problems = Context::create(&BuildOptions::default()).err().expect("no entry points");
    assert_eq!(problems.len(), 1);
}

#[rstest]
fn cancel_while_idle_applies_to_the_next_build_only(two_entries: Vec<EntryPoint>) {
    let source = MemoryFs::new().with_file("a.js", "a();").with_file("b.js", "b();");
    let context = context_over(source, two_entries);

    context.cancel();
    let cancelled = context.build();
    assert_eq!(cancelled.errors[0].text, CANCELLED_TEXT);
    assert!(cancelled.output_files.is_empty());

    let next = context.build();
    assert!(!next.is_error());
    assert_eq!(next.output_files.len(), 2);
}

#[rstest]
fn cancel_missed_by_a_finishing_build_does_not_reach_the_next(two_entries: Vec<EntryPoint>) {
    let source = MemoryFs::new().with_file("a.js", "a();").with_file("b.js", "b();");
    let context = context_over(source, two_entries);

    // A build past its last check: it entered, the cancel lands, and it
    // leaves without looking again.
    let epoch = context.enter();
    context.cancel();
    assert!(context.is_cancelled(epoch));
    context.leave();

    let next = context.build();
    assert!(!next.is_error(), "{:?}", next.errors);
    assert_eq!(next.output_files.len(), 2);
}

#[rstest]
fn cancel_while_running_leaves_nothing_pending(two_entries: Vec<EntryPoint>) {
    let source = MemoryFs::new().with_file("a.js", "a();").with_file("b.js", "b();");
    let context = context_over(source, two_entries);

    let first = context.enter();
    let second = context.enter();
    context.cancel();
    context.leave();
    context.leave();

    assert!(context.is_cancelled(first));
    assert!(context.is_cancelled(second));
    let third = context.enter();
    assert!(!context.is_cancelled(third));
    context.leave();
}

/// Source whose reads block until the test lets them through.
struct HeldSource {
    reading: mpsc::SyncSender<()>,
    release: Mutex<mpsc::Receiver<()>>,
    inner: MemoryFs,
}

impl SourceFs for HeldSource {
    fn read(&self, path: &Utf8Path) -> Result<String, SourceError> {
        self.reading.send(()).expect("test is waiting");
        self.release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .recv()
            .expect("test releases the read");
        self.inner.read(path)
    }

    fn exists(&self, path: &Utf8Path) -> bool {
        self.inner.exists(path)
    }
}

unsafe extern "C" fn send_outcome(result: *mut BuildResult, data: *mut c_void) {
    // SAFETY: the engine passes a live result; tests pass a sender token.
    let (outcome, sender) = unsafe {
        (
            BuildOutcome::from_raw(&*result),
            &*data.cast::<mpsc::Sender<BuildOutcome>>(),
        )
    };
    sender.send(outcome).expect("receiver alive");
}

#[rstest]
fn cancel_during_a_build_fails_it_and_spares_the_next() {
    let (reading, read_started) = mpsc::sync_channel(1);
    let (release, released) = mpsc::channel();
    let source = HeldSource {
        reading,
        release: Mutex::new(released),
        inner: MemoryFs::new().with_file("a.js", "a();"),
    };
    let context = Arc::new(context_over(source, vec![EntryPoint::new("a.js", "out/a.js")]));
    let (sender, receiver) = mpsc::channel::<BuildOutcome>();

    context
        .build_async(
            Some(send_outcome),
            Token::new(ptr::from_ref(&sender).cast_mut().cast()),
        )
        .expect("callback present");
    read_started
        .recv_timeout(Duration::from_secs(10))
        .expect("build reached its sources");
    context.cancel();
    release.send(()).expect("build is reading");

    let cancelled = receiver
        .recv_timeout(Duration::from_secs(10))
        .expect("completion dispatched");
    let ids: Vec<&str> = cancelled.errors.iter().map(|error| error.id.as_str()).collect();
    assert_eq!(ids, [CANCELLED_ID]);
    assert!(cancelled.output_files.is_empty());

    release.send(()).expect("context still reads");
    let next = context.build();
    assert!(!next.is_error(), "{:?}", next.errors);
    assert_eq!(next.output_files.len(), 1);
}

unsafe extern "C" fn send_error_count(result: *mut BuildResult, data: *mut c_void) {
    // SAFETY: the engine passes a live result; tests pass a sender token.
    let (errors, sender) = unsafe { ((*result).errors_len, &*data.cast::<mpsc::Sender<(usize, usize)>>()) };
    sender.send((errors, result.addr())).expect("receiver alive");
}

#[rstest]
fn async_result_is_released_after_dispatch(two_entries: Vec<EntryPoint>) {
    let source = MemoryFs::new().with_file("a.js", "a();").with_file("b.js", "b();");
    let context = Arc::new(context_over(source, two_entries));
    let (sender, receiver) = mpsc::channel::<(usize, usize)>();

    context
        .build_async(
            Some(send_error_count),
            Token::new(ptr::from_ref(&sender).cast_mut().cast()),
        )
        .expect("callback present");
    let (errors, address) = receiver
        .recv_timeout(Duration::from_secs(10))
        .expect("completion dispatched");

    assert_eq!(errors, 0);
    // Give the engine thread time to release after the callback returned.
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    while is_live(ptr::without_provenance_mut::<BuildResult>(address)) {
        assert!(std::time::Instant::now() < deadline, "result was never released");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[rstest]
fn null_async_callback_is_rejected(two_entries: Vec<EntryPoint>) {
    let context = Arc::new(context_over(MemoryFs::new(), two_entries));
    let error = context
        .build_async(None, Token::new(ptr::null_mut()))
        .expect_err("null callback");
    assert!(matches!(error, EngineError::Dispatch(_)));
}
