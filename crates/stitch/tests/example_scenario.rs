//! End-to-end scenarios against the public host API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use camino::Utf8Path;
use rstest::{fixture, rstest};
use stitch::{
    BuildOptions, BuildResult, Context, MemoryFs, OnStartResult, Plugin, PluginBuilder, SourceError,
    SourceFs,
};

#[fixture]
fn sources() -> MemoryFs {
    MemoryFs::new()
        .with_file("src/a.js", "import \"./util.js\";\nimport \"./util.js\";\na();\n")
        .with_file("src/util.js", "util();\n")
        .with_file("src/b.js", "b();\n")
}

fn options(sources: MemoryFs) -> BuildOptions {
    BuildOptions::new()
        .bundle(true)
        .source_fs(sources)
        .entry_point("src/a.js", "dist/a.js")
        .entry_point("src/b.js", "dist/b.js")
}

fn hashes(result: &BuildResult) -> Vec<(String, String)> {
    result
        .output_files()
        .iter()
        .map(|file| (file.path().to_owned(), file.hash().to_owned()))
        .collect()
}

#[rstest]
fn async_build_reports_outputs_and_warning_once(sources: MemoryFs) {
    let context = Context::new(&options(sources)).expect("valid options");
    let calls = Arc::new(AtomicUsize::new(0));
    let (sender, receiver) = mpsc::channel();
    let counter = Arc::clone(&calls);
    context.build_async_with(move |result| {
        counter.fetch_add(1, Ordering::SeqCst);
        sender.send(result).expect("receiver alive");
    });

    let result = receiver.recv_timeout(Duration::from_secs(10)).expect("build completes");
    thread::sleep(Duration::from_millis(50));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.output_files().len(), 2);
    assert_eq!(result.warnings().len(), 1);
    assert!(result.errors().is_empty());

    let warning = result.warnings().first().expect("one warning");
    assert_eq!(warning.id(), Some("duplicate-import"));
    let location = warning.location().expect("located");
    assert_eq!((location.file(), location.line()), ("src/a.js", Some(2)));
    assert_eq!(warning.notes().len(), 1);
}

#[rstest]
fn hashes_follow_contents(sources: MemoryFs) {
    let first = stitch::build(&options(sources.clone()));
    let again = stitch::build(&options(sources.clone()));
    assert_eq!(hashes(&first), hashes(&again));

    let changed = stitch::build(&options(sources.with_file("src/b.js", "b(1);\n")));
    let (before, after) = (hashes(&first), hashes(&changed));
    assert_eq!(before[0], after[0]);
    assert_eq!(before[1].0, after[1].0);
    assert_ne!(before[1].1, after[1].1);
}

/// Records every read alongside hook events.
#[derive(Clone)]
struct Journal {
    inner: MemoryFs,
    events: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    fn push(&self, event: impl Into<String>) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl SourceFs for Journal {
    fn read(&self, path: &Utf8Path) -> Result<String, SourceError> {
        self.push(format!("read {path}"));
        self.inner.read(path)
    }

    fn exists(&self, path: &Utf8Path) -> bool {
        self.inner.exists(path)
    }
}

struct SlowStart {
    journal: Journal,
}

impl Plugin for SlowStart {
    fn name(&self) -> &str {
        "slow-start"
    }

    fn setup(&self, build: &mut PluginBuilder<'_>) {
        let journal = self.journal.clone();
        build.on_start(move || {
            journal.push("hook start");
            thread::sleep(Duration::from_millis(100));
            journal.push("hook end");
            OnStartResult::ok()
        });
    }
}

#[rstest]
fn start_hooks_finish_before_sources_are_read(sources: MemoryFs) {
    let journal = Journal {
        inner: sources,
        events: Arc::default(),
    };
    let options = BuildOptions::new()
        .bundle(true)
        .source_fs(journal.clone())
        .entry_point("src/b.js", "dist/b.js")
        .plugin(SlowStart {
            journal: journal.clone(),
        });

    let result = stitch::build_async(&options).wait();

    assert!(!result.is_error(), "{result:?}");
    assert_eq!(journal.events(), ["hook start", "hook end", "read src/b.js"]);
}
