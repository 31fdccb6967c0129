//! Completion handling for asynchronous builds.
//!
//! The engine's completion callback only borrows its record, so the
//! trampoline copies it into a result the host owns before anything else
//! sees it.

use std::ffi::c_void;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::task::{Context as TaskContext, Poll, Waker};

use stitch_abi::BuildAsyncCallback;
use stitch_abi::owned::BuildOutcome;
use stitch_engine::ffi::stitch_context_cancel;
use tracing::debug;

use super::{BUILD_TARGET, BuildResult};
use crate::context::ContextHandle;
use crate::plugin::{HookScope, collect_setups};

type OnComplete = Box<dyn FnOnce(BuildResult) + Send>;

/// Everything the completion trampoline needs, handed over as the token.
struct Completion {
    on_complete: OnComplete,
    /// Keeps the engine context alive until the build has reported back.
    _context: Option<Arc<ContextHandle>>,
    /// Hooks set up by a one-shot build, filled in once `start` returns.
    _hooks: Arc<Mutex<HookScope>>,
}

unsafe extern "C" fn complete(result: *mut stitch_abi::BuildResult, data: *mut c_void) {
    // SAFETY: `data` is the boxed completion leaked by `dispatch_with`; the
    // engine delivers each build exactly once.
    let completion = unsafe { Box::from_raw(data.cast::<Completion>()) };
    // SAFETY: the record is live until this callback returns.
    let outcome = unsafe { BuildOutcome::from_raw(&*result) };
    (completion.on_complete)(BuildResult::from_outcome(outcome));
}

/// Starts a build through `start`, calling `on_complete` with the result.
pub(crate) fn dispatch_with(
    context: Option<Arc<ContextHandle>>,
    on_complete: impl FnOnce(BuildResult) + Send + 'static,
    start: impl FnOnce(BuildAsyncCallback, *mut c_void),
) {
    let hooks = Arc::new(Mutex::new(HookScope::default()));
    let completion = Box::new(Completion {
        on_complete: Box::new(on_complete),
        _context: context,
        _hooks: Arc::clone(&hooks),
    });
    let data = Box::into_raw(completion).cast();
    let ((), scope) = collect_setups(|| start(Some(complete), data));
    // The build may already have completed; the last of the two owners frees
    // the hooks either way.
    *hooks.lock().unwrap_or_else(PoisonError::into_inner) = scope;
}

/// Starts a build through `start` and returns a future for its result.
pub(crate) fn start_async(
    context: Option<Arc<ContextHandle>>,
    start: impl FnOnce(BuildAsyncCallback, *mut c_void),
) -> BuildFuture {
    let shared = Arc::new(Shared::default());
    let sink = Arc::clone(&shared);
    dispatch_with(context.clone(), move |result| sink.complete(result), start);
    BuildFuture {
        shared,
        context,
        cancellable: false,
    }
}

#[derive(Default)]
struct State {
    result: Option<BuildResult>,
    delivered: bool,
    waker: Option<Waker>,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    ready: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn complete(&self, result: BuildResult) {
        let waker = {
            let mut state = self.lock();
            state.result = Some(result);
            state.delivered = true;
            state.waker.take()
        };
        self.ready.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// A build running on an engine thread.
///
/// Await it, or block on [`BuildFuture::wait`]. A future made
/// [`cancellable`](BuildFuture::cancellable) cancels its context's builds when
/// dropped before the result arrives.
pub struct BuildFuture {
    shared: Arc<Shared>,
    context: Option<Arc<ContextHandle>>,
    cancellable: bool,
}

impl BuildFuture {
    /// Cancels the build if this future is dropped before it completes.
    ///
    /// Has no effect on one-shot builds, which have no context to cancel.
    #[must_use]
    pub fn cancellable(mut self) -> Self {
        self.cancellable = true;
        self
    }

    /// Returns `true` once the engine has delivered the result.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.shared.lock().delivered
    }

    /// Blocks the calling thread until the result arrives.
    ///
    /// Must not be called after the future has been polled to completion.
    #[must_use]
    pub fn wait(self) -> BuildResult {
        let mut state = self.shared.lock();
        loop {
            if let Some(result) = state.result.take() {
                return result;
            }
            state = self
                .shared
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Future for BuildFuture {
    type Output = BuildResult;

    fn poll(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        let mut state = self.shared.lock();
        match state.result.take() {
            Some(result) => Poll::Ready(result),
            None => {
                state.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl Drop for BuildFuture {
    fn drop(&mut self) {
        if !self.cancellable || self.shared.lock().delivered {
            return;
        }
        if let Some(context) = &self.context {
            debug!(target: BUILD_TARGET, context = context.handle(), "cancelling abandoned build");
            stitch_context_cancel(context.handle());
        }
    }
}
