//! Build contexts.
//!
//! A context fixes a set of options and the plugin stages their setup
//! produced, then runs any number of builds. A build moves through three
//! phases: start hooks, source loading and bundling, and output. Cancellation
//! is checked between phases.
//!
//! Asynchronous builds run on a dedicated named thread. Their result record
//! is released by the engine as soon as the completion dispatch returns.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use stitch_abi::alloc::{export_build_result, release_build_result};
use stitch_abi::contract;
use stitch_abi::dispatch::stitch_build_async_callback_dispatch;
use stitch_abi::owned::{BuildOutcome, MessageData};
use stitch_abi::{BuildAsyncCallback, CallbackKind, DispatchError};
use tracing::{debug, warn};

use crate::bundler::Bundler;
use crate::error::EngineError;
use crate::options::{BuildOptions, EntryPoint};
use crate::plugin::{self, PluginStage};
use crate::runtime;
use crate::source::SourceFs;
use crate::token::Token;

/// Tracing target for context builds.
const CONTEXT_TARGET: &str = "stitch_engine::context";

/// Diagnostic identifier carried by the error of a cancelled build.
pub const CANCELLED_ID: &str = "cancelled";

/// Text of the error carried by a cancelled build.
pub const CANCELLED_TEXT: &str = "build was cancelled";

/// Cancellation bookkeeping.
///
/// Every build records the generation current when it entered and counts as
/// cancelled once the generation moves on. A cancel with builds running
/// advances the generation; a cancel while idle is held as `pending` and
/// advances it for the next build to enter. Builds that enter after a cancel
/// never see it, whether or not the builds it targeted noticed.
#[derive(Debug, Default)]
struct CancelState {
    generation: u64,
    pending: bool,
    in_flight: usize,
}

/// Generation a build entered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Epoch(u64);

/// A configured build context.
pub struct Context {
    entry_points: Vec<EntryPoint>,
    bundle: bool,
    source: Arc<dyn SourceFs>,
    stages: Vec<PluginStage>,
    cancel: Mutex<CancelState>,
}

impl Context {
    /// Validates `options` and runs every plugin's setup once.
    ///
    /// # Errors
    ///
    /// Returns the validation messages when the options are unusable. No
    /// plugin setup runs in that case.
    pub fn create(options: &BuildOptions) -> Result<Self, Vec<MessageData>> {
        let problems = options.validate();
        if !problems.is_empty() {
            debug!(target: CONTEXT_TARGET, problems = problems.len(), "rejected build options");
            return Err(problems);
        }
        let stages = options.plugins.iter().map(plugin::PluginDescriptor::set_up).collect();
        Ok(Self {
            entry_points: options.entry_points.clone(),
            bundle: options.bundle,
            source: Arc::clone(&options.source),
            stages,
            cancel: Mutex::new(CancelState::default()),
        })
    }

    /// Runs a build on the calling thread.
    #[must_use]
    pub fn build(&self) -> BuildOutcome {
        let epoch = self.enter();
        self.run(epoch)
    }

    /// Starts a build on an engine thread and reports it through `callback`.
    ///
    /// A cancel issued after this returns applies to the started build.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Dispatch`] when `callback` is null.
    pub fn build_async(
        self: &Arc<Self>,
        callback: BuildAsyncCallback,
        data: Token,
    ) -> Result<(), EngineError> {
        if callback.is_none() {
            return Err(DispatchError::NullCallback {
                kind: CallbackKind::BuildAsync,
            }
            .into());
        }
        let epoch = self.enter();
        let context = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(String::from("stitch-build"))
            .spawn(move || deliver(callback, context.run(epoch), data));
        if let Err(error) = spawned {
            warn!(target: CONTEXT_TARGET, %error, "build thread spawn failed");
            self.leave();
            let failure =
                MessageData::new(format!("Could not start a build thread: {error}")).with_id("spawn-failed");
            deliver(callback, BuildOutcome::failed(failure), data);
        }
        Ok(())
    }

    /// Requests cancellation of running builds, or of the next build when
    /// none is running.
    pub fn cancel(&self) {
        let mut state = self.lock_cancel();
        if state.in_flight == 0 {
            state.pending = true;
        } else {
            state.generation = state.generation.wrapping_add(1);
        }
        debug!(
            target: CONTEXT_TARGET,
            in_flight = state.in_flight,
            generation = state.generation,
            "cancellation requested"
        );
    }

    /// Plugin stages prepared for this context.
    #[must_use]
    pub fn stages(&self) -> &[PluginStage] {
        &self.stages
    }

    fn enter(&self) -> Epoch {
        let mut state = self.lock_cancel();
        state.in_flight += 1;
        let epoch = Epoch(state.generation);
        if state.pending {
            state.pending = false;
            state.generation = state.generation.wrapping_add(1);
        }
        epoch
    }

    fn leave(&self) {
        let mut state = self.lock_cancel();
        state.in_flight = state.in_flight.saturating_sub(1);
    }

    fn is_cancelled(&self, epoch: Epoch) -> bool {
        self.lock_cancel().generation != epoch.0
    }

    fn lock_cancel(&self) -> MutexGuard<'_, CancelState> {
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn run(&self, epoch: Epoch) -> BuildOutcome {
        let outcome = self.execute(epoch);
        self.leave();
        outcome.unwrap_or_else(|| {
            debug!(target: CONTEXT_TARGET, "build cancelled");
            BuildOutcome::failed(MessageData::new(CANCELLED_TEXT).with_id(CANCELLED_ID))
        })
    }

    /// Returns `None` when the build was cancelled between phases.
    fn execute(&self, epoch: Epoch) -> Option<BuildOutcome> {
        if self.is_cancelled(epoch) {
            return None;
        }
        let start = plugin::run_on_start(&self.stages);
        if !start.errors.is_empty() {
            debug!(target: CONTEXT_TARGET, errors = start.errors.len(), "start hooks failed the build");
            return Some(BuildOutcome {
                output_files: Vec::new(),
                errors: start.errors,
                warnings: start.warnings,
            });
        }
        if self.is_cancelled(epoch) {
            return None;
        }

        let config = runtime::config();
        let entries = Bundler::new(self.source.as_ref(), self.bundle, config.hash_length())
            .build_all(&self.entry_points, config.worker_threads());
        if self.is_cancelled(epoch) {
            return None;
        }

        let mut outcome = BuildOutcome {
            warnings: start.warnings,
            ..BuildOutcome::default()
        };
        for entry in entries {
            outcome.output_files.extend(entry.output);
            outcome.errors.extend(entry.errors);
            outcome.warnings.extend(entry.warnings);
        }
        debug!(
            target: CONTEXT_TARGET,
            outputs = outcome.output_files.len(),
            errors = outcome.errors.len(),
            warnings = outcome.warnings.len(),
            "build finished"
        );
        Some(outcome)
    }
}

/// Exports `outcome`, dispatches it, and releases it once the callback has
/// returned.
pub(crate) fn deliver(callback: BuildAsyncCallback, outcome: BuildOutcome, data: Token) {
    let record = export_build_result(outcome);
    // SAFETY: `callback` was checked non-null when the build was requested,
    // and `record` stays live until the dispatch returns.
    unsafe { stitch_build_async_callback_dispatch(callback, record, data.as_ptr()) };
    // SAFETY: `record` came from the allocator above and is released once.
    if let Err(error) = unsafe { release_build_result(record) } {
        contract::violation(&error);
    }
}

#[cfg(test)]
mod tests;
