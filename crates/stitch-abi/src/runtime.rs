//! Process-wide initialisation hook.
//!
//! [`stitch_runtime_init`] must have run before the first engine entry point
//! executes. It is idempotent, and the engine calls it lazily from every
//! entry point, so embedders may also call it eagerly or repeatedly.
//!
//! On `x86_64` Windows under MSVC the static CRT does not run the
//! constructors of a statically linked runtime, so the hook is also placed in
//! the CRT initialiser table there.

use std::sync::Once;

use tracing::debug;

use crate::alloc;

/// Tracing target for runtime initialisation.
const RUNTIME_TARGET: &str = "stitch_abi::runtime";

static INIT: Once = Once::new();

/// Initialises process-wide state. Safe to call any number of times from any
/// thread; only the first call does work.
#[unsafe(no_mangle)]
pub extern "C" fn stitch_runtime_init() {
    INIT.call_once(|| {
        alloc::initialise_ledger();
        debug!(target: RUNTIME_TARGET, "runtime initialised");
    });
}

/// Returns `true` once [`stitch_runtime_init`] has completed.
#[must_use]
pub fn is_initialised() -> bool {
    INIT.is_completed()
}

#[cfg(all(target_family = "windows", target_arch = "x86_64", target_env = "msvc"))]
#[used]
#[unsafe(link_section = ".CRT$XCU")]
static STITCH_RUNTIME_INIT: extern "C" fn() = stitch_runtime_init;

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn repeated_and_concurrent_calls_are_safe() {
        let workers: Vec<_> = (0..4).map(|_| thread::spawn(|| stitch_runtime_init())).collect();
        for worker in workers {
            worker.join().expect("init thread");
        }
        stitch_runtime_init();
        assert!(is_initialised());
    }
}
