//! Process-wide ledger of live top-level records.
//!
//! Every record handed out by the allocator is registered by address and
//! kind. Releasing an address that is not registered (already released, or
//! never allocated here) is reported instead of freeing memory twice.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use once_cell::sync::Lazy;

use crate::error::{RecordKind, ReleaseError};

static LIVE: Lazy<Mutex<HashMap<usize, RecordKind>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn live() -> MutexGuard<'static, HashMap<usize, RecordKind>> {
    // The map is updated by single insert/remove calls, so a poisoned guard
    // still holds a consistent table.
    LIVE.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Forces the ledger's lazy state.
pub(crate) fn initialise() {
    Lazy::force(&LIVE);
}

pub(super) fn track(kind: RecordKind, address: usize) {
    live().insert(address, kind);
}

pub(super) fn untrack(kind: RecordKind, address: usize) -> Result<(), ReleaseError> {
    let mut table = live();
    match table.get(&address).copied() {
        Some(found) if found == kind => {
            table.remove(&address);
            Ok(())
        }
        Some(found) => Err(ReleaseError::KindMismatch {
            expected: kind,
            found,
            address,
        }),
        None => Err(ReleaseError::UnknownRecord { kind, address }),
    }
}

pub(super) fn contains(address: usize) -> bool {
    live().contains_key(&address)
}
