#![forbid(unsafe_code)]

//! Process-wide switch for collection mutation reporting.
//!
//! Collections always run their mutators natively. Whether a mutator also
//! reports a [`ChangeRecord`](crate::collection::ChangeRecord) to the
//! collection's attached observer is governed here, per collection kind.
//! An observer locator enables the kind the first time it hands out an
//! observer for it; disabling turns every instance of that kind back into a
//! plain, silent container.
//!
//! The runtime is single-threaded, so "process-wide" means per thread.

use std::cell::Cell;

use bitflags::bitflags;

bitflags! {
    /// Collection kinds with mutation reporting enabled.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct CollectionKinds: u8 {
        const ARRAY = 1 << 0;
        const MAP = 1 << 1;
        const SET = 1 << 2;
    }
}

thread_local! {
    static ENABLED: Cell<CollectionKinds> = const { Cell::new(CollectionKinds::empty()) };
}

/// Turn on mutation reporting for `kinds`. Idempotent.
pub fn enable(kinds: CollectionKinds) {
    ENABLED.with(|enabled| {
        let before = enabled.get();
        if !before.contains(kinds) {
            enabled.set(before | kinds);
            #[cfg(feature = "tracing")]
            tracing::debug!(?kinds, "collection observation enabled");
        }
    });
}

/// Turn off mutation reporting for `kinds`. Idempotent.
pub fn disable(kinds: CollectionKinds) {
    ENABLED.with(|enabled| {
        let before = enabled.get();
        if before.intersects(kinds) {
            enabled.set(before - kinds);
            #[cfg(feature = "tracing")]
            tracing::debug!(?kinds, "collection observation disabled");
        }
    });
}

/// Whether every kind in `kinds` currently reports mutations.
#[must_use]
pub fn is_enabled(kinds: CollectionKinds) -> bool {
    ENABLED.with(|enabled| enabled.get().contains(kinds))
}

pub fn enable_array_observation() {
    enable(CollectionKinds::ARRAY);
}

pub fn disable_array_observation() {
    disable(CollectionKinds::ARRAY);
}

pub fn enable_map_observation() {
    enable(CollectionKinds::MAP);
}

pub fn disable_map_observation() {
    disable(CollectionKinds::MAP);
}

pub fn enable_set_observation() {
    enable(CollectionKinds::SET);
}

pub fn disable_set_observation() {
    disable(CollectionKinds::SET);
}
