#![forbid(unsafe_code)]

//! Flags threaded through evaluation, binding and notification.

use bitflags::bitflags;

bitflags! {
    /// Why an operation is running and how it should behave.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BindingFlags: u16 {
        /// A signal or behavior asks the binding to refresh its target.
        const UPDATE_TARGET_INSTANCE = 1 << 0;
        /// The change originates from the target side.
        const UPDATE_SOURCE_EXPRESSION = 1 << 1;
        const FROM_BIND = 1 << 2;
        const FROM_UNBIND = 1 << 3;
        const FROM_FLUSH = 1 << 4;
        /// Calls through a nullish receiver or to a nullish function fail
        /// instead of yielding `undefined`.
        const MUST_EVALUATE = 1 << 5;
        /// Connect synchronously during bind instead of going through the
        /// connect queue.
        const CONNECT_IMMEDIATE = 1 << 6;
        /// A property now holds a different collection instance.
        const INSTANCE_MUTATION = 1 << 7;
        /// A collection was mutated in place.
        const ITEMS_MUTATION = 1 << 8;
    }
}
