#![forbid(unsafe_code)]

//! Observable collections: arrays, maps and sets.
//!
//! The collection types here are the explicit alternative to patching a
//! runtime's built-in mutators. Every mutation goes through a method on
//! [`ArrayRef`], [`MapRef`] or [`SetRef`]; each method performs the native
//! operation first, then describes what happened as a [`ChangeRecord`] and
//! hands it to the collection's attached [`MutationHook`], provided reporting
//! for that kind is switched on in [`crate::instrumentation`].
//!
//! A collection carries at most one observer, attached through a hidden slot
//! that is not part of the collection's contents.
//!
//! # Invariants
//!
//! 1. A record is emitted only after the mutation is complete, so the hook
//!    observes the post-mutation state.
//! 2. No-op mutations (popping an empty array, adding an existing set member,
//!    setting a map key to its current value, deleting a missing key) emit
//!    nothing.
//! 3. No borrow of the collection is held while the hook or a user comparator
//!    runs.
//! 4. Every read through the public read API is reported to the active
//!    dependency recorder; the `*_untracked` variants are not.

pub mod array;
pub mod map;
pub mod set;

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::instrumentation::{self, CollectionKinds};
use crate::value::Value;

pub use array::ArrayRef;
pub use map::MapRef;
pub use set::SetRef;

/// Description of one completed mutation.
#[derive(Clone, Debug, PartialEq)]
pub enum ChangeRecord {
    /// Array items removed and/or inserted at `index`.
    /// Covers `push`, `pop`, `shift`, `unshift`, `splice` and length changes.
    Splice {
        index: usize,
        removed: Vec<Value>,
        added: usize,
    },
    /// An existing array slot was overwritten.
    Set { index: usize, old: Value, value: Value },
    /// Array items were permuted in place (`sort`, `reverse`).
    /// `permutation[new_index] == old_index`.
    Reorder { permutation: Vec<usize> },
    /// A map entry or set member was appended at `index`.
    Add { index: usize, key: Value, value: Value },
    /// A map entry at `index` received a different value.
    Update {
        index: usize,
        key: Value,
        old: Value,
        value: Value,
    },
    /// A map entry or set member at `index` was removed.
    Delete { index: usize, key: Value, old: Value },
    /// All `removed` entries were dropped.
    Clear { removed: usize },
}

impl ChangeRecord {
    /// Short name of the mutation kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Splice { .. } => "splice",
            Self::Set { .. } => "set",
            Self::Reorder { .. } => "reorder",
            Self::Add { .. } => "add",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::Clear { .. } => "clear",
        }
    }

    /// Length of the collection before this mutation, given its length after.
    #[must_use]
    pub fn previous_len(&self, new_len: usize) -> usize {
        match self {
            Self::Splice { removed, added, .. } => (new_len + removed.len()).saturating_sub(*added),
            Self::Set { .. } | Self::Reorder { .. } | Self::Update { .. } => new_len,
            Self::Add { .. } => new_len.saturating_sub(1),
            Self::Delete { .. } => new_len + 1,
            Self::Clear { removed } => new_len + removed,
        }
    }
}

/// Receiver of a collection's change records.
pub trait MutationHook {
    /// Called once per completed mutation with the collection's new length.
    fn on_mutation(&self, record: ChangeRecord, new_len: usize);
}

/// Hidden observer slot shared by all collection kinds.
#[derive(Default)]
pub(crate) struct ObserverSlot {
    hook: RefCell<Option<Rc<dyn MutationHook>>>,
    observer: RefCell<Option<Rc<dyn Any>>>,
}

impl ObserverSlot {
    pub(crate) fn attach(&self, hook: Rc<dyn MutationHook>, observer: Rc<dyn Any>) {
        *self.hook.borrow_mut() = Some(hook);
        *self.observer.borrow_mut() = Some(observer);
    }

    pub(crate) fn detach(&self) {
        self.hook.borrow_mut().take();
        self.observer.borrow_mut().take();
    }

    pub(crate) fn observer(&self) -> Option<Rc<dyn Any>> {
        self.observer.borrow().clone()
    }

    pub(crate) fn emit(&self, kind: CollectionKinds, record: ChangeRecord, new_len: usize) {
        if !instrumentation::is_enabled(kind) {
            return;
        }
        let hook = self.hook.borrow().clone();
        if let Some(hook) = hook {
            #[cfg(feature = "tracing")]
            tracing::trace!(kind = record.kind(), new_len, "collection mutation");
            hook.on_mutation(record, new_len);
        }
    }
}
