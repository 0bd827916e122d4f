#![forbid(unsafe_code)]

//! Observable insertion-ordered map with `SameValueZero` keys.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::{ChangeRecord, MutationHook, ObserverSlot};
use crate::dependency;
use crate::instrumentation::CollectionKinds;
use crate::value::Value;

#[derive(Default)]
struct MapInner {
    entries: RefCell<Vec<(Value, Value)>>,
    slot: ObserverSlot,
}

/// Shared handle to an observable map.
#[derive(Clone, Default)]
pub struct MapRef(Rc<MapInner>);

impl MapRef {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from entries; later duplicates overwrite earlier ones in place.
    pub fn from_entries(entries: impl IntoIterator<Item = (Value, Value)>) -> Self {
        let map = Self::new();
        {
            let mut slots = map.0.entries.borrow_mut();
            for (key, value) in entries {
                match slots.iter_mut().find(|(k, _)| k.same_value_zero(&key)) {
                    Some(slot) => slot.1 = value,
                    None => slots.push((key, value)),
                }
            }
        }
        map
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakMapRef {
        WeakMapRef(Rc::downgrade(&self.0))
    }

    fn track(&self) {
        dependency::collection_read(Value::Map(self.clone()));
    }

    fn position(&self, key: &Value) -> Option<usize> {
        self.0
            .entries
            .borrow()
            .iter()
            .position(|(k, _)| k.same_value_zero(key))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.track();
        self.len_untracked()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn len_untracked(&self) -> usize {
        self.0.entries.borrow().len()
    }

    #[must_use]
    pub fn get(&self, key: &Value) -> Value {
        self.track();
        self.0
            .entries
            .borrow()
            .iter()
            .find(|(k, _)| k.same_value_zero(key))
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn has(&self, key: &Value) -> bool {
        self.track();
        self.position(key).is_some()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<Value> {
        self.track();
        self.0.entries.borrow().iter().map(|(k, _)| k.clone()).collect()
    }

    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        self.track();
        self.0.entries.borrow().iter().map(|(_, v)| v.clone()).collect()
    }

    #[must_use]
    pub fn entries(&self) -> Vec<(Value, Value)> {
        self.track();
        self.entries_untracked()
    }

    #[must_use]
    pub fn entries_untracked(&self) -> Vec<(Value, Value)> {
        self.0.entries.borrow().clone()
    }

    pub fn attach_observer(&self, hook: Rc<dyn MutationHook>, observer: Rc<dyn Any>) {
        self.0.slot.attach(hook, observer);
    }

    pub fn detach_observer(&self) {
        self.0.slot.detach();
    }

    #[must_use]
    pub fn observer(&self) -> Option<Rc<dyn Any>> {
        self.0.slot.observer()
    }

    fn emit(&self, record: ChangeRecord) {
        let len = self.len_untracked();
        self.0.slot.emit(CollectionKinds::MAP, record, len);
    }

    /// Insert or overwrite `key`. Writing the current value again is a no-op.
    pub fn set(&self, key: Value, value: Value) {
        let record = {
            let mut entries = self.0.entries.borrow_mut();
            match entries.iter().position(|(k, _)| k.same_value_zero(&key)) {
                Some(index) => {
                    if entries[index].1.strict_eq(&value) {
                        None
                    } else {
                        let old = std::mem::replace(&mut entries[index].1, value.clone());
                        Some(ChangeRecord::Update {
                            index,
                            key,
                            old,
                            value,
                        })
                    }
                }
                None => {
                    entries.push((key.clone(), value.clone()));
                    Some(ChangeRecord::Add {
                        index: entries.len() - 1,
                        key,
                        value,
                    })
                }
            }
        };
        if let Some(record) = record {
            self.emit(record);
        }
    }

    /// Remove `key`; returns whether it was present.
    pub fn delete(&self, key: &Value) -> bool {
        let removed = {
            let mut entries = self.0.entries.borrow_mut();
            entries
                .iter()
                .position(|(k, _)| k.same_value_zero(key))
                .map(|index| (index, entries.remove(index)))
        };
        match removed {
            Some((index, (key, old))) => {
                self.emit(ChangeRecord::Delete { index, key, old });
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.0.entries.borrow_mut()).len();
        if removed > 0 {
            self.emit(ChangeRecord::Clear { removed });
        }
    }
}

impl fmt::Debug for MapRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.0.entries.borrow();
        f.debug_map()
            .entries(entries.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

/// Non-owning handle to a map.
#[derive(Clone, Default)]
pub struct WeakMapRef(Weak<MapInner>);

impl WeakMapRef {
    #[must_use]
    pub fn upgrade(&self) -> Option<MapRef> {
        self.0.upgrade().map(MapRef)
    }
}

impl fmt::Debug for WeakMapRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakMapRef")
    }
}
