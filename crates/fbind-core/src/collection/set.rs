#![forbid(unsafe_code)]

//! Observable insertion-ordered set with `SameValueZero` membership.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::{ChangeRecord, MutationHook, ObserverSlot};
use crate::dependency;
use crate::instrumentation::CollectionKinds;
use crate::value::Value;

#[derive(Default)]
struct SetInner {
    members: RefCell<Vec<Value>>,
    slot: ObserverSlot,
}

/// Shared handle to an observable set.
#[derive(Clone, Default)]
pub struct SetRef(Rc<SetInner>);

impl SetRef {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let set = Self::new();
        {
            let mut members = set.0.members.borrow_mut();
            for value in values {
                if !members.iter().any(|m| m.same_value_zero(&value)) {
                    members.push(value);
                }
            }
        }
        set
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakSetRef {
        WeakSetRef(Rc::downgrade(&self.0))
    }

    fn track(&self) {
        dependency::collection_read(Value::Set(self.clone()));
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
        self.0.members.borrow().len()
    }

    #[must_use]
    pub fn has(&self, value: &Value) -> bool {
        self.track();
        self.0.members.borrow().iter().any(|m| m.same_value_zero(value))
    }

    #[must_use]
    pub fn values(&self) -> Vec<Value> {
        self.track();
        self.values_untracked()
    }

    #[must_use]
    pub fn values_untracked(&self) -> Vec<Value> {
        self.0.members.borrow().clone()
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
        self.0.slot.emit(CollectionKinds::SET, record, len);
    }

    /// Add `value`; returns `false` when it was already a member.
    pub fn add(&self, value: Value) -> bool {
        let index = {
            let mut members = self.0.members.borrow_mut();
            if members.iter().any(|m| m.same_value_zero(&value)) {
                None
            } else {
                members.push(value.clone());
                Some(members.len() - 1)
            }
        };
        match index {
            Some(index) => {
                self.emit(ChangeRecord::Add {
                    index,
                    key: value.clone(),
                    value,
                });
                true
            }
            None => false,
        }
    }

    /// Remove `value`; returns whether it was a member.
    pub fn delete(&self, value: &Value) -> bool {
        let removed = {
            let mut members = self.0.members.borrow_mut();
            members
                .iter()
                .position(|m| m.same_value_zero(value))
                .map(|index| (index, members.remove(index)))
        };
        match removed {
            Some((index, old)) => {
                self.emit(ChangeRecord::Delete {
                    index,
                    key: old.clone(),
                    old,
                });
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.0.members.borrow_mut()).len();
        if removed > 0 {
            self.emit(ChangeRecord::Clear { removed });
        }
    }
}

impl fmt::Debug for SetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.members.borrow().iter()).finish()
    }
}

/// Non-owning handle to a set.
#[derive(Clone, Default)]
pub struct WeakSetRef(Weak<SetInner>);

impl WeakSetRef {
    #[must_use]
    pub fn upgrade(&self) -> Option<SetRef> {
        self.0.upgrade().map(SetRef)
    }
}

impl fmt::Debug for WeakSetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakSetRef")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::test_support::RecordLog;
    use crate::instrumentation;

    #[test]
    fn add_delete_clear_emit_once_each() {
        instrumentation::enable_set_observation();
        let set = SetRef::new();
        let log = Rc::new(RecordLog::default());
        set.attach_observer(log.clone(), log.clone());

        assert!(set.add(Value::from(1)));
        assert!(!set.add(Value::from(1)));
        assert!(set.add(Value::from(2)));
        assert!(set.delete(&Value::from(1)));
        assert!(!set.delete(&Value::from(1)));
        set.clear();

        let kinds: Vec<_> = log.take().iter().map(ChangeRecord::kind).collect();
        assert_eq!(kinds, vec!["add", "add", "delete", "clear"]);
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn detached_set_is_silent() {
        instrumentation::enable_set_observation();
        let set = SetRef::from_values([Value::from("x"), Value::from("x")]);
        assert_eq!(set.len(), 1);
        let log = Rc::new(RecordLog::default());
        set.attach_observer(log.clone(), log.clone());
        set.detach_observer();
        set.add(Value::from("y"));
        assert!(log.take().is_empty());
        assert!(set.observer().is_none());
    }
}
