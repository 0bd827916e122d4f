#![forbid(unsafe_code)]

//! Observable array.

use std::any::Any;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt;
use std::rc::{Rc, Weak};

use super::{ChangeRecord, MutationHook, ObserverSlot};
use crate::dependency;
use crate::instrumentation::CollectionKinds;
use crate::value::Value;

/// Largest length an array may have; valid indices are below it.
pub const MAX_LENGTH: usize = u32::MAX as usize;

#[derive(Default)]
struct ArrayInner {
    items: RefCell<Vec<Value>>,
    slot: ObserverSlot,
}

/// Shared handle to an observable array.
#[derive(Clone, Default)]
pub struct ArrayRef(Rc<ArrayInner>);

impl ArrayRef {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let arr = Self::new();
        arr.0.items.borrow_mut().extend(values);
        arr
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakArrayRef {
        WeakArrayRef(Rc::downgrade(&self.0))
    }

    fn track(&self) {
        dependency::collection_read(Value::Array(self.clone()));
    }

    // -- reads --------------------------------------------------------------

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
        self.0.items.borrow().len()
    }

    /// Item at `index`, or `Undefined` when out of bounds.
    #[must_use]
    pub fn get(&self, index: usize) -> Value {
        self.track();
        self.0.items.borrow().get(index).cloned().unwrap_or_default()
    }

    /// Snapshot of the items.
    #[must_use]
    pub fn to_vec(&self) -> Vec<Value> {
        self.track();
        self.to_vec_untracked()
    }

    #[must_use]
    pub fn to_vec_untracked(&self) -> Vec<Value> {
        self.0.items.borrow().clone()
    }

    /// Position of the first strictly equal item.
    #[must_use]
    pub fn index_of(&self, needle: &Value) -> Option<usize> {
        self.track();
        self.0.items.borrow().iter().position(|v| v.strict_eq(needle))
    }

    /// Whether an item is `SameValueZero`-equal to `needle`.
    #[must_use]
    pub fn includes(&self, needle: &Value) -> bool {
        self.track();
        self.0.items.borrow().iter().any(|v| v.same_value_zero(needle))
    }

    /// Items converted to strings and joined; nullish items become empty.
    #[must_use]
    pub fn join(&self, separator: &str) -> String {
        let items = self.to_vec();
        items
            .iter()
            .map(|v| {
                if v.is_nullish() {
                    String::new()
                } else {
                    v.to_display_string()
                }
            })
            .collect::<Vec<_>>()
            .join(separator)
    }

    // -- observer slot ------------------------------------------------------

    /// Attach the observer that receives this array's change records.
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
        self.0.slot.emit(CollectionKinds::ARRAY, record, len);
    }

    // -- mutators -----------------------------------------------------------

    /// Append items; returns the new length.
    pub fn push(&self, values: impl IntoIterator<Item = Value>) -> usize {
        let (index, added, len) = {
            let mut items = self.0.items.borrow_mut();
            let index = items.len();
            items.extend(values);
            (index, items.len() - index, items.len())
        };
        if added > 0 {
            self.emit(ChangeRecord::Splice {
                index,
                removed: Vec::new(),
                added,
            });
        }
        len
    }

    /// Remove and return the last item.
    pub fn pop(&self) -> Value {
        let popped = {
            let mut items = self.0.items.borrow_mut();
            items.pop().map(|v| (items.len(), v))
        };
        match popped {
            Some((index, value)) => {
                self.emit(ChangeRecord::Splice {
                    index,
                    removed: vec![value.clone()],
                    added: 0,
                });
                value
            }
            None => Value::Undefined,
        }
    }

    /// Remove and return the first item.
    pub fn shift(&self) -> Value {
        let shifted = {
            let mut items = self.0.items.borrow_mut();
            (!items.is_empty()).then(|| items.remove(0))
        };
        match shifted {
            Some(value) => {
                self.emit(ChangeRecord::Splice {
                    index: 0,
                    removed: vec![value.clone()],
                    added: 0,
                });
                value
            }
            None => Value::Undefined,
        }
    }

    /// Prepend items; returns the new length.
    pub fn unshift(&self, values: impl IntoIterator<Item = Value>) -> usize {
        let (added, len) = {
            let mut items = self.0.items.borrow_mut();
            let before = items.len();
            let new: Vec<Value> = values.into_iter().collect();
            items.splice(0..0, new);
            (items.len() - before, items.len())
        };
        if added > 0 {
            self.emit(ChangeRecord::Splice {
                index: 0,
                removed: Vec::new(),
                added,
            });
        }
        len
    }

    /// Remove `delete_count` items at `start` and insert `values` there.
    ///
    /// A negative `start` counts from the end (clamped to 0), a `start` past
    /// the end clamps to the length, `None` deletes through the end, and a
    /// negative `delete_count` deletes nothing. Returns the removed items.
    pub fn splice(&self, start: isize, delete_count: Option<isize>, values: Vec<Value>) -> Vec<Value> {
        let (index, removed, added) = {
            let mut items = self.0.items.borrow_mut();
            let (index, count) = normalize_splice(items.len(), start, delete_count);
            let added = values.len();
            let removed: Vec<Value> = items.splice(index..index + count, values).collect();
            (index, removed, added)
        };
        if !removed.is_empty() || added > 0 {
            self.emit(ChangeRecord::Splice {
                index,
                removed: removed.clone(),
                added,
            });
        }
        removed
    }

    /// Reverse the items in place.
    pub fn reverse(&self) {
        let len = {
            let mut items = self.0.items.borrow_mut();
            items.reverse();
            items.len()
        };
        if len > 1 {
            self.emit(ChangeRecord::Reorder {
                permutation: (0..len).rev().collect(),
            });
        }
    }

    /// Sort with the default ordering: by string form, `undefined` last.
    pub fn sort(&self) {
        self.sort_by(default_order);
    }

    /// Stable sort with a caller-supplied comparator.
    pub fn sort_by(&self, mut compare: impl FnMut(&Value, &Value) -> Ordering) {
        let snapshot = self.to_vec_untracked();
        let mut permutation: Vec<usize> = (0..snapshot.len()).collect();
        permutation.sort_by(|&a, &b| compare(&snapshot[a], &snapshot[b]));
        let sorted: Vec<Value> = permutation.iter().map(|&i| snapshot[i].clone()).collect();
        *self.0.items.borrow_mut() = sorted;
        if permutation.len() > 1 {
            self.emit(ChangeRecord::Reorder { permutation });
        }
    }

    /// Indexed write. Writing past the end grows the array, filling the gap
    /// with `Undefined`.
    ///
    /// Returns `false` (and leaves the array untouched) when `index` is not
    /// below [`MAX_LENGTH`] or the growth cannot be allocated.
    pub fn set_index(&self, index: usize, value: Value) -> bool {
        if index >= MAX_LENGTH {
            return false;
        }
        let record = {
            let mut items = self.0.items.borrow_mut();
            if index < items.len() {
                let old = std::mem::replace(&mut items[index], value.clone());
                (!old.strict_eq(&value)).then_some(ChangeRecord::Set { index, old, value })
            } else {
                let start = items.len();
                if items.try_reserve(index + 1 - start).is_err() {
                    return false;
                }
                items.resize(index, Value::Undefined);
                items.push(value);
                Some(ChangeRecord::Splice {
                    index: start,
                    removed: Vec::new(),
                    added: index + 1 - start,
                })
            }
        };
        if let Some(record) = record {
            self.emit(record);
        }
        true
    }

    /// Drop items past `len`; no-op when the array is not longer than that.
    pub fn truncate(&self, len: usize) {
        if len < self.len_untracked() {
            self.set_len(len);
        }
    }

    /// Truncate or extend (with `Undefined`) to `len` items.
    ///
    /// Returns `false` when `len` exceeds [`MAX_LENGTH`] or the growth
    /// cannot be allocated.
    pub fn set_len(&self, len: usize) -> bool {
        if len > MAX_LENGTH {
            return false;
        }
        let record = {
            let mut items = self.0.items.borrow_mut();
            let current = items.len();
            if len < current {
                Some(ChangeRecord::Splice {
                    index: len,
                    removed: items.drain(len..).collect(),
                    added: 0,
                })
            } else if len > current {
                if items.try_reserve(len - current).is_err() {
                    return false;
                }
                items.resize(len, Value::Undefined);
                Some(ChangeRecord::Splice {
                    index: current,
                    removed: Vec::new(),
                    added: len - current,
                })
            } else {
                None
            }
        };
        if let Some(record) = record {
            self.emit(record);
        }
        true
    }
}

/// Resolve a splice `start` / `delete_count` pair against `len`, returning
/// the concrete `(index, count)`.
#[must_use]
pub fn normalize_splice(len: usize, start: isize, delete_count: Option<isize>) -> (usize, usize) {
    let len_i = len as isize;
    let index = if start < 0 {
        (len_i + start).max(0)
    } else {
        start.min(len_i)
    };
    let remaining = len_i - index;
    let count = match delete_count {
        None => remaining,
        Some(count) => count.clamp(0, remaining),
    };
    (index as usize, count as usize)
}

fn default_order(a: &Value, b: &Value) -> Ordering {
    match (a.is_undefined(), b.is_undefined()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.to_display_string().cmp(&b.to_display_string()),
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.items.borrow().iter()).finish()
    }
}

/// Non-owning handle to an array.
#[derive(Clone, Default)]
pub struct WeakArrayRef(Weak<ArrayInner>);

impl WeakArrayRef {
    #[must_use]
    pub fn upgrade(&self) -> Option<ArrayRef> {
        self.0.upgrade().map(ArrayRef)
    }
}

impl fmt::Debug for WeakArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WeakArrayRef")
    }
}
