#![forbid(unsafe_code)]

//! Observers for arrays, maps and sets.
//!
//! A [`CollectionObserver`] is attached to exactly one collection through the
//! collection's hidden observer slot and receives every [`ChangeRecord`] the
//! collection's mutators emit. For each record it:
//!
//! 1. updates the [`IndexMap`] in place,
//! 2. notifies immediate subscribers synchronously with `ITEMS_MUTATION`,
//! 3. notifies the length observer when the item count changed,
//! 4. queues one microtask per batch that hands the index map and the
//!    accumulated records to batched subscribers, then resets the map.
//!
//! Errors raised by immediate subscribers cannot be returned through the
//! mutator, so they go to the task queue's uncaught channel.
//!
//! # Invariants
//!
//! 1. `index_map.len()` equals the collection's length after every mutation
//!    and after [`CollectionObserver::reset_index_map`]. Mutations made while
//!    observation of the kind was disabled are absorbed by resetting to the
//!    identity map at the next observed mutation.
//! 2. A slot holds the item's index at the last reset, or [`IndexMap::NEW`].
//! 3. `deleted_items` holds the reset-time indices of items removed since the
//!    last reset.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use fbind_core::{
    ArrayRef, ChangeRecord, CollectionKinds, MapRef, MutationHook, SetRef, Value, WeakValue,
    value::as_length,
};

use super::{
    BatchedCollectionSubscriber, Change, Context, ObserverKind, PropertyObserver,
    SubscriberCollection, SubscriberRef,
};
use crate::error::BindingError;
use crate::flags::BindingFlags;
use crate::task_queue::{Task, TaskQueue};

/// How the items of a collection moved since the last reset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexMap {
    /// One slot per current item: its prior index, or [`IndexMap::NEW`].
    pub slots: Vec<i64>,
    /// Prior indices of items removed since the last reset.
    pub deleted_items: Vec<i64>,
}

impl IndexMap {
    /// Sentinel for an item with no prior index.
    pub const NEW: i64 = -2;

    /// Identity map for a collection of `len` items.
    #[must_use]
    pub fn identity(len: usize) -> Self {
        Self {
            slots: (0..len as i64).collect(),
            deleted_items: Vec::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether any slot differs from the identity mapping or anything was
    /// deleted.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.deleted_items.is_empty()
            || self.slots.iter().enumerate().any(|(i, &slot)| slot != i as i64)
    }

    fn delete_slot(&mut self, prior: i64) {
        if prior >= 0 {
            self.deleted_items.push(prior);
        }
    }

    fn apply(&mut self, record: &ChangeRecord) {
        match record {
            ChangeRecord::Splice {
                index,
                removed,
                added,
            } => {
                let end = (index + removed.len()).min(self.slots.len());
                let start = (*index).min(end);
                let replaced: Vec<i64> = self
                    .slots
                    .splice(start..end, std::iter::repeat_n(Self::NEW, *added))
                    .collect();
                for prior in replaced {
                    self.delete_slot(prior);
                }
            }
            ChangeRecord::Set { index, .. } => {
                if let Some(slot) = self.slots.get_mut(*index) {
                    let prior = std::mem::replace(slot, Self::NEW);
                    self.delete_slot(prior);
                }
            }
            ChangeRecord::Reorder { permutation } => {
                let before = std::mem::take(&mut self.slots);
                self.slots = permutation
                    .iter()
                    .map(|&old| before.get(old).copied().unwrap_or(Self::NEW))
                    .collect();
            }
            ChangeRecord::Add { .. } => self.slots.push(Self::NEW),
            ChangeRecord::Update { index, .. } => {
                if let Some(slot) = self.slots.get_mut(*index) {
                    *slot = Self::NEW;
                }
            }
            ChangeRecord::Delete { index, .. } => {
                if *index < self.slots.len() {
                    let prior = self.slots.remove(*index);
                    self.delete_slot(prior);
                }
            }
            ChangeRecord::Clear { .. } => {
                for prior in std::mem::take(&mut self.slots) {
                    self.delete_slot(prior);
                }
            }
        }
    }
}

/// Observer of one collection instance.
pub struct CollectionObserver {
    me: Weak<CollectionObserver>,
    kind: CollectionKinds,
    collection: WeakValue,
    task_queue: Rc<TaskQueue>,
    index_map: RefCell<IndexMap>,
    pending: RefCell<Vec<ChangeRecord>>,
    queued: Cell<bool>,
    subscribers: SubscriberCollection,
    batched: RefCell<Vec<Weak<dyn BatchedCollectionSubscriber>>>,
    length_observer: RefCell<Option<Rc<CollectionLengthObserver>>>,
}

impl CollectionObserver {
    /// Create an observer for `collection` and attach it to the collection's
    /// observer slot. Returns `None` for non-collections.
    pub fn attach(collection: &Value, task_queue: Rc<TaskQueue>) -> Option<Rc<Self>> {
        match collection {
            Value::Array(array) => Some(Self::attach_array(array, task_queue)),
            Value::Map(map) => Some(Self::attach_map(map, task_queue)),
            Value::Set(set) => Some(Self::attach_set(set, task_queue)),
            _ => None,
        }
    }

    pub fn attach_array(array: &ArrayRef, task_queue: Rc<TaskQueue>) -> Rc<Self> {
        let observer = Self::build(
            CollectionKinds::ARRAY,
            &Value::Array(array.clone()),
            array.len_untracked(),
            task_queue,
        );
        array.attach_observer(observer.clone(), observer.clone());
        observer
    }

    pub fn attach_map(map: &MapRef, task_queue: Rc<TaskQueue>) -> Rc<Self> {
        let observer = Self::build(
            CollectionKinds::MAP,
            &Value::Map(map.clone()),
            map.len_untracked(),
            task_queue,
        );
        map.attach_observer(observer.clone(), observer.clone());
        observer
    }

    pub fn attach_set(set: &SetRef, task_queue: Rc<TaskQueue>) -> Rc<Self> {
        let observer = Self::build(
            CollectionKinds::SET,
            &Value::Set(set.clone()),
            set.len_untracked(),
            task_queue,
        );
        set.attach_observer(observer.clone(), observer.clone());
        observer
    }

    fn build(
        kind: CollectionKinds,
        collection: &Value,
        len: usize,
        task_queue: Rc<TaskQueue>,
    ) -> Rc<Self> {
        tracing::debug!(?kind, len, "collection observer attached");
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            kind,
            collection: collection.downgrade(),
            task_queue,
            index_map: RefCell::new(IndexMap::identity(len)),
            pending: RefCell::new(Vec::new()),
            queued: Cell::new(false),
            subscribers: SubscriberCollection::new(),
            batched: RefCell::new(Vec::new()),
            length_observer: RefCell::new(None),
        })
    }

    /// The observer already attached to `collection`, if any.
    #[must_use]
    pub fn existing(collection: &Value) -> Option<Rc<Self>> {
        let any = match collection {
            Value::Array(a) => a.observer(),
            Value::Map(m) => m.observer(),
            Value::Set(s) => s.observer(),
            _ => None,
        }?;
        any.downcast::<Self>().ok()
    }

    #[must_use]
    pub fn kind(&self) -> CollectionKinds {
        self.kind
    }

    /// The observed collection, while it is alive.
    #[must_use]
    pub fn collection(&self) -> Option<Value> {
        self.collection.upgrade()
    }

    /// Snapshot of the current index map.
    #[must_use]
    pub fn index_map(&self) -> IndexMap {
        self.index_map.borrow().clone()
    }

    /// Restore the identity map for the collection's current length.
    pub fn reset_index_map(&self) {
        let len = self.collection().map_or(0, |c| collection_len(&c));
        *self.index_map.borrow_mut() = IndexMap::identity(len);
    }

    pub fn subscribe(&self, context: Context, subscriber: SubscriberRef) {
        self.subscribers.add(context, subscriber);
    }

    pub fn unsubscribe(&self, context: Context, subscriber: &SubscriberRef) {
        self.subscribers.remove(context, subscriber);
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn subscribe_batched(&self, subscriber: Weak<dyn BatchedCollectionSubscriber>) {
        let mut batched = self.batched.borrow_mut();
        let ptr = subscriber.as_ptr().cast::<()>();
        if !batched.iter().any(|s| s.as_ptr().cast::<()>() == ptr) {
            batched.push(subscriber);
        }
    }

    pub fn unsubscribe_batched(&self, subscriber: &Weak<dyn BatchedCollectionSubscriber>) {
        let ptr = subscriber.as_ptr().cast::<()>();
        self.batched
            .borrow_mut()
            .retain(|s| s.as_ptr().cast::<()>() != ptr);
    }

    /// Observer of the collection's `length` (arrays) or `size` (maps and
    /// sets), created on first use.
    pub fn length_observer(&self) -> Rc<CollectionLengthObserver> {
        self.length_observer
            .borrow_mut()
            .get_or_insert_with(|| {
                Rc::new(CollectionLengthObserver {
                    collection: self.collection.clone(),
                    subscribers: SubscriberCollection::new(),
                    last_len: Cell::new(self.index_map.borrow().len()),
                })
            })
            .clone()
    }

    fn queue_batch(&self) {
        if self.queued.replace(true) {
            return;
        }
        if let Some(me) = self.me.upgrade() {
            self.task_queue.queue_micro_task(me);
        }
    }
}

impl MutationHook for CollectionObserver {
    fn on_mutation(&self, record: ChangeRecord, new_len: usize) {
        let old_len = record.previous_len(new_len);
        {
            let mut index_map = self.index_map.borrow_mut();
            // Mutations made while observation was disabled never reached us.
            if index_map.len() != old_len {
                tracing::debug!(
                    kind = ?self.kind,
                    mapped = index_map.len(),
                    len = old_len,
                    "index map resynced"
                );
                *index_map = IndexMap::identity(old_len);
            }
            index_map.apply(&record);
        }
        if let Err(error) = self
            .subscribers
            .notify(Change::Collection(&record), BindingFlags::ITEMS_MUTATION)
        {
            self.task_queue.report_uncaught(error);
        }
        self.pending.borrow_mut().push(record);
        if old_len != new_len {
            let length_observer = self.length_observer.borrow().clone();
            if let Some(length_observer) = length_observer {
                if let Err(error) = length_observer.notify(new_len) {
                    self.task_queue.report_uncaught(error);
                }
            }
        }
        self.queue_batch();
    }
}

impl Task for CollectionObserver {
    fn call(&self) -> Result<(), BindingError> {
        self.queued.set(false);
        let records = std::mem::take(&mut *self.pending.borrow_mut());
        let index_map = self.index_map();
        self.reset_index_map();
        let batched: Vec<_> = {
            let mut list = self.batched.borrow_mut();
            list.retain(|s| s.strong_count() > 0);
            list.clone()
        };
        tracing::trace!(records = records.len(), "collection batch flushed");
        for subscriber in batched {
            if let Some(subscriber) = subscriber.upgrade() {
                subscriber.handle_batched_change(&index_map, &records)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for CollectionObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionObserver")
            .field("kind", &self.kind)
            .field("index_map", &self.index_map.borrow())
            .finish()
    }
}

/// Observer of a collection's item count.
pub struct CollectionLengthObserver {
    collection: WeakValue,
    subscribers: SubscriberCollection,
    last_len: Cell<usize>,
}

impl CollectionLengthObserver {
    fn notify(&self, new_len: usize) -> Result<(), BindingError> {
        let old_len = self.last_len.replace(new_len);
        if old_len == new_len {
            return Ok(());
        }
        let new = Value::from(new_len);
        let old = Value::from(old_len);
        self.subscribers.notify(
            Change::Property {
                new: &new,
                old: &old,
            },
            BindingFlags::empty(),
        )
    }
}

impl PropertyObserver for CollectionLengthObserver {
    fn get_value(&self) -> Value {
        self.collection
            .upgrade()
            .map_or(Value::Undefined, |c| Value::from(collection_len(&c)))
    }

    fn set_value(&self, value: Value) {
        if let Some(Value::Array(array)) = self.collection.upgrade() {
            if let Some(len) = as_length(value.to_number()) {
                array.set_len(len);
            }
        }
    }

    fn subscribe(&self, context: Context, subscriber: SubscriberRef) {
        self.subscribers.add(context, subscriber);
    }

    fn unsubscribe(&self, context: Context, subscriber: &SubscriberRef) {
        self.subscribers.remove(context, subscriber);
    }

    fn kind(&self) -> ObserverKind {
        ObserverKind::CollectionLength
    }
}

fn collection_len(value: &Value) -> usize {
    match value {
        Value::Array(a) => a.len_untracked(),
        Value::Map(m) => m.len_untracked(),
        Value::Set(s) => s.len_untracked(),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::subscriber_collection::test_support::Spy;
    use fbind_core::instrumentation;
    use proptest::prelude::*;

    fn nums(values: &[i32]) -> Vec<Value> {
        values.iter().map(|&n| Value::from(n)).collect()
    }

    fn observe(collection: &Value) -> (Rc<CollectionObserver>, Rc<TaskQueue>) {
        instrumentation::enable(CollectionKinds::all());
        let queue = Rc::new(TaskQueue::default());
        let observer = CollectionObserver::attach(collection, Rc::clone(&queue)).unwrap();
        (observer, queue)
    }

    #[derive(Default)]
    struct BatchSpy {
        batches: RefCell<Vec<(IndexMap, usize)>>,
    }

    impl BatchedCollectionSubscriber for BatchSpy {
        fn handle_batched_change(
            &self,
            index_map: &IndexMap,
            records: &[ChangeRecord],
        ) -> Result<(), BindingError> {
            self.batches
                .borrow_mut()
                .push((index_map.clone(), records.len()));
            Ok(())
        }
    }

    #[test]
    fn mutations_while_disabled_resync_on_the_next_record() {
        let array = ArrayRef::from_values(nums(&[1]));
        let (observer, queue) = observe(&Value::Array(array.clone()));

        instrumentation::disable_array_observation();
        array.push(nums(&[2]));
        assert_eq!(observer.index_map().len(), 1);

        instrumentation::enable_array_observation();
        array.push(nums(&[3]));
        let map = observer.index_map();
        assert_eq!(map.len(), array.len_untracked());
        assert_eq!(map.slots, vec![0, 1, IndexMap::NEW]);
        assert!(map.deleted_items.is_empty());

        array.shift();
        assert_eq!(observer.index_map().slots, vec![1, IndexMap::NEW]);
        assert_eq!(observer.index_map().deleted_items, vec![0]);
        queue.flush_micro_task_queue().unwrap();

        let set = SetRef::new();
        let (observer, _queue) = observe(&Value::Set(set.clone()));
        instrumentation::disable_set_observation();
        set.add(Value::from(1));
        set.add(Value::from(2));
        instrumentation::enable_set_observation();
        set.delete(&Value::from(1));
        assert_eq!(observer.index_map().len(), set.len_untracked());
    }

    #[test]
    fn splice_marks_new_slots_and_deleted_items() {
        let array = ArrayRef::from_values(nums(&[10, 11, 12, 13]));
        let (observer, _queue) = observe(&Value::Array(array.clone()));
        array.splice(1, Some(2), nums(&[20, 21, 22]));
        let map = observer.index_map();
        assert_eq!(map.slots, vec![0, -2, -2, -2, 3]);
        assert_eq!(map.deleted_items, vec![1, 2]);
        assert!(map.has_changes());
    }

    #[test]
    fn sort_permutes_index_map() {
        let array = ArrayRef::from_values(nums(&[3, 1, 2]));
        let (observer, _queue) = observe(&Value::Array(array.clone()));
        array.sort();
        assert_eq!(observer.index_map().slots, vec![1, 2, 0]);
        array.reverse();
        assert_eq!(observer.index_map().slots, vec![0, 2, 1]);
    }

    #[test]
    fn map_set_twice_yields_one_add() {
        let map = MapRef::new();
        let (observer, queue) = observe(&Value::Map(map.clone()));
        let batch = Rc::new(BatchSpy::default());
        observer.subscribe_batched(Rc::downgrade(&batch) as Weak<dyn BatchedCollectionSubscriber>);

        map.set(Value::from("k"), Value::from(1));
        map.set(Value::from("k"), Value::from(1));
        queue.flush_micro_task_queue().unwrap();

        let batches = batch.batches.borrow();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].0.slots, vec![IndexMap::NEW]);
        assert_eq!(batches[0].1, 1);
        assert_eq!(observer.index_map(), IndexMap::identity(1));
    }

    #[test]
    fn map_update_and_delete() {
        let map = MapRef::from_entries([
            (Value::from("a"), Value::from(1)),
            (Value::from("b"), Value::from(2)),
        ]);
        let (observer, _queue) = observe(&Value::Map(map.clone()));
        map.set(Value::from("a"), Value::from(5));
        map.delete(&Value::from("b"));
        let index_map = observer.index_map();
        assert_eq!(index_map.slots, vec![IndexMap::NEW]);
        assert_eq!(index_map.deleted_items, vec![1]);
    }

    #[test]
    fn set_clear_records_all_deleted() {
        let set = SetRef::from_values(nums(&[1, 2, 3]));
        let (observer, _queue) = observe(&Value::Set(set.clone()));
        set.clear();
        let index_map = observer.index_map();
        assert!(index_map.is_empty());
        assert_eq!(index_map.deleted_items, vec![0, 1, 2]);
    }

    #[test]
    fn immediate_subscribers_and_length_observer() {
        let array = ArrayRef::from_values(nums(&[1]));
        let (observer, queue) = observe(&Value::Array(array.clone()));
        let items = Spy::new();
        let length = Spy::new();
        observer.subscribe(Context::Source, items.handle());
        let length_observer = observer.length_observer();
        length_observer.subscribe(Context::Source, length.handle());

        array.push(nums(&[2]));
        array.set_index(0, Value::from(9));
        assert_eq!(items.count(), 2);
        assert_eq!(length.values(), vec![(Value::from(2), Value::from(1))]);
        assert_eq!(length_observer.get_value(), Value::from(2));

        length_observer.set_value(Value::from(0));
        assert_eq!(array.len(), 0);
        assert_eq!(queue.micro_task_len(), 1);
    }

    #[test]
    fn one_microtask_per_batch() {
        let array = ArrayRef::new();
        let (_observer, queue) = observe(&Value::Array(array.clone()));
        array.push(nums(&[1]));
        array.push(nums(&[2]));
        array.pop();
        assert_eq!(queue.micro_task_len(), 1);
        queue.flush_micro_task_queue().unwrap();
        array.push(nums(&[3]));
        assert_eq!(queue.micro_task_len(), 1);
    }

    #[test]
    fn existing_returns_attached_observer() {
        let array = Value::Array(ArrayRef::new());
        assert!(CollectionObserver::existing(&array).is_none());
        let (observer, _queue) = observe(&array);
        let found = CollectionObserver::existing(&array).unwrap();
        assert!(Rc::ptr_eq(&observer, &found));
    }

    proptest! {
        #[test]
        fn index_map_tracks_splices(
            initial in proptest::collection::vec(0i32..1000, 0..10),
            ops in proptest::collection::vec(
                (-12isize..12, proptest::option::of(-2isize..12), 0usize..4),
                1..6,
            ),
        ) {
            // Items are unique so each can be traced back to its prior index.
            let initial: Vec<i32> = (0..initial.len() as i32).collect();
            let array = ArrayRef::from_values(nums(&initial));
            let (observer, _queue) = observe(&Value::Array(array.clone()));
            let mut next = 1000;
            for (start, delete, add) in ops {
                let inserted: Vec<i32> = (0..add).map(|_| { next += 1; next }).collect();
                array.splice(start, delete, nums(&inserted));
            }

            let index_map = observer.index_map();
            let items = array.to_vec();
            prop_assert_eq!(index_map.len(), items.len());
            for (slot, item) in index_map.slots.iter().zip(&items) {
                let n = item.to_number() as i64;
                if n >= 1000 {
                    prop_assert_eq!(*slot, IndexMap::NEW);
                } else {
                    prop_assert_eq!(*slot, n);
                }
            }
            let mut seen: Vec<i64> = index_map.slots.iter().copied().filter(|&s| s >= 0).collect();
            seen.extend(&index_map.deleted_items);
            seen.sort_unstable();
            prop_assert_eq!(seen, (0..initial.len() as i64).collect::<Vec<_>>());
        }
    }
}
