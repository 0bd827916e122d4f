#![forbid(unsafe_code)]

//! Observer for plain data properties.
//!
//! Until someone subscribes, a [`SetterObserver`] is a thin accessor. The
//! first subscription redefines the property as an intercepted slot whose
//! reads and writes land here. Writes are buffered: the first changing write
//! of a batch remembers the old value and queues the observer as a
//! microtask; the flush notifies once with that old value and the latest new
//! value.
//!
//! # Invariants
//!
//! 1. At most one microtask is queued per batch.
//! 2. Writing a value strictly equal to the current one does nothing.
//! 3. The interception is never undone; unsubscribing the last subscriber
//!    leaves the slot intercepted.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use fbind_core::{ObjectRef, PropertyInterceptor, Value, WeakObjectRef};

use super::{
    Change, Context, ObserverKind, PropertyObserver, SubscriberCollection, SubscriberRef,
    property_flags,
};
use crate::error::BindingError;
use crate::task_queue::{Task, TaskQueue};

pub struct SetterObserver {
    me: Weak<SetterObserver>,
    object: WeakObjectRef,
    name: Rc<str>,
    task_queue: Rc<TaskQueue>,
    current: RefCell<Value>,
    old: RefCell<Value>,
    queued: Cell<bool>,
    observing: Cell<bool>,
    subscribers: SubscriberCollection,
}

impl SetterObserver {
    pub fn new(object: &ObjectRef, name: &str, task_queue: Rc<TaskQueue>) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            object: object.downgrade(),
            name: Rc::from(name),
            task_queue,
            current: RefCell::new(Value::Undefined),
            old: RefCell::new(Value::Undefined),
            queued: Cell::new(false),
            observing: Cell::new(false),
            subscribers: SubscriberCollection::new(),
        })
    }

    /// Whether the property has been converted into an intercepted slot.
    #[must_use]
    pub fn is_observing(&self) -> bool {
        self.observing.get()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn convert_property(&self) {
        let (Some(object), Some(me)) = (self.object.upgrade(), self.me.upgrade()) else {
            return;
        };
        let interceptor: Rc<dyn PropertyInterceptor> = Rc::new(Interception(me));
        match object.intercept(&self.name, interceptor) {
            Some(current) => {
                *self.current.borrow_mut() = current;
                self.observing.set(true);
                tracing::debug!(property = %self.name, "property intercepted");
            }
            None => {
                tracing::debug!(property = %self.name, "property could not be intercepted");
            }
        }
    }

    fn setter_value(&self, value: Value) {
        let changed = !self.current.borrow().strict_eq(&value);
        if !changed {
            return;
        }
        let previous = self.current.replace(value);
        if !self.queued.replace(true) {
            *self.old.borrow_mut() = previous;
            if let Some(me) = self.me.upgrade() {
                self.task_queue.queue_micro_task(me);
            }
        }
    }
}

/// The intercepted slot installed on the observed object.
struct Interception(Rc<SetterObserver>);

impl PropertyInterceptor for Interception {
    fn get_value(&self) -> Value {
        self.0.current.borrow().clone()
    }

    fn set_value(&self, value: Value) {
        self.0.setter_value(value);
    }
}

impl PropertyObserver for SetterObserver {
    fn get_value(&self) -> Value {
        match self.object.upgrade() {
            Some(object) => object.get_untracked(&self.name),
            None => Value::Undefined,
        }
    }

    fn set_value(&self, value: Value) {
        if let Some(object) = self.object.upgrade() {
            object.set(&self.name, value);
        }
    }

    fn subscribe(&self, context: Context, subscriber: SubscriberRef) {
        if !self.observing.get() {
            self.convert_property();
        }
        self.subscribers.add(context, subscriber);
    }

    fn unsubscribe(&self, context: Context, subscriber: &SubscriberRef) {
        self.subscribers.remove(context, subscriber);
    }

    fn kind(&self) -> ObserverKind {
        ObserverKind::Setter
    }
}

impl Task for SetterObserver {
    fn call(&self) -> Result<(), BindingError> {
        let new = self.current.borrow().clone();
        let old = self.old.replace(new.clone());
        self.queued.set(false);
        self.subscribers.notify(
            Change::Property {
                new: &new,
                old: &old,
            },
            property_flags(&new),
        )
    }
}

impl std::fmt::Debug for SetterObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetterObserver")
            .field("name", &self.name)
            .field("observing", &self.observing.get())
            .field("queued", &self.queued.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::BindingFlags;
    use crate::observation::subscriber_collection::test_support::Spy;
    use fbind_core::{ArrayRef, object};

    fn setup() -> (ObjectRef, Rc<SetterObserver>, Rc<TaskQueue>) {
        let queue = Rc::new(TaskQueue::default());
        let obj = object! { "name" => "a" };
        let observer = SetterObserver::new(&obj, "name", Rc::clone(&queue));
        (obj, observer, queue)
    }

    #[test]
    fn acts_as_accessor_before_subscription() {
        let (obj, observer, queue) = setup();
        observer.set_value(Value::from("b"));
        assert_eq!(obj.get("name"), Value::from("b"));
        assert_eq!(observer.get_value(), Value::from("b"));
        assert!(!observer.is_observing());
        assert_eq!(queue.micro_task_len(), 0);
    }

    #[test]
    fn batches_writes_into_one_notification() {
        let (obj, observer, queue) = setup();
        let spy = Spy::new();
        observer.subscribe(Context::Source, spy.handle());
        assert!(observer.is_observing());

        obj.set("name", Value::from("b"));
        obj.set("name", Value::from("c"));
        assert_eq!(queue.micro_task_len(), 1);
        assert_eq!(obj.get("name"), Value::from("c"));
        assert_eq!(spy.count(), 0);

        queue.flush_micro_task_queue().unwrap();
        assert_eq!(spy.values(), vec![(Value::from("c"), Value::from("a"))]);
    }

    #[test]
    fn unchanged_write_is_silent() {
        let (obj, observer, queue) = setup();
        let spy = Spy::new();
        observer.subscribe(Context::Source, spy.handle());
        obj.set("name", Value::from("a"));
        assert_eq!(queue.micro_task_len(), 0);
    }

    #[test]
    fn conversion_preserves_enumerability() {
        let queue = Rc::new(TaskQueue::default());
        let obj = object! { "visible" => 1 };
        obj.define_property(
            "hidden",
            fbind_core::Property::data(Value::from(2))
                .with_attributes(fbind_core::PropertyAttributes::WRITABLE | fbind_core::PropertyAttributes::CONFIGURABLE),
        );
        let spy = Spy::new();
        SetterObserver::new(&obj, "hidden", Rc::clone(&queue)).subscribe(Context::Source, spy.handle());
        SetterObserver::new(&obj, "visible", queue).subscribe(Context::Source, spy.handle());
        let keys: Vec<String> = obj.keys().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["visible"]);
        assert_eq!(obj.get("hidden"), Value::from(2));
    }

    #[test]
    fn collection_values_flag_instance_mutation() {
        let (obj, observer, queue) = setup();
        let spy = Spy::new();
        observer.subscribe(Context::Source, spy.handle());
        obj.set("name", Value::from(ArrayRef::new()));
        queue.flush_micro_task_queue().unwrap();
        let flags = spy.calls.borrow()[0].3;
        assert!(flags.contains(BindingFlags::INSTANCE_MUTATION));
    }
}
