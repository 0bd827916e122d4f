#![forbid(unsafe_code)]

//! Observer for getter properties.
//!
//! A [`ComputedObserver`] learns what its getter depends on by running it
//! under the locator's dependency recorder: every property the getter reads
//! resolves to that property's observer and every collection it reads to the
//! collection's observer. The computed observer subscribes to each of them
//! with [`Context::Dependency`].
//!
//! # Invariants
//!
//! 1. Dependencies are held only while the observer has subscribers; the
//!    last unsubscribe releases them and the next subscribe collects again.
//! 2. Any number of dependency changes within one turn queue one microtask.
//! 3. Subscribers are notified only when the recomputed value differs.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use fbind_core::{Getter, ObjectRef, Setter, Value, WeakObjectRef, dependency};

use super::{
    Change, Context, ObserverKind, ObserverLocator, Observed, PropertyObserver, Subscriber,
    SubscriberCollection, SubscriberRef, property_flags,
};
use crate::error::BindingError;
use crate::flags::BindingFlags;
use crate::task_queue::{Task, TaskQueue};

pub struct ComputedObserver {
    me: Weak<ComputedObserver>,
    object: WeakObjectRef,
    name: Rc<str>,
    getter: Getter,
    setter: Option<Setter>,
    locator: Weak<ObserverLocator>,
    task_queue: Option<Rc<TaskQueue>>,
    is_static: bool,
    value: RefCell<Value>,
    dependencies: RefCell<Vec<Observed>>,
    queued: Cell<bool>,
    subscribers: SubscriberCollection,
}

impl ComputedObserver {
    /// A static observer collects its dependencies once per subscription
    /// instead of on every recomputation.
    pub fn new(
        locator: &Weak<ObserverLocator>,
        object: &ObjectRef,
        name: &str,
        getter: Getter,
        setter: Option<Setter>,
        is_static: bool,
    ) -> Rc<Self> {
        let task_queue = locator.upgrade().map(|l| Rc::clone(l.task_queue()));
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            object: object.downgrade(),
            name: Rc::from(name),
            getter,
            setter,
            locator: locator.clone(),
            task_queue,
            is_static,
            value: RefCell::new(Value::Undefined),
            dependencies: RefCell::new(Vec::new()),
            queued: Cell::new(false),
            subscribers: SubscriberCollection::new(),
        })
    }

    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.dependencies.borrow().len()
    }

    #[must_use]
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    fn handle(&self) -> SubscriberRef {
        self.me.clone()
    }

    fn compute_untracked(&self) -> Value {
        match self.object.upgrade() {
            Some(object) => dependency::untracked(|| (self.getter)(&object)),
            None => Value::Undefined,
        }
    }

    /// Run the getter under the recorder and swap in the new dependency set.
    fn collect(&self) -> Value {
        let (Some(object), Some(locator)) = (self.object.upgrade(), self.locator.upgrade()) else {
            return Value::Undefined;
        };
        let (value, observed) = locator.collect(|| (self.getter)(&object));
        self.replace_dependencies(observed);
        *self.value.borrow_mut() = value.clone();
        tracing::trace!(
            property = %self.name,
            dependencies = self.dependency_count(),
            "computed dependencies collected"
        );
        value
    }

    fn replace_dependencies(&self, next: Vec<Observed>) {
        let handle = self.handle();
        let previous = self.dependencies.replace(next.clone());
        for old in &previous {
            if !next.iter().any(|n| n.same(old)) {
                old.unsubscribe(Context::Dependency, &handle);
            }
        }
        for new in &next {
            if !previous.iter().any(|p| p.same(new)) {
                new.subscribe(Context::Dependency, handle.clone());
            }
        }
    }

    fn release(&self) {
        let handle = self.handle();
        for observed in self.dependencies.take() {
            observed.unsubscribe(Context::Dependency, &handle);
        }
    }
}

impl PropertyObserver for ComputedObserver {
    fn get_value(&self) -> Value {
        self.compute_untracked()
    }

    fn set_value(&self, value: Value) {
        if let (Some(setter), Some(object)) = (&self.setter, self.object.upgrade()) {
            setter(&object, value);
        }
    }

    fn subscribe(&self, context: Context, subscriber: SubscriberRef) {
        if self.subscribers.is_empty() {
            self.collect();
        }
        self.subscribers.add(context, subscriber);
    }

    fn unsubscribe(&self, context: Context, subscriber: &SubscriberRef) {
        if self.subscribers.remove(context, subscriber) && self.subscribers.is_empty() {
            self.release();
        }
    }

    fn kind(&self) -> ObserverKind {
        ObserverKind::Computed
    }
}

impl Subscriber for ComputedObserver {
    fn handle_change(
        &self,
        context: Context,
        _change: Change<'_>,
        _flags: BindingFlags,
    ) -> Result<(), BindingError> {
        if context != Context::Dependency {
            return Err(BindingError::UnexpectedContext(context));
        }
        if self.queued.replace(true) {
            return Ok(());
        }
        match (&self.task_queue, self.me.upgrade()) {
            (Some(task_queue), Some(me)) => task_queue.queue_micro_task(me),
            _ => self.queued.set(false),
        }
        Ok(())
    }
}

impl Task for ComputedObserver {
    fn call(&self) -> Result<(), BindingError> {
        self.queued.set(false);
        if self.subscribers.is_empty() {
            return Ok(());
        }
        let old = self.value.borrow().clone();
        let new = if self.is_static {
            let value = self.compute_untracked();
            *self.value.borrow_mut() = value.clone();
            value
        } else {
            self.collect()
        };
        if new.strict_eq(&old) {
            return Ok(());
        }
        self.subscribers.notify(
            Change::Property {
                new: &new,
                old: &old,
            },
            property_flags(&new),
        )
    }
}

impl std::fmt::Debug for ComputedObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputedObserver")
            .field("name", &self.name)
            .field("static", &self.is_static)
            .field("dependencies", &self.dependencies.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::observation::DirtyChecker;
    use crate::observation::subscriber_collection::test_support::Spy;
    use fbind_core::{ArrayRef, Property, object};

    struct Fixture {
        queue: Rc<TaskQueue>,
        locator: Rc<ObserverLocator>,
    }

    fn fixture() -> Fixture {
        let queue = Rc::new(TaskQueue::default());
        let locator = ObserverLocator::new(
            Rc::clone(&queue),
            Rc::new(DirtyChecker::default()),
            &EngineConfig::default(),
        );
        Fixture { queue, locator }
    }

    fn person() -> ObjectRef {
        let person = object! { "first" => "Ada", "last" => "Lovelace" };
        person.define_property(
            "full",
            Property::getter(|p| {
                Value::from(format!(
                    "{} {}",
                    p.get("first").to_display_string(),
                    p.get("last").to_display_string()
                ))
            }),
        );
        person
    }

    #[test]
    fn recomputes_once_per_batch_of_dependency_changes() {
        let fx = fixture();
        let person = person();
        let observer = fx.locator.get_observer(&Value::Object(person.clone()), "full");
        let spy = Spy::new();
        observer.subscribe(Context::Source, spy.handle());

        person.set("first", Value::from("Grace"));
        person.set("last", Value::from("Hopper"));
        fx.queue.flush_micro_task_queue().unwrap();

        assert_eq!(
            spy.values(),
            vec![(Value::from("Grace Hopper"), Value::from("Ada Lovelace"))]
        );
    }

    #[test]
    fn silent_when_result_is_unchanged() {
        let fx = fixture();
        let obj = object! { "n" => 3 };
        obj.define_property("odd", Property::getter(|o| Value::from(o.get("n").to_number() as i64 % 2 == 1)));
        let observer = fx.locator.get_observer(&Value::Object(obj.clone()), "odd");
        let spy = Spy::new();
        observer.subscribe(Context::Source, spy.handle());

        obj.set("n", Value::from(5));
        fx.queue.flush_micro_task_queue().unwrap();
        assert_eq!(spy.count(), 0);

        obj.set("n", Value::from(6));
        fx.queue.flush_micro_task_queue().unwrap();
        assert_eq!(spy.values(), vec![(Value::from(false), Value::from(true))]);
    }

    #[test]
    fn tracks_collection_contents() {
        let fx = fixture();
        let items = ArrayRef::from_values([Value::from(1), Value::from(2)]);
        let obj = object! { "items" => items.clone() };
        obj.define_property(
            "total",
            Property::getter(|o| {
                let items = o.get("items");
                let sum: f64 = items
                    .as_array()
                    .map(|a| a.to_vec().iter().map(Value::to_number).sum())
                    .unwrap_or(0.0);
                Value::from(sum)
            }),
        );
        let observer = fx.locator.get_observer(&Value::Object(obj.clone()), "total");
        let spy = Spy::new();
        observer.subscribe(Context::Source, spy.handle());

        items.push([Value::from(4)]);
        fx.queue.flush_micro_task_queue().unwrap();
        assert_eq!(spy.values(), vec![(Value::from(7), Value::from(3))]);
    }

    #[test]
    fn last_unsubscribe_releases_dependencies() {
        let fx = fixture();
        let person = person();
        let target = Value::Object(person.clone());
        let observer = fx.locator.get_observer(&target, "full");
        let spy = Spy::new();
        observer.subscribe(Context::Source, spy.handle());

        let first = fx.locator.get_observer(&target, "first");
        assert_eq!(first.kind(), ObserverKind::Setter);
        observer.unsubscribe(Context::Source, &spy.handle());

        person.set("first", Value::from("Grace"));
        fx.queue.flush_micro_task_queue().unwrap();
        assert_eq!(spy.count(), 0);
        assert_eq!(observer.get_value(), Value::from("Grace Lovelace"));
    }

    #[test]
    fn static_observer_keeps_first_dependency_set() {
        let fx = fixture();
        let obj = object! { "flag" => true, "a" => 1, "b" => 2 };
        let getter: Getter = Rc::new(|o: &ObjectRef| {
            if o.get("flag").truthy() { o.get("a") } else { o.get("b") }
        });
        let observer = ComputedObserver::new(
            &Rc::downgrade(&fx.locator),
            &obj,
            "pick",
            Rc::clone(&getter),
            None,
            true,
        );
        let spy = Spy::new();
        observer.subscribe(Context::Source, spy.handle());
        assert_eq!(observer.dependency_count(), 2);

        obj.set("flag", Value::from(false));
        fx.queue.flush_micro_task_queue().unwrap();
        assert_eq!(spy.values(), vec![(Value::from(2), Value::from(1))]);
        // "b" was never collected, so changing it goes unnoticed.
        obj.set("b", Value::from(3));
        fx.queue.flush_micro_task_queue().unwrap();
        assert_eq!(spy.count(), 1);
        assert_eq!(observer.dependency_count(), 2);
    }

    #[test]
    fn setter_is_used_when_present() {
        let fx = fixture();
        let obj = object! { "raw" => 1 };
        let getter: Getter = Rc::new(|o: &ObjectRef| o.get("raw"));
        let setter: Setter = Rc::new(|o: &ObjectRef, v: Value| o.set("raw", v));
        obj.define_property("wrapped", Property::accessor(Some(getter), Some(setter)));
        let observer = fx.locator.get_observer(&Value::Object(obj.clone()), "wrapped");
        observer.set_value(Value::from(9));
        assert_eq!(obj.get("raw"), Value::from(9));
    }

    #[test]
    fn rejects_foreign_contexts() {
        let fx = fixture();
        let person = person();
        let observer = ComputedObserver::new(
            &Rc::downgrade(&fx.locator),
            &person,
            "full",
            Rc::new(|_: &ObjectRef| Value::Undefined),
            None,
            false,
        );
        let result = observer.handle_change(Context::Source, Change::Signal, BindingFlags::empty());
        assert!(matches!(
            result,
            Err(BindingError::UnexpectedContext(Context::Source))
        ));
    }
}
