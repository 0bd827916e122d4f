#![forbid(unsafe_code)]

//! Observer factory and identity cache.
//!
//! [`ObserverLocator::get_observer`] classifies a property and hands out the
//! single observer for that (object, property) pair, caching it in the
//! object's hidden observer table. Properties of primitives and plain
//! properties of collections are not cached: the former never change, the
//! latter are polled.
//!
//! [`ObserverLocator::collect`] runs a closure under a dependency recorder
//! and returns the observers of everything it read. Computed properties use
//! it to discover their dependencies.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use fbind_core::{
    ArrayRef, CollectionKinds, DependencyRecorder, MapRef, ObjectRef, Property, PropertyKind,
    SetRef, Value, instrumentation,
};

use super::{
    CollectionObserver, ComputedObserver, DirtyCheckProperty, DirtyChecker, Observed,
    ObserverRef, PrimitiveObserver, PropertyAccessor, SetterObserver,
};
use crate::config::EngineConfig;
use crate::task_queue::TaskQueue;

/// Extension point consulted for accessor properties before the built-in
/// classification. Returning `None` passes the property on.
pub trait ObservationAdapter {
    fn get_observer(
        &self,
        object: &ObjectRef,
        name: &str,
        descriptor: &Property,
    ) -> Option<ObserverRef>;
}

pub struct ObserverLocator {
    me: Weak<ObserverLocator>,
    task_queue: Rc<TaskQueue>,
    dirty_checker: Rc<DirtyChecker>,
    computed_observation: bool,
    adapters: RefCell<Vec<Rc<dyn ObservationAdapter>>>,
}

impl ObserverLocator {
    pub fn new(
        task_queue: Rc<TaskQueue>,
        dirty_checker: Rc<DirtyChecker>,
        config: &EngineConfig,
    ) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            task_queue,
            dirty_checker,
            computed_observation: config.computed_observation,
            adapters: RefCell::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn task_queue(&self) -> &Rc<TaskQueue> {
        &self.task_queue
    }

    #[must_use]
    pub fn dirty_checker(&self) -> &Rc<DirtyChecker> {
        &self.dirty_checker
    }

    /// Register an adapter. Later adapters are consulted after earlier ones.
    pub fn add_adapter(&self, adapter: Rc<dyn ObservationAdapter>) {
        self.adapters.borrow_mut().push(adapter);
    }

    /// The observer for `name` on `target`, creating and caching it on first
    /// request.
    pub fn get_observer(&self, target: &Value, name: &str) -> ObserverRef {
        match target {
            Value::Object(object) => {
                if let Some(observer) = cached(object, name) {
                    return observer;
                }
                let observer = self.create_object_observer(object, name);
                let any: Rc<dyn Any> = Rc::new(observer.clone());
                object.cache_observer(name, any);
                observer
            }
            Value::Array(array) if name == "length" => {
                self.get_array_observer(array).length_observer()
            }
            Value::Map(map) if name == "size" => self.get_map_observer(map).length_observer(),
            Value::Set(set) if name == "size" => self.get_set_observer(set).length_observer(),
            Value::Array(_) | Value::Map(_) | Value::Set(_) => {
                DirtyCheckProperty::new(&self.dirty_checker, target.clone(), name)
            }
            _ => Rc::new(PrimitiveObserver::new(target.clone(), name)),
        }
    }

    /// The cached observer if one exists, otherwise a plain accessor that
    /// never subscribes.
    pub fn get_accessor(&self, target: &Value, name: &str) -> ObserverRef {
        if let Value::Object(object) = target {
            if let Some(observer) = cached(object, name) {
                return observer;
            }
        }
        Rc::new(PropertyAccessor::new(target.clone(), name))
    }

    pub fn get_array_observer(&self, array: &ArrayRef) -> Rc<CollectionObserver> {
        instrumentation::enable(CollectionKinds::ARRAY);
        existing(&Value::Array(array.clone()))
            .unwrap_or_else(|| CollectionObserver::attach_array(array, Rc::clone(&self.task_queue)))
    }

    pub fn get_map_observer(&self, map: &MapRef) -> Rc<CollectionObserver> {
        instrumentation::enable(CollectionKinds::MAP);
        existing(&Value::Map(map.clone()))
            .unwrap_or_else(|| CollectionObserver::attach_map(map, Rc::clone(&self.task_queue)))
    }

    pub fn get_set_observer(&self, set: &SetRef) -> Rc<CollectionObserver> {
        instrumentation::enable(CollectionKinds::SET);
        existing(&Value::Set(set.clone()))
            .unwrap_or_else(|| CollectionObserver::attach_set(set, Rc::clone(&self.task_queue)))
    }

    /// Observer for any collection value; `None` for non-collections.
    pub fn get_collection_observer(&self, value: &Value) -> Option<Rc<CollectionObserver>> {
        match value {
            Value::Array(array) => Some(self.get_array_observer(array)),
            Value::Map(map) => Some(self.get_map_observer(map)),
            Value::Set(set) => Some(self.get_set_observer(set)),
            _ => None,
        }
    }

    /// Run `f` and return its result along with the observers of every
    /// property and collection it read, in first-read order.
    pub fn collect<R>(&self, f: impl FnOnce() -> R) -> (R, Vec<Observed>) {
        let collector = Rc::new(Collector {
            locator: self.me.clone(),
            observed: RefCell::new(Vec::new()),
        });
        let result = fbind_core::dependency::record(collector.clone(), f);
        let observed = collector.observed.take();
        (result, observed)
    }

    fn create_object_observer(&self, object: &ObjectRef, name: &str) -> ObserverRef {
        let Some(descriptor) = object.descriptor(name) else {
            return SetterObserver::new(object, name, Rc::clone(&self.task_queue));
        };
        match &descriptor.kind {
            PropertyKind::Data(_) if descriptor.is_configurable() => {
                SetterObserver::new(object, name, Rc::clone(&self.task_queue))
            }
            PropertyKind::Accessor { get, set } => {
                let adapters = self.adapters.borrow().clone();
                for adapter in adapters {
                    if let Some(observer) = adapter.get_observer(object, name, &descriptor) {
                        tracing::debug!(property = name, "observer supplied by adapter");
                        return observer;
                    }
                }
                match get {
                    Some(getter) if descriptor.is_configurable() && self.computed_observation => {
                        ComputedObserver::new(
                            &self.me,
                            object,
                            name,
                            Rc::clone(getter),
                            set.clone(),
                            false,
                        )
                    }
                    _ => self.dirty_check(object, name),
                }
            }
            _ => self.dirty_check(object, name),
        }
    }

    fn dirty_check(&self, object: &ObjectRef, name: &str) -> ObserverRef {
        tracing::debug!(property = name, "falling back to dirty checking");
        DirtyCheckProperty::new(&self.dirty_checker, Value::Object(object.clone()), name)
    }
}

impl std::fmt::Debug for ObserverLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverLocator")
            .field("computed_observation", &self.computed_observation)
            .field("adapters", &self.adapters.borrow().len())
            .finish()
    }
}

fn existing(collection: &Value) -> Option<Rc<CollectionObserver>> {
    CollectionObserver::existing(collection)
}

fn cached(object: &ObjectRef, name: &str) -> Option<ObserverRef> {
    let any = object.cached_observer(name)?;
    any.downcast::<ObserverRef>().ok().map(|rc| (*rc).clone())
}

/// Recorder turning reads into observers.
struct Collector {
    locator: Weak<ObserverLocator>,
    observed: RefCell<Vec<Observed>>,
}

impl Collector {
    fn push(&self, observed: Observed) {
        let mut list = self.observed.borrow_mut();
        if !list.iter().any(|o| o.same(&observed)) {
            list.push(observed);
        }
    }
}

impl DependencyRecorder for Collector {
    fn property_read(&self, object: &ObjectRef, name: &str) {
        if let Some(locator) = self.locator.upgrade() {
            let observer = locator.get_observer(&Value::Object(object.clone()), name);
            self.push(Observed::Property(observer));
        }
    }

    fn collection_read(&self, collection: &Value) {
        if let Some(observer) = self
            .locator
            .upgrade()
            .and_then(|locator| locator.get_collection_observer(collection))
        {
            self.push(Observed::Collection(observer));
        }
    }
}
