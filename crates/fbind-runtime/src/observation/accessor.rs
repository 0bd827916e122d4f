#![forbid(unsafe_code)]

//! Plain get/set access for targets that are written but never watched.

use std::rc::Rc;

use fbind_core::{Value, dependency};

use super::{Context, ObserverKind, PropertyObserver, SubscriberRef};

/// Reads and writes a property directly. Subscribing is a no-op.
#[derive(Debug)]
pub struct PropertyAccessor {
    target: Value,
    name: Rc<str>,
}

impl PropertyAccessor {
    #[must_use]
    pub fn new(target: Value, name: &str) -> Self {
        Self {
            target,
            name: Rc::from(name),
        }
    }
}

impl PropertyObserver for PropertyAccessor {
    fn get_value(&self) -> Value {
        dependency::untracked(|| self.target.get_property(&self.name))
    }

    fn set_value(&self, value: Value) {
        self.target.set_property(&self.name, value);
    }

    fn subscribe(&self, _context: Context, _subscriber: SubscriberRef) {}

    fn unsubscribe(&self, _context: Context, _subscriber: &SubscriberRef) {}

    fn kind(&self) -> ObserverKind {
        ObserverKind::Accessor
    }
}
