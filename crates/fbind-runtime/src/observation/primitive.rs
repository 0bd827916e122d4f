#![forbid(unsafe_code)]

//! Observer for properties of primitive values.

use std::rc::Rc;

use fbind_core::Value;
use fbind_core::value::utf16_len;

use super::{Context, ObserverKind, PropertyObserver, SubscriberRef};

/// A primitive never changes under a fixed reference, so this observer never
/// notifies. `length` of a string reads its UTF-16 length; every other
/// property reads `Undefined`.
#[derive(Debug)]
pub struct PrimitiveObserver {
    primitive: Value,
    name: Rc<str>,
}

impl PrimitiveObserver {
    #[must_use]
    pub fn new(primitive: Value, name: &str) -> Self {
        Self {
            primitive,
            name: Rc::from(name),
        }
    }
}

impl PropertyObserver for PrimitiveObserver {
    fn get_value(&self) -> Value {
        match (&self.primitive, &*self.name) {
            (Value::String(s), "length") => Value::from(utf16_len(s)),
            _ => Value::Undefined,
        }
    }

    fn set_value(&self, _value: Value) {}

    fn subscribe(&self, _context: Context, _subscriber: SubscriberRef) {}

    fn unsubscribe(&self, _context: Context, _subscriber: &SubscriberRef) {}

    fn kind(&self) -> ObserverKind {
        ObserverKind::Primitive
    }
}
