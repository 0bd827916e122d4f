#![forbid(unsafe_code)]

//! Plain objects with property descriptors, prototypes, and interception.
//!
//! An [`ObjectRef`] is the node type of the observed object graph. All reads
//! go through [`ObjectRef::get`] and all writes through [`ObjectRef::set`];
//! there is no other path to a property's value. That single funnel is what
//! lets observers take over a property:
//!
//! - A data property can be **intercepted**: [`ObjectRef::intercept`]
//!   redefines it into a slot backed by a [`PropertyInterceptor`]. Reads and
//!   writes then flow through the interceptor, exactly as a get/set pair
//!   would. Enumerability is preserved.
//! - Every read performed through [`ObjectRef::get`] is reported to the active
//!   dependency recorder (see [`crate::dependency`]).
//! - Each object carries a hidden observer cache, keyed by property name, so
//!   an observer locator can hand out one observer per (object, property).
//!
//! # Invariants
//!
//! 1. No `RefCell` borrow is held while a getter, setter, or interceptor runs.
//! 2. A non-configurable property is never redefined or intercepted.
//! 3. Writes to a non-writable data property are ignored.
//! 4. Prototype chains are walked for reads, `has`, and accessor lookup on
//!    write; new data properties always land on the receiver.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use bitflags::bitflags;

use crate::dependency;
use crate::value::Value;

bitflags! {
    /// Attribute bits of a property.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PropertyAttributes: u8 {
        const WRITABLE = 1 << 0;
        const ENUMERABLE = 1 << 1;
        const CONFIGURABLE = 1 << 2;
    }
}

impl Default for PropertyAttributes {
    fn default() -> Self {
        Self::all()
    }
}

/// Native getter. Receives the object the property was read from.
pub type Getter = Rc<dyn Fn(&ObjectRef) -> Value>;

/// Native setter. Receives the object the property was written on.
pub type Setter = Rc<dyn Fn(&ObjectRef, Value)>;

/// Backing store for an intercepted property.
pub trait PropertyInterceptor {
    /// Value returned when the property is read.
    fn get_value(&self) -> Value;
    /// Called when the property is written.
    fn set_value(&self, value: Value);
}

/// What a property slot holds.
#[derive(Clone)]
pub enum PropertyKind {
    Data(Value),
    Accessor {
        get: Option<Getter>,
        set: Option<Setter>,
    },
    Intercepted(Rc<dyn PropertyInterceptor>),
}

/// A property descriptor: slot contents plus attributes.
#[derive(Clone)]
pub struct Property {
    pub kind: PropertyKind,
    pub attributes: PropertyAttributes,
}

impl Property {
    /// Writable, enumerable, configurable data property.
    #[must_use]
    pub fn data(value: Value) -> Self {
        Self {
            kind: PropertyKind::Data(value),
            attributes: PropertyAttributes::default(),
        }
    }

    /// Enumerable, configurable accessor property.
    #[must_use]
    pub fn accessor(get: Option<Getter>, set: Option<Setter>) -> Self {
        Self {
            kind: PropertyKind::Accessor { get, set },
            attributes: PropertyAttributes::ENUMERABLE | PropertyAttributes::CONFIGURABLE,
        }
    }

    /// Getter-only accessor built from a closure.
    pub fn getter(get: impl Fn(&ObjectRef) -> Value + 'static) -> Self {
        Self::accessor(Some(Rc::new(get)), None)
    }

    /// Replace the attribute bits.
    #[must_use]
    pub fn with_attributes(mut self, attributes: PropertyAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    #[must_use]
    pub fn is_configurable(&self) -> bool {
        self.attributes.contains(PropertyAttributes::CONFIGURABLE)
    }

    #[must_use]
    pub fn is_enumerable(&self) -> bool {
        self.attributes.contains(PropertyAttributes::ENUMERABLE)
    }

    #[must_use]
    pub fn is_accessor(&self) -> bool {
        matches!(self.kind, PropertyKind::Accessor { .. })
    }

    /// The getter of an accessor property.
    #[must_use]
    pub fn get_fn(&self) -> Option<&Getter> {
        match &self.kind {
            PropertyKind::Accessor { get, .. } => get.as_ref(),
            _ => None,
        }
    }

    /// The setter of an accessor property.
    #[must_use]
    pub fn set_fn(&self) -> Option<&Setter> {
        match &self.kind {
            PropertyKind::Accessor { set, .. } => set.as_ref(),
            _ => None,
        }
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            PropertyKind::Data(_) => "data",
            PropertyKind::Accessor { .. } => "accessor",
            PropertyKind::Intercepted(_) => "intercepted",
        };
        f.debug_struct("Property")
            .field("kind", &kind)
            .field("attributes", &self.attributes)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ObjectRef
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ObjectInner {
    properties: RefCell<Vec<(Rc<str>, Property)>>,
    prototype: RefCell<Option<ObjectRef>>,
    observers: RefCell<AHashMap<Rc<str>, Rc<dyn Any>>>,
}

/// Shared handle to a plain object.
#[derive(Clone, Default)]
pub struct ObjectRef(Rc<ObjectInner>);

impl ObjectRef {
    /// Create an empty object with no prototype.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty object inheriting from `prototype`.
    #[must_use]
    pub fn with_prototype(prototype: ObjectRef) -> Self {
        let obj = Self::new();
        *obj.0.prototype.borrow_mut() = Some(prototype);
        obj
    }

    /// Create an object from `(name, value)` pairs as plain data properties.
    pub fn from_entries<K, I>(entries: I) -> Self
    where
        K: Into<Rc<str>>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let obj = Self::new();
        {
            let mut props = obj.0.properties.borrow_mut();
            for (name, value) in entries {
                let name = name.into();
                match props.iter_mut().find(|(n, _)| *n == name) {
                    Some((_, slot)) => *slot = Property::data(value),
                    None => props.push((name, Property::data(value))),
                }
            }
        }
        obj
    }

    /// Identity comparison.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Non-owning handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef(Rc::downgrade(&self.0))
    }

    #[must_use]
    pub fn prototype(&self) -> Option<ObjectRef> {
        self.0.prototype.borrow().clone()
    }

    pub fn set_prototype(&self, prototype: Option<ObjectRef>) {
        *self.0.prototype.borrow_mut() = prototype;
    }

    // -- reads --------------------------------------------------------------

    /// Read a property, recording the read for dependency collection.
    #[must_use]
    pub fn get(&self, name: &str) -> Value {
        dependency::property_read(self, name);
        self.get_untracked(name)
    }

    /// Read a property without reporting it to the dependency recorder.
    #[must_use]
    pub fn get_untracked(&self, name: &str) -> Value {
        let mut holder = self.clone();
        loop {
            match holder.own_kind(name) {
                Some(PropertyKind::Data(value)) => return value,
                Some(PropertyKind::Accessor { get: Some(get), .. }) => return get(self),
                Some(PropertyKind::Accessor { get: None, .. }) => return Value::Undefined,
                Some(PropertyKind::Intercepted(interceptor)) => return interceptor.get_value(),
                None => match holder.prototype() {
                    Some(proto) => holder = proto,
                    None => return Value::Undefined,
                },
            }
        }
    }

    /// Whether `name` is present on this object or its prototype chain.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.descriptor(name).is_some()
    }

    /// Whether `name` is an own property.
    #[must_use]
    pub fn has_own(&self, name: &str) -> bool {
        self.0.properties.borrow().iter().any(|(n, _)| &**n == name)
    }

    /// Own property descriptor.
    #[must_use]
    pub fn own_descriptor(&self, name: &str) -> Option<Property> {
        self.0
            .properties
            .borrow()
            .iter()
            .find(|(n, _)| &**n == name)
            .map(|(_, p)| p.clone())
    }

    /// Descriptor found by walking the prototype chain.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<Property> {
        let mut holder = self.clone();
        loop {
            if let Some(prop) = holder.own_descriptor(name) {
                return Some(prop);
            }
            holder = holder.prototype()?;
        }
    }

    /// Enumerable own property names in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<Rc<str>> {
        self.0
            .properties
            .borrow()
            .iter()
            .filter(|(_, p)| p.is_enumerable())
            .map(|(n, _)| Rc::clone(n))
            .collect()
    }

    /// Number of own properties, enumerable or not.
    #[must_use]
    pub fn own_len(&self) -> usize {
        self.0.properties.borrow().len()
    }

    fn own_kind(&self, name: &str) -> Option<PropertyKind> {
        self.0
            .properties
            .borrow()
            .iter()
            .find(|(n, _)| &**n == name)
            .map(|(_, p)| p.kind.clone())
    }

    // -- writes -------------------------------------------------------------

    /// Write a property.
    ///
    /// Intercepted slots forward to their interceptor, accessors call their
    /// setter (an accessor without setter ignores the write), non-writable
    /// data properties ignore the write, and anything else stores an own data
    /// property.
    pub fn set(&self, name: &str, value: Value) {
        let mut holder = self.clone();
        loop {
            match holder.own_descriptor(name) {
                Some(prop) => {
                    match prop.kind {
                        PropertyKind::Intercepted(interceptor) => interceptor.set_value(value),
                        PropertyKind::Accessor { set: Some(set), .. } => set(self, value),
                        PropertyKind::Accessor { set: None, .. } => {}
                        PropertyKind::Data(_) => {
                            if !prop.attributes.contains(PropertyAttributes::WRITABLE) {
                                return;
                            }
                            if holder.ptr_eq(self) {
                                self.write_own_data(name, value);
                            } else {
                                self.insert_data(name, value);
                            }
                        }
                    }
                    return;
                }
                None => match holder.prototype() {
                    Some(proto) => holder = proto,
                    None => {
                        self.insert_data(name, value);
                        return;
                    }
                },
            }
        }
    }

    fn write_own_data(&self, name: &str, value: Value) {
        let mut props = self.0.properties.borrow_mut();
        if let Some((_, prop)) = props.iter_mut().find(|(n, _)| &**n == name) {
            prop.kind = PropertyKind::Data(value);
        }
    }

    fn insert_data(&self, name: &str, value: Value) {
        let mut props = self.0.properties.borrow_mut();
        match props.iter_mut().find(|(n, _)| &**n == name) {
            Some((_, prop)) => prop.kind = PropertyKind::Data(value),
            None => props.push((Rc::from(name), Property::data(value))),
        }
    }

    /// Define or redefine an own property. Returns `false` when an existing
    /// own property is non-configurable.
    pub fn define_property(&self, name: &str, property: Property) -> bool {
        let mut props = self.0.properties.borrow_mut();
        match props.iter_mut().find(|(n, _)| &**n == name) {
            Some((_, existing)) => {
                if !existing.is_configurable() {
                    return false;
                }
                *existing = property;
            }
            None => props.push((Rc::from(name), property)),
        }
        true
    }

    /// Remove a configurable own property.
    pub fn delete(&self, name: &str) -> bool {
        let mut props = self.0.properties.borrow_mut();
        match props.iter().position(|(n, _)| &**n == name) {
            Some(index) if props[index].1.is_configurable() => {
                props.remove(index);
                true
            }
            Some(_) => false,
            None => true,
        }
    }

    /// Redefine `name` as an intercepted slot backed by `interceptor`.
    ///
    /// Works on configurable own data properties and on names that are not
    /// own properties yet (the inherited or undefined current value is
    /// captured). Returns the value the property held before interception, or
    /// `None` when the property cannot be intercepted (non-configurable, an
    /// accessor, or already intercepted).
    pub fn intercept(&self, name: &str, interceptor: Rc<dyn PropertyInterceptor>) -> Option<Value> {
        if let Some(prop) = self.own_descriptor(name) {
            if !prop.is_configurable() {
                return None;
            }
            let PropertyKind::Data(current) = prop.kind else {
                return None;
            };
            let mut props = self.0.properties.borrow_mut();
            let slot = props.iter_mut().find(|(n, _)| &**n == name)?;
            slot.1 = Property {
                kind: PropertyKind::Intercepted(interceptor),
                attributes: prop.attributes,
            };
            return Some(current);
        }
        let current = self.get_untracked(name);
        self.0.properties.borrow_mut().push((
            Rc::from(name),
            Property {
                kind: PropertyKind::Intercepted(interceptor),
                attributes: PropertyAttributes::default(),
            },
        ));
        Some(current)
    }

    // -- hidden observer cache ---------------------------------------------

    /// Observer previously cached for `name`.
    #[must_use]
    pub fn cached_observer(&self, name: &str) -> Option<Rc<dyn Any>> {
        self.0.observers.borrow().get(name).cloned()
    }

    /// Cache an observer for `name`. The cache is not visible as a property.
    pub fn cache_observer(&self, name: &str, observer: Rc<dyn Any>) {
        self.0.observers.borrow_mut().insert(Rc::from(name), observer);
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Shallow on purpose: object graphs may be cyclic.
        f.debug_struct("ObjectRef")
            .field("keys", &self.keys())
            .finish()
    }
}

/// Non-owning handle to an object.
#[derive(Clone, Debug, Default)]
pub struct WeakObjectRef(Weak<ObjectInner>);

impl WeakObjectRef {
    #[must_use]
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.0.upgrade().map(ObjectRef)
    }
}

impl fmt::Debug for ObjectInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ObjectInner")
    }
}

/// Build an [`ObjectRef`] from `name => value` pairs.
///
/// ```
/// use fbind_core::{object, Value};
///
/// let person = object! { "name" => "Ada", "age" => 36 };
/// assert_eq!(person.get("name"), Value::from("Ada"));
/// ```
#[macro_export]
macro_rules! object {
    () => {
        $crate::object::ObjectRef::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {
        $crate::object::ObjectRef::from_entries([
            $(($name, $crate::value::Value::from($value))),+
        ])
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Recording {
        value: RefCell<Value>,
        writes: Cell<usize>,
    }

    impl PropertyInterceptor for Recording {
        fn get_value(&self) -> Value {
            self.value.borrow().clone()
        }
        fn set_value(&self, value: Value) {
            self.writes.set(self.writes.get() + 1);
            *self.value.borrow_mut() = value;
        }
    }

    #[test]
    fn get_and_set_data_properties() {
        let obj = ObjectRef::new();
        assert_eq!(obj.get("a"), Value::Undefined);
        obj.set("a", Value::from(1));
        assert_eq!(obj.get("a"), Value::from(1));
        obj.set("a", Value::from(2));
        assert_eq!(obj.get("a"), Value::from(2));
        assert_eq!(obj.own_len(), 1);
    }

    #[test]
    fn object_macro_builds_entries() {
        let obj = object! { "a" => 1, "b" => "two" };
        assert_eq!(obj.keys().len(), 2);
        assert_eq!(obj.get("b"), Value::from("two"));
    }

    #[test]
    fn prototype_chain_reads_and_shadowing_writes() {
        let proto = object! { "greeting" => "hi" };
        let obj = ObjectRef::with_prototype(proto.clone());
        assert_eq!(obj.get("greeting"), Value::from("hi"));
        assert!(obj.has("greeting"));
        assert!(!obj.has_own("greeting"));

        obj.set("greeting", Value::from("hello"));
        assert_eq!(obj.get("greeting"), Value::from("hello"));
        assert_eq!(proto.get("greeting"), Value::from("hi"));
    }

    #[test]
    fn getter_receives_receiver() {
        let proto = ObjectRef::new();
        proto.define_property(
            "double",
            Property::getter(|this| Value::from(this.get("n").to_number() * 2.0)),
        );
        let obj = ObjectRef::with_prototype(proto);
        obj.set("n", Value::from(21));
        assert_eq!(obj.get("double"), Value::from(42));
    }

    #[test]
    fn accessor_without_setter_ignores_writes() {
        let obj = ObjectRef::new();
        obj.define_property("fixed", Property::getter(|_| Value::from(7)));
        obj.set("fixed", Value::from(8));
        assert_eq!(obj.get("fixed"), Value::from(7));
    }

    #[test]
    fn non_writable_data_ignores_writes() {
        let obj = ObjectRef::new();
        obj.define_property(
            "k",
            Property::data(Value::from(1)).with_attributes(PropertyAttributes::ENUMERABLE),
        );
        obj.set("k", Value::from(2));
        assert_eq!(obj.get("k"), Value::from(1));
        assert!(!obj.define_property("k", Property::data(Value::from(3))));
        assert!(!obj.delete("k"));
    }

    #[test]
    fn intercept_routes_reads_and_writes() {
        let obj = object! { "x" => 1 };
        let rec = Rc::new(Recording {
            value: RefCell::new(Value::Undefined),
            writes: Cell::new(0),
        });
        let previous = obj.intercept("x", rec.clone());
        assert_eq!(previous, Some(Value::from(1)));
        *rec.value.borrow_mut() = Value::from(1);

        obj.set("x", Value::from(5));
        assert_eq!(rec.writes.get(), 1);
        assert_eq!(obj.get("x"), Value::from(5));
        assert!(obj.own_descriptor("x").is_some_and(|p| p.is_enumerable()));
    }

    #[test]
    fn intercept_preserves_non_enumerability() {
        let obj = ObjectRef::new();
        obj.define_property(
            "hidden",
            Property::data(Value::from(1))
                .with_attributes(PropertyAttributes::WRITABLE | PropertyAttributes::CONFIGURABLE),
        );
        let rec = Rc::new(Recording {
            value: RefCell::new(Value::from(1)),
            writes: Cell::new(0),
        });
        assert!(obj.intercept("hidden", rec).is_some());
        assert!(obj.keys().is_empty());
    }

    #[test]
    fn intercept_refuses_non_configurable_and_accessors() {
        let obj = ObjectRef::new();
        obj.define_property(
            "locked",
            Property::data(Value::from(1)).with_attributes(PropertyAttributes::WRITABLE),
        );
        obj.define_property("computed", Property::getter(|_| Value::Null));
        let rec = Rc::new(Recording {
            value: RefCell::new(Value::Undefined),
            writes: Cell::new(0),
        });
        assert!(obj.intercept("locked", rec.clone()).is_none());
        assert!(obj.intercept("computed", rec).is_none());
    }

    #[test]
    fn intercept_absent_property_captures_inherited_value() {
        let proto = object! { "inherited" => 3 };
        let obj = ObjectRef::with_prototype(proto);
        let rec = Rc::new(Recording {
            value: RefCell::new(Value::Undefined),
            writes: Cell::new(0),
        });
        assert_eq!(obj.intercept("inherited", rec), Some(Value::from(3)));
        assert!(obj.has_own("inherited"));
    }

    #[test]
    fn observer_cache_is_not_a_property() {
        let obj = ObjectRef::new();
        obj.cache_observer("a", Rc::new(5_u32));
        assert!(obj.cached_observer("a").is_some());
        assert!(!obj.has("a"));
        assert!(obj.keys().is_empty());
    }

    #[test]
    fn debug_is_shallow_for_cycles() {
        let obj = ObjectRef::new();
        obj.set("me", Value::from(obj.clone()));
        let debug = format!("{obj:?}");
        assert!(debug.contains("me"));
    }
}
