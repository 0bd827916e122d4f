#![forbid(unsafe_code)]

//! Property and collection observation.
//!
//! An observer watches one property of one object (or one collection) and
//! tells its subscribers when it changes. The [`ObserverLocator`] decides
//! which kind of observer a property gets and guarantees there is only one
//! per (object, property):
//!
//! - [`SetterObserver`]: plain data properties, intercepted on first
//!   subscription and notified once per microtask flush.
//! - [`ComputedObserver`]: getter properties, whose dependencies are
//!   discovered by recording the reads the getter performs.
//! - [`DirtyCheckProperty`]: everything that cannot be intercepted, polled by
//!   the shared [`DirtyChecker`].
//! - [`PrimitiveObserver`]: properties of primitives, which never change.
//! - [`CollectionObserver`]: arrays, maps and sets, with an index map
//!   describing how items moved.
//!
//! # Invariants
//!
//! 1. Subscribers are held weakly and notified in registration order; a
//!    dropped subscriber is skipped and pruned.
//! 2. Adding the same (context, subscriber) pair twice registers it once.
//! 3. Notification iterates a snapshot, so subscribers may unsubscribe (or
//!    subscribe others) while being notified.

pub mod accessor;
pub mod collection;
pub mod computed;
pub mod dirty_check;
pub mod locator;
pub mod primitive;
pub mod setter;
pub mod subscriber_collection;

use std::rc::{Rc, Weak};

use fbind_core::{ChangeRecord, Value};

use crate::error::BindingError;
use crate::flags::BindingFlags;

pub use accessor::PropertyAccessor;
pub use collection::{CollectionLengthObserver, CollectionObserver, IndexMap};
pub use computed::ComputedObserver;
pub use dirty_check::{DirtyCheckProperty, DirtyChecker};
pub use locator::{ObservationAdapter, ObserverLocator};
pub use primitive::PrimitiveObserver;
pub use setter::SetterObserver;
pub use subscriber_collection::SubscriberCollection;

/// Which side of a subscription a notification belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Context {
    /// Something the binding's source expression read has changed.
    Source,
    /// The binding's target property has changed.
    Target,
    /// Something a computed property read has changed.
    Dependency,
}

/// Payload of a notification.
#[derive(Clone, Copy, Debug)]
pub enum Change<'a> {
    Property { new: &'a Value, old: &'a Value },
    Collection(&'a ChangeRecord),
    Signal,
}

/// Receiver of change notifications.
pub trait Subscriber {
    fn handle_change(
        &self,
        context: Context,
        change: Change<'_>,
        flags: BindingFlags,
    ) -> Result<(), BindingError>;
}

/// Weak handle stored by observers.
pub type SubscriberRef = Weak<dyn Subscriber>;

/// Receiver of a collection's batched changes, delivered once per flush.
pub trait BatchedCollectionSubscriber {
    fn handle_batched_change(
        &self,
        index_map: &IndexMap,
        records: &[ChangeRecord],
    ) -> Result<(), BindingError>;
}

/// Short name of an observer implementation, for diagnostics and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ObserverKind {
    Setter,
    Computed,
    DirtyCheck,
    Primitive,
    Accessor,
    CollectionLength,
    Adapter,
}

/// Observer of one property of one value.
pub trait PropertyObserver {
    fn get_value(&self) -> Value;
    fn set_value(&self, value: Value);
    fn subscribe(&self, context: Context, subscriber: SubscriberRef);
    fn unsubscribe(&self, context: Context, subscriber: &SubscriberRef);
    fn bind(&self) {}
    fn unbind(&self) {}
    fn kind(&self) -> ObserverKind;
}

pub type ObserverRef = Rc<dyn PropertyObserver>;

/// Something a binding or computed property is subscribed to.
#[derive(Clone)]
pub enum Observed {
    Property(ObserverRef),
    Collection(Rc<CollectionObserver>),
}

impl Observed {
    pub fn subscribe(&self, context: Context, subscriber: SubscriberRef) {
        match self {
            Self::Property(observer) => observer.subscribe(context, subscriber),
            Self::Collection(observer) => observer.subscribe(context, subscriber),
        }
    }

    pub fn unsubscribe(&self, context: Context, subscriber: &SubscriberRef) {
        match self {
            Self::Property(observer) => observer.unsubscribe(context, subscriber),
            Self::Collection(observer) => observer.unsubscribe(context, subscriber),
        }
    }

    /// Identity comparison.
    #[must_use]
    pub fn same(&self, other: &Observed) -> bool {
        match (self, other) {
            (Self::Property(a), Self::Property(b)) => data_ptr(a) == data_ptr(b),
            (Self::Collection(a), Self::Collection(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Observed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Property(observer) => write!(f, "Observed::Property({:?})", observer.kind()),
            Self::Collection(_) => f.write_str("Observed::Collection"),
        }
    }
}

/// Address of an `Rc`'s payload with the vtable stripped.
pub(crate) fn data_ptr<T: ?Sized>(rc: &Rc<T>) -> *const () {
    Rc::as_ptr(rc).cast::<()>()
}

/// `Rc::ptr_eq` on two trait-object observers, ignoring vtables.
#[must_use]
pub fn same_observer(a: &ObserverRef, b: &ObserverRef) -> bool {
    data_ptr(a) == data_ptr(b)
}

/// Flags a property notification carries: values that are collections mark
/// an instance replacement.
pub(crate) fn property_flags(new: &Value) -> BindingFlags {
    if new.is_collection() {
        BindingFlags::INSTANCE_MUTATION
    } else {
        BindingFlags::empty()
    }
}
