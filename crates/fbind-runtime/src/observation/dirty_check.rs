#![forbid(unsafe_code)]

//! Polling fallback for properties that cannot be intercepted.
//!
//! A [`DirtyCheckProperty`] joins the shared [`DirtyChecker`] list when it
//! gains its first subscriber and leaves it when it loses its last. The
//! checker compares each property's current value against the last one it
//! saw, on a fixed interval.
//!
//! The checker owns no timer. Adding the first property arms a deadline and
//! calls the optional schedule request with the interval; the host then
//! calls [`DirtyChecker::poll`] (or [`DirtyChecker::check`] directly).

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use fbind_core::{Value, WeakValue, dependency};
use web_time::{Duration, Instant};

use super::{
    Change, Context, ObserverKind, PropertyObserver, SubscriberCollection, SubscriberRef,
    property_flags,
};
use crate::error::BindingError;

type ScheduleRequest = Box<dyn Fn(Duration)>;

/// Shared polling list.
pub struct DirtyChecker {
    interval: Duration,
    tracked: RefCell<Vec<Rc<DirtyCheckProperty>>>,
    deadline: Cell<Option<Instant>>,
    schedule_request: RefCell<Option<ScheduleRequest>>,
}

impl DirtyChecker {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            tracked: RefCell::new(Vec::new()),
            deadline: Cell::new(None),
            schedule_request: RefCell::new(None),
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Install the callback asked to wake the host after `interval`.
    pub fn set_schedule_request(&self, request: impl Fn(Duration) + 'static) {
        *self.schedule_request.borrow_mut() = Some(Box::new(request));
    }

    #[must_use]
    pub fn tracked_len(&self) -> usize {
        self.tracked.borrow().len()
    }

    /// When the next check is due, if one is scheduled.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.get()
    }

    pub fn add_property(&self, property: Rc<DirtyCheckProperty>) {
        let first = {
            let mut tracked = self.tracked.borrow_mut();
            if tracked.iter().any(|p| Rc::ptr_eq(p, &property)) {
                return;
            }
            tracked.push(property);
            tracked.len() == 1
        };
        if first {
            self.schedule();
        }
    }

    pub fn remove_property(&self, property: &DirtyCheckProperty) {
        self.tracked
            .borrow_mut()
            .retain(|p| !std::ptr::eq(Rc::as_ptr(p), property));
    }

    fn schedule(&self) {
        self.deadline.set(Some(Instant::now() + self.interval));
        let request = self.schedule_request.borrow_mut().take();
        if let Some(request) = request {
            request(self.interval);
            let mut slot = self.schedule_request.borrow_mut();
            if slot.is_none() {
                *slot = Some(request);
            }
        }
    }

    /// Run a check if the deadline has passed. Returns whether one ran.
    pub fn poll(&self, now: Instant) -> Result<bool, BindingError> {
        match self.deadline.get() {
            Some(deadline) if now >= deadline => {
                self.check()?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Notify every dirty property, then re-arm while anything is tracked.
    ///
    /// All properties are checked even when one notification fails; the
    /// first failure is returned.
    pub fn check(&self) -> Result<(), BindingError> {
        self.deadline.set(None);
        let snapshot: Vec<_> = self.tracked.borrow().clone();
        let mut first_error = None;
        let mut dirty = 0usize;
        for property in snapshot.iter().rev() {
            if property.is_dirty() {
                dirty += 1;
                if let Err(error) = property.call() {
                    first_error.get_or_insert(error);
                }
            }
        }
        tracing::trace!(tracked = snapshot.len(), dirty, "dirty check");
        if !self.tracked.borrow().is_empty() {
            self.schedule();
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Default for DirtyChecker {
    fn default() -> Self {
        Self::new(Duration::from_millis(120))
    }
}

impl std::fmt::Debug for DirtyChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirtyChecker")
            .field("interval", &self.interval)
            .field("tracked", &self.tracked.borrow().len())
            .finish()
    }
}

/// A polled property.
pub struct DirtyCheckProperty {
    me: Weak<DirtyCheckProperty>,
    checker: Weak<DirtyChecker>,
    target: WeakValue,
    name: Rc<str>,
    old_value: RefCell<Value>,
    subscribers: SubscriberCollection,
}

impl DirtyCheckProperty {
    pub fn new(checker: &Rc<DirtyChecker>, target: Value, name: &str) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            checker: Rc::downgrade(checker),
            target: target.downgrade(),
            name: Rc::from(name),
            old_value: RefCell::new(Value::Undefined),
            subscribers: SubscriberCollection::new(),
        })
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.old_value.borrow().strict_eq(&self.read())
    }

    fn read(&self) -> Value {
        match self.target.upgrade() {
            Some(target) => dependency::untracked(|| target.get_property(&self.name)),
            None => Value::Undefined,
        }
    }

    fn call(&self) -> Result<(), BindingError> {
        let new = self.read();
        let old = self.old_value.replace(new.clone());
        self.subscribers.notify(
            Change::Property {
                new: &new,
                old: &old,
            },
            property_flags(&new),
        )
    }
}

impl PropertyObserver for DirtyCheckProperty {
    fn get_value(&self) -> Value {
        self.read()
    }

    fn set_value(&self, value: Value) {
        if let Some(target) = self.target.upgrade() {
            target.set_property(&self.name, value);
        }
    }

    fn subscribe(&self, context: Context, subscriber: SubscriberRef) {
        if self.subscribers.is_empty() {
            *self.old_value.borrow_mut() = self.read();
            if let (Some(checker), Some(me)) = (self.checker.upgrade(), self.me.upgrade()) {
                checker.add_property(me);
            }
        }
        self.subscribers.add(context, subscriber);
    }

    fn unsubscribe(&self, context: Context, subscriber: &SubscriberRef) {
        if self.subscribers.remove(context, subscriber) && self.subscribers.is_empty() {
            if let Some(checker) = self.checker.upgrade() {
                checker.remove_property(self);
            }
        }
    }

    fn kind(&self) -> ObserverKind {
        ObserverKind::DirtyCheck
    }
}

impl std::fmt::Debug for DirtyCheckProperty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirtyCheckProperty")
            .field("name", &self.name)
            .finish()
    }
}
