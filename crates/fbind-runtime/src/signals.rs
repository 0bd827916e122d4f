#![forbid(unsafe_code)]

//! Named signals: a manual way to make bindings re-evaluate.
//!
//! Some values depend on things no expression reads (the clock, a locale
//! switch). Bindings register under a signal name, and dispatching the name
//! refreshes every one of them.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;

use crate::error::BindingError;
use crate::flags::BindingFlags;
use crate::observation::{Change, Context, SubscriberRef};

/// Name → listener registry. Each list behaves as a set.
#[derive(Default)]
pub struct Signaler {
    listeners: RefCell<AHashMap<Rc<str>, Vec<SubscriberRef>>>,
}

fn same(a: &SubscriberRef, b: &SubscriberRef) -> bool {
    a.as_ptr().cast::<()>() == b.as_ptr().cast::<()>()
}

impl Signaler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_signal_listener(&self, name: &str, listener: SubscriberRef) {
        let mut listeners = self.listeners.borrow_mut();
        let list = listeners.entry(Rc::from(name)).or_default();
        if !list.iter().any(|l| same(l, &listener)) {
            list.push(listener);
        }
    }

    pub fn remove_signal_listener(&self, name: &str, listener: &SubscriberRef) {
        let mut listeners = self.listeners.borrow_mut();
        if let Some(list) = listeners.get_mut(name) {
            list.retain(|l| !same(l, listener));
            if list.is_empty() {
                listeners.remove(name);
            }
        }
    }

    /// Live listeners registered under `name`.
    #[must_use]
    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners
            .borrow()
            .get(name)
            .map_or(0, |list| list.iter().filter(|l| l.strong_count() > 0).count())
    }

    /// Refresh every listener of `name`. Unknown names are ignored.
    ///
    /// Every listener runs even when one fails; the first failure is
    /// returned.
    pub fn dispatch_signal(&self, name: &str, flags: BindingFlags) -> Result<(), BindingError> {
        let snapshot = {
            let mut listeners = self.listeners.borrow_mut();
            let Some(list) = listeners.get_mut(name) else {
                return Ok(());
            };
            list.retain(|l| l.strong_count() > 0);
            list.clone()
        };
        tracing::debug!(signal = name, listeners = snapshot.len(), "dispatching signal");
        let mut first_error = None;
        for listener in snapshot {
            if let Some(listener) = listener.upgrade() {
                if let Err(error) = listener.handle_change(
                    Context::Source,
                    Change::Signal,
                    flags | BindingFlags::UPDATE_TARGET_INSTANCE,
                ) {
                    first_error.get_or_insert(error);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for Signaler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signaler")
            .field("signals", &self.listeners.borrow().len())
            .finish()
    }
}
