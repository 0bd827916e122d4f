#![forbid(unsafe_code)]

//! Compact multi-subscriber list shared by every observer.
//!
//! Most observed properties have one to three subscribers, so entries live
//! inline until a fourth arrives.

use std::cell::RefCell;

use smallvec::SmallVec;

use super::{Change, Context, SubscriberRef};
use crate::error::BindingError;
use crate::flags::BindingFlags;

#[derive(Clone)]
struct Entry {
    context: Context,
    subscriber: SubscriberRef,
}

impl Entry {
    fn matches(&self, context: Context, subscriber: &SubscriberRef) -> bool {
        self.context == context && same_subscriber(&self.subscriber, subscriber)
    }
}

fn same_subscriber(a: &SubscriberRef, b: &SubscriberRef) -> bool {
    a.as_ptr().cast::<()>() == b.as_ptr().cast::<()>()
}

/// Ordered set of `(context, subscriber)` pairs.
#[derive(Default)]
pub struct SubscriberCollection {
    entries: RefCell<SmallVec<[Entry; 3]>>,
}

impl SubscriberCollection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. Returns `false` when the pair was already present.
    pub fn add(&self, context: Context, subscriber: SubscriberRef) -> bool {
        let mut entries = self.entries.borrow_mut();
        if entries.iter().any(|e| e.matches(context, &subscriber)) {
            return false;
        }
        entries.push(Entry {
            context,
            subscriber,
        });
        true
    }

    /// Remove a subscriber. Returns `false` when it was not present.
    pub fn remove(&self, context: Context, subscriber: &SubscriberRef) -> bool {
        let mut entries = self.entries.borrow_mut();
        match entries.iter().position(|e| e.matches(context, subscriber)) {
            Some(index) => {
                entries.remove(index);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn contains(&self, context: Context, subscriber: &SubscriberRef) -> bool {
        self.entries
            .borrow()
            .iter()
            .any(|e| e.matches(context, subscriber))
    }

    /// Number of live subscribers. Dropped ones are pruned first.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prune();
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    fn prune(&self) {
        self.entries
            .borrow_mut()
            .retain(|e| e.subscriber.strong_count() > 0);
    }

    /// Notify every subscriber with the context it subscribed under.
    ///
    /// Stops at the first error.
    pub fn notify(&self, change: Change<'_>, flags: BindingFlags) -> Result<(), BindingError> {
        self.prune();
        let snapshot: SmallVec<[Entry; 3]> = self.entries.borrow().clone();
        for entry in snapshot {
            if let Some(subscriber) = entry.subscriber.upgrade() {
                subscriber.handle_change(entry.context, change, flags)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for SubscriberCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberCollection")
            .field("len", &self.entries.borrow().len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::cell::RefCell;
    use std::rc::{Rc, Weak};

    use fbind_core::Value;

    use crate::error::BindingError;
    use crate::flags::BindingFlags;
    use crate::observation::{Change, Context, Subscriber, SubscriberRef};

    /// Subscriber recording what it was told.
    #[derive(Default)]
    pub(crate) struct Spy {
        pub(crate) calls: RefCell<Vec<(Context, Value, Value, BindingFlags)>>,
        pub(crate) records: RefCell<usize>,
    }

    impl Spy {
        pub(crate) fn new() -> Rc<Self> {
            Rc::new(Self::default())
        }

        pub(crate) fn handle(self: &Rc<Self>) -> SubscriberRef {
            let weak: Weak<dyn Subscriber> = Rc::downgrade(self) as Weak<dyn Subscriber>;
            weak
        }

        pub(crate) fn values(&self) -> Vec<(Value, Value)> {
            self.calls
                .borrow()
                .iter()
                .map(|(_, new, old, _)| (new.clone(), old.clone()))
                .collect()
        }

        pub(crate) fn count(&self) -> usize {
            self.calls.borrow().len() + *self.records.borrow()
        }
    }

    impl Subscriber for Spy {
        fn handle_change(
            &self,
            context: Context,
            change: Change<'_>,
            flags: BindingFlags,
        ) -> Result<(), BindingError> {
            match change {
                Change::Property { new, old } => {
                    self.calls
                        .borrow_mut()
                        .push((context, new.clone(), old.clone(), flags));
                }
                Change::Collection(_) | Change::Signal => *self.records.borrow_mut() += 1,
            }
            Ok(())
        }
    }
}
