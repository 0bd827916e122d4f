#![forbid(unsafe_code)]

//! Deferred source connects.
//!
//! Connecting a binding walks its whole expression and subscribes to every
//! observer it reaches. When a large view binds at once, the first
//! `minimum_immediate` bindings connect synchronously and the rest are
//! deferred to [`ConnectQueue::flush`], which the host calls once per frame.
//! A flush works in chunks and yields once the frame budget is spent.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use web_time::{Duration, Instant};

use super::Binding;
use crate::config::ConnectQueueConfig;
use crate::error::BindingError;

/// Connects between two budget checks.
const CHUNK: usize = 100;

type FlushRequest = Box<dyn Fn()>;

pub struct ConnectQueue {
    minimum_immediate: usize,
    frame_budget: Duration,
    queue: RefCell<VecDeque<Weak<Binding>>>,
    immediate: Cell<usize>,
    flush_requested: Cell<bool>,
    request: RefCell<Option<FlushRequest>>,
}

impl ConnectQueue {
    #[must_use]
    pub fn new(config: &ConnectQueueConfig) -> Self {
        Self {
            minimum_immediate: config.minimum_immediate,
            frame_budget: config.frame_budget(),
            queue: RefCell::new(VecDeque::new()),
            immediate: Cell::new(0),
            flush_requested: Cell::new(false),
            request: RefCell::new(None),
        }
    }

    /// Called when the queue goes from empty to non-empty.
    pub fn set_flush_request(&self, request: impl Fn() + 'static) {
        *self.request.borrow_mut() = Some(Box::new(request));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Connect `binding` now if the immediate allowance is not used up,
    /// otherwise defer it.
    ///
    /// The caller has just pushed the current value, so an immediate connect
    /// only subscribes. Deferred connects re-evaluate when drained.
    pub fn enqueue(&self, binding: &Rc<Binding>) -> Result<(), BindingError> {
        if self.immediate.get() < self.minimum_immediate {
            self.immediate.set(self.immediate.get() + 1);
            return binding.connect(false);
        }
        self.queue.borrow_mut().push_back(Rc::downgrade(binding));
        if !self.flush_requested.replace(true) {
            tracing::trace!("connect flush requested");
            if let Some(request) = self.request.borrow().as_ref() {
                request();
            }
        }
        Ok(())
    }

    /// Drain deferred connects until the queue is empty or `frame_start` is
    /// more than the frame budget ago. Returns whether work remains.
    ///
    /// Only bindings queued before the call are processed. Dropped and
    /// unbound bindings are skipped.
    pub fn flush(&self, frame_start: Instant) -> Result<bool, BindingError> {
        let pending = self.len();
        let _span = tracing::trace_span!("connect_queue.flush", pending).entered();
        let mut ran = 0;
        while ran < pending {
            let next = self.queue.borrow_mut().pop_front();
            let Some(binding) = next else { break };
            ran += 1;
            if let Some(binding) = binding.upgrade() {
                if binding.is_bound() {
                    binding.connect(true)?;
                }
            }
            if ran % CHUNK == 0 && frame_start.elapsed() > self.frame_budget {
                break;
            }
        }
        let remaining = !self.is_empty();
        if !remaining {
            self.flush_requested.set(false);
            self.immediate.set(0);
        }
        tracing::trace!(ran, remaining, "connects flushed");
        Ok(remaining)
    }
}

impl std::fmt::Debug for ConnectQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectQueue")
            .field("queued", &self.len())
            .field("immediate", &self.immediate.get())
            .field("minimum_immediate", &self.minimum_immediate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expression;
    use crate::binding::BindingMode;
    use crate::config::EngineConfig;
    use crate::flags::BindingFlags;
    use crate::observation::{DirtyChecker, ObserverLocator};
    use crate::resources::Resources;
    use crate::scope::Scope;
    use crate::task_queue::TaskQueue;
    use fbind_core::{ObjectRef, Property, Value, object};

    fn bindings(count: usize, minimum_immediate: usize) -> (Rc<ConnectQueue>, Vec<Rc<Binding>>) {
        let config = EngineConfig::default().with_minimum_immediate_connects(minimum_immediate);
        let queue = Rc::new(TaskQueue::new(&config));
        let locator = ObserverLocator::new(queue, Rc::new(DirtyChecker::default()), &config);
        let resources = Rc::new(Resources::new());
        let connects = Rc::new(ConnectQueue::new(&config.connect_queue));
        let scope = Scope::new(Value::from(object! { "name" => "Ada" }));
        let bindings = (0..count)
            .map(|_| {
                let binding = Binding::new(
                    Rc::new(Expression::scope("name")),
                    Value::from(object! {}),
                    "value",
                    BindingMode::ToView,
                    Rc::clone(&locator),
                    Rc::clone(&resources),
                    Rc::clone(&connects),
                );
                binding.bind(BindingFlags::empty(), &scope).unwrap();
                binding
            })
            .collect();
        (connects, bindings)
    }

    #[test]
    fn first_connects_run_immediately() {
        let (connects, bindings) = bindings(5, 3);
        let connected = bindings.iter().filter(|b| b.is_connected()).count();
        assert_eq!(connected, 3);
        assert_eq!(connects.len(), 2);

        assert!(!connects.flush(Instant::now()).unwrap());
        assert!(bindings.iter().all(|b| b.is_connected()));
        assert!(connects.is_empty());
    }

    #[test]
    fn flush_request_fires_once_per_batch() {
        let requests = Rc::new(Cell::new(0));
        let config = EngineConfig::default().with_minimum_immediate_connects(0);
        let connects = ConnectQueue::new(&config.connect_queue);
        let counter = Rc::clone(&requests);
        connects.set_flush_request(move || counter.set(counter.get() + 1));

        let (_, bindings) = bindings(2, 0);
        for binding in &bindings {
            connects.enqueue(binding).unwrap();
        }
        assert_eq!(requests.get(), 1);
        assert!(!connects.flush(Instant::now()).unwrap());
    }

    #[test]
    fn immediate_connect_writes_the_target_once() {
        let config = EngineConfig::default();
        let queue = Rc::new(TaskQueue::new(&config));
        let locator = ObserverLocator::new(queue, Rc::new(DirtyChecker::default()), &config);
        let connects = Rc::new(ConnectQueue::new(&config.connect_queue));

        let writes = Rc::new(Cell::new(0));
        let counter = Rc::clone(&writes);
        let target = object! {};
        target.define_property(
            "value",
            Property::accessor(
                Some(Rc::new(|_: &ObjectRef| Value::Undefined)),
                Some(Rc::new(move |_: &ObjectRef, _: Value| counter.set(counter.get() + 1))),
            ),
        );
        let binding = Binding::new(
            Rc::new(Expression::scope("user")),
            Value::from(target),
            "value",
            BindingMode::ToView,
            locator,
            Rc::new(Resources::new()),
            Rc::clone(&connects),
        );
        let vm = object! { "user" => object! { "name" => "Ada" } };
        binding
            .bind(BindingFlags::empty(), &Scope::new(Value::from(vm)))
            .unwrap();
        assert!(binding.is_connected());
        assert!(connects.is_empty());
        assert_eq!(writes.get(), 1);
    }

    #[test]
    fn unbound_bindings_are_skipped() {
        let (connects, bindings) = bindings(2, 0);
        bindings[0].unbind(BindingFlags::empty());
        connects.flush(Instant::now()).unwrap();
        assert!(!bindings[0].is_connected());
        assert!(bindings[1].is_connected());
    }

    #[test]
    fn exhausted_budget_yields() {
        let (connects, bindings) = bindings(CHUNK + 10, 0);
        let long_ago = Instant::now() - Duration::from_secs(1);
        assert!(connects.flush(long_ago).unwrap());
        assert_eq!(connects.len(), 10);
        assert!(!connects.flush(Instant::now()).unwrap());
        assert!(bindings.iter().all(|b| b.is_connected()));
    }
}
