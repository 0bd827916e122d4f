#![forbid(unsafe_code)]

//! Two-tier task scheduler.
//!
//! [`TaskQueue`] batches propagation work into a microtask tier and a
//! macrotask tier. Observers queue themselves as microtasks so that several
//! writes within one turn collapse into one notification.
//!
//! The queue never decides *when* to flush. Each tier has an optional flush
//! request callback, armed on the empty → non-empty transition; the host
//! wires it to its own loop (a timer tick, an idle callback, or simply a
//! [`TaskQueue::pump`] call after handling an event).
//!
//! # Invariants
//!
//! 1. Within a tier, tasks run strictly FIFO; tasks queued during a flush run
//!    in the same flush.
//! 2. The micro tier flushes to completion before `pump` touches the macro
//!    tier.
//! 3. Processed microtasks are compacted out once the processed count passes
//!    `micro_task_capacity`, so a self-requeuing chain keeps the backing
//!    vector bounded.
//! 4. A failing task discards the rest of that pass. Its `on_error` may
//!    consume the failure; otherwise the flush returns it.
//! 5. Flushing a tier from inside its own flush is a no-op.

use std::cell::{Cell, RefCell};
use std::panic::Location;
use std::rc::Rc;

use crate::config::EngineConfig;
use crate::error::{BindingError, TaskError};

/// A unit of deferred work.
pub trait Task {
    fn call(&self) -> Result<(), BindingError>;

    /// Handle this task's own failure. Returning `Err` hands it on to the
    /// flush caller.
    fn on_error(&self, error: BindingError) -> Result<(), BindingError> {
        Err(error)
    }
}

/// Adapter turning a closure into a [`Task`].
pub struct TaskFn<F>(pub F);

impl<F> Task for TaskFn<F>
where
    F: Fn() -> Result<(), BindingError>,
{
    fn call(&self) -> Result<(), BindingError> {
        (self.0)()
    }
}

type Entry = (Rc<dyn Task>, Option<&'static Location<'static>>);
type FlushRequest = Box<dyn Fn()>;

/// Microtask/macrotask scheduler.
pub struct TaskQueue {
    micro: RefCell<Vec<Entry>>,
    macro_tasks: RefCell<Vec<Entry>>,
    uncaught: RefCell<Vec<BindingError>>,
    flushing_micro: Cell<bool>,
    flushing_macro: Cell<bool>,
    capacity: usize,
    long_stacks: bool,
    micro_request: RefCell<Option<FlushRequest>>,
    macro_request: RefCell<Option<FlushRequest>>,
    micro_peak: Cell<usize>,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl TaskQueue {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            micro: RefCell::new(Vec::new()),
            macro_tasks: RefCell::new(Vec::new()),
            uncaught: RefCell::new(Vec::new()),
            flushing_micro: Cell::new(false),
            flushing_macro: Cell::new(false),
            capacity: config.micro_task_capacity.max(1),
            long_stacks: config.long_stacks,
            micro_request: RefCell::new(None),
            macro_request: RefCell::new(None),
            micro_peak: Cell::new(0),
        }
    }

    /// Install the callback asked to schedule a microtask flush.
    pub fn set_micro_flush_request(&self, request: impl Fn() + 'static) {
        *self.micro_request.borrow_mut() = Some(Box::new(request));
    }

    /// Install the callback asked to schedule a macrotask flush.
    pub fn set_macro_flush_request(&self, request: impl Fn() + 'static) {
        *self.macro_request.borrow_mut() = Some(Box::new(request));
    }

    #[track_caller]
    pub fn queue_micro_task(&self, task: Rc<dyn Task>) {
        let site = if self.long_stacks {
            Some(Location::caller())
        } else {
            None
        };
        let was_empty = {
            let mut micro = self.micro.borrow_mut();
            let was_empty = micro.is_empty();
            micro.push((task, site));
            self.micro_peak.set(self.micro_peak.get().max(micro.len()));
            was_empty
        };
        if was_empty {
            Self::request(&self.micro_request);
        }
    }

    #[track_caller]
    pub fn queue_task(&self, task: Rc<dyn Task>) {
        let site = if self.long_stacks {
            Some(Location::caller())
        } else {
            None
        };
        let was_empty = {
            let mut tasks = self.macro_tasks.borrow_mut();
            let was_empty = tasks.is_empty();
            tasks.push((task, site));
            was_empty
        };
        if was_empty {
            Self::request(&self.macro_request);
        }
    }

    fn request(slot: &RefCell<Option<FlushRequest>>) {
        // Taken out so the callback may replace itself.
        let request = slot.borrow_mut().take();
        if let Some(request) = request {
            request();
            let mut slot = slot.borrow_mut();
            if slot.is_none() {
                *slot = Some(request);
            }
        }
    }

    /// Record an error raised outside any task (e.g. by a subscriber during a
    /// synchronous collection notification). It is returned by the next
    /// flush.
    pub fn report_uncaught(&self, error: BindingError) {
        tracing::warn!(%error, "uncaught binding error");
        let was_idle = {
            let mut uncaught = self.uncaught.borrow_mut();
            uncaught.push(error);
            uncaught.len() == 1 && self.micro.borrow().is_empty()
        };
        if was_idle {
            Self::request(&self.micro_request);
        }
    }

    #[must_use]
    pub fn micro_task_len(&self) -> usize {
        self.micro.borrow().len()
    }

    #[must_use]
    pub fn task_len(&self) -> usize {
        self.macro_tasks.borrow().len()
    }

    /// Largest length the microtask vector has reached.
    #[must_use]
    pub fn micro_task_peak(&self) -> usize {
        self.micro_peak.get()
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.micro.borrow().is_empty()
            && self.macro_tasks.borrow().is_empty()
            && self.uncaught.borrow().is_empty()
    }

    /// Run every queued microtask, including ones queued while flushing.
    pub fn flush_micro_task_queue(&self) -> Result<(), TaskError> {
        if self.flushing_micro.replace(true) {
            return Ok(());
        }
        let _span = tracing::trace_span!("flush_micro_task_queue").entered();
        let result = self.drain_micro();
        self.flushing_micro.set(false);
        result?;
        self.take_uncaught()
    }

    fn drain_micro(&self) -> Result<(), TaskError> {
        let mut index = 0;
        let mut ran = 0usize;
        loop {
            let entry = self.micro.borrow().get(index).cloned();
            let Some((task, site)) = entry else { break };
            index += 1;
            ran += 1;
            if let Err(error) = task.call() {
                self.micro.borrow_mut().clear();
                tracing::trace!(ran, "microtask failed");
                return task.on_error(error).map_err(|error| TaskError::new(error, site));
            }
            if index > self.capacity {
                self.micro.borrow_mut().drain(..index);
                index = 0;
            }
        }
        self.micro.borrow_mut().clear();
        tracing::trace!(ran, "microtasks flushed");
        Ok(())
    }

    /// Run the macrotasks queued before this call. Tasks queued while it runs
    /// wait for the next flush.
    pub fn flush_task_queue(&self) -> Result<(), TaskError> {
        if self.flushing_macro.replace(true) {
            return Ok(());
        }
        let _span = tracing::trace_span!("flush_task_queue").entered();
        let snapshot = std::mem::take(&mut *self.macro_tasks.borrow_mut());
        let mut result = Ok(());
        for (task, site) in &snapshot {
            if let Err(error) = task.call() {
                result = task
                    .on_error(error)
                    .map_err(|error| TaskError::new(error, *site));
                break;
            }
        }
        tracing::trace!(queued = snapshot.len(), "macrotasks flushed");
        self.flushing_macro.set(false);
        result?;
        self.take_uncaught()
    }

    /// Flush both tiers until nothing is left: microtasks, then macrotasks,
    /// repeated while either tier received new work.
    pub fn pump(&self) -> Result<(), TaskError> {
        loop {
            self.flush_micro_task_queue()?;
            if self.macro_tasks.borrow().is_empty() {
                if self.micro.borrow().is_empty() {
                    return Ok(());
                }
                continue;
            }
            self.flush_task_queue()?;
        }
    }

    fn take_uncaught(&self) -> Result<(), TaskError> {
        let first = {
            let mut uncaught = self.uncaught.borrow_mut();
            if uncaught.is_empty() {
                None
            } else {
                Some(uncaught.remove(0))
            }
        };
        match first {
            Some(error) => Err(TaskError::new(error, None)),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("micro", &self.micro.borrow().len())
            .field("macro", &self.macro_tasks.borrow().len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
