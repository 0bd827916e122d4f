#![forbid(unsafe_code)]

//! Dependency recording for computed properties.
//!
//! A recorder is installed for the duration of a closure with [`record`].
//! While it is the innermost frame, every [`ObjectRef::get`] and every
//! collection read reports itself to the recorder. This is how a computed
//! property learns what it depends on without intercepting field access:
//! the object graph already funnels every read through one place.
//!
//! [`untracked`] pushes a frame with no recorder, suspending collection for
//! nested reads. Recorders themselves run untracked, so whatever they read
//! while handling a report is never reported back.
//!
//! # Invariants
//!
//! 1. Frames are strictly nested; a frame is popped when its guard drops,
//!    including on unwind.
//! 2. Only the innermost frame receives reports.

use std::cell::RefCell;
use std::rc::Rc;

use crate::object::ObjectRef;
use crate::value::Value;

/// Receives the reads performed while it is the active recorder.
pub trait DependencyRecorder {
    /// A property named `name` was read from `object`.
    fn property_read(&self, object: &ObjectRef, name: &str);
    /// The contents of a collection (array, map or set) were read.
    fn collection_read(&self, collection: &Value);
}

thread_local! {
    static FRAMES: RefCell<Vec<Option<Rc<dyn DependencyRecorder>>>> = const { RefCell::new(Vec::new()) };
}

struct Frame;

impl Frame {
    fn push(recorder: Option<Rc<dyn DependencyRecorder>>) -> Self {
        FRAMES.with(|frames| frames.borrow_mut().push(recorder));
        Frame
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        FRAMES.with(|frames| {
            frames.borrow_mut().pop();
        });
    }
}

/// Run `f` with `recorder` receiving every read it performs.
pub fn record<R>(recorder: Rc<dyn DependencyRecorder>, f: impl FnOnce() -> R) -> R {
    let _frame = Frame::push(Some(recorder));
    f()
}

/// Run `f` without reporting its reads to any recorder.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _frame = Frame::push(None);
    f()
}

/// Whether a recorder is currently receiving reads.
#[must_use]
pub fn is_recording() -> bool {
    current().is_some()
}

fn current() -> Option<Rc<dyn DependencyRecorder>> {
    FRAMES.with(|frames| frames.borrow().last().cloned().flatten())
}

pub(crate) fn property_read(object: &ObjectRef, name: &str) {
    if let Some(recorder) = current() {
        untracked(|| recorder.property_read(object, name));
    }
}

pub(crate) fn collection_read(collection: Value) {
    if let Some(recorder) = current() {
        untracked(|| recorder.collection_read(&collection));
    }
}
