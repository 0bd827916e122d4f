#![forbid(unsafe_code)]

//! Expression-to-property bindings.
//!
//! A [`Binding`] keeps one target property in sync with one source
//! expression evaluated against a [`Scope`]. Depending on its
//! [`BindingMode`] it pushes source values to the target, assigns target
//! values back through the expression, or both.
//!
//! # Lifecycle
//!
//! ```text
//!   new ──bind(scope)──▶ bound ──unbind──▶ unbound
//!              ▲            │
//!              └─bind(other scope) (unbinds first)
//! ```
//!
//! While bound the binding owns a list of observer slots, one per observed
//! property or collection. Each slot carries the version of the connect pass
//! that last touched it. A source change re-runs `connect` under a new
//! version and drops every slot that version did not reach, so a `?:` that
//! switched branches stops observing the branch it left.
//!
//! # Invariants
//!
//! 1. Notifications received while unbound are ignored.
//! 2. A primitive equal to the last one pushed is not written to the target
//!    again. Target-side notifications refresh that memory.
//! 3. Unbinding releases every slot and the target subscription.

pub mod connect_queue;
pub mod set;

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use bitflags::bitflags;
use fbind_core::Value;
use smallvec::SmallVec;

pub use connect_queue::ConnectQueue;
pub use set::BindingSet;

use crate::ast::Expression;
use crate::error::{BindingError, BindingResult};
use crate::flags::BindingFlags;
use crate::observation::{
    Change, Context, Observed, ObserverLocator, ObserverRef, Subscriber, SubscriberRef,
};
use crate::resources::Resources;
use crate::scope::Scope;

/// Direction(s) a binding propagates values in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BindingMode {
    /// Push the source value once at bind and never observe.
    OneTime,
    /// Source → target.
    #[default]
    ToView,
    /// Target → source.
    FromView,
    /// Both directions.
    TwoWay,
}

impl BindingMode {
    /// Whether the source expression is observed.
    #[must_use]
    pub fn observes_source(self) -> bool {
        matches!(self, Self::ToView | Self::TwoWay)
    }

    /// Whether the target property is observed.
    #[must_use]
    pub fn observes_target(self) -> bool {
        matches!(self, Self::FromView | Self::TwoWay)
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    struct State: u8 {
        const BOUND = 1 << 0;
        const CONNECTED = 1 << 1;
    }
}

struct Slot {
    observed: Observed,
    version: u32,
}

pub struct Binding {
    me: Weak<Binding>,
    expression: Rc<Expression>,
    target: Value,
    target_property: Rc<str>,
    declared_mode: BindingMode,
    mode: Cell<BindingMode>,
    locator: Rc<ObserverLocator>,
    resources: Rc<Resources>,
    connect_queue: Rc<ConnectQueue>,
    state: Cell<State>,
    scope: RefCell<Option<Scope>>,
    target_observer: RefCell<Option<ObserverRef>>,
    slots: RefCell<SmallVec<[Slot; 4]>>,
    version: Cell<u32>,
    behaviors: RefCell<SmallVec<[Rc<str>; 2]>>,
    signal_names: RefCell<Vec<Rc<str>>>,
    last_pushed: RefCell<Option<Value>>,
}

impl Binding {
    #[must_use]
    pub fn new(
        expression: Rc<Expression>,
        target: Value,
        target_property: &str,
        mode: BindingMode,
        locator: Rc<ObserverLocator>,
        resources: Rc<Resources>,
        connect_queue: Rc<ConnectQueue>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            expression,
            target,
            target_property: Rc::from(target_property),
            declared_mode: mode,
            mode: Cell::new(mode),
            locator,
            resources,
            connect_queue,
            state: Cell::new(State::empty()),
            scope: RefCell::new(None),
            target_observer: RefCell::new(None),
            slots: RefCell::new(SmallVec::new()),
            version: Cell::new(0),
            behaviors: RefCell::new(SmallVec::new()),
            signal_names: RefCell::new(Vec::new()),
            last_pushed: RefCell::new(None),
        })
    }

    #[must_use]
    pub fn expression(&self) -> &Rc<Expression> {
        &self.expression
    }

    #[must_use]
    pub fn target(&self) -> &Value {
        &self.target
    }

    #[must_use]
    pub fn target_property(&self) -> &str {
        &self.target_property
    }

    /// The effective mode, including any behavior override.
    #[must_use]
    pub fn mode(&self) -> BindingMode {
        self.mode.get()
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.state.get().contains(State::BOUND)
    }

    /// Whether the source expression has been connected since the last bind.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.get().contains(State::CONNECTED)
    }

    #[must_use]
    pub fn resources(&self) -> &Rc<Resources> {
        &self.resources
    }

    #[must_use]
    pub fn locator(&self) -> &Rc<ObserverLocator> {
        &self.locator
    }

    /// The scope this binding is bound to.
    #[must_use]
    pub fn scope(&self) -> Option<Scope> {
        self.scope.borrow().clone()
    }

    /// Number of properties and collections currently observed.
    #[must_use]
    pub fn observed_count(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Weak handle under which this binding subscribes to observers.
    #[must_use]
    pub fn subscriber_handle(&self) -> SubscriberRef {
        self.me.clone()
    }

    // -- behavior bookkeeping ------------------------------------------------

    pub fn override_mode(&self, mode: BindingMode) {
        self.mode.set(mode);
    }

    pub fn restore_mode(&self) {
        self.mode.set(self.declared_mode);
    }

    #[must_use]
    pub fn has_behavior(&self, name: &str) -> bool {
        self.behaviors.borrow().iter().any(|b| &**b == name)
    }

    /// Record `name` as applied. Returns `false` if it already was.
    pub fn record_behavior(&self, name: &Rc<str>) -> bool {
        if self.has_behavior(name) {
            return false;
        }
        self.behaviors.borrow_mut().push(Rc::clone(name));
        true
    }

    /// Forget `name`. Returns `false` if it was not applied.
    pub fn forget_behavior(&self, name: &str) -> bool {
        let mut behaviors = self.behaviors.borrow_mut();
        let before = behaviors.len();
        behaviors.retain(|b| &**b != name);
        behaviors.len() != before
    }

    pub fn push_signal_name(&self, name: Rc<str>) {
        self.signal_names.borrow_mut().push(name);
    }

    pub fn take_signal_names(&self) -> Vec<Rc<str>> {
        std::mem::take(&mut *self.signal_names.borrow_mut())
    }

    // -- lifecycle -------------------------------------------------------------

    /// Bind to `scope`.
    ///
    /// Binding again to the same scope is a no-op; binding to another scope
    /// unbinds first. A failing bind leaves the binding unbound.
    pub fn bind(&self, flags: BindingFlags, scope: &Scope) -> BindingResult<()> {
        if self.is_bound() {
            if self.scope.borrow().as_ref().is_some_and(|s| s.ptr_eq(scope)) {
                return Ok(());
            }
            self.unbind(flags);
        }
        let _span = tracing::debug_span!("binding.bind", property = %self.target_property)
            .entered();
        self.state.set(State::BOUND);
        *self.scope.borrow_mut() = Some(scope.clone());

        if let Err(error) = self.bind_inner(flags | BindingFlags::FROM_BIND, scope) {
            tracing::debug!(%error, "bind failed");
            self.unbind(flags);
            return Err(error);
        }
        tracing::debug!(mode = ?self.mode(), "bound");
        Ok(())
    }

    fn bind_inner(&self, flags: BindingFlags, scope: &Scope) -> BindingResult<()> {
        self.expression.bind(self, scope, flags)?;

        let mode = self.mode();
        let observer = if mode.observes_target() {
            self.locator.get_observer(&self.target, &self.target_property)
        } else {
            self.locator.get_accessor(&self.target, &self.target_property)
        };
        observer.bind();
        *self.target_observer.borrow_mut() = Some(Rc::clone(&observer));

        if mode != BindingMode::FromView {
            let value = self.expression.evaluate(scope, &self.resources, flags)?;
            self.update_target(value);
        }
        if mode.observes_source() {
            if flags.contains(BindingFlags::CONNECT_IMMEDIATE) {
                self.connect(false)?;
            } else if let Some(me) = self.me.upgrade() {
                self.connect_queue.enqueue(&me)?;
            }
        }
        if mode.observes_target() {
            observer.subscribe(Context::Target, self.subscriber_handle());
        }
        Ok(())
    }

    /// Detach from the scope and every observer. Unbinding an unbound
    /// binding does nothing.
    pub fn unbind(&self, flags: BindingFlags) {
        if !self.is_bound() {
            return;
        }
        let _span = tracing::debug_span!("binding.unbind", property = %self.target_property)
            .entered();
        let scope = self.scope.borrow_mut().take();
        if let Some(scope) = scope {
            self.expression
                .unbind(self, &scope, flags | BindingFlags::FROM_UNBIND);
        }
        self.state.set(State::empty());

        let handle = self.subscriber_handle();
        let observer = self.target_observer.borrow_mut().take();
        if let Some(observer) = observer {
            observer.unsubscribe(Context::Target, &handle);
            observer.unbind();
        }
        let slots = std::mem::take(&mut *self.slots.borrow_mut());
        for slot in slots {
            slot.observed.unsubscribe(Context::Source, &handle);
        }
        *self.last_pushed.borrow_mut() = None;
        self.restore_mode();
        tracing::debug!("unbound");
    }

    /// Subscribe to everything the source expression reads. With `evaluate`
    /// the current value is pushed to the target first.
    pub fn connect(&self, evaluate: bool) -> BindingResult<()> {
        let Some(scope) = self.scope() else {
            return Ok(());
        };
        if evaluate {
            let value = self
                .expression
                .evaluate(&scope, &self.resources, BindingFlags::empty())?;
            self.update_target(value);
        }
        self.reconnect(&scope, BindingFlags::empty())?;
        self.state.set(self.state.get() | State::CONNECTED);
        Ok(())
    }

    /// Connect under a fresh version and release slots it did not reach.
    fn reconnect(&self, scope: &Scope, flags: BindingFlags) -> BindingResult<()> {
        let version = self.version.get().wrapping_add(1);
        self.version.set(version);
        self.expression.connect(self, scope, flags)?;

        let stale: Vec<Observed> = {
            let mut slots = self.slots.borrow_mut();
            let mut stale = Vec::new();
            slots.retain(|slot| {
                let keep = slot.version == version;
                if !keep {
                    stale.push(slot.observed.clone());
                }
                keep
            });
            stale
        };
        if !stale.is_empty() {
            let handle = self.subscriber_handle();
            for observed in &stale {
                observed.unsubscribe(Context::Source, &handle);
            }
            tracing::trace!(released = stale.len(), "released stale observers");
        }
        Ok(())
    }

    /// Observe `name` on `target` as a source dependency.
    pub fn observe_property(&self, target: &Value, name: &str) {
        let observer = self.locator.get_observer(target, name);
        self.observe(Observed::Property(observer));
    }

    /// Observe a collection's items as a source dependency.
    pub fn observe_collection(&self, collection: &Value) {
        if let Some(observer) = self.locator.get_collection_observer(collection) {
            self.observe(Observed::Collection(observer));
        }
    }

    fn observe(&self, observed: Observed) {
        let version = self.version.get();
        {
            let mut slots = self.slots.borrow_mut();
            if let Some(slot) = slots.iter_mut().find(|s| s.observed.same(&observed)) {
                slot.version = version;
                return;
            }
            slots.push(Slot {
                observed: observed.clone(),
                version,
            });
        }
        observed.subscribe(Context::Source, self.subscriber_handle());
    }

    // -- propagation -----------------------------------------------------------

    /// Write `value` to the target property.
    pub fn update_target(&self, value: Value) {
        if value.is_primitive() {
            let mut last = self.last_pushed.borrow_mut();
            if last.as_ref().is_some_and(|l| l.same_value_zero(&value)) {
                return;
            }
            *last = Some(value.clone());
        } else {
            *self.last_pushed.borrow_mut() = None;
        }
        let observer = self.target_observer.borrow().clone();
        if let Some(observer) = observer {
            observer.set_value(value);
        }
    }

    /// Assign `value` back through the source expression.
    pub fn update_source(&self, value: Value) -> BindingResult<()> {
        let Some(scope) = self.scope() else {
            return Ok(());
        };
        self.expression.assign(
            &scope,
            value,
            &self.resources,
            BindingFlags::UPDATE_SOURCE_EXPRESSION,
        )?;
        Ok(())
    }

    fn handle_source_change(&self, flags: BindingFlags) -> BindingResult<()> {
        let Some(scope) = self.scope() else {
            return Ok(());
        };
        let old = self
            .target_observer
            .borrow()
            .as_ref()
            .map(|observer| observer.get_value())
            .unwrap_or_default();
        let new = self.expression.evaluate(&scope, &self.resources, flags)?;
        let forced = flags
            .intersects(BindingFlags::UPDATE_TARGET_INSTANCE | BindingFlags::ITEMS_MUTATION);
        if forced || !new.strict_eq(&old) {
            self.update_target(new);
        }
        if self.mode().observes_source() {
            self.reconnect(&scope, flags)?;
        }
        Ok(())
    }

    fn handle_target_change(&self, new: &Value) -> BindingResult<()> {
        let Some(scope) = self.scope() else {
            return Ok(());
        };
        *self.last_pushed.borrow_mut() = new.is_primitive().then(|| new.clone());
        let current =
            self.expression
                .evaluate(&scope, &self.resources, BindingFlags::UPDATE_SOURCE_EXPRESSION)?;
        if !new.strict_eq(&current) {
            self.update_source(new.clone())?;
        }
        Ok(())
    }
}

impl Subscriber for Binding {
    fn handle_change(
        &self,
        context: Context,
        change: Change<'_>,
        flags: BindingFlags,
    ) -> Result<(), BindingError> {
        if !self.is_bound() {
            return Ok(());
        }
        match (context, change) {
            (Context::Source, _) => self.handle_source_change(flags),
            (Context::Target, Change::Property { new, .. }) => self.handle_target_change(new),
            (Context::Target, _) => Ok(()),
            (Context::Dependency, _) => Err(BindingError::UnexpectedContext(context)),
        }
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("expression", &self.expression.to_string())
            .field("target_property", &self.target_property)
            .field("mode", &self.mode.get())
            .field("bound", &self.is_bound())
            .field("observed", &self.slots.borrow().len())
            .finish()
    }
}
