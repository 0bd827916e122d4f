#![forbid(unsafe_code)]

//! Named value converters and binding behaviors.
//!
//! Expressions refer to converters (`value | name:arg`) and behaviors
//! (`value & name:arg`) by name; [`Resources`] is where those names resolve.
//! It also owns the [`Signaler`] converters and the `signal` behavior use.

use std::cell::RefCell;
use std::rc::Rc;

use ahash::AHashMap;
use fbind_core::Value;

use crate::binding::{Binding, BindingMode};
use crate::error::EvaluateError;
use crate::scope::Scope;
use crate::signals::Signaler;

/// Two-way value transform applied by `expr | name`.
pub trait ValueConverter {
    /// Source → target.
    fn to_view(&self, value: Value, args: &[Value]) -> Value;

    /// Target → source. Passes the value through by default.
    fn from_view(&self, value: Value, _args: &[Value]) -> Value {
        value
    }

    /// Signals that invalidate this converter's output.
    fn signals(&self) -> Vec<Rc<str>> {
        Vec::new()
    }
}

/// Per-binding hook applied by `expr & name`.
pub trait BindingBehavior {
    fn bind(&self, binding: &Binding, scope: &Scope, args: &[Value]) -> Result<(), EvaluateError>;
    fn unbind(&self, binding: &Binding, scope: &Scope);
}

#[derive(Default)]
pub struct Resources {
    converters: RefCell<AHashMap<Rc<str>, Rc<dyn ValueConverter>>>,
    behaviors: RefCell<AHashMap<Rc<str>, Rc<dyn BindingBehavior>>>,
    signaler: Rc<Signaler>,
}

impl Resources {
    /// Empty registry with its own signaler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in behaviors: `oneTime`, `toView`,
    /// `fromView`, `twoWay` and `signal`.
    #[must_use]
    pub fn with_defaults() -> Self {
        let resources = Self::new();
        resources.register_behavior("oneTime", Rc::new(ModeBehavior(BindingMode::OneTime)));
        resources.register_behavior("toView", Rc::new(ModeBehavior(BindingMode::ToView)));
        resources.register_behavior("fromView", Rc::new(ModeBehavior(BindingMode::FromView)));
        resources.register_behavior("twoWay", Rc::new(ModeBehavior(BindingMode::TwoWay)));
        resources.register_behavior("signal", Rc::new(SignalBehavior));
        resources
    }

    #[must_use]
    pub fn signaler(&self) -> &Rc<Signaler> {
        &self.signaler
    }

    /// Register a converter, replacing any previous one with the same name.
    pub fn register_converter(&self, name: &str, converter: Rc<dyn ValueConverter>) {
        self.converters.borrow_mut().insert(Rc::from(name), converter);
    }

    /// Register a behavior, replacing any previous one with the same name.
    pub fn register_behavior(&self, name: &str, behavior: Rc<dyn BindingBehavior>) {
        self.behaviors.borrow_mut().insert(Rc::from(name), behavior);
    }

    #[must_use]
    pub fn value_converter(&self, name: &str) -> Option<Rc<dyn ValueConverter>> {
        self.converters.borrow().get(name).cloned()
    }

    #[must_use]
    pub fn binding_behavior(&self, name: &str) -> Option<Rc<dyn BindingBehavior>> {
        self.behaviors.borrow().get(name).cloned()
    }
}

impl std::fmt::Debug for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut converters: Vec<_> = self.converters.borrow().keys().cloned().collect();
        let mut behaviors: Vec<_> = self.behaviors.borrow().keys().cloned().collect();
        converters.sort();
        behaviors.sort();
        f.debug_struct("Resources")
            .field("converters", &converters)
            .field("behaviors", &behaviors)
            .finish()
    }
}

/// Overrides the binding's mode while bound.
struct ModeBehavior(BindingMode);

impl BindingBehavior for ModeBehavior {
    fn bind(&self, binding: &Binding, _scope: &Scope, _args: &[Value]) -> Result<(), EvaluateError> {
        binding.override_mode(self.0);
        Ok(())
    }

    fn unbind(&self, binding: &Binding, _scope: &Scope) {
        binding.restore_mode();
    }
}

/// `& signal:'a':'b'` refreshes the binding whenever `a` or `b` is
/// dispatched.
struct SignalBehavior;

impl BindingBehavior for SignalBehavior {
    fn bind(&self, binding: &Binding, _scope: &Scope, args: &[Value]) -> Result<(), EvaluateError> {
        let signaler = Rc::clone(binding.resources().signaler());
        for name in args {
            let name = name.to_property_key();
            signaler.add_signal_listener(&name, binding.subscriber_handle());
            binding.push_signal_name(name);
        }
        Ok(())
    }

    fn unbind(&self, binding: &Binding, _scope: &Scope) {
        let signaler = Rc::clone(binding.resources().signaler());
        for name in binding.take_signal_names() {
            signaler.remove_signal_listener(&name, &binding.subscriber_handle());
        }
    }
}
