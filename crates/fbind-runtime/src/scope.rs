#![forbid(unsafe_code)]

//! Scopes: what expressions resolve names against.
//!
//! A [`Scope`] pairs a binding context (the `this` of an expression) with an
//! [`OverrideContext`] chain. Each override context carries its own
//! properties (`$index`, `$first`, ...) and the binding context it was
//! created for, and points at the context of the enclosing scope.
//!
//! # Invariants
//!
//! 1. The chain is acyclic: a parent is fixed when the child is created.
//! 2. Chain length equals nesting depth.

use std::rc::Rc;

use fbind_core::{ObjectRef, Value};

/// One link of the ancestor chain.
#[derive(Debug)]
pub struct OverrideContext {
    properties: ObjectRef,
    binding_context: Value,
    parent: Option<Rc<OverrideContext>>,
}

impl OverrideContext {
    #[must_use]
    pub fn new(binding_context: Value, parent: Option<Rc<OverrideContext>>) -> Rc<Self> {
        Rc::new(Self {
            properties: ObjectRef::new(),
            binding_context,
            parent,
        })
    }

    /// The context's own, observable properties.
    #[must_use]
    pub fn properties(&self) -> &ObjectRef {
        &self.properties
    }

    #[must_use]
    pub fn binding_context(&self) -> &Value {
        &self.binding_context
    }

    #[must_use]
    pub fn parent(&self) -> Option<&Rc<OverrideContext>> {
        self.parent.as_ref()
    }

    /// Number of links from this context to the root, inclusive.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut current = self.parent.as_deref();
        while let Some(oc) = current {
            depth += 1;
            current = oc.parent.as_deref();
        }
        depth
    }

    fn has_own(&self, name: &str) -> bool {
        self.properties.has(name)
    }

    /// The object a name resolves against at this link: the context's own
    /// properties when they define `name`, otherwise its binding context.
    fn resolve(&self, name: &str) -> Value {
        if self.has_own(name) {
            Value::Object(self.properties.clone())
        } else {
            self.binding_context.clone()
        }
    }
}

/// A binding context plus its override-context chain.
#[derive(Clone, Debug)]
pub struct Scope {
    binding_context: Value,
    override_context: Rc<OverrideContext>,
}

impl Scope {
    /// Root scope for `binding_context`.
    #[must_use]
    pub fn new(binding_context: Value) -> Self {
        let override_context = OverrideContext::new(binding_context.clone(), None);
        Self {
            binding_context,
            override_context,
        }
    }

    /// Child scope whose override context links to `parent`'s.
    #[must_use]
    pub fn child(binding_context: Value, parent: &Scope) -> Self {
        let override_context = OverrideContext::new(
            binding_context.clone(),
            Some(Rc::clone(&parent.override_context)),
        );
        Self {
            binding_context,
            override_context,
        }
    }

    #[must_use]
    pub fn from_parts(binding_context: Value, override_context: Rc<OverrideContext>) -> Self {
        Self {
            binding_context,
            override_context,
        }
    }

    #[must_use]
    pub fn binding_context(&self) -> &Value {
        &self.binding_context
    }

    #[must_use]
    pub fn override_context(&self) -> &Rc<OverrideContext> {
        &self.override_context
    }

    /// Identity comparison: same override context and same binding context.
    #[must_use]
    pub fn ptr_eq(&self, other: &Scope) -> bool {
        Rc::ptr_eq(&self.override_context, &other.override_context)
            && self.binding_context.strict_eq(&other.binding_context)
    }

    /// Resolve the object `name` should be read from.
    ///
    /// With `ancestor > 0`, that many links are skipped first and
    /// `Undefined` is returned when the chain runs out. Otherwise the first
    /// link whose own properties or binding context define `name` wins; when
    /// none does, the scope's binding context is used.
    #[must_use]
    pub fn context_for(&self, name: &str, ancestor: usize) -> Value {
        let mut oc = Some(&self.override_context);
        if ancestor > 0 {
            for _ in 0..ancestor {
                oc = oc.and_then(|c| c.parent.as_ref());
            }
            return match oc {
                Some(oc) => oc.resolve(name),
                None => Value::Undefined,
            };
        }
        while let Some(current) = oc {
            if current.has_own(name) || defines(&current.binding_context, name) {
                return current.resolve(name);
            }
            oc = current.parent.as_ref();
        }
        if self.binding_context.is_nullish() {
            Value::Object(self.override_context.properties.clone())
        } else {
            self.binding_context.clone()
        }
    }

    /// The binding context `ancestor` links up, or `Undefined` past the root.
    #[must_use]
    pub fn ancestor_context(&self, ancestor: usize) -> Value {
        let mut oc = Some(&self.override_context);
        for _ in 0..ancestor {
            oc = oc.and_then(|c| c.parent.as_ref());
        }
        oc.map(|c| c.binding_context.clone()).unwrap_or_default()
    }
}

fn defines(context: &Value, name: &str) -> bool {
    match context {
        Value::Object(obj) => obj.has(name),
        _ => false,
    }
}
