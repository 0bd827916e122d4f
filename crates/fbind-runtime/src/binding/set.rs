#![forbid(unsafe_code)]

//! Owner-side holder for a group of bindings.
//!
//! A view keeps its bindings in a [`BindingSet`], binds them together
//! against one scope, and gets them all unbound when the set is dropped.
//!
//! ```ignore
//! let mut set = BindingSet::new();
//! set.hold(engine.create_binding(expr, target, "value", BindingMode::ToView));
//! set.bind_all(BindingFlags::empty(), &scope)?;
//! // ... every binding unbinds when `set` goes out of scope.
//! ```

use std::rc::Rc;

use super::Binding;
use crate::error::BindingResult;
use crate::flags::BindingFlags;
use crate::scope::Scope;

#[derive(Default)]
pub struct BindingSet {
    bindings: Vec<Rc<Binding>>,
}

impl BindingSet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Add a binding. It is unbound when the set is cleared or dropped.
    pub fn hold(&mut self, binding: Rc<Binding>) -> &mut Self {
        self.bindings.push(binding);
        self
    }

    /// Bind every held binding to `scope`, stopping at the first failure.
    pub fn bind_all(&self, flags: BindingFlags, scope: &Scope) -> BindingResult<()> {
        for binding in &self.bindings {
            binding.bind(flags, scope)?;
        }
        Ok(())
    }

    pub fn unbind_all(&self, flags: BindingFlags) {
        for binding in &self.bindings {
            binding.unbind(flags);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<Binding>> {
        self.bindings.iter()
    }

    /// Unbind and release every binding; the set stays usable.
    pub fn clear(&mut self) {
        self.unbind_all(BindingFlags::FROM_UNBIND);
        self.bindings.clear();
    }
}

impl Drop for BindingSet {
    fn drop(&mut self) {
        self.unbind_all(BindingFlags::FROM_UNBIND);
    }
}

impl std::fmt::Debug for BindingSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingSet")
            .field("binding_count", &self.bindings.len())
            .finish()
    }
}
