#![forbid(unsafe_code)]

//! Observable object graph for FrankenBind.
//!
//! Everything the binding runtime reads or writes lives in this crate:
//!
//! - [`Value`]: the dynamic value type with JavaScript-style abstract
//!   operations (truthiness, number/string conversion, equality flavours).
//! - [`ObjectRef`]: a shared property table with data, accessor and
//!   intercepted slots, an optional prototype, and a hidden observer cache.
//! - [`ArrayRef`], [`MapRef`], [`SetRef`]: observable collections whose
//!   mutators report [`ChangeRecord`]s to an attached [`MutationHook`].
//! - [`instrumentation`]: the per-kind switch for collection reporting.
//! - [`dependency`]: the recorder stack computed properties use to discover
//!   what they read.
//!
//! # Example
//!
//! ```
//! use fbind_core::{object, ArrayRef, Value};
//!
//! let todo = object! { "title" => "write docs", "done" => false };
//! let list = ArrayRef::from_values([Value::from(todo.clone())]);
//!
//! assert_eq!(list.len(), 1);
//! assert_eq!(todo.get("title"), Value::from("write docs"));
//! ```

pub mod collection;
pub mod dependency;
pub mod instrumentation;
pub mod object;
pub mod value;

pub use collection::array::WeakArrayRef;
pub use collection::map::WeakMapRef;
pub use collection::set::WeakSetRef;
pub use collection::{ArrayRef, ChangeRecord, MapRef, MutationHook, SetRef};
pub use dependency::DependencyRecorder;
pub use instrumentation::CollectionKinds;
pub use object::{
    Getter, ObjectRef, Property, PropertyAttributes, PropertyInterceptor, PropertyKind, Setter,
    WeakObjectRef,
};
pub use value::{FunctionRef, Value, WeakValue};
