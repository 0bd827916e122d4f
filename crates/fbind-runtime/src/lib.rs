#![forbid(unsafe_code)]

//! Binding runtime for FrankenBind.
//!
//! Connects expression trees to properties of the `fbind-core` object graph
//! and keeps both sides in sync:
//!
//! - [`ast::Expression`]: evaluate, assign and dependency discovery over a
//!   [`Scope`].
//! - [`observation`]: one observer per observed property or collection,
//!   handed out by the [`ObserverLocator`].
//! - [`Binding`]: the per-property state machine, with [`BindingMode`]s for
//!   each propagation direction.
//! - [`TaskQueue`]: the microtask/macrotask scheduler that batches
//!   notifications.
//! - [`Signaler`] and [`Resources`]: named refresh signals, value converters
//!   and binding behaviors.
//! - [`Engine`]: wires all of the above from an [`EngineConfig`].
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use fbind_core::{object, Value};
//! use fbind_runtime::ast::Expression;
//! use fbind_runtime::{BindingFlags, BindingMode, Engine, Scope};
//!
//! let engine = Engine::default();
//! let vm = object! { "user" => object! { "name" => "Ada" } };
//! let label = object! {};
//!
//! let binding = engine.create_binding(
//!     Rc::new(Expression::scope("user").member("name")),
//!     Value::from(label.clone()),
//!     "text",
//!     BindingMode::ToView,
//! );
//! binding.bind(BindingFlags::CONNECT_IMMEDIATE, &Scope::new(Value::from(vm.clone()))).unwrap();
//! assert_eq!(label.get("text"), Value::from("Ada"));
//!
//! vm.get("user").set_property("name", Value::from("Grace"));
//! engine.pump().unwrap();
//! assert_eq!(label.get("text"), Value::from("Grace"));
//! ```

pub mod ast;
pub mod binding;
pub mod config;
pub mod engine;
pub mod error;
pub mod flags;
pub mod observation;
pub mod parser;
pub mod resources;
pub mod scope;
pub mod signals;
pub mod task_queue;

pub use binding::{Binding, BindingMode, BindingSet, ConnectQueue};
pub use config::{ConnectQueueConfig, EngineConfig};
pub use engine::Engine;
pub use error::{BindingError, BindingResult, EvaluateError, EvaluateResult, ParseError, TaskError};
#[cfg(feature = "policy-config")]
pub use error::ConfigError;
pub use flags::BindingFlags;
pub use observation::{ObserverLocator, PropertyObserver, Subscriber};
pub use parser::{ExpressionCache, ExpressionParser};
pub use resources::{BindingBehavior, Resources, ValueConverter};
pub use scope::{OverrideContext, Scope};
pub use signals::Signaler;
pub use task_queue::{Task, TaskFn, TaskQueue};
