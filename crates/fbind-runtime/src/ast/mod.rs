#![forbid(unsafe_code)]

//! Expression trees.
//!
//! [`Expression`] is a closed sum type; every operation is one exhaustive
//! `match`. Trees are immutable and shared through `Rc`, so one parsed
//! expression can back any number of bindings.
//!
//! Five operations are defined on every node:
//!
//! - [`Expression::evaluate`] computes the value against a [`Scope`].
//!   Missing intermediate objects yield `undefined` instead of failing.
//! - [`Expression::assign`] writes through assignable nodes, creating empty
//!   objects for missing intermediates.
//! - [`Expression::connect`] re-evaluates just enough of the tree to subscribe
//!   a [`Binding`] to everything it read. `&&`, `||` and `?:` connect only the
//!   branch evaluation took.
//! - [`Expression::bind`] / [`Expression::unbind`] run per-binding hooks for
//!   binding behaviors and signal-aware value converters.
//!
//! # Example
//!
//! ```
//! use fbind_core::{object, Value};
//! use fbind_runtime::ast::Expression;
//! use fbind_runtime::{BindingFlags, Resources, Scope};
//!
//! let scope = Scope::new(Value::from(object! { "foo" => object! { "bar" => 42 } }));
//! let resources = Resources::new();
//! let expr = Expression::scope("foo").member("bar");
//!
//! let value = expr.evaluate(&scope, &resources, BindingFlags::empty()).unwrap();
//! assert_eq!(value, Value::from(42));
//! ```

mod builtins;
pub mod operators;

use std::fmt;
use std::rc::Rc;

use fbind_core::{ArrayRef, FunctionRef, ObjectRef, Value};

pub use operators::{BinaryOp, UnaryOp};

use crate::binding::Binding;
use crate::error::{EvaluateError, EvaluateResult};
use crate::flags::BindingFlags;
use crate::resources::Resources;
use crate::scope::Scope;

/// An expression node.
#[derive(Clone, Debug)]
pub enum Expression {
    /// `expression & name:arg1:arg2`
    BindingBehavior {
        expression: Box<Expression>,
        name: Rc<str>,
        args: Vec<Expression>,
    },
    /// `expression | name:arg1:arg2`
    ValueConverter {
        expression: Box<Expression>,
        name: Rc<str>,
        args: Vec<Expression>,
    },
    /// `target = value`
    Assign {
        target: Box<Expression>,
        value: Box<Expression>,
    },
    /// `condition ? yes : no`
    Conditional {
        condition: Box<Expression>,
        yes: Box<Expression>,
        no: Box<Expression>,
    },
    /// `$this`, `$parent`, `$parent.$parent`, ...
    AccessThis { ancestor: usize },
    /// A bare name, optionally prefixed by `$parent.` links.
    AccessScope { name: Rc<str>, ancestor: usize },
    /// `object.name`
    AccessMember {
        object: Box<Expression>,
        name: Rc<str>,
    },
    /// `object[key]`
    AccessKeyed {
        object: Box<Expression>,
        key: Box<Expression>,
    },
    /// `name(args)` resolved against the scope.
    CallScope {
        name: Rc<str>,
        args: Vec<Expression>,
        ancestor: usize,
    },
    /// `object.name(args)`
    CallMember {
        object: Box<Expression>,
        name: Rc<str>,
        args: Vec<Expression>,
    },
    /// `func(args)` where `func` is any expression.
    CallFunction {
        func: Box<Expression>,
        args: Vec<Expression>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    PrimitiveLiteral(Value),
    ArrayLiteral(Vec<Expression>),
    ObjectLiteral(Vec<(Rc<str>, Expression)>),
    /// `` `cooked[0]${expressions[0]}cooked[1]...` ``
    Template {
        cooked: Vec<Rc<str>>,
        expressions: Vec<Expression>,
    },
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl Expression {
    /// `$this`
    #[must_use]
    pub fn this() -> Self {
        Self::AccessThis { ancestor: 0 }
    }

    /// `$parent` repeated `ancestor` times.
    #[must_use]
    pub fn parent(ancestor: usize) -> Self {
        Self::AccessThis { ancestor }
    }

    #[must_use]
    pub fn scope(name: &str) -> Self {
        Self::scope_at(name, 0)
    }

    #[must_use]
    pub fn scope_at(name: &str, ancestor: usize) -> Self {
        Self::AccessScope {
            name: Rc::from(name),
            ancestor,
        }
    }

    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::PrimitiveLiteral(value.into())
    }

    #[must_use]
    pub fn call_scope(name: &str, args: Vec<Expression>) -> Self {
        Self::CallScope {
            name: Rc::from(name),
            args,
            ancestor: 0,
        }
    }

    #[must_use]
    pub fn binary(op: BinaryOp, left: Expression, right: Expression) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[must_use]
    pub fn unary(op: UnaryOp, operand: Expression) -> Self {
        Self::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    #[must_use]
    pub fn conditional(condition: Expression, yes: Expression, no: Expression) -> Self {
        Self::Conditional {
            condition: Box::new(condition),
            yes: Box::new(yes),
            no: Box::new(no),
        }
    }

    #[must_use]
    pub fn assignment(target: Expression, value: Expression) -> Self {
        Self::Assign {
            target: Box::new(target),
            value: Box::new(value),
        }
    }

    #[must_use]
    pub fn array(items: Vec<Expression>) -> Self {
        Self::ArrayLiteral(items)
    }

    #[must_use]
    pub fn object<K: Into<Rc<str>>>(entries: impl IntoIterator<Item = (K, Expression)>) -> Self {
        Self::ObjectLiteral(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Template literal. `cooked` holds one more string than `expressions`;
    /// missing trailing strings are treated as empty.
    #[must_use]
    pub fn template(cooked: Vec<&str>, expressions: Vec<Expression>) -> Self {
        Self::Template {
            cooked: cooked.into_iter().map(Rc::from).collect(),
            expressions,
        }
    }

    /// `self.name`
    #[must_use]
    pub fn member(self, name: &str) -> Self {
        Self::AccessMember {
            object: Box::new(self),
            name: Rc::from(name),
        }
    }

    /// `self[key]`
    #[must_use]
    pub fn keyed(self, key: Expression) -> Self {
        Self::AccessKeyed {
            object: Box::new(self),
            key: Box::new(key),
        }
    }

    /// `self.name(args)`
    #[must_use]
    pub fn call(self, name: &str, args: Vec<Expression>) -> Self {
        Self::CallMember {
            object: Box::new(self),
            name: Rc::from(name),
            args,
        }
    }

    /// `self(args)`
    #[must_use]
    pub fn invoke(self, args: Vec<Expression>) -> Self {
        Self::CallFunction {
            func: Box::new(self),
            args,
        }
    }

    /// `self | name:args`
    #[must_use]
    pub fn converted(self, name: &str, args: Vec<Expression>) -> Self {
        Self::ValueConverter {
            expression: Box::new(self),
            name: Rc::from(name),
            args,
        }
    }

    /// `self & name:args`
    #[must_use]
    pub fn with_behavior(self, name: &str, args: Vec<Expression>) -> Self {
        Self::BindingBehavior {
            expression: Box::new(self),
            name: Rc::from(name),
            args,
        }
    }

    /// Whether [`Expression::assign`] can succeed on this node.
    #[must_use]
    pub fn is_assignable(&self) -> bool {
        match self {
            Self::AccessScope { .. }
            | Self::AccessMember { .. }
            | Self::AccessKeyed { .. }
            | Self::Assign { .. } => true,
            Self::ValueConverter { expression, .. } | Self::BindingBehavior { expression, .. } => {
                expression.is_assignable()
            }
            Self::Conditional { yes, no, .. } => yes.is_assignable() && no.is_assignable(),
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// A resolved call target.
enum Callable {
    Builtin(builtins::Builtin),
    Function(FunctionRef),
}

impl Callable {
    fn call(&self, this_arg: &Value, args: &[Value]) -> Value {
        match self {
            Self::Builtin(f) => f(this_arg, args),
            Self::Function(f) => f.call(this_arg, args),
        }
    }
}

/// Resolve `receiver.name` as something callable.
///
/// A missing receiver or function is `None` unless `MUST_EVALUATE` is set;
/// a present non-function is always an error.
fn resolve_function(
    receiver: &Value,
    name: &str,
    flags: BindingFlags,
) -> EvaluateResult<Option<Callable>> {
    if let Some(builtin) = builtins::method(receiver, name) {
        return Ok(Some(Callable::Builtin(builtin)));
    }
    let func = if receiver.is_nullish() {
        Value::Undefined
    } else {
        receiver.get_property(name)
    };
    match func {
        Value::Function(f) => Ok(Some(Callable::Function(f))),
        f if f.is_nullish() && !flags.contains(BindingFlags::MUST_EVALUATE) => Ok(None),
        _ => Err(EvaluateError::NotAFunction(name.to_owned())),
    }
}

fn is_container(value: &Value) -> bool {
    matches!(
        value,
        Value::Object(_) | Value::Array(_) | Value::Map(_) | Value::Set(_)
    )
}

impl Expression {
    /// Compute this expression's value.
    pub fn evaluate(
        &self,
        scope: &Scope,
        resources: &Resources,
        flags: BindingFlags,
    ) -> EvaluateResult<Value> {
        match self {
            Self::BindingBehavior { expression, .. } => {
                expression.evaluate(scope, resources, flags)
            }
            Self::ValueConverter {
                expression,
                name,
                args,
            } => {
                let converter = resources
                    .value_converter(name)
                    .ok_or_else(|| EvaluateError::UnknownValueConverter(name.to_string()))?;
                let input = expression.evaluate(scope, resources, flags)?;
                let args = evaluate_list(args, scope, resources, flags)?;
                Ok(converter.to_view(input, &args))
            }
            Self::Assign { target, value } => {
                let value = value.evaluate(scope, resources, flags)?;
                target.assign(scope, value, resources, flags)
            }
            Self::Conditional { condition, yes, no } => {
                if condition.evaluate(scope, resources, flags)?.truthy() {
                    yes.evaluate(scope, resources, flags)
                } else {
                    no.evaluate(scope, resources, flags)
                }
            }
            Self::AccessThis { ancestor } => Ok(scope.ancestor_context(*ancestor)),
            Self::AccessScope { name, ancestor } => {
                Ok(scope.context_for(name, *ancestor).get_property(name))
            }
            Self::AccessMember { object, name } => {
                let instance = object.evaluate(scope, resources, flags)?;
                if instance.is_nullish() {
                    Ok(instance)
                } else {
                    Ok(instance.get_property(name))
                }
            }
            Self::AccessKeyed { object, key } => {
                let instance = object.evaluate(scope, resources, flags)?;
                let key = key.evaluate(scope, resources, flags)?;
                Ok(instance.get_keyed(&key))
            }
            Self::CallScope {
                name,
                args,
                ancestor,
            } => {
                let args = evaluate_list(args, scope, resources, flags)?;
                let context = scope.context_for(name, *ancestor);
                let func = resolve_function(&context, name, flags)?;
                Ok(func.map_or(Value::Undefined, |f| f.call(&context, &args)))
            }
            Self::CallMember { object, name, args } => {
                let instance = object.evaluate(scope, resources, flags)?;
                let args = evaluate_list(args, scope, resources, flags)?;
                let func = resolve_function(&instance, name, flags)?;
                Ok(func.map_or(Value::Undefined, |f| f.call(&instance, &args)))
            }
            Self::CallFunction { func, args } => {
                let callee = func.evaluate(scope, resources, flags)?;
                match callee {
                    Value::Function(f) => {
                        let args = evaluate_list(args, scope, resources, flags)?;
                        Ok(f.call(&Value::Undefined, &args))
                    }
                    v if v.is_nullish() && !flags.contains(BindingFlags::MUST_EVALUATE) => {
                        Ok(Value::Undefined)
                    }
                    _ => Err(EvaluateError::NotAFunction(func.to_string())),
                }
            }
            Self::Binary { op, left, right } => {
                let left = left.evaluate(scope, resources, flags)?;
                match op {
                    BinaryOp::And if !left.truthy() => Ok(left),
                    BinaryOp::Or if left.truthy() => Ok(left),
                    BinaryOp::And | BinaryOp::Or => right.evaluate(scope, resources, flags),
                    _ => {
                        let right = right.evaluate(scope, resources, flags)?;
                        Ok(op.apply(&left, &right))
                    }
                }
            }
            Self::Unary { op, operand } => {
                Ok(op.apply(&operand.evaluate(scope, resources, flags)?))
            }
            Self::PrimitiveLiteral(value) => Ok(value.clone()),
            Self::ArrayLiteral(items) => {
                let items = evaluate_list(items, scope, resources, flags)?;
                Ok(Value::from(ArrayRef::from_values(items)))
            }
            Self::ObjectLiteral(entries) => {
                let mut values = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    values.push((Rc::clone(key), value.evaluate(scope, resources, flags)?));
                }
                Ok(Value::from(ObjectRef::from_entries(values)))
            }
            Self::Template {
                cooked,
                expressions,
            } => {
                let mut text = cooked.first().map(|s| s.to_string()).unwrap_or_default();
                for (i, expression) in expressions.iter().enumerate() {
                    let value = expression.evaluate(scope, resources, flags)?;
                    text.push_str(&value.to_display_string());
                    if let Some(part) = cooked.get(i + 1) {
                        text.push_str(part);
                    }
                }
                Ok(Value::from(text))
            }
        }
    }

    /// Write `value` through this expression and return it.
    pub fn assign(
        &self,
        scope: &Scope,
        value: Value,
        resources: &Resources,
        flags: BindingFlags,
    ) -> EvaluateResult<Value> {
        match self {
            Self::BindingBehavior { expression, .. } => {
                expression.assign(scope, value, resources, flags)
            }
            Self::ValueConverter {
                expression,
                name,
                args,
            } => {
                let converter = resources
                    .value_converter(name)
                    .ok_or_else(|| EvaluateError::UnknownValueConverter(name.to_string()))?;
                let args = evaluate_list(args, scope, resources, flags)?;
                let value = converter.from_view(value, &args);
                expression.assign(scope, value, resources, flags)
            }
            Self::Assign { target, value: source } => {
                source.assign(scope, value.clone(), resources, flags)?;
                target.assign(scope, value, resources, flags)
            }
            Self::Conditional { condition, yes, no } => {
                if condition.evaluate(scope, resources, flags)?.truthy() {
                    yes.assign(scope, value, resources, flags)
                } else {
                    no.assign(scope, value, resources, flags)
                }
            }
            Self::AccessScope { name, ancestor } => {
                let context = scope.context_for(name, *ancestor);
                context.set_property(name, value.clone());
                Ok(value)
            }
            Self::AccessMember { object, name } => {
                let instance = self.vivify(object, scope, resources, flags)?;
                instance.set_property(name, value.clone());
                Ok(value)
            }
            Self::AccessKeyed { object, key } => {
                let instance = self.vivify(object, scope, resources, flags)?;
                let key = key.evaluate(scope, resources, flags)?;
                instance.set_keyed(&key, value.clone());
                Ok(value)
            }
            _ => Err(EvaluateError::NotAssignable(self.to_string())),
        }
    }

    /// Evaluate `object`, replacing a missing or primitive value with a
    /// fresh empty object written back through `object`.
    fn vivify(
        &self,
        object: &Expression,
        scope: &Scope,
        resources: &Resources,
        flags: BindingFlags,
    ) -> EvaluateResult<Value> {
        let instance = object.evaluate(scope, resources, flags)?;
        if is_container(&instance) {
            return Ok(instance);
        }
        let created = Value::from(ObjectRef::new());
        object.assign(scope, created.clone(), resources, flags)?;
        Ok(created)
    }

    // -----------------------------------------------------------------------
    // Dependency discovery
    // -----------------------------------------------------------------------

    /// Subscribe `binding` to everything this expression reads.
    pub fn connect(&self, binding: &Binding, scope: &Scope, flags: BindingFlags) -> EvaluateResult<()> {
        let resources = binding.resources();
        match self {
            Self::BindingBehavior { expression, .. } => expression.connect(binding, scope, flags),
            Self::ValueConverter {
                expression, args, ..
            } => {
                expression.connect(binding, scope, flags)?;
                connect_list(args, binding, scope, flags)?;
                let input = expression.evaluate(scope, resources, flags)?;
                if input.is_collection() {
                    binding.observe_collection(&input);
                }
                Ok(())
            }
            Self::Assign { value, .. } => value.connect(binding, scope, flags),
            Self::Conditional { condition, yes, no } => {
                condition.connect(binding, scope, flags)?;
                if condition.evaluate(scope, resources, flags)?.truthy() {
                    yes.connect(binding, scope, flags)
                } else {
                    no.connect(binding, scope, flags)
                }
            }
            Self::AccessThis { .. } | Self::PrimitiveLiteral(_) => Ok(()),
            Self::AccessScope { name, ancestor } => {
                let context = scope.context_for(name, *ancestor);
                if !context.is_nullish() {
                    binding.observe_property(&context, name);
                }
                Ok(())
            }
            Self::AccessMember { object, name } => {
                object.connect(binding, scope, flags)?;
                let instance = object.evaluate(scope, resources, flags)?;
                if !instance.is_nullish() {
                    binding.observe_property(&instance, name);
                }
                Ok(())
            }
            Self::AccessKeyed { object, key } => {
                object.connect(binding, scope, flags)?;
                let instance = object.evaluate(scope, resources, flags)?;
                if !is_container(&instance) {
                    return Ok(());
                }
                key.connect(binding, scope, flags)?;
                let key = key.evaluate(scope, resources, flags)?;
                match (&instance, &key) {
                    (Value::Array(_), Value::Number(_)) => binding.observe_collection(&instance),
                    _ if !key.is_nullish() => {
                        binding.observe_property(&instance, &key.to_property_key());
                    }
                    _ => {}
                }
                Ok(())
            }
            Self::CallScope { args, .. } => connect_list(args, binding, scope, flags),
            Self::CallMember { object, name, args } => {
                object.connect(binding, scope, flags)?;
                let instance = object.evaluate(scope, resources, flags)?;
                if matches!(resolve_function(&instance, name, BindingFlags::empty()), Ok(Some(_))) {
                    connect_list(args, binding, scope, flags)?;
                }
                if instance.is_collection() {
                    binding.observe_collection(&instance);
                }
                Ok(())
            }
            Self::CallFunction { func, args } => {
                func.connect(binding, scope, flags)?;
                if matches!(func.evaluate(scope, resources, flags)?, Value::Function(_)) {
                    connect_list(args, binding, scope, flags)?;
                }
                Ok(())
            }
            Self::Binary { op, left, right } => {
                left.connect(binding, scope, flags)?;
                let left = left.evaluate(scope, resources, flags)?;
                let short_circuits = match op {
                    BinaryOp::And => !left.truthy(),
                    BinaryOp::Or => left.truthy(),
                    _ => false,
                };
                if short_circuits {
                    return Ok(());
                }
                right.connect(binding, scope, flags)
            }
            Self::Unary { operand, .. } => operand.connect(binding, scope, flags),
            Self::ArrayLiteral(items) => connect_list(items, binding, scope, flags),
            Self::ObjectLiteral(entries) => {
                for (_, value) in entries {
                    value.connect(binding, scope, flags)?;
                }
                Ok(())
            }
            Self::Template { expressions, .. } => connect_list(expressions, binding, scope, flags),
        }
    }

    // -----------------------------------------------------------------------
    // Per-binding hooks
    // -----------------------------------------------------------------------

    /// Attach behaviors and converter signals found anywhere in this tree.
    pub fn bind(&self, binding: &Binding, scope: &Scope, flags: BindingFlags) -> EvaluateResult<()> {
        match self {
            Self::BindingBehavior {
                expression,
                name,
                args,
            } => {
                expression.bind(binding, scope, flags)?;
                let resources = binding.resources();
                let behavior = resources
                    .binding_behavior(name)
                    .ok_or_else(|| EvaluateError::UnknownBindingBehavior(name.to_string()))?;
                if !binding.record_behavior(name) {
                    return Err(EvaluateError::DuplicateBindingBehavior(name.to_string()));
                }
                let args = evaluate_list(args, scope, resources, flags)?;
                behavior.bind(binding, scope, &args)
            }
            Self::ValueConverter {
                expression,
                name,
                args,
            } => {
                expression.bind(binding, scope, flags)?;
                for arg in args {
                    arg.bind(binding, scope, flags)?;
                }
                let resources = binding.resources();
                let converter = resources
                    .value_converter(name)
                    .ok_or_else(|| EvaluateError::UnknownValueConverter(name.to_string()))?;
                for signal in converter.signals() {
                    resources
                        .signaler()
                        .add_signal_listener(&signal, binding.subscriber_handle());
                }
                Ok(())
            }
            _ => {
                let mut result = Ok(());
                self.for_each_child(&mut |child| {
                    if result.is_ok() {
                        result = child.bind(binding, scope, flags);
                    }
                });
                result
            }
        }
    }

    /// Undo [`Expression::bind`].
    pub fn unbind(&self, binding: &Binding, scope: &Scope, flags: BindingFlags) {
        match self {
            Self::BindingBehavior {
                expression, name, ..
            } => {
                if binding.forget_behavior(name) {
                    if let Some(behavior) = binding.resources().binding_behavior(name) {
                        behavior.unbind(binding, scope);
                    }
                }
                expression.unbind(binding, scope, flags);
            }
            Self::ValueConverter {
                expression,
                name,
                args,
            } => {
                let resources = binding.resources();
                if let Some(converter) = resources.value_converter(name) {
                    for signal in converter.signals() {
                        resources
                            .signaler()
                            .remove_signal_listener(&signal, &binding.subscriber_handle());
                    }
                }
                expression.unbind(binding, scope, flags);
                for arg in args {
                    arg.unbind(binding, scope, flags);
                }
            }
            _ => self.for_each_child(&mut |child| child.unbind(binding, scope, flags)),
        }
    }

    fn for_each_child(&self, f: &mut dyn FnMut(&Expression)) {
        match self {
            Self::BindingBehavior {
                expression, args, ..
            }
            | Self::ValueConverter {
                expression, args, ..
            } => {
                f(expression);
                args.iter().for_each(f);
            }
            Self::Assign { target, value } => {
                f(target);
                f(value);
            }
            Self::Conditional { condition, yes, no } => {
                f(condition);
                f(yes);
                f(no);
            }
            Self::AccessThis { .. } | Self::AccessScope { .. } | Self::PrimitiveLiteral(_) => {}
            Self::AccessMember { object, .. } => f(object),
            Self::AccessKeyed { object, key } => {
                f(object);
                f(key);
            }
            Self::CallScope { args, .. } | Self::ArrayLiteral(args) => args.iter().for_each(f),
            Self::CallMember { object, args, .. } => {
                f(object);
                args.iter().for_each(f);
            }
            Self::CallFunction { func, args } => {
                f(func);
                args.iter().for_each(f);
            }
            Self::Binary { left, right, .. } => {
                f(left);
                f(right);
            }
            Self::Unary { operand, .. } => f(operand),
            Self::ObjectLiteral(entries) => entries.iter().for_each(|(_, v)| f(v)),
            Self::Template { expressions, .. } => expressions.iter().for_each(f),
        }
    }
}

fn evaluate_list(
    list: &[Expression],
    scope: &Scope,
    resources: &Resources,
    flags: BindingFlags,
) -> EvaluateResult<Vec<Value>> {
    list.iter()
        .map(|e| e.evaluate(scope, resources, flags))
        .collect()
}

fn connect_list(
    list: &[Expression],
    binding: &Binding,
    scope: &Scope,
    flags: BindingFlags,
) -> EvaluateResult<()> {
    for expression in list {
        expression.connect(binding, scope, flags)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

fn write_args(f: &mut fmt::Formatter<'_>, args: &[Expression]) -> fmt::Result {
    f.write_str("(")?;
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{arg}")?;
    }
    f.write_str(")")
}

fn write_ancestors(f: &mut fmt::Formatter<'_>, ancestor: usize) -> fmt::Result {
    for _ in 0..ancestor {
        f.write_str("$parent.")?;
    }
    Ok(())
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BindingBehavior {
                expression,
                name,
                args,
            } => {
                write!(f, "{expression} & {name}")?;
                args.iter().try_for_each(|a| write!(f, ":{a}"))
            }
            Self::ValueConverter {
                expression,
                name,
                args,
            } => {
                write!(f, "{expression} | {name}")?;
                args.iter().try_for_each(|a| write!(f, ":{a}"))
            }
            Self::Assign { target, value } => write!(f, "{target}={value}"),
            Self::Conditional { condition, yes, no } => write!(f, "({condition}?{yes}:{no})"),
            Self::AccessThis { ancestor: 0 } => f.write_str("$this"),
            Self::AccessThis { ancestor } => {
                f.write_str("$parent")?;
                for _ in 1..*ancestor {
                    f.write_str(".$parent")?;
                }
                Ok(())
            }
            Self::AccessScope { name, ancestor } => {
                write_ancestors(f, *ancestor)?;
                f.write_str(name)
            }
            Self::AccessMember { object, name } => write!(f, "{object}.{name}"),
            Self::AccessKeyed { object, key } => write!(f, "{object}[{key}]"),
            Self::CallScope {
                name,
                args,
                ancestor,
            } => {
                write_ancestors(f, *ancestor)?;
                f.write_str(name)?;
                write_args(f, args)
            }
            Self::CallMember { object, name, args } => {
                write!(f, "{object}.{name}")?;
                write_args(f, args)
            }
            Self::CallFunction { func, args } => {
                write!(f, "{func}")?;
                write_args(f, args)
            }
            Self::Binary { op, left, right } => write!(f, "({left} {op} {right})"),
            Self::Unary { op, operand } => write!(f, "{op}{operand}"),
            Self::PrimitiveLiteral(Value::String(s)) => write!(f, "'{}'", s.replace('\'', "\\'")),
            Self::PrimitiveLiteral(value) => write!(f, "{value}"),
            Self::ArrayLiteral(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::ObjectLiteral(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "'{key}':{value}")?;
                }
                f.write_str("}")
            }
            Self::Template {
                cooked,
                expressions,
            } => {
                f.write_str("`")?;
                if let Some(first) = cooked.first() {
                    f.write_str(first)?;
                }
                for (i, expression) in expressions.iter().enumerate() {
                    write!(f, "${{{expression}}}")?;
                    if let Some(part) = cooked.get(i + 1) {
                        f.write_str(part)?;
                    }
                }
                f.write_str("`")
            }
        }
    }
}
