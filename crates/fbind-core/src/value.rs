#![forbid(unsafe_code)]

//! Dynamic values flowing through the object graph.
//!
//! [`Value`] is the unit that expressions evaluate to and that observers
//! report. Reference variants ([`ObjectRef`], [`ArrayRef`], [`MapRef`],
//! [`SetRef`], [`FunctionRef`]) are shared handles compared by identity;
//! everything else is compared by value.
//!
//! The conversion helpers mirror the abstract operations of the scripting
//! model the binding expressions are written in: truthiness, `ToNumber`,
//! `ToString`, strict and loose equality, and `SameValueZero` for collection
//! keys.
//!
//! # Invariants
//!
//! 1. `strict_eq` is identity for reference variants; `NaN` is never strictly
//!    equal to itself, `+0` and `-0` are.
//! 2. `same_value_zero` differs from `strict_eq` only in treating `NaN` as
//!    equal to `NaN`.
//! 3. Reading a property of a nullish value yields `Undefined`; it never
//!    panics.

use std::fmt;
use std::rc::{Rc, Weak};

use crate::collection::array::{ArrayRef, MAX_LENGTH, WeakArrayRef};
use crate::collection::map::{MapRef, WeakMapRef};
use crate::collection::set::{SetRef, WeakSetRef};
use crate::object::{ObjectRef, WeakObjectRef};

// ---------------------------------------------------------------------------
// FunctionRef
// ---------------------------------------------------------------------------

/// Signature of native functions: `this` followed by the arguments.
pub type NativeFn = dyn Fn(&Value, &[Value]) -> Value;

/// A callable value: a native closure receiving `this` and the arguments.
#[derive(Clone)]
pub struct FunctionRef(Rc<NativeFn>);

impl FunctionRef {
    /// Wrap a closure as a callable value.
    pub fn new(f: impl Fn(&Value, &[Value]) -> Value + 'static) -> Self {
        Self(Rc::new(f))
    }

    /// Invoke the function with `this` bound to `this_arg`.
    pub fn call(&self, this_arg: &Value, args: &[Value]) -> Value {
        (self.0)(this_arg, args)
    }

    /// Identity comparison.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn downgrade(&self) -> Weak<NativeFn> {
        Rc::downgrade(&self.0)
    }
}

impl fmt::Debug for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FunctionRef(..)")
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A dynamically typed value.
#[derive(Clone, Default)]
pub enum Value {
    /// Absence of a value; also the result of every failed lookup.
    #[default]
    Undefined,
    /// Explicit null.
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Object(ObjectRef),
    Array(ArrayRef),
    Map(MapRef),
    Set(SetRef),
    Function(FunctionRef),
}

impl Value {
    /// Create a function value from a closure.
    pub fn function(f: impl Fn(&Value, &[Value]) -> Value + 'static) -> Self {
        Self::Function(FunctionRef::new(f))
    }

    /// `undefined` or `null`.
    #[must_use]
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// Anything that is not a shared reference.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Self::Undefined | Self::Null | Self::Bool(_) | Self::Number(_) | Self::String(_)
        )
    }

    /// Arrays, maps and sets.
    #[must_use]
    pub fn is_collection(&self) -> bool {
        matches!(self, Self::Array(_) | Self::Map(_) | Self::Set(_))
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&MapRef> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_set(&self) -> Option<&SetRef> {
        match self {
            Self::Set(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_function(&self) -> Option<&FunctionRef> {
        match self {
            Self::Function(f) => Some(f),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Truthiness as used by `!`, `&&`, `||` and `?:`.
    #[must_use]
    pub fn truthy(&self) -> bool {
        match self {
            Self::Undefined | Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0 && !n.is_nan(),
            Self::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Numeric conversion (`ToNumber`).
    #[must_use]
    pub fn to_number(&self) -> f64 {
        match self {
            Self::Undefined => f64::NAN,
            Self::Null => 0.0,
            Self::Bool(b) => f64::from(u8::from(*b)),
            Self::Number(n) => *n,
            Self::String(s) => parse_number(s),
            Self::Array(_) => parse_number(&self.to_display_string()),
            Self::Object(_) | Self::Map(_) | Self::Set(_) | Self::Function(_) => f64::NAN,
        }
    }

    /// String conversion (`ToString`).
    #[must_use]
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Undefined => "undefined".to_owned(),
            Self::Null => "null".to_owned(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::String(s) => s.to_string(),
            Self::Object(_) => "[object Object]".to_owned(),
            Self::Array(a) => a.join(","),
            Self::Map(_) => "[object Map]".to_owned(),
            Self::Set(_) => "[object Set]".to_owned(),
            Self::Function(_) => "function () { [native code] }".to_owned(),
        }
    }

    /// Property key form of this value.
    #[must_use]
    pub fn to_property_key(&self) -> Rc<str> {
        match self {
            Self::String(s) => Rc::clone(s),
            other => Rc::from(other.to_display_string()),
        }
    }

    /// `typeof` result.
    #[must_use]
    pub fn type_of(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Function(_) => "function",
            Self::Null | Self::Object(_) | Self::Array(_) | Self::Map(_) | Self::Set(_) => "object",
        }
    }

    /// Strict equality (`===`).
    #[must_use]
    pub fn strict_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Undefined, Self::Undefined) | (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            (Self::Array(a), Self::Array(b)) => a.ptr_eq(b),
            (Self::Map(a), Self::Map(b)) => a.ptr_eq(b),
            (Self::Set(a), Self::Set(b)) => a.ptr_eq(b),
            (Self::Function(a), Self::Function(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// `SameValueZero`: strict equality except that `NaN` equals `NaN`.
    #[must_use]
    pub fn same_value_zero(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) if a.is_nan() && b.is_nan() => true,
            _ => self.strict_eq(other),
        }
    }

    /// Loose equality (`==`).
    #[must_use]
    pub fn loose_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (a, b) if a.is_nullish() && b.is_nullish() => true,
            (a, b) if a.is_nullish() || b.is_nullish() => false,
            (Self::Number(_), Self::String(_)) | (Self::String(_), Self::Number(_)) => {
                self.to_number() == other.to_number()
            }
            (Self::Bool(_), _) => Self::Number(self.to_number()).loose_eq(other),
            (_, Self::Bool(_)) => self.loose_eq(&Self::Number(other.to_number())),
            (a, b) if a.is_primitive() != b.is_primitive() => {
                a.to_display_string() == b.to_display_string()
            }
            _ => self.strict_eq(other),
        }
    }

    /// Read a named property (`value.name`).
    ///
    /// Objects resolve through their property table (recording the read for
    /// dependency collection). Arrays expose `length` and numeric indices,
    /// strings `length` and characters, maps and sets `size`.
    #[must_use]
    pub fn get_property(&self, name: &str) -> Value {
        match self {
            Self::Object(o) => o.get(name),
            Self::Array(a) => {
                if name == "length" {
                    Self::from(a.len())
                } else if let Some(index) = parse_index(name) {
                    a.get(index)
                } else {
                    Self::Undefined
                }
            }
            Self::String(s) => {
                if name == "length" {
                    Self::from(utf16_len(s))
                } else if let Some(index) = parse_index(name) {
                    char_at(s, index)
                } else {
                    Self::Undefined
                }
            }
            Self::Map(m) if name == "size" => Self::from(m.len()),
            Self::Set(s) if name == "size" => Self::from(s.len()),
            _ => Self::Undefined,
        }
    }

    /// Write a named property (`value.name = v`). Returns `false` when the
    /// target cannot hold properties.
    pub fn set_property(&self, name: &str, value: Value) -> bool {
        match self {
            Self::Object(o) => {
                o.set(name, value);
                true
            }
            Self::Array(a) => {
                if name == "length" {
                    match as_length(value.to_number()) {
                        Some(len) => a.set_len(len),
                        None => false,
                    }
                } else if let Some(index) = parse_index(name) {
                    a.set_index(index, value)
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    /// Keyed read (`value[key]`).
    #[must_use]
    pub fn get_keyed(&self, key: &Value) -> Value {
        if self.is_nullish() {
            return Self::Undefined;
        }
        match (self, key) {
            (Self::Array(a), Self::Number(n)) => match as_index(*n) {
                Some(index) => a.get(index),
                None => Self::Undefined,
            },
            _ => self.get_property(&key.to_property_key()),
        }
    }

    /// Keyed write (`value[key] = v`).
    pub fn set_keyed(&self, key: &Value, value: Value) -> bool {
        match (self, key) {
            (Self::Array(a), Self::Number(n)) => match as_index(*n) {
                Some(index) => a.set_index(index, value),
                None => false,
            },
            _ => self.set_property(&key.to_property_key(), value),
        }
    }

    /// Non-owning handle to this value.
    #[must_use]
    pub fn downgrade(&self) -> WeakValue {
        match self {
            Self::Object(o) => WeakValue::Object(o.downgrade()),
            Self::Array(a) => WeakValue::Array(a.downgrade()),
            Self::Map(m) => WeakValue::Map(m.downgrade()),
            Self::Set(s) => WeakValue::Set(s.downgrade()),
            Self::Function(f) => WeakValue::Function(f.downgrade()),
            primitive => WeakValue::Primitive(primitive.clone()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.strict_eq(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => f.write_str("undefined"),
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Object(o) => o.fmt(f),
            Self::Array(a) => a.fmt(f),
            Self::Map(m) => m.fmt(f),
            Self::Set(s) => s.fmt(f),
            Self::Function(func) => func.fmt(f),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

macro_rules! impl_from_number {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(n: $t) -> Self {
                    Self::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(f64, f32, i32, i64, u32, u64, usize, isize);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Self::String(s)
    }
}

impl From<ObjectRef> for Value {
    fn from(o: ObjectRef) -> Self {
        Self::Object(o)
    }
}

impl From<ArrayRef> for Value {
    fn from(a: ArrayRef) -> Self {
        Self::Array(a)
    }
}

impl From<MapRef> for Value {
    fn from(m: MapRef) -> Self {
        Self::Map(m)
    }
}

impl From<SetRef> for Value {
    fn from(s: SetRef) -> Self {
        Self::Set(s)
    }
}

impl From<FunctionRef> for Value {
    fn from(f: FunctionRef) -> Self {
        Self::Function(f)
    }
}

// ---------------------------------------------------------------------------
// WeakValue
// ---------------------------------------------------------------------------

/// Non-owning counterpart of [`Value`]. Primitives are held by value.
#[derive(Clone, Debug)]
pub enum WeakValue {
    Primitive(Value),
    Object(WeakObjectRef),
    Array(WeakArrayRef),
    Map(WeakMapRef),
    Set(WeakSetRef),
    Function(Weak<NativeFn>),
}

impl WeakValue {
    /// Recover the value if its referent is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<Value> {
        match self {
            Self::Primitive(v) => Some(v.clone()),
            Self::Object(o) => o.upgrade().map(Value::Object),
            Self::Array(a) => a.upgrade().map(Value::Array),
            Self::Map(m) => m.upgrade().map(Value::Map),
            Self::Set(s) => s.upgrade().map(Value::Set),
            Self::Function(f) => f.upgrade().map(|f| Value::Function(FunctionRef(f))),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Number of UTF-16 code units, the unit `length` is measured in.
#[must_use]
pub fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

fn char_at(s: &str, index: usize) -> Value {
    let units: Vec<u16> = s.encode_utf16().collect();
    match units.get(index) {
        Some(unit) => Value::from(String::from_utf16_lossy(&[*unit])),
        None => Value::Undefined,
    }
}

fn parse_index(name: &str) -> Option<usize> {
    if name.is_empty() || (name.len() > 1 && name.starts_with('0')) {
        return None;
    }
    name.parse().ok().filter(|&index| index < MAX_LENGTH)
}

fn as_index(n: f64) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0 && n < MAX_LENGTH as f64).then_some(n as usize)
}

/// Valid `length` assignment: a whole number no larger than [`MAX_LENGTH`].
#[must_use]
pub fn as_length(n: f64) -> Option<usize> {
    (n >= 0.0 && n.fract() == 0.0 && n <= MAX_LENGTH as f64).then_some(n as usize)
}

fn parse_number(s: &str) -> f64 {
    let s = s.trim();
    if s.is_empty() {
        return 0.0;
    }
    match s {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => {
            if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                return u64::from_str_radix(hex, 16).map_or(f64::NAN, |n| n as f64);
            }
            // Rust accepts "inf"/"nan" spellings that must stay NaN here.
            if s.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
                return f64::NAN;
            }
            s.parse().unwrap_or(f64::NAN)
        }
    }
}

/// Format a number the way `ToString` does for the common cases.
#[must_use]
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_owned()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_owned()
    } else if n == 0.0 {
        "0".to_owned()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_matches_script_rules() {
        assert!(!Value::Undefined.truthy());
        assert!(!Value::Null.truthy());
        assert!(!Value::from(0).truthy());
        assert!(!Value::Number(f64::NAN).truthy());
        assert!(!Value::from("").truthy());
        assert!(Value::from("0").truthy());
        assert!(Value::from(ObjectRef::new()).truthy());
        assert!(Value::from(ArrayRef::new()).truthy());
    }

    #[test]
    fn strict_equality_is_identity_for_references() {
        let a = ObjectRef::new();
        let b = ObjectRef::new();
        assert!(Value::from(a.clone()).strict_eq(&Value::from(a)));
        assert!(!Value::from(b).strict_eq(&Value::from(ObjectRef::new())));
        assert!(!Value::Number(f64::NAN).strict_eq(&Value::Number(f64::NAN)));
        assert!(Value::Number(f64::NAN).same_value_zero(&Value::Number(f64::NAN)));
        assert!(Value::Number(0.0).strict_eq(&Value::Number(-0.0)));
    }

    #[test]
    fn loose_equality_coerces() {
        assert!(Value::Null.loose_eq(&Value::Undefined));
        assert!(Value::from(1).loose_eq(&Value::from("1")));
        assert!(Value::from(true).loose_eq(&Value::from(1)));
        assert!(!Value::Null.loose_eq(&Value::from(0)));
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn number_parsing() {
        assert_eq!(Value::from(" 12 ").to_number(), 12.0);
        assert_eq!(Value::from("").to_number(), 0.0);
        assert_eq!(Value::from("0x10").to_number(), 16.0);
        assert!(Value::from("inf").to_number().is_nan());
        assert!(Value::from("abc").to_number().is_nan());
        assert_eq!(Value::from("1e3").to_number(), 1000.0);
    }

    #[test]
    fn string_properties() {
        let s = Value::from("héllo");
        assert_eq!(s.get_property("length"), Value::from(5));
        assert_eq!(s.get_property("1"), Value::from("é"));
        assert_eq!(s.get_property("foo"), Value::Undefined);
    }

    #[test]
    fn array_properties_and_keyed_access() {
        let arr = ArrayRef::from_values([Value::from(1), Value::from(2)]);
        let v = Value::from(arr.clone());
        assert_eq!(v.get_property("length"), Value::from(2));
        assert_eq!(v.get_keyed(&Value::from(1)), Value::from(2));
        assert_eq!(v.get_keyed(&Value::from("0")), Value::from(1));
        assert_eq!(v.get_keyed(&Value::from(5)), Value::Undefined);
        assert!(v.set_keyed(&Value::from(0), Value::from(9)));
        assert_eq!(arr.get(0), Value::from(9));
    }

    #[test]
    fn nullish_keyed_access_is_undefined() {
        assert_eq!(Value::Null.get_keyed(&Value::from("x")), Value::Undefined);
        assert_eq!(Value::Undefined.get_property("x"), Value::Undefined);
    }

    #[test]
    fn array_display_joins_items() {
        let arr = ArrayRef::from_values([Value::from(1), Value::Null, Value::from("a")]);
        assert_eq!(Value::from(arr).to_display_string(), "1,,a");
    }

    #[test]
    fn weak_value_upgrade() {
        let obj = ObjectRef::new();
        let weak = Value::from(obj.clone()).downgrade();
        assert!(weak.upgrade().is_some());
        drop(obj);
        assert!(weak.upgrade().is_none());
        let prim = Value::from(3).downgrade();
        assert_eq!(prim.upgrade(), Some(Value::from(3)));
    }

    #[test]
    fn type_of_names() {
        assert_eq!(Value::Null.type_of(), "object");
        assert_eq!(Value::function(|_, _| Value::Undefined).type_of(), "function");
        assert_eq!(Value::from(1).type_of(), "number");
    }
}
