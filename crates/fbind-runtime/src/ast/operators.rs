#![forbid(unsafe_code)]

//! Binary and unary operators with script value semantics.

use std::cmp::Ordering;
use std::fmt;

use fbind_core::{Value, dependency};

/// Binary operators. `&&` and `||` short-circuit and are handled by the
/// caller; everything else goes through [`BinaryOp::apply`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    StrictEq,
    NotEq,
    StrictNotEq,
    In,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Gt,
    Le,
    Ge,
    BitXor,
}

impl BinaryOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::And => "&&",
            Self::Or => "||",
            Self::Eq => "==",
            Self::StrictEq => "===",
            Self::NotEq => "!=",
            Self::StrictNotEq => "!==",
            Self::In => "in",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::BitXor => "^",
        }
    }

    /// Look an operator up by its symbol.
    #[must_use]
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "&&" => Self::And,
            "||" => Self::Or,
            "==" => Self::Eq,
            "===" => Self::StrictEq,
            "!=" => Self::NotEq,
            "!==" => Self::StrictNotEq,
            "in" => Self::In,
            "+" => Self::Add,
            "-" => Self::Sub,
            "*" => Self::Mul,
            "/" => Self::Div,
            "%" => Self::Rem,
            "<" => Self::Lt,
            ">" => Self::Gt,
            "<=" => Self::Le,
            ">=" => Self::Ge,
            "^" => Self::BitXor,
            _ => return None,
        })
    }

    /// Apply a non-short-circuiting operator to two evaluated operands.
    #[must_use]
    pub fn apply(self, left: &Value, right: &Value) -> Value {
        match self {
            Self::And => {
                if left.truthy() {
                    right.clone()
                } else {
                    left.clone()
                }
            }
            Self::Or => {
                if left.truthy() {
                    left.clone()
                } else {
                    right.clone()
                }
            }
            Self::Eq => Value::from(left.loose_eq(right)),
            Self::StrictEq => Value::from(left.strict_eq(right)),
            Self::NotEq => Value::from(!left.loose_eq(right)),
            Self::StrictNotEq => Value::from(!left.strict_eq(right)),
            Self::In => Value::from(has_key(right, left)),
            _ if left.is_nullish() || right.is_nullish() => nullish_arithmetic(self, left, right),
            Self::Add => add(left, right),
            Self::Sub => Value::from(left.to_number() - right.to_number()),
            Self::Mul => Value::from(left.to_number() * right.to_number()),
            Self::Div => Value::from(left.to_number() / right.to_number()),
            Self::Rem => Value::from(left.to_number() % right.to_number()),
            Self::Lt => Value::from(compare(left, right) == Some(Ordering::Less)),
            Self::Gt => Value::from(compare(left, right) == Some(Ordering::Greater)),
            Self::Le => Value::from(matches!(
                compare(left, right),
                Some(Ordering::Less | Ordering::Equal)
            )),
            Self::Ge => Value::from(matches!(
                compare(left, right),
                Some(Ordering::Greater | Ordering::Equal)
            )),
            Self::BitXor => Value::from(to_int32(left.to_number()) ^ to_int32(right.to_number())),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Unary prefix operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Negate,
    Plus,
    TypeOf,
    Void,
}

impl UnaryOp {
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Not => "!",
            Self::Negate => "-",
            Self::Plus => "+",
            Self::TypeOf => "typeof ",
            Self::Void => "void ",
        }
    }

    #[must_use]
    pub fn apply(self, operand: &Value) -> Value {
        match self {
            Self::Not => Value::from(!operand.truthy()),
            Self::Negate => Value::from(-operand.to_number()),
            Self::Plus => Value::from(operand.to_number()),
            Self::TypeOf => Value::from(operand.type_of()),
            Self::Void => Value::Undefined,
        }
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Arithmetic with a missing operand: `+` and `-` treat the missing side as
/// absent, everything else yields `null`.
fn nullish_arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Value {
    match op {
        BinaryOp::Add if !left.is_nullish() => left.clone(),
        BinaryOp::Add if !right.is_nullish() => right.clone(),
        BinaryOp::Sub if !left.is_nullish() => left.clone(),
        BinaryOp::Sub if !right.is_nullish() => Value::from(0.0 - right.to_number()),
        BinaryOp::Add | BinaryOp::Sub => Value::from(0),
        _ => Value::Null,
    }
}

fn add(left: &Value, right: &Value) -> Value {
    let concatenates = |v: &Value| matches!(v, Value::String(_)) || !v.is_primitive();
    if concatenates(left) || concatenates(right) {
        let text = dependency::untracked(|| {
            let mut text = left.to_display_string();
            text.push_str(&right.to_display_string());
            text
        });
        Value::from(text)
    } else {
        Value::from(left.to_number() + right.to_number())
    }
}

fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Some(a.encode_utf16().cmp(b.encode_utf16())),
        _ => left.to_number().partial_cmp(&right.to_number()),
    }
}

fn has_key(container: &Value, key: &Value) -> bool {
    let name = key.to_property_key();
    match container {
        Value::Object(object) => object.has(&name),
        Value::Array(array) => {
            &*name == "length"
                || name
                    .parse::<usize>()
                    .is_ok_and(|index| index < array.len_untracked())
        }
        Value::Map(_) | Value::Set(_) => &*name == "size",
        _ => false,
    }
}

/// `ToInt32`: wrap a number into the signed 32-bit range.
fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let wrapped = n.trunc().rem_euclid(4_294_967_296.0);
    (wrapped as u32) as i32
}
