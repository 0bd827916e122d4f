#![forbid(unsafe_code)]

//! Methods callable on strings and collections from expressions.
//!
//! Receivers of these kinds carry no property table of their own, so calls
//! such as `items.join(', ')` or `name.toUpperCase()` resolve here. Mutating
//! methods go through the observable mutators.

use fbind_core::collection::array::normalize_splice;
use fbind_core::value::utf16_len;
use fbind_core::{ArrayRef, Value};

/// A built-in method: receiver and arguments in, result out.
pub(crate) type Builtin = fn(&Value, &[Value]) -> Value;

/// The built-in `name` for `receiver`, if there is one.
pub(crate) fn method(receiver: &Value, name: &str) -> Option<Builtin> {
    match receiver {
        Value::String(_) => string_method(name),
        Value::Array(_) => array_method(name),
        Value::Map(_) => map_method(name),
        Value::Set(_) => set_method(name),
        _ => None,
    }
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn string_method(name: &str) -> Option<Builtin> {
    let f: Builtin = match name {
        "toUpperCase" => |s, _| with_str(s, |s| Value::from(s.to_uppercase())),
        "toLowerCase" => |s, _| with_str(s, |s| Value::from(s.to_lowercase())),
        "trim" => |s, _| with_str(s, |s| Value::from(s.trim())),
        "includes" => |s, args| {
            let needle = arg(args, 0).to_display_string();
            with_str(s, |s| Value::from(s.contains(needle.as_str())))
        },
        "startsWith" => |s, args| {
            let needle = arg(args, 0).to_display_string();
            with_str(s, |s| Value::from(s.starts_with(needle.as_str())))
        },
        "endsWith" => |s, args| {
            let needle = arg(args, 0).to_display_string();
            with_str(s, |s| Value::from(s.ends_with(needle.as_str())))
        },
        "indexOf" => |s, args| {
            let needle = arg(args, 0).to_display_string();
            with_str(s, |s| match s.find(needle.as_str()) {
                Some(byte) => Value::from(utf16_len(&s[..byte])),
                None => Value::from(-1),
            })
        },
        _ => return None,
    };
    Some(f)
}

fn with_str(receiver: &Value, f: impl FnOnce(&str) -> Value) -> Value {
    match receiver {
        Value::String(s) => f(s),
        _ => Value::Undefined,
    }
}

fn array_method(name: &str) -> Option<Builtin> {
    let f: Builtin = match name {
        "join" => |a, args| {
            with_array(a, |a| {
                let separator = match arg(args, 0) {
                    Value::Undefined => ",".to_owned(),
                    other => other.to_display_string(),
                };
                Value::from(a.join(&separator))
            })
        },
        "indexOf" => |a, args| {
            with_array(a, |a| match a.index_of(&arg(args, 0)) {
                Some(index) => Value::from(index),
                None => Value::from(-1),
            })
        },
        "includes" => |a, args| with_array(a, |a| Value::from(a.includes(&arg(args, 0)))),
        "slice" => |a, args| {
            with_array(a, |a| {
                let items = a.to_vec();
                let len = items.len();
                let start = relative_index(&arg(args, 0), len, 0);
                let end = relative_index(&arg(args, 1), len, len);
                let slice = if start < end { items[start..end].to_vec() } else { Vec::new() };
                Value::from(ArrayRef::from_values(slice))
            })
        },
        "push" => |a, args| with_array(a, |a| Value::from(a.push(args.iter().cloned()))),
        "pop" => |a, _| with_array(a, ArrayRef::pop),
        "shift" => |a, _| with_array(a, ArrayRef::shift),
        "unshift" => |a, args| with_array(a, |a| Value::from(a.unshift(args.iter().cloned()))),
        "splice" => |a, args| {
            with_array(a, |a| {
                let start = arg(args, 0).to_number() as isize;
                let delete_count = (args.len() > 1).then(|| arg(args, 1).to_number() as isize);
                let items = args.iter().skip(2).cloned().collect();
                Value::from(ArrayRef::from_values(a.splice(start, delete_count, items)))
            })
        },
        "reverse" => |a, _| {
            with_array(a, |array| {
                array.reverse();
                Value::Array(array.clone())
            })
        },
        _ => return None,
    };
    Some(f)
}

fn with_array(receiver: &Value, f: impl FnOnce(&ArrayRef) -> Value) -> Value {
    match receiver {
        Value::Array(a) => f(a),
        _ => Value::Undefined,
    }
}

/// Resolve a `slice`-style relative index against `len`.
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if value.is_undefined() {
        return default;
    }
    let n = value.to_number();
    if n.is_nan() {
        return 0;
    }
    let (start, _) = normalize_splice(len, n as isize, Some(0));
    start
}

fn map_method(name: &str) -> Option<Builtin> {
    let f: Builtin = match name {
        "get" => |m, args| match m {
            Value::Map(map) => map.get(&arg(args, 0)),
            _ => Value::Undefined,
        },
        "has" => |m, args| match m {
            Value::Map(map) => Value::from(map.has(&arg(args, 0))),
            _ => Value::Undefined,
        },
        "set" => |m, args| match m {
            Value::Map(map) => {
                map.set(arg(args, 0), arg(args, 1));
                m.clone()
            }
            _ => Value::Undefined,
        },
        "delete" => |m, args| match m {
            Value::Map(map) => Value::from(map.delete(&arg(args, 0))),
            _ => Value::Undefined,
        },
        "clear" => |m, _| {
            if let Value::Map(map) = m {
                map.clear();
            }
            Value::Undefined
        },
        _ => return None,
    };
    Some(f)
}

fn set_method(name: &str) -> Option<Builtin> {
    let f: Builtin = match name {
        "has" => |s, args| match s {
            Value::Set(set) => Value::from(set.has(&arg(args, 0))),
            _ => Value::Undefined,
        },
        "add" => |s, args| match s {
            Value::Set(set) => {
                set.add(arg(args, 0));
                s.clone()
            }
            _ => Value::Undefined,
        },
        "delete" => |s, args| match s {
            Value::Set(set) => Value::from(set.delete(&arg(args, 0))),
            _ => Value::Undefined,
        },
        "clear" => |s, _| {
            if let Value::Set(set) = s {
                set.clear();
            }
            Value::Undefined
        },
        _ => return None,
    };
    Some(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fbind_core::{MapRef, SetRef};

    fn call(receiver: &Value, name: &str, args: &[Value]) -> Value {
        let f = method(receiver, name).unwrap();
        f(receiver, args)
    }

    fn nums(values: &[i32]) -> Value {
        Value::from(ArrayRef::from_values(values.iter().map(|&n| Value::from(n))))
    }

    #[test]
    fn string_methods() {
        let s = Value::from("  Hello ");
        assert_eq!(call(&s, "trim", &[]), Value::from("Hello"));
        assert_eq!(call(&s, "toUpperCase", &[]), Value::from("  HELLO "));
        assert_eq!(call(&s, "indexOf", &[Value::from("l")]), Value::from(4));
        assert_eq!(call(&s, "includes", &[Value::from("ell")]), Value::from(true));
        assert!(method(&s, "nope").is_none());
    }

    #[test]
    fn array_methods() {
        let a = nums(&[1, 2, 3, 4]);
        assert_eq!(call(&a, "join", &[]), Value::from("1,2,3,4"));
        assert_eq!(call(&a, "join", &[Value::from("-")]), Value::from("1-2-3-4"));
        assert_eq!(call(&a, "indexOf", &[Value::from(3)]), Value::from(2));
        assert_eq!(call(&a, "indexOf", &[Value::from(9)]), Value::from(-1));
        let slice = call(&a, "slice", &[Value::from(1), Value::from(-1)]);
        assert_eq!(call(&slice, "join", &[]), Value::from("2,3"));

        assert_eq!(call(&a, "push", &[Value::from(5)]), Value::from(5));
        let removed = call(&a, "splice", &[Value::from(0), Value::from(2)]);
        assert_eq!(call(&removed, "join", &[]), Value::from("1,2"));
        assert_eq!(call(&a, "pop", &[]), Value::from(5));
        call(&a, "reverse", &[]);
        assert_eq!(call(&a, "join", &[]), Value::from("4,3"));
    }

    #[test]
    fn map_and_set_methods() {
        let m = Value::from(MapRef::new());
        call(&m, "set", &[Value::from("k"), Value::from(1)]);
        assert_eq!(call(&m, "get", &[Value::from("k")]), Value::from(1));
        assert_eq!(call(&m, "delete", &[Value::from("k")]), Value::from(true));
        assert_eq!(call(&m, "has", &[Value::from("k")]), Value::from(false));

        let s = Value::from(SetRef::new());
        call(&s, "add", &[Value::from(1)]);
        assert_eq!(call(&s, "has", &[Value::from(1)]), Value::from(true));
        call(&s, "clear", &[]);
        assert_eq!(call(&s, "has", &[Value::from(1)]), Value::from(false));
    }
}
