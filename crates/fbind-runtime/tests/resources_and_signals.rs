//! Value converters, binding behaviors and signals.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use fbind_core::{ArrayRef, Value, object};
use fbind_runtime::ast::Expression;
use fbind_runtime::{
    BindingError, BindingFlags, BindingMode, Engine, EvaluateError, Scope, ValueConverter,
};

/// Formats a number with the current currency symbol. Refreshed by the
/// `locale` signal.
struct Currency {
    symbol: Rc<RefCell<String>>,
}

impl ValueConverter for Currency {
    fn to_view(&self, value: Value, _args: &[Value]) -> Value {
        Value::from(format!("{}{}", self.symbol.borrow(), value.to_display_string()))
    }

    fn from_view(&self, value: Value, _args: &[Value]) -> Value {
        let text = value.to_display_string();
        let digits: String = text.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
        Value::from(digits.parse::<f64>().unwrap_or(f64::NAN))
    }

    fn signals(&self) -> Vec<Rc<str>> {
        vec![Rc::from("locale")]
    }
}

/// Item count of a collection.
struct Count;

impl ValueConverter for Count {
    fn to_view(&self, value: Value, _args: &[Value]) -> Value {
        match value {
            Value::Array(items) => Value::from(items.len()),
            _ => Value::from(0),
        }
    }
}

fn engine_with_currency() -> (Engine, Rc<RefCell<String>>) {
    let engine = Engine::default();
    let symbol = Rc::new(RefCell::new("$".to_owned()));
    engine.resources().register_converter(
        "currency",
        Rc::new(Currency {
            symbol: Rc::clone(&symbol),
        }),
    );
    (engine, symbol)
}

#[test]
fn converter_signals_refresh_bindings() {
    let (engine, symbol) = engine_with_currency();
    let vm = object! { "price" => 5 };
    let label = object! {};
    let binding = engine.create_binding(
        Rc::new(Expression::scope("price").converted("currency", vec![])),
        Value::from(label.clone()),
        "value",
        BindingMode::ToView,
    );
    binding
        .bind(BindingFlags::CONNECT_IMMEDIATE, &Scope::new(Value::from(vm.clone())))
        .unwrap();
    assert_eq!(label.get("value"), Value::from("$5"));
    assert_eq!(engine.resources().signaler().listener_count("locale"), 1);

    *symbol.borrow_mut() = "€".to_owned();
    engine.dispatch_signal("locale").unwrap();
    assert_eq!(label.get("value"), Value::from("€5"));

    binding.unbind(BindingFlags::empty());
    assert_eq!(engine.resources().signaler().listener_count("locale"), 0);
}

#[test]
fn converter_from_view_runs_before_assignment() {
    let (engine, _symbol) = engine_with_currency();
    let vm = object! { "price" => 5 };
    let input = object! { "value" => "" };
    let binding = engine.create_binding(
        Rc::new(Expression::scope("price").converted("currency", vec![])),
        Value::from(input.clone()),
        "value",
        BindingMode::TwoWay,
    );
    binding
        .bind(BindingFlags::CONNECT_IMMEDIATE, &Scope::new(Value::from(vm.clone())))
        .unwrap();
    engine.pump().unwrap();

    input.set("value", Value::from("$12.5"));
    engine.pump().unwrap();
    assert_eq!(vm.get("price"), Value::from(12.5));
    assert_eq!(input.get("value"), Value::from("$12.5"));
}

#[test]
fn converter_over_a_collection_tracks_its_items() {
    let engine = Engine::default();
    engine.resources().register_converter("count", Rc::new(Count));
    let items = ArrayRef::new();
    let vm = object! { "items" => items.clone() };
    let label = object! {};
    let binding = engine.create_binding(
        Rc::new(Expression::scope("items").converted("count", vec![])),
        Value::from(label.clone()),
        "value",
        BindingMode::ToView,
    );
    binding
        .bind(BindingFlags::CONNECT_IMMEDIATE, &Scope::new(Value::from(vm)))
        .unwrap();
    assert_eq!(label.get("value"), Value::from(0));

    items.push([Value::from(1), Value::from(2)]);
    engine.pump().unwrap();
    assert_eq!(label.get("value"), Value::from(2));
}

#[test]
fn signal_behavior_refreshes_untracked_reads() {
    let engine = Engine::default();
    let clock = Rc::new(Cell::new(1));
    let vm = object! {};
    let source = Rc::clone(&clock);
    vm.set("now", Value::function(move |_, _| Value::from(source.get())));
    let label = object! {};
    let binding = engine.create_binding(
        Rc::new(
            Expression::call_scope("now", vec![])
                .with_behavior("signal", vec![Expression::literal("tick")]),
        ),
        Value::from(label.clone()),
        "value",
        BindingMode::ToView,
    );
    binding
        .bind(BindingFlags::CONNECT_IMMEDIATE, &Scope::new(Value::from(vm)))
        .unwrap();
    assert_eq!(label.get("value"), Value::from(1));

    clock.set(2);
    engine.pump().unwrap();
    assert_eq!(label.get("value"), Value::from(1));

    engine.dispatch_signal("tick").unwrap();
    assert_eq!(label.get("value"), Value::from(2));

    binding.unbind(BindingFlags::empty());
    assert_eq!(engine.resources().signaler().listener_count("tick"), 0);
}

#[test]
fn unknown_converter_fails_bind() {
    let engine = Engine::default();
    let binding = engine.create_binding(
        Rc::new(Expression::scope("price").converted("currency", vec![])),
        Value::from(object! {}),
        "value",
        BindingMode::ToView,
    );
    let err = binding
        .bind(
            BindingFlags::CONNECT_IMMEDIATE,
            &Scope::new(Value::from(object! { "price" => 1 })),
        )
        .unwrap_err();
    assert_eq!(
        err,
        BindingError::Evaluate(EvaluateError::UnknownValueConverter("currency".to_owned()))
    );
    assert!(!binding.is_bound());
}

#[test]
fn mode_behaviors_change_direction() {
    let engine = Engine::default();
    let vm = object! { "name" => "Ada" };
    let input = object! { "value" => "typed" };
    let binding = engine.create_binding(
        Rc::new(Expression::scope("name").with_behavior("fromView", vec![])),
        Value::from(input.clone()),
        "value",
        BindingMode::TwoWay,
    );
    binding
        .bind(BindingFlags::CONNECT_IMMEDIATE, &Scope::new(Value::from(vm.clone())))
        .unwrap();
    assert_eq!(binding.mode(), BindingMode::FromView);
    assert_eq!(input.get("value"), Value::from("typed"));

    input.set("value", Value::from("Grace"));
    engine.pump().unwrap();
    assert_eq!(vm.get("name"), Value::from("Grace"));
}
