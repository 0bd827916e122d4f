//! End-to-end binding scenarios driven through the engine.

use std::cell::Cell;
use std::rc::Rc;

use fbind_core::{ArrayRef, ObjectRef, Property, PropertyAttributes, Value, object};
use fbind_runtime::ast::{BinaryOp, Expression};
use fbind_runtime::{BindingFlags, BindingMode, BindingSet, Engine, Scope};
use web_time::{Duration, Instant};

/// A target whose `value` property counts writes.
fn counting_target() -> (ObjectRef, Rc<Cell<usize>>) {
    let writes = Rc::new(Cell::new(0));
    let stored = Rc::new(std::cell::RefCell::new(Value::Undefined));
    let target = object! {};
    let (get_store, set_store, counter) = (Rc::clone(&stored), stored, Rc::clone(&writes));
    target.define_property(
        "value",
        Property::accessor(
            Some(Rc::new(move |_: &ObjectRef| get_store.borrow().clone())),
            Some(Rc::new(move |_: &ObjectRef, value: Value| {
                counter.set(counter.get() + 1);
                *set_store.borrow_mut() = value;
            })),
        ),
    );
    (target, writes)
}

fn bind(
    engine: &Engine,
    expression: Expression,
    target: &ObjectRef,
    mode: BindingMode,
    vm: &ObjectRef,
) -> Rc<fbind_runtime::Binding> {
    let binding = engine.create_binding(
        Rc::new(expression),
        Value::from(target.clone()),
        "value",
        mode,
    );
    binding
        .bind(
            BindingFlags::CONNECT_IMMEDIATE,
            &Scope::new(Value::from(vm.clone())),
        )
        .unwrap();
    binding
}

#[test]
fn text_input_round_trip() {
    let engine = Engine::default();
    let vm = object! { "form" => object! { "email" => "ada@example.com" } };
    let input = object! { "value" => "" };
    let _binding = bind(
        &engine,
        Expression::scope("form").member("email"),
        &input,
        BindingMode::TwoWay,
        &vm,
    );
    engine.pump().unwrap();
    assert_eq!(input.get("value"), Value::from("ada@example.com"));

    // The user types.
    input.set("value", Value::from("grace@example.com"));
    engine.pump().unwrap();
    assert_eq!(
        vm.get("form").get_property("email"),
        Value::from("grace@example.com")
    );

    // The model changes.
    vm.get("form")
        .set_property("email", Value::from("hopper@example.com"));
    engine.pump().unwrap();
    assert_eq!(input.get("value"), Value::from("hopper@example.com"));
}

#[test]
fn several_writes_in_one_turn_update_the_target_once() {
    let engine = Engine::default();
    let vm = object! { "a" => 1, "b" => 2 };
    let (target, writes) = counting_target();
    let _binding = bind(
        &engine,
        Expression::binary(BinaryOp::Add, Expression::scope("a"), Expression::scope("b")),
        &target,
        BindingMode::ToView,
        &vm,
    );
    assert_eq!(writes.get(), 1);
    assert_eq!(target.get("value"), Value::from(3));

    vm.set("a", Value::from(10));
    vm.set("a", Value::from(20));
    vm.set("b", Value::from(30));
    engine.pump().unwrap();
    assert_eq!(target.get("value"), Value::from(50));
    assert_eq!(writes.get(), 2);

    // Writing the same values again changes nothing.
    vm.set("a", Value::from(20));
    engine.pump().unwrap();
    assert_eq!(writes.get(), 2);
}

#[test]
fn ternary_observes_only_the_taken_branch() {
    let engine = Engine::default();
    let vm = object! { "loggedIn" => false, "user" => "Ada", "guest" => "Guest" };
    let label = object! {};
    let binding = bind(
        &engine,
        Expression::conditional(
            Expression::scope("loggedIn"),
            Expression::scope("user"),
            Expression::scope("guest"),
        ),
        &label,
        BindingMode::ToView,
        &vm,
    );
    assert_eq!(label.get("value"), Value::from("Guest"));

    vm.set("user", Value::from("Grace"));
    engine.pump().unwrap();
    assert_eq!(label.get("value"), Value::from("Guest"));

    vm.set("loggedIn", Value::from(true));
    engine.pump().unwrap();
    assert_eq!(label.get("value"), Value::from("Grace"));
    assert_eq!(binding.observed_count(), 2);

    vm.set("guest", Value::from("Visitor"));
    vm.set("user", Value::from("Ada"));
    engine.pump().unwrap();
    assert_eq!(label.get("value"), Value::from("Ada"));
}

#[test]
fn collection_methods_track_item_mutations() {
    let engine = Engine::default();
    let items = ArrayRef::from_values([Value::from("a"), Value::from("b")]);
    let vm = object! { "items" => items.clone() };
    let label = object! {};
    let _binding = bind(
        &engine,
        Expression::scope("items").call("join", vec![Expression::literal(", ")]),
        &label,
        BindingMode::ToView,
        &vm,
    );
    assert_eq!(label.get("value"), Value::from("a, b"));

    items.push([Value::from("c")]);
    engine.pump().unwrap();
    assert_eq!(label.get("value"), Value::from("a, b, c"));

    items.reverse();
    engine.pump().unwrap();
    assert_eq!(label.get("value"), Value::from("c, b, a"));
}

#[test]
fn keyed_array_access_follows_the_array() {
    let engine = Engine::default();
    let items = ArrayRef::from_values([Value::from("first"), Value::from("second")]);
    let vm = object! { "items" => items.clone() };
    let label = object! {};
    let _binding = bind(
        &engine,
        Expression::scope("items").keyed(Expression::literal(0)),
        &label,
        BindingMode::ToView,
        &vm,
    );
    items.shift();
    engine.pump().unwrap();
    assert_eq!(label.get("value"), Value::from("second"));

    vm.set(
        "items",
        Value::from(ArrayRef::from_values([Value::from("replaced")])),
    );
    engine.pump().unwrap();
    assert_eq!(label.get("value"), Value::from("replaced"));
}

#[test]
fn getter_properties_are_computed() {
    let engine = Engine::default();
    let vm = object! { "first" => "Ada", "last" => "Lovelace" };
    vm.define_property(
        "fullName",
        Property::getter(|this| {
            let first = this.get("first").to_display_string();
            let last = this.get("last").to_display_string();
            Value::from(format!("{first} {last}"))
        }),
    );
    let label = object! {};
    let _binding = bind(
        &engine,
        Expression::scope("fullName"),
        &label,
        BindingMode::ToView,
        &vm,
    );
    assert_eq!(label.get("value"), Value::from("Ada Lovelace"));

    vm.set("first", Value::from("Grace"));
    vm.set("last", Value::from("Hopper"));
    engine.pump().unwrap();
    assert_eq!(label.get("value"), Value::from("Grace Hopper"));
}

#[test]
fn frozen_properties_fall_back_to_dirty_checking() {
    let engine = Engine::new(
        fbind_runtime::EngineConfig::default().with_dirty_check_interval_ms(50),
    );
    let vm = object! {};
    vm.define_property(
        "reading",
        Property::data(Value::from(20))
            .with_attributes(PropertyAttributes::WRITABLE | PropertyAttributes::ENUMERABLE),
    );
    let label = object! {};
    let _binding = bind(
        &engine,
        Expression::scope("reading"),
        &label,
        BindingMode::ToView,
        &vm,
    );
    assert_eq!(engine.dirty_checker().tracked_len(), 1);

    vm.set("reading", Value::from(21));
    engine.pump().unwrap();
    assert_eq!(label.get("value"), Value::from(20));

    engine
        .tick(Instant::now() + Duration::from_secs(1))
        .unwrap();
    assert_eq!(label.get("value"), Value::from(21));
}

#[test]
fn child_scopes_resolve_through_parents() {
    let engine = Engine::default();
    let parent = Scope::new(Value::from(object! { "title" => "Todos" }));
    let row = object! { "text" => "write docs" };
    let child = Scope::child(Value::from(row.clone()), &parent);
    child
        .override_context()
        .properties()
        .set("$index", Value::from(0));

    let label = object! {};
    let binding = engine.create_binding(
        Rc::new(Expression::template(
            vec!["", ". ", " (", ")"],
            vec![
                Expression::scope("$index"),
                Expression::scope("text"),
                Expression::scope("title"),
            ],
        )),
        Value::from(label.clone()),
        "value",
        BindingMode::ToView,
    );
    binding
        .bind(BindingFlags::CONNECT_IMMEDIATE, &child)
        .unwrap();
    assert_eq!(label.get("value"), Value::from("0. write docs (Todos)"));

    row.set("text", Value::from("ship it"));
    engine.pump().unwrap();
    assert_eq!(label.get("value"), Value::from("0. ship it (Todos)"));
}

#[test]
fn binding_set_releases_on_drop() {
    let engine = Engine::default();
    let vm = object! { "a" => 1 };
    let label = object! {};
    let binding = engine.create_binding(
        Rc::new(Expression::scope("a")),
        Value::from(label.clone()),
        "value",
        BindingMode::ToView,
    );
    {
        let mut set = BindingSet::new();
        set.hold(Rc::clone(&binding));
        set.bind_all(
            BindingFlags::CONNECT_IMMEDIATE,
            &Scope::new(Value::from(vm.clone())),
        )
        .unwrap();
    }
    vm.set("a", Value::from(2));
    engine.pump().unwrap();
    assert_eq!(label.get("value"), Value::from(1));
    assert!(!binding.is_bound());
}

#[test]
fn logging_does_not_change_behavior() {
    use tracing_subscriber::EnvFilter;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("trace"))
        .with_test_writer()
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        let engine = Engine::default();
        let vm = object! { "count" => 1 };
        let label = object! {};
        let _binding = bind(
            &engine,
            Expression::scope("count"),
            &label,
            BindingMode::ToView,
            &vm,
        );
        vm.set("count", Value::from(2));
        engine.pump().unwrap();
        assert_eq!(label.get("value"), Value::from(2));
    });
}
