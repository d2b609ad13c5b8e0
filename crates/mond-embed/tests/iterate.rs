//! Iteration helper tests: generic and indexed loops, early stop, and
//! error propagation from iterators and step closures.

use std::cell::RefCell;
use std::rc::Rc;

use mond_core::{Key, Table, Value};
use mond_embed::{for_index, for_pairs, install, push_pairs, IterOutcome, IterStep};
use mond_vm::Vm;

fn bridge_vm() -> Vm {
    let mut vm = Vm::new();
    install(&mut vm);
    vm
}

fn sample_table(pairs: &[(i64, &str)]) -> Value {
    let mut t = Table::new();
    for (k, v) in pairs {
        t.set(Key::Int(*k), Value::str(*v));
    }
    Value::table(t)
}

#[test]
fn generic_loop_stops_after_first_pair_on_request() {
    let mut vm = bridge_vm();
    let t = sample_table(&[(1, "a"), (2, "b")]);
    vm.push(t);
    push_pairs(&mut vm, -1);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = seen.clone();
    for_pairs(
        &mut vm,
        IterStep::new(move |vm| {
            s.borrow_mut().push((vm.value(4), vm.value(5)));
            IterOutcome::Stop
        }),
    )
    .unwrap();

    let seen = seen.borrow();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], (Value::Integer(1), Value::str("a")));
}

#[test]
fn generic_loop_visits_every_pair_then_ends_cleanly() {
    let mut vm = bridge_vm();
    let t = sample_table(&[(1, "a"), (2, "b"), (3, "c")]);
    vm.push(t);
    push_pairs(&mut vm, -1);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = seen.clone();
    for_pairs(
        &mut vm,
        IterStep::new(move |vm| {
            s.borrow_mut().push((vm.value(4), vm.value(5)));
            IterOutcome::Continue
        }),
    )
    .unwrap();

    assert_eq!(
        &*seen.borrow(),
        &[
            (Value::Integer(1), Value::str("a")),
            (Value::Integer(2), Value::str("b")),
            (Value::Integer(3), Value::str("c")),
        ]
    );
}

#[test]
fn step_may_replace_the_control_key_to_skip_ahead() {
    let mut vm = bridge_vm();
    let t = sample_table(&[(1, "a"), (2, "b"), (3, "c"), (4, "d")]);
    vm.push(t);
    push_pairs(&mut vm, -1);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = seen.clone();
    for_pairs(
        &mut vm,
        IterStep::new(move |vm| {
            s.borrow_mut().push(vm.value(5));
            // jump the traversal forward past key 3
            if vm.value(4) == Value::Integer(1) {
                vm.set_value(4, Value::Integer(3));
            }
            IterOutcome::Continue
        }),
    )
    .unwrap();

    assert_eq!(&*seen.borrow(), &[Value::str("a"), Value::str("d")]);
}

#[test]
fn malformed_iterator_state_raises_through_the_loop() {
    let mut vm = bridge_vm();
    // the default iterator over a number: the in-loop call raises
    vm.push(Value::Integer(5));
    push_pairs(&mut vm, -1);

    let err = for_pairs(&mut vm, IterStep::new(|_vm| IterOutcome::Continue)).unwrap_err();
    assert!(err.to_string().contains("attempt to iterate a number value"));
}

#[test]
fn non_callable_iterator_raises_through_the_loop() {
    let mut vm = bridge_vm();
    vm.push(Value::str("not a function")); // iterator
    vm.push(Value::Nil); // state
    vm.push(Value::Nil); // initial key

    let err = for_pairs(&mut vm, IterStep::new(|_vm| IterOutcome::Continue)).unwrap_err();
    assert!(err.to_string().contains("attempt to call a string value"));
}

#[test]
fn step_error_propagates_with_its_value() {
    let mut vm = bridge_vm();
    let t = sample_table(&[(1, "a"), (2, "b")]);
    vm.push(t);
    push_pairs(&mut vm, -1);

    let err = for_pairs(
        &mut vm,
        IterStep::new(|vm| {
            vm.push(Value::str("step refused"));
            IterOutcome::Error
        }),
    )
    .unwrap_err();
    assert_eq!(err.value(), Some(&Value::str("step refused")));
}

#[test]
fn indexed_loop_visits_indices_in_order_and_stops_at_gap() {
    let mut vm = bridge_vm();
    let t = sample_table(&[(1, "x"), (2, "y"), (3, "z")]);
    vm.push(t);
    vm.push(Value::Integer(1));

    let seen = Rc::new(RefCell::new(Vec::new()));
    let s = seen.clone();
    for_index(
        &mut vm,
        IterStep::new(move |vm| {
            s.borrow_mut().push((vm.value(4), vm.value(5)));
            IterOutcome::Continue
        }),
    )
    .unwrap();

    assert_eq!(
        &*seen.borrow(),
        &[
            (Value::Integer(1), Value::str("x")),
            (Value::Integer(2), Value::str("y")),
            (Value::Integer(3), Value::str("z")),
        ]
    );
}

#[test]
fn indexed_loop_early_stop() {
    let mut vm = bridge_vm();
    let t = sample_table(&[(1, "x"), (2, "y"), (3, "z")]);
    vm.push(t);
    vm.push(Value::Integer(1));

    let count = Rc::new(RefCell::new(0));
    let c = count.clone();
    for_index(
        &mut vm,
        IterStep::new(move |_vm| {
            *c.borrow_mut() += 1;
            IterOutcome::Stop
        }),
    )
    .unwrap();
    assert_eq!(*count.borrow(), 1);
}

#[test]
fn indexed_loop_over_non_indexable_raises() {
    let mut vm = bridge_vm();
    vm.push(Value::Boolean(true));
    vm.push(Value::Integer(1));

    let err = for_index(&mut vm, IterStep::new(|_vm| IterOutcome::Continue)).unwrap_err();
    assert!(err.to_string().contains("attempt to index a boolean value"));
}
