//! Native iteration loops.
//!
//! The iterator call can raise a VM error (a malformed iterator, an
//! unindexable target), so the loop has to issue it as a plain call from
//! native code with no host frames above it expecting a normal return.
//! These loops are that native code; host logic only sees each produced
//! pair through a step closure.

use std::rc::Rc;

use mond_core::{HostError, Value};
use mond_vm::{Control, Invoke, Vm};

use crate::closure::min_uv_slots;
use crate::{names, protected_call, slot};

/// Verdict of a step closure for one produced pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterOutcome {
    /// Go around again with the control key left at its slot.
    Continue,
    /// Stop the loop cleanly.
    Stop,
    /// Raise the value the step left on top of the stack.
    Error,
}

/// Per-iteration host logic. Runs with the produced key and value at
/// frame slots 4 and 5 (generic form) or 4 and 5 with an integer key
/// (indexed form); may overwrite the key slot before continuing.
pub struct IterStep {
    run: Box<dyn Fn(&mut Vm) -> IterOutcome>,
}

impl IterStep {
    pub fn new(run: impl Fn(&mut Vm) -> IterOutcome + 'static) -> IterStep {
        IterStep { run: Box::new(run) }
    }
}

fn run_step(vm: &mut Vm, capsule_idx: i32) -> IterOutcome {
    let capsule = match vm.value(capsule_idx) {
        Value::Userdata(u) => u,
        v => panic!("iteration step capsule corrupted, found {}", v.type_name()),
    };
    let step = capsule
        .downcast_ref::<IterStep>()
        .expect("iteration capsule holds a foreign payload");
    (step.run)(vm)
}

/// Registered entry for the generic loop.
/// Frame: 1 = iterator, 2 = state, 3 = step capsule, 4 = control key.
pub(crate) fn for_pairs_entry(vm: &mut Vm, invoke: Invoke) -> Result<i32, Control> {
    debug_assert!(matches!(invoke, Invoke::Enter));
    loop {
        vm.set_top(4);
        vm.push_value(1);
        vm.insert(4);
        vm.push_value(2);
        vm.insert(5);
        // 4, 5, 6: iterator copy, state copy, key
        vm.call(2, 2)?; // k, v = iterator(state, k); may raise
        if vm.is_nil(4) {
            break;
        }
        match run_step(vm, 3) {
            IterOutcome::Continue => {} // next key already at 4
            IterOutcome::Stop => break,
            IterOutcome::Error => {
                let v = vm.pop();
                return Err(vm.raise(v));
            }
        }
    }
    Ok(0)
}

/// Registered entry for the integer-indexed loop.
/// Frame: 1 = target, 2 = start index, 3 = step capsule.
pub(crate) fn for_index_entry(vm: &mut Vm, invoke: Invoke) -> Result<i32, Control> {
    debug_assert!(matches!(invoke, Invoke::Enter));
    let mut i = match vm.value(2).as_integer() {
        Some(i) => i,
        None => return Err(vm.raise_msg("iteration start index must be an integer")),
    };
    loop {
        vm.set_top(3);
        vm.push(Value::Integer(i)); // 4
        vm.get_index(1, i)?; // 5; may raise on an unindexable target
        if vm.is_nil(5) {
            break;
        }
        match run_step(vm, 3) {
            IterOutcome::Continue => i += 1,
            IterOutcome::Stop => break,
            IterOutcome::Error => {
                let v = vm.pop();
                return Err(vm.raise(v));
            }
        }
    }
    Ok(0)
}

fn step_capsule(vm: &mut Vm, step: IterStep) -> Value {
    vm.new_userdata(Rc::new(step), min_uv_slots(vm.api()))
}

/// Generic iteration. Expects `[iterator, state, initial key]` on top of
/// the stack (consumed); invokes `step` for every produced pair until the
/// iterator returns a nil key, the step stops the loop, or an error is
/// raised.
pub fn for_pairs(vm: &mut Vm, step: IterStep) -> Result<(), HostError> {
    let capsule = step_capsule(vm, step);
    vm.push(capsule);
    vm.insert(-2); // [iterator, state, capsule, key]
    let entry = vm.make_native(slot(vm, names::FOR_PAIRS), Vec::new());
    vm.push(entry);
    vm.insert(-5);
    protected_call(vm, 4, 0)
}

/// Integer-indexed iteration. Expects `[target, start index]` on top of
/// the stack (consumed); fetches `target[i]` for i = start, start+1, ...
/// until a lookup produces nil.
pub fn for_index(vm: &mut Vm, step: IterStep) -> Result<(), HostError> {
    let capsule = step_capsule(vm, step);
    vm.push(capsule); // [target, start, capsule]
    let entry = vm.make_native(slot(vm, names::FOR_INDEX), Vec::new());
    vm.push(entry);
    vm.insert(-4);
    protected_call(vm, 3, 0)
}

/// Push the default traversal triple `[next, t, nil]` for the table at
/// `idx`, ready for [`for_pairs`].
pub fn push_pairs(vm: &mut Vm, idx: i32) {
    let t = vm.value(idx);
    let next = vm.make_native(slot(vm, names::NEXT), Vec::new());
    vm.push(next);
    vm.push(t);
    vm.push(Value::Nil);
}
