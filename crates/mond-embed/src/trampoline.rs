//! The dispatcher between host closures and the VM.
//!
//! This is the only place where a closure's `Outcome` turns into a VM
//! action, and in particular the only native frame that ever raises on a
//! closure's behalf: by the time the raise happens, every Rust frame of
//! the closure has already returned normally. Suspending outcomes park
//! the closure's capsule on the stack, directly below the pending
//! operation, and record its index as the continuation context; resuming
//! finds the capsule again purely from that depth.

use std::rc::Rc;

use mond_core::{Status, Userdata, Value};
use mond_vm::{Control, Invoke, Vm};

use crate::closure::HostClosure;
use crate::outcome::Outcome;
use crate::{names, slot};

/// Registered entry for calls into a host closure.
pub(crate) fn closure_entry(vm: &mut Vm, invoke: Invoke) -> Result<i32, Control> {
    debug_assert!(
        matches!(invoke, Invoke::Enter),
        "closure entry re-entered as a continuation"
    );
    let capsule = match vm.upvalue(1) {
        Value::Userdata(u) => u,
        v => panic!("closure capsule missing, found {}", v.type_name()),
    };
    let outcome = {
        let closure = capsule
            .downcast_ref::<HostClosure>()
            .expect("closure capsule holds a foreign payload");
        (closure.call)(vm)
    };
    handle_outcome(vm, &capsule, outcome)
}

/// Registered entry the VM re-enters when a suspended operation completes
/// or resumes.
pub(crate) fn continuation_entry(vm: &mut Vm, invoke: Invoke) -> Result<i32, Control> {
    let Invoke::Resume { status, ctx } = invoke else {
        panic!("continuation entry invoked without a resumption");
    };
    continue_at(vm, status, ctx)
}

/// Run the continuation half of the closure whose capsule sits at `ctx`,
/// then dispatch its outcome. Also used inline when a continuation-capable
/// call completes synchronously.
pub(crate) fn continue_at(vm: &mut Vm, status: Status, ctx: i64) -> Result<i32, Control> {
    let capsule = match vm.value(ctx as i32) {
        Value::Userdata(u) => u,
        v => panic!(
            "continuation context corrupted: expected capsule, found {}",
            v.type_name()
        ),
    };
    let outcome = {
        let closure = capsule
            .downcast_ref::<HostClosure>()
            .expect("continuation capsule holds a foreign payload");
        let cont = closure
            .cont
            .as_ref()
            .expect("closure suspended without a continuation half");
        cont(vm, status, ctx)
    };
    handle_outcome(vm, &capsule, outcome)
}

/// Convert an `Outcome` into the VM action it names.
pub(crate) fn handle_outcome(
    vm: &mut Vm,
    capsule: &Rc<Userdata>,
    outcome: Outcome,
) -> Result<i32, Control> {
    match outcome {
        Outcome::Return(n) => Ok(n),
        Outcome::Error => {
            let v = vm.pop();
            Err(vm.raise(v))
        }
        Outcome::Call { nargs, nresults } => {
            vm.push(Value::Userdata(capsule.clone()));
            vm.insert(-(nargs + 2));
            let ctx = (vm.top() - nargs - 1) as i64;
            let cont = slot(vm, names::CONTINUATION);
            vm.callk(nargs, nresults, ctx, cont)?;
            // completed synchronously: the continuation fires inline
            continue_at(vm, Status::Ok, ctx)
        }
        Outcome::ProtectedCall {
            nargs,
            nresults,
            has_handler,
        } => {
            vm.push(Value::Userdata(capsule.clone()));
            vm.insert(-(nargs + 2));
            let ctx = (vm.top() - nargs - 1) as i64;
            // the handler slot only counts when it actually holds a function
            let handler = if has_handler && vm.is_function((ctx - 1) as i32) {
                (ctx - 1) as i32
            } else {
                0
            };
            let cont = slot(vm, names::CONTINUATION);
            let status = vm.pcallk(nargs, nresults, handler, ctx, cont)?;
            // never escalated here; the continuation decides
            continue_at(vm, status, ctx)
        }
        Outcome::Yield {
            nresults,
            has_continuation,
        } => {
            if has_continuation {
                let has_cont_half = capsule
                    .downcast_ref::<HostClosure>()
                    .map_or(false, |c| c.cont.is_some());
                if !has_cont_half {
                    return Err(
                        vm.raise_msg("closure yielded with a continuation it does not have")
                    );
                }
                // pad with nil so the continuation sees the
                // protected-call layout either way
                vm.push(Value::Nil);
                vm.push(Value::Userdata(capsule.clone()));
                vm.rotate(-(nresults + 2), 2);
                let ctx = (vm.top() - nresults) as i64;
                let cont = slot(vm, names::CONTINUATION);
                Err(vm.yieldk(nresults, ctx, cont))
            } else {
                Err(vm.yield_(nresults))
            }
        }
    }
}
