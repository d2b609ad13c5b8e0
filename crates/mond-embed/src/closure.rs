//! Host closures and their capsules.

use std::rc::Rc;

use mond_core::{ApiRev, Status};
use mond_vm::Vm;

use crate::outcome::Outcome;
use crate::{names, slot};

pub type CallFn = Box<dyn Fn(&mut Vm) -> Outcome>;
pub type ContFn = Box<dyn Fn(&mut Vm, Status, i64) -> Outcome>;

/// A host closure in two halves: the initial `call`, and the optional
/// `cont` invoked when an operation the closure requested completes or
/// resumes. Ownership stays with whatever pushed the closure; the VM's
/// registry never owns closures.
pub struct HostClosure {
    pub(crate) call: CallFn,
    pub(crate) cont: Option<ContFn>,
}

impl HostClosure {
    /// A closure that only ever returns or errors.
    pub fn new(call: impl Fn(&mut Vm) -> Outcome + 'static) -> HostClosure {
        HostClosure {
            call: Box::new(call),
            cont: None,
        }
    }

    /// A closure that may request call/protected-call/yield, resumed
    /// through `cont` with the resulting status and the continuation
    /// context it was suspended with.
    pub fn with_continuation(
        call: impl Fn(&mut Vm) -> Outcome + 'static,
        cont: impl Fn(&mut Vm, Status, i64) -> Outcome + 'static,
    ) -> HostClosure {
        HostClosure {
            call: Box::new(call),
            cont: Some(Box::new(cont)),
        }
    }
}

/// Minimum user-value slots a fresh userdata carries on `api`.
pub(crate) fn min_uv_slots(api: ApiRev) -> usize {
    match api {
        ApiRev::R1 => 1,
        _ => 0,
    }
}

/// Push a callable that runs `closure` through the trampoline.
pub fn push_closure(vm: &mut Vm, closure: HostClosure) {
    let capsule = vm.new_userdata(Rc::new(closure), min_uv_slots(vm.api()));
    let entry = vm.make_native(slot(vm, names::CLOSURE), vec![capsule]);
    vm.push(entry);
}
