//! # mond-embed
//!
//! The host embedding bridge for the Mond VM:
//! - `closure` - host closures and the capsules that carry them
//! - `outcome` - the result protocol a closure returns to the trampoline
//! - `trampoline` - dispatch, continuation re-entry, outcome handling
//! - `iterate` - native iteration loops driven by step closures
//! - `natives` - one-shot natives (table access, display, modules,
//!   comparison, arithmetic) and their protected wrappers
//! - `shim` - version-compatibility shims over the VM's API revisions
//!
//! Host code pushes closures with [`push_closure`], runs callables with
//! [`protected_call`], and never touches a raising VM primitive directly:
//! everything that can raise runs inside a registered native frame.

pub mod closure;
pub mod iterate;
pub mod natives;
pub mod outcome;
pub mod shim;
mod trampoline;

use mond_core::{HostError, NativeSlot, Status};
use mond_vm::Vm;

pub use closure::{push_closure, HostClosure};
pub use iterate::{for_index, for_pairs, push_pairs, IterOutcome, IterStep};
pub use natives::{
    apply_arith, compare_values, get_table, register_module, set_table, to_display_string,
};
pub use outcome::Outcome;
pub use shim::{
    close_coroutine, new_userdata_min, resume, source_len, transfer_counts, tune_gc, Resumption,
};

/// Registration names of the bridge's native capabilities.
pub mod names {
    pub const CLOSURE: &str = "mond.closure";
    pub const CONTINUATION: &str = "mond.continuation";
    pub const FOR_PAIRS: &str = "mond.for_pairs";
    pub const FOR_INDEX: &str = "mond.for_index";
    pub const NEXT: &str = "mond.next";
    pub const GET_TABLE: &str = "mond.gettable";
    pub const SET_TABLE: &str = "mond.settable";
    pub const TOSTRING: &str = "mond.tostring";
    pub const REQUIRE: &str = "mond.require";
    pub const COMPARE: &str = "mond.compare";
    pub const ARITH: &str = "mond.arith";
}

/// Slots of the installed bridge capabilities.
#[derive(Debug, Clone, Copy)]
pub struct Slots {
    pub closure: NativeSlot,
    pub continuation: NativeSlot,
    pub for_pairs: NativeSlot,
    pub for_index: NativeSlot,
    pub next: NativeSlot,
    pub get_table: NativeSlot,
    pub set_table: NativeSlot,
    pub tostring: NativeSlot,
    pub require: NativeSlot,
    pub compare: NativeSlot,
    pub arith: NativeSlot,
}

/// Install the bridge's capabilities into `vm`. Slots are registered once
/// at initialization and stay stable for the VM's life; calling this again
/// returns the already-registered slots.
pub fn install(vm: &mut Vm) -> Slots {
    if vm.registry().find(names::CLOSURE).is_some() {
        return Slots {
            closure: slot(vm, names::CLOSURE),
            continuation: slot(vm, names::CONTINUATION),
            for_pairs: slot(vm, names::FOR_PAIRS),
            for_index: slot(vm, names::FOR_INDEX),
            next: slot(vm, names::NEXT),
            get_table: slot(vm, names::GET_TABLE),
            set_table: slot(vm, names::SET_TABLE),
            tostring: slot(vm, names::TOSTRING),
            require: slot(vm, names::REQUIRE),
            compare: slot(vm, names::COMPARE),
            arith: slot(vm, names::ARITH),
        };
    }
    let r = vm.registry_mut();
    Slots {
        closure: r.register(names::CLOSURE, trampoline::closure_entry),
        continuation: r.register(names::CONTINUATION, trampoline::continuation_entry),
        for_pairs: r.register(names::FOR_PAIRS, iterate::for_pairs_entry),
        for_index: r.register(names::FOR_INDEX, iterate::for_index_entry),
        next: r.register(names::NEXT, natives::next_entry),
        get_table: r.register(names::GET_TABLE, natives::get_table_entry),
        set_table: r.register(names::SET_TABLE, natives::set_table_entry),
        tostring: r.register(names::TOSTRING, natives::tostring_entry),
        require: r.register(names::REQUIRE, natives::require_entry),
        compare: r.register(names::COMPARE, natives::compare_entry),
        arith: r.register(names::ARITH, natives::arith_entry),
    }
}

/// Slot of an installed capability. Missing means the bridge was never
/// installed into this VM, which is a setup error.
pub(crate) fn slot(vm: &Vm, name: &str) -> NativeSlot {
    vm.registry()
        .find(name)
        .expect("mond runtime bridge is not installed")
}

/// Run the callable below the top `nargs` values under protection. The
/// host-facing entry point: a raise anywhere below is caught here and
/// returned as a value, never as unwinding.
pub fn protected_call(vm: &mut Vm, nargs: i32, nresults: i32) -> Result<(), HostError> {
    match vm.pcall(nargs, nresults, 0) {
        Status::Ok => Ok(()),
        Status::ErrorRaised => Err(HostError::Raised(vm.pop())),
        Status::Yielded => unreachable!("host-level protected call yielded"),
    }
}
