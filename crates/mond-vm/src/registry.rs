//! Registry of native capabilities.
//!
//! An arena keyed by small stable handles, owned by one VM instance. The
//! registry maps a [`NativeSlot`] to the invoker able to run the capability;
//! it owns no host closures - those travel as upvalues of the callable
//! values that reference a slot.

use std::rc::Rc;

use mond_core::{NativeSlot, Status};

use crate::control::Control;
use crate::vm::Vm;

/// How a registered capability is being entered.
#[derive(Debug, Clone, Copy)]
pub enum Invoke {
    /// Initial dispatch of a call.
    Enter,
    /// Continuation re-entry after a suspended operation resumed. `ctx` is
    /// the continuation context the capability registered at suspension
    /// time: a frame-relative stack depth, never an address.
    Resume { status: Status, ctx: i64 },
}

/// A native capability. `Ok(n)` leaves `n` results on top of the stack.
pub type Invoker = fn(&mut Vm, Invoke) -> Result<i32, Control>;

#[derive(Default)]
pub struct Registry {
    entries: Vec<(Rc<str>, Invoker)>,
}

impl Registry {
    pub fn new() -> Registry {
        Registry::default()
    }

    /// Register a capability. Slots are handed out once, at runtime
    /// installation, and stay valid for the life of the VM.
    pub fn register(&mut self, name: &str, invoker: Invoker) -> NativeSlot {
        let slot = NativeSlot(self.entries.len() as u32);
        self.entries.push((Rc::from(name), invoker));
        slot
    }

    /// Resolve a slot produced by [`register`](Registry::register).
    ///
    /// A miss is an unrecoverable programming error: continuing would run
    /// the VM in an inconsistent state, so this aborts instead.
    pub fn resolve(&self, slot: NativeSlot) -> Invoker {
        match self.entries.get(slot.0 as usize) {
            Some((_, invoker)) => *invoker,
            None => panic!("native slot {} is not registered", slot.0),
        }
    }

    /// Name a slot was registered under.
    pub fn name(&self, slot: NativeSlot) -> Rc<str> {
        match self.entries.get(slot.0 as usize) {
            Some((name, _)) => name.clone(),
            None => panic!("native slot {} is not registered", slot.0),
        }
    }

    /// Look a slot up by registration name.
    pub fn find(&self, name: &str) -> Option<NativeSlot> {
        self.entries
            .iter()
            .position(|(n, _)| &**n == name)
            .map(|i| NativeSlot(i as u32))
    }
}
