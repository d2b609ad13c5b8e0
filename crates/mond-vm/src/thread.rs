//! Thread (coroutine) state and call frames.
//!
//! The VM executes exactly one thread at a time. The running thread's stack
//! and frames live directly on the `Vm`; suspended coroutines keep theirs in
//! a [`ThreadState`] that is swapped in on resume and out on yield.

use std::rc::Rc;

use mond_core::{CoroId, NativeSlot, NativeValue, Value};

/// Expected result count meaning "keep everything".
pub const MULTRET: i32 = -1;

/// Guard data making a parked frame a protected boundary: a raise that
/// unwinds into it after resumption is delivered to the continuation as
/// `Status::ErrorRaised` instead of killing the coroutine.
#[derive(Debug, Clone, Copy)]
pub struct PcallGuard {
    /// Absolute stack index of the called function; the stack is restored
    /// to this depth before the error value is pushed.
    pub func_abs: usize,
    /// Absolute index of the message handler, when one was supplied.
    pub handler: Option<usize>,
}

/// A continuation registered by a suspended native frame.
#[derive(Debug, Clone, Copy)]
pub struct Pending {
    pub slot: NativeSlot,
    /// Continuation context: frame-relative stack depth recorded after all
    /// pushes for the pending operation were complete.
    pub ctx: i64,
    pub guard: Option<PcallGuard>,
}

pub struct CallFrame {
    pub callee: Rc<NativeValue>,
    /// Absolute stack index of the first argument.
    pub base: usize,
    /// Result count the caller expects, or [`MULTRET`].
    pub nresults: i32,
    /// Continuation parked by callk/pcallk/yieldk while suspended.
    pub pending: Option<Pending>,
    /// Set by a continuation-less yield: the next resume completes this
    /// frame with the resume arguments as its results.
    pub finish_on_resume: bool,
    /// `(first slot, count)` of the last stack transfer into this frame.
    pub transfer: (u16, u16),
}

/// Saved execution state of a thread that is not running.
pub struct ThreadState {
    pub stack: Vec<Value>,
    pub frames: Vec<CallFrame>,
    /// Non-yieldable nesting depth (plain call/pcall boundaries).
    pub nny: u32,
    /// Result count recorded by the yield in flight.
    pub yield_count: i32,
}

impl ThreadState {
    pub fn fresh(body: Value) -> ThreadState {
        ThreadState {
            stack: vec![body],
            frames: Vec::new(),
            nny: 0,
            yield_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroStatus {
    /// Created or yielded - ready to be resumed.
    Suspended,
    /// Currently executing.
    Running,
    /// Resumed another coroutine and is waiting on it.
    Normal,
    /// Finished, errored out, or closed.
    Dead,
}

impl CoroStatus {
    pub fn describe(self) -> &'static str {
        match self {
            CoroStatus::Suspended => "suspended",
            CoroStatus::Running => "running",
            CoroStatus::Normal => "normal",
            CoroStatus::Dead => "dead",
        }
    }
}

pub struct CoroSlot {
    /// `None` while the coroutine is the running thread or dead.
    pub state: Option<ThreadState>,
    pub status: CoroStatus,
}

/// Which thread the VM is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadId {
    Main,
    Coro(CoroId),
}
