//! VM state and the stack manipulation surface.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use mond_core::{
    ApiRev, CoroId, DebugRecord, HostError, NativeSlot, NativeValue, Table, Userdata, Value,
};

use crate::control::Control;
use crate::gc::GcState;
use crate::registry::Registry;
use crate::thread::{CallFrame, CoroSlot, CoroStatus, ThreadId, ThreadState};

/// Rough allocation sizes reported to the pacing accounting.
const TABLE_ALLOC: usize = 64;
const USERDATA_ALLOC: usize = 32;
const UV_SLOT_ALLOC: usize = 16;

/// One VM instance.
///
/// The running thread's stack and frames live directly on this struct;
/// suspended coroutines are parked in `coros`. Nothing here is shared
/// across VM instances, and exactly one logical thread of control is inside
/// the VM at any moment.
pub struct Vm {
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<CallFrame>,
    /// Non-yieldable nesting depth of the running thread.
    pub(crate) nny: u32,
    /// Result count recorded by a yield in flight.
    pub(crate) yield_count: i32,
    pub(crate) running: ThreadId,
    pub(crate) coros: Vec<CoroSlot>,
    /// Saved caller states for nested resumes, innermost last.
    pub(crate) resume_chain: Vec<(ThreadId, ThreadState)>,
    globals: Rc<RefCell<Table>>,
    /// VM-private table of loaded modules, keyed by name.
    loaded: Rc<RefCell<Table>>,
    registry: Registry,
    gc: GcState,
    api: ApiRev,
}

impl Vm {
    pub fn new() -> Vm {
        Vm::with_api(ApiRev::R3)
    }

    pub fn with_api(api: ApiRev) -> Vm {
        Vm {
            stack: Vec::new(),
            frames: Vec::new(),
            nny: 0,
            yield_count: 0,
            running: ThreadId::Main,
            coros: Vec::new(),
            resume_chain: Vec::new(),
            globals: Rc::new(RefCell::new(Table::new())),
            loaded: Rc::new(RefCell::new(Table::new())),
            registry: Registry::new(),
            gc: GcState::default(),
            api,
        }
    }

    pub fn api(&self) -> ApiRev {
        self.api
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn gc(&self) -> &GcState {
        &self.gc
    }

    pub fn gc_mut(&mut self) -> &mut GcState {
        &mut self.gc
    }

    pub fn globals(&self) -> Rc<RefCell<Table>> {
        self.globals.clone()
    }

    pub fn loaded_modules(&self) -> Rc<RefCell<Table>> {
        self.loaded.clone()
    }

    // ------------------------------------------------------------------
    // Stack access
    //
    // Indices are 1-based and relative to the running frame's base;
    // negative indices count down from the top. Continuation contexts are
    // these depths, never addresses, so they survive stack reallocation
    // and suspension gaps.
    // ------------------------------------------------------------------

    #[inline]
    pub(crate) fn frame_base(&self) -> usize {
        self.frames.last().map_or(0, |f| f.base)
    }

    /// Number of values in the running frame.
    pub fn top(&self) -> i32 {
        (self.stack.len() - self.frame_base()) as i32
    }

    pub(crate) fn abs_opt(&self, idx: i32) -> Option<usize> {
        if idx > 0 {
            let a = self.frame_base() + idx as usize - 1;
            (a < self.stack.len()).then_some(a)
        } else if idx < 0 {
            self.stack
                .len()
                .checked_add_signed(idx as isize)
                .filter(|a| *a >= self.frame_base())
        } else {
            None
        }
    }

    pub(crate) fn abs(&self, idx: i32) -> usize {
        match self.abs_opt(idx) {
            Some(a) => a,
            None => panic!("stack index {} out of range", idx),
        }
    }

    /// Turn a possibly-negative index into an equivalent positive one.
    pub fn abs_index(&self, idx: i32) -> i32 {
        (self.abs(idx) - self.frame_base() + 1) as i32
    }

    pub fn push(&mut self, v: impl Into<Value>) {
        self.stack.push(v.into());
    }

    pub fn pop(&mut self) -> Value {
        assert!(
            self.stack.len() > self.frame_base(),
            "stack underflow in native frame"
        );
        self.stack.pop().unwrap()
    }

    pub fn pop_n(&mut self, n: i32) {
        for _ in 0..n {
            self.pop();
        }
    }

    /// Value at `idx`; `Nil` when the index is outside the frame.
    pub fn value(&self, idx: i32) -> Value {
        self.abs_opt(idx)
            .map(|a| self.stack[a].clone())
            .unwrap_or(Value::Nil)
    }

    pub fn set_value(&mut self, idx: i32, v: Value) {
        let a = self.abs(idx);
        self.stack[a] = v;
    }

    /// Push a copy of the value at `idx`.
    pub fn push_value(&mut self, idx: i32) {
        let v = self.value(idx);
        self.push(v);
    }

    /// Move the top value into position `idx`, shifting values up.
    pub fn insert(&mut self, idx: i32) {
        let a = self.abs(idx);
        self.stack[a..].rotate_right(1);
    }

    pub fn remove(&mut self, idx: i32) -> Value {
        let a = self.abs(idx);
        self.stack.remove(a)
    }

    /// Rotate the window from `idx` to the top by `n` positions toward the
    /// top (negative `n` rotates toward the bottom).
    pub fn rotate(&mut self, idx: i32, n: i32) {
        let a = self.abs(idx);
        let window = &mut self.stack[a..];
        let len = window.len();
        assert!(n.unsigned_abs() as usize <= len, "rotate out of range");
        if n >= 0 {
            window.rotate_right(n as usize);
        } else {
            window.rotate_left((-n) as usize);
        }
    }

    /// Set the frame's value count, dropping values or filling with nils.
    pub fn set_top(&mut self, idx: i32) {
        let base = self.frame_base();
        let new_len = if idx >= 0 {
            base + idx as usize
        } else {
            match self.stack.len().checked_add_signed(idx as isize + 1) {
                Some(l) if l >= base => l,
                _ => panic!("set_top index {} out of range", idx),
            }
        };
        self.stack.resize(new_len, Value::Nil);
    }

    pub fn is_nil(&self, idx: i32) -> bool {
        self.value(idx).is_nil()
    }

    pub fn is_function(&self, idx: i32) -> bool {
        matches!(self.value(idx), Value::Native(_))
    }

    /// Upvalue `n` (1-based) of the running native, `Nil` when absent.
    pub fn upvalue(&self, n: usize) -> Value {
        self.frames
            .last()
            .and_then(|f| f.callee.upvalues.get(n.wrapping_sub(1)))
            .cloned()
            .unwrap_or(Value::Nil)
    }

    // ------------------------------------------------------------------
    // Value construction
    // ------------------------------------------------------------------

    /// Build a callable referencing a registered slot.
    pub fn make_native(&self, slot: NativeSlot, upvalues: Vec<Value>) -> Value {
        Value::Native(Rc::new(NativeValue {
            slot,
            name: self.registry.name(slot),
            upvalues,
        }))
    }

    pub fn new_table(&mut self) -> Value {
        self.gc.note_alloc(TABLE_ALLOC);
        Value::table(Table::new())
    }

    /// Allocate a userdata with `uv_slots` user-value slots. The shim picks
    /// the minimum slot count the negotiated revision supports.
    pub fn new_userdata(&mut self, payload: Rc<dyn Any>, uv_slots: usize) -> Value {
        self.gc
            .note_alloc(USERDATA_ALLOC + uv_slots * UV_SLOT_ALLOC);
        Value::Userdata(Rc::new(Userdata::new(payload, uv_slots)))
    }

    // ------------------------------------------------------------------
    // Coroutines
    // ------------------------------------------------------------------

    pub fn create_coroutine(&mut self, body: Value) -> Result<CoroId, HostError> {
        if !matches!(body, Value::Native(_)) {
            return Err(HostError::Invalid(
                "cannot create a coroutine from a non-function value",
            ));
        }
        let id = CoroId(self.coros.len() as u32);
        self.coros.push(CoroSlot {
            state: Some(ThreadState::fresh(body)),
            status: CoroStatus::Suspended,
        });
        Ok(id)
    }

    pub fn coro_status(&self, co: CoroId) -> CoroStatus {
        self.coros[co.0 as usize].status
    }

    /// Reset a suspended coroutine: abandoned frames are dropped, which
    /// runs the cleanup of anything they still own, and the coroutine
    /// becomes permanently unusable. Closing an already-dead coroutine is
    /// a no-op.
    pub fn close_coroutine(&mut self, co: CoroId) -> Result<(), HostError> {
        let slot = &mut self.coros[co.0 as usize];
        match slot.status {
            CoroStatus::Dead => Ok(()),
            CoroStatus::Suspended => {
                slot.state = None;
                slot.status = CoroStatus::Dead;
                Ok(())
            }
            CoroStatus::Running | CoroStatus::Normal => {
                Err(HostError::Invalid("cannot close a running coroutine"))
            }
        }
    }

    // ------------------------------------------------------------------
    // Raising
    // ------------------------------------------------------------------

    /// Build a raise carrying `v`. The returned control value must be the
    /// frame's final action.
    pub fn raise(&self, v: Value) -> Control {
        Control::Raise(v)
    }

    pub fn raise_msg(&self, msg: impl AsRef<str>) -> Control {
        Control::Raise(Value::str(msg.as_ref()))
    }

    pub(crate) fn type_error(&self, what: &str, ty: &'static str) -> Control {
        Control::Raise(Value::from(format!("attempt to {} a {} value", what, ty)))
    }

    // ------------------------------------------------------------------
    // Debug records
    // ------------------------------------------------------------------

    /// Snapshot of the frame `level` levels below the innermost (0 is the
    /// running frame) on the running thread.
    pub fn debug_record(&self, level: usize) -> Option<DebugRecord> {
        let frame = self.frames.iter().rev().nth(level)?;
        let source = frame.callee.name.clone();
        let (srclen, transfers) = match self.api {
            ApiRev::R1 => (None, None),
            _ => (Some(source.len()), Some(frame.transfer)),
        };
        Some(DebugRecord {
            source,
            srclen,
            transfers,
            what: "native",
        })
    }
}

impl Default for Vm {
    fn default() -> Vm {
        Vm::new()
    }
}
