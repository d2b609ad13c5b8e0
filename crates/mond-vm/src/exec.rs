//! Call, protected call, yield, and resume machinery.
//!
//! Natives run as Rust functions, so a suspension cannot keep their Rust
//! frames alive: `callk`/`pcallk`/`yieldk` park a continuation slot and a
//! frame-relative context on the VM frame instead, and the resume driver
//! re-enters host logic through the registry when the operation completes.

use mond_core::{ApiRev, CoroId, Status, Value};

use crate::control::Control;
use crate::registry::Invoke;
use crate::thread::{CallFrame, CoroStatus, PcallGuard, Pending, ThreadId, ThreadState, MULTRET};
use crate::vm::Vm;

const MAX_CALL_DEPTH: usize = 200;

/// How a resume left the coroutine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeStatus {
    /// The body returned; the coroutine is dead.
    Ok,
    /// The coroutine yielded and can be resumed again.
    Yielded,
    /// The body raised (or the resume was invalid); the error value was
    /// delivered to the resumer. The coroutine is dead.
    Error,
}

enum Disposition {
    Finished(i32),
    Yielded(i32),
    Died(Value),
}

impl Vm {
    /// Invoke the callable below the top `nargs` values. Shared core of
    /// every call path; the callee frame is popped on completion or raise
    /// and left parked on suspension.
    fn do_call(&mut self, nargs: i32, nresults: i32) -> Result<(), Control> {
        debug_assert!(nargs >= 0);
        assert!(
            self.stack.len() >= self.frame_base() + nargs as usize + 1,
            "not enough stack values for a call with {} arguments",
            nargs
        );
        let func_abs = self.stack.len() - nargs as usize - 1;
        let callee = match &self.stack[func_abs] {
            Value::Native(n) => n.clone(),
            v => {
                let ty = v.type_name();
                return Err(self.type_error("call", ty));
            }
        };
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(self.raise_msg("stack overflow"));
        }
        let slot = callee.slot;
        self.frames.push(CallFrame {
            callee,
            base: func_abs + 1,
            nresults,
            pending: None,
            finish_on_resume: false,
            transfer: (1, nargs as u16),
        });
        let invoker = self.registry().resolve(slot);
        match invoker(self, Invoke::Enter) {
            Ok(n) => {
                self.finish_frame(n);
                Ok(())
            }
            Err(Control::Raise(v)) => {
                let f = self.frames.pop().expect("raising call has no frame");
                self.stack.truncate(f.base - 1);
                Err(Control::Raise(v))
            }
            Err(Control::Suspend) => Err(Control::Suspend),
        }
    }

    /// Complete the innermost frame with its top `n` values as results,
    /// placing them where the caller expects and adjusting their count.
    pub(crate) fn finish_frame(&mut self, n: i32) {
        let frame = self.frames.pop().expect("finish_frame without a frame");
        let n = n.max(0) as usize;
        let func_abs = frame.base - 1;
        assert!(
            self.stack.len() >= func_abs + n,
            "native returned more results than stack values"
        );
        let results_from = self.stack.len() - n;
        self.stack.drain(func_abs..results_from);
        if frame.nresults >= 0 {
            self.stack
                .resize(func_abs + frame.nresults as usize, Value::Nil);
        }
    }

    /// Plain call. Non-yieldable: a yield attempted across this boundary
    /// raises instead of suspending.
    pub fn call(&mut self, nargs: i32, nresults: i32) -> Result<(), Control> {
        self.nny += 1;
        let r = self.do_call(nargs, nresults);
        self.nny -= 1;
        debug_assert!(
            !matches!(r, Err(Control::Suspend)),
            "suspension across a non-yieldable call"
        );
        r
    }

    /// Continuation-capable call. On synchronous completion the caller
    /// keeps running; on suspension the continuation is parked on the
    /// calling frame and `Err(Suspend)` must be returned immediately.
    pub fn callk(
        &mut self,
        nargs: i32,
        nresults: i32,
        ctx: i64,
        cont: mond_core::NativeSlot,
    ) -> Result<(), Control> {
        assert!(!self.frames.is_empty(), "callk requires a native frame");
        let depth = self.frames.len() - 1;
        match self.do_call(nargs, nresults) {
            Err(Control::Suspend) => {
                self.frames[depth].pending = Some(Pending {
                    slot: cont,
                    ctx,
                    guard: None,
                });
                Err(Control::Suspend)
            }
            r => r,
        }
    }

    fn do_pcall(
        &mut self,
        nargs: i32,
        nresults: i32,
        handler: Option<usize>,
    ) -> Result<Status, Control> {
        let func_abs = self.stack.len() - nargs as usize - 1;
        match self.do_call(nargs, nresults) {
            Ok(()) => Ok(Status::Ok),
            Err(Control::Raise(v)) => {
                let v = self.run_handler(handler, v);
                self.stack.truncate(func_abs);
                self.stack.push(v);
                Ok(Status::ErrorRaised)
            }
            Err(Control::Suspend) => Err(Control::Suspend),
        }
    }

    /// Filter an error value through the optional message handler. A
    /// handler that itself raises yields the canonical handling-failure
    /// message rather than escaping the protected call.
    fn run_handler(&mut self, handler: Option<usize>, v: Value) -> Value {
        let Some(h) = handler else { return v };
        let hv = self.stack[h].clone();
        self.stack.push(hv);
        self.stack.push(v);
        match self.call(1, 1) {
            Ok(()) => self.pop(),
            Err(Control::Raise(_)) => Value::str("error in error handling"),
            Err(Control::Suspend) => unreachable!("message handler suspended"),
        }
    }

    /// Protected call, non-yieldable. Never raises toward the caller: an
    /// error is truncated to the call base and left as a single value, and
    /// the status reports it.
    pub fn pcall(&mut self, nargs: i32, nresults: i32, handler: i32) -> Status {
        let handler = (handler != 0).then(|| self.abs(handler));
        self.nny += 1;
        let r = self.do_pcall(nargs, nresults, handler);
        self.nny -= 1;
        match r {
            Ok(s) => s,
            Err(Control::Raise(_)) => unreachable!("raise escaped a protected call"),
            Err(Control::Suspend) => {
                unreachable!("suspension across a non-yieldable protected call")
            }
        }
    }

    /// Protected continuation-capable call. A synchronous error behaves as
    /// in [`pcall`](Vm::pcall) and the status is returned; a suspension
    /// parks the continuation with a guard so a post-resume error is
    /// delivered to it as `Status::ErrorRaised` instead of unwinding
    /// further.
    pub fn pcallk(
        &mut self,
        nargs: i32,
        nresults: i32,
        handler: i32,
        ctx: i64,
        cont: mond_core::NativeSlot,
    ) -> Result<Status, Control> {
        assert!(!self.frames.is_empty(), "pcallk requires a native frame");
        let depth = self.frames.len() - 1;
        let func_abs = self.stack.len() - nargs as usize - 1;
        let handler = (handler != 0).then(|| self.abs(handler));
        match self.do_pcall(nargs, nresults, handler) {
            Err(Control::Suspend) => {
                self.frames[depth].pending = Some(Pending {
                    slot: cont,
                    ctx,
                    guard: Some(PcallGuard { func_abs, handler }),
                });
                Err(Control::Suspend)
            }
            r => r,
        }
    }

    fn check_yieldable(&self) -> Result<(), Control> {
        if self.running == ThreadId::Main {
            return Err(self.raise_msg("attempt to yield from outside a coroutine"));
        }
        if self.nny > 0 {
            return Err(self.raise_msg("attempt to yield across a native call boundary"));
        }
        if self.frames.is_empty() {
            return Err(self.raise_msg("attempt to yield outside a native frame"));
        }
        Ok(())
    }

    /// Yield the top `nresults` values with a continuation. The returned
    /// control value (a suspension, or a raise when yielding here is
    /// illegal) must be the frame's final action.
    pub fn yieldk(&mut self, nresults: i32, ctx: i64, cont: mond_core::NativeSlot) -> Control {
        if let Err(c) = self.check_yieldable() {
            return c;
        }
        let depth = self.frames.len() - 1;
        self.frames[depth].pending = Some(Pending {
            slot: cont,
            ctx,
            guard: None,
        });
        self.yield_count = nresults;
        Control::Suspend
    }

    /// Continuation-less yield: the next resume completes the yielding
    /// native with the resume arguments as its results.
    pub fn yield_(&mut self, nresults: i32) -> Control {
        if let Err(c) = self.check_yieldable() {
            return c;
        }
        let f = self.frames.last_mut().expect("yield requires a native frame");
        f.finish_on_resume = true;
        self.yield_count = nresults;
        Control::Suspend
    }

    // ------------------------------------------------------------------
    // Resume
    // ------------------------------------------------------------------

    /// Resume `co`, moving the top `nargs` values of the running stack to
    /// it. Results (return values, yield payload, or the error value) are
    /// transferred back onto the running stack.
    ///
    /// The result count is reported only from API revision R2 on; the
    /// compatibility shim normalizes this for hosts.
    pub fn resume(&mut self, co: CoroId, nargs: i32) -> (ResumeStatus, Option<i32>) {
        assert!(
            self.stack.len() >= self.frame_base() + nargs as usize,
            "not enough stack values for a resume with {} arguments",
            nargs
        );
        let status = self.coros[co.0 as usize].status;
        if status != CoroStatus::Suspended {
            self.pop_n(nargs);
            self.push(Value::from(format!(
                "cannot resume {} coroutine",
                status.describe()
            )));
            return (ResumeStatus::Error, self.report_count(1));
        }
        let split = self.stack.len() - nargs as usize;
        let args: Vec<Value> = self.stack.split_off(split);
        self.swap_in(co);
        let disp = self.drive(args);
        self.swap_out(co, disp)
    }

    fn report_count(&self, n: i32) -> Option<i32> {
        match self.api() {
            ApiRev::R1 => None,
            _ => Some(n),
        }
    }

    fn swap_in(&mut self, co: CoroId) {
        let state = self.coros[co.0 as usize]
            .state
            .take()
            .expect("suspended coroutine without saved state");
        let saved = ThreadState {
            stack: std::mem::replace(&mut self.stack, state.stack),
            frames: std::mem::replace(&mut self.frames, state.frames),
            nny: std::mem::replace(&mut self.nny, state.nny),
            yield_count: std::mem::replace(&mut self.yield_count, state.yield_count),
        };
        let prev = std::mem::replace(&mut self.running, ThreadId::Coro(co));
        if let ThreadId::Coro(p) = prev {
            self.coros[p.0 as usize].status = CoroStatus::Normal;
        }
        self.resume_chain.push((prev, saved));
        self.coros[co.0 as usize].status = CoroStatus::Running;
    }

    fn swap_out(&mut self, co: CoroId, disp: Disposition) -> (ResumeStatus, Option<i32>) {
        let (status, mut values) = match disp {
            Disposition::Finished(n) => {
                let split = self.stack.len() - n as usize;
                (ResumeStatus::Ok, self.stack.split_off(split))
            }
            Disposition::Yielded(n) => {
                let split = self.stack.len() - n as usize;
                (ResumeStatus::Yielded, self.stack.split_off(split))
            }
            Disposition::Died(v) => (ResumeStatus::Error, vec![v]),
        };
        let (prev, saved) = self.resume_chain.pop().expect("resume chain underflow");
        let state = ThreadState {
            stack: std::mem::replace(&mut self.stack, saved.stack),
            frames: std::mem::replace(&mut self.frames, saved.frames),
            nny: std::mem::replace(&mut self.nny, saved.nny),
            yield_count: std::mem::replace(&mut self.yield_count, saved.yield_count),
        };
        let slot = &mut self.coros[co.0 as usize];
        if status == ResumeStatus::Yielded {
            slot.state = Some(state);
            slot.status = CoroStatus::Suspended;
        } else {
            slot.state = None;
            slot.status = CoroStatus::Dead;
        }
        self.running = prev;
        if let ThreadId::Coro(p) = prev {
            self.coros[p.0 as usize].status = CoroStatus::Running;
        }
        let n = values.len() as i32;
        let first = (self.stack.len() - self.frame_base() + 1) as u16;
        self.stack.append(&mut values);
        if let Some(f) = self.frames.last_mut() {
            f.transfer = (first, n as u16);
        }
        (status, self.report_count(n))
    }

    /// Execute the coroutine until it returns, raises, or yields again.
    ///
    /// The synchronous part of any operation runs by Rust recursion; this
    /// loop only stitches together the frames whose Rust counterparts were
    /// unwound by an earlier suspension, firing each parked continuation
    /// as the operation below it completes.
    fn drive(&mut self, mut args: Vec<Value>) -> Disposition {
        let mut step: Result<i32, Control> = if self.frames.is_empty() {
            // fresh coroutine: stack is [body]
            let nargs = args.len() as i32;
            self.stack.append(&mut args);
            match self.do_call(nargs, MULTRET) {
                Ok(()) => return Disposition::Finished(self.stack.len() as i32),
                Err(c) => Err(c),
            }
        } else {
            let nargs = args.len() as i32;
            let first = (self.stack.len() - self.frames.last().unwrap().base + 1) as u16;
            self.stack.append(&mut args);
            let f = self.frames.last_mut().unwrap();
            f.transfer = (first, nargs as u16);
            if f.finish_on_resume {
                f.finish_on_resume = false;
                Ok(nargs)
            } else if let Some(p) = f.pending.take() {
                let invoker = self.registry().resolve(p.slot);
                invoker(
                    self,
                    Invoke::Resume {
                        status: Status::Yielded,
                        ctx: p.ctx,
                    },
                )
            } else {
                panic!("resumed coroutine has no continuation to deliver to");
            }
        };

        loop {
            match step {
                Ok(n) => {
                    self.finish_frame(n);
                    if self.frames.is_empty() {
                        return Disposition::Finished(self.stack.len() as i32);
                    }
                    match self.frames.last_mut().unwrap().pending.take() {
                        Some(p) => {
                            let invoker = self.registry().resolve(p.slot);
                            step = invoker(
                                self,
                                Invoke::Resume {
                                    status: Status::Ok,
                                    ctx: p.ctx,
                                },
                            );
                        }
                        None => panic!("suspended frame resumed without a continuation"),
                    }
                }
                Err(Control::Suspend) => {
                    return Disposition::Yielded(self.yield_count);
                }
                Err(Control::Raise(v)) => {
                    let err = v;
                    loop {
                        if self.frames.is_empty() {
                            return Disposition::Died(err);
                        }
                        let (pending, base) = {
                            let f = self.frames.last_mut().unwrap();
                            (f.pending.take(), f.base)
                        };
                        if let Some(p) = pending {
                            if let Some(guard) = p.guard {
                                let handled = self.run_handler(guard.handler, err);
                                self.stack.truncate(guard.func_abs);
                                self.stack.push(handled);
                                let invoker = self.registry().resolve(p.slot);
                                step = invoker(
                                    self,
                                    Invoke::Resume {
                                        status: Status::ErrorRaised,
                                        ctx: p.ctx,
                                    },
                                );
                                break;
                            }
                        }
                        self.frames.pop();
                        self.stack.truncate(base - 1);
                    }
                }
            }
        }
    }
}
