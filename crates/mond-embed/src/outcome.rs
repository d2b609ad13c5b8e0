//! The result protocol between host closures and the trampoline.

/// What a host closure asks the trampoline to do on its behalf.
///
/// Closures never raise or suspend themselves - either would tear Rust
/// frames that the VM cannot restore. They return one of these and the
/// trampoline performs the operation from its own native frame, after the
/// closure's Rust frame has already returned normally.
///
/// A suspending variant (`Call`, `ProtectedCall`, `Yield`) is legal from
/// the initial invocation and from a continuation, so suspensions chain to
/// arbitrary depth. Expected stack layouts on return:
///
/// - `Return(n)`: the `n` results on top.
/// - `Error`: the error value on top.
/// - `Call`/`ProtectedCall`: the callee below its `nargs` arguments; for
///   `ProtectedCall` with `has_handler`, the message handler directly
///   below the callee.
/// - `Yield`: the `nresults` values to hand to the resumer on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Finish normally with the top `n` stack values as results.
    Return(i32),
    /// Raise the value on top of the stack as a VM error.
    Error,
    /// Perform a call; the continuation half observes its completion.
    Call { nargs: i32, nresults: i32 },
    /// Perform a protected call; the continuation half observes the
    /// resulting status and is never skipped on error.
    ProtectedCall {
        nargs: i32,
        nresults: i32,
        has_handler: bool,
    },
    /// Suspend the running coroutine, yielding the top `nresults` values.
    /// With `has_continuation` the closure's continuation half runs on
    /// resume; without it the native completes with the resume arguments.
    Yield { nresults: i32, has_continuation: bool },
}
