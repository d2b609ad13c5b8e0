//! Non-local control transfers.

use mond_core::Value;

/// A control transfer in flight.
///
/// Native code receives this as an opaque `Err` and must return it
/// immediately; only the VM's protected boundaries may intercept it. This
/// is the safe rendition of the engine's non-local jumps: a `Raise` unwinds
/// VM frames to the nearest protected call, a `Suspend` unwinds the Rust
/// frames of every native between the yield point and the resume boundary
/// while their VM frames stay parked with a registered continuation.
#[derive(Debug)]
pub enum Control {
    /// A VM-level error carrying the raised value.
    Raise(Value),
    /// A coroutine yield in flight.
    Suspend,
}
