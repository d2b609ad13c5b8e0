//! Small shared enums: resumption status, API revisions, operator codes.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Result of a resumed VM operation, delivered to a continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The operation completed normally.
    Ok,
    /// A protected call raised; the error value is on the stack.
    ErrorRaised,
    /// A yield was resumed; resume arguments are on the stack.
    Yielded,
}

/// Engine API revision negotiated at VM construction.
///
/// Emulates embedding against three generations of the engine. The
/// compatibility shim in `mond-embed` papers over the differences; nothing
/// else should branch on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApiRev {
    /// Incremental-only GC (no step-size knob), resume reports no result
    /// count, no coroutine close, userdata always carries one user value,
    /// debug records lack source length and transfer counts.
    R1,
    /// Generational GC with minor/major multipliers, full incremental
    /// knobs, coroutine close, selectable userdata slots, full debug
    /// records.
    R2,
    /// Parameter-style GC API: generational knobs are minor multiplier and
    /// the minor/major promotion thresholds; the major multiplier is gone.
    R3,
}

/// Arithmetic operator code. Crosses the native protocol as an integer on
/// the value stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
    Unm,
}

impl ArithOp {
    /// Number of operands the operator consumes.
    pub fn arity(self) -> usize {
        match self {
            ArithOp::Unm => 1,
            _ => 2,
        }
    }
}

/// Comparison operator code. Crosses the native protocol as an integer on
/// the value stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum CompareOp {
    Eq,
    Lt,
    Le,
}
