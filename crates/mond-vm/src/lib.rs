//! # mond-vm
//!
//! The Mond stack VM substrate: per-thread value stacks and call frames,
//! the registry of native capabilities, call/protected-call/yield/resume
//! machinery with parked continuations, raw value operations, collector
//! strategy state, and debug records.
//!
//! Host-facing embedding lives in `mond-embed`; this crate only knows how
//! to run registered natives and move control between threads.

pub mod control;
pub mod exec;
pub mod gc;
pub mod ops;
pub mod registry;
pub mod thread;
pub mod vm;

pub use control::Control;
pub use exec::ResumeStatus;
pub use gc::{GcParam, GcState};
pub use registry::{Invoke, Invoker, Registry};
pub use thread::{CoroStatus, MULTRET};
pub use vm::Vm;
