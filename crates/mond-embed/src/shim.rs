//! Version-compatibility shims.
//!
//! One stable entry point per capability whose shape differs across engine
//! API revisions: resume result counting, coroutine close, minimal
//! userdata allocation, the two debug-record fields younger engines
//! compute differently, and collector tuning through a single request
//! struct. A structurally unsupported request yields [`GcUnsupported`]
//! before any state is touched; merely irrelevant fields are dropped
//! silently.

use std::any::Any;
use std::rc::Rc;

use mond_core::{
    ApiRev, CoroId, DebugRecord, GcMode, GcTuning, GcUnsupported, HostError, Value,
};
use mond_vm::{GcParam, ResumeStatus, Vm};

use crate::closure::min_uv_slots;

/// Normalized resume result: status plus the number of values transferred
/// back to the resumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resumption {
    pub status: ResumeStatus,
    pub nresults: i32,
}

/// Resume `co` with the top `nargs` values as arguments.
///
/// R1's resume does not report a result count, so it is derived from the
/// stack growth instead; later revisions report it directly.
pub fn resume(vm: &mut Vm, co: CoroId, nargs: i32) -> Resumption {
    let before = vm.top() - nargs;
    let (status, n) = vm.resume(co, nargs);
    let nresults = n.unwrap_or_else(|| vm.top() - before);
    Resumption { status, nresults }
}

/// Reset a suspended coroutine so cleanup in its abandoned frames runs
/// before it becomes permanently unusable. Closing an already-closed
/// coroutine is a no-op. On R1 there is nothing to clean and nothing is
/// done, as the old engines behaved.
pub fn close_coroutine(vm: &mut Vm, co: CoroId) -> Result<(), HostError> {
    match vm.api() {
        ApiRev::R1 => Ok(()),
        _ => vm.close_coroutine(co),
    }
}

/// Allocate a userdata with the fewest user-value slots the negotiated
/// revision supports.
pub fn new_userdata_min(vm: &mut Vm, payload: Rc<dyn Any>) -> Value {
    let slots = min_uv_slots(vm.api());
    vm.new_userdata(payload, slots)
}

/// Byte length of a record's source name, recomputed on revisions that do
/// not carry it.
pub fn source_len(rec: &DebugRecord) -> usize {
    rec.srclen.unwrap_or_else(|| rec.source.len())
}

/// Stack transfer counts of a record, `(0, 0)` when the revision or the
/// frame has none.
pub fn transfer_counts(rec: &DebugRecord) -> (u16, u16) {
    rec.transfers.unwrap_or((0, 0))
}

/// Apply a collector tuning request, returning the previously active
/// strategy.
pub fn tune_gc(vm: &mut Vm, req: &GcTuning) -> Result<GcMode, GcUnsupported> {
    match (req.mode, vm.api()) {
        (GcMode::Generational, ApiRev::R1) => Err(GcUnsupported),
        (GcMode::Generational, ApiRev::R2) => {
            if req.minor_major.is_some() || req.major_minor.is_some() {
                return Err(GcUnsupported);
            }
            let gc = vm.gc_mut();
            let prev = gc.switch(GcMode::Generational);
            if let Some(v) = req.minor_mul {
                gc.set(GcParam::MinorMul, v);
            }
            if let Some(v) = req.major_mul {
                gc.set(GcParam::MajorMul, v);
            }
            Ok(prev)
        }
        (GcMode::Generational, ApiRev::R3) => {
            if req.major_mul.is_some() {
                return Err(GcUnsupported);
            }
            let gc = vm.gc_mut();
            let prev = gc.switch(GcMode::Generational);
            if let Some(v) = req.minor_mul {
                gc.set(GcParam::MinorMul, v);
            }
            if let Some(v) = req.minor_major {
                gc.set(GcParam::MinorMajor, v);
            }
            if let Some(v) = req.major_minor {
                gc.set(GcParam::MajorMinor, v);
            }
            Ok(prev)
        }
        (GcMode::Incremental, api) => {
            let gc = vm.gc_mut();
            let prev = gc.switch(GcMode::Incremental);
            if let Some(v) = req.pause {
                gc.set(GcParam::Pause, v);
            }
            if let Some(v) = req.step_mul {
                gc.set(GcParam::StepMul, v);
            }
            // R1 has no step-size knob; the field is dropped there
            if api != ApiRev::R1 {
                if let Some(v) = req.step_size {
                    gc.set(GcParam::StepSize, v);
                }
            }
            Ok(prev)
        }
    }
}
