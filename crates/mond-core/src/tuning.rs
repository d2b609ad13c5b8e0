//! GC strategy tuning request/response types.

use thiserror::Error;

/// Active collector strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GcMode {
    #[default]
    Incremental,
    Generational,
}

/// A tuning request. `None` fields are left unchanged; fields irrelevant to
/// the requested mode are ignored silently. Fields the negotiated API
/// revision cannot express at all make the whole request unsupported.
#[derive(Debug, Clone, Copy, Default)]
pub struct GcTuning {
    pub mode: GcMode,
    /// Generational: minor collection multiplier.
    pub minor_mul: Option<u32>,
    /// Generational: major collection multiplier (gone in R3).
    pub major_mul: Option<u32>,
    /// Generational: minor-to-major promotion threshold (R3 only).
    pub minor_major: Option<u32>,
    /// Generational: major-to-minor demotion threshold (R3 only).
    pub major_minor: Option<u32>,
    /// Incremental: pause between cycles.
    pub pause: Option<u32>,
    /// Incremental: step multiplier.
    pub step_mul: Option<u32>,
    /// Incremental: step size (no knob for it in R1).
    pub step_size: Option<u32>,
}

impl GcTuning {
    pub fn incremental() -> GcTuning {
        GcTuning {
            mode: GcMode::Incremental,
            ..GcTuning::default()
        }
    }

    pub fn generational() -> GcTuning {
        GcTuning {
            mode: GcMode::Generational,
            ..GcTuning::default()
        }
    }
}

/// Distinct marker for a request the negotiated revision cannot express
/// structurally. Never produced for merely irrelevant fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("gc tuning request not supported by this API revision")]
pub struct GcUnsupported;
