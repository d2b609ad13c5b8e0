//! Collector strategy state and pacing accounting.
//!
//! Memory itself is reclaimed by host reference counting; this state tracks
//! the negotiated strategy and its tuning parameters, and paces collection
//! work from allocation debt. Which parameters a given API revision may
//! touch is decided by the compatibility shim, not here.

use mond_core::GcMode;

/// One tunable pacing parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcParam {
    MinorMul,
    MajorMul,
    MinorMajor,
    MajorMinor,
    Pause,
    StepMul,
    StepSize,
}

#[derive(Debug)]
pub struct GcState {
    mode: GcMode,
    minor_mul: u32,
    major_mul: u32,
    minor_major: u32,
    major_minor: u32,
    pause: u32,
    step_mul: u32,
    step_size: u32,
    /// Bytes allocated since the last step.
    debt: usize,
    total: usize,
}

impl Default for GcState {
    fn default() -> GcState {
        GcState {
            mode: GcMode::Incremental,
            minor_mul: 20,
            major_mul: 100,
            minor_major: 70,
            major_minor: 50,
            pause: 200,
            step_mul: 100,
            step_size: 13,
            debt: 0,
            total: 0,
        }
    }
}

impl GcState {
    pub fn mode(&self) -> GcMode {
        self.mode
    }

    /// Switch strategy, returning the previous one.
    pub fn switch(&mut self, mode: GcMode) -> GcMode {
        std::mem::replace(&mut self.mode, mode)
    }

    pub fn set(&mut self, param: GcParam, value: u32) {
        match param {
            GcParam::MinorMul => self.minor_mul = value,
            GcParam::MajorMul => self.major_mul = value,
            GcParam::MinorMajor => self.minor_major = value,
            GcParam::MajorMinor => self.major_minor = value,
            GcParam::Pause => self.pause = value,
            GcParam::StepMul => self.step_mul = value,
            GcParam::StepSize => self.step_size = value,
        }
    }

    pub fn get(&self, param: GcParam) -> u32 {
        match param {
            GcParam::MinorMul => self.minor_mul,
            GcParam::MajorMul => self.major_mul,
            GcParam::MinorMajor => self.minor_major,
            GcParam::MajorMinor => self.major_minor,
            GcParam::Pause => self.pause,
            GcParam::StepMul => self.step_mul,
            GcParam::StepSize => self.step_size,
        }
    }

    pub fn note_alloc(&mut self, bytes: usize) {
        self.debt += bytes;
        self.total += bytes;
    }

    /// Whether enough debt accumulated to warrant a collection step.
    pub fn step_due(&self) -> bool {
        let unit = 1usize << self.step_size.min(24);
        self.debt >= unit.saturating_mul(self.step_mul.max(1) as usize) / 100
    }

    /// Acknowledge a completed step.
    pub fn step_done(&mut self) {
        self.debt = 0;
    }

    pub fn total_allocated(&self) -> usize {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn switch_reports_previous_mode() {
        let mut gc = GcState::default();
        assert_eq!(gc.switch(GcMode::Generational), GcMode::Incremental);
        assert_eq!(gc.switch(GcMode::Incremental), GcMode::Generational);
    }

    #[test]
    fn debt_drives_step_pacing() {
        let mut gc = GcState::default();
        gc.set(GcParam::StepSize, 4);
        gc.set(GcParam::StepMul, 100);
        assert!(!gc.step_due());
        gc.note_alloc(64);
        assert!(gc.step_due());
        gc.step_done();
        assert!(!gc.step_due());
        assert_eq!(gc.total_allocated(), 64);
    }
}
