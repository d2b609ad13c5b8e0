//! Debug information surfaced to the host.

use std::rc::Rc;

/// A snapshot of one call frame for the host.
///
/// `srclen` and `transfers` only exist from API revision R2 on; the
/// compatibility shim recomputes or defaults them for older revisions.
#[derive(Debug, Clone)]
pub struct DebugRecord {
    /// Name of the source the frame is executing (a native slot name).
    pub source: Rc<str>,
    /// Byte length of `source`; absent on R1.
    pub srclen: Option<usize>,
    /// `(first slot, count)` of the last stack transfer into this frame;
    /// absent on R1, `(0, 0)` when the frame performed no transfer.
    pub transfers: Option<(u16, u16)>,
    /// Kind of frame, e.g. "native".
    pub what: &'static str,
}
