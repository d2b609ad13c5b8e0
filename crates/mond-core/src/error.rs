//! Host-facing errors.

use thiserror::Error;

use crate::value::Value;

/// Error surfaced at the host boundary.
///
/// VM-internal raises never appear to the host directly; they are caught at
/// a protected boundary and converted into this type, carrying the raised
/// value as payload.
#[derive(Debug, Clone, Error)]
pub enum HostError {
    /// A VM raise that reached the host boundary.
    #[error("uncaught error: {}", .0.display())]
    Raised(Value),
    /// Host API misuse detected at a safe boundary.
    #[error("{0}")]
    Invalid(&'static str),
}

impl HostError {
    /// The raised value, when there is one.
    pub fn value(&self) -> Option<&Value> {
        match self {
            HostError::Raised(v) => Some(v),
            _ => None,
        }
    }
}
