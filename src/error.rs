//! Crate-wide error type.
//!
//! The allocator's contract is best-effort delivery: every failure mode
//! reduces to "no data available" or "this frame cannot be placed".
//! Variants carry just enough discrimination for callers to react;
//! contract violations (an offset outside the buffer) are bugs in the
//! collaborator and assert instead of returning an error.

use core::fmt;

/// Every fallible allocator operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The queried stack holds no pending task.
    NoTask,
    /// No delivery task exists for the requested endpoint.
    NoTaskForEndpoint,
    /// Peek or pull index is at or beyond the stack occupancy.
    IndexOutOfRange,
    /// The frame can never be placed in the buffer.
    WontFit,
    /// A staged frame's length disagrees with its header.
    MalformedFrame,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTask => write!(f, "no pending task"),
            Self::NoTaskForEndpoint => write!(f, "no task for endpoint"),
            Self::IndexOutOfRange => write!(f, "task index out of range"),
            Self::WontFit => write!(f, "frame cannot fit in buffer"),
            Self::MalformedFrame => write!(f, "frame length disagrees with header"),
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
