//! Collector error conditions.

use thiserror::Error;

/// Failure conditions reported by the arena and collector.
///
/// Every failure leaves all state exactly as it was before the call; there
/// are no partially applied operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GcError {
    /// No free block in the arena is large enough for the request.
    #[error("allocation of {requested} bytes failed ({available} bytes free)")]
    OutOfMemory {
        /// Requested payload size in bytes.
        requested: usize,
        /// Free bytes available at the time of the request.
        available: usize,
    },

    /// The source object has no room for an embedded reference slot.
    #[error("object at {addr:#x} ({size} bytes) cannot hold a nested reference")]
    InsufficientSpace {
        /// Payload address of the too-small source object.
        addr: usize,
        /// Its recorded payload size.
        size: usize,
    },

    /// The address is not a live tracked allocation.
    #[error("address {0:#x} is not a tracked allocation")]
    UntrackedAddress(usize),
}
