//! On-arena record layouts.
//!
//! Both records live inside the arena's byte region at whatever address the
//! allocator put them. Recorded payload sizes are exact (never rounded up),
//! so neither record is guaranteed to be aligned — all access goes through
//! unaligned raw-pointer reads and writes.

/// Per-allocation metadata stored immediately before a payload.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AllocHeader {
    /// Exact requested payload size in bytes.
    pub size: usize,
    /// Scratch flag for the mark phase; meaningless outside of one.
    pub marked: bool,
}

/// A node of the address-ordered free list.
///
/// The list is terminated by a zero-size sentinel node sitting at the end
/// of the arena; the sentinel's `next` is zero.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FreeBlock {
    /// Free bytes following this node (the node itself not included).
    pub size: usize,
    /// Address of the next free node, or zero past the sentinel.
    pub next: usize,
}

/// Bytes consumed by an [`AllocHeader`] in front of every payload.
pub const HEADER_SIZE: usize = size_of::<AllocHeader>();

/// Bytes consumed by a [`FreeBlock`] node, sentinel included.
pub const FREE_NODE_SIZE: usize = size_of::<FreeBlock>();

/// Width of the words the conservative scanner reads out of payloads.
pub const WORD_SIZE: usize = size_of::<usize>();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sizes_match() {
        // Header and free node must be interchangeable in place: freeing an
        // object reinterprets its header bytes as a free node.
        assert_eq!(HEADER_SIZE, FREE_NODE_SIZE);
        assert_eq!(HEADER_SIZE, 2 * WORD_SIZE);
    }
}
