//! Fixed-capacity arena with a first-fit free list.
//!
//! ## Design
//!
//! - **Fixed region**: 4096 bytes plus one sentinel node, acquired lazily
//!   from the global allocator on first use
//! - **Free list**: singly linked, kept in ascending address order at all
//!   times; terminated by a zero-size sentinel at the end of the region
//! - **First-fit**: allocation takes the first block whose recorded size
//!   covers the request and splits a header-plus-payload prefix off it
//! - **Coalescing**: a freed block merges with its successor and its
//!   predecessor independently whenever they are byte-contiguous

use std::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use std::fmt::Write;

use crate::object::{AllocHeader, FREE_NODE_SIZE, FreeBlock, HEADER_SIZE};

/// Total arena capacity in bytes. The sentinel node sits just past it.
pub const HEAP_SIZE: usize = 4096;

/// Fixed-capacity byte region backing every simulated allocation.
///
/// All block metadata lives inside the region itself. Recorded sizes are
/// exact, so headers and free nodes can land at unaligned addresses and are
/// accessed exclusively through unaligned reads and writes. Addresses are
/// handed out and taken back as raw `usize` bit patterns — simulated
/// objects never participate in Rust's ownership model.
pub struct Heap {
    /// Start of the mapped region; null until first use.
    base: *mut u8,
    /// Address of the first free node.
    head: usize,
    /// Address of the zero-size sentinel node.
    tail: usize,
}

impl Heap {
    /// Create a heap. The backing region is not mapped until first use.
    pub fn new() -> Self {
        Self {
            base: std::ptr::null_mut(),
            head: 0,
            tail: 0,
        }
    }

    fn layout() -> Layout {
        Layout::from_size_align(HEAP_SIZE + FREE_NODE_SIZE, align_of::<FreeBlock>()).unwrap()
    }

    /// Map the region on first use and return the free-list head address.
    fn start(&mut self) -> usize {
        if self.base.is_null() {
            // SAFETY: the layout has non-zero size.
            let base = unsafe { alloc(Self::layout()) };
            if base.is_null() {
                handle_alloc_error(Self::layout());
            }
            self.base = base;
            self.head = base as usize;
            self.tail = base as usize + HEAP_SIZE;
            // SAFETY: both nodes lie inside the freshly mapped region.
            unsafe {
                self.write_block(
                    self.head,
                    FreeBlock {
                        size: HEAP_SIZE - FREE_NODE_SIZE,
                        next: self.tail,
                    },
                );
                self.write_block(self.tail, FreeBlock { size: 0, next: 0 });
            }
        }
        self.head
    }

    /// # Safety
    /// `addr` must lie within the mapped region with room for a node.
    unsafe fn read_block(&self, addr: usize) -> FreeBlock {
        unsafe { (addr as *const FreeBlock).read_unaligned() }
    }

    /// # Safety
    /// `addr` must lie within the mapped region with room for a node.
    unsafe fn write_block(&mut self, addr: usize, block: FreeBlock) {
        unsafe { (addr as *mut FreeBlock).write_unaligned(block) }
    }

    /// # Safety
    /// `addr` must be the header address of a live allocation on this heap.
    pub(crate) unsafe fn read_header(&self, addr: usize) -> AllocHeader {
        unsafe { (addr as *const AllocHeader).read_unaligned() }
    }

    /// # Safety
    /// `addr` must be the header address of a live allocation on this heap.
    pub(crate) unsafe fn write_header(&mut self, addr: usize, header: AllocHeader) {
        unsafe { (addr as *mut AllocHeader).write_unaligned(header) }
    }

    /// Sum of all free-block sizes.
    pub fn available_memory(&mut self) -> usize {
        let mut total = 0;
        let mut at = self.start();
        while at != self.tail {
            // SAFETY: the walk only visits in-region list nodes.
            let block = unsafe { self.read_block(at) };
            total += block.size;
            at = block.next;
        }
        total
    }

    /// First-fit scan. Returns the matching node and its predecessor.
    ///
    /// The comparison is against the raw requested size; `split` settles
    /// the header overhead for blocks that match with less than a node's
    /// worth of slack.
    fn find_free(&mut self, size: usize) -> Option<(usize, Option<usize>)> {
        let mut prev = None;
        let mut at = self.start();
        while at != self.tail {
            // SAFETY: the walk only visits in-region list nodes.
            let block = unsafe { self.read_block(at) };
            if block.size >= size {
                return Some((at, prev));
            }
            prev = Some(at);
            at = block.next;
        }
        None
    }

    /// Allocate `size` payload bytes.
    ///
    /// Returns the payload address, which sits immediately after a fresh
    /// [`AllocHeader`], or `None` when no free block is large enough. A
    /// failed allocation has no side effects.
    pub fn allocate(&mut self, size: usize) -> Option<usize> {
        let (found, prev) = self.find_free(size)?;
        Some(self.split(size, found, prev))
    }

    /// Carve a header-plus-`size` prefix off the front of `found`.
    ///
    /// When the block's recorded size covers `size` plus a node, the
    /// remainder stays on the free list (a zero-size node is legal and sits
    /// there until coalesced away). When the match left less than a node's
    /// worth of slack, the block is unlinked whole and the slack is
    /// absorbed into the recorded payload size, so every arena byte stays
    /// accounted for.
    fn split(&mut self, size: usize, found: usize, prev: Option<usize>) -> usize {
        // SAFETY: `found` came out of `find_free`, so it is a list node.
        let block = unsafe { self.read_block(found) };
        let consumed = size + HEADER_SIZE;

        let (successor, payload_size) = if block.size >= consumed {
            let rest = found + consumed;
            // SAFETY: `rest` lies inside the extent of `found`'s block.
            unsafe {
                self.write_block(
                    rest,
                    FreeBlock {
                        size: block.size - consumed,
                        next: block.next,
                    },
                );
            }
            (rest, size)
        } else {
            (block.next, block.size)
        };

        match prev {
            Some(p) => {
                // SAFETY: `prev` came out of `find_free`, so it is a node.
                let mut prev_block = unsafe { self.read_block(p) };
                prev_block.next = successor;
                unsafe { self.write_block(p, prev_block) };
            }
            None => self.head = successor,
        }

        // SAFETY: the header replaces the node's own bytes in place.
        unsafe {
            self.write_header(
                found,
                AllocHeader {
                    size: payload_size,
                    marked: false,
                },
            );
        }
        found + HEADER_SIZE
    }

    /// Return a payload to the free list.
    ///
    /// Recovers the header sitting in front of `payload`, reinterprets its
    /// bytes as a free node of the recorded size, and coalesces.
    ///
    /// # Safety
    /// `payload` must have been returned by [`Heap::allocate`] on this heap
    /// and not freed since.
    pub unsafe fn free(&mut self, payload: usize) {
        let node = payload - HEADER_SIZE;
        // SAFETY: per the contract, a live header sits at `node`.
        let header = unsafe { self.read_header(node) };
        unsafe {
            self.write_block(
                node,
                FreeBlock {
                    size: header.size,
                    next: 0,
                },
            );
        }
        self.coalesce(node);
    }

    /// Link `node` into the list at its address-ordered position and merge
    /// it with each byte-contiguous neighbor.
    ///
    /// Both merges are evaluated independently — a free can close a gap on
    /// both sides at once. The sentinel never merges: a block that runs up
    /// against the end of the arena simply keeps the sentinel as successor.
    fn coalesce(&mut self, node: usize) {
        let mut prev = None;
        let mut next = self.start();
        while next != self.tail && next < node {
            prev = Some(next);
            // SAFETY: the walk only visits in-region list nodes.
            next = unsafe { self.read_block(next) }.next;
        }

        // SAFETY: `node` holds a just-written free node.
        let mut block = unsafe { self.read_block(node) };
        block.next = next;

        if next != self.tail && node + block.size + FREE_NODE_SIZE == next {
            // SAFETY: `next` is an in-region list node.
            let next_block = unsafe { self.read_block(next) };
            block.size += next_block.size + FREE_NODE_SIZE;
            block.next = next_block.next;
        }
        // SAFETY: `node` stays in region regardless of the merge above.
        unsafe { self.write_block(node, block) };

        match prev {
            Some(p) => {
                // SAFETY: `prev` is an in-region list node.
                let mut prev_block = unsafe { self.read_block(p) };
                if p + prev_block.size + FREE_NODE_SIZE == node {
                    prev_block.size += block.size + FREE_NODE_SIZE;
                    prev_block.next = block.next;
                } else {
                    prev_block.next = node;
                }
                unsafe { self.write_block(p, prev_block) };
            }
            None => self.head = node,
        }
    }

    /// Release the backing region and reinitialize it as a single free
    /// block spanning the full capacity.
    ///
    /// Destructive: every previously returned address becomes invalid. A
    /// heap that was never used stays unmapped.
    pub fn reset(&mut self) {
        if !self.base.is_null() {
            // SAFETY: `base` was returned by `alloc` with the same layout.
            unsafe { dealloc(self.base, Self::layout()) };
            self.base = std::ptr::null_mut();
            self.start();
        }
    }

    /// Render the free list as `Free(<size>)` entries joined by `->`,
    /// newline-terminated, with no trailing arrow.
    pub fn dump(&mut self) -> String {
        let mut out = String::new();
        let mut at = self.start();
        while at != self.tail {
            // SAFETY: the walk only visits in-region list nodes.
            let block = unsafe { self.read_block(at) };
            if !out.is_empty() {
                out.push_str("->");
            }
            let _ = write!(out, "Free({})", block.size);
            at = block.next;
        }
        out.push('\n');
        out
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        if !self.base.is_null() {
            // SAFETY: `base` was returned by `alloc` with the same layout.
            unsafe { dealloc(self.base, Self::layout()) };
        }
    }
}
