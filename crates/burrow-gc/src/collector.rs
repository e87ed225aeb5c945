//! Allocation tracking and the two reclamation algorithms.
//!
//! ## Design
//!
//! - **Allocation registry**: payload address → header address; the single
//!   source of truth for "is this bit pattern a live object"
//! - **Root set**: multiset of externally held addresses — every add and
//!   delete moves exactly one unit of holding
//! - **Reference counting**: frees zero-count objects; freeing never
//!   decrements the counts of objects the freed one refers to, so mutually
//!   referencing cycles survive it by design
//! - **Mark/sweep**: conservative worklist walk over raw payload words
//!   starting from the root set; reclaims anything unreachable, cycles
//!   included

use rustc_hash::FxHashMap;

use crate::error::GcError;
use crate::heap::Heap;
use crate::object::{HEADER_SIZE, WORD_SIZE};

/// Orchestrates the arena, the registries, and both collection algorithms.
///
/// Fresh allocations start out rooted; the client drops roots and links
/// objects through embedded references to build arbitrary, possibly cyclic
/// graphs, then invokes one of the collectors explicitly.
pub struct Collector {
    heap: Heap,
    /// Live payload address → its header address.
    allocations: FxHashMap<usize, usize>,
    /// Externally held address → number of independent holds.
    root_set: FxHashMap<usize, usize>,
    /// Address → reference count, floored at zero.
    ref_counts: FxHashMap<usize, usize>,
}

impl Collector {
    /// Create a collector over a fresh, unmapped heap.
    pub fn new() -> Self {
        Self {
            heap: Heap::new(),
            allocations: FxHashMap::default(),
            root_set: FxHashMap::default(),
            ref_counts: FxHashMap::default(),
        }
    }

    /// Allocate `size` payload bytes, register the result, and root it.
    ///
    /// On failure nothing is registered and no state changes.
    pub fn allocate(&mut self, size: usize) -> Result<usize, GcError> {
        let Some(payload) = self.heap.allocate(size) else {
            #[cfg(feature = "gc_logging")]
            tracing::debug!(
                target: "burrow::gc",
                requested = size,
                available = self.heap.available_memory(),
                "allocation failed"
            );
            return Err(GcError::OutOfMemory {
                requested: size,
                available: self.heap.available_memory(),
            });
        };
        self.allocations.insert(payload, payload - HEADER_SIZE);
        self.add_reference(payload);
        Ok(payload)
    }

    /// Add one unit of external holding for `addr` and bump its count.
    pub fn add_reference(&mut self, addr: usize) {
        *self.root_set.entry(addr).or_insert(0) += 1;
        *self.ref_counts.entry(addr).or_insert(0) += 1;
    }

    /// Drop one unit of external holding for `addr`.
    ///
    /// Silently ignored when `addr` holds no root units. The reference
    /// count is decremented only when a unit was actually removed, and
    /// never goes below zero.
    pub fn delete_reference(&mut self, addr: usize) {
        let Some(holds) = self.root_set.get_mut(&addr) else {
            return;
        };
        *holds -= 1;
        if *holds == 0 {
            self.root_set.remove(&addr);
        }
        if let Some(count) = self.ref_counts.get_mut(&addr) {
            *count = count.saturating_sub(1);
        }
    }

    /// Write `dest` into the first pointer-width word of `src`'s payload
    /// and bump `dest`'s count.
    ///
    /// Models an internal field: `dest` is deliberately not rooted, which
    /// is how cyclic graphs are built without making cycle members external
    /// roots. Only this single embedded slot exists per object.
    pub fn add_nested_reference(&mut self, src: usize, dest: usize) -> Result<(), GcError> {
        let &header_addr = self
            .allocations
            .get(&src)
            .ok_or(GcError::UntrackedAddress(src))?;
        if !self.allocations.contains_key(&dest) {
            return Err(GcError::UntrackedAddress(dest));
        }
        // SAFETY: the registry only holds live header addresses.
        let header = unsafe { self.heap.read_header(header_addr) };
        if header.size < WORD_SIZE {
            return Err(GcError::InsufficientSpace {
                addr: src,
                size: header.size,
            });
        }
        // SAFETY: the payload is live and at least one word long.
        unsafe { (src as *mut usize).write_unaligned(dest) };
        *self.ref_counts.entry(dest).or_insert(0) += 1;
        Ok(())
    }

    /// Run mark-and-sweep and return the freed payload addresses.
    ///
    /// Idempotent: on an already-clean heap it returns an empty list and
    /// leaves available memory unchanged.
    pub fn ms_collect(&mut self) -> Vec<usize> {
        #[cfg(feature = "gc_logging")]
        tracing::debug!(
            target: "burrow::gc",
            live = self.allocations.len(),
            roots = self.root_set.len(),
            "mark/sweep starting"
        );

        self.mark();
        let freed = self.sweep();

        #[cfg(feature = "gc_logging")]
        tracing::info!(
            target: "burrow::gc",
            freed = freed.len(),
            live = self.allocations.len(),
            "mark/sweep complete"
        );
        freed
    }

    /// Free every object whose reference count has reached zero and return
    /// the freed payload addresses.
    ///
    /// Freeing never decrements the counts of objects the freed one refers
    /// to through its embedded slot. A cycle whose members have zero root
    /// references but nonzero mutual references is therefore never
    /// collected here — that is the intended contrast with mark/sweep, not
    /// a defect to fix.
    pub fn rc_collect(&mut self) -> Vec<usize> {
        let mut freed = Vec::new();
        // Freeing mutates the table being scanned, so restart after a hit.
        loop {
            let Some(addr) = self
                .ref_counts
                .iter()
                .find(|&(_, &count)| count == 0)
                .map(|(&addr, _)| addr)
            else {
                break;
            };
            if self.allocations.contains_key(&addr) {
                self.release(addr);
                freed.push(addr);
            } else {
                // Count entry for an address that was never a registered
                // allocation; drop it rather than touch the arena.
                self.ref_counts.remove(&addr);
            }
        }

        #[cfg(feature = "gc_logging")]
        tracing::info!(
            target: "burrow::gc",
            freed = freed.len(),
            live = self.allocations.len(),
            "reference counting complete"
        );
        freed
    }

    /// Clear every mark, then walk from each distinct rooted address.
    fn mark(&mut self) {
        let headers: Vec<usize> = self.allocations.values().copied().collect();
        for header_addr in headers {
            // SAFETY: the registry only holds live header addresses.
            let mut header = unsafe { self.heap.read_header(header_addr) };
            header.marked = false;
            unsafe { self.heap.write_header(header_addr, header) };
        }

        let roots: Vec<usize> = self.root_set.keys().copied().collect();
        for root in roots {
            self.walk(root);
        }
    }

    /// Conservative reachability walk from `root` over raw payload words.
    ///
    /// Every pointer-width word of a payload that matches a registered
    /// allocation address is followed as a reference. An explicit worklist
    /// keeps call-stack depth flat on long chains, and the mark flag bounds
    /// each object to a single visit, which also makes cycles safe.
    fn walk(&mut self, root: usize) {
        if root == 0 || !self.allocations.contains_key(&root) {
            return;
        }
        let mut worklist = vec![root];
        while let Some(addr) = worklist.pop() {
            let header_addr = self.allocations[&addr];
            // SAFETY: the registry only holds live header addresses.
            let mut header = unsafe { self.heap.read_header(header_addr) };
            if header.marked {
                continue;
            }
            header.marked = true;
            unsafe { self.heap.write_header(header_addr, header) };

            // Scan word by word; a trailing partial word is still read in
            // full (the sentinel slack keeps the read inside the region).
            let mut offset = 0;
            while offset < header.size {
                // SAFETY: the span starts at a live payload and stays
                // within the mapped region.
                let word = unsafe { ((addr + offset) as *const usize).read_unaligned() };
                if let Some(&child_header) = self.allocations.get(&word) {
                    // SAFETY: ditto for the child's header address.
                    let child = unsafe { self.heap.read_header(child_header) };
                    if !child.marked {
                        worklist.push(word);
                    }
                }
                offset += WORD_SIZE;
            }
        }
    }

    /// Free every registration whose header is unmarked.
    ///
    /// When the registry comes out empty the heap is reset to its canonical
    /// single free block instead of relying on incremental coalescing.
    fn sweep(&mut self) -> Vec<usize> {
        let dead: Vec<usize> = self
            .allocations
            .iter()
            .filter(|&(_, &header_addr)| {
                // SAFETY: the registry only holds live header addresses.
                !unsafe { self.heap.read_header(header_addr) }.marked
            })
            .map(|(&payload, _)| payload)
            .collect();

        for &payload in &dead {
            self.release(payload);
        }
        if self.allocations.is_empty() {
            self.heap.reset();
        }
        dead
    }

    /// Free one object from the arena and strip every piece of its
    /// metadata — registry, root units, and count go together.
    fn release(&mut self, payload: usize) {
        // SAFETY: `payload` comes out of the registry, so it was returned
        // by this heap's allocate and has not been freed yet.
        unsafe { self.heap.free(payload) };
        self.allocations.remove(&payload);
        self.root_set.remove(&payload);
        self.ref_counts.remove(&payload);
    }

    /// Total free bytes currently available in the arena.
    pub fn available_memory(&mut self) -> usize {
        self.heap.available_memory()
    }

    /// Free-list trace: `Free(<size>)` entries joined by `->`.
    pub fn dump(&mut self) -> String {
        self.heap.dump()
    }

    /// Number of live tracked allocations.
    pub fn allocation_count(&self) -> usize {
        self.allocations.len()
    }

    /// Current reference count for `addr`, if it has one.
    pub fn reference_count(&self, addr: usize) -> Option<usize> {
        self.ref_counts.get(&addr).copied()
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::HEAP_SIZE;
    use crate::object::FREE_NODE_SIZE;

    const INITIAL_FREE: usize = HEAP_SIZE - FREE_NODE_SIZE;

    #[test]
    fn test_allocate_registers_and_roots() {
        let mut gc = Collector::new();
        let ptr = gc.allocate(64).unwrap();
        assert_eq!(gc.allocation_count(), 1);
        assert_eq!(gc.reference_count(ptr), Some(1));
    }

    #[test]
    fn test_allocation_failure_registers_nothing() {
        let mut gc = Collector::new();
        let err = gc.allocate(HEAP_SIZE).unwrap_err();
        assert_eq!(
            err,
            GcError::OutOfMemory {
                requested: HEAP_SIZE,
                available: INITIAL_FREE,
            }
        );
        assert_eq!(gc.allocation_count(), 0);
    }

    #[test]
    fn test_reference_units_are_counted() {
        let mut gc = Collector::new();
        let ptr = gc.allocate(64).unwrap();
        gc.add_reference(ptr);
        gc.add_reference(ptr);
        assert_eq!(gc.reference_count(ptr), Some(3));

        gc.delete_reference(ptr);
        gc.delete_reference(ptr);
        gc.delete_reference(ptr);
        assert_eq!(gc.reference_count(ptr), Some(0));
    }

    #[test]
    fn test_delete_without_root_is_silent() {
        let mut gc = Collector::new();
        let ptr = gc.allocate(64).unwrap();
        gc.delete_reference(ptr);
        // No root units left; further deletes change nothing.
        gc.delete_reference(ptr);
        gc.delete_reference(ptr);
        assert_eq!(gc.reference_count(ptr), Some(0));
    }

    #[test]
    fn test_nested_reference_needs_a_word_of_space() {
        let mut gc = Collector::new();
        let small = gc.allocate(WORD_SIZE - 1).unwrap();
        let dest = gc.allocate(64).unwrap();
        let err = gc.add_nested_reference(small, dest).unwrap_err();
        assert_eq!(
            err,
            GcError::InsufficientSpace {
                addr: small,
                size: WORD_SIZE - 1,
            }
        );
        // Failed linking changes no counts.
        assert_eq!(gc.reference_count(dest), Some(1));
    }

    #[test]
    fn test_nested_reference_rejects_untracked_addresses() {
        let mut gc = Collector::new();
        let ptr = gc.allocate(64).unwrap();
        assert_eq!(
            gc.add_nested_reference(0xdead_0000, ptr),
            Err(GcError::UntrackedAddress(0xdead_0000))
        );
        assert_eq!(
            gc.add_nested_reference(ptr, 0xdead_0000),
            Err(GcError::UntrackedAddress(0xdead_0000))
        );
    }

    #[test]
    fn test_nested_reference_writes_the_slot() {
        let mut gc = Collector::new();
        let a = gc.allocate(32).unwrap();
        let b = gc.allocate(32).unwrap();
        gc.add_nested_reference(a, b).unwrap();
        let slot = unsafe { (a as *const usize).read_unaligned() };
        assert_eq!(slot, b);
        assert_eq!(gc.reference_count(b), Some(2));
    }

    #[test]
    fn test_walk_keeps_unrooted_but_reachable_objects() {
        let mut gc = Collector::new();
        let a = gc.allocate(32).unwrap();
        let b = gc.allocate(32).unwrap();
        gc.add_nested_reference(a, b).unwrap();
        gc.delete_reference(b);

        // b has no root unit but is reachable through a's embedded slot.
        assert!(gc.ms_collect().is_empty());
        assert_eq!(gc.allocation_count(), 2);

        gc.delete_reference(a);
        let freed = gc.ms_collect();
        assert_eq!(freed.len(), 2);
        assert_eq!(gc.allocation_count(), 0);
        assert_eq!(gc.available_memory(), INITIAL_FREE);
    }

    #[test]
    fn test_rc_frees_unrooted_acyclic_object() {
        let mut gc = Collector::new();
        let ptr = gc.allocate(100).unwrap();
        gc.delete_reference(ptr);
        let freed = gc.rc_collect();
        assert_eq!(freed, vec![ptr]);
        assert_eq!(gc.allocation_count(), 0);
        assert_eq!(gc.available_memory(), INITIAL_FREE);
    }

    #[test]
    fn test_rc_keeps_rooted_objects() {
        let mut gc = Collector::new();
        let ptr = gc.allocate(100).unwrap();
        assert!(gc.rc_collect().is_empty());
        assert_eq!(gc.reference_count(ptr), Some(1));
        assert_eq!(gc.allocation_count(), 1);
    }
}
